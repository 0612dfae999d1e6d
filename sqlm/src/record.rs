///
/// # Record Declarations
///
/// A record type describes its mapping once through `Record::shape()`: an
/// ordered list of fields, each with its tags, declared type, and a pair of
/// accessors. Descriptor derivation reads nothing else, so there is no
/// runtime type introspection and no field offset arithmetic.
///
/// ## Tags
///
/// - `Tag::Column(name)`: the field is a managed column. `"*"` uses the
///   field's own name as the column name.
/// - `Tag::Table(name)`: the field is the table key. It names the table and
///   holds the engine-assigned row identifier, so it must be an `i64`.
///
/// Fields without tags stay in memory only and come back from `retrieve`
/// with their `Default` value.
///
/// ## Declaring Records
///
/// ```rust,ignore
/// sqlm::record! {
///     #[derive(Debug, Clone, Default, PartialEq)]
///     pub struct Member {
///         #[table("member")]
///         pub id: i64,
///         #[column]
///         pub name: String,
///         #[column("group_num")]
///         pub num: i64,
///         pub scratch: i32,
///     }
/// }
/// ```
///

use crate::errors::DbError;
use crate::value::{FieldValue, Value};

/// Column tag value meaning "use the field's own name".
pub const FIELD_NAME: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Column(&'static str),
    Table(&'static str),
}

type Reader<R> = Box<dyn Fn(&R) -> Result<Value, DbError> + Send + Sync>;
type Writer<R> = Box<dyn Fn(&mut R, Value) -> Result<(), DbError> + Send + Sync>;

pub struct FieldDef<R> {
    name: &'static str,
    tags: Vec<Tag>,
    type_name: &'static str,
    nullable: bool,
    read: Reader<R>,
    write: Writer<R>,
}

impl<R: 'static> FieldDef<R> {
    pub fn new<T: FieldValue + 'static>(
        name: &'static str,
        tags: &[Tag],
        get: fn(&R) -> &T,
        get_mut: fn(&mut R) -> &mut T,
    ) -> Self {
        Self {
            name,
            tags: tags.to_vec(),
            type_name: T::type_name(),
            nullable: T::nullable(),
            read: Box::new(move |rec: &R| get(rec).to_sql_value()),
            write: Box::new(move |rec: &mut R, value: Value| {
                *get_mut(rec) = T::from_sql_value(value)?;
                Ok(())
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// True for `Option<T>` fields, which read and write NULL as `None`.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn column_tag(&self) -> Option<&'static str> {
        self.tags.iter().find_map(|tag| match tag {
            Tag::Column(name) => Some(*name),
            Tag::Table(_) => None,
        })
    }

    pub fn table_tag(&self) -> Option<&'static str> {
        self.tags.iter().find_map(|tag| match tag {
            Tag::Table(name) => Some(*name),
            Tag::Column(_) => None,
        })
    }

    pub fn read(&self, rec: &R) -> Result<Value, DbError> {
        (self.read)(rec)
    }

    pub fn write(&self, rec: &mut R, value: Value) -> Result<(), DbError> {
        (self.write)(rec, value)
    }
}

impl<R> std::fmt::Debug for FieldDef<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("type_name", &self.type_name)
            .field("nullable", &self.nullable)
            .finish()
    }
}

/// The ordered field list of one record type.
#[derive(Debug)]
pub struct Shape<R> {
    record: &'static str,
    fields: Vec<FieldDef<R>>,
}

impl<R: 'static> Shape<R> {
    pub fn new(record: &'static str) -> Self {
        Self {
            record,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, def: FieldDef<R>) -> Self {
        self.fields.push(def);
        self
    }

    pub fn column<T: FieldValue + 'static>(
        self,
        name: &'static str,
        column: &'static str,
        get: fn(&R) -> &T,
        get_mut: fn(&mut R) -> &mut T,
    ) -> Self {
        self.field(FieldDef::new(name, &[Tag::Column(column)], get, get_mut))
    }

    pub fn key<T: FieldValue + 'static>(
        self,
        name: &'static str,
        table: &'static str,
        get: fn(&R) -> &T,
        get_mut: fn(&mut R) -> &mut T,
    ) -> Self {
        self.field(FieldDef::new(name, &[Tag::Table(table)], get, get_mut))
    }

    pub fn record_name(&self) -> &'static str {
        self.record
    }

    pub fn fields(&self) -> &[FieldDef<R>] {
        &self.fields
    }

    pub(crate) fn into_fields(self) -> Vec<FieldDef<R>> {
        self.fields
    }
}

/// A type whose values can be stored as table rows.
pub trait Record: Default + 'static {
    fn shape() -> Shape<Self>;
}

/// Declares a struct and implements `Record` for it from field tags.
///
/// Recognized field attributes are `#[column]`, `#[column("name")]` and
/// `#[table("name")]`. Any other attribute, on the struct or on a field
/// (doc comments included), is kept on the generated struct.
#[macro_export]
macro_rules! record {
    (@field [{ [$($meta:tt)*] $vis:vis struct $record:ident }
        $({ [$($keep:tt)*] [$($tags:tt)*] $fvis:vis $field:ident : $ty:ty })*] [] []) => {
        $($meta)*
        $vis struct $record {
            $($($keep)* $fvis $field: $ty,)*
        }

        impl $crate::Record for $record {
            fn shape() -> $crate::Shape<Self> {
                $crate::Shape::new(stringify!($record))
                    $(
                        .field($crate::FieldDef::new(
                            stringify!($field),
                            &[$($tags)*],
                            |rec: &$record| &rec.$field,
                            |rec: &mut $record| &mut rec.$field,
                        ))
                    )*
            }
        }
    };
    (@field $acc:tt [$($keep:tt)*] [$($tags:tt)*] #[column] $($rest:tt)*) => {
        $crate::record!(@field $acc [$($keep)*]
            [$($tags)* $crate::Tag::Column($crate::FIELD_NAME),] $($rest)*);
    };
    (@field $acc:tt [$($keep:tt)*] [$($tags:tt)*] #[column($name:literal)] $($rest:tt)*) => {
        $crate::record!(@field $acc [$($keep)*] [$($tags)* $crate::Tag::Column($name),] $($rest)*);
    };
    (@field $acc:tt [$($keep:tt)*] [$($tags:tt)*] #[table($name:literal)] $($rest:tt)*) => {
        $crate::record!(@field $acc [$($keep)*] [$($tags)* $crate::Tag::Table($name),] $($rest)*);
    };
    (@field $acc:tt [$($keep:tt)*] [$($tags:tt)*] #[$($attr:tt)*] $($rest:tt)*) => {
        $crate::record!(@field $acc [$($keep)* #[$($attr)*]] [$($tags)*] $($rest)*);
    };
    (@field [$($acc:tt)*] [$($keep:tt)*] [$($tags:tt)*]
        $fvis:vis $field:ident : $ty:ty $(, $($rest:tt)*)?) => {
        $crate::record!(@field [$($acc)* { [$($keep)*] [$($tags)*] $fvis $field : $ty }] [] []
            $($($rest)*)?);
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $record:ident { $($body:tt)* }
    ) => {
        $crate::record!(@field [{ [$(#[$meta])*] $vis struct $record }] [] [] $($body)*);
    };
}
