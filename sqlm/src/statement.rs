///
/// Compiled statement cache.
///
/// Maps literal statement text to the engine's compiled form. Entries are
/// added on the first successful compile and never evicted or invalidated;
/// a compiled form is assumed to stay valid for the life of the handle even
/// when tables are dropped and recreated.
///

use std::collections::HashMap;

use tracing::trace;

use crate::errors::DbError;

#[derive(Debug)]
pub struct StatementCache<C> {
    entries: HashMap<String, C>,
    hits: u64,
    misses: u64,
}

impl<C> Default for StatementCache<C> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<C: Clone> StatementCache<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the compiled form of `text` and whether it came from the
    /// cache. Failed compiles are not cached.
    pub fn get_or_compile<F>(&mut self, text: &str, compile: F) -> Result<(C, bool), DbError>
    where
        F: FnOnce(&str) -> Result<C, DbError>,
    {
        if let Some(compiled) = self.entries.get(text) {
            self.hits += 1;
            return Ok((compiled.clone(), true));
        }

        self.misses += 1;
        trace!(sql = text, "statement cache miss");
        let compiled = compile(text)?;
        self.entries.insert(text.to_string(), compiled.clone());
        Ok((compiled, false))
    }

    pub fn contains(&self, text: &str) -> bool {
        self.entries.contains_key(text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_lookup_hits() {
        let mut cache = StatementCache::new();
        let mut compiles = 0;

        let (first, cached) = cache
            .get_or_compile("SELECT 1;", |text| {
                compiles += 1;
                Ok(text.len())
            })
            .unwrap();
        assert_eq!(first, 9);
        assert!(!cached);

        let (second, cached) = cache
            .get_or_compile("SELECT 1;", |_| panic!("should not recompile"))
            .unwrap();
        assert_eq!(second, 9);
        assert!(cached);

        assert_eq!(compiles, 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failed_compile_is_not_cached() {
        let mut cache: StatementCache<usize> = StatementCache::new();
        let result = cache.get_or_compile("SELEKT;", |_| Err(DbError::Engine("bad".to_string())));
        assert!(result.is_err());
        assert!(!cache.contains("SELEKT;"));
        assert!(cache.is_empty());

        let (_, cached) = cache.get_or_compile("SELEKT;", |_| Ok(1)).unwrap();
        assert!(!cached);
        assert_eq!(cache.misses(), 2);
    }
}
