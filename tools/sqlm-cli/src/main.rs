///
/// sqlm CLI - run a statement list against a SQLite database file
///
/// - sqlm app.db "SELECT * FROM member WHERE group_num > ?1;" 1000
/// - sqlm --create app.db "CREATE TABLE t (x INTEGER);"
/// - sqlm --trace --config sqlm.toml app.db "..."
///
/// Parameters are bound as integers when they parse as one, then as reals,
/// and as text otherwise.
///

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use sqlm::{Database, DbOptions, Param, RowSet, Value};
use tracing::debug;

#[derive(Parser)]
#[command(name = "sqlm")]
#[command(author, version, about = "Run SQL against a SQLite database through sqlm", long_about = None)]
struct Cli {
    /// Database file
    db: PathBuf,

    /// Statement list to run
    sql: String,

    /// Positional parameters bound to ?1..?N
    params: Vec<String>,

    /// Create (or replace) the database file instead of opening it
    #[arg(long)]
    create: bool,

    /// Log every executed statement to stderr
    #[arg(long)]
    trace: bool,

    /// TOML file with handle options
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), sqlm::DbError> {
    let mut options = match &cli.config {
        Some(path) => DbOptions::load(path)?,
        None => DbOptions::default(),
    };
    options.trace |= cli.trace;
    debug!(?options, db = %cli.db.display(), "opening database");

    let mut db = if cli.create {
        Database::create_with(&cli.db, &options)?
    } else {
        Database::open_with(&cli.db, &options)?
    };

    let values: Vec<Value> = cli.params.iter().map(|p| parse_param(p)).collect();
    let params: Vec<&dyn Param> = values.iter().map(|v| v as &dyn Param).collect();
    let sets = db.exec(&cli.sql, &params);
    if let Some(err) = db.take_error() {
        return Err(err);
    }

    for set in &sets {
        print_rows(set);
    }

    db.close();
    match db.take_error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn parse_param(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(f) = text.parse::<f64>() {
        Value::Real(f)
    } else {
        Value::Text(text.to_string())
    }
}

fn print_rows(set: &RowSet) {
    println!("{}", set.columns().join("\t"));
    if set.is_empty() {
        eprintln!("(no rows)");
        return;
    }
    for row in set.rows() {
        let cells: Vec<String> = row.iter().map(format_value).collect();
        println!("{}", cells.join("\t"));
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("x'{}'", b.iter().map(|byte| format!("{:02x}", byte)).collect::<String>()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param_prefers_integers() {
        assert_eq!(parse_param("42"), Value::Integer(42));
        assert_eq!(parse_param("-1.5"), Value::Real(-1.5));
        assert_eq!(parse_param("ann"), Value::Text("ann".to_string()));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&Value::Null), "NULL");
        assert_eq!(format_value(&Value::Blob(vec![0, 171])), "x'00ab'");
    }

    #[test]
    fn test_cli_arguments() {
        let cli = Cli::try_parse_from(["sqlm", "--trace", "app.db", "SELECT ?1;", "7"]).unwrap();
        assert!(cli.trace);
        assert!(!cli.create);
        assert_eq!(cli.params, vec!["7".to_string()]);
    }
}
