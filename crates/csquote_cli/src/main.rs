//! Command-line front end over the quote provider.
//!
//! # Responsibility
//! - Run one provider operation per invocation against a database file.
//! - Print rows as JSON lines and counts/uris as plain text.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use csquote_core::{
    core_version, init_logging, ContentValues, LogLevel, Predicate, ResourceProvider, ResourceUri,
    StoreConfig,
};
use log::info;
use rusqlite::types::Value;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "csquote")]
#[command(version)]
#[command(about = "Query and edit curtain quote jobs, rooms and windows")]
#[command(long_about = r#"
Every command takes a resource uri:
  content://nz.co.curtainsolutions.provider/jobs
  content://nz.co.curtainsolutions.provider/rooms/R1

Example usage:
  csquote --db quotes.db insert content://nz.co.curtainsolutions.provider/jobs _id=J1 name=Smith
  csquote --db quotes.db query content://nz.co.curtainsolutions.provider/rooms --where "job_id = ?" --arg J1
"#)]
struct Cli {
    /// Database file (defaults to CSQUOTE_DB_PATH, else in-memory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log level: trace|debug|info|warn|error
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off without it
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the content type of a uri
    Type { uri: String },

    /// Print matching rows as JSON lines
    Query {
        uri: String,

        /// Column to return (repeatable; default: all)
        #[arg(short, long = "column")]
        columns: Vec<String>,

        #[command(flatten)]
        filter: FilterArgs,

        /// Ordering, e.g. "height DESC, _id"
        #[arg(short, long)]
        order_by: Option<String>,
    },

    /// Insert one row through a collection uri
    Insert {
        uri: String,

        /// Column values as KEY=VALUE
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Update matching rows
    Update {
        uri: String,

        /// Column values as KEY=VALUE
        #[arg(required = true)]
        values: Vec<String>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Delete matching rows
    Delete {
        uri: String,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Extra selection, e.g. "job_id = ?"
    #[arg(short, long = "where")]
    selection: Option<String>,

    /// Positional value for each `?` in --where (repeatable)
    #[arg(short, long = "arg")]
    args: Vec<String>,
}

impl FilterArgs {
    fn predicate(&self) -> Result<Option<Predicate>> {
        let values = self.args.iter().map(|arg| parse_value(arg)).collect::<Vec<_>>();
        match self.selection.as_deref() {
            Some(fragment) if !fragment.trim().is_empty() => {
                Ok(Some(Predicate::new(fragment, values)?))
            }
            _ if !values.is_empty() => bail!("--arg given without --where"),
            _ => Ok(None),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let level = match cli.log_level.as_deref() {
        Some(raw) => raw.parse::<LogLevel>()?,
        None => LogLevel::default_for_build(),
    };
    if let Some(log_dir) = &cli.log_dir {
        init_logging(level, log_dir).context("failed to initialize logging")?;
    }

    let config = match cli.db {
        Some(path) => StoreConfig::file(path),
        None => StoreConfig::from_env(),
    };
    info!(
        "event=cli_start module=cli status=ok version={} in_memory={}",
        core_version(),
        config.db_path.is_none()
    );
    let provider = ResourceProvider::new(config);

    match cli.command {
        Command::Type { uri } => {
            println!("{}", provider.get_type(&parse_uri(&uri)?)?);
        }
        Command::Query {
            uri,
            columns,
            filter,
            order_by,
        } => {
            let columns = columns.iter().map(String::as_str).collect::<Vec<_>>();
            let columns = (!columns.is_empty()).then_some(columns.as_slice());
            let rows = provider.query(
                &parse_uri(&uri)?,
                columns,
                filter.predicate()?.as_ref(),
                order_by.as_deref(),
            )?;
            for row in rows {
                println!("{}", serde_json::to_string(&row?)?);
            }
        }
        Command::Insert { uri, values } => {
            let item = provider.insert(&parse_uri(&uri)?, &parse_assignments(&values)?)?;
            println!("{item}");
        }
        Command::Update {
            uri,
            values,
            filter,
        } => {
            let changed = provider.update(
                &parse_uri(&uri)?,
                &parse_assignments(&values)?,
                filter.predicate()?.as_ref(),
            )?;
            println!("{changed}");
        }
        Command::Delete { uri, filter } => {
            let changed = provider.delete(&parse_uri(&uri)?, filter.predicate()?.as_ref())?;
            println!("{changed}");
        }
    }
    Ok(())
}

fn parse_uri(raw: &str) -> Result<ResourceUri> {
    ResourceUri::parse(raw).with_context(|| format!("bad uri `{raw}`"))
}

fn parse_assignments(raw: &[String]) -> Result<ContentValues> {
    raw.iter()
        .map(|assignment| match assignment.split_once('=') {
            Some((column, value)) if !column.trim().is_empty() => {
                Ok((column.trim().to_string(), parse_value(value)))
            }
            _ => bail!("expected KEY=VALUE, got `{assignment}`"),
        })
        .collect()
}

/// Integers and decimals keep their numeric storage class; everything else is text.
fn parse_value(raw: &str) -> Value {
    if let Ok(value) = raw.parse::<i64>() {
        Value::Integer(value)
    } else if let Ok(value) = raw.parse::<f64>() {
        Value::Real(value)
    } else {
        Value::Text(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_assignments, parse_value, Cli, FilterArgs};
    use clap::CommandFactory;
    use rusqlite::types::Value;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn values_keep_numeric_storage_class() {
        assert_eq!(parse_value("200"), Value::Integer(200));
        assert_eq!(parse_value("150.5"), Value::Real(150.5));
        assert_eq!(parse_value("Lounge"), Value::Text("Lounge".to_string()));
    }

    #[test]
    fn assignments_require_key_and_equals() {
        let values = parse_assignments(&["_id=W1".to_string(), "height=200".to_string()]).unwrap();
        assert_eq!(values.get_as_string("_id").as_deref(), Some("W1"));
        assert_eq!(values.get_as_i64("height"), Some(200));

        assert!(parse_assignments(&["height".to_string()]).is_err());
        assert!(parse_assignments(&["=200".to_string()]).is_err());
    }

    #[test]
    fn filter_args_need_a_selection() {
        let filter = FilterArgs {
            selection: None,
            args: vec!["J1".to_string()],
        };
        assert!(filter.predicate().is_err());

        let filter = FilterArgs {
            selection: Some("job_id = ?".to_string()),
            args: vec!["J1".to_string()],
        };
        assert!(filter.predicate().unwrap().is_some());
    }
}
