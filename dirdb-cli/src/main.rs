use clap::{Parser, Subcommand, ValueEnum};
use dirdb::{Store, UpdateOutcome};
use std::process;
use std::time::Duration;

/// Environment variable consulted when `--root` is not given.
const ROOT_ENV: &str = "DIRDB_ROOT";

/// DirDB CLI: manage databases, tables and records from the command line
#[derive(Parser)]
#[command(name = "dirdb", version, about)]
struct Cli {
    /// Root directory holding the databases (default: $DIRDB_ROOT, then ".")
    #[arg(long)]
    root: Option<String>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Create a database
    CreateDb {
        /// Database name
        name: String,
    },

    /// Rename a database
    RenameDb {
        /// Current name
        old_name: String,
        /// New name
        new_name: String,
    },

    /// Delete a database and all of its tables
    DropDb {
        /// Database name
        name: String,
    },

    /// List databases
    ListDbs,

    /// Create an empty table
    CreateTable {
        /// Database name
        database: String,
        /// Table name
        table: String,
    },

    /// Rename a table
    RenameTable {
        /// Database name
        database: String,
        /// Current name
        old_name: String,
        /// New name
        new_name: String,
    },

    /// Delete a table
    DropTable {
        /// Database name
        database: String,
        /// Table name
        table: String,
    },

    /// List the tables of a database
    ListTables {
        /// Database name
        database: String,
    },

    /// Insert a record
    Insert {
        /// Database name
        database: String,
        /// Table name
        table: String,
        /// Whole record as a JSON object
        #[arg(long)]
        json: Option<String>,
        /// Field values (e.g. --field id=1 --field item=pen)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// List every record of a table
    Find {
        /// Database name
        database: String,
        /// Table name
        table: String,
    },

    /// Get the first record with an id
    Get {
        /// Database name
        database: String,
        /// Table name
        table: String,
        /// Record id (parsed as JSON, else taken as a string)
        id: String,
    },

    /// Merge fields into the first record with an id
    Update {
        /// Database name
        database: String,
        /// Table name
        table: String,
        /// Record id (parsed as JSON, else taken as a string)
        id: String,
        /// Patch as a JSON object
        #[arg(long)]
        json: Option<String>,
        /// Field values to set (e.g. --field item=pencil)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Delete the first record with an id
    Delete {
        /// Database name
        database: String,
        /// Table name
        table: String,
        /// Record id (parsed as JSON, else taken as a string)
        id: String,
        /// Show what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Print table changes in a database as they happen
    Watch {
        /// Database name
        database: String,
        /// Stop after this many seconds (default: run until interrupted)
        #[arg(long)]
        seconds: Option<u64>,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| {
        format!("Invalid key=value pair: no '=' found in '{s}'")
    })?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        // Machine-readable error on stderr
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let root = resolve_root(cli.root);
    log::debug!("Using root {root}");
    let store = Store::new(root);

    match cli.command {
        Command::CreateDb { name } => {
            store.create_database(&name)?;
            print_output(&serde_json::json!({ "ok": true, "created": name }), &cli.format)?;
        }

        Command::RenameDb { old_name, new_name } => {
            store.rename_database(&old_name, &new_name)?;
            print_output(
                &serde_json::json!({ "ok": true, "renamed": old_name, "to": new_name }),
                &cli.format,
            )?;
        }

        Command::DropDb { name } => {
            store.delete_database(&name)?;
            print_output(&serde_json::json!({ "ok": true, "deleted": name }), &cli.format)?;
        }

        Command::ListDbs => {
            let names = store.list_databases()?;
            print_output(&serde_json::json!(names), &cli.format)?;
        }

        Command::CreateTable { database, table } => {
            store.create_table(&database, &table)?;
            print_output(
                &serde_json::json!({ "ok": true, "created": format!("{database}/{table}") }),
                &cli.format,
            )?;
        }

        Command::RenameTable {
            database,
            old_name,
            new_name,
        } => {
            store.rename_table(&database, &old_name, &new_name)?;
            print_output(
                &serde_json::json!({
                    "ok": true,
                    "renamed": format!("{database}/{old_name}"),
                    "to": format!("{database}/{new_name}"),
                }),
                &cli.format,
            )?;
        }

        Command::DropTable { database, table } => {
            store.delete_table(&database, &table)?;
            print_output(
                &serde_json::json!({ "ok": true, "deleted": format!("{database}/{table}") }),
                &cli.format,
            )?;
        }

        Command::ListTables { database } => {
            let names = store.list_tables(&database)?;
            print_output(&serde_json::json!(names), &cli.format)?;
        }

        Command::Insert {
            database,
            table,
            json,
            fields,
        } => {
            let record = record_from_args(json.as_deref(), &fields)?;
            store.insert_dynamic(&database, &table, record)?;
            print_output(&serde_json::json!({ "ok": true }), &cli.format)?;
        }

        Command::Find { database, table } => {
            let records = store.find_dynamic(&database, &table)?;
            print_output(&records, &cli.format)?;
        }

        Command::Get {
            database,
            table,
            id,
        } => {
            let record = store.get_dynamic(&database, &table, &parse_value(&id))?;
            print_output(&record, &cli.format)?;
        }

        Command::Update {
            database,
            table,
            id,
            json,
            fields,
        } => {
            let patch = record_from_args(json.as_deref(), &fields)?;
            let id_value = parse_value(&id);
            match store.update_dynamic(&database, &table, &id_value, patch)? {
                UpdateOutcome::Updated(record) => print_output(
                    &serde_json::json!({ "ok": true, "updated": true, "record": record }),
                    &cli.format,
                )?,
                UpdateOutcome::NotFound => print_output(
                    &serde_json::json!({ "ok": true, "updated": false, "id": id_value }),
                    &cli.format,
                )?,
            }
        }

        Command::Delete {
            database,
            table,
            id,
            dry_run,
        } => {
            let id_value = parse_value(&id);
            if dry_run {
                let record = store.get_dynamic(&database, &table, &id_value)?;
                print_output(
                    &serde_json::json!({
                        "dry_run": true,
                        "would_delete": record,
                    }),
                    &cli.format,
                )?;
            } else {
                let removed = store.delete_dynamic(&database, &table, &id_value)?;
                print_output(
                    &serde_json::json!({ "ok": true, "deleted": removed }),
                    &cli.format,
                )?;
            }
        }

        Command::Watch { database, seconds } => {
            let watcher = store.watch(&database)?;
            let deadline = seconds.map(|s| std::time::Instant::now() + Duration::from_secs(s));
            loop {
                if deadline.is_some_and(|d| std::time::Instant::now() >= d) {
                    break;
                }
                match watcher.event_rx.recv_timeout(Duration::from_millis(250)) {
                    Ok(event) => print_output(
                        &serde_json::json!({
                            "table": event.table,
                            "change": format!("{:?}", event.kind).to_lowercase(),
                        }),
                        &OutputFormat::Json,
                    )?,
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        }
    }

    Ok(())
}

fn resolve_root(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var(ROOT_ENV).ok())
        .unwrap_or_else(|| ".".to_string())
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
        }
    }
    Ok(())
}

/// Try to parse as a JSON value (numbers, booleans, arrays, objects), falling
/// back to a plain string.
fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Build a record from `--json` and/or `--field` flags; fields override
/// keys of the same name in the JSON object.
fn record_from_args(
    json: Option<&str>,
    fields: &[(String, String)],
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let mut map = match json {
        Some(text) => match serde_json::from_str(text)? {
            serde_json::Value::Object(map) => map,
            _ => return Err("--json must be a JSON object".into()),
        },
        None => serde_json::Map::new(),
    };
    for (key, val) in fields {
        map.insert(key.clone(), parse_value(val));
    }
    Ok(serde_json::Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("item=a=b").unwrap(),
            ("item".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("no-equals").is_err());
    }

    #[test]
    fn test_parse_value_falls_back_to_string() {
        assert_eq!(parse_value("1"), json!(1));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("\"1\""), json!("1"));
        assert_eq!(parse_value("pen"), json!("pen"));
    }

    #[test]
    fn test_record_from_args_merges_fields_over_json() {
        let record = record_from_args(
            Some(r#"{"id": 1, "item": "pen"}"#),
            &[("item".to_string(), "pencil".to_string())],
        )
        .unwrap();
        assert_eq!(record, json!({ "id": 1, "item": "pencil" }));
    }

    #[test]
    fn test_record_from_args_rejects_non_object_json() {
        assert!(record_from_args(Some("[1]"), &[]).is_err());
    }

    #[test]
    fn test_cli_parses_insert() {
        let cli = Cli::try_parse_from([
            "dirdb", "--root", "/tmp/data", "insert", "shop", "orders", "--field", "id=1",
        ])
        .unwrap();
        assert_eq!(cli.root.as_deref(), Some("/tmp/data"));
        assert!(matches!(cli.command, Command::Insert { ref fields, .. } if fields.len() == 1));
    }
}
