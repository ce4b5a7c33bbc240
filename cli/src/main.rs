mod display;
mod menu;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{theme::ColorfulTheme, Confirm};
use serde_json::Value;
use tablegate::{BindValue, ConnectionConfig, Crud, DbPool, Record, TableAccessor};

#[derive(Parser, Debug)]
#[command(name = "tablegate-cli")]
#[command(about = "Browse and edit a single database table from the terminal")]
#[command(version)]
struct Args {
    /// Table to operate on
    #[arg(short, long, env = "GATEWAY_TABLE", default_value = "hospital_records")]
    table: String,

    /// Database URL (defaults to DATABASE_URL / SUPABASE_POOLER)
    #[arg(short, long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the connection and print the database time
    Ping,
    /// Show every row
    List,
    /// Show rows matching column=value filters
    Filter {
        #[arg(short = 'w', long = "where", value_parser = parse_pair, required = true)]
        filters: Vec<(String, String)>,
    },
    /// Insert one row
    Insert {
        #[arg(short = 's', long = "set", value_parser = parse_pair, required = true)]
        data: Vec<(String, String)>,
    },
    /// Update rows matching the filters
    Update {
        #[arg(short = 's', long = "set", value_parser = parse_pair, required = true)]
        data: Vec<(String, String)>,
        #[arg(short = 'w', long = "where", value_parser = parse_pair, required = true)]
        filters: Vec<(String, String)>,
    },
    /// Delete rows matching the filters
    Delete {
        #[arg(short = 'w', long = "where", value_parser = parse_pair, required = true)]
        filters: Vec<(String, String)>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Run raw SQL without any column checks
    Query {
        sql: String,
        /// Positional parameters; JSON literals (42, true, null) keep their type
        #[arg(short, long = "param")]
        params: Vec<String>,
    },
    /// Interactive menu (default)
    Menu,
}

/// `column=value`
fn parse_pair(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() => {
            Ok((column.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected column=value, got '{}'", s)),
    }
}

/// 原始 SQL 的参数：能解析成 JSON 标量的按标量绑定，其余按字符串
fn parse_param(s: &str) -> BindValue {
    serde_json::from_str::<Value>(s)
        .ok()
        .and_then(|value| BindValue::from_json(&value))
        .unwrap_or_else(|| BindValue::String(s.to_string()))
}

fn to_record(pairs: Vec<(String, String)>) -> Record {
    pairs.into_iter().collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();

    let db_config = match &args.database_url {
        Some(url) => ConnectionConfig::from_lookup(|key| match key {
            "DATABASE_URL" => Some(url.clone()),
            _ => std::env::var(key).ok(),
        }),
        None => ConnectionConfig::from_env(),
    }
    .context("Invalid database configuration")?;

    println!("🔌 Connecting to {}...", db_config.summary());
    let pool = DbPool::connect(&db_config)
        .await
        .context("Failed to connect to database")?;
    println!("✅ Connected to {:?} database", pool.driver());

    let table = TableAccessor::open(pool.clone(), &args.table)
        .await
        .with_context(|| format!("Failed to open table '{}'", args.table))?;

    let result = run(&table, args.command.unwrap_or(Command::Menu)).await;
    pool.close().await;
    result
}

async fn run(table: &TableAccessor, command: Command) -> Result<()> {
    match command {
        Command::Ping => {
            let now = table.ping().await?;
            println!("✅ Database time: {}", now);
        }
        Command::List => {
            let rows = table.select_all().await?;
            print!("{}", display::render_table(table.table_name(), &rows));
        }
        Command::Filter { filters } => {
            let rows = table.select(&to_record(filters)).await?;
            let title = format!("{} (Filtered)", table.table_name());
            print!("{}", display::render_table(&title, &rows));
        }
        Command::Insert { data } => {
            let row = table.insert(&to_record(data)).await?;
            println!("✅ Successfully inserted record!");
            println!("Returned data:");
            print!("{}", display::render_row(&row));
        }
        Command::Update { data, filters } => {
            let result = table.update(&to_record(data), &to_record(filters)).await?;
            println!("✅ Updated {} record(s)", result.rows_affected);
            if !result.rows.is_empty() {
                print!("{}", display::render_table(table.table_name(), &result.rows));
            }
        }
        Command::Delete { filters, yes } => {
            let filters = to_record(filters);
            if !yes && !confirm_delete(table.table_name())? {
                println!("❌ Delete cancelled");
                return Ok(());
            }
            let result = table.delete(&filters).await?;
            println!("✅ Deleted {} record(s)", result.rows_affected);
        }
        Command::Query { sql, params } => {
            let params: Vec<BindValue> = params.iter().map(|p| parse_param(p)).collect();
            let output = table.query(&sql, &params).await?;
            if output.rows.is_empty() {
                println!("✅ {} row(s) affected", output.row_count);
            } else {
                print!("{}", display::render_table("query", &output.rows));
            }
        }
        Command::Menu => menu::run(table).await?,
    }
    Ok(())
}

pub(crate) fn confirm_delete(table: &str) -> Result<bool> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("⚠️  Delete matching records from '{}'?", table))
        .default(false)
        .interact()
        .context("Failed to get user input")
}

/// 至少要有一个 `column=value`
pub(crate) fn require_pairs(pairs: &[(String, String)], what: &str) -> Result<()> {
    if pairs.is_empty() {
        bail!("At least one {} is required", what);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            parse_pair("name=John Smith").unwrap(),
            ("name".to_string(), "John Smith".to_string())
        );
        assert_eq!(
            parse_pair("expr=a=b").unwrap(),
            ("expr".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_pair("empty=").unwrap().1, "");
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=x").is_err());
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("42"), BindValue::Int64(42));
        assert_eq!(parse_param("true"), BindValue::Bool(true));
        assert_eq!(parse_param("null"), BindValue::Null);
        assert_eq!(parse_param("John"), BindValue::String("John".to_string()));
        assert_eq!(
            parse_param(r#"{"a":1}"#),
            BindValue::String(r#"{"a":1}"#.to_string())
        );
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "tablegate-cli",
            "--table",
            "wards",
            "update",
            "-s",
            "beds=4",
            "-w",
            "code=A1",
        ])
        .unwrap();
        assert_eq!(args.table, "wards");
        match args.command {
            Some(Command::Update { data, filters }) => {
                assert_eq!(data, vec![("beds".to_string(), "4".to_string())]);
                assert_eq!(filters, vec![("code".to_string(), "A1".to_string())]);
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Args::try_parse_from(["tablegate-cli", "delete"]).is_err());
        let args = Args::try_parse_from(["tablegate-cli"]).unwrap();
        assert!(args.command.is_none());
    }

    #[test]
    fn test_require_pairs() {
        assert!(require_pairs(&[], "filter").is_err());
        assert!(require_pairs(&[("a".into(), "1".into())], "filter").is_ok());
    }
}
