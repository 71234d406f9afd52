//! exql: query compiler CLI
//!
//! Compiles textual queries over a model schema to SQL, and optionally runs
//! them against a SQLite or Postgres database.
//!
//! # Usage
//!
//! ```bash
//! # Show the generated SQL only (T-SQL unless --dialect says otherwise)
//! exql "Customers.Where(c => c.Age > 30).Take(5)" --schema models.toml --dry-run
//! exql "Customers.Take(5)" --schema models.toml --dry-run --dialect postgres
//!
//! # Execute; the dialect follows the database URL
//! exql "Customers.Count()" --schema models.toml --database-url sqlite://shop.db
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use exql::engine::fetch_raw;
use exql::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "exql")]
#[command(version)]
#[command(about = "Compile expression-tree queries to SQL and run them", long_about = None)]
#[command(after_help = "EXAMPLES:
    exql 'Customers.Where(c => c.City == \"Oslo\").Select(c => new { c.Name })' -s models.toml --dry-run
    exql 'Orders.GroupBy(o => o.CustomerId).Select(g => new { Id = g.Key, N = g.Count() })' -s models.toml
    exql explain 'Customers.OrderBy(c => c.Name).First()' -s models.toml --dialect sqlite")]
struct Cli {
    /// The query to compile
    query: Option<String>,

    /// Model schema file (TOML)
    #[arg(short, long, env = "EXQL_SCHEMA")]
    schema: Option<PathBuf>,

    /// Don't execute, just show the generated SQL
    #[arg(short, long)]
    dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Database connection URL (sqlite: or postgres:)
    #[arg(long, env = "EXQL_DATABASE_URL")]
    database_url: Option<String>,

    /// SQL dialect for generated statements: sqlserver, sqlite or postgres
    #[arg(long)]
    dialect: Option<Dialect>,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the expression tree, row shape and SQL of a query
    Explain {
        /// The query to explain
        query: String,
    },
    /// List the models declared in the schema
    Models,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "exql=debug" } else { "exql=warn" };
    let filter = EnvFilter::try_from_env("EXQL_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = ExqlConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dialect) = cli.dialect {
        config.compiler.dialect = dialect;
    }
    let schema = load_schema(cli, &config)?;

    match &cli.command {
        Some(Commands::Explain { query }) => explain_query(query, &schema, &config.compiler),
        Some(Commands::Models) => {
            show_models(&schema);
            Ok(())
        }
        None => match &cli.query {
            Some(query) => execute_query(query, &schema, &config, cli),
            None => {
                println!("{}", "exql: expression-tree query compiler".cyan().bold());
                println!();
                println!("Usage: exql <QUERY> --schema <FILE> [OPTIONS]");
                println!();
                println!("Try: exql --help");
                Ok(())
            }
        },
    }
}

fn load_schema(cli: &Cli, config: &ExqlConfig) -> Result<Schema> {
    let path = cli
        .schema
        .clone()
        .or_else(|| config.schema_path.as_ref().map(PathBuf::from));
    match path {
        Some(path) => Schema::load(&path).with_context(|| format!("loading schema {}", path.display())),
        None => Ok(Schema::new()),
    }
}

fn execute_query(query: &str, schema: &Schema, config: &ExqlConfig, cli: &Cli) -> Result<()> {
    if cli.verbose {
        println!("{} {}", "Input:".dimmed(), query.yellow());
    }

    let expr = exql::parse(query, schema)?;
    let database_url = cli.database_url.clone().or_else(|| config.database_url.clone());
    let Some(database_url) = database_url.filter(|_| !cli.dry_run) else {
        let query = Query::<Record>::new(expr).with_options(config.compiler.clone());
        let sql = query.sql()?;
        println!("{}", "Generated SQL:".green().bold());
        println!("{}", sql.white());

        if !cli.dry_run {
            println!();
            println!(
                "{}",
                "⚠ No database URL. Use --database-url or set EXQL_DATABASE_URL".yellow()
            );
        }
        return Ok(());
    };

    let mut source = DatabaseSource::new(&database_url)?;
    let options = CompilerOptions {
        dialect: source.dialect(),
        ..config.compiler.clone()
    };
    let query = Query::<Record>::new(expr).with_options(options);
    let sql = query.sql()?.to_string();

    if cli.verbose {
        println!("{} {}", "Connecting to:".dimmed(), database_url);
        println!("{} {}", "SQL:".dimmed(), sql);
    }

    match query.compile()?.mode() {
        ResultMode::Count => {
            let n = query.count(&mut source)?;
            println!("{}", n.to_string().cyan());
        }
        ResultMode::Aggregate => {
            let value = query.scalar(&mut source)?;
            match cli.format {
                OutputFormat::Json => println!("{}", value.to_json()),
                OutputFormat::Table => println!("{}", value.to_string().cyan()),
            }
        }
        ResultMode::Rows | ResultMode::First => {
            let results = fetch_raw(&mut source, &sql)?;
            format_output(&results, &cli.format);
        }
    }

    Ok(())
}

fn format_output(results: &ResultSet, format: &OutputFormat) {
    if results.rows.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = results
                .rows
                .iter()
                .map(|row| {
                    let object = results
                        .columns
                        .iter()
                        .zip(row)
                        .map(|(column, value)| (column.clone(), value.to_json()))
                        .collect::<serde_json::Map<_, _>>();
                    serde_json::Value::Object(object)
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_default());
        }
        OutputFormat::Table => {
            let mut widths: Vec<usize> = results.columns.iter().map(|c| c.len()).collect();
            for row in &results.rows {
                for (width, value) in widths.iter_mut().zip(row) {
                    *width = (*width).max(cell(value).len());
                }
            }

            let header: Vec<String> = results
                .columns
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:width$}", c, width = w))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in &results.rows {
                let cells: Vec<String> = row
                    .iter()
                    .zip(&widths)
                    .map(|(v, w)| format!("{:width$}", cell(v), width = w))
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", results.rows.len().to_string().cyan());
        }
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

fn explain_query(query: &str, schema: &Schema, options: &CompilerOptions) -> Result<()> {
    println!("{}", "exql query explanation".cyan().bold());
    println!();
    println!("{} {}", "Query:".dimmed(), query.yellow());
    println!();

    let expr = match exql::parse(query, schema) {
        Ok(expr) => expr,
        Err(e) => {
            if let ExqlError::Parse { position, .. } = &e {
                eprintln!("  {}", query);
                eprintln!("  {}{}", " ".repeat(*position), "^".red().bold());
            }
            bail!("{}", e);
        }
    };

    println!("{}", "Expression Tree:".green().bold());
    println!("{:#?}", expr);
    println!();

    let compiled = exql::compile(&expr, options)?;
    println!("{}", "Result:".green().bold());
    println!("  {} {}", "Dialect:".dimmed(), options.dialect);
    println!("  {} {:?}", "Mode:".dimmed(), compiled.mode());
    println!("  {} {}", "Shape:".dimmed(), describe_shape(compiled.shape()).cyan());
    if let Some(top) = compiled.top_limit() {
        println!("  {} {}", "Top:".dimmed(), top);
    }
    if compiled.is_distinct() {
        println!("  {}", "Distinct".dimmed());
    }

    println!();
    println!("{}", "Generated SQL:".green().bold());
    println!("  {}", compiled.sql().white());
    Ok(())
}

fn describe_shape(shape: &RowShape) -> String {
    match shape {
        RowShape::Entity(model) => format!("entity {}", model.type_name()),
        RowShape::Named { model, members } => format!("{} {{ {} }}", model.type_name(), members.join(", ")),
        RowShape::Positional { model } => format!("{}(..) positional", model.type_name()),
        RowShape::Scalar(Some(value_type)) => format!("scalar {}", value_type),
        RowShape::Scalar(None) => "scalar".to_string(),
    }
}

fn show_models(schema: &Schema) {
    if schema.models().is_empty() {
        println!("{}", "(no models; pass --schema)".dimmed());
        return;
    }

    for model in schema.models() {
        println!("{} {} {}", model.type_name().cyan().bold(), "→".dimmed(), model.table().white());
        for field in model.fields() {
            let kind = field.value_type().map(|t| t.to_string()).unwrap_or_else(|| "?".to_string());
            let key = if model.primary_key() == Some(field.name()) { " (key)" } else { "" };
            if field.name() == field.column() {
                println!("    {:16} {}{}", field.name().white(), kind.yellow(), key.dimmed());
            } else {
                println!(
                    "    {:16} {}{} {} {}",
                    field.name().white(),
                    kind.yellow(),
                    key.dimmed(),
                    "column".dimmed(),
                    field.column()
                );
            }
        }
    }
}
