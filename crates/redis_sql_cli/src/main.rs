//! Command-line client that runs pseudo-SQL statements against Redis.
//!
//! Each statement is a Redis command line, optionally preceded by hint
//! lines (`-- sample_key: user:1`). Results print as a tab-separated table
//! with a header row, or as one JSON object per row with `--json`.

use std::io::{IsTerminal, Read, Write};

use anyhow::Context;
use clap::{Parser, Subcommand};
use redis_sql::config::parse_node_list;
use redis_sql::{ClusterConfig, Connection, ConnectionOptions, Cursor, NodeConfig};
use serde::Serialize;

/// CLI entry point wrapper.
#[derive(Parser, Debug)]
#[command(name = "redis-sql")]
struct Args {
    /// Comma-separated Redis endpoints, e.g. `127.0.0.1:6379`. Cluster mode
    /// treats them as discovery seeds.
    #[arg(long, default_value = "127.0.0.1:6379")]
    nodes: String,

    /// Route commands through a slot-aware cluster client.
    #[arg(long)]
    cluster: bool,

    /// Logical database selected on connect (single node only).
    #[arg(long, default_value_t = 0)]
    db: i64,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Print one JSON object per row instead of a table.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute each argument as one statement.
    Exec {
        #[arg(required = true)]
        statements: Vec<String>,
    },
    /// Read statements from stdin, separated by blank lines.
    Shell,
}

/// One printed row in `--json` mode.
#[derive(Serialize, Debug)]
struct RowRecord<'a> {
    statement: &'a str,
    row: usize,
    columns: serde_json::Map<String, serde_json::Value>,
}

fn main() -> anyhow::Result<()> {
    // Enable ANSI colors only when stdout is a terminal and NO_COLOR is unset.
    let ansi = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "redis_sql=info,warn".into()),
        )
        .init();

    let args = Args::parse();
    let conn = connect(&args)?;
    let result = match &args.cmd {
        Command::Exec { statements } => exec(&conn, statements, args.json),
        Command::Shell => shell(&conn, args.json),
    };
    conn.close().context("close connection")?;
    result
}

fn connect(args: &Args) -> anyhow::Result<Connection> {
    let nodes = parse_node_list(&args.nodes).context("invalid --nodes")?;
    let options = ConnectionOptions::from_env();
    if args.cluster {
        let config = ClusterConfig {
            seeds: nodes,
            username: args.username.clone(),
            password: args.password.clone(),
            ..ClusterConfig::default()
        };
        return Connection::open_cluster(config, options).context("connect to cluster");
    }

    anyhow::ensure!(
        nodes.len() == 1,
        "--nodes must name exactly one endpoint unless --cluster is set"
    );
    let config = NodeConfig {
        addr: nodes[0].clone(),
        db_index: args.db,
        username: args.username.clone(),
        password: args.password.clone(),
        ..NodeConfig::default()
    };
    Connection::open(&config, options).with_context(|| format!("connect to {}", config.addr))
}

fn exec(conn: &Connection, statements: &[String], json: bool) -> anyhow::Result<()> {
    let mut statement = conn.create_statement()?;
    let mut out = std::io::stdout().lock();
    for (i, text) in statements.iter().enumerate() {
        if i > 0 && !json {
            writeln!(out)?;
        }
        let cursor = statement
            .execute_query(text)
            .with_context(|| format!("execute {text:?}"))?;
        print_cursor(&mut out, text, cursor, json)?;
    }
    statement.close();
    Ok(())
}

fn shell(conn: &Connection, json: bool) -> anyhow::Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("read statements from stdin")?;

    let mut statement = conn.create_statement()?;
    let mut out = std::io::stdout().lock();
    let mut failures = 0usize;
    for (i, text) in split_blocks(&input).iter().enumerate() {
        if i > 0 && !json {
            writeln!(out)?;
        }
        match statement.execute_query(text) {
            Ok(cursor) => print_cursor(&mut out, text, cursor, json)?,
            Err(err) => {
                failures += 1;
                tracing::error!(statement = %text, error = %err, "statement failed");
            }
        }
    }
    statement.close();
    anyhow::ensure!(failures == 0, "{failures} statement(s) failed");
    Ok(())
}

/// Splits input into statements at blank lines, keeping hint lines attached
/// to the command that follows them.
fn split_blocks(input: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in input.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }
    blocks
}

fn print_cursor(
    out: &mut impl Write,
    statement: &str,
    cursor: &mut Cursor,
    json: bool,
) -> anyhow::Result<()> {
    let metadata = cursor.metadata()?;
    let labels: Vec<String> = metadata.columns().iter().map(|c| c.label.clone()).collect();
    if !json {
        writeln!(out, "{}", labels.join("\t"))?;
    }

    let mut row = 0usize;
    while cursor.advance()? {
        let mut cells = Vec::with_capacity(labels.len());
        for index in 1..=labels.len() {
            cells.push(read_cell(cursor, index));
        }
        if json {
            let columns = labels
                .iter()
                .cloned()
                .zip(cells.into_iter().map(|cell| {
                    cell.map_or(serde_json::Value::Null, serde_json::Value::String)
                }))
                .collect();
            let record = RowRecord {
                statement,
                row,
                columns,
            };
            serde_json::to_writer(&mut *out, &record).context("serialize row")?;
            writeln!(out)?;
        } else {
            let line: Vec<String> = cells
                .into_iter()
                .map(|cell| cell.unwrap_or_else(|| "NULL".to_string()))
                .collect();
            writeln!(out, "{}", line.join("\t"))?;
        }
        row += 1;
    }
    cursor.close();
    Ok(())
}

/// Reads one cell as text; a cell that fails to decode or convert prints
/// as `#ERR` and is logged.
fn read_cell(cursor: &mut Cursor, index: usize) -> Option<String> {
    match cursor.get_string(index) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(column = index, error = %err, "cannot read cell");
            Some("#ERR".to_string())
        }
    }
}
