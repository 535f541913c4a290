//!
//! qsql command line client
//! -------------------------
//! One-shot and interactive client for a remote QuayDB server. Connects over
//! the HTTP SQL API, runs queries or updates, renders results as an ASCII
//! table, and exposes transaction controls in REPL mode.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use quaydb_client::cli::print_cursor;
use quaydb_client::{Connection, IsolationLevel, SessionConfig};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} --connect <url> --user <u> --password <p> [--database <db>] --query \"<SQL>\"\n  {program} --connect <url> --user <u> --password <p> [--database <db>] --repl\n\nFlags:\n  --connect <url>          QuayDB server base URL (http or https)\n  --user <u>               Username\n  --password <p>           Password\n  --database <db>          Database name (default: default)\n  --gzip                   Negotiate gzip-compressed result payloads\n  --trace                  Log every request at info level\n  --max-rows <n>           Default row cap for queries (0 = uncapped)\n  --timeout <secs>         Read timeout per request (default 120)\n  -q, --query <SQL>        Run one statement and exit\n  --repl                   Start the interactive interpreter\n  -h, --help               Show this help\n\nInteractive commands:\n  commit | rollback                 transaction control\n  autocommit on|off                 toggle autocommit\n  isolation <level>                 READ_UNCOMMITTED/READ_COMMITTED/REPEATABLE_READ/SERIALIZABLE\n  metadata <topic>                  fetch server metadata as a table\n  status                            show connection info\n  help                              show this help\n  quit | exit                       close the session and exit\n  <SQL>                             run a statement remotely\n\nExamples:\n  {program} --connect http://127.0.0.1:7878 --user quay --password quay -q \"SELECT * FROM demo\"\n  {program} --connect https://db.example.com --user quay --password quay --gzip --repl"
    );
}

/// Query-shaped statements get a cursor; everything else an update count.
fn expects_rows(sql: &str) -> bool {
    let head = sql.trim_start().split_whitespace().next().unwrap_or("").to_ascii_uppercase();
    matches!(head.as_str(), "SELECT" | "SHOW" | "WITH" | "DESCRIBE" | "EXPLAIN" | "VALUES")
}

async fn run_statement(conn: &mut Connection, sql: &str) -> Result<()> {
    if expects_rows(sql) {
        let mut cursor = conn.query(sql).await?;
        print_cursor(&mut cursor)?;
        cursor.close();
    } else {
        let count = conn.update(sql).await?;
        println!("update count: {count}");
    }
    Ok(())
}

fn parse_isolation(token: &str) -> Option<IsolationLevel> {
    Some(match token.to_ascii_uppercase().as_str() {
        "READ_UNCOMMITTED" => IsolationLevel::ReadUncommitted,
        "READ_COMMITTED" => IsolationLevel::ReadCommitted,
        "REPEATABLE_READ" => IsolationLevel::RepeatableRead,
        "SERIALIZABLE" => IsolationLevel::Serializable,
        _ => return None,
    })
}

async fn repl(mut conn: Connection, url: &str, user: &str) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    loop {
        match rl.readline("qsql> ") {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);
                let lower = line.to_ascii_lowercase();
                if lower == "quit" || lower == "exit" {
                    break;
                } else if lower == "help" {
                    print_usage("qsql");
                } else if lower == "status" {
                    println!(
                        "connected to {url} as {user}, autocommit={}, isolation={}",
                        conn.session().autocommit(),
                        conn.session().isolation().wire_token()
                    );
                } else if lower == "commit" {
                    match conn.commit().await {
                        Ok(()) => println!("committed"),
                        Err(e) => eprintln!("error: {e}"),
                    }
                } else if lower == "rollback" {
                    match conn.rollback().await {
                        Ok(()) => println!("rolled back"),
                        Err(e) => eprintln!("error: {e}"),
                    }
                } else if let Some(rest) = lower.strip_prefix("autocommit ") {
                    let flag = rest.trim() == "on";
                    match conn.set_auto_commit(flag).await {
                        Ok(()) => println!("autocommit={flag}"),
                        Err(e) => eprintln!("error: {e}"),
                    }
                } else if let Some(rest) = line.to_ascii_uppercase().strip_prefix("ISOLATION ") {
                    match parse_isolation(rest.trim()) {
                        Some(level) => match conn.set_isolation(level).await {
                            Ok(()) => println!("isolation={}", level.wire_token()),
                            Err(e) => eprintln!("error: {e}"),
                        },
                        None => eprintln!("unknown isolation level: {}", rest.trim()),
                    }
                } else if let Some(topic) = line.strip_prefix("metadata ") {
                    match conn.metadata(topic.trim()).await {
                        Ok(mut cursor) => {
                            let _ = print_cursor(&mut cursor);
                            cursor.close();
                        }
                        Err(e) => eprintln!("error: {e}"),
                    }
                } else if let Err(e) = run_statement(&mut conn, &line).await {
                    eprintln!("error: {e}");
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }
    conn.close().await.ok();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("QuayDB command line client");
    // Initialize tracing so request traces are visible on the command line
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);

    let mut url: Option<String> = None;
    let mut user: Option<String> = None;
    let mut password: Option<String> = None;
    let mut database: String = "default".to_string();
    let mut query: Option<String> = None;
    let mut repl_mode = false;
    let mut gzip = false;
    let mut trace = false;
    let mut max_rows: u32 = 0;
    let mut timeout_secs: u64 = 120;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--connect" => {
                if i + 1 >= args.len() { eprintln!("--connect requires a URL"); print_usage(&program); std::process::exit(2); }
                url = Some(args[i + 1].clone());
                i += 2; continue;
            }
            "--user" => {
                if i + 1 >= args.len() { eprintln!("--user requires a value"); print_usage(&program); std::process::exit(2); }
                user = Some(args[i + 1].clone());
                i += 2; continue;
            }
            "--password" => {
                if i + 1 >= args.len() { eprintln!("--password requires a value"); print_usage(&program); std::process::exit(2); }
                password = Some(args[i + 1].clone());
                i += 2; continue;
            }
            "--database" => {
                if i + 1 >= args.len() { eprintln!("--database requires a value"); print_usage(&program); std::process::exit(2); }
                database = args[i + 1].clone();
                i += 2; continue;
            }
            "--query" | "-q" => {
                if i + 1 >= args.len() { eprintln!("--query requires a value"); print_usage(&program); std::process::exit(2); }
                query = Some(args[i + 1].clone());
                i += 2; continue;
            }
            "--max-rows" => {
                if i + 1 >= args.len() { eprintln!("--max-rows requires a value"); print_usage(&program); std::process::exit(2); }
                max_rows = args[i + 1].parse().context("--max-rows must be a number")?;
                i += 2; continue;
            }
            "--timeout" => {
                if i + 1 >= args.len() { eprintln!("--timeout requires a value"); print_usage(&program); std::process::exit(2); }
                timeout_secs = args[i + 1].parse().context("--timeout must be seconds")?;
                i += 2; continue;
            }
            "--repl" => { repl_mode = true; i += 1; continue; }
            "--gzip" => { gzip = true; i += 1; continue; }
            "--trace" => { trace = true; i += 1; continue; }
            "-h" | "--help" => {
                print_usage(&program);
                return Ok(());
            }
            other => {
                eprintln!("unknown flag: {other}");
                print_usage(&program);
                std::process::exit(2);
            }
        }
    }

    let url = url.context("--connect <url> is required")?;
    let user = user.context("--user is required")?;
    let password = password.context("--password is required")?;

    let mut config = SessionConfig::default()
        .with_gzip(gzip)
        .with_trace_requests(trace)
        .with_timeouts(Duration::from_secs(10), Duration::from_secs(timeout_secs));
    config.max_rows = max_rows;

    let mut conn = Connection::open(config, &url, &database, &user, &password)
        .await
        .with_context(|| format!("connect to {url} failed"))?;
    println!("connected to {url} as {user} (database {database})");

    if repl_mode {
        return repl(conn, &url, &user).await;
    }

    let sql = match query {
        Some(q) => q,
        None => {
            eprintln!("nothing to do: pass --query or --repl");
            conn.close().await.ok();
            print_usage(&program);
            std::process::exit(2);
        }
    };
    let outcome = run_statement(&mut conn, &sql).await;
    conn.close().await.ok();
    outcome
}
