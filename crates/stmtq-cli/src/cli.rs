//! stmtq: look up statement execution traces from the command line
//!
//! - `detail`: newest record of one statement
//! - `list`: one page of an account's statements in a request-time window
//!
//! Results are printed to stdout as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use stmtq_core::{Config, Connection};
use stmtq_driver_mysql::MySqlConnection;
use stmtq_query::{
    CallContext, CuJoinFilter, CuOptions, DEFAULT_LIMIT, SqlComment, StatementFilter,
    StatementLookup, StatementQuery, StatementStore, TimeRange,
};

mod logging;

use logging::LoggingConfig;

#[derive(Parser, Debug)]
#[command(name = "stmtq", about = "Query statement execution traces", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML configuration file
    #[arg(long, short, global = true, env = "STMTQ_CONFIG")]
    config: Option<PathBuf>,

    /// Database password, overriding the configuration file
    #[arg(long, global = true, env = "STMTQ_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Deadline for the whole call, in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Also write JSON logs with daily rotation to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log every executed statement
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the newest record of one statement
    Detail {
        /// Statement id
        #[arg(long)]
        id: String,
        #[arg(long)]
        account: String,
        /// Lower bound on request time
        #[arg(long, value_parser = parse_timestamp)]
        start: Option<NaiveDateTime>,
        /// Upper bound on request time
        #[arg(long, value_parser = parse_timestamp)]
        end: Option<NaiveDateTime>,
        /// Upper bound on the cost table's response time
        #[arg(long, value_parser = parse_timestamp)]
        response_end: Option<NaiveDateTime>,
        /// Include the compute-unit column
        #[arg(long)]
        cu: bool,
    },
    /// List an account's statements in a request-time window
    List {
        #[arg(long)]
        account: String,
        #[arg(long, value_parser = parse_timestamp)]
        start: NaiveDateTime,
        #[arg(long, value_parser = parse_timestamp)]
        end: NaiveDateTime,
        /// Only statements with this status
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value = "request_at desc")]
        order: String,
        /// Include the compute-unit column
        #[arg(long)]
        cu: bool,
        /// Only statements costing more than this many CU (needs --cu)
        #[arg(long)]
        min_cu: Option<u64>,
    },
}

/// Accepts `YYYY-MM-DD HH:MM:SS[.f]`, the same with a `T` separator, or a bare date
fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("invalid timestamp {:?}, expected YYYY-MM-DD HH:MM:SS", raw))
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stmtq").join("config.toml"))
}

/// Explicit path must exist; the default location is optional
fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = path {
        return Config::load(path).with_context(|| format!("failed to read {}", path.display()));
    }
    match default_config_path() {
        Some(path) if path.exists() => {
            Config::load(&path).with_context(|| format!("failed to read {}", path.display()))
        }
        _ => Ok(Config::default()),
    }
}

fn build_request(command: &Commands, config: &Config) -> anyhow::Result<Request> {
    let comment = SqlComment::new(config.query.sql_comment.as_str());

    let request = match command {
        Commands::Detail {
            id,
            account,
            start,
            end,
            response_end,
            cu,
        } => Request::Detail(
            StatementLookup::new(id.as_str(), account.as_str())
                .with_request_at(TimeRange::new(*start, *end))
                .with_response_end(*response_end)
                .with_cu(CuOptions::new(*cu, config.query.enable_statement_cu))
                .with_comment(comment),
        ),
        Commands::List {
            account,
            start,
            end,
            status,
            limit,
            offset,
            order,
            cu,
            min_cu,
        } => {
            let mut filter = StatementFilter::new()
                .account(account.as_str())
                .request_at(TimeRange::new(Some(*start), Some(*end)));
            if let Some(status) = status {
                filter = filter.status(status.as_str());
            }
            let predicate = filter.to_predicate().context("invalid filter")?;
            let join_predicate = CuJoinFilter::new()
                .account(account.as_str())
                .response_at(TimeRange::new(Some(*start), None))
                .to_predicate();

            let mut query = StatementQuery::new(predicate)
                .with_join_predicate(join_predicate)
                .with_order_by(order.as_str())
                .with_page(*limit, *offset)
                .with_cu(CuOptions::new(*cu, config.query.enable_statement_cu))
                .with_comment(comment);
            if let Some(min_cu) = min_cu {
                query = query.with_min_cu(*min_cu);
            }
            Request::List(query)
        }
    };
    Ok(request)
}

enum Request {
    Detail(StatementLookup),
    List(StatementQuery),
}

async fn run(store: &StatementStore, ctx: &CallContext, request: &Request) -> anyhow::Result<String> {
    let json = match request {
        Request::Detail(lookup) => {
            let record = store
                .select_by_statement_id(ctx, lookup)
                .await
                .context("detail lookup failed")?;
            serde_json::to_string_pretty(&record)?
        }
        Request::List(query) => {
            let page = store
                .select_statements(ctx, query)
                .await
                .context("statement listing failed")?;
            serde_json::to_string_pretty(&page)?
        }
    };
    Ok(json)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::default()
    };
    let _log_guard = logging::init(log_config.with_log_dir(cli.log_dir.clone()))?;

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(password) = cli.password {
        config.database.password = password;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.query.timeout_ms = Some(timeout_ms);
    }

    let request = build_request(&cli.command, &config)?;

    let conn: Arc<dyn Connection> = Arc::new(
        MySqlConnection::connect(&config.database)
            .await
            .with_context(|| format!("failed to connect to {}:{}", config.database.host, config.database.port))?,
    );
    let store = StatementStore::from_config(conn.clone(), &config.query);
    let ctx = CallContext::from_config(&config.query);

    let outcome = run(&store, &ctx, &request).await;
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "failed to close connection pool");
    }

    println!("{}", outcome?);
    Ok(())
}
