//! Outbox CLI - Operator interface for the offline sync engine
//!
//! Inspect and drive the durable queue: enqueue requests, run dispatch
//! passes, and arbitrate conflicts from the terminal.

use std::collections::HashMap;
use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use outbox_core::connectivity::SharedProbe;
use outbox_core::models::{ConflictRecord, OfflineRecord};
use outbox_core::oracle::HttpVersionOracle;
use outbox_core::transport::ReqwestTransport;
use outbox_core::{
    ConflictId, EngineConfig, HttpMethod, OperationId, OperationStatus, Resolution, SyncEngine,
    SyncOperation,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "outbox")]
#[command(about = "Inspect and drive the offline sync queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a mutating request for later delivery
    #[command(alias = "add")]
    Queue {
        /// Target URL
        url: String,
        /// HTTP method
        #[arg(short, long, default_value = "POST")]
        method: String,
        /// JSON body (reads piped stdin when omitted)
        #[arg(short, long)]
        data: Option<String>,
        /// Request header, KEY=VALUE, repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Entity type for version tracking, e.g. Note
        #[arg(long, requires = "entity_id")]
        entity_type: Option<String>,
        /// Entity id for version tracking
        #[arg(long, requires = "entity_type")]
        entity_id: Option<String>,
    },
    /// List queued operations
    List {
        /// Filter by status
        #[arg(short, long, value_enum)]
        status: Option<StatusFilter>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Put a failed operation back in line
    Retry {
        /// Operation ID
        id: String,
    },
    /// Remove an operation from the queue
    Delete {
        /// Operation ID
        id: String,
    },
    /// Dispatch the pending backlog
    Sync,
    /// Show queue and conflict counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List conflicts awaiting arbitration
    Conflicts {
        /// Include recently resolved conflicts
        #[arg(short, long)]
        all: bool,
        /// Number of conflicts in the audit listing
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Arbitrate a conflict
    Resolve {
        /// Conflict ID
        id: String,
        /// Which side wins
        #[arg(value_enum)]
        resolution: ResolutionArg,
        /// Replacement JSON payload, required for manual resolution
        #[arg(short, long)]
        data: Option<String>,
    },
    /// Read or write the TTL cache
    Cache {
        /// Cache key
        key: String,
        /// JSON value to store (reads the entry when omitted)
        #[arg(short, long)]
        value: Option<String>,
        /// Time-to-live in seconds for a write
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Stash or list offline scratch data
    Offline {
        /// Logical collection name
        store: String,
        /// JSON payload to stash (lists the collection when omitted)
        #[arg(short, long)]
        data: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] outbox_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Target URL cannot be empty")]
    EmptyUrl,
    #[error("Unknown HTTP method: {0}")]
    UnknownMethod(String),
    #[error("Invalid header (expected KEY=VALUE): {0}")]
    InvalidHeader(String),
    #[error("Invalid ID: {0}")]
    InvalidId(String),
    #[error("Operation not found: {0}")]
    OperationNotFound(String),
    #[error("Conflict not found: {0}")]
    ConflictNotFound(String),
    #[error("Manual resolution requires --data with a JSON payload")]
    MissingManualData,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum StatusFilter {
    Pending,
    Processing,
    Completed,
    Failed,
    Conflict,
    Superseded,
}

impl From<StatusFilter> for OperationStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Pending => Self::Pending,
            StatusFilter::Processing => Self::Processing,
            StatusFilter::Completed => Self::Completed,
            StatusFilter::Failed => Self::Failed,
            StatusFilter::Conflict => Self::Conflict,
            StatusFilter::Superseded => Self::Superseded,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum ResolutionArg {
    Client,
    Server,
    Manual,
}

impl From<ResolutionArg> for Resolution {
    fn from(arg: ResolutionArg) -> Self {
        match arg {
            ResolutionArg::Client => Self::Client,
            ResolutionArg::Server => Self::Server,
            ResolutionArg::Manual => Self::Manual,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("outbox=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Some(Commands::Queue {
            url,
            method,
            data,
            headers,
            entity_type,
            entity_id,
        }) => {
            run_queue(
                &url,
                &method,
                data.as_deref(),
                &headers,
                entity_type.zip(entity_id),
                &db_path,
            )
            .await?;
        }
        Some(Commands::List { status, json }) => run_list(status, json, &db_path).await?,
        Some(Commands::Retry { id }) => run_retry(&id, &db_path).await?,
        Some(Commands::Delete { id }) => run_delete(&id, &db_path).await?,
        Some(Commands::Sync) => run_sync(&db_path).await?,
        Some(Commands::Status { json }) => run_status(json, &db_path).await?,
        Some(Commands::Conflicts { all, limit, json }) => {
            run_conflicts(all, limit, json, &db_path).await?;
        }
        Some(Commands::Resolve {
            id,
            resolution,
            data,
        }) => run_resolve(&id, resolution, data.as_deref(), &db_path).await?,
        Some(Commands::Cache {
            key,
            value,
            ttl_secs,
        }) => run_cache(&key, value.as_deref(), ttl_secs, &db_path).await?,
        Some(Commands::Offline { store, data, json }) => {
            run_offline(&store, data.as_deref(), json, &db_path).await?;
        }
        None => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
        }
    }

    Ok(())
}

async fn run_queue(
    url: &str,
    method: &str,
    data: Option<&str>,
    headers: &[String],
    entity: Option<(String, String)>,
    db_path: &Path,
) -> Result<(), CliError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(CliError::EmptyUrl);
    }
    let method = parse_method(method)?;
    let body = resolve_body(data)?;
    let headers = parse_headers(headers)?;
    let entity = entity.map(|(entity_type, entity_id)| {
        outbox_core::EntityKey::new(entity_type, entity_id)
    });

    let engine = open_engine(db_path, false)?;
    let operation = engine.enqueue(url, method, body, headers, entity).await?;

    println!("{}", operation.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct OperationListItem {
    id: String,
    url: String,
    method: String,
    status: String,
    retry_count: u32,
    created_at: i64,
    relative_time: String,
    entity: Option<String>,
    last_error: Option<String>,
}

async fn run_list(
    status: Option<StatusFilter>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let operations = list_operations(status, db_path).await?;

    if as_json {
        let items = operations
            .iter()
            .map(operation_to_list_item)
            .collect::<Vec<OperationListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_operation_lines(&operations) {
            println!("{line}");
        }
    }

    Ok(())
}

async fn run_retry(id: &str, db_path: &Path) -> Result<(), CliError> {
    let id = parse_operation_id(id)?;
    let engine = open_engine(db_path, false)?;

    if engine.retry_operation(&id).await? {
        println!("{id}");
        Ok(())
    } else if engine.get_operation(&id).await?.is_some() {
        println!("{id} is not failed, nothing to retry");
        Ok(())
    } else {
        Err(CliError::OperationNotFound(id.to_string()))
    }
}

async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let id = parse_operation_id(id)?;
    let engine = open_engine(db_path, false)?;

    if engine.delete_operation(&id).await? {
        println!("{id}");
        Ok(())
    } else {
        Err(CliError::OperationNotFound(id.to_string()))
    }
}

async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path, true)?;
    let summary = engine.sync_pending_data().await?;
    tracing::info!(
        success = summary.success,
        failed = summary.failed,
        conflicts = summary.conflicts,
        "sync pass finished"
    );

    println!(
        "synced: {} ok, {} failed, {} conflicts, {} still pending",
        summary.success, summary.failed, summary.conflicts, summary.pending
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusReport {
    pending_operations: u64,
    failed_operations: usize,
    pending_conflicts: usize,
}

async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path, false)?;
    let report = StatusReport {
        pending_operations: engine.get_pending_items_count().await?,
        failed_operations: engine
            .get_operations(Some(OperationStatus::Failed))
            .await?
            .len(),
        pending_conflicts: engine.get_conflicts().await?.len(),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} pending, {} failed, {} conflicts awaiting resolution",
            report.pending_operations, report.failed_operations, report.pending_conflicts
        );
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct ConflictListItem {
    id: String,
    entity: String,
    client_version: i64,
    server_version: i64,
    status: String,
    resolution: Option<String>,
    created_at: i64,
    relative_time: String,
}

async fn run_conflicts(
    all: bool,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let engine = open_engine(db_path, false)?;
    let conflicts = if all {
        engine.get_recent_conflicts(limit).await?
    } else {
        engine.get_conflicts().await?
    };

    if as_json {
        let items = conflicts
            .iter()
            .map(conflict_to_list_item)
            .collect::<Vec<ConflictListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_conflict_lines(&conflicts) {
            println!("{line}");
        }
    }

    Ok(())
}

async fn run_resolve(
    id: &str,
    resolution: ResolutionArg,
    data: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let id = parse_conflict_id(id)?;
    let manual_data = match (resolution, data) {
        (ResolutionArg::Manual, None) => return Err(CliError::MissingManualData),
        (_, Some(raw)) => Some(serde_json::from_str(raw)?),
        (_, None) => None,
    };

    let engine = open_engine(db_path, true)?;
    let requeued = engine
        .resolve_conflict(&id, resolution.into(), manual_data)
        .await
        .map_err(|error| match error {
            outbox_core::Error::NotFound(_) => CliError::ConflictNotFound(id.to_string()),
            other => CliError::Core(other),
        })?;

    if requeued {
        println!("{id} resolved, operation re-queued");
    } else {
        println!("{id} resolved");
    }
    Ok(())
}

async fn run_cache(
    key: &str,
    value: Option<&str>,
    ttl_secs: Option<u64>,
    db_path: &Path,
) -> Result<(), CliError> {
    let engine = open_engine(db_path, false)?;

    match value {
        Some(raw) => {
            let value: serde_json::Value = serde_json::from_str(raw)?;
            let ttl = ttl_secs.map(Duration::from_secs);
            engine.cache_data(key, value, ttl).await?;
            println!("{key}");
        }
        None => match engine.get_cached_data(key).await? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => println!("(absent)"),
        },
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct OfflineListItem {
    id: i64,
    payload: serde_json::Value,
    inserted_at: i64,
}

async fn run_offline(
    store: &str,
    data: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let engine = open_engine(db_path, false)?;

    match data {
        Some(raw) => {
            let payload: serde_json::Value = serde_json::from_str(raw)?;
            let id = engine.save_offline_data(store, payload).await?;
            println!("{id}");
        }
        None => {
            let records = engine.get_offline_data(store).await?;
            if as_json {
                let items = records
                    .iter()
                    .map(offline_to_list_item)
                    .collect::<Vec<OfflineListItem>>();
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for record in &records {
                    println!("{:<6}  {}", record.id, record.payload);
                }
            }
        }
    }

    Ok(())
}

async fn list_operations(
    status: Option<StatusFilter>,
    db_path: &Path,
) -> Result<Vec<SyncOperation>, CliError> {
    let engine = open_engine(db_path, false)?;
    Ok(engine.get_operations(status.map(Into::into)).await?)
}

fn operation_to_list_item(operation: &SyncOperation) -> OperationListItem {
    let now_ms = Utc::now().timestamp_millis();
    OperationListItem {
        id: operation.id.to_string(),
        url: operation.target_url.clone(),
        method: operation.method.to_string(),
        status: operation.status.to_string(),
        retry_count: operation.retry_count,
        created_at: operation.created_at,
        relative_time: format_relative_time(operation.created_at, now_ms),
        entity: operation.entity.as_ref().map(ToString::to_string),
        last_error: operation.last_error.clone(),
    }
}

fn conflict_to_list_item(conflict: &ConflictRecord) -> ConflictListItem {
    let now_ms = Utc::now().timestamp_millis();
    ConflictListItem {
        id: conflict.id.to_string(),
        entity: conflict.entity.to_string(),
        client_version: conflict.client_version,
        server_version: conflict.server_version,
        status: conflict.status.as_str().to_string(),
        resolution: conflict.resolution.map(|r| r.to_string()),
        created_at: conflict.created_at,
        relative_time: format_relative_time(conflict.created_at, now_ms),
    }
}

fn offline_to_list_item(record: &OfflineRecord) -> OfflineListItem {
    OfflineListItem {
        id: record.id,
        payload: record.payload.clone(),
        inserted_at: record.inserted_at,
    }
}

fn format_operation_lines(operations: &[SyncOperation]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    operations
        .iter()
        .map(|operation| {
            let short_id = short_id(&operation.id.to_string());
            let method = operation.method.to_string();
            let status = operation.status.to_string();
            let relative_time = format_relative_time(operation.created_at, now_ms);
            let url = truncate_text(&operation.target_url, 40);

            format!("{short_id:<13}  {method:<6}  {status:<10}  {url:<40}  {relative_time}")
        })
        .collect()
}

fn format_conflict_lines(conflicts: &[ConflictRecord]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    conflicts
        .iter()
        .map(|conflict| {
            let short_id = short_id(&conflict.id.to_string());
            let entity = truncate_text(&conflict.entity.to_string(), 24);
            let versions = format!("v{} vs v{}", conflict.client_version, conflict.server_version);
            let relative_time = format_relative_time(conflict.created_at, now_ms);

            format!("{short_id:<13}  {entity:<24}  {versions:<12}  {relative_time}")
        })
        .collect()
}

fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = value.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

fn parse_method(method: &str) -> Result<HttpMethod, CliError> {
    HttpMethod::parse(method).ok_or_else(|| CliError::UnknownMethod(method.to_string()))
}

fn parse_operation_id(id: &str) -> Result<OperationId, CliError> {
    id.trim()
        .parse()
        .map_err(|_| CliError::InvalidId(id.to_string()))
}

fn parse_conflict_id(id: &str) -> Result<ConflictId, CliError> {
    id.trim()
        .parse()
        .map_err(|_| CliError::InvalidId(id.to_string()))
}

fn parse_headers(raw: &[String]) -> Result<HashMap<String, String>, CliError> {
    let mut headers = HashMap::new();
    for pair in raw {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| CliError::InvalidHeader(pair.clone()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(CliError::InvalidHeader(pair.clone()));
        }
        headers.insert(name.to_string(), value.trim().to_string());
    }
    Ok(headers)
}

fn resolve_body(data: Option<&str>) -> Result<Option<serde_json::Value>, CliError> {
    if let Some(raw) = data {
        return Ok(Some(serde_json::from_str(raw)?));
    }

    match read_piped_stdin()? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("OUTBOX_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("outbox")
        .join("outbox.db")
}

fn open_engine(
    db_path: &Path,
    online: bool,
) -> Result<SyncEngine<ReqwestTransport, HttpVersionOracle>, CliError> {
    let config = EngineConfig::from_env();
    tracing::debug!(path = %db_path.display(), online, "opening sync engine");
    Ok(SyncEngine::open(db_path, config, SharedProbe::new(online))?)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{
        format_conflict_lines, format_operation_lines, format_relative_time, list_operations,
        open_engine, parse_headers, parse_method, parse_operation_id, run_delete, run_queue,
        run_retry, CliError, StatusFilter,
    };
    use outbox_core::{EntityKey, HttpMethod, OperationStatus};

    #[test]
    fn parse_method_accepts_known_verbs() {
        assert_eq!(parse_method("put").unwrap(), HttpMethod::Put);
        assert_eq!(parse_method("DELETE").unwrap(), HttpMethod::Delete);
        assert!(matches!(
            parse_method("TRACE"),
            Err(CliError::UnknownMethod(_))
        ));
    }

    #[test]
    fn parse_headers_splits_on_first_equals() {
        let headers = parse_headers(&[
            "content-type=application/json".to_string(),
            "x-token=a=b".to_string(),
        ])
        .unwrap();
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["x-token"], "a=b");

        assert!(matches!(
            parse_headers(&["no-separator".to_string()]),
            Err(CliError::InvalidHeader(_))
        ));
        assert!(matches!(
            parse_headers(&["=value".to_string()]),
            Err(CliError::InvalidHeader(_))
        ));
    }

    #[test]
    fn parse_operation_id_rejects_garbage() {
        assert!(matches!(
            parse_operation_id("not-a-uuid"),
            Err(CliError::InvalidId(_))
        ));
    }

    #[test]
    fn format_relative_time_units() {
        let now = 10_000_000_000;
        assert_eq!(format_relative_time(now - 30_000, now), "just now");
        assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
        assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
        assert_eq!(
            format_relative_time(now - 3 * 24 * 60 * 60_000, now),
            "3d ago"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queue_then_list_shows_the_operation() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("outbox.db");

        run_queue(
            "https://api.example.com/notes/42",
            "PUT",
            Some("{\"title\": \"x\"}"),
            &["content-type=application/json".to_string()],
            Some(("Note".to_string(), "42".to_string())),
            &db_path,
        )
        .await
        .unwrap();

        let operations = list_operations(Some(StatusFilter::Pending), &db_path)
            .await
            .unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].method, HttpMethod::Put);
        assert_eq!(operations[0].entity, Some(EntityKey::new("Note", "42")));
        assert_eq!(operations[0].entity_version_at_creation, Some(0));

        let lines = format_operation_lines(&operations);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("PUT"));
        assert!(lines[0].contains("pending"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queue_rejects_empty_url() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("outbox.db");

        let result = run_queue("   ", "POST", None, &[], None, &db_path).await;
        assert!(matches!(result, Err(CliError::EmptyUrl)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_then_retry_report_missing_operations() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("outbox.db");
        let missing = "0191b2c0-0000-7000-8000-000000000000";

        assert!(matches!(
            run_delete(missing, &db_path).await,
            Err(CliError::OperationNotFound(_))
        ));
        assert!(matches!(
            run_retry(missing, &db_path).await,
            Err(CliError::OperationNotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cache_and_offline_roundtrip_through_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("outbox.db");
        let engine = open_engine(&db_path, false).unwrap();

        engine
            .cache_data("k", serde_json::json!({"cached": true}), None)
            .await
            .unwrap();
        assert_eq!(
            engine.get_cached_data("k").await.unwrap(),
            Some(serde_json::json!({"cached": true}))
        );

        engine
            .save_offline_data("drafts", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        let drafts = engine.get_offline_data("drafts").await.unwrap();
        assert_eq!(drafts.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn conflict_lines_show_version_pair() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("outbox.db");
        let engine = open_engine(&db_path, false).unwrap();

        // Empty when nothing conflicted yet
        assert!(format_conflict_lines(&engine.get_conflicts().await.unwrap()).is_empty());
        drop(engine);

        run_queue("/api/Note/42", "PUT", None, &[], None, &db_path)
            .await
            .unwrap();
        let operations = list_operations(None, &db_path).await.unwrap();
        assert_eq!(operations[0].status, OperationStatus::Pending);
    }
}
