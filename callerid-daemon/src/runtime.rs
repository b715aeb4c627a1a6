use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;

use callerid_core::paths::{self, DAEMON_LABEL, DEBOUNCE_WINDOW};
use callerid_core::{
    config, CallerListPayload, CallerLookup, ContactSyncPayload, PayloadError, SourceId,
};
use callerid_directory::{LocalDirectory, RequestSummary};
use callerid_sync::{state, LocalContactStore, SyncOutcome};

use crate::bridge::{CallerIdBridge, CallerListOutcome};
use crate::error::{io_err, BridgeError, DaemonError};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::screening::CallScreener;

pub type LocalBridge = CallerIdBridge<LocalContactStore, LocalDirectory>;

/// Shared state handed to every request.
pub struct DaemonState {
    pub bridge: Arc<LocalBridge>,
    pub screener: Mutex<CallScreener>,
    pub started_at_unix: u64,
}

impl DaemonState {
    pub fn new(bridge: LocalBridge) -> Self {
        Self {
            bridge: Arc::new(bridge),
            screener: Mutex::new(CallScreener::new()),
            started_at_unix: unix_seconds_now(),
        }
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let config = config::load_at(&home)?;
    let bridge = CallerIdBridge::open_at(&home, &config)?;
    let state = Arc::new(DaemonState::new(bridge));
    tracing::info!(
        home = %home.display(),
        mode = state.bridge.mode().as_str(),
        "daemon starting"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = watcher_task(home, state, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result =
                socket_server_task(home, state, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let sweep_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = document_sweep_task(state, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, socket_result, sweep_result, signal_result) =
        tokio::join!(watcher_handle, socket_handle, sweep_handle, signal_handle);

    drain_keep_alive(&state, Duration::from_secs(30)).await;

    handle_join("watcher", watcher_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("document_sweep", sweep_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

// Background syncs hold a keep-alive token; let them finish before exiting.
async fn drain_keep_alive(state: &DaemonState, limit: Duration) {
    let keep_alive = state.bridge.orchestrator().keep_alive().clone();
    let deadline = Instant::now() + limit;
    while keep_alive.held() > 0 {
        if Instant::now() >= deadline {
            tracing::warn!(held = keep_alive.held(), "exiting with background sync still running");
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

// ---------------------------------------------------------------------------
// Shared document watcher
// ---------------------------------------------------------------------------

async fn watcher_task(
    home: PathBuf,
    state: Arc<DaemonState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let shared = paths::shared_dir(&home);
    if !shared.exists() {
        fs::create_dir_all(&shared).map_err(|e| io_err(&shared, e))?;
    }
    // FSEvents reports real paths (/private/var/... on macOS).
    let shared = fs::canonicalize(&shared).unwrap_or(shared);

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&shared, RecursiveMode::NonRecursive)?;
    tracing::debug!(path = %shared.display(), "watching shared document directory");

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                for path in event.paths {
                    if !is_shared_document(&path, &shared) {
                        continue;
                    }
                    if !should_process_event(&mut debounce, &path, Instant::now()) {
                        continue;
                    }
                    match reload_directory(state.clone()).await {
                        Ok(Some(summary)) => tracing::info!(
                            kind = ?summary.kind,
                            added = summary.added(),
                            removed = summary.removed,
                            "watcher-triggered directory reload completed",
                        ),
                        Ok(None) => {}
                        Err(err) => tracing::error!(error = %err, "watcher-triggered directory reload failed"),
                    }
                }
            }
        }
    }

    Ok(())
}

// Picks up documents whose events fell inside a debounce window.
async fn document_sweep_task(
    state: Arc<DaemonState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                match reload_directory(state.clone()).await {
                    Ok(Some(summary)) => tracing::info!(kind = ?summary.kind, "swept pending caller list document"),
                    Ok(None) => {}
                    Err(err) => tracing::error!(error = %err, "directory reload from sweep failed"),
                }
            }
        }
    }
    Ok(())
}

async fn reload_directory(state: Arc<DaemonState>) -> Result<Option<RequestSummary>, DaemonError> {
    let bridge = state.bridge.clone();
    let result = tokio::task::spawn_blocking(move || bridge.reload_directory())
        .await
        .map_err(|err| DaemonError::Protocol(format!("directory reload join error: {err}")))?;
    Ok(result?)
}

// ---------------------------------------------------------------------------
// Socket server
// ---------------------------------------------------------------------------

async fn socket_server_task(
    home: PathBuf,
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = paths::socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = state.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, state, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        if request.cmd == "stop" {
            let _ = shutdown_tx.send(());
            write_response(&mut writer, &DaemonResponse::ok(json!({ "stopping": true }))).await?;
            break;
        }

        let response = dispatch(&state, request).await;
        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

/// Answer one request. `stop` is handled by the connection loop.
pub async fn dispatch(state: &Arc<DaemonState>, request: DaemonRequest) -> DaemonResponse {
    let cmd = request.cmd.clone();
    match handle_command(state, request).await {
        Ok(data) => DaemonResponse::ok(data),
        Err(err) => {
            tracing::warn!(cmd = %cmd, error = %err, "request failed");
            DaemonResponse::error(err.to_string())
        }
    }
}

async fn handle_command(state: &Arc<DaemonState>, request: DaemonRequest) -> Result<Value, DaemonError> {
    let bridge = state.bridge.clone();
    match request.cmd.as_str() {
        "status" => Ok(build_status_payload(state).await),
        "getCallerIdMode" => Ok(json!({ "mode": bridge.mode().as_str() })),
        "setCallerList" => {
            let payload: CallerListPayload = decode_payload(request.payload)?;
            let outcome = blocking(move || bridge.set_caller_list(&payload)).await?;
            Ok(caller_list_json(&outcome))
        }
        "clearCallerList" => {
            let outcome = blocking(move || bridge.clear_caller_list()).await?;
            Ok(caller_list_json(&outcome))
        }
        "syncContacts" => {
            let payload: ContactSyncPayload = decode_payload(request.payload)?;
            let handle = bridge.sync_contacts(payload, request.vacation_mode_active)?;
            if request.wait {
                let outcome = handle.wait().await.map_err(BridgeError::from)?;
                return Ok(sync_outcome_json(&outcome));
            }
            tokio::spawn(async move {
                if let Err(err) = handle.wait().await {
                    tracing::error!(error = %err, "background contact sync failed");
                }
            });
            Ok(json!({ "started": true }))
        }
        "clearContacts" => {
            let report = blocking(move || bridge.clear_contacts()).await?;
            Ok(json!({ "deleted": report.applied, "failedBatches": report.failed_batches }))
        }
        "blockLocalContact" | "unblockLocalContact" => {
            let blocked = request.cmd == "blockLocalContact";
            let source_id = request
                .source_id
                .map(SourceId::from)
                .ok_or_else(|| DaemonError::Protocol("missing sourceId".to_string()))?;
            let echoed = source_id.to_string();
            blocking(move || bridge.set_local_contact_blocked(&source_id, blocked)).await?;
            Ok(json!({ "sourceId": echoed, "blocked": blocked }))
        }
        "lookup" => {
            let number = request
                .number
                .ok_or_else(|| DaemonError::Protocol("missing number".to_string()))?;
            Ok(lookup_json(&number, bridge.lookup(&number)))
        }
        "callEvent" => {
            let event = request
                .event
                .ok_or_else(|| DaemonError::Protocol("missing event".to_string()))?;
            let mut screener = state.screener.lock().await;
            let notice = screener.on_event(&event, |number| bridge.lookup(number));
            Ok(json!({ "notice": notice }))
        }
        other => Err(DaemonError::Protocol(format!("unknown command '{other}'"))),
    }
}

async fn blocking<T, F>(f: F) -> Result<T, DaemonError>
where
    F: FnOnce() -> Result<T, BridgeError> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| DaemonError::Protocol(format!("request task join error: {err}")))?;
    Ok(result?)
}

fn decode_payload<T: serde::de::DeserializeOwned>(payload: Option<Value>) -> Result<T, DaemonError> {
    let payload = payload.ok_or_else(|| DaemonError::Protocol("missing payload".to_string()))?;
    serde_json::from_value(payload)
        .map_err(|err| DaemonError::from(BridgeError::Payload(PayloadError::Json(err))))
}

async fn build_status_payload(state: &Arc<DaemonState>) -> Value {
    let bridge = state.bridge.clone();
    let home = bridge.home().to_path_buf();
    let saved = tokio::task::spawn_blocking(move || state::load_at(&home))
        .await
        .ok()
        .and_then(|loaded| loaded.ok())
        .unwrap_or_default();

    json!({
        "running": true,
        "label": DAEMON_LABEL,
        "started_at_unix": state.started_at_unix,
        "mode": bridge.mode().as_str(),
        "syncing": bridge.orchestrator().is_syncing(),
        "keep_alive": bridge.orchestrator().keep_alive().held(),
        "synced_at": saved.synced_at.map(|t| t.to_rfc3339()),
        "last_run": saved.last_run,
        "socket": paths::socket_path(bridge.home()).display().to_string(),
    })
}

fn caller_list_json(outcome: &CallerListOutcome) -> Value {
    json!({
        "allowed": outcome.store.allowed,
        "blocked": outcome.store.blocked,
        "directory": {
            "kind": format!("{:?}", outcome.directory.kind),
            "blockingAdded": outcome.directory.blocking_added,
            "identificationAdded": outcome.directory.identification_added,
            "removed": outcome.directory.removed,
        },
    })
}

fn sync_outcome_json(outcome: &SyncOutcome) -> Value {
    json!({
        "group": outcome.group,
        "report": outcome.report,
        "failedBatches": outcome.report.failed_batches(),
    })
}

fn lookup_json(number: &str, lookup: CallerLookup) -> Value {
    match lookup {
        CallerLookup::Blocked { label } => json!({ "number": number, "result": "blocked", "label": label }),
        CallerLookup::Identified { label } => json!({ "number": number, "result": "identified", "label": label }),
        CallerLookup::Unknown => json!({ "number": number, "result": "unknown" }),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn is_shared_document(path: &Path, shared: &Path) -> bool {
    path.starts_with(shared) && path.file_name().and_then(|n| n.to_str()) == Some("callerId.json")
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [paths::callerid_root(home), paths::shared_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
