use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use critters_arena::config::{NewGameRequest, RuleSet};
use critters_arena::constants::DECISION_TIMEOUT_MS;
use critters_arena::critters::default_registry;
use critters_arena::error::{ConfigError, ControlError};
use critters_arena::server_protocol::{
    error_message, game_end_message, game_state_message, heartbeat_message,
    initial_state_message, parse_client_message, pong_message, ParsedClientMessage,
};
use critters_arena::server_utils::{parse_turn_delay, resolve_static_dir, status_code_for};
use critters_arena::session::GameSession;
use critters_arena::types::Snapshot;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, error, info, warn};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

const CLIENT_QUEUE_CAPACITY: usize = 256;
const CLIENT_IDLE_HEARTBEAT: Duration = Duration::from_secs(30);

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve Critters games over HTTP and WebSocket")]
struct Cli {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,
    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,
    /// Directory holding the browser client's index.html.
    #[arg(long, env = "STATIC_DIR")]
    static_dir: Option<PathBuf>,
    /// Per-decision budget for strategy calls.
    #[arg(long, env = "DECISION_BUDGET_MS", default_value_t = DECISION_TIMEOUT_MS)]
    decision_budget_ms: u64,
}

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    session: GameSession,
    clients: HashMap<String, ClientContext>,
    /// Bumped whenever the running tick loop must stop.
    loop_generation: u64,
}

impl ServerState {
    fn new(session: GameSession) -> Self {
        Self {
            session,
            clients: HashMap::new(),
            loop_generation: 0,
        }
    }

    fn stop_tick_loop(&mut self) -> u64 {
        self.loop_generation += 1;
        self.loop_generation
    }
}

#[derive(Debug, Deserialize)]
struct SpeedQuery {
    turn_delay: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    critters_arena::init_tracing();
    let cli = Cli::parse();

    let rules = RuleSet {
        decision_budget: Duration::from_millis(cli.decision_budget_ms.max(1)),
        ..RuleSet::default()
    };
    let session = GameSession::new(default_registry(), rules);
    let state: SharedState = Arc::new(Mutex::new(ServerState::new(session)));

    let app = Router::new()
        .route("/", get(healthz))
        .route("/healthz", get(healthz))
        .route("/api/critters", get(list_critters))
        .route("/api/game/new", post(new_game))
        .route("/api/game/start", post(start_game))
        .route("/api/game/pause", post(pause_game))
        .route("/api/game/step", post(step_game))
        .route("/api/game/status", get(game_status))
        .route("/api/game/state", get(game_state))
        .route("/api/game/speed", post(set_speed))
        .route("/ws/game", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir(cli.static_dir.as_deref()) {
        let index_file = static_dir.join("index.html");
        info!(root = %static_dir.display(), "serving static files");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!("static file root not found, serving the API only");
        app
    };
    let app = app.layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", cli.host, cli.port))?;

    info!(host = %cli.host, port = cli.port, "listening");
    axum::serve(listener, app)
        .await
        .context("server runtime failed")?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok", "game": "Critters" }))
}

async fn list_critters(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    let species = guard.session.species();
    let descriptions: BTreeMap<&str, &str> = species
        .iter()
        .map(|info| (info.name.as_str(), info.description.as_str()))
        .collect();
    let names: Vec<&str> = species.iter().map(|info| info.name.as_str()).collect();
    Json(json!({
        "critters": names,
        "descriptions": descriptions,
    }))
}

async fn new_game(
    State(state): State<SharedState>,
    Json(request): Json<NewGameRequest>,
) -> Response {
    let outcome = run_blocking(&state, move |server| {
        let result = server.session.create_game(&request);
        if result.is_ok() {
            server.stop_tick_loop();
        }
        result
    })
    .await;
    let Some((mut guard, result)) = outcome else {
        return internal_error("game construction panicked");
    };

    match result {
        Ok(snapshot) => {
            broadcast(
                &mut guard,
                &initial_state_message(&snapshot),
                QueuePolicy::DisconnectOnFull,
            );
            info!(turn = snapshot.turn, critters = snapshot.critters.len(), "game created");
            Json(json!({
                "status": "created",
                "config": guard.session.config(),
                "initial_state": &*snapshot,
            }))
            .into_response()
        }
        Err(err) => control_error(&err),
    }
}

async fn start_game(State(state): State<SharedState>) -> Response {
    let mut guard = state.lock().await;
    if let Err(err) = guard.session.start() {
        return control_error(&err);
    }
    let generation = guard.stop_tick_loop();
    drop(guard);

    start_tick_loop(state, generation);
    Json(json!({ "status": "started" })).into_response()
}

async fn pause_game(State(state): State<SharedState>) -> Response {
    let mut guard = state.lock().await;
    if let Err(err) = guard.session.pause() {
        return control_error(&err);
    }
    guard.stop_tick_loop();
    Json(json!({ "status": "paused" })).into_response()
}

async fn step_game(State(state): State<SharedState>) -> Response {
    let Some((mut guard, result)) = run_blocking(&state, |server| server.session.step()).await
    else {
        return internal_error("turn execution panicked");
    };

    match result {
        Ok(snapshot) => {
            publish_turn(&mut guard, &snapshot);
            Json(json!({
                "status": "stepped",
                "state": &*snapshot,
            }))
            .into_response()
        }
        Err(err) => {
            if let Ok(snapshot) = guard.session.snapshot() {
                publish_turn(&mut guard, &snapshot);
            }
            control_error(&err)
        }
    }
}

async fn game_status(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(guard.session.status())
}

async fn game_state(State(state): State<SharedState>) -> Response {
    let guard = state.lock().await;
    match guard.session.snapshot() {
        Ok(snapshot) => Json(snapshot.as_ref().clone()).into_response(),
        Err(err) => control_error(&err),
    }
}

async fn set_speed(
    State(state): State<SharedState>,
    Query(query): Query<SpeedQuery>,
) -> Response {
    let Some(requested) = parse_turn_delay(query.turn_delay.as_deref()) else {
        return control_error(&ControlError::from(ConfigError::InvalidTurnDelay));
    };
    let mut guard = state.lock().await;
    match guard.session.set_tick_delay(requested) {
        Ok(turn_delay) => Json(json!({ "turn_delay": turn_delay })).into_response(),
        Err(err) => control_error(&ControlError::from(err)),
    }
}

fn control_error(err: &ControlError) -> Response {
    let status =
        StatusCode::from_u16(status_code_for(err)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %err, "command failed");
    } else {
        debug!(error = %err, "command rejected");
    }
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn internal_error(message: &str) -> Response {
    error!(message, "blocking task failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
        .into_response()
}

/// Runs `work` on the blocking pool while holding the state lock. Strategy
/// calls wait on worker threads, so turns never run on the async executor.
async fn run_blocking<T, F>(state: &SharedState, work: F) -> Option<(OwnedMutexGuard<ServerState>, T)>
where
    T: Send + 'static,
    F: FnOnce(&mut ServerState) -> T + Send + 'static,
{
    let mut guard = state.clone().lock_owned().await;
    match tokio::task::spawn_blocking(move || {
        let output = work(&mut guard);
        (guard, output)
    })
    .await
    {
        Ok(pair) => Some(pair),
        Err(err) => {
            error!(error = %err, "blocking task join failed");
            None
        }
    }
}

fn start_tick_loop(state: SharedState, generation: u64) {
    tokio::spawn(async move {
        info!(generation, "tick loop started");
        loop {
            let outcome = run_blocking(&state, move |server| {
                if server.loop_generation != generation || !server.session.is_running() {
                    return None;
                }
                Some(server.session.step())
            })
            .await;
            let Some((mut guard, result)) = outcome else {
                break;
            };

            let delay = match result {
                None => break,
                Some(Ok(snapshot)) => {
                    publish_turn(&mut guard, &snapshot);
                    if snapshot.winner.is_some() {
                        break;
                    }
                    guard.session.tick_delay()
                }
                Some(Err(err)) => {
                    error!(error = %err, "game halted");
                    if let Ok(snapshot) = guard.session.snapshot() {
                        publish_turn(&mut guard, &snapshot);
                    }
                    break;
                }
            };
            drop(guard);
            tokio::time::sleep(delay).await;
        }
        info!(generation, "tick loop stopped");
    });
}

fn publish_turn(state: &mut ServerState, snapshot: &Snapshot) {
    broadcast(state, &game_state_message(snapshot), QueuePolicy::DropOnFull);
    if let Some(winner) = snapshot.winner.as_deref() {
        info!(winner, turn = snapshot.turn, "game ended");
        broadcast(
            state,
            &game_end_message(snapshot),
            QueuePolicy::DisconnectOnFull,
        );
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = format!(
        "client_{}",
        NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed)
    );
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(CLIENT_QUEUE_CAPACITY);

    {
        let mut guard = state.lock().await;
        guard
            .clients
            .insert(client_id.clone(), ClientContext { tx });
        if let Ok(snapshot) = guard.session.snapshot() {
            send_to_client(
                &mut guard,
                &client_id,
                &initial_state_message(&snapshot),
                QueuePolicy::DisconnectOnFull,
            );
        }
        info!(client_id, clients = guard.clients.len(), "client connected");
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    loop {
        let received = match tokio::time::timeout(CLIENT_IDLE_HEARTBEAT, ws_receiver.next()).await
        {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(err))) => {
                debug!(client_id, error = %err, "socket read failed");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                let mut guard = state.lock().await;
                if !guard.clients.contains_key(&client_id) {
                    break;
                }
                send_to_client(
                    &mut guard,
                    &client_id,
                    &heartbeat_message(),
                    QueuePolicy::DisconnectOnFull,
                );
                continue;
            }
        };

        match received {
            Message::Text(raw) => handle_client_message(&state, &client_id, raw.as_str()).await,
            Message::Binary(raw) => match std::str::from_utf8(&raw) {
                Ok(text) => handle_client_message(&state, &client_id, text).await,
                Err(_) => send_error_to_client(&state, &client_id, "invalid utf8 message").await,
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    {
        let mut guard = state.lock().await;
        guard.clients.remove(&client_id);
        info!(client_id, clients = guard.clients.len(), "client disconnected");
    }
    let _ = writer.await;
}

async fn handle_client_message(state: &SharedState, client_id: &str, raw: &str) {
    let Some(message) = parse_client_message(raw) else {
        send_error_to_client(state, client_id, "invalid message").await;
        return;
    };

    let mut guard = state.lock().await;
    let reply = match message {
        ParsedClientMessage::Ping { t } => pong_message(t),
        ParsedClientMessage::GetState => match guard.session.snapshot() {
            Ok(snapshot) => game_state_message(&snapshot),
            Err(err) => error_message(&err.to_string()),
        },
    };
    send_to_client(&mut guard, client_id, &reply, QueuePolicy::DropOnFull);
}

async fn send_error_to_client(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_to_client(
        &mut guard,
        client_id,
        &error_message(message),
        QueuePolicy::DropOnFull,
    );
}

/// Removes a client whose queue overflowed. Dropping its sender ends the
/// writer task once the close frame is flushed.
fn disconnect_client(state: &mut ServerState, client_id: &str) {
    if let Some(client) = state.clients.remove(client_id) {
        let _ = client.tx.try_send(OutboundMessage::Close {
            code: 1008,
            reason: "client queue overflow".to_string(),
        });
    }
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        warn!(client_id, "dropping slow client");
        disconnect_client(state, client_id);
    }
}

fn broadcast(state: &mut ServerState, message: &Value, policy: QueuePolicy) {
    let payload = message.to_string();
    let mut failed_clients = Vec::new();
    for (client_id, client) in &state.clients {
        if client
            .tx
            .try_send(OutboundMessage::Text(payload.clone()))
            .is_err()
            && policy == QueuePolicy::DisconnectOnFull
        {
            failed_clients.push(client_id.clone());
        }
    }
    for client_id in failed_clients {
        warn!(client_id, "dropping slow client");
        disconnect_client(state, &client_id);
    }
}
