use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use server_api::{
    add_entry, admin_login, authorize, clear_entries, copy_entry, decrement_points, delete_entry,
    increment_points, list_entries, list_games, set_points, AdminAuthConfig, ApiContext,
};
use shared::{
    domain::{Entry, EntryId, Game, GameCatalog},
    error::{ApiError, ErrorCode},
    protocol::{
        AddEntryRequest, AdminLoginRequest, AdminSession, ClearResponse, CopyEntryRequest,
        LeaderboardEvent, ListEntriesQuery, SetPointsRequest,
    },
};
use storage::Storage;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
    events: broadcast::Sender<LeaderboardEvent>,
}

type HttpResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    settings.ensure_secrets_configured()?;
    if settings.uses_default_secrets() {
        warn!("admin password or token secret left at development defaults");
    }
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let catalog = GameCatalog::new(&settings.games);
    info!(games = catalog.games().len(), "loaded game catalog");

    let api = ApiContext {
        storage,
        catalog,
        auth: AdminAuthConfig {
            password: settings.admin_password,
            token_secret: settings.token_secret,
            ttl_seconds: settings.token_ttl_seconds,
        },
    };
    let (events, _) = broadcast::channel(256);

    let state = AppState { api, events };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to install shutdown signal handler");
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/games", get(http_list_games))
        .route("/admin/login", post(http_admin_login))
        .route(
            "/entries",
            get(http_list_entries)
                .post(http_add_entry)
                .delete(http_clear_entries),
        )
        .route("/entries/:entry_id", delete(http_delete_entry))
        .route("/entries/:entry_id/points", put(http_set_points))
        .route("/entries/:entry_id/increment", post(http_increment_points))
        .route("/entries/:entry_id/decrement", post(http_decrement_points))
        .route("/entries/:entry_id/copy", post(http_copy_entry))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(message = %err.message, "request failed");
    }
    (status, Json(err))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> HttpResult<()> {
    authorize(&state.api, bearer_token(headers)).map_err(reject)
}

fn publish(state: &AppState, event: LeaderboardEvent) {
    // No subscribers is not an error.
    let _ = state.events.send(event);
}

fn publish_upsert(state: &AppState, event: LeaderboardEvent) -> HttpResult<Json<Entry>> {
    let LeaderboardEvent::EntryUpserted { entry } = &event else {
        return Err(reject(ApiError::new(
            ErrorCode::Internal,
            "unexpected event for entry update",
        )));
    };
    let entry = entry.clone();
    publish(state, event);
    Ok(Json(entry))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state.api.storage.health_check().await.map_err(|error| {
        error!(%error, "health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok("ok")
}

async fn http_list_games(State(state): State<Arc<AppState>>) -> Json<Vec<Game>> {
    Json(list_games(&state.api))
}

async fn http_list_entries(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListEntriesQuery>,
) -> HttpResult<Json<Vec<Entry>>> {
    let entries = list_entries(&state.api, q.game).await.map_err(reject)?;
    Ok(Json(entries))
}

async fn http_admin_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminLoginRequest>,
) -> HttpResult<Json<AdminSession>> {
    let session = admin_login(&state.api, &req.password).map_err(reject)?;
    info!(expires_at = %session.expires_at, "admin session issued");
    Ok(Json(session))
}

async fn http_add_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AddEntryRequest>,
) -> HttpResult<Json<Entry>> {
    require_admin(&state, &headers)?;
    let event = add_entry(&state.api, req).await.map_err(reject)?;
    publish_upsert(&state, event)
}

async fn http_set_points(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<SetPointsRequest>,
) -> HttpResult<Json<Entry>> {
    require_admin(&state, &headers)?;
    let event = set_points(&state.api, EntryId(entry_id), req.points)
        .await
        .map_err(reject)?;
    publish_upsert(&state, event)
}

async fn http_increment_points(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<i64>,
    headers: HeaderMap,
) -> HttpResult<Json<Entry>> {
    require_admin(&state, &headers)?;
    let event = increment_points(&state.api, EntryId(entry_id))
        .await
        .map_err(reject)?;
    publish_upsert(&state, event)
}

async fn http_decrement_points(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<i64>,
    headers: HeaderMap,
) -> HttpResult<Json<Entry>> {
    require_admin(&state, &headers)?;
    let event = decrement_points(&state.api, EntryId(entry_id))
        .await
        .map_err(reject)?;
    publish_upsert(&state, event)
}

async fn http_delete_entry(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<i64>,
    headers: HeaderMap,
) -> HttpResult<StatusCode> {
    require_admin(&state, &headers)?;
    let event = delete_entry(&state.api, EntryId(entry_id))
        .await
        .map_err(reject)?;
    publish(&state, event);
    Ok(StatusCode::NO_CONTENT)
}

async fn http_clear_entries(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> HttpResult<Json<ClearResponse>> {
    require_admin(&state, &headers)?;
    let (deleted, event) = clear_entries(&state.api).await.map_err(reject)?;
    publish(&state, event);
    Ok(Json(ClearResponse { deleted }))
}

async fn http_copy_entry(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<CopyEntryRequest>,
) -> HttpResult<Json<Vec<Entry>>> {
    require_admin(&state, &headers)?;
    let events = copy_entry(&state.api, EntryId(entry_id), req.games)
        .await
        .map_err(reject)?;
    let mut written = Vec::with_capacity(events.len());
    for event in events {
        written.push(publish_upsert(&state, event)?.0);
    }
    Ok(Json(written))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};
    use tokio::sync::broadcast::error::RecvError;

    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.events.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket subscriber lagged behind change feed");
                    LeaderboardEvent::ResyncRequired
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
