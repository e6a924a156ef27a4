pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{
    Json, Router,
    extract::State,
    routing::{delete, get, post},
};
use state::AppState;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = if state.settings.app.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = state
            .settings
            .app
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Room metadata CRUD
    let room_routes = Router::new()
        .route("/", get(routes::room::list))
        .route("/", post(routes::room::create))
        .route("/{room_id}", get(routes::room::get))
        .route("/{room_id}", delete(routes::room::delete));

    // Active HLS streams
    let stream_routes = Router::new()
        .route("/", get(routes::stream::list))
        .route("/{room_id}", get(routes::stream::get));

    let api = Router::new()
        .nest("/rooms", room_routes)
        .nest("/streams", stream_routes);

    // Playlist + rolling segments, straight off the transcoder's output dir
    let hls_files = ServeDir::new(&state.settings.hls.storage_path);

    Router::new()
        .nest("/api", api)
        .route("/health", get(health_check))
        .route("/ws", get(ws::handler::ws_upgrade))
        .nest_service("/hls", hls_files)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "workers": state.orchestrator.worker_count(),
        "rooms": state.orchestrator.live_room_count(),
        "connections": state.ws_storage.connection_count(),
    }))
}
