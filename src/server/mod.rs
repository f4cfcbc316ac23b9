//! HTTP and WebSocket front end.
//!
//! # Endpoints
//! - `GET /ws`: commands in, acks and loop statuses out.
//! - `GET /api/config`, `POST /api/config`: read (API key masked) and patch
//!   the configuration.
//! - `GET /api/windows`: visible windows with their geometry.
//! - `GET /api/clips/:iteration`: the clip analysed by an iteration, with
//!   range support.

mod ws;

use std::{future::Future, net::SocketAddr};

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower::ServiceExt;
use tower_http::{cors::CorsLayer, services::ServeFile};

use crate::{
    game_loop::commands,
    models::WindowInfo,
    settings::{ConfigPatch, MaskedConfig},
    AppState,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/config", get(get_config).post(post_config))
        .route("/api/windows", get(list_windows))
        .route("/api/clips/:iteration", get(get_clip))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    log::info!("Listening on http://{addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")
}

async fn get_config(State(state): State<AppState>) -> Json<MaskedConfig> {
    Json(commands::get_config(&state.config))
}

async fn post_config(
    State(state): State<AppState>,
    Json(patch): Json<ConfigPatch>,
) -> Result<Json<MaskedConfig>, (StatusCode, String)> {
    commands::update_config(&state.config, patch)
        .await
        .map(Json)
        .map_err(|message| (StatusCode::BAD_REQUEST, message))
}

async fn list_windows(
    State(state): State<AppState>,
) -> Result<Json<Vec<WindowInfo>>, (StatusCode, String)> {
    let windows = state.windows.clone();
    tokio::task::spawn_blocking(move || windows.list_windows())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))
}

async fn get_clip(
    State(state): State<AppState>,
    Path(iteration): Path<u64>,
    request: Request<Body>,
) -> Response {
    let Some(path) = state.clips.find(iteration).await else {
        return (StatusCode::NOT_FOUND, "clip not found").into_response();
    };

    match ServeFile::new(path).oneshot(request).await {
        Ok(served) => {
            let mut response = served.map(Body::new);
            let headers = response.headers_mut();
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache, no-store, must-revalidate"),
            );
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
            headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
            response
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}
