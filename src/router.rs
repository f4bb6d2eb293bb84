use axum::{
    Router,
    routing::{get, post},
};

use crate::{AppState, middleware::log_errors, routes};

// 页面和地图数据
fn map_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(routes::map::shell))
        .route("/api/map", get(routes::map::get_map))
        .route("/api/map/events", get(routes::map::map_events))
        .route("/api/position", post(routes::map::report_position))
}

// 登录状态
fn session_routes() -> Router<AppState> {
    Router::new().route(
        "/api/session",
        get(routes::session::get_session)
            .post(routes::session::login)
            .delete(routes::session::logout),
    )
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(map_routes())
        .merge(session_routes())
        .layer(axum::middleware::from_fn(log_errors))
        .with_state(state)
}
