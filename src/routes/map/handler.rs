use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{
        Html, IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::WatchStream;

use crate::{
    AppState,
    error::AppError,
    geo::browser::BrowserReport,
    models::MapSnapshot,
    utils::{is_valid_coordinate, success_to_api_response},
    web::SHELL_HTML,
};

use super::model::PositionAccepted;

pub async fn shell() -> Html<&'static str> {
    Html(SHELL_HTML)
}

#[axum::debug_handler]
pub async fn get_map(State(state): State<AppState>) -> impl IntoResponse {
    let frame = state.map.borrow().frame();
    (StatusCode::OK, success_to_api_response(frame))
}

fn frame_event(snapshot: MapSnapshot) -> Result<Event, Infallible> {
    let payload = serde_json::to_string(&snapshot.frame()).unwrap_or_else(|_| "{}".into());
    Ok(Event::default().event("frame").data(payload))
}

/// 每次状态变化推送一帧，连接建立时先推送当前帧
pub async fn map_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(state.map.clone()).map(frame_event);

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[axum::debug_handler]
pub async fn report_position(
    State(state): State<AppState>,
    Json(report): Json<BrowserReport>,
) -> Result<impl IntoResponse, AppError> {
    let browser = state.browser.as_ref().ok_or(AppError::SourceNotConfigured)?;

    if let BrowserReport::Position(position) = &report {
        if !is_valid_coordinate(position.latitude, position.longitude) {
            return Err(AppError::InvalidPosition);
        }
    }

    let accepted = browser.report(report);
    if !accepted {
        tracing::debug!("Position reported while no session is watching");
    }

    Ok((
        StatusCode::OK,
        success_to_api_response(PositionAccepted { accepted }),
    ))
}
