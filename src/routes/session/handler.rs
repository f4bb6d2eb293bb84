use axum::{extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{AppState, auth::CurrentUser, error::AppError, utils::success_to_api_response};

use super::model::{LogoutResponse, SessionInfo};

#[axum::debug_handler]
pub async fn get_session(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let user = state.auth.current().ok_or(AppError::Unauthorized)?;
    Ok((
        StatusCode::OK,
        success_to_api_response(SessionInfo { user_id: user.id }),
    ))
}

/// 用托管服务签发的访问令牌登录，登录后 Map View 随之激活
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<impl IntoResponse, AppError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(AppError::Unauthorized)?;

    let user = CurrentUser::from_token(bearer.token(), &state.config).map_err(|e| {
        tracing::warn!("Rejected access token: {}", e);
        AppError::Unauthorized
    })?;
    let user_id = user.id.clone();
    state.auth.login(user);

    Ok((
        StatusCode::OK,
        success_to_api_response(SessionInfo { user_id }),
    ))
}

#[axum::debug_handler]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    state.auth.logout();
    (
        StatusCode::OK,
        success_to_api_response(LogoutResponse { success: true }),
    )
}
