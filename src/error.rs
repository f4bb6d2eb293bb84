use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::utils::{error_codes, error_to_api_response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid position")]
    InvalidPosition,
    #[error("position source not configured")]
    SourceNotConfigured,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                error_codes::AUTH_FAILED,
                "未登录或令牌无效",
            ),
            AppError::InvalidPosition => (
                StatusCode::BAD_REQUEST,
                error_codes::VALIDATION_ERROR,
                "坐标超出范围",
            ),
            AppError::SourceNotConfigured => (
                StatusCode::NOT_FOUND,
                error_codes::NOT_FOUND,
                "未启用浏览器定位来源",
            ),
        };

        (status, error_to_api_response::<()>(code, error_message)).into_response()
    }
}
