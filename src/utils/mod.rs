use axum::Json;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::result::ApiResult;

/// 托管服务签发的访问令牌中我们关心的字段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 用户ID
    pub exp: i64,    // 过期时间
    #[serde(default)]
    pub aud: Option<String>,
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[config.jwt_audience.as_str()]);

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )?;

    Ok(token_data.claims)
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResult<T>> {
    Json(ApiResult::success(data))
}

pub fn error_to_api_response<T>(code: i32, msg: &str) -> Json<ApiResult<T>> {
    Json(ApiResult::error(code, msg))
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const AUTH_FAILED: i32 = 1002;
    pub const NOT_FOUND: i32 = 1004;
}

/// 判断坐标是否在合法范围内
pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::env;

    fn config() -> Config {
        Config::from_lookup(|key| match key {
            "STORE_BACKEND" => Ok("memory".into()),
            "JWT_SECRET" => Ok("test-secret".into()),
            _ => Err(env::VarError::NotPresent),
        })
        .unwrap()
    }

    fn token(secret: &str, aud: &str) -> String {
        let claims = Claims {
            sub: "u1".into(),
            exp: Utc::now().timestamp() + 3600,
            aud: Some(aud.into()),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_token_signed_with_configured_secret() {
        let claims = verify_token(&token("test-secret", "authenticated"), &config()).unwrap();
        assert_eq!(claims.sub, "u1");
    }

    #[test]
    fn rejects_wrong_secret_and_audience() {
        assert!(verify_token(&token("other", "authenticated"), &config()).is_err());
        assert!(verify_token(&token("test-secret", "anon"), &config()).is_err());
    }

    #[test]
    fn coordinate_bounds() {
        assert!(is_valid_coordinate(35.0, 139.0));
        assert!(is_valid_coordinate(-90.0, 180.0));
        assert!(!is_valid_coordinate(90.5, 0.0));
        assert!(!is_valid_coordinate(0.0, -180.1));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
    }
}
