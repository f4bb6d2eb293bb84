use std::env;
use std::str::FromStr;

use crate::store::DEFAULT_NOTIFY_CHANNEL;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// 存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// 直连 Postgres
    Postgres,
    /// PostgREST 风格的 HTTP 接口
    Rest,
    /// 进程内存储，本地调试用
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "rest" => Ok(StoreBackend::Rest),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

/// 设备位置来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSourceKind {
    /// 浏览器 geolocation 回传
    Browser,
    /// 本机 gpsd 守护进程
    Gpsd,
}

impl FromStr for PositionSourceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "browser" => Ok(PositionSourceKind::Browser),
            "gpsd" => Ok(PositionSourceKind::Gpsd),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub rest_url: Option<String>,
    pub rest_api_key: Option<String>,
    pub notify_channel: String,
    pub auto_migrate: bool,
    pub position_source: PositionSourceKind,
    pub gpsd_addr: String,
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub access_token: Option<String>,
    pub default_latitude: f64,
    pub default_longitude: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key))
    }

    /// 从任意键值来源读取配置，测试时不必改动进程环境变量
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let optional = |key: &str| lookup(key).ok().filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| optional(key).ok_or(ConfigError::Missing(key));
        // 写错的值直接报错，不静默退回默认值
        fn parsed<T: FromStr>(
            key: &'static str,
            value: Option<String>,
            default: T,
        ) -> Result<T, ConfigError> {
            match value {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid { key, value }),
            }
        }

        let store_backend =
            parsed("STORE_BACKEND", optional("STORE_BACKEND"), StoreBackend::Postgres)?;
        let position_source = parsed(
            "POSITION_SOURCE",
            optional("POSITION_SOURCE"),
            PositionSourceKind::Browser,
        )?;

        // 按后端检查必填项；变更通知始终走数据库连接
        let database_url = match store_backend {
            StoreBackend::Postgres | StoreBackend::Rest => Some(required("DATABASE_URL")?),
            StoreBackend::Memory => optional("DATABASE_URL"),
        };
        let (rest_url, rest_api_key) = match store_backend {
            StoreBackend::Rest => (Some(required("REST_URL")?), Some(required("REST_API_KEY")?)),
            _ => (optional("REST_URL"), optional("REST_API_KEY")),
        };

        let auto_migrate = match optional("AUTO_MIGRATE").map(|v| v.to_ascii_lowercase()) {
            None => true,
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no") => false,
            Some(value) => {
                return Err(ConfigError::Invalid {
                    key: "AUTO_MIGRATE",
                    value,
                });
            }
        };

        Ok(Config {
            server_host: optional("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".into()),
            server_port: parsed("SERVER_PORT", optional("SERVER_PORT"), 3000)?,
            store_backend,
            database_url,
            rest_url,
            rest_api_key,
            notify_channel: optional("NOTIFY_CHANNEL")
                .unwrap_or_else(|| DEFAULT_NOTIFY_CHANNEL.into()),
            auto_migrate,
            position_source,
            gpsd_addr: optional("GPSD_ADDR").unwrap_or_else(|| "127.0.0.1:2947".into()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_audience: optional("JWT_AUDIENCE").unwrap_or_else(|| "authenticated".into()),
            access_token: optional("ACCESS_TOKEN"),
            default_latitude: parsed("DEFAULT_LATITUDE", optional("DEFAULT_LATITUDE"), 35.6762)?,
            default_longitude: parsed(
                "DEFAULT_LONGITUDE",
                optional("DEFAULT_LONGITUDE"),
                139.6503,
            )?,
        })
    }

    pub fn default_position(&self) -> [f64; 2] {
        [self.default_latitude, self.default_longitude]
    }
}
