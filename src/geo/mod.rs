// 设备定位
// 位置来源抽象成可取消的流，丢弃流即停止监听

pub mod browser;
pub mod gpsd;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub use browser::BrowserSource;
pub use gpsd::GpsdSource;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    Unavailable(String),

    #[error("timed out waiting for a position")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("device error: {0}")]
    Device(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
        }
    }
}

/// 位置更新流，每一项是一次定位结果或错误
pub type PositionStream = BoxStream<'static, Result<Position, GeoError>>;

#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn watch(&self, options: WatchOptions) -> Result<PositionStream, GeoError>;
}
