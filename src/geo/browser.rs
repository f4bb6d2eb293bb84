// 浏览器回传的定位
// 地图页面调用 navigator.geolocation.watchPosition 后把结果 POST 回来

use async_trait::async_trait;
use futures_util::{StreamExt, future};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::{GeoError, Position, PositionSource, PositionStream, WatchOptions};

const REPORT_BUFFER: usize = 32;

/// 浏览器 GeolocationPositionError 的错误码
pub mod error_codes {
    pub const PERMISSION_DENIED: u16 = 1;
    pub const POSITION_UNAVAILABLE: u16 = 2;
    pub const TIMEOUT: u16 = 3;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserGeoError {
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

/// 页面上报的一次定位结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BrowserReport {
    Position(Position),
    Error { error: BrowserGeoError },
}

impl From<BrowserReport> for Result<Position, GeoError> {
    fn from(report: BrowserReport) -> Self {
        match report {
            BrowserReport::Position(position) => Ok(position),
            BrowserReport::Error { error } => Err(match error.code {
                error_codes::PERMISSION_DENIED => GeoError::PermissionDenied,
                error_codes::TIMEOUT => GeoError::Timeout,
                error_codes::POSITION_UNAVAILABLE => GeoError::Unavailable(error.message),
                code => GeoError::Device(format!("browser error {}: {}", code, error.message)),
            }),
        }
    }
}

#[derive(Clone)]
pub struct BrowserSource {
    reports: broadcast::Sender<BrowserReport>,
}

impl Default for BrowserSource {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserSource {
    pub fn new() -> Self {
        let (reports, _rx) = broadcast::channel(REPORT_BUFFER);
        Self { reports }
    }

    /// 推送一次上报，返回是否有正在监听的会话
    pub fn report(&self, report: BrowserReport) -> bool {
        self.reports.send(report).is_ok()
    }

    pub fn is_watching(&self) -> bool {
        self.reports.receiver_count() > 0
    }
}

#[async_trait]
impl PositionSource for BrowserSource {
    async fn watch(&self, _options: WatchOptions) -> Result<PositionStream, GeoError> {
        // 高精度由页面端 enableHighAccuracy 负责
        let stream = BroadcastStream::new(self.reports.subscribe()).filter_map(|item| {
            future::ready(item.ok().map(Result::<Position, GeoError>::from))
        });
        Ok(stream.boxed())
    }
}
