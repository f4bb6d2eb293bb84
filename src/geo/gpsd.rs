// gpsd 定位来源
// 通过 gpsd 的 JSON 协议读取 TPV 报告

use async_trait::async_trait;
use futures_util::{StreamExt, future};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_stream::wrappers::LinesStream;

use super::{GeoError, Position, PositionSource, PositionStream, WatchOptions};

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// TPV 中的定位模式
const MODE_2D: u8 = 2;
const MODE_3D: u8 = 3;

#[derive(Debug, Deserialize)]
#[serde(tag = "class")]
enum Report {
    #[serde(rename = "TPV")]
    Tpv {
        #[serde(default)]
        mode: u8,
        lat: Option<f64>,
        lon: Option<f64>,
        eph: Option<f64>,
    },
    #[serde(rename = "ERROR")]
    Error { message: String },
    #[serde(other)]
    Other,
}

/// 解析一行报告；没有可用定位的行返回 None
pub fn parse_report(line: &str, options: WatchOptions) -> Option<Result<Position, GeoError>> {
    let report = match serde_json::from_str::<Report>(line) {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!("Skipping malformed gpsd report: {}", e);
            return None;
        }
    };

    match report {
        Report::Tpv { mode, lat, lon, eph } => {
            // 高精度要求 3D 定位
            let required = if options.high_accuracy { MODE_3D } else { MODE_2D };
            if mode < required {
                return None;
            }
            let (latitude, longitude) = (lat?, lon?);
            Some(Ok(Position {
                latitude,
                longitude,
                accuracy: eph,
            }))
        }
        Report::Error { message } => Some(Err(GeoError::Device(message))),
        Report::Other => None,
    }
}

pub struct GpsdSource {
    addr: String,
}

impl GpsdSource {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl PositionSource for GpsdSource {
    async fn watch(&self, options: WatchOptions) -> Result<PositionStream, GeoError> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        stream.write_all(WATCH_COMMAND).await?;
        tracing::debug!("Watching gpsd at {}", self.addr);

        // 流被丢弃时连接随之关闭，gpsd 会停止推送
        let lines = LinesStream::new(BufReader::new(stream).lines());
        let positions = lines.filter_map(move |line| {
            future::ready(match line {
                Ok(line) => parse_report(&line, options),
                Err(e) => Some(Err(GeoError::Io(e))),
            })
        });

        Ok(positions.boxed())
    }
}
