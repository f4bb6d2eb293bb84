use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::location::PeerLocation;

/// 地图默认缩放级别
pub const DEFAULT_ZOOM: u8 = 13;

/// 自己位置标记的弹出文字
pub const SELF_LABEL: &str = "You are here";

/// Map View 持有的状态，由 watch 通道发布给页面
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSnapshot {
    /// 当前持有快照的激活，旧激活结束时据此判断是否还能清理
    #[serde(skip)]
    pub session_id: Option<Uuid>,
    pub active: bool,
    pub user_id: Option<String>,
    pub self_position: [f64; 2],
    pub peers: Vec<PeerLocation>,
}

impl MapSnapshot {
    pub fn inactive(self_position: [f64; 2]) -> Self {
        Self {
            session_id: None,
            active: false,
            user_id: None,
            self_position,
            peers: Vec::new(),
        }
    }

    /// 生成页面渲染用的帧
    pub fn frame(&self) -> MapFrame {
        let markers = if self.active {
            std::iter::once(Marker {
                key: "self".to_string(),
                position: self.self_position,
                label: SELF_LABEL.to_string(),
                is_self: true,
            })
            .chain(self.peers.iter().map(|peer| Marker {
                key: peer.user_id.clone(),
                position: [peer.latitude, peer.longitude],
                label: peer.username.clone(),
                is_self: false,
            }))
            .collect()
        } else {
            Vec::new()
        };

        MapFrame {
            active: self.active,
            center: self.self_position,
            zoom: DEFAULT_ZOOM,
            markers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub key: String,
    pub position: [f64; 2],
    pub label: String,
    pub is_self: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapFrame {
    pub active: bool,
    pub center: [f64; 2],
    pub zoom: u8,
    pub markers: Vec<Marker>,
}
