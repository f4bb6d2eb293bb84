// 存储模块
// 位置的读写和变更通知，具体实现按后端拆分

pub mod listener;
pub mod memory;
pub mod postgres;
pub mod rest;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::models::{LocationRecord, LocationRow};

pub use listener::PgChangeFeed;
pub use memory::MemoryStore;
pub use postgres::PgLocationStore;
pub use rest::RestLocationStore;

/// 位置表名
pub const LOCATIONS_TABLE: &str = "locations";

/// 默认的变更通知通道，与 sql/notify.sql 一致
pub const DEFAULT_NOTIFY_CHANNEL: &str = "locations_changes";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rest api returned {status}: {body}")]
    Rest { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid notify channel: {0}")]
    InvalidChannel(String),
}

/// 行级变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// 一次行级变更，回调只用它来触发重新加载
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    #[serde(rename = "event")]
    pub kind: ChangeKind,
}

/// 变更流，丢弃即取消订阅
pub type ChangeStream = BoxStream<'static, ChangeEvent>;

#[async_trait]
pub trait LocationStore: Send + Sync {
    /// 查询除 viewer 以外所有用户的位置，并关联用户名
    async fn fetch_peer_locations(&self, viewer: &CurrentUser)
    -> Result<Vec<LocationRow>, StoreError>;

    /// 按 user_id 写入或覆盖位置
    async fn upsert_location(
        &self,
        viewer: &CurrentUser,
        record: &LocationRecord,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// 订阅某张表的所有变更
    async fn subscribe(&self, table: &str) -> Result<ChangeStream, StoreError>;
}
