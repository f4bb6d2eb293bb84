#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use locshare::auth::CurrentUser;
use locshare::config::Config;
use locshare::geo::{BrowserSource, GeoError, PositionSource, PositionStream, WatchOptions};
use locshare::models::{LocationRecord, LocationRow};
use locshare::store::{ChangeFeed, ChangeStream, LocationStore, MemoryStore, StoreError};
use locshare::utils::Claims;

pub const JWT_SECRET: &str = "test-secret";
pub const DEFAULT_POSITION: [f64; 2] = [35.6762, 139.6503];

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "STORE_BACKEND" => Ok("memory".into()),
        "JWT_SECRET" => Ok(JWT_SECRET.into()),
        _ => Err(std::env::VarError::NotPresent),
    })
    .expect("memory config")
}

pub fn issue_token(user_id: &str) -> String {
    let claims = Claims {
        sub: user_id.into(),
        exp: Utc::now().timestamp() + 3600,
        aud: Some("authenticated".into()),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("token")
}

/// 丢弃时计数
struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// 记录调用次数的存储，可以注入失败
pub struct RecordingStore {
    pub inner: Arc<MemoryStore>,
    pub fetches: AtomicUsize,
    pub upserts: Mutex<Vec<LocationRecord>>,
    pub fail_fetch: AtomicBool,
    pub fail_upsert: AtomicBool,
}

impl RecordingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fetches: AtomicUsize::new(0),
            upserts: Mutex::new(Vec::new()),
            fail_fetch: AtomicBool::new(false),
            fail_upsert: AtomicBool::new(false),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> Vec<LocationRecord> {
        self.upserts.lock().unwrap().clone()
    }
}

fn unavailable() -> StoreError {
    StoreError::Rest {
        status: 503,
        body: "service unavailable".into(),
    }
}

#[async_trait]
impl LocationStore for RecordingStore {
    async fn fetch_peer_locations(
        &self,
        viewer: &CurrentUser,
    ) -> Result<Vec<LocationRow>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.fetch_peer_locations(viewer).await
    }

    async fn upsert_location(
        &self,
        viewer: &CurrentUser,
        record: &LocationRecord,
    ) -> Result<(), StoreError> {
        self.upserts.lock().unwrap().push(record.clone());
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.upsert_location(viewer, record).await
    }
}

/// 统计订阅和取消订阅次数的变更源
pub struct CountingFeed {
    pub inner: Arc<MemoryStore>,
    pub subscribes: AtomicUsize,
    pub drops: Arc<AtomicUsize>,
}

impl CountingFeed {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            subscribes: AtomicUsize::new(0),
            drops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn drop_count(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeFeed for CountingFeed {
    async fn subscribe(&self, table: &str) -> Result<ChangeStream, StoreError> {
        let stream = self.inner.subscribe(table).await?;
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        let guard = DropCounter(self.drops.clone());
        Ok(stream
            .map(move |event| {
                let _alive = &guard;
                event
            })
            .boxed())
    }
}

/// 浏览器定位来源外加监听计数
pub struct CountingSource {
    pub inner: BrowserSource,
    pub watches: AtomicUsize,
    pub drops: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn new() -> Self {
        Self {
            inner: BrowserSource::new(),
            watches: AtomicUsize::new(0),
            drops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn watch_count(&self) -> usize {
        self.watches.load(Ordering::SeqCst)
    }

    pub fn drop_count(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PositionSource for CountingSource {
    async fn watch(&self, options: WatchOptions) -> Result<PositionStream, GeoError> {
        assert!(options.high_accuracy, "map view must request high accuracy");
        let stream = self.inner.watch(options).await?;
        self.watches.fetch_add(1, Ordering::SeqCst);
        let guard = DropCounter(self.drops.clone());
        Ok(stream
            .map(move |update| {
                let _alive = &guard;
                update
            })
            .boxed())
    }
}

/// 无法开始监听的定位来源，比如用户拒绝了权限
pub struct DeniedSource;

#[async_trait]
impl PositionSource for DeniedSource {
    async fn watch(&self, _options: WatchOptions) -> Result<PositionStream, GeoError> {
        Err(GeoError::PermissionDenied)
    }
}

/// 订阅总是失败的变更源
pub struct BrokenFeed {
    pub attempts: AtomicUsize,
}

impl BrokenFeed {
    pub fn new() -> Self {
        Self {
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChangeFeed for BrokenFeed {
    async fn subscribe(&self, _table: &str) -> Result<ChangeStream, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::InvalidChannel("bad channel".into()))
    }
}

/// 轮询直到条件成立，超时则失败
pub async fn eventually<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
