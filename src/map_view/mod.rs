// 地图视图的同步逻辑
// 激活后：一次全量加载、持续监听设备位置并写回存储、订阅位置表变更并重新加载

use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::geo::{Position, PositionSource, WatchOptions};
use crate::models::{LocationRecord, MapSnapshot, PeerLocation};
use crate::store::{ChangeFeed, LOCATIONS_TABLE, LocationStore};

pub struct MapView {
    store: Arc<dyn LocationStore>,
    feed: Arc<dyn ChangeFeed>,
    positions: Arc<dyn PositionSource>,
    state: Arc<watch::Sender<MapSnapshot>>,
}

impl MapView {
    pub fn new(
        store: Arc<dyn LocationStore>,
        feed: Arc<dyn ChangeFeed>,
        positions: Arc<dyn PositionSource>,
        default_position: [f64; 2],
    ) -> Self {
        let (state, _rx) = watch::channel(MapSnapshot::inactive(default_position));
        Self {
            store,
            feed,
            positions,
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<MapSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> MapSnapshot {
        self.state.borrow().clone()
    }

    /// 进入激活状态，返回的 ActiveMap 持有本次激活的全部资源
    pub fn activate(&self, user: CurrentUser) -> ActiveMap {
        let session_id = Uuid::new_v4();
        info!("Activating map view for {} (session {})", user.id, session_id);

        // 新激活接管快照，仍在运行的旧激活从此不能再改写它
        self.state.send_modify(|s| {
            s.session_id = Some(session_id);
            s.active = true;
            s.user_id = Some(user.id.clone());
            s.peers.clear();
        });

        let session = Arc::new(Session {
            id: session_id,
            user: user.clone(),
            store: self.store.clone(),
            state: self.state.clone(),
        });

        let initial_fetch = {
            let session = session.clone();
            tokio::spawn(async move { session.fetch_locations().await })
        };
        let position_watch = tokio::spawn(watch_positions(session.clone(), self.positions.clone()));
        let change_watch = tokio::spawn(watch_changes(session, self.feed.clone()));

        ActiveMap {
            session_id,
            user,
            tasks: vec![initial_fetch, position_watch, change_watch],
            state: self.state.clone(),
        }
    }

    /// 跟随认证状态激活或停用，认证上下文关闭时退出
    pub async fn run(&self, mut auth: watch::Receiver<Option<CurrentUser>>) {
        let mut active: Option<ActiveMap> = None;

        loop {
            let user = auth.borrow_and_update().clone();
            let unchanged = match (&active, &user) {
                (Some(current), Some(user)) => current.user() == user,
                (None, None) => true,
                _ => false,
            };

            if !unchanged {
                if let Some(current) = active.take() {
                    current.deactivate().await;
                }
                active = user.map(|user| self.activate(user));
            }

            if auth.changed().await.is_err() {
                break;
            }
        }

        if let Some(current) = active.take() {
            current.deactivate().await;
        }
        info!("Auth context closed, map view stopped");
    }
}

/// 一次激活期间的资源
///
/// 位置监听和变更订阅各由一个任务持有；任务结束时流被丢弃，订阅随之取消。
/// 显式调用 [`ActiveMap::deactivate`] 会等待任务真正退出，之后不再有存储调用。
/// 直接丢弃也会取消任务，但不等待。
pub struct ActiveMap {
    session_id: Uuid,
    user: CurrentUser,
    tasks: Vec<JoinHandle<()>>,
    state: Arc<watch::Sender<MapSnapshot>>,
}

impl ActiveMap {
    pub fn user(&self) -> &CurrentUser {
        &self.user
    }

    pub async fn deactivate(mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            // 被取消的任务返回 JoinError，属于预期
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Map view task failed: {}", e);
                }
            }
        }
        self.mark_inactive();
        info!("Deactivated map view for {} (session {})", self.user.id, self.session_id);
    }

    /// 只在快照仍属于本次激活时清理
    fn mark_inactive(&self) {
        self.state.send_if_modified(|s| {
            if s.session_id != Some(self.session_id) {
                return false;
            }
            s.session_id = None;
            s.active = false;
            s.user_id = None;
            s.peers.clear();
            true
        });
    }
}

impl Drop for ActiveMap {
    fn drop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.mark_inactive();
        debug!("Dropped map view session {}", self.session_id);
    }
}

struct Session {
    id: Uuid,
    user: CurrentUser,
    store: Arc<dyn LocationStore>,
    state: Arc<watch::Sender<MapSnapshot>>,
}

impl Session {
    /// 快照已被其他激活接管时放弃修改
    fn update(&self, apply: impl FnOnce(&mut MapSnapshot)) {
        self.state.send_if_modified(|s| {
            if s.session_id != Some(self.id) {
                return false;
            }
            apply(s);
            true
        });
    }

    /// 全量加载其他用户的位置；失败时保留原有列表
    async fn fetch_locations(&self) {
        match self.store.fetch_peer_locations(&self.user).await {
            Ok(rows) => {
                let peers: Vec<PeerLocation> = rows
                    .into_iter()
                    .filter(|row| row.user_id != self.user.id)
                    .map(PeerLocation::from)
                    .collect();
                debug!("Loaded {} peer locations", peers.len());
                self.update(|s| s.peers = peers);
            }
            Err(e) => error!("Error fetching locations: {}", e),
        }
    }

    async fn on_position(&self, position: Position) {
        self.update(|s| s.self_position = [position.latitude, position.longitude]);

        let record = LocationRecord::new(
            &self.user.id,
            position.latitude,
            position.longitude,
            Utc::now(),
        );
        if let Err(e) = self.store.upsert_location(&self.user, &record).await {
            error!("Error updating location: {}", e);
        }
    }
}

async fn watch_positions(session: Arc<Session>, source: Arc<dyn PositionSource>) {
    let mut positions = match source.watch(WatchOptions::default()).await {
        Ok(positions) => positions,
        Err(e) => {
            error!("Error getting location: {}", e);
            return;
        }
    };

    while let Some(update) = positions.next().await {
        match update {
            Ok(position) => session.on_position(position).await,
            Err(e) => error!("Error getting location: {}", e),
        }
    }
    warn!("Position watch ended for {}", session.user.id);
}

async fn watch_changes(session: Arc<Session>, feed: Arc<dyn ChangeFeed>) {
    let mut changes = match feed.subscribe(LOCATIONS_TABLE).await {
        Ok(changes) => changes,
        Err(e) => {
            error!("Error subscribing to location changes: {}", e);
            return;
        }
    };

    // 任何变更都全量重新加载
    while let Some(event) = changes.next().await {
        debug!("Location {:?} received, reloading", event.kind);
        session.fetch_locations().await;
    }
    warn!("Change subscription ended for {}", session.user.id);
}
