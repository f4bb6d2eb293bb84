// 进程内存储
// 本地运行和测试时代替托管服务，同时提供变更广播

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{StreamExt, future};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::{
    ChangeEvent, ChangeFeed, ChangeKind, ChangeStream, LOCATIONS_TABLE, LocationStore, StoreError,
};
use crate::auth::CurrentUser;
use crate::models::{LocationRecord, LocationRow, ProfileRef};

const CHANGE_BUFFER: usize = 64;

#[derive(Default)]
struct Tables {
    // 按 user_id 排序，查询结果稳定
    locations: BTreeMap<String, LocationRecord>,
    profiles: HashMap<String, String>,
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_BUFFER);
        Self {
            tables: Mutex::new(Tables::default()),
            changes,
        }
    }

    pub fn insert_profile(&self, user_id: &str, username: &str) {
        self.lock()
            .profiles
            .insert(user_id.to_string(), username.to_string());
    }

    pub fn location(&self, user_id: &str) -> Option<LocationRecord> {
        self.lock().locations.get(user_id).cloned()
    }

    pub fn location_count(&self) -> usize {
        self.lock().locations.len()
    }

    /// 删除一行，模拟其他客户端或后台清理
    pub fn delete_location(&self, user_id: &str) -> Option<LocationRecord> {
        let removed = self.lock().locations.remove(user_id);
        if removed.is_some() {
            self.publish(ChangeKind::Delete);
        }
        removed
    }

    /// 订阅者数量，即当前打开的变更订阅数
    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    fn publish(&self, kind: ChangeKind) {
        // 没有订阅者时发送失败，忽略即可
        let _ = self.changes.send(ChangeEvent {
            table: LOCATIONS_TABLE.to_string(),
            kind,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LocationStore for MemoryStore {
    async fn fetch_peer_locations(
        &self,
        viewer: &CurrentUser,
    ) -> Result<Vec<LocationRow>, StoreError> {
        let tables = self.lock();
        let rows = tables
            .locations
            .values()
            .filter(|record| record.user_id != viewer.id)
            .map(|record| LocationRow {
                latitude: record.latitude,
                longitude: record.longitude,
                user_id: record.user_id.clone(),
                profiles: tables
                    .profiles
                    .get(&record.user_id)
                    .map(|username| {
                        vec![ProfileRef {
                            username: Some(username.clone()),
                        }]
                    })
                    .unwrap_or_default(),
            })
            .collect();

        Ok(rows)
    }

    async fn upsert_location(
        &self,
        _viewer: &CurrentUser,
        record: &LocationRecord,
    ) -> Result<(), StoreError> {
        let previous = self
            .lock()
            .locations
            .insert(record.user_id.clone(), record.clone());

        self.publish(if previous.is_some() {
            ChangeKind::Update
        } else {
            ChangeKind::Insert
        });
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for MemoryStore {
    async fn subscribe(&self, table: &str) -> Result<ChangeStream, StoreError> {
        let table = table.to_string();
        let stream = BroadcastStream::new(self.changes.subscribe()).filter_map(move |item| {
            // 落后时丢掉的事件无所谓，后续任何一次变更都会触发全量加载
            let event = item.ok().filter(|event| event.table == table);
            future::ready(event)
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn repeated_upserts_keep_one_row() {
        let store = MemoryStore::new();
        let u1 = CurrentUser::new("u1");

        for lat in [35.0, 35.1, 35.2] {
            let record = LocationRecord::new("u1", lat, 139.0, Utc::now());
            store.upsert_location(&u1, &record).await.unwrap();
        }

        assert_eq!(store.location_count(), 1);
        assert_eq!(store.location("u1").unwrap().latitude, 35.2);
    }

    #[tokio::test]
    async fn fetch_excludes_viewer_and_joins_profiles() {
        let store = MemoryStore::new();
        store.insert_profile("u2", "alice");
        for id in ["u1", "u2", "u3"] {
            let record = LocationRecord::new(id, 1.0, 2.0, Utc::now());
            store.upsert_location(&CurrentUser::new(id), &record).await.unwrap();
        }

        let rows = store.fetch_peer_locations(&CurrentUser::new("u1")).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, ["u2", "u3"]);
        assert_eq!(rows[0].profiles[0].username.as_deref(), Some("alice"));
        assert!(rows[1].profiles.is_empty());
    }

    #[tokio::test]
    async fn subscribers_receive_each_change_kind() {
        let store = MemoryStore::new();
        let mut changes = store.subscribe(LOCATIONS_TABLE).await.unwrap();
        assert_eq!(store.subscriber_count(), 1);

        let u1 = CurrentUser::new("u1");
        let record = LocationRecord::new("u1", 1.0, 2.0, Utc::now());
        store.upsert_location(&u1, &record).await.unwrap();
        store.upsert_location(&u1, &record).await.unwrap();
        store.delete_location("u1");

        let kinds: Vec<_> = [
            changes.next().await.unwrap(),
            changes.next().await.unwrap(),
            changes.next().await.unwrap(),
        ]
        .into_iter()
        .map(|e| e.kind)
        .collect();
        assert_eq!(kinds, [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]);

        drop(changes);
        assert_eq!(store.subscriber_count(), 0);
    }
}
