// 基于 LISTEN/NOTIFY 的变更订阅

use async_trait::async_trait;
use futures_util::{StreamExt, future};
use sqlx::PgPool;
use sqlx::postgres::{PgListener, PgNotification};

use super::{ChangeEvent, ChangeFeed, ChangeStream, LOCATIONS_TABLE, StoreError};

/// 通知函数和默认通道上的触发器
const NOTIFY_SQL: &str = include_str!("../../sql/notify.sql");

pub struct PgChangeFeed {
    pool: PgPool,
    channel: String,
}

impl PgChangeFeed {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }

    /// 安装通知函数，并把触发器指向当前通道
    ///
    /// 直连和 REST 两种后端都靠它产生变更通知。
    pub async fn install_trigger(&self) -> Result<(), StoreError> {
        let trigger = trigger_sql(&self.channel)?;

        sqlx::raw_sql(NOTIFY_SQL).execute(&self.pool).await?;
        sqlx::raw_sql(&trigger).execute(&self.pool).await?;

        tracing::info!("Change trigger ready, notifying on channel {}", self.channel);
        Ok(())
    }
}

/// 生成触发器 DDL；通道名会拼进 SQL，只允许标识符字符
pub(crate) fn trigger_sql(channel: &str) -> Result<String, StoreError> {
    if channel.is_empty()
        || !channel
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(StoreError::InvalidChannel(channel.to_string()));
    }

    Ok(format!(
        r#"
        DROP TRIGGER IF EXISTS locations_notify ON {table};
        CREATE TRIGGER locations_notify
            AFTER INSERT OR UPDATE OR DELETE ON {table}
            FOR EACH ROW EXECUTE FUNCTION notify_locations_change('{channel}');
        "#,
        table = LOCATIONS_TABLE,
    ))
}

/// 解析触发器发出的负载，只保留目标表的事件
pub(crate) fn parse_notification(payload: &str, table: &str) -> Option<ChangeEvent> {
    match serde_json::from_str::<ChangeEvent>(payload) {
        Ok(event) if event.table == table => Some(event),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("Ignoring malformed change payload {:?}: {}", payload, e);
            None
        }
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn subscribe(&self, table: &str) -> Result<ChangeStream, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&self.channel).await?;
        tracing::debug!("Listening on {} for {} changes", self.channel, table);

        let table = table.to_string();
        let stream = listener
            .into_stream()
            .filter_map(move |item: Result<PgNotification, sqlx::Error>| {
                let event = match item {
                    Ok(notification) => parse_notification(notification.payload(), &table),
                    Err(e) => {
                        tracing::error!("Error receiving change notification: {}", e);
                        None
                    }
                };
                future::ready(event)
            });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChangeKind, DEFAULT_NOTIFY_CHANNEL};

    #[test]
    fn parses_trigger_payload() {
        let event = parse_notification(r#"{"table":"locations","event":"UPDATE"}"#, "locations");
        assert_eq!(
            event,
            Some(ChangeEvent {
                table: "locations".into(),
                kind: ChangeKind::Update,
            })
        );
    }

    #[test]
    fn drops_other_tables_and_garbage() {
        let other_table = r#"{"table":"profiles","event":"INSERT"}"#;
        let truncate = r#"{"table":"locations","event":"TRUNCATE"}"#;
        assert!(parse_notification(other_table, "locations").is_none());
        assert!(parse_notification("not json", "locations").is_none());
        assert!(parse_notification(truncate, "locations").is_none());
    }

    #[test]
    fn trigger_points_at_configured_channel() {
        let sql = trigger_sql("locations_changes_2").unwrap();
        assert!(sql.contains("AFTER INSERT OR UPDATE OR DELETE ON locations"));
        assert!(sql.contains("notify_locations_change('locations_changes_2')"));
    }

    #[test]
    fn rejects_channel_names_that_are_not_identifiers() {
        for channel in ["", "bad; DROP TABLE locations", "x')--"] {
            let err = trigger_sql(channel).unwrap_err();
            assert!(matches!(err, StoreError::InvalidChannel(_)));
        }
    }

    #[test]
    fn bundled_trigger_uses_default_channel() {
        let expected = format!("notify_locations_change('{}')", DEFAULT_NOTIFY_CHANNEL);
        assert!(NOTIFY_SQL.contains(&expected));
        assert!(NOTIFY_SQL.contains("CREATE OR REPLACE FUNCTION notify_locations_change()"));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a scratch database"]
    async fn upsert_through_rest_schema_emits_change() {
        use crate::auth::CurrentUser;
        use crate::models::LocationRecord;
        use crate::store::{LocationStore, PgLocationStore};
        use chrono::Utc;
        use sqlx::postgres::PgPoolOptions;
        use std::time::Duration;

        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPoolOptions::new().connect(&url).await.unwrap();
        let store = PgLocationStore::new(pool.clone());
        store.migrate().await.unwrap();

        // 与 REST 后端相同：只安装触发器，由别的客户端写入
        let feed = PgChangeFeed::new(pool, "locshare_test_changes");
        feed.install_trigger().await.unwrap();
        let mut changes = feed.subscribe(LOCATIONS_TABLE).await.unwrap();

        let user = CurrentUser::new("listener-test-u1");
        let record = LocationRecord::new(&user.id, 35.0, 139.0, Utc::now());
        store.upsert_location(&user, &record).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), changes.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.table, LOCATIONS_TABLE);
    }
}
