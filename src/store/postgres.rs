// 直连 Postgres 的位置存储

use async_trait::async_trait;
use sqlx::PgPool;

use super::{LocationStore, StoreError};
use crate::auth::CurrentUser;
use crate::models::{JoinedLocationRow, LocationRecord, LocationRow};

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

#[derive(Clone)]
pub struct PgLocationStore {
    pool: PgPool,
}

impl PgLocationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 建表；变更通知触发器由 PgChangeFeed::install_trigger 安装
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        tracing::info!("Schema ready");
        Ok(())
    }
}

#[async_trait]
impl LocationStore for PgLocationStore {
    async fn fetch_peer_locations(
        &self,
        viewer: &CurrentUser,
    ) -> Result<Vec<LocationRow>, StoreError> {
        let rows = sqlx::query_as::<_, JoinedLocationRow>(
            r#"
            SELECT
                l.latitude,
                l.longitude,
                l.user_id,
                p.username
            FROM locations l
            LEFT JOIN profiles p ON p.user_id = l.user_id
            WHERE l.user_id <> $1
            "#,
        )
        .bind(&viewer.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LocationRow::from).collect())
    }

    async fn upsert_location(
        &self,
        _viewer: &CurrentUser,
        record: &LocationRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO locations (user_id, latitude, longitude, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.user_id)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
