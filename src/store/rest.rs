// PostgREST 风格的 HTTP 存储
// 与托管服务的 /rest/v1 接口对接

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};

use super::{LOCATIONS_TABLE, LocationStore, StoreError};
use crate::auth::CurrentUser;
use crate::models::{LocationRecord, LocationRow};

/// 查询字段，profiles 为嵌入的关联资源
const PEER_SELECT: &str = "latitude,longitude,user_id,profiles(username)";

#[derive(Clone)]
pub struct RestLocationStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestLocationStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    // 有用户令牌时用令牌，否则退回到 api key
    fn authorize(&self, req: RequestBuilder, viewer: &CurrentUser) -> RequestBuilder {
        let bearer = viewer.access_token.as_deref().unwrap_or(&self.api_key);
        req.header("apikey", &self.api_key).bearer_auth(bearer)
    }
}

async fn check_status(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Rest {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl LocationStore for RestLocationStore {
    async fn fetch_peer_locations(
        &self,
        viewer: &CurrentUser,
    ) -> Result<Vec<LocationRow>, StoreError> {
        let req = self
            .client
            .get(self.table_url(LOCATIONS_TABLE))
            .query(&[
                ("select", PEER_SELECT.to_string()),
                ("user_id", format!("neq.{}", viewer.id)),
            ]);

        let resp = self.authorize(req, viewer).send().await?;
        let bytes = check_status(resp).await?.bytes().await?;
        let rows: Vec<LocationRow> = serde_json::from_slice(&bytes)?;

        Ok(rows)
    }

    async fn upsert_location(
        &self,
        viewer: &CurrentUser,
        record: &LocationRecord,
    ) -> Result<(), StoreError> {
        let req = self
            .client
            .post(self.table_url(LOCATIONS_TABLE))
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(record);

        let resp = self.authorize(req, viewer).send().await?;
        check_status(resp).await?;

        Ok(())
    }
}
