use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;

/// 关联不到资料时显示的用户名
pub const UNKNOWN_USER: &str = "Unknown User";

/// locations 表中的一行，每个用户最多一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LocationRecord {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub updated_at: DateTime<Utc>,
}

impl LocationRecord {
    pub fn new(user_id: &str, latitude: f64, longitude: f64, updated_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            latitude,
            longitude,
            updated_at,
        }
    }
}

/// profiles 表的关联字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRef {
    #[serde(default)]
    pub username: Option<String>,
}

/// 查询返回的原始行，profiles 为嵌入的关联资源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRow {
    pub latitude: f64,
    pub longitude: f64,
    pub user_id: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub profiles: Vec<ProfileRef>,
}

// 嵌入资源可能是数组、单个对象或 null
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<ProfileRef>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Embedded {
        Many(Vec<ProfileRef>),
        One(ProfileRef),
    }

    Ok(match Option::<Embedded>::deserialize(deserializer)? {
        Some(Embedded::Many(profiles)) => profiles,
        Some(Embedded::One(profile)) => vec![profile],
        None => Vec::new(),
    })
}

/// 直连数据库时 LEFT JOIN 的结果
#[derive(Debug, FromRow)]
pub struct JoinedLocationRow {
    pub latitude: f64,
    pub longitude: f64,
    pub user_id: String,
    pub username: Option<String>,
}

impl From<JoinedLocationRow> for LocationRow {
    fn from(row: JoinedLocationRow) -> Self {
        Self {
            latitude: row.latitude,
            longitude: row.longitude,
            user_id: row.user_id,
            profiles: row
                .username
                .map(|username| vec![ProfileRef { username: Some(username) }])
                .unwrap_or_default(),
        }
    }
}

/// 地图上显示的其他用户位置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub user_id: String,
    pub username: String,
}

impl From<LocationRow> for PeerLocation {
    fn from(row: LocationRow) -> Self {
        let username = row
            .profiles
            .into_iter()
            .next()
            .and_then(|p| p.username)
            .unwrap_or_else(|| UNKNOWN_USER.to_string());

        Self {
            latitude: row.latitude,
            longitude: row.longitude,
            user_id: row.user_id,
            username,
        }
    }
}
