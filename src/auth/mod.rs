// 认证上下文
// 保存当前登录用户，Map View 通过订阅它来决定是否激活

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Config;
use crate::utils::verify_token;

/// 当前登录的用户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    /// 访问令牌，REST 后端用它做行级权限校验
    pub access_token: Option<String>,
}

impl CurrentUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            access_token: None,
        }
    }

    /// 校验访问令牌并得到用户
    pub fn from_token(token: &str, config: &Config) -> Result<Self, jsonwebtoken::errors::Error> {
        let claims = verify_token(token, config)?;
        Ok(Self {
            id: claims.sub,
            access_token: Some(token.to_string()),
        })
    }
}

#[derive(Clone)]
pub struct AuthContext {
    tx: Arc<watch::Sender<Option<CurrentUser>>>,
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthContext {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn login(&self, user: CurrentUser) {
        tracing::info!("User logged in: {}", user.id);
        self.tx.send_replace(Some(user));
    }

    pub fn logout(&self) {
        if let Some(user) = self.tx.send_replace(None) {
            tracing::info!("User logged out: {}", user.id);
        }
    }

    pub fn current(&self) -> Option<CurrentUser> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<CurrentUser>> {
        self.tx.subscribe()
    }
}
