use auth::AuthContext;
use config::Config;
use geo::BrowserSource;
use models::MapSnapshot;
use tokio::sync::watch;

pub mod auth;
pub mod config;
pub mod error;
pub mod geo;
pub mod map_view;
pub mod middleware;
pub mod models;
pub mod result;
pub mod router;
pub mod routes;
pub mod store;
pub mod utils;
pub mod web;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub auth: AuthContext,
    pub map: watch::Receiver<MapSnapshot>,
    /// 仅在使用浏览器定位时存在
    pub browser: Option<BrowserSource>,
}
