use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use locshare::{
    AppState,
    auth::{AuthContext, CurrentUser},
    config::{Config, PositionSourceKind, StoreBackend},
    geo::{BrowserSource, GpsdSource, PositionSource},
    map_view::MapView,
    router::create_router,
    store::{
        ChangeFeed, LocationStore, MemoryStore, PgChangeFeed, PgLocationStore, RestLocationStore,
    },
};
use sqlx::Executor;
use sqlx::postgres::{PgPool, PgPoolOptions};
#[cfg(debug_assertions)]
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn connect_pool(database_url: &str) -> PgPool {
    PgPoolOptions::new()
        .max_connections(5)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'locshare';").await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
        .expect("Failed to connect to Postgres")
}

/// 打开变更订阅；开启自动迁移时顺带安装通知触发器
async fn change_feed(pool: PgPool, config: &Config) -> PgChangeFeed {
    let feed = PgChangeFeed::new(pool, config.notify_channel.clone());
    if config.auto_migrate {
        feed.install_trigger()
            .await
            .expect("Failed to install change trigger");
    }
    feed
}

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    // 存储和变更订阅
    let (store, feed): (Arc<dyn LocationStore>, Arc<dyn ChangeFeed>) = match config.store_backend
    {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, locations are not persisted");
            let memory = Arc::new(MemoryStore::new());
            (memory.clone(), memory)
        }
        StoreBackend::Postgres => {
            let database_url = config.database_url.as_deref().unwrap_or_default();
            let pool = connect_pool(database_url).await;
            let store = PgLocationStore::new(pool.clone());
            if config.auto_migrate {
                store.migrate().await.expect("Failed to prepare schema");
            }
            let feed = change_feed(pool, &config).await;
            (Arc::new(store), Arc::new(feed))
        }
        StoreBackend::Rest => {
            let database_url = config.database_url.as_deref().unwrap_or_default();
            let pool = connect_pool(database_url).await;
            let store = RestLocationStore::new(
                config.rest_url.as_deref().unwrap_or_default(),
                config.rest_api_key.as_deref().unwrap_or_default(),
            );
            // 表由托管服务维护，这里只需要触发器
            let feed = change_feed(pool, &config).await;
            (Arc::new(store), Arc::new(feed))
        }
    };

    // 设备定位来源
    let browser = match config.position_source {
        PositionSourceKind::Browser => Some(BrowserSource::new()),
        PositionSourceKind::Gpsd => None,
    };
    let positions: Arc<dyn PositionSource> = match &browser {
        Some(browser) => Arc::new(browser.clone()),
        None => Arc::new(GpsdSource::new(config.gpsd_addr.clone())),
    };

    let map_view = MapView::new(store, feed, positions, config.default_position());
    let mut map_rx = map_view.subscribe();
    let auth = AuthContext::new();

    if let Some(token) = config.access_token.as_deref() {
        match CurrentUser::from_token(token, &config) {
            Ok(user) => auth.login(user),
            Err(e) => tracing::error!("ACCESS_TOKEN rejected: {}", e),
        }
    }

    let state = AppState {
        config: config.clone(),
        auth: auth.clone(),
        map: map_view.subscribe(),
        browser,
    };

    // 认证状态驱动地图视图的激活和停用
    let driver = {
        let auth_rx = auth.subscribe();
        tokio::spawn(async move { map_view.run(auth_rx).await })
    };

    let router = create_router(state);

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to localhost");
            IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)
        }),
        config.server_port,
    );
    tracing::info!("Map view available at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    tokio::select! {
        result = axum::serve(listener, router).into_future() => {
            if let Err(e) = result {
                tracing::error!("Server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    // 退出前登出，等待地图视图释放监听和订阅
    auth.logout();
    if map_rx.wait_for(|snapshot| !snapshot.active).await.is_err() {
        tracing::warn!("Map view stopped before deactivation completed");
    }
    driver.abort();
}
