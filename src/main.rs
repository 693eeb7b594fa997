use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use agora_backend::{
    AppState,
    config::Config,
    geocode::NominatimGeocoder,
    middleware::{auth_middleware, log_errors, viewer_middleware},
    notify::LogNotifier,
    routes,
};
use axum::{
    Router,
    routing::{get, post, put},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

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

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'agora_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");

    // 组装应用状态，外部协作者在这里注入
    let state = AppState {
        pool,
        geocoder: Arc::new(NominatimGeocoder::new(config.geocoder_endpoint.clone())),
        notifier: Arc::new(LogNotifier),
        redis: Arc::new(redis_client),
        config,
    };

    // 公开路由
    let public_routes = Router::new()
        .route("/users/register", post(routes::user::register))
        .route("/users/login", post(routes::user::login));

    // 群组详情允许匿名浏览，身份由 viewer 中间件按需解析
    let show_routes = Router::new()
        .route("/groups/show", get(routes::group::show_group))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            viewer_middleware,
        ));

    // 需要认证的路由
    let protected_routes = Router::new()
        .route("/users/me", get(routes::user::me))
        .route("/groups/create", post(routes::group::create_group))
        .route("/groups/update", put(routes::group::update_group))
        .route("/groups/delete", post(routes::group::delete_group))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let router = Router::new().nest(
        "/api",
        Router::new()
            .merge(public_routes)
            .merge(show_routes)
            .merge(protected_routes),
    );

    // 添加日志中间件
    let router = router.layer(axum::middleware::from_fn(log_errors));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        let cors = tower_http::cors::CorsLayer::permissive();
        router.layer(cors)
    };

    // 添加应用状态
    let app = router.with_state(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
