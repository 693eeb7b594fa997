use std::sync::Arc;

use config::Config;
use redis::Client as RedisClient;
use sqlx::PgPool;

pub mod access;
pub mod config;
pub mod feeds;
pub mod geocode;
pub mod images;
pub mod middleware;
pub mod notify;
pub mod routes;
pub mod utils;

use geocode::Geocoder;
use notify::Notifier;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    pub geocoder: Arc<dyn Geocoder>,
    pub notifier: Arc<dyn Notifier>,
}
