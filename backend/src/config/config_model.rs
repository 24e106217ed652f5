use std::time::Duration;

use payments_core::requesters::RequesterConfig;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub backend_server: BackendServer,
    pub database: Database,
    pub midtrans: Midtrans,
    pub requesters: RequesterConfig,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct Midtrans {
    pub server_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub verify_signature: bool,
}
