use std::{net, path::PathBuf, time};

use serde::Deserialize;

#[derive(Deserialize)]
pub struct Config {
    pub db: Db,
    pub http: Http,
    pub jwt: Jwt,
    pub admin: Admin,
    pub mail: Mail,
    pub payment: Payment,
    pub storage: Storage,
}

#[derive(Deserialize)]
pub struct Db {
    pub url: String,
}

#[derive(Deserialize)]
pub struct Http {
    pub server: Server,
    pub cors: Cors,
}

#[derive(Deserialize)]
pub struct Server {
    pub addr: net::SocketAddr,
}

#[derive(Deserialize)]
pub struct Cors {
    pub allowed_origins: Vec<String>,
}

#[derive(Deserialize)]
pub struct Jwt {
    pub secret: String,
    #[serde(with = "humantime_serde")]
    pub expiration_time: time::Duration,
}

#[derive(Deserialize)]
pub struct Admin {
    pub password: String,
}

#[derive(Deserialize)]
pub struct Mail {
    pub api_key: String,
    pub from: String,
}

#[derive(Deserialize)]
pub struct Payment {
    pub secret_key: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Deserialize)]
pub struct Storage {
    pub dir: PathBuf,
    pub public_base_url: String,
}
