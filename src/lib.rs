pub mod api;
pub mod config;
pub mod db;
pub mod mail;
pub mod payment;
pub mod storage;
pub mod workflow;

pub use self::config::Config;
