pub mod cli;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod market;
pub mod metrics;
pub mod scheduler;
pub mod store;
pub mod trigger;

pub mod error;
pub mod time;
