pub mod app;
pub mod config;
pub mod curator;
pub mod custodian;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod herald;
pub mod maintenance;
pub mod models;
pub mod reaper;
pub mod sage;
pub mod schedule;
pub mod server;
