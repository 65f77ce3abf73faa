pub mod catalog;
pub mod cleanup;
pub mod config;
pub mod constants;
pub mod error;
pub mod loader;
pub mod logging;
pub mod migration;
pub mod populate;
pub mod reshape;
pub mod schema;
pub mod sql;
pub mod store;
pub mod transform;
pub mod verify;
