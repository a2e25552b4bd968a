pub mod config;
pub mod engine;
pub mod logging;
pub mod model;
pub mod notify;
pub mod store;
