pub mod calibration;
pub mod config;
pub mod error;
pub mod geo;
pub mod http_client;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod payload_cache;
pub mod predict;
pub mod stats;
pub mod store;
pub mod update;
