pub mod config;
pub mod error;
pub mod http_client;
pub mod model;
pub mod provider;
pub mod provider_factory;
pub mod providers;
pub mod router;
pub mod stream;
pub mod telemetry;
pub mod transport;
