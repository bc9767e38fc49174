pub mod client;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod middleware;
pub mod pipeline;
pub mod sink;
pub mod telemetry;

pub use client::*;
pub use config::*;
pub use error::*;
pub use ingestion::*;
pub use middleware::*;
pub use pipeline::*;
pub use sink::*;
pub use telemetry::*;
