pub mod admission;
pub mod cancel;
pub mod config;
pub mod connection;
pub mod context;
pub mod dedup_store;
pub mod error;
pub mod reporter;
pub mod server;
pub mod shutdown;
pub mod sink;
pub mod stats;
pub mod telemetry;
pub mod token;
pub mod worker;

pub use error::*;
pub use server::Server;
pub use telemetry::init_tracing;
pub use token::Token;
