pub mod client;
pub mod config;
pub mod executor;
pub mod user;

pub use client::{ClientError, PingOneClient, PingOneUser};
pub use config::{PingOneConfig, Region};
pub use executor::PingOneExecutor;
