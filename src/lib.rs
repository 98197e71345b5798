mod builder;
mod metrics;
mod record;
mod store;
pub mod config;
pub mod error;
pub mod expiry;
pub mod listener;
pub mod logging;
pub mod session;
pub mod substrate;

pub use builder::StoreBuilder;
pub use error::{StoreError, SubstrateError};
pub use metrics::stats::Metrics;
pub use record::Record;
pub use store::ExpiringStore;
pub use substrate::{FileSubstrate, MemorySubstrate, Substrate};
