pub mod config;
pub mod errors;
pub mod key;
pub mod layer;
pub mod loader;
pub mod metrics;
pub mod prelude;

pub use config::CacheConfig;
pub use errors::CacheConfigError;
pub use key::CacheKey;
pub use layer::local_lru::{LocalLru, PutOutcome};
pub use layer::singleflight::{Flight, FlightOutcome};
pub use loader::{load_config, load_config_with_options, LoadOptions};
pub use metrics::{CacheStats, SimpleStats};
