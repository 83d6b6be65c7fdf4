pub use crate::config::CacheConfig;
pub use crate::errors::CacheConfigError;
pub use crate::key::CacheKey;
pub use crate::layer::local_lru::{LocalLru, PutOutcome};
pub use crate::layer::singleflight::{Flight, FlightOutcome};
pub use crate::loader::{load_config, LoadOptions};
pub use crate::metrics::{CacheStats, SimpleStats};
