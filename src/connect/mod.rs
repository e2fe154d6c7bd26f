//! Server connectivity: probing, caching, and tiered connection racing
//!
//! - `probe` - one reachability check against a candidate URL
//! - `cache` - process-wide serverId -> baseURL map with file persistence
//! - `resolver` - races a server's candidates to find a working base URL

pub mod cache;
pub mod probe;
pub mod resolver;

pub use cache::ConnectionCache;
pub use probe::{HttpProber, Prober};
pub use resolver::{ConnectionResolver, ResolverTiers};
