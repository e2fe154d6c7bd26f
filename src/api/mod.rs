//! API clients for the account and server endpoints
//!
//! - Account: the provider-side resource list (servers + connection paths)
//! - Server: per-server library sections, items, and collections

pub mod account;
pub mod server;

pub use account::AccountClient;
pub use server::ServerClient;
