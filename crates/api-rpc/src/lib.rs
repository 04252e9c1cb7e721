//! JSON-RPC API for the Siphon master: queue administration and the
//! assignment request endpoint.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
