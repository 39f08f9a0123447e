//! Coordinator RPC surface.
//!
//! Requests are normalized: each carries the routing key of its coordinator
//! (transactional id or group id) and the logical version of the client that
//! sent it. Responses carry an [`ErrorCode`] degraded to what that client
//! understands.

mod error_code;
mod requests;
mod service;


pub use error_code::*;
pub use requests::*;
pub use service::*;
