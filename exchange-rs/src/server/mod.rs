//! Line-based exchange protocol server
//!
//! - [`commands`]: request line parsing
//! - [`dispatcher`]: authorization and routing to the exchange
//! - [`session`]: per-connection read/dispatch/write loop
//! - [`server`]: listening socket, bounded worker pool, start/stop

pub mod commands;
pub mod dispatcher;
pub mod server;
pub mod session;

pub use commands::{Command, RequestLine, Verb};
pub use dispatcher::Dispatcher;
pub use server::ExchangeServer;
pub use session::Session;
