//! exchange-rs: store-and-forward mail exchange server
//!
//! Clients connect over TCP, identify themselves by address and issue
//! newline-delimited requests to list, fetch-since, send or delete mail.
//! Mailboxes live in memory and are persisted to a pipe-delimited CSV file,
//! which is the source of truth on start and on reload.
//!
//! # Protocol
//!
//! ```text
//! LOGIN|a@mail.com                                        -> SUCCESS|Login successful
//! GET_ALL_MESSAGES|b@mail.com                             -> SUCCESS|<records> or SUCCESS|No messages found
//! GET_NEW_MESSAGES|b@mail.com|2024-05-01T10:30            -> SUCCESS|<records newer than the date>
//! SEND_EMAIL|a@mail.com|b@mail.com#c@mail.com|Subj|Body|2024-05-01T10:30
//!                                                         -> SUCCESS|Email sent
//! DELETE_EMAIL|b@mail.com|<id>                            -> SUCCESS|Email deleted successfully
//! ```
//!
//! # Example
//!
//! ```no_run
//! use exchange_rs::config::Config;
//! use exchange_rs::events::EventBus;
//! use exchange_rs::exchange::Exchange;
//! use exchange_rs::server::ExchangeServer;
//! use exchange_rs::storage::CsvStorage;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let storage = CsvStorage::new(&config.storage.csv_path);
//!     let exchange = Arc::new(Exchange::open(storage, EventBus::new()).await?);
//!
//!     let server = ExchangeServer::new(config.server.clone(), exchange);
//!     server.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`codec`]: delimited text format for records, requests and responses
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`events`]: broadcast channel of server and mailbox events
//! - [`exchange`]: store + persistence mutated together
//! - [`server`]: acceptor, sessions and request dispatch
//! - [`storage`]: CSV persistence
//! - [`store`]: in-memory mailboxes

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod exchange;
pub mod server;
pub mod storage;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{ExchangeError, Result};
pub use events::{EventBus, ExchangeEvent};
pub use exchange::Exchange;
pub use server::ExchangeServer;
