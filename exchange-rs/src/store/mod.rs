//! In-memory mailbox store
//!
//! - [`types`]: mail record and address normalization
//! - [`mailbox`]: one user's ordered, id-unique mailbox
//! - [`mail_store`]: the shared map of users to mailboxes

pub mod mail_store;
pub mod mailbox;
pub mod types;

pub use mail_store::{MailStore, Mailboxes};
pub use mailbox::Mailbox;
pub use types::{is_valid_address, normalize_address, MailRecord};
