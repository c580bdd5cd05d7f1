//! Core mail types shared by the store, the codec and the persistence layer

use crate::codec::{FIELD_DELIMITER, RECIPIENT_DELIMITER, RECORD_MARKER};
use chrono::NaiveDateTime;
use uuid::Uuid;

/// Characters with a meaning in the wire and storage formats; addresses
/// travel unescaped, so they can never contain these
const RESERVED_IN_ADDRESS: [char; 4] = [
    FIELD_DELIMITER,
    RECIPIENT_DELIMITER,
    RECORD_MARKER,
    '\\',
];

/// Lowercase-normalized mailbox address
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// True if a normalized address can be registered
pub fn is_valid_address(address: &str) -> bool {
    !address.is_empty()
        && !address.contains(RESERVED_IN_ADDRESS)
        && !address.chars().any(char::is_control)
}

/// One immutable mail item
///
/// The same record (same id) is delivered once per recipient, so it may
/// live in several mailboxes at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailRecord {
    pub id: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    /// Unescaped body text; may contain newlines and field delimiters
    pub body: String,
    pub timestamp: NaiveDateTime,
}

impl MailRecord {
    /// Create a record with a freshly generated id
    pub fn new(
        sender: impl Into<String>,
        recipients: Vec<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self::with_id(
            Uuid::new_v4().to_string(),
            sender,
            recipients,
            subject,
            body,
            timestamp,
        )
    }

    /// Create a record with a known id (used when loading from storage)
    pub fn with_id(
        id: impl Into<String>,
        sender: impl Into<String>,
        recipients: Vec<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            recipients,
            subject: subject.into(),
            body: body.into(),
            timestamp,
        }
    }

    pub fn is_after(&self, since: &NaiveDateTime) -> bool {
        self.timestamp > *since
    }
}
