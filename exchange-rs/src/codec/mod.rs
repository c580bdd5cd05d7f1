//! Delimited text codec shared by the wire protocol and the storage file
//!
//! - [`escape`]: backslash escaping of free-text fields
//! - [`record`]: mail record encode/decode
//! - [`response`]: `STATUS|payload` response lines
//! - [`timestamp`]: local date-time format

pub mod escape;
pub mod record;
pub mod response;
pub mod timestamp;

/// Separates fields in requests, responses, records and storage rows
pub const FIELD_DELIMITER: char = '|';

/// Separates addresses inside a recipient field
pub const RECIPIENT_DELIMITER: char = '#';

/// Terminates each record in a multi-record payload
pub const RECORD_MARKER: char = '±';

pub use escape::{escape, split_unescaped, unescape};
pub use record::{decode_record, decode_records, encode_record, encode_records};
pub use response::{Response, Status};
pub use timestamp::{format_timestamp, parse_timestamp};
