//! Mail record wire form
//!
//! `id|sender|r1#r2|subject|body|timestamp`, with subject and body escaped.
//! Multi-record payloads terminate every record with [`RECORD_MARKER`].

use super::escape::{escape, split_unescaped, unescape};
use super::timestamp::{format_timestamp, parse_timestamp};
use super::{FIELD_DELIMITER, RECIPIENT_DELIMITER, RECORD_MARKER};
use crate::error::{ExchangeError, Result};
use crate::store::MailRecord;

/// Number of fields in a single encoded record
pub const RECORD_FIELDS: usize = 6;

pub fn encode_recipients(recipients: &[String]) -> String {
    recipients.join(&RECIPIENT_DELIMITER.to_string())
}

/// Split a `#`-delimited recipient list, trimming and dropping empty entries
pub fn decode_recipients(field: &str) -> Vec<String> {
    field
        .split(RECIPIENT_DELIMITER)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn encode_record(record: &MailRecord) -> String {
    [
        record.id.clone(),
        record.sender.clone(),
        encode_recipients(&record.recipients),
        escape(&record.subject),
        escape(&record.body),
        format_timestamp(&record.timestamp),
    ]
    .join(&FIELD_DELIMITER.to_string())
}

/// Build a record from already split (still escaped) fields
pub fn record_from_fields(fields: &[&str]) -> Result<MailRecord> {
    if fields.len() != RECORD_FIELDS {
        return Err(ExchangeError::Protocol(format!(
            "expected {} record fields, found {}",
            RECORD_FIELDS,
            fields.len()
        )));
    }

    let recipients = decode_recipients(fields[2]);
    if recipients.is_empty() {
        return Err(ExchangeError::Protocol("record has no recipients".to_string()));
    }

    Ok(MailRecord::with_id(
        fields[0],
        fields[1],
        recipients,
        unescape(fields[3]),
        unescape(fields[4]),
        parse_timestamp(fields[5])?,
    ))
}

pub fn decode_record(text: &str) -> Result<MailRecord> {
    record_from_fields(&split_unescaped(text, FIELD_DELIMITER))
}

pub fn encode_records<'a, I>(records: I) -> String
where
    I: IntoIterator<Item = &'a MailRecord>,
{
    let mut payload = String::new();
    for record in records {
        payload.push_str(&encode_record(record));
        payload.push(RECORD_MARKER);
    }
    payload
}

pub fn decode_records(payload: &str) -> Result<Vec<MailRecord>> {
    split_unescaped(payload, RECORD_MARKER)
        .into_iter()
        .filter(|chunk| !chunk.is_empty())
        .map(decode_record)
        .collect()
}
