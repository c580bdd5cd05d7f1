//! `STATUS|payload` response lines

use super::FIELD_DELIMITER;
use std::fmt;

pub const LOGIN_SUCCESSFUL: &str = "Login successful";
pub const NO_MESSAGES: &str = "No messages found";
pub const EMAIL_SENT: &str = "Email sent";
pub const EMAIL_DELETED: &str = "Email deleted successfully";

pub const INVALID_REQUEST: &str = "Invalid request format";
pub const NOT_AUTHORIZED: &str = "Client not authorized";
pub const UNKNOWN_REQUEST: &str = "Unknown request type";
pub const INVALID_DATE: &str = "Invalid date format";
pub const UNKNOWN_RECIPIENTS: &str =
    "Email not sent, one or more recipients are not in the users list";
pub const SEND_FAILED: &str = "Failed to send email";
pub const DELETE_NOT_FOUND: &str = "Failed to delete email: Email id not found";
pub const DELETE_FAILED: &str = "Failed to delete email";
pub const SERVER_BUSY: &str = "Server busy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Error => "ERROR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(Status::Success),
            "ERROR" => Some(Status::Error),
            _ => None,
        }
    }
}

/// One response line, without the trailing newline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub payload: String,
}

impl Response {
    pub fn success(payload: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            payload: payload.into(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            payload: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// True for the "zero mail" sentinel payload
    pub fn is_empty_listing(&self) -> bool {
        self.is_success() && self.payload == NO_MESSAGES
    }

    /// Parse a response line; the payload is everything after the first delimiter
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (status, payload) = line.split_once(FIELD_DELIMITER)?;
        Some(Self {
            status: Status::from_str(status)?,
            payload: payload.to_string(),
        })
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.status.as_str(), FIELD_DELIMITER, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Response::success(EMAIL_SENT).to_string(), "SUCCESS|Email sent");
        assert_eq!(
            Response::error(NOT_AUTHORIZED).to_string(),
            "ERROR|Client not authorized"
        );
    }

    #[test]
    fn test_parse_keeps_payload_delimiters() {
        let response = Response::parse("SUCCESS|id|a@mail.com|b@mail.com|s|b|2024-05-01T09:00±\n")
            .unwrap();
        assert!(response.is_success());
        assert!(response.payload.starts_with("id|a@mail.com"));
        assert!(response.payload.ends_with('±'));
    }

    #[test]
    fn test_empty_listing_sentinel() {
        assert!(Response::success(NO_MESSAGES).is_empty_listing());
        assert!(!Response::error(NO_MESSAGES).is_empty_listing());
    }

    #[test]
    fn test_parse_rejects_unknown_status() {
        assert!(Response::parse("MAYBE|whatever").is_none());
        assert!(Response::parse("SUCCESS").is_none());
    }
}
