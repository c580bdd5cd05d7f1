//! Request line parsing
//!
//! Requests have the format: `VERB|address|arg1|arg2...`
//! Example: `SEND_EMAIL|a@mail.com|b@mail.com#c@mail.com|Subject|Body|2024-05-01T10:30`

use crate::codec::escape::{split_unescaped, unescape};
use crate::codec::record::decode_recipients;
use crate::codec::FIELD_DELIMITER;
use crate::error::{ExchangeError, Result};
use crate::store::normalize_address;

/// Request verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Login,
    GetAllMessages,
    GetNewMessages,
    SendEmail,
    DeleteEmail,
}

impl Verb {
    /// Case-insensitive lookup
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "LOGIN" => Some(Self::Login),
            "GET_ALL_MESSAGES" => Some(Self::GetAllMessages),
            "GET_NEW_MESSAGES" => Some(Self::GetNewMessages),
            "SEND_EMAIL" => Some(Self::SendEmail),
            "DELETE_EMAIL" => Some(Self::DeleteEmail),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::GetAllMessages => "GET_ALL_MESSAGES",
            Self::GetNewMessages => "GET_NEW_MESSAGES",
            Self::SendEmail => "SEND_EMAIL",
            Self::DeleteEmail => "DELETE_EMAIL",
        }
    }
}

/// A request split into verb, claimant and unescaped arguments
#[derive(Debug, Clone, PartialEq)]
pub struct RequestLine {
    pub verb: String,
    /// Normalized claimant address
    pub address: String,
    pub args: Vec<String>,
}

impl RequestLine {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let fields = split_unescaped(line, FIELD_DELIMITER);

        if fields.len() < 2 {
            return Err(ExchangeError::Protocol(format!(
                "Invalid request: {}",
                line
            )));
        }

        Ok(Self {
            verb: fields[0].trim().to_string(),
            address: normalize_address(fields[1]),
            args: fields[2..].iter().map(|f| unescape(f)).collect(),
        })
    }

    fn arg(&self, index: usize, name: &str) -> Result<&str> {
        self.args.get(index).map(String::as_str).ok_or_else(|| {
            ExchangeError::Protocol(format!("{} requires {}", self.verb, name))
        })
    }
}

/// A fully parsed request
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login,
    GetAllMessages,
    GetNewMessages {
        from_date: String,
    },
    SendEmail {
        recipients: Vec<String>,
        subject: String,
        body: String,
        date: String,
    },
    DeleteEmail {
        id: String,
    },
}

impl Command {
    /// Build the command for a known verb; missing arguments are a protocol error
    pub fn from_request(verb: Verb, request: &RequestLine) -> Result<Self> {
        match verb {
            Verb::Login => Ok(Command::Login),
            Verb::GetAllMessages => Ok(Command::GetAllMessages),
            Verb::GetNewMessages => Ok(Command::GetNewMessages {
                from_date: request.arg(0, "a date")?.to_string(),
            }),
            Verb::SendEmail => {
                let recipients = decode_recipients(request.arg(0, "recipients")?);
                if recipients.is_empty() {
                    return Err(ExchangeError::Protocol("missing recipients".to_string()));
                }
                Ok(Command::SendEmail {
                    recipients,
                    subject: request.arg(1, "a subject")?.to_string(),
                    body: request.arg(2, "a body")?.to_string(),
                    date: request.arg(3, "a date")?.to_string(),
                })
            }
            Verb::DeleteEmail => Ok(Command::DeleteEmail {
                id: request.arg(0, "an email id")?.trim().to_string(),
            }),
        }
    }
}
