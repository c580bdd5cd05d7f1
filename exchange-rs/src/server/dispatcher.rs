//! Request dispatch
//!
//! Parses one request line, authorizes the claimant and routes the command
//! to the exchange. Every line yields exactly one [`Response`]; no error
//! escapes to the connection handler.

use crate::codec::parse_timestamp;
use crate::codec::record::encode_records;
use crate::codec::response::{self, Response};
use crate::error::ExchangeError;
use crate::events::ExchangeEvent;
use crate::exchange::Exchange;
use crate::server::commands::{Command, RequestLine, Verb};
use crate::store::MailRecord;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct Dispatcher {
    exchange: Arc<Exchange>,
}

impl Dispatcher {
    pub fn new(exchange: Arc<Exchange>) -> Self {
        Self { exchange }
    }

    pub async fn dispatch(&self, line: &str) -> Response {
        let request = match RequestLine::parse(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Error handling request: {}", e);
                return Response::error(response::INVALID_REQUEST);
            }
        };

        if !self.exchange.is_registered(&request.address).await {
            warn!("REQUEST BY NON REGISTERED CLIENT: {}", request.address);
            self.exchange.events().publish(ExchangeEvent::Unauthorized {
                address: request.address.clone(),
            });
            return Response::error(response::NOT_AUTHORIZED);
        }

        let Some(verb) = Verb::from_str(&request.verb) else {
            warn!("Invalid request type: {}", request.verb);
            return Response::error(response::UNKNOWN_REQUEST);
        };

        let command = match Command::from_request(verb, &request) {
            Ok(command) => command,
            Err(e) => {
                warn!("Malformed {} from {}: {}", verb.as_str(), request.address, e);
                return Response::error(response::INVALID_REQUEST);
            }
        };

        debug!("Handling {} from {}", verb.as_str(), request.address);
        self.handle_command(&request.address, command).await
    }

    async fn handle_command(&self, address: &str, command: Command) -> Response {
        match command {
            Command::Login => self.handle_login(address),
            Command::GetAllMessages => self.handle_get_all(address).await,
            Command::GetNewMessages { from_date } => {
                self.handle_get_new(address, &from_date).await
            }
            Command::SendEmail {
                recipients,
                subject,
                body,
                date,
            } => {
                self.handle_send(address, &recipients, &subject, &body, &date)
                    .await
            }
            Command::DeleteEmail { id } => self.handle_delete(address, &id).await,
        }
    }

    fn handle_login(&self, address: &str) -> Response {
        info!("Successful login by {}", address);
        Response::success(response::LOGIN_SUCCESSFUL)
    }

    async fn handle_get_all(&self, address: &str) -> Response {
        let records = self.exchange.list_all(address).await;
        listing_response(address, &records)
    }

    async fn handle_get_new(&self, address: &str, from_date: &str) -> Response {
        let since = match parse_timestamp(from_date) {
            Ok(since) => since,
            Err(e) => {
                warn!("GET_NEW_MESSAGES from {}: {}", address, e);
                return Response::error(response::INVALID_DATE);
            }
        };

        let records = self.exchange.list_since(address, &since).await;
        listing_response(address, &records)
    }

    async fn handle_send(
        &self,
        address: &str,
        recipients: &[String],
        subject: &str,
        body: &str,
        date: &str,
    ) -> Response {
        let timestamp = match parse_timestamp(date) {
            Ok(timestamp) => timestamp,
            Err(e) => {
                warn!("SEND_EMAIL from {}: {}", address, e);
                return Response::error(response::INVALID_DATE);
            }
        };

        match self
            .exchange
            .send(address, recipients, subject, body, timestamp)
            .await
        {
            Ok(record) => {
                info!("Email {} from {}", record.id, address);
                Response::success(response::EMAIL_SENT)
            }
            Err(ExchangeError::UnknownRecipients(unknown)) => {
                warn!(
                    "Email from {} not sent, unknown recipients: {}",
                    address,
                    unknown.join(", ")
                );
                Response::error(response::UNKNOWN_RECIPIENTS)
            }
            Err(e) => {
                error!("Error sending email from {}: {}", address, e);
                Response::error(response::SEND_FAILED)
            }
        }
    }

    async fn handle_delete(&self, address: &str, id: &str) -> Response {
        match self.exchange.delete(address, id).await {
            Ok(()) => {
                info!("Deleted email {} for {}", id, address);
                Response::success(response::EMAIL_DELETED)
            }
            Err(ExchangeError::NotFound(what)) => {
                warn!("Delete by {} failed, not found: {}", address, what);
                Response::error(response::DELETE_NOT_FOUND)
            }
            Err(e) => {
                error!("Error deleting email {} for {}: {}", id, address, e);
                Response::error(response::DELETE_FAILED)
            }
        }
    }
}

fn listing_response(address: &str, records: &[MailRecord]) -> Response {
    if records.is_empty() {
        debug!("Sending 0 messages to {}", address);
        return Response::success(response::NO_MESSAGES);
    }
    debug!("Sending {} messages to {}", records.len(), address);
    Response::success(encode_records(records))
}
