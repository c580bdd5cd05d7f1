//! Per-connection request loop

use crate::codec::response::{self, Response};
use crate::error::Result;
use crate::server::dispatcher::Dispatcher;
use futures::StreamExt;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Serves one connection: one response line per request line
///
/// Lines are decoded lossily, so bytes that are not UTF-8 still produce a
/// reply. The loop ends on EOF, on a read error, on an over-long line, or
/// when the server is stopping. A request that has been read is always answered
/// before cancellation is checked again.
pub struct Session {
    peer: SocketAddr,
    dispatcher: Dispatcher,
    max_line_length: usize,
    shutdown: CancellationToken,
}

impl Session {
    pub fn new(
        peer: SocketAddr,
        dispatcher: Dispatcher,
        max_line_length: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            peer,
            dispatcher,
            max_line_length,
            shutdown,
        }
    }

    pub async fn handle<S>(self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = FramedRead::new(
            reader,
            AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                Vec::new(),
                self.max_line_length,
            ),
        );

        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Server stopping, closing connection from {}", self.peer);
                    break;
                }
                next = lines.next() => next,
            };

            let line = match next {
                Some(Ok(bytes)) => String::from_utf8_lossy(&bytes)
                    .trim_end_matches('\r')
                    .to_string(),
                Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                    warn!("Line too long from {}, closing connection", self.peer);
                    write_response(&mut writer, &Response::error(response::INVALID_REQUEST))
                        .await?;
                    break;
                }
                Some(Err(AnyDelimiterCodecError::Io(e))) => {
                    warn!("Client connection error from {}: {}", self.peer, e);
                    break;
                }
                None => {
                    info!("Connection closed by {}", self.peer);
                    break;
                }
            };

            debug!("Received from {}: {}", self.peer, line);
            let response = self.dispatcher.dispatch(&line).await;
            debug!("Sending to {}: {}", self.peer, response);
            write_response(&mut writer, &response).await?;
        }

        writer.shutdown().await.ok();
        Ok(())
    }
}

pub async fn write_response<W>(writer: &mut W, response: &Response) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(format!("{}\n", response).as_bytes())
        .await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::exchange::Exchange;
    use crate::storage::csv::{sentinel_row, HEADER};
    use crate::storage::CsvStorage;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, BufReader};

    async fn setup_session(max_line_length: usize) -> (TempDir, Session, CancellationToken) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("storage.csv");
        tokio::fs::write(&path, format!("{}\n{}\n", HEADER, sentinel_row("a@mail.com")))
            .await
            .unwrap();

        let exchange = Exchange::open(CsvStorage::new(path), EventBus::new())
            .await
            .unwrap();
        let token = CancellationToken::new();
        let session = Session::new(
            "127.0.0.1:4000".parse().unwrap(),
            Dispatcher::new(Arc::new(exchange)),
            max_line_length,
            token.clone(),
        );
        (temp_dir, session, token)
    }

    #[tokio::test]
    async fn test_one_response_per_line() {
        let (_temp, session, _token) = setup_session(1024).await;
        let (client, server) = tokio::io::duplex(4096);
        let handle = tokio::spawn(session.handle(server));

        let (reader, mut writer) = tokio::io::split(client);
        let mut reader = BufReader::new(reader);
        writer
            .write_all(b"LOGIN|a@mail.com\nBOGUS\nLOGIN|x@mail.com\n")
            .await
            .unwrap();

        let mut line = String::new();
        for expected in [
            "SUCCESS|Login successful\n",
            "ERROR|Invalid request format\n",
            "ERROR|Client not authorized\n",
        ] {
            line.clear();
            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line, expected);
        }

        writer.shutdown().await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_answered() {
        let (_temp, session, _token) = setup_session(1024).await;
        let (client, server) = tokio::io::duplex(4096);
        let handle = tokio::spawn(session.handle(server));

        let (reader, mut writer) = tokio::io::split(client);
        let mut reader = BufReader::new(reader);
        writer
            .write_all(b"LOGIN|\xff\xfea@mail.com\nLOGIN|a@mail.com|\xff\xfe\r\nLOGIN|a@mail.com\n")
            .await
            .unwrap();

        let mut line = String::new();
        for expected in [
            "ERROR|Client not authorized\n",
            "SUCCESS|Login successful\n",
            "SUCCESS|Login successful\n",
        ] {
            line.clear();
            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line, expected);
        }

        writer.shutdown().await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_over_long_line_closes_connection() {
        let (_temp, session, _token) = setup_session(16).await;
        let (client, server) = tokio::io::duplex(4096);
        let handle = tokio::spawn(session.handle(server));

        let (reader, mut writer) = tokio::io::split(client);
        let mut reader = BufReader::new(reader);
        writer
            .write_all(b"LOGIN|a-very-long-address@mail.com\n")
            .await
            .unwrap();

        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "ERROR|Invalid request format\n");

        handle.await.unwrap().unwrap();
        line.clear();
        assert_eq!(reader.read_line(&mut line).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_ends_idle_session() {
        let (_temp, session, token) = setup_session(1024).await;
        let (_client, server) = tokio::io::duplex(4096);
        let handle = tokio::spawn(session.handle(server));

        token.cancel();
        handle.await.unwrap().unwrap();
    }
}
