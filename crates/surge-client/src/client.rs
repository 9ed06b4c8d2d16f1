use async_trait::async_trait;
use tracing::debug;

use crate::{Connection, StompSource};
use surge_core::{Command, Connector, Frame, MessageSource, Result, SurgeError};

/// Opens STOMP sessions over plain WebSockets, e.g. the raw WebSocket
/// transport of a SockJS endpoint (`ws://host:port/ws/websocket`).
#[derive(Debug, Default, Clone)]
pub struct StompConnector;

impl StompConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for StompConnector {
    async fn connect(&self, address: &str, client_id: &str) -> Result<Box<dyn MessageSource>> {
        let mut connection = Connection::open(address).await?;
        let connect = Frame::connect(connection.host(), client_id);
        connection.send(&connect).await?;

        loop {
            match connection.receive().await {
                Ok(Some(frame)) => match frame.command {
                    Command::Connected => {
                        debug!(
                            "[{}] STOMP session established (version {})",
                            client_id,
                            frame.get_header("version").unwrap_or("1.0")
                        );
                        return Ok(Box::new(StompSource::new(
                            client_id.to_string(),
                            connection,
                        )));
                    }
                    Command::Error => {
                        connection.close().await;
                        return Err(SurgeError::Protocol(frame.error_reason()));
                    }
                    other => debug!("[{}] ignoring {} frame before CONNECTED", client_id, other),
                },
                Ok(None) => {
                    return Err(SurgeError::Connect(format!(
                        "{} closed the connection during the STOMP handshake",
                        address
                    )))
                }
                Err(e) => return Err(SurgeError::Connect(e.to_string())),
            }
        }
    }
}
