use bytes::Bytes;
use std::fmt;

/// STOMP frame commands used by a subscribing client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // Client frames
    Connect,
    Subscribe,
    Unsubscribe,
    Disconnect,

    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "CONNECT" | "STOMP" => Command::Connect,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            _ => return None,
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame. Headers keep their wire order; on lookup the first
/// occurrence wins.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn connect(host: &str, client_id: &str) -> Self {
        Frame::new(Command::Connect)
            .header("accept-version", "1.2,1.1,1.0")
            .header("host", host)
            .header("heart-beat", "0,0")
            .header("client-id", client_id)
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    /// Human readable reason carried by an ERROR frame.
    pub fn error_reason(&self) -> String {
        let message = self.get_header("message").unwrap_or("unknown error");
        let body = String::from_utf8_lossy(&self.body);
        let body = body.trim();
        if body.is_empty() {
            message.to_string()
        } else {
            format!("{}: {}", message, body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        for command in [
            Command::Connect,
            Command::Subscribe,
            Command::Unsubscribe,
            Command::Disconnect,
            Command::Connected,
            Command::Message,
            Command::Receipt,
            Command::Error,
        ] {
            assert_eq!(Command::parse(command.as_str()), Some(command));
        }
        assert_eq!(Command::parse("STOMP"), Some(Command::Connect));
        assert_eq!(Command::parse("connect"), None);
    }

    #[test]
    fn test_error_reason() {
        let frame = Frame::new(Command::Error)
            .header("message", "Access denied")
            .with_body("no such topic\n");
        assert_eq!(frame.error_reason(), "Access denied: no such topic");
        assert_eq!(Frame::new(Command::Error).error_reason(), "unknown error");
    }

    #[test]
    fn test_first_header_wins() {
        let frame = Frame::new(Command::Message)
            .header("destination", "/topic/a")
            .header("destination", "/topic/b");
        assert_eq!(frame.get_header("destination"), Some("/topic/a"));
        assert_eq!(frame.get_header("subscription"), None);
    }
}
