//! STOMP 1.2 frame codec.
//!
//! Frames travel as WebSocket text messages: `COMMAND\n`, `name:value\n`
//! headers, a blank line, the body, and a terminating NUL. A bare end-of-line
//! is a heart-beat. One WebSocket message may carry several frames.

use std::{fmt, str::FromStr};

use thiserror::Error;

const NUL: char = '\0';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown STOMP command `{0}`")]
    UnknownCommand(String),
    #[error("malformed header line `{0}`")]
    MalformedHeader(String),
    #[error("invalid escape sequence in `{0}`")]
    InvalidEscape(String),
    #[error("invalid content-length `{0}`")]
    InvalidContentLength(String),
    #[error("frame is not NUL terminated")]
    MissingTerminator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// `CONNECT` and `CONNECTED` carry raw header values.
    const fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of `name`; repeated headers keep the first occurrence.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn connect(host: &str, authorization: &str) -> Self {
        Self::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0")
            .header("Authorization", authorization)
    }

    #[must_use]
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    #[must_use]
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).header("id", id)
    }

    #[must_use]
    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        Self::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .with_body(body)
    }

    #[must_use]
    pub fn disconnect(receipt: &str) -> Self {
        Self::new(Command::Disconnect).header("receipt", receipt)
    }

    /// Serializes the frame, adding `content-length` for non-empty bodies.
    #[must_use]
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            push_header_part(&mut out, name, escape);
            out.push(':');
            push_header_part(&mut out, value, escape);
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(NUL);
        out
    }
}

fn push_header_part(out: &mut String, raw: &str, escape: bool) {
    if !escape {
        out.push_str(raw);
        return;
    }
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

fn split_line(input: &str) -> Option<(&str, &str)> {
    let idx = input.find('\n')?;
    let line = input[..idx].strip_suffix('\r').unwrap_or(&input[..idx]);
    Some((line, &input[idx + 1..]))
}

fn parse_one(input: &str) -> Result<(Frame, &str), FrameError> {
    let (command_line, mut rest) = split_line(input).ok_or(FrameError::MissingTerminator)?;
    let command: Command = command_line.parse()?;
    let escaped = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let (line, remaining) = split_line(rest).ok_or(FrameError::MissingTerminator)?;
        rest = remaining;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        if escaped {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let mut frame = Frame {
        command,
        headers,
        body: String::new(),
    };

    let remaining = match frame.get("content-length") {
        Some(raw) => {
            let len: usize = raw
                .trim()
                .parse()
                .map_err(|_| FrameError::InvalidContentLength(raw.to_string()))?;
            if rest.len() <= len {
                return Err(FrameError::MissingTerminator);
            }
            if !rest.is_char_boundary(len) {
                return Err(FrameError::InvalidContentLength(raw.to_string()));
            }
            if rest.as_bytes()[len] != 0 {
                return Err(FrameError::MissingTerminator);
            }
            frame.body = rest[..len].to_string();
            &rest[len + 1..]
        }
        None => {
            let end = rest.find(NUL).ok_or(FrameError::MissingTerminator)?;
            frame.body = rest[..end].to_string();
            &rest[end + 1..]
        }
    };

    Ok((frame, remaining))
}

/// Decodes every frame in one WebSocket text message.
///
/// Heart-beats produce nothing. A malformed frame yields an error entry and
/// decoding resumes after its NUL terminator.
#[must_use]
pub fn decode_batch(input: &str) -> Vec<Result<Frame, FrameError>> {
    let mut frames = Vec::new();
    let mut rest = input;
    loop {
        rest = rest.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            break;
        }
        match parse_one(rest) {
            Ok((frame, remaining)) => {
                frames.push(Ok(frame));
                rest = remaining;
            }
            Err(err) => {
                frames.push(Err(err));
                match rest.find(NUL) {
                    Some(idx) => rest = &rest[idx + 1..],
                    None => break,
                }
            }
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_send_frame_with_content_length() {
        let frame = Frame::send("/app/chat.sendMessage", r#"{"content":"hi"}"#);
        assert_eq!(
            frame.encode(),
            "SEND\ndestination:/app/chat.sendMessage\ncontent-type:application/json\ncontent-length:16\n\n{\"content\":\"hi\"}\0"
        );
    }

    #[test]
    fn encodes_frame_without_body() {
        assert_eq!(
            Frame::unsubscribe("sub-1").encode(),
            "UNSUBSCRIBE\nid:sub-1\n\n\0"
        );
    }

    #[test]
    fn connect_headers_are_not_escaped() {
        let encoded = Frame::connect("fleet.example.com", "Bearer a:b").encode();
        assert!(encoded.contains("Authorization:Bearer a:b\n"));
        assert!(encoded.contains("accept-version:1.2\n"));
    }

    #[test]
    fn escapes_and_unescapes_header_values() {
        let frame = Frame::new(Command::Message)
            .header("destination", "/topic/conversation/1")
            .header("note", "a:b\nc\\d");
        let encoded = frame.encode();
        assert!(encoded.contains("note:a\\cb\\nc\\\\d\n"));

        let decoded = decode_batch(&encoded);
        assert_eq!(decoded, vec![Ok(frame)]);
    }

    #[test]
    fn decodes_message_frame() {
        let raw = "MESSAGE\r\nsubscription:sub-0\r\ndestination:/topic/public\r\nmessage-id:7\r\n\r\n{\"id\":1}\0";
        let frames = decode_batch(raw);

        assert_eq!(frames.len(), 1);
        let frame = frames[0].as_ref().unwrap();
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("subscription"), Some("sub-0"));
        assert_eq!(frame.get("destination"), Some("/topic/public"));
        assert_eq!(frame.body, "{\"id\":1}");
    }

    #[test]
    fn content_length_allows_embedded_nul() {
        let raw = "MESSAGE\ncontent-length:5\n\nab\0cd\0";
        let frames = decode_batch(raw);
        assert_eq!(frames[0].as_ref().unwrap().body, "ab\0cd");
    }

    #[test]
    fn heartbeats_decode_to_nothing() {
        assert!(decode_batch("\n").is_empty());
        assert!(decode_batch("\r\n\n").is_empty());
    }

    #[test]
    fn decodes_several_frames_in_one_message() {
        let raw = format!(
            "{}\n{}",
            Frame::new(Command::Receipt).header("receipt-id", "r-1").encode(),
            Frame::new(Command::Message)
                .header("subscription", "sub-1")
                .with_body("x")
                .encode()
        );
        let frames = decode_batch(&raw);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap().command, Command::Receipt);
        assert_eq!(frames[1].as_ref().unwrap().body, "x");
    }

    #[test]
    fn repeated_headers_keep_first_value() {
        let raw = "MESSAGE\nfoo:first\nfoo:second\n\n\0";
        let frames = decode_batch(raw);
        assert_eq!(frames[0].as_ref().unwrap().get("foo"), Some("first"));
    }

    #[test]
    fn reports_errors_and_resynchronises() {
        let raw = "BOGUS\n\n\0CONNECTED\nversion:1.2\n\n\0";
        let frames = decode_batch(raw);

        assert_eq!(
            frames[0],
            Err(FrameError::UnknownCommand("BOGUS".to_string()))
        );
        assert_eq!(frames[1].as_ref().unwrap().command, Command::Connected);
    }

    #[test]
    fn missing_terminator_is_an_error() {
        let frames = decode_batch("MESSAGE\n\nunterminated");
        assert_eq!(frames, vec![Err(FrameError::MissingTerminator)]);
    }

    #[test]
    fn invalid_escape_is_an_error() {
        let frames = decode_batch("MESSAGE\nbad:\\t\n\n\0");
        assert!(matches!(frames[0], Err(FrameError::InvalidEscape(_))));
    }

    #[test]
    fn malformed_header_is_an_error() {
        let frames = decode_batch("MESSAGE\nno-colon\n\n\0");
        assert_eq!(
            frames[0],
            Err(FrameError::MalformedHeader("no-colon".to_string()))
        );
    }
}
