//! Protocol frame and its wire codec.
//!
//! A frame is a STOMP-style unit: command line, `key:value` header lines, a
//! blank line, then the raw body. On the wire each frame travels inside a
//! SockJS-style envelope: the array classifier byte `a` followed by a JSON
//! array containing exactly one string, the serialized frame text.

use crate::constants::{classify, headers};
use crate::error::{WireError, WireResult};
use std::fmt;
use std::str::FromStr;

/// Fixed command vocabulary of the gateway protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Message => "MESSAGE",
            Self::Error => "ERROR",
            Self::Disconnect => "DISCONNECT",
        }
    }
}

impl FromStr for Command {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Self::Connect),
            "CONNECTED" => Ok(Self::Connected),
            "SEND" => Ok(Self::Send),
            "SUBSCRIBE" => Ok(Self::Subscribe),
            "UNSUBSCRIBE" => Ok(Self::Unsubscribe),
            "MESSAGE" => Ok(Self::Message),
            "ERROR" => Ok(Self::Error),
            "DISCONNECT" => Ok(Self::Disconnect),
            other => Err(WireError::FrameDecode(format!("unknown command: {other}"))),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol message unit.
///
/// Header order is insertion order and is preserved through encode/decode;
/// duplicate header keys are not representable (`set_header` overwrites in
/// place).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: Command,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    /// Set a header, overwriting an existing value in place. Keys are
    /// case-sensitive.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.headers.iter_mut().find(|(k, _)| *k == name) {
            entry.1 = value;
        } else {
            self.headers.push((name, value));
        }
    }

    /// Builder-style header setter.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serialize this frame into one wire envelope unit.
    ///
    /// A non-empty body forces a `content-length` header carrying the body's
    /// byte length before transmission.
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        let mut frame = self.clone();
        if !frame.body.is_empty() {
            frame.set_header(headers::CONTENT_LENGTH, frame.body.len().to_string());
        }

        let body_text = std::str::from_utf8(&frame.body).map_err(|_| WireError::NonUtf8Body)?;

        let mut text = String::with_capacity(64 + frame.body.len());
        text.push_str(frame.command.as_str());
        text.push('\n');
        for (name, value) in &frame.headers {
            text.push_str(name);
            text.push(':');
            text.push_str(value);
            text.push('\n');
        }
        text.push('\n');
        text.push_str(body_text);

        let array = serde_json::to_string(&[text])?;
        let mut out = Vec::with_capacity(array.len() + 1);
        out.push(classify::ARRAY);
        out.extend_from_slice(array.as_bytes());
        Ok(out)
    }

    /// Parse one wire envelope unit back into a frame.
    ///
    /// Any malformed input (missing classifier, unparsable JSON, a JSON array
    /// that is not exactly one string, missing blank-line separator, unknown
    /// command) yields [`WireError::FrameDecode`]. Callers treat that as
    /// fatal to this frame only: log and drop, never tear the session down.
    pub fn decode(unit: &[u8]) -> WireResult<Self> {
        let payload = unit
            .strip_prefix(&[classify::ARRAY])
            .ok_or_else(|| WireError::FrameDecode("missing array classifier".to_string()))?;

        let strings: Vec<String> = serde_json::from_slice(payload)
            .map_err(|e| WireError::FrameDecode(format!("envelope is not a JSON array: {e}")))?;
        if strings.len() != 1 {
            return Err(WireError::FrameDecode(format!(
                "envelope array has {} elements, expected 1",
                strings.len()
            )));
        }
        let text = &strings[0];

        let (head, body) = text
            .split_once("\n\n")
            .ok_or_else(|| WireError::FrameDecode("missing blank-line separator".to_string()))?;

        let mut lines = head.lines();
        let command_line = lines
            .next()
            .ok_or_else(|| WireError::FrameDecode("empty frame".to_string()))?;
        let command = Command::from_str(command_line)?;

        let mut frame = Frame::new(command);
        for line in lines {
            let (name, value) = line.split_once(':').ok_or_else(|| {
                WireError::FrameDecode(format!("malformed header line: {line:?}"))
            })?;
            frame.set_header(name, value);
        }
        frame.body = body.as_bytes().to_vec();
        Ok(frame)
    }
}
