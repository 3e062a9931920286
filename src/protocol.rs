//! ESL framing: turns the byte stream into header blocks with optional
//! Content-Length bodies.

use crate::{
    command::EslReply,
    constants::{
        CONTENT_TYPE_API_RESPONSE, CONTENT_TYPE_AUTH_REQUEST, CONTENT_TYPE_COMMAND_REPLY,
        CONTENT_TYPE_DISCONNECT_NOTICE, CONTENT_TYPE_TEXT_EVENT_PLAIN, HEADER_CONTENT_LENGTH,
        HEADER_CONTENT_TYPE, MAX_MESSAGE_SIZE,
    },
    error::{EslError, EslResult},
    headers::split_header_line,
};
use std::collections::HashMap;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tracing::trace;

/// Frame classification derived from `Content-Type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Unsolicited challenge sent right after the TCP connect
    AuthRequest,
    /// Reply to a control command (`auth`, `event`, `filter`, `sendmsg`, ...)
    CommandReply,
    /// Reply to an `api` command
    ApiResponse,
    /// Plain-text event pushed by the switch
    Event,
    /// The switch is about to close the socket
    DisconnectNotice,
    /// Missing or unrecognized Content-Type
    Unknown(Option<String>),
}

impl FrameKind {
    /// Classify a frame by its Content-Type value.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(CONTENT_TYPE_AUTH_REQUEST) => FrameKind::AuthRequest,
            Some(CONTENT_TYPE_COMMAND_REPLY) => FrameKind::CommandReply,
            Some(CONTENT_TYPE_API_RESPONSE) => FrameKind::ApiResponse,
            Some(CONTENT_TYPE_TEXT_EVENT_PLAIN) => FrameKind::Event,
            Some(CONTENT_TYPE_DISCONNECT_NOTICE) => FrameKind::DisconnectNotice,
            other => FrameKind::Unknown(other.map(str::to_string)),
        }
    }
}

/// One protocol unit: a header block and an optional body.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    kind: FrameKind,
    raw_headers: String,
    headers: HashMap<String, String>,
    body: Option<String>,
}

impl Frame {
    /// Build a frame from a raw header block and optional body.
    ///
    /// Header values are taken verbatim (no percent-decoding); a repeated
    /// header keeps its last value.
    pub fn new(raw_headers: String, body: Option<String>) -> Self {
        let headers = parse_headers(&raw_headers);
        let kind = FrameKind::from_content_type(
            headers
                .get(HEADER_CONTENT_TYPE)
                .map(String::as_str),
        );
        Self {
            kind,
            raw_headers,
            headers,
            body,
        }
    }

    pub fn kind(&self) -> &FrameKind {
        &self.kind
    }

    /// Look up a frame header by exact name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Header block exactly as received, without the terminating blank line.
    pub fn raw_headers(&self) -> &str {
        &self.raw_headers
    }

    pub fn body(&self) -> Option<&str> {
        self.body
            .as_deref()
    }

    /// Length of the body, as announced by Content-Length.
    pub fn content_length(&self) -> usize {
        self.body
            .as_ref()
            .map_or(0, String::len)
    }

    /// `true` for frames answering a command (`api/response` or `command/reply`).
    pub fn is_reply(&self) -> bool {
        matches!(self.kind, FrameKind::ApiResponse | FrameKind::CommandReply)
    }

    pub fn into_reply(self) -> EslReply {
        EslReply::new(self.headers, self.body)
    }

    pub fn into_body(self) -> Option<String> {
        self.body
    }
}

fn parse_headers(block: &str) -> HashMap<String, String> {
    block
        .lines()
        .filter_map(split_header_line)
        .map(|(name, value)| (name.to_string(), value.trim().to_string()))
        .collect()
}

/// Reads frames off a buffered byte stream.
///
/// None of the read methods are cancel-safe: dropping one mid-frame loses
/// the partially read bytes, so a cancelled reader must be discarded along
/// with its socket.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Return the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read lines until a blank line and return the accumulated block.
    ///
    /// Blank lines before the first header are skipped. A clean EOF before
    /// any header byte is `ConnectionClosed`; EOF inside a block is an
    /// I/O error.
    pub async fn read_headers(&mut self) -> EslResult<String> {
        let mut block = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| match e.kind() {
                    io::ErrorKind::InvalidData => EslError::framing("invalid UTF-8 in headers"),
                    _ => EslError::Io(e),
                })?;

            if n == 0 {
                if block.is_empty() {
                    return Err(EslError::ConnectionClosed);
                }
                return Err(EslError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed inside header block",
                )));
            }

            if line.trim_end_matches(['\r', '\n']).is_empty() {
                if block.is_empty() {
                    continue;
                }
                trace!("[RECV] header block complete ({} bytes)", block.len());
                return Ok(block);
            }

            if block.len() + line.len() > MAX_MESSAGE_SIZE {
                return Err(EslError::framing(format!(
                    "header block exceeds {} bytes",
                    MAX_MESSAGE_SIZE
                )));
            }
            block.push_str(&line);
        }
    }

    /// Read exactly `len` body bytes.
    pub async fn read_body(&mut self, len: usize) -> EslResult<String> {
        let mut buf = vec![0u8; len];
        self.reader
            .read_exact(&mut buf)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => {
                    EslError::framing(format!("short body: expected {} bytes", len))
                }
                _ => EslError::Io(e),
            })?;
        String::from_utf8(buf).map_err(|_| EslError::framing("invalid UTF-8 in body"))
    }

    /// Read one complete frame.
    pub async fn read_frame(&mut self) -> EslResult<Frame> {
        let raw_headers = self
            .read_headers()
            .await?;
        let frame = Frame::new(raw_headers, None);

        let Some(length_str) = frame.header(HEADER_CONTENT_LENGTH) else {
            return Ok(frame);
        };
        let length: usize = length_str
            .trim()
            .parse()
            .map_err(|_| EslError::framing(format!("invalid Content-Length: {:?}", length_str)))?;

        if length > MAX_MESSAGE_SIZE {
            return Err(EslError::framing(format!(
                "Content-Length {} exceeds limit {}",
                length, MAX_MESSAGE_SIZE
            )));
        }
        if length == 0 {
            return Ok(frame);
        }

        let body = self
            .read_body(length)
            .await?;
        trace!("[RECV] {:?} frame with {} byte body", frame.kind, length);
        Ok(Frame { body: Some(body), ..frame })
    }
}
