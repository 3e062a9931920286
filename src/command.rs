//! Command formatting and reply handling

use crate::{
    constants::{
        EVENT_ALL, EVENT_CUSTOM, HEADER_REPLY_TEXT, HEADER_TERMINATOR, LINE_TERMINATOR, REPLY_ERR,
        REPLY_OK,
    },
    error::{EslError, EslResult},
    headers::EventHeader,
};
use std::collections::HashMap;
use std::fmt;

/// Validate that a user-provided string contains no newline characters.
///
/// ESL commands are line-delimited; embedded newlines would allow injection
/// of arbitrary protocol commands.
fn validate_no_newlines(s: &str, context: &str) -> EslResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(EslError::protocol_error(format!(
            "{} must not contain newlines",
            context
        )));
    }
    Ok(())
}

/// Reply-Text classification.
///
/// FreeSWITCH commands return `+OK …` on success and `-ERR …` on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReplyStatus {
    /// Reply-Text starts with `+OK` or is absent/empty.
    Ok,
    /// Reply-Text starts with `-ERR`.
    Err,
    /// Reply-Text present but matches neither prefix.
    Other,
}

/// Reply to a command: a `command/reply` or `api/response` frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EslReply {
    headers: HashMap<String, String>,
    body: Option<String>,
    status: ReplyStatus,
}

impl EslReply {
    /// `ReplyStatus` is derived from the `Reply-Text` header.
    pub fn new(headers: HashMap<String, String>, body: Option<String>) -> Self {
        let status = match headers
            .get(HEADER_REPLY_TEXT)
            .map(|s| s.as_str())
        {
            None | Some("") => ReplyStatus::Ok,
            Some(t) if t.starts_with(REPLY_OK) => ReplyStatus::Ok,
            Some(t) if t.starts_with(REPLY_ERR) => ReplyStatus::Err,
            Some(_) => ReplyStatus::Other,
        };

        Self {
            headers,
            body,
            status,
        }
    }

    /// `true` if Reply-Text is `+OK` or absent.
    pub fn is_success(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    pub fn reply_status(&self) -> ReplyStatus {
        self.status
    }

    /// Response body (the `api/` response payload).
    pub fn body(&self) -> Option<&str> {
        self.body
            .as_deref()
    }

    /// Look up a reply header by name.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .map(|s| s.as_str())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Raw `Reply-Text` header value (e.g. `+OK`, `-ERR invalid command`).
    pub fn reply_text(&self) -> Option<&str> {
        self.header(HEADER_REPLY_TEXT)
    }

    /// `Job-UUID` header from `bgapi` replies.
    pub fn job_uuid(&self) -> Option<&str> {
        self.header(EventHeader::JobUuid)
    }

    /// Fail with [`EslError::CommandFailed`] when Reply-Text is `-ERR`.
    pub fn into_result(self) -> EslResult<Self> {
        match self.status {
            ReplyStatus::Err => Err(EslError::CommandFailed {
                reply_text: self
                    .reply_text()
                    .unwrap_or(REPLY_ERR)
                    .to_string(),
            }),
            _ => Ok(self),
        }
    }

    /// Body of an `api` reply, failing with [`EslError::CommandFailed`] when
    /// it carries `-ERR`.
    pub fn into_api_body(self) -> EslResult<String> {
        let body = self
            .body
            .unwrap_or_default();
        if body.contains(REPLY_ERR) {
            return Err(EslError::CommandFailed {
                reply_text: body
                    .trim_end()
                    .to_string(),
            });
        }
        Ok(body)
    }
}

/// Build the `event plain` subscription list for a set of handler names.
///
/// `ALL` anywhere wins and becomes `all`. Names of the form
/// `CUSTOM <subclass>` are gathered behind one `CUSTOM` token. Returns
/// `None` when there is nothing to subscribe to.
pub fn subscription_list<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut plain: Vec<&str> = Vec::new();
    let mut subclasses: Vec<&str> = Vec::new();
    for name in names {
        if name == EVENT_ALL {
            return Some("all".to_string());
        }
        let subclass = name
            .strip_prefix(EVENT_CUSTOM)
            .filter(|rest| rest.is_empty() || rest.starts_with(' '))
            .map(str::trim);
        match subclass {
            Some("") => plain.push(EVENT_CUSTOM),
            Some(subclass) => subclasses.push(subclass),
            None => plain.push(name),
        }
    }
    if !subclasses.is_empty() {
        plain.retain(|n| *n != EVENT_CUSTOM);
        plain.push(EVENT_CUSTOM);
        plain.extend(subclasses);
    }
    if plain.is_empty() {
        return None;
    }
    Some(plain.join(" "))
}

/// ESL command types
#[derive(Clone)]
pub enum EslCommand {
    /// Authenticate with password
    Auth { password: String },
    /// Execute API command
    Api { command: String },
    /// Execute background API command
    BgApi { command: String },
    /// Subscribe to plain-text events
    Events { events: String },
    /// Add an event filter
    Filter { header: String, value: String },
    /// Send a message to a channel
    SendMsg {
        uuid: String,
        headers: Vec<(String, String)>,
    },
    /// No operation / keepalive
    NoOp,
    /// Close the session
    Exit,
    /// A raw command line, sent verbatim
    Raw { line: String },
}

impl fmt::Debug for EslCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EslCommand::Auth { .. } => f
                .debug_struct("Auth")
                .field("password", &"[REDACTED]")
                .finish(),
            EslCommand::Api { command } => f
                .debug_struct("Api")
                .field("command", command)
                .finish(),
            EslCommand::BgApi { command } => f
                .debug_struct("BgApi")
                .field("command", command)
                .finish(),
            EslCommand::Events { events } => f
                .debug_struct("Events")
                .field("events", events)
                .finish(),
            EslCommand::Filter { header, value } => f
                .debug_struct("Filter")
                .field("header", header)
                .field("value", value)
                .finish(),
            EslCommand::SendMsg { uuid, headers } => f
                .debug_struct("SendMsg")
                .field("uuid", uuid)
                .field("headers", headers)
                .finish(),
            EslCommand::NoOp => write!(f, "NoOp"),
            EslCommand::Exit => write!(f, "Exit"),
            EslCommand::Raw { line } => f
                .debug_struct("Raw")
                .field("line", line)
                .finish(),
        }
    }
}

impl EslCommand {
    /// Format a simple command with optional arguments
    fn format_simple_command(cmd: &str, args: &[&str]) -> String {
        let mut result = String::from(cmd);
        for arg in args {
            result.push(' ');
            result.push_str(arg);
        }
        result.push_str(HEADER_TERMINATOR);
        result
    }

    /// Validate all user-supplied fields, then convert to wire format.
    pub fn to_wire_format(&self) -> EslResult<String> {
        match self {
            EslCommand::Auth { password } => {
                validate_no_newlines(password, "password")?;
                Ok(Self::format_simple_command("auth", &[password]))
            }
            EslCommand::Api { command } => {
                validate_no_newlines(command, "api command")?;
                Ok(Self::format_simple_command("api", &[command]))
            }
            EslCommand::BgApi { command } => {
                validate_no_newlines(command, "bgapi command")?;
                Ok(Self::format_simple_command("bgapi", &[command]))
            }
            EslCommand::Events { events } => {
                validate_no_newlines(events, "event list")?;
                Ok(Self::format_simple_command("event plain", &[events]))
            }
            EslCommand::Filter { header, value } => {
                validate_no_newlines(header, "filter header")?;
                validate_no_newlines(value, "filter value")?;
                Ok(Self::format_simple_command("filter", &[header, value]))
            }
            EslCommand::SendMsg { uuid, headers } => {
                validate_no_newlines(uuid, "sendmsg uuid")?;
                let mut result = format!("sendmsg {}{}", uuid, LINE_TERMINATOR);
                for (name, value) in headers {
                    validate_no_newlines(name, "sendmsg header name")?;
                    validate_no_newlines(value, "sendmsg header value")?;
                    result.push_str(&format!("{}: {}{}", name, value, LINE_TERMINATOR));
                }
                result.push_str(LINE_TERMINATOR);
                Ok(result)
            }
            EslCommand::NoOp => Ok(Self::format_simple_command("noop", &[])),
            EslCommand::Exit => Ok(Self::format_simple_command("exit", &[])),
            EslCommand::Raw { line } => {
                let line = line.trim_end_matches(['\r', '\n']);
                validate_no_newlines(line, "command")?;
                Ok(Self::format_simple_command(line, &[]))
            }
        }
    }

    /// Log-safe rendering of the command line.
    pub(crate) fn describe(&self) -> String {
        match self {
            EslCommand::Auth { .. } => "auth [REDACTED]".to_string(),
            other => other
                .to_wire_format()
                .map(|s| {
                    s.lines()
                        .next()
                        .unwrap_or_default()
                        .to_string()
                })
                .unwrap_or_else(|_| format!("{:?}", other)),
        }
    }
}
