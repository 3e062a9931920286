//! Protocol constants and configuration defaults

/// Default FreeSWITCH ESL port for inbound connections
pub const DEFAULT_ESL_PORT: u16 = 8021;

/// Maximum single message size (8MB) - validates Content-Length header
/// No legitimate ESL message should exceed this (largest is sofia status ~1-2MB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Read buffer capacity for the framed reader
pub const SOCKET_BUF_SIZE: usize = 64 * 1024;

/// Protocol message terminators
pub const HEADER_TERMINATOR: &str = "\n\n";
pub const LINE_TERMINATOR: &str = "\n";

/// Separator between a header name and its value.
pub const HEADER_SEPARATOR: &str = ": ";

/// Content-Type header values
pub const CONTENT_TYPE_AUTH_REQUEST: &str = "auth/request";
pub const CONTENT_TYPE_COMMAND_REPLY: &str = "command/reply";
pub const CONTENT_TYPE_API_RESPONSE: &str = "api/response";
pub const CONTENT_TYPE_TEXT_EVENT_PLAIN: &str = "text/event-plain";
pub const CONTENT_TYPE_DISCONNECT_NOTICE: &str = "text/disconnect-notice";

/// Protocol framing header names (not event payload).
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
/// Protocol framing header: body length.
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
/// Protocol framing header: command reply status.
pub const HEADER_REPLY_TEXT: &str = "Reply-Text";

/// Reply marker for a successful `auth`.
pub const AUTH_ACCEPTED: &str = "+OK accepted";
/// Reply prefix for success.
pub const REPLY_OK: &str = "+OK";
/// Reply prefix for failure, in both `Reply-Text` and `api/response` bodies.
pub const REPLY_ERR: &str = "-ERR";

/// Subscription keyword for every event.
pub const EVENT_ALL: &str = "ALL";
/// Event name carrying a subclass in `Event-Subclass`.
pub const EVENT_CUSTOM: &str = "CUSTOM";

/// TCP connect timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Command response timeout in milliseconds
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5000;

/// Dial attempts per `connect()` call
pub const DEFAULT_RECONNECTS: usize = 5;

/// Dial attempts the reader makes after losing the socket
pub const READER_RECONNECTS: usize = 3;

/// One unit of reconnect backoff in milliseconds
pub const DEFAULT_RECONNECT_UNIT_MS: u64 = 1000;

/// Maximum number of queued events before dropping
pub const MAX_EVENT_QUEUE_SIZE: usize = 1000;

/// Handlers allowed to run at the same time
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 64;
