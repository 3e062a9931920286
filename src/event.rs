//! Events handed to registered handlers

use crate::{
    constants::{EVENT_CUSTOM, HEADER_TERMINATOR},
    headers::{event_to_map, header_value, url_decode, EventHeader},
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

/// A plain-text event pushed by the switch.
///
/// Keeps the body exactly as received; header values are percent-decoded on
/// lookup. FreeSWITCH `text/event-plain` bodies hold URL-encoded
/// `Name: Value` lines, optionally followed by a blank line and an inner
/// body (e.g. the result of a `BACKGROUND_JOB`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EslEvent {
    name: String,
    body: String,
    conn_id: usize,
}

impl EslEvent {
    /// Wrap an event body received on connection `conn_id`.
    ///
    /// Returns `None` when the body has no `Event-Name` header.
    pub fn from_body(body: impl Into<String>, conn_id: usize) -> Option<Self> {
        let body = body.into();
        let name = header_value(header_section(&body), EventHeader::EventName.as_str())?
            .to_string();
        Some(Self {
            name,
            body,
            conn_id,
        })
    }

    /// Value of `Event-Name`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handler key: `Event-Name`, or `CUSTOM <subclass>` for custom events
    /// that carry an `Event-Subclass`.
    pub fn routing_key(&self) -> Cow<'_, str> {
        if self.name == EVENT_CUSTOM {
            if let Some(subclass) = self
                .subclass()
                .filter(|s| !s.is_empty())
            {
                return Cow::Owned(format!("{} {}", EVENT_CUSTOM, subclass));
            }
        }
        Cow::Borrowed(&self.name)
    }

    /// Body exactly as received.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Index of the connection that delivered the event.
    pub fn conn_id(&self) -> usize {
        self.conn_id
    }

    /// Percent-decoded header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<Cow<'_, str>> {
        self.raw_header(name)
            .map(url_decode)
    }

    /// Header value as it appears on the wire.
    pub fn raw_header(&self, name: impl AsRef<str>) -> Option<&str> {
        header_value(header_section(&self.body), name.as_ref())
    }

    /// All headers, decoded, minus the `exclude` keys.
    pub fn to_map(&self, exclude: &[&str]) -> HashMap<String, String> {
        event_to_map(header_section(&self.body), exclude)
    }

    /// Content after the event headers, if any.
    pub fn inner_body(&self) -> Option<&str> {
        self.body
            .split_once(HEADER_TERMINATOR)
            .map(|(_, inner)| inner)
            .filter(|inner| !inner.is_empty())
    }

    /// Decoded `Event-Subclass` for `CUSTOM` events (e.g. `sofia::register`).
    pub fn subclass(&self) -> Option<Cow<'_, str>> {
        self.header(EventHeader::EventSubclass)
    }

    /// `Unique-ID` of the channel the event is about.
    pub fn unique_id(&self) -> Option<Cow<'_, str>> {
        self.header(EventHeader::UniqueId)
    }

    /// `Job-UUID` from `BACKGROUND_JOB` events.
    pub fn job_uuid(&self) -> Option<Cow<'_, str>> {
        self.header(EventHeader::JobUuid)
    }
}

fn header_section(body: &str) -> &str {
    body.split_once(HEADER_TERMINATOR)
        .map_or(body, |(headers, _)| headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_body_reads_name() {
        let event = EslEvent::from_body(
            "Event-Name: CHANNEL_ANSWER\nUnique-ID: test-uuid\n\n",
            2,
        )
        .unwrap();
        assert_eq!(event.name(), "CHANNEL_ANSWER");
        assert_eq!(event.routing_key(), "CHANNEL_ANSWER");
        assert_eq!(event.unique_id().as_deref(), Some("test-uuid"));
        assert_eq!(event.conn_id(), 2);
    }

    #[test]
    fn test_missing_event_name() {
        assert!(EslEvent::from_body("Reply-Text: +OK\n", 0).is_none());
    }

    #[test]
    fn test_header_percent_decoding() {
        let event = EslEvent::from_body(
            "Event-Name: HEARTBEAT\nUp-Time: 0%20years%2C%200%20days\nEvent-Info: System%20Ready\n",
            0,
        )
        .unwrap();
        assert_eq!(event.header("Up-Time").as_deref(), Some("0 years, 0 days"));
        assert_eq!(event.raw_header("Event-Info"), Some("System%20Ready"));
        assert_eq!(event.header("Absent"), None);
    }

    #[test]
    fn test_custom_routing_key() {
        let event = EslEvent::from_body(
            "Event-Name: CUSTOM\nEvent-Subclass: sofia%3A%3Aregister\n",
            0,
        )
        .unwrap();
        assert_eq!(event.routing_key(), "CUSTOM sofia::register");

        let bare = EslEvent::from_body("Event-Name: CUSTOM\n", 0).unwrap();
        assert_eq!(bare.routing_key(), "CUSTOM");
    }

    #[test]
    fn test_inner_body() {
        let inner = "+OK Status\n";
        let body = format!(
            "Event-Name: BACKGROUND_JOB\nJob-UUID: abc-123\nContent-Length: {}\n\n{}",
            inner.len(),
            inner
        );
        let event = EslEvent::from_body(body, 0).unwrap();
        assert_eq!(event.job_uuid().as_deref(), Some("abc-123"));
        assert_eq!(event.inner_body(), Some(inner));
        let map = event.to_map(&["Content-Length"]);
        assert_eq!(map.len(), 2);
        assert!(!map.contains_key("+OK Status"));
    }

    #[test]
    fn test_inner_body_lines_do_not_shadow_headers() {
        let event =
            EslEvent::from_body("Event-Name: BACKGROUND_JOB\n\nUnique-ID: not-a-header\n", 0)
                .unwrap();
        assert_eq!(event.unique_id(), None);
    }

    #[test]
    fn test_serde_round_trip() {
        let event = EslEvent::from_body("Event-Name: HEARTBEAT\n", 1).unwrap();
        let json = serde_json::to_string(&event).unwrap();
        let back: EslEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
