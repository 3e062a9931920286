//! Header codec: lookups on raw header blocks, percent-decoding, and
//! conversion of plain-text event bodies into maps.

use crate::constants::HEADER_SEPARATOR;
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::collections::HashMap;

/// Error returned when parsing an unrecognized event header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventHeaderError(pub String);

impl std::fmt::Display for ParseEventHeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown event header: {}", self.0)
    }
}

impl std::error::Error for ParseEventHeaderError {}

define_header_enum! {
    error_type: ParseEventHeaderError,
    /// Header names found inside plain-text event bodies.
    ///
    /// Use with [`EslEvent::header()`](crate::EslEvent::header) or
    /// [`header_value`] for typed lookups.
    pub enum EventHeader {
        EventName => "Event-Name",
        EventSubclass => "Event-Subclass",
        UniqueId => "Unique-ID",
        JobUuid => "Job-UUID",
        CoreUuid => "Core-UUID",
        CallDirection => "Call-Direction",
        ChannelName => "Channel-Name",
        HangupCause => "Hangup-Cause",
        TaskDesc => "Task-Desc",
    }
}

/// Look up `name` in a raw `Name: Value` header block.
///
/// Only matches `name` at the start of a line, so `Type` never matches
/// `Content-Type`. The value is everything after `": "` up to the line end,
/// trimmed. Returns `None` when the header is absent and `Some("")` when it
/// is present with an empty value. The first occurrence wins.
///
/// ```
/// use freeswitch_esl_session::headers::header_value;
///
/// let block = "Event-Name: RE_SCHEDULE\nTask-Desc: heartbeat\n";
/// assert_eq!(header_value(block, "Task-Desc"), Some("heartbeat"));
/// assert_eq!(header_value(block, "Missing"), None);
/// ```
pub fn header_value<'a>(block: &'a str, name: &str) -> Option<&'a str> {
    block
        .lines()
        .find_map(|line| {
            line.strip_prefix(name)?
                .strip_prefix(HEADER_SEPARATOR)
                .map(str::trim)
        })
        .or_else(|| {
            // "Name:" with nothing after the colon
            block
                .lines()
                .find(|line| {
                    line.strip_prefix(name)
                        .map(|rest| rest.trim_end() == ":")
                        .unwrap_or(false)
                })
                .map(|_| "")
        })
}

/// Percent-decode a header value.
///
/// Returns the input unchanged when it contains a malformed escape or
/// decodes to invalid UTF-8. `+` is left alone; FreeSWITCH encodes spaces
/// as `%20`.
pub fn url_decode(value: &str) -> Cow<'_, str> {
    if !value.contains('%') || !is_well_formed(value) {
        return Cow::Borrowed(value);
    }
    percent_decode_str(value)
        .decode_utf8()
        .unwrap_or(Cow::Borrowed(value))
}

fn is_well_formed(value: &str) -> bool {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            match bytes.get(i + 1..i + 3) {
                Some([a, b]) if a.is_ascii_hexdigit() && b.is_ascii_hexdigit() => i += 3,
                _ => return false,
            }
        } else {
            i += 1;
        }
    }
    true
}

/// Split a header line on the first `": "`, trimming line terminators from
/// the value. Lines without the separator yield `None`.
pub(crate) fn split_header_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(HEADER_SEPARATOR)?;
    Some((name, value.trim_end_matches(['\r', '\n'])))
}

/// Convert a plain-text event body into a map of decoded header values.
///
/// Lines without `": "` are skipped, the last occurrence of a key wins, and
/// keys listed in `exclude` are dropped.
///
/// ```
/// use freeswitch_esl_session::headers::event_to_map;
///
/// let body = "Event-Name: HEARTBEAT\nUp-Time: 0%20years\nCore-UUID: abc\n";
/// let map = event_to_map(body, &["Core-UUID"]);
/// assert_eq!(map["Up-Time"], "0 years");
/// assert!(!map.contains_key("Core-UUID"));
/// ```
pub fn event_to_map(body: &str, exclude: &[&str]) -> HashMap<String, String> {
    body.lines()
        .filter_map(split_header_line)
        .filter(|(name, _)| !exclude.contains(name))
        .map(|(name, value)| (name.to_string(), url_decode(value).into_owned()))
        .collect()
}

/// Parse the CSV table printed by `show channels` into one map per row.
///
/// The first line holds the column names. Parsing stops at the first blank
/// line or the trailing `N total.` summary. Commas inside `{}`, `[]` or `()`
/// groups do not split columns. Rows whose column count differs from the
/// header are skipped.
pub fn map_chan_data(text: &str) -> Vec<HashMap<String, String>> {
    let mut lines = text.lines();
    let columns: Vec<&str> = match lines.next() {
        Some(first) if !first.trim().is_empty() => first
            .trim_end()
            .split(',')
            .collect(),
        _ => return Vec::new(),
    };

    lines
        .take_while(|line| !line.trim().is_empty() && !line.trim_end().ends_with(" total."))
        .filter_map(|line| {
            let fields = split_ignoring_groups(line.trim_end(), ',');
            if fields.len() != columns.len() {
                return None;
            }
            Some(
                columns
                    .iter()
                    .zip(fields)
                    .map(|(col, field)| (col.to_string(), field.to_string()))
                    .collect(),
            )
        })
        .collect()
}

fn split_ignoring_groups(line: &str, sep: char) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in line.char_indices() {
        match c {
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                fields.push(&line[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    fields.push(&line[start..]);
    fields
}
