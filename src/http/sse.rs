//! `text/event-stream` framing helper for [`Response::sse`](super::response::Response::sse)
//! (the EventSource spec, as formatted by `tremolo`'s `lib/sse.py`).
//!
//! Like [`sendfile`](super::sendfile), this module only decides the bytes --
//! the headers to send and the `data:`/`event:`/`id:`/`retry:` framing of
//! each event -- given a caller-supplied batch of events. It does not own a
//! long-lived connection: this crate's `Response` is a whole-buffer, one
//! response per request design (see `DESIGN.md`), so unlike a true
//! EventSource server push, the events making up one SSE response must be
//! known before the response is finalized rather than trickled out over an
//! open connection. Wrap it with `Response::sse`, passing every event that
//! response will carry.

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SseError {
    /// `event`, `id`, or `data` contained a CR, LF (other than as a
    /// `data` line separator), or NUL byte.
    InvalidField,
}

/// One `text/event-stream` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SseEvent<'a> {
    /// The `data:` payload. A multi-line value is split on `\n` into one
    /// `data:` line per segment, per the EventSource framing rules.
    pub data: &'a str,
    /// Optional `event:` name.
    pub event: Option<&'a str>,
    /// Optional `id:` value.
    pub id: Option<&'a str>,
    /// Optional `retry:` reconnection time, in milliseconds.
    pub retry: Option<u32>,
}

/// Appends `event`'s wire framing to `buf`. Returns [`SseError::InvalidField`]
/// without modifying `buf` if any field (other than `data`'s line breaks)
/// contains a bare CR, LF, or NUL.
pub(crate) fn encode_event(event: &SseEvent<'_>, buf: &mut Vec<u8>) -> Result<(), SseError> {
    if has_nul_or_cr(event.data) {
        return Err(SseError::InvalidField);
    }
    if let Some(name) = event.event {
        if has_crlf_or_nul(name) {
            return Err(SseError::InvalidField);
        }
    }
    if let Some(id) = event.id {
        if has_crlf_or_nul(id) {
            return Err(SseError::InvalidField);
        }
    }

    let start = buf.len();

    for line in event.data.trim_matches('\n').split('\n') {
        buf.extend_from_slice(b"data: ");
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
    }

    if let Some(name) = event.event {
        buf.extend_from_slice(b"event: ");
        buf.extend_from_slice(name.as_bytes());
        buf.push(b'\n');
    }
    if let Some(id) = event.id {
        buf.extend_from_slice(b"id: ");
        buf.extend_from_slice(id.as_bytes());
        buf.push(b'\n');
    }
    if let Some(retry) = event.retry {
        buf.extend_from_slice(b"retry: ");
        buf.extend_from_slice(retry.to_string().as_bytes());
        buf.push(b'\n');
    }

    buf.push(b'\n');
    debug_assert!(buf.len() > start, "an SSE event must write at least one line");

    Ok(())
}

#[inline]
fn has_crlf_or_nul(s: &str) -> bool {
    s.bytes().any(|b| matches!(b, b'\r' | b'\n' | 0))
}

#[inline]
fn has_nul_or_cr(s: &str) -> bool {
    s.bytes().any(|b| matches!(b, b'\r' | 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_event() {
        let mut buf = Vec::new();
        encode_event(&SseEvent { data: "hello", ..Default::default() }, &mut buf).unwrap();
        assert_eq!(buf, b"data: hello\n\n");
    }

    #[test]
    fn multi_line_data_splits_into_multiple_data_lines() {
        let mut buf = Vec::new();
        encode_event(&SseEvent { data: "line1\nline2", ..Default::default() }, &mut buf).unwrap();
        assert_eq!(buf, b"data: line1\ndata: line2\n\n");
    }

    #[test]
    fn leading_and_trailing_newlines_are_trimmed_before_splitting() {
        let mut buf = Vec::new();
        encode_event(&SseEvent { data: "\nhello\n\n", ..Default::default() }, &mut buf).unwrap();
        assert_eq!(buf, b"data: hello\n\n");
    }

    #[test]
    fn full_field_set() {
        let mut buf = Vec::new();
        encode_event(
            &SseEvent {
                data: "payload",
                event: Some("update"),
                id: Some("42"),
                retry: Some(5000),
            },
            &mut buf,
        )
        .unwrap();
        assert_eq!(buf, b"data: payload\nevent: update\nid: 42\nretry: 5000\n\n");
    }

    #[test]
    fn crlf_in_event_name_is_rejected() {
        let mut buf = Vec::new();
        let err = encode_event(
            &SseEvent { data: "x", event: Some("bad\r\nheader"), ..Default::default() },
            &mut buf,
        )
        .unwrap_err();
        assert_eq!(err, SseError::InvalidField);
        assert!(buf.is_empty());
    }

    #[test]
    fn nul_in_id_is_rejected() {
        let mut buf = Vec::new();
        let err = encode_event(
            &SseEvent { data: "x", id: Some("a\0b"), ..Default::default() },
            &mut buf,
        )
        .unwrap_err();
        assert_eq!(err, SseError::InvalidField);
    }
}
