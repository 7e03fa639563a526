//! Byte-range / `If-Modified-Since` / `If-Range` framing decisions for
//! serving a file's bytes through a [`Response`](super::response::Response)
//! (RFC 7233).
//!
//! This module only decides *what to send* -- status code, `Content-Range`
//! header values, and which byte slices make up the body -- given a file's
//! mtime, size, and already-loaded bytes. Opening the file is the caller's
//! job (see [`Response::send_file`](super::response::Response::send_file),
//! which wraps this with `tokio::fs`).

use httpdate::{fmt_http_date, parse_http_date};
use memchr::memchr;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum RangeError {
    /// The `Range` header's syntax could not be parsed.
    Malformed,
    /// The header parsed fine but no byte of the file satisfies it.
    Unsatisfiable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// Parses a `Range: bytes=a-b, c-d, -n, m-` header value against a file of
/// `file_size` bytes. Each resulting interval satisfies
/// `0 <= start <= end < file_size`.
pub(crate) fn parse_ranges(header: &[u8], file_size: u64) -> Result<Vec<ByteRange>, RangeError> {
    let header = header.strip_prefix(b"bytes=").ok_or(RangeError::Malformed)?;
    if file_size == 0 {
        return Err(RangeError::Unsatisfiable);
    }

    let mut ranges = Vec::new();
    for spec in header.split(|&b| b == b',') {
        let spec = trim(spec);
        if spec.is_empty() {
            return Err(RangeError::Malformed);
        }

        let dash = memchr(b'-', spec).ok_or(RangeError::Malformed)?;
        let (start_s, end_s) = (&spec[..dash], &spec[dash + 1..]);

        let range = if start_s.is_empty() {
            let suffix_len = parse_u64(end_s)?;
            if suffix_len == 0 {
                return Err(RangeError::Unsatisfiable);
            }
            let suffix_len = suffix_len.min(file_size);
            ByteRange {
                start: file_size - suffix_len,
                end: file_size - 1,
            }
        } else {
            let start = parse_u64(start_s)?;
            let end = if end_s.is_empty() {
                file_size - 1
            } else {
                parse_u64(end_s)?
            };

            if start > end || start >= file_size {
                return Err(RangeError::Unsatisfiable);
            }

            ByteRange {
                start,
                end: end.min(file_size - 1),
            }
        };

        ranges.push(range);
    }

    if ranges.is_empty() {
        return Err(RangeError::Malformed);
    }

    Ok(ranges)
}

fn trim(mut s: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = s {
        s = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = s {
        s = rest;
    }
    s
}

fn parse_u64(s: &[u8]) -> Result<u64, RangeError> {
    if s.is_empty() || !s.iter().all(u8::is_ascii_digit) {
        return Err(RangeError::Malformed);
    }
    std::str::from_utf8(s)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(RangeError::Malformed)
}

/// `If-Modified-Since` matches the file's mtime exactly (both compared at
/// RFC 1123 GMT / one-second resolution).
pub(crate) fn is_not_modified(if_modified_since: &[u8], mtime: SystemTime) -> bool {
    header_matches_mtime(if_modified_since, mtime)
}

/// `If-Range` matches the file's mtime; a mismatch degrades a `Range`
/// request to a full `200` response.
pub(crate) fn if_range_matches(if_range: &[u8], mtime: SystemTime) -> bool {
    header_matches_mtime(if_range, mtime)
}

fn header_matches_mtime(header: &[u8], mtime: SystemTime) -> bool {
    match std::str::from_utf8(header).ok().and_then(|s| parse_http_date(s).ok()) {
        Some(parsed) => fmt_http_date(parsed) == fmt_http_date(mtime),
        None => false,
    }
}

/// A boundary token for `multipart/byteranges`, deterministic in the file's
/// size and mtime so repeated requests for the same (unchanged) file produce
/// the same boundary (this crate allocates nothing random after startup).
pub(crate) fn boundary_token(mtime: SystemTime, file_size: u64) -> String {
    let secs = mtime
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    format!("----Boundary{:x}{:x}", secs, file_size)
}
