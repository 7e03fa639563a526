//! Chunked transfer-coding codec (RFC 7230 section 4.1)
//!
//! Decoding works against the same kind of flat byte slice the request
//! parser already hands out (no intermediate allocation for the encoded
//! framing); only the decoded payload is copied into the caller-supplied
//! output buffer.

use memchr::memchr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ChunkedError {
    /// The chunk-size line is not a valid hex number, or the line is
    /// missing its terminating `\r\n`/`\n`.
    MalformedSize,
    /// A chunk extension contained a `CR`, `LF` or `NUL` byte.
    InvalidExtension,
    /// The decoded body would exceed the configured limit.
    TooLarge,
    /// The input ended before a terminating `0`-chunk was seen.
    Incomplete,
    /// Trailer section is malformed.
    InvalidTrailer,
}

/// Decodes a complete chunked body already sitting in `input`.
///
/// Returns the number of bytes of `input` that were consumed (through and
/// including the terminating `CRLF` of the trailer section) and writes the
/// reassembled payload into `out`. `out` is not cleared beforehand.
pub(crate) fn decode_all(
    input: &[u8],
    out: &mut Vec<u8>,
    max_len: usize,
) -> Result<usize, ChunkedError> {
    let mut pos = 0;

    loop {
        let line_end = memchr(b'\n', &input[pos..]).ok_or(ChunkedError::Incomplete)? + pos;
        let mut size_line = &input[pos..line_end];
        if size_line.last() == Some(&b'\r') {
            size_line = &size_line[..size_line.len() - 1];
        }

        let size_str = match memchr(b';', size_line) {
            Some(semi) => {
                let ext = &size_line[semi + 1..];
                if ext.iter().any(|&b| matches!(b, b'\r' | b'\n' | 0)) {
                    return Err(ChunkedError::InvalidExtension);
                }
                &size_line[..semi]
            }
            None => size_line,
        };

        let chunk_size =
            usize::from_str_radix(std::str::from_utf8(size_str).map_err(|_| ChunkedError::MalformedSize)?, 16)
                .map_err(|_| ChunkedError::MalformedSize)?;

        pos = line_end + 1;

        if chunk_size == 0 {
            return decode_trailer(input, pos, out.len().saturating_sub(0)).map(|end| end);
        }

        if out.len() + chunk_size > max_len {
            return Err(ChunkedError::TooLarge);
        }

        let data_end = pos + chunk_size;
        let data = input.get(pos..data_end).ok_or(ChunkedError::Incomplete)?;
        out.extend_from_slice(data);

        pos = data_end;
        match input.get(pos..pos + 2) {
            Some(b"\r\n") => pos += 2,
            _ => match input.get(pos..pos + 1) {
                Some(b"\n") => pos += 1,
                _ => return Err(ChunkedError::Incomplete),
            },
        }
    }
}

// Consumes the trailer section (possibly empty) following the terminal
// `0` chunk and returns the total number of input bytes consumed.
fn decode_trailer(input: &[u8], mut pos: usize, _body_len: usize) -> Result<usize, ChunkedError> {
    loop {
        let line_end = memchr(b'\n', &input[pos..])
            .ok_or(ChunkedError::Incomplete)?
            + pos;
        let mut line = &input[pos..line_end];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }

        pos = line_end + 1;

        if line.is_empty() {
            return Ok(pos);
        }
        if memchr(b':', line).is_none() {
            return Err(ChunkedError::InvalidTrailer);
        }
    }
}

/// Wraps `data` as a single chunk (`<hex-size>\r\n<data>\r\n`) and appends it
/// to `buffer`. Used by [`Response`](crate::Response) when streaming a
/// chunked body.
pub(crate) fn encode_chunk(data: &[u8], buffer: &mut Vec<u8>) {
    if data.is_empty() {
        return;
    }

    let mut size_buf = [0u8; 16];
    let hex_len = write_hex(data.len(), &mut size_buf);

    buffer.extend_from_slice(&size_buf[..hex_len]);
    buffer.extend_from_slice(b"\r\n");
    buffer.extend_from_slice(data);
    buffer.extend_from_slice(b"\r\n");
}

/// Appends the terminal `0\r\n\r\n` chunk that ends a chunked body.
pub(crate) fn encode_last_chunk(buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(b"0\r\n\r\n");
}

fn write_hex(mut value: usize, out: &mut [u8; 16]) -> usize {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";

    if value == 0 {
        out[0] = b'0';
        return 1;
    }

    let mut tmp = [0u8; 16];
    let mut i = 16;
    while value > 0 {
        i -= 1;
        tmp[i] = DIGITS[value & 0xf];
        value >>= 4;
    }

    let len = 16 - i;
    out[..len].copy_from_slice(&tmp[i..]);
    len
}
