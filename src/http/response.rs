//! A highly efficient, zero-allocation HTTP response builder for embedded web servers.

use crate::{
    http::{
        chunked,
        cookie::CookieOptions,
        sendfile,
        sse::{self, SseEvent},
        types::{StatusCode, Version},
    },
    limits::RespLimits,
    BodyWriter, WriteBuffer,
};
use std::{borrow::Cow, path::Path, rc::Rc, sync::Arc, time::SystemTime};

#[derive(Debug)]
/// HTTP response builder for constructing server responses.
///
/// Provides a fluent interface for building HTTP responses with status codes,
/// headers, and body content. Automatically handles content-length calculation
/// and connection management.
///
/// Build responses by chaining methods in strict order:
/// - `HTTP/1.x`: [`status()`](Response::status) -> headers ->
///   any body method
/// - `HTTP/0.9`: Any `HTTP/0.9+` method
///
/// **To disable [`HTTP/0.9+`](crate::limits::Http09Limits) support, omit
/// [`http_09_limits`](crate::ServerBuilder::http_09_limits)
/// when creating the [`Server`](crate::Server).**
///
/// Instances are created automatically by the server and passed to
/// the [`Handler::handle`](crate::Handler::handle).
///
/// # Examples
/// ```
/// use maker_web::{Handled, Request, Response, StatusCode};
///
/// // In your implementation `Handler`
/// async fn handle(_req: &Request, resp: &mut Response) -> Handled {
///     resp
///         .status(StatusCode::Ok)
///         .header("content-type", "text/html")
///         .body("<h1>Hello World</h1>")
/// }
/// ```
///
/// # Panics
/// Call-order/state-machine checks (e.g. calling [`header()`](Self::header)
/// before [`status()`](Self::status)) run in `debug` mode only and are
/// omitted in `release` for performance — those are handler-author mistakes,
/// not untrusted input, so test before a release build. Checks against
/// untrusted input ([`cookie()`](Self::cookie)/[`sse()`](Self::sse)
/// rejecting a CR, LF, or NUL byte) run in every build profile instead of
/// panicking: the response is replaced with a `500`.
pub struct Response {
    buffer: Vec<u8>,
    pub(crate) version: Version,
    pub(crate) keep_alive: bool,
    pub(crate) upgraded: bool,
    posit_length: usize,
    start_body: usize,
    state: ResponseState,
    /// Set by [`cookie()`](Self::cookie)/[`sse()`](Self::sse) when untrusted
    /// input carries a CR, LF, or NUL byte. Checked by every finalizing
    /// method, which discards whatever was buffered so far and ships a
    /// `500` instead — this has to survive in every build profile, not just
    /// `debug`, since it is rejecting attacker-controlled bytes rather than
    /// catching a handler-author mistake.
    tainted: Option<&'static str>,
}

#[doc(hidden)]
pub struct Handled(());

#[derive(Debug, Clone, Copy, PartialEq)]
enum ResponseState {
    Clean,
    Headers,
    Complete,
}

impl Response {
    #[inline(always)]
    pub(crate) fn new(limits: &RespLimits) -> Self {
        Self {
            buffer: Vec::with_capacity(limits.default_capacity),
            version: Version::Http11,
            keep_alive: true,
            upgraded: false,
            posit_length: 0,
            start_body: 0,
            state: ResponseState::Clean,
            tainted: None,
        }
    }

    #[inline(always)]
    pub(crate) fn reset(&mut self, limits: &RespLimits) {
        if self.buffer.capacity() > limits.max_capacity {
            self.buffer = Vec::with_capacity(limits.default_capacity);
        } else {
            self.buffer.clear();
        }

        self.version = Version::Http11;
        self.keep_alive = true;
        self.upgraded = false;
        self.posit_length = 0;
        self.start_body = 0;
        self.state = ResponseState::Clean;
        self.tainted = None;
    }

    #[inline(always)]
    pub(crate) fn buffer(&self) -> &Vec<u8> {
        &self.buffer
    }

    /// Whether [`upgrade()`](Self::upgrade) finalized this response.
    #[inline(always)]
    pub(crate) fn is_upgraded(&self) -> bool {
        self.upgraded
    }
}

/// Methods that work with all protocols
impl Response {
    /// Forces the connection to close after a response.
    ///
    /// # Examples
    /// ```
    /// # maker_web::run_test(|req, resp| {
    /// use maker_web::{StatusCode, Version};
    ///
    /// if req.version() == Version::Http09 {
    ///     resp.close().http09("Closing connection")
    /// } else {
    ///     resp.status(StatusCode::Ok)
    ///         .close()  // Connection will close after this response
    ///         .body("Closing connection")
    /// }
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error messages:
    /// - `Must be called before any finalizing method`
    ///
    /// Panics in `debug` mode when:
    /// - Called after any finalizing method (method returning `Handler`)
    #[inline]
    #[track_caller]
    pub fn close(&mut self) -> &mut Self {
        debug_assert!(
            self.state != ResponseState::Complete,
            "Must be called before any finalizing method",
        );

        self.keep_alive = false;
        self
    }
}

/// Methods for working with `HTTP/1.X` (HTTP/1.1 or HTTP/1.1)
impl Response {
    /// Sets the HTTP status code for the response.
    ///
    /// # Examples
    /// ```
    /// # maker_web::run_test(|_, resp| {
    /// use maker_web::StatusCode;
    ///
    /// resp.status(StatusCode::NotFound)
    ///     .body(r#"{"status": "not found", "code": 404}"#)
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error messages:
    /// - `Must be first and called only once`
    /// - <code>This method is only for \`HTTP/1.X\`</code>
    ///
    /// Panics in `debug` mode when:
    /// - Called multiple times
    /// - Called after any body method
    /// - Called for a non-HTTP/1.X response
    #[inline]
    #[track_caller]
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        debug_assert!(
            self.state == ResponseState::Clean,
            "Must be first and called only once"
        );
        debug_assert!(
            self.version != Version::Http09,
            "This method is only for `HTTP/1.X`"
        );

        self.buffer
            .extend_from_slice(status.to_first_line(self.version));
        self.state = ResponseState::Headers;
        self
    }

    /// Adds a header to the response.
    ///
    /// PLEASE DO NOT ADD THE FOLLOWING HEADINGS:
    /// - `content-length` - calculated automatically
    /// - `connection` - use [`close()`](Response::close)
    ///
    /// # Examples
    /// ```
    /// # maker_web::run_test(|_, resp| {
    /// use maker_web::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .header("content-type", "text/plain")        // &str, &str
    ///     .header("x-custom-id", 128)                  // &str, i32  
    ///     .header("x-cache-enabled", true)             // &str, bool
    ///     .body("Done")
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error message: `Must be called after status() and before any body method`
    ///
    /// Panics in `debug` mode when:
    /// - Called before [`status()`](Response::status)
    /// - Called after [`body()`](Response::body) or [`body_with()`](Response::body_with)
    #[inline]
    #[track_caller]
    pub fn header<N: WriteBuffer, V: WriteBuffer>(&mut self, name: N, value: V) -> &mut Self {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and before any body method"
        );

        name.write_to(&mut self.buffer);
        self.buffer.extend_from_slice(b": ");
        value.write_to(&mut self.buffer);
        self.buffer.extend_from_slice(b"\r\n");
        self
    }

    /// Add a multi-value header to the response
    ///
    /// PLEASE DO NOT ADD THE FOLLOWING HEADINGS:
    /// - `content-length` - calculated automatically
    /// - `connection` - use [`close()`](Response::close)
    ///
    /// # Examples
    /// ```
    /// # maker_web::run_test(|_, resp| {
    /// use maker_web::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .header_multi(b"x-tags", ", ", ["user"])
    ///     // x-tags: user
    ///     .header_multi("accept", "; ", ["text/html", "text/plain"])
    ///     // accept: text/html; text/plain
    ///     .header_multi("id-users", ", ", vec![123, 234, 345])
    ///     // id-users: 123, 234, 345
    ///     .body("Done")
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error message: `Must be called after status() and before any body method`
    ///
    /// Panics in `debug` mode when:
    /// - Called before [`status()`](Response::status)
    /// - Called after [`body()`](Response::body) or [`body_with()`](Response::body_with)
    #[inline]
    #[track_caller]
    pub fn header_multi<N, S, I, V>(&mut self, name: N, split: S, values: I) -> &mut Self
    where
        N: WriteBuffer,
        S: WriteBuffer,
        I: IntoIterator<Item = V>,
        V: WriteBuffer,
    {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and before any body method"
        );

        name.write_to(&mut self.buffer);
        self.buffer.extend_from_slice(b": ");

        let mut iter = values.into_iter();
        if let Some(first) = iter.next() {
            first.write_to(&mut self.buffer);

            for value in iter {
                split.write_to(&mut self.buffer);
                value.write_to(&mut self.buffer);
            }
        }

        self.buffer.extend_from_slice(b"\r\n");
        self
    }

    /// Adds a header with parameters to the response.
    ///
    /// PLEASE DO NOT ADD THE FOLLOWING HEADINGS:
    /// - `content-length` - calculated automatically
    /// - `connection` - use [`close()`](Response::close)
    ///
    /// # Examples
    /// ```
    /// # maker_web::run_test(|_, resp| {
    /// use maker_web::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .header_params("content-type", "; ", vec![
    ///         ("text/html", None),
    ///         ("charset", Some("utf-8")),
    ///     ])
    ///     // Content-Type: text/html; charset=utf-8
    ///     .header_params("cache-control", ", ", [
    ///         ("max-age", Some("3600")),
    ///         ("must-revalidate", None),
    ///     ])
    ///     // Cache-Control: max-age=3600, must-revalidate
    ///     .body("Done")
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error message: `Must be called after status() and before any body method`
    ///
    /// Panics in `debug` mode when:
    /// - Called before [`status()`](Response::status)
    /// - Called after [`body()`](Response::body) or [`body_with()`](Response::body_with)
    #[inline]
    #[track_caller]
    pub fn header_params<N, S, I, K, V>(&mut self, name: N, split: S, params: I) -> &mut Self
    where
        N: WriteBuffer,
        S: WriteBuffer,
        I: IntoIterator<Item = (K, Option<V>)>,
        K: WriteBuffer,
        V: WriteBuffer,
    {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and before any body method"
        );

        name.write_to(&mut self.buffer);
        self.buffer.extend_from_slice(b": ");

        let mut iter = params.into_iter();
        if let Some((first_key, first_val)) = iter.next() {
            first_key.write_to(&mut self.buffer);
            if let Some(val) = first_val {
                self.buffer.extend_from_slice(b"=");
                val.write_to(&mut self.buffer);
            }

            for (key, value) in iter {
                split.write_to(&mut self.buffer);
                key.write_to(&mut self.buffer);
                if let Some(val) = value {
                    self.buffer.extend_from_slice(b"=");
                    val.write_to(&mut self.buffer);
                }
            }
        }

        self.buffer.extend_from_slice(b"\r\n");
        self
    }

    /// Sets the response body and finalizes the response.
    ///
    /// # Side Effects
    /// - Adds a `connection` header if necessary
    /// - Calculates and sets the `content-length` header
    ///
    /// After calling this method, the response is considered complete
    /// and cannot be modified further.
    ///
    /// # Examples
    /// ```
    /// # maker_web::run_test(|_, resp| {
    /// use maker_web::StatusCode;
    //
    /// resp.status(StatusCode::Ok)
    ///     .header("content-type", "text/plain")
    ///     .body("Hello, World!")
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error message: `Must be called after status() and any header methods`
    ///
    /// Panics in `debug` mode when:
    /// - Called before [`status()`](Response::status)
    /// - Called after [`body()`](Response::body) or [`body_with()`](Response::body_with)
    #[inline]
    #[track_caller]
    pub fn body<T: WriteBuffer>(&mut self, data: T) -> Handled {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and any header methods"
        );

        if let Some(handled) = self.take_taint_response() {
            return handled;
        }

        self.start_body();
        data.write_to(&mut self.buffer);
        self.end_body()
    }

    /// Writes the response body via closure and finalizes the response.
    ///
    /// # Side Effects
    /// - Adds a `connection` header if necessary
    /// - Calculates and sets the `content-length` header
    ///
    /// After calling this method, the response is considered complete
    /// and cannot be modified further.
    ///
    /// # Examples
    /// Using [`write!`]:
    /// ```
    /// # maker_web::run_test(|_, resp| {
    /// use maker_web::StatusCode;
    /// use std::io::Write;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .header("content-type", "application/json")
    ///     .body_with(|writer| {
    ///         // Write JSON directly to the buffer
    ///         write!(writer, r#"{{"status": "ok", "message": "Hello"}}"#);
    ///     })
    /// # });
    /// ```
    /// Using [`WriteBuffer`]:
    /// ```rust
    /// # maker_web::run_test(|_, resp| {
    /// use maker_web::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .header("content-type", "application/octet-stream")
    ///     .body_with(|writer| {
    ///         writer.write(b"lib: ");
    ///         writer.write("maker_web");
    ///         writer.write(b", love_is_lib: ");
    ///         writer.write(true);
    ///         writer.write(b", just_number: ");
    ///         writer.write(123456);
    ///     })
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error message: `Must be called after status() and any header methods`
    ///
    /// Panics in `debug` mode when:
    /// - Called before [`status()`](Response::status)
    /// - Called after [`body()`](Response::body) or [`body_with()`](Response::body_with)
    #[inline]
    #[track_caller]
    pub fn body_with<F: FnOnce(&mut BodyWriter)>(&mut self, f: F) -> Handled {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and any header methods"
        );

        if let Some(handled) = self.take_taint_response() {
            return handled;
        }

        self.start_body();
        f(&mut BodyWriter(&mut self.buffer));
        self.end_body()
    }

    /// Writes the response body as `Transfer-Encoding: chunked` instead of a
    /// `Content-Length`, and finalizes the response.
    ///
    /// Use this in place of [`body()`](Self::body)/[`body_with()`](Self::body_with)
    /// whenever the body is made of independently-produced pieces rather
    /// than one known-length buffer -- for example, a handler echoing back
    /// a chunked request body, or assembling a reply from several sources
    /// it would rather not concatenate first. Each item of `chunks` becomes
    /// one wire chunk; an empty iterator still produces a valid
    /// zero-length chunked body (the closing `0\r\n\r\n` only).
    ///
    /// Like the rest of this builder, every chunk must already be in hand --
    /// this does not hold the connection open to stream chunks as they are
    /// produced later.
    ///
    /// # Examples
    /// ```
    /// # maker_web::run_test(|_, resp| {
    /// use maker_web::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .header("content-type", "text/plain")
    ///     .body_chunked(["first chunk", "second chunk"])
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error message: `Must be called after status() and any header methods`
    ///
    /// Panics in `debug` mode when:
    /// - Called before [`status()`](Response::status)
    /// - Called after [`body()`](Response::body), [`body_with()`](Response::body_with),
    ///   or this method
    #[inline]
    #[track_caller]
    pub fn body_chunked<T: AsRef<[u8]>>(&mut self, chunks: impl IntoIterator<Item = T>) -> Handled {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and any header methods"
        );

        if let Some(handled) = self.take_taint_response() {
            return handled;
        }

        if let Some(value) = self.connection_header() {
            self.header("connection", value);
        }
        self.header("transfer-encoding", "chunked");
        self.buffer.extend_from_slice(b"\r\n");

        for chunk in chunks {
            chunked::encode_chunk(chunk.as_ref(), &mut self.buffer);
        }
        chunked::encode_last_chunk(&mut self.buffer);
        self.state = ResponseState::Complete;

        Handled(())
    }

    /// Finalizes a protocol-switch response (status `101`) and marks the
    /// connection for takeover by [`Handler::handle_ws`](crate::Handler::handle_ws).
    ///
    /// Unlike [`body()`](Self::body), this never writes a `content-length`
    /// header — a `101` response has no body per RFC 7230 §3.3.2 — and it
    /// does not add a `connection` header on your behalf, since the
    /// required value (`upgrade`) is specific to the protocol being
    /// switched to. Add it yourself with [`header()`](Self::header).
    ///
    /// # Examples
    /// ```
    /// # maker_web::run_test(|req, resp| {
    /// use maker_web::{StatusCode, ws};
    ///
    /// match req.header(b"sec-websocket-key") {
    ///     Some(key) => resp
    ///         .status(StatusCode::SwitchingProtocols)
    ///         .header("upgrade", "websocket")
    ///         .header("connection", "upgrade")
    ///         .header("sec-websocket-accept", ws::accept_key(key))
    ///         .upgrade(),
    ///     None => resp.status(StatusCode::BadRequest).body("missing handshake"),
    /// }
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error message: `Must be called after status() and any header methods`
    ///
    /// Panics in `debug` mode when:
    /// - Called before [`status()`](Response::status)
    /// - Called after [`body()`](Response::body), [`body_with()`](Response::body_with),
    ///   or this method
    #[inline]
    #[track_caller]
    pub fn upgrade(&mut self) -> Handled {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and any header methods"
        );

        if let Some(handled) = self.take_taint_response() {
            return handled;
        }

        self.buffer.extend_from_slice(b"\r\n");
        self.state = ResponseState::Complete;
        self.upgraded = true;

        Handled(())
    }

    /// Adds a `Set-Cookie` header to the response.
    ///
    /// # Examples
    /// ```
    /// # maker_web::run_test(|_, resp| {
    /// use maker_web::{CookieOptions, SameSite, StatusCode};
    /// use std::time::Duration;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .cookie("session", "abc123", &CookieOptions {
    ///         max_age: Some(Duration::from_secs(3600)),
    ///         path: Some("/"),
    ///         same_site: Some(SameSite::Lax),
    ///         http_only: true,
    ///         secure: true,
    ///         ..Default::default()
    ///     })
    ///     .body("set")
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error message: `Must be called after status() and before any body method`
    ///
    /// Panics in `debug` mode when:
    /// - Called before [`status()`](Response::status)
    /// - Called after [`body()`](Response::body) or [`body_with()`](Response::body_with)
    ///
    /// If `name`, `value`, `path`, or `domain` contains a CR, LF, or NUL byte,
    /// this does not panic (that byte is attacker-controlled input, not a
    /// handler-author mistake): the cookie is dropped and the whole response
    /// is replaced with a `500` by the next finalizing method, in every build
    /// profile.
    #[inline]
    #[track_caller]
    pub fn cookie(&mut self, name: &str, value: &str, options: &CookieOptions<'_>) -> &mut Self {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and before any body method"
        );

        if has_crlf_or_nul(name)
            || has_crlf_or_nul(value)
            || options.path.is_some_and(has_crlf_or_nul)
            || options.domain.is_some_and(has_crlf_or_nul)
        {
            self.tainted = Some("cookie name, value, path, or domain contains CR, LF, or NUL");
            return self;
        }

        self.buffer.extend_from_slice(b"set-cookie: ");
        self.buffer.extend_from_slice(name.as_bytes());
        self.buffer.push(b'=');
        self.buffer.extend_from_slice(value.as_bytes());

        if let Some(expires) = options.expires {
            self.buffer.extend_from_slice(b"; expires=");
            self.buffer
                .extend_from_slice(httpdate::fmt_http_date(expires).as_bytes());
        }
        if let Some(max_age) = options.max_age {
            self.buffer.extend_from_slice(b"; max-age=");
            self.buffer
                .extend_from_slice(max_age.as_secs().to_string().as_bytes());
        }
        if let Some(path) = options.path {
            self.buffer.extend_from_slice(b"; path=");
            let encoded =
                percent_encoding::utf8_percent_encode(path, percent_encoding::NON_ALPHANUMERIC)
                    .to_string();
            self.buffer.extend_from_slice(encoded.as_bytes());
        }
        if let Some(domain) = options.domain {
            self.buffer.extend_from_slice(b"; domain=");
            self.buffer.extend_from_slice(domain.as_bytes());
        }
        if let Some(same_site) = options.same_site {
            self.buffer.extend_from_slice(b"; samesite=");
            self.buffer.extend_from_slice(same_site.as_str().as_bytes());
        }
        if options.secure {
            self.buffer.extend_from_slice(b"; secure");
        }
        if options.http_only {
            self.buffer.extend_from_slice(b"; httponly");
        }

        self.buffer.extend_from_slice(b"\r\n");
        self
    }

    /// Reads `path` from disk and serves it, honoring `Range`, `If-Range`,
    /// and `If-Modified-Since` (RFC 7233). Chooses the status line itself
    /// (`200`, `206`, `304`, `400`, or `416`), so call this in place of
    /// [`status()`](Self::status) rather than after it.
    ///
    /// `range`/`if_modified_since`/`if_range` are the matching request
    /// header values, if present (see [`Request::header`](crate::Request::header)).
    ///
    /// # Examples
    /// ```no_run
    /// use maker_web::{Handled, Request, Response, StatusCode};
    ///
    /// async fn handle(req: &Request, resp: &mut Response) -> Handled {
    ///     resp.send_file(
    ///         "static/logo.png",
    ///         "image/png",
    ///         req.header(b"range"),
    ///         req.header(b"if-modified-since"),
    ///         req.header(b"if-range"),
    ///     )
    ///     .await
    ///     .unwrap_or_else(|_| resp.status(StatusCode::NotFound).body("not found"))
    /// }
    /// ```
    ///
    /// # Panics
    /// Same as [`status()`](Self::status): must be the first response method called.
    #[track_caller]
    pub async fn send_file<T: AsRef<str>>(
        &mut self,
        path: impl AsRef<Path>,
        content_type: T,
        range: Option<&[u8]>,
        if_modified_since: Option<&[u8]>,
        if_range: Option<&[u8]>,
    ) -> std::io::Result<Handled> {
        let meta = tokio::fs::metadata(path.as_ref()).await?;
        let mtime = meta.modified()?;
        let data = tokio::fs::read(path.as_ref()).await?;

        Ok(self.send_file_bytes(content_type, &data, mtime, range, if_modified_since, if_range))
    }

    /// The synchronous core of [`send_file()`](Self::send_file): given
    /// already-loaded file bytes and an mtime, applies the same framing
    /// decision without touching the filesystem.
    ///
    /// # Panics
    /// Same as [`send_file()`](Self::send_file).
    #[track_caller]
    pub fn send_file_bytes<T: AsRef<str>>(
        &mut self,
        content_type: T,
        data: &[u8],
        mtime: SystemTime,
        range: Option<&[u8]>,
        if_modified_since: Option<&[u8]>,
        if_range: Option<&[u8]>,
    ) -> Handled {
        debug_assert!(
            self.state == ResponseState::Clean,
            "Must be called in place of status() and any header methods"
        );

        if matches!(if_modified_since, Some(ims) if sendfile::is_not_modified(ims, mtime)) {
            self.status(StatusCode::NotModified);
            if let Some(value) = self.connection_header() {
                self.header("connection", value);
            }
            self.buffer.extend_from_slice(b"\r\n");
            self.state = ResponseState::Complete;
            return Handled(());
        }

        let file_size = data.len() as u64;
        let range = range.filter(|_| {
            self.version != Version::Http10
                && match if_range {
                    Some(ir) => sendfile::if_range_matches(ir, mtime),
                    None => true,
                }
        });

        let Some(range_header) = range else {
            return self
                .status(StatusCode::Ok)
                .header("content-type", content_type.as_ref())
                .body(data);
        };

        match sendfile::parse_ranges(range_header, file_size) {
            Err(sendfile::RangeError::Unsatisfiable) => self
                .status(StatusCode::RangeNotSatisfiable)
                .header("content-range", format!("bytes */{file_size}"))
                .body(""),
            Err(sendfile::RangeError::Malformed) => {
                self.status(StatusCode::BadRequest).body("bad range")
            }
            Ok(ranges) if ranges.len() == 1 => {
                let r = ranges[0];
                self.status(StatusCode::PartialContent)
                    .header("content-type", content_type.as_ref())
                    .header(
                        "content-range",
                        format!("bytes {}-{}/{file_size}", r.start, r.end),
                    )
                    .body(&data[r.start as usize..=r.end as usize])
            }
            Ok(ranges) => {
                self.send_multipart_ranges(content_type.as_ref(), data, file_size, mtime, &ranges)
            }
        }
    }

    fn send_multipart_ranges(
        &mut self,
        content_type: &str,
        data: &[u8],
        file_size: u64,
        mtime: SystemTime,
        ranges: &[sendfile::ByteRange],
    ) -> Handled {
        let boundary = sendfile::boundary_token(mtime, file_size);

        self.status(StatusCode::PartialContent).header(
            "content-type",
            format!("multipart/byteranges; boundary={boundary}"),
        );
        if let Some(value) = self.connection_header() {
            self.header("connection", value);
        }
        self.header("transfer-encoding", "chunked");
        self.buffer.extend_from_slice(b"\r\n");

        let mut part = Vec::new();
        for r in ranges {
            part.clear();
            part.extend_from_slice(b"--");
            part.extend_from_slice(boundary.as_bytes());
            part.extend_from_slice(b"\r\ncontent-type: ");
            part.extend_from_slice(content_type.as_bytes());
            part.extend_from_slice(
                format!("\r\ncontent-range: bytes {}-{}/{file_size}\r\n\r\n", r.start, r.end)
                    .as_bytes(),
            );
            part.extend_from_slice(&data[r.start as usize..=r.end as usize]);
            part.extend_from_slice(b"\r\n");
            chunked::encode_chunk(&part, &mut self.buffer);
        }

        let tail = format!("--{boundary}--\r\n");
        chunked::encode_chunk(tail.as_bytes(), &mut self.buffer);
        chunked::encode_last_chunk(&mut self.buffer);
        self.state = ResponseState::Complete;

        Handled(())
    }

    /// Serves `events` as a `text/event-stream` response (the EventSource
    /// spec): sets `Content-Type: text/event-stream` and
    /// `Cache-Control: no-cache, must-revalidate`, then writes each event
    /// as `data: <payload>\n[event: <name>\n][id: <id>\n][retry: <ms>\n]\n`,
    /// splitting a multi-line `data` on `\n` into multiple `data:` lines.
    ///
    /// Call this in place of [`status()`](Self::status); it chooses `200 OK`
    /// itself. Because this crate builds one complete response buffer per
    /// request rather than holding a connection open for server-initiated
    /// push, every event the response will carry must be known up front --
    /// pass them all in `events`.
    ///
    /// # Examples
    /// ```
    /// # maker_web::run_test(|_, resp| {
    /// use maker_web::SseEvent;
    ///
    /// resp.sse(&[
    ///     SseEvent { data: "connected", event: Some("status"), ..Default::default() },
    ///     SseEvent { data: "42", id: Some("1"), ..Default::default() },
    /// ])
    /// # });
    /// ```
    ///
    /// # Panics
    /// Same as [`status()`](Self::status): must be the first response method
    /// called.
    ///
    /// If any event's `event` or `id` field contains a CR, LF, or NUL byte,
    /// or `data` contains a bare CR or NUL, this does not panic: the whole
    /// response is replaced with a `500` instead, in every build profile.
    #[track_caller]
    pub fn sse(&mut self, events: &[SseEvent<'_>]) -> Handled {
        debug_assert!(
            self.state == ResponseState::Clean,
            "Must be called in place of status() and any header methods"
        );

        self.status(StatusCode::Ok)
            .header("content-type", "text/event-stream")
            .header("cache-control", "no-cache, must-revalidate")
            .header("expires", "Thu, 01 Jan 1970 00:00:00 GMT");

        self.start_body();
        for event in events {
            if sse::encode_event(event, &mut self.buffer).is_err() {
                self.tainted = Some("SSE event field contains CR, LF, or NUL");
                break;
            }
        }

        if let Some(handled) = self.take_taint_response() {
            return handled;
        }
        self.end_body()
    }
}

#[inline]
fn has_crlf_or_nul(s: &str) -> bool {
    s.bytes().any(|b| matches!(b, b'\r' | b'\n' | 0))
}

impl Response {
    #[inline(always)]
    #[track_caller]
    fn start_body(&mut self) -> &mut Self {
        if let Some(value) = self.connection_header() {
            self.header("connection", value);
        }

        self.buffer.extend_from_slice(b"content-length: ");
        self.posit_length = self.buffer.len();
        self.buffer.extend_from_slice(b"0000000000\r\n\r\n");
        self.start_body = self.buffer.len();
        self
    }

    #[inline(always)]
    fn end_body(&mut self) -> Handled {
        let body_len = self.buffer.len() - self.start_body;
        let (arr, _) = Response::number_to_bytes(body_len as u128);

        let target_range = self.posit_length..self.posit_length + 10;
        self.buffer[target_range].copy_from_slice(&arr[29..39]);
        self.state = ResponseState::Complete;

        Handled(())
    }

    /// If [`cookie()`](Self::cookie)/[`sse()`](Self::sse) flagged this
    /// response as carrying CRLF/NUL-poisoned input, discards everything
    /// written so far and replaces it with a plain `500`. Called by every
    /// finalizing method before it touches `self.buffer`.
    #[inline]
    fn take_taint_response(&mut self) -> Option<Handled> {
        let reason = self.tainted.take()?;

        self.buffer.clear();
        self.keep_alive = false;
        self.buffer
            .extend_from_slice(StatusCode::InternalServerError.to_first_line(self.version));
        self.buffer.extend_from_slice(b"connection: close\r\n");
        self.buffer
            .extend_from_slice(format!("content-length: {}\r\n\r\n", reason.len()).as_bytes());
        self.buffer.extend_from_slice(reason.as_bytes());
        self.state = ResponseState::Complete;

        Some(Handled(()))
    }

    #[inline(always)]
    const fn connection_header(&self) -> Option<&'static [u8]> {
        match (self.version, self.keep_alive) {
            (Version::Http11, true) => None,
            (Version::Http11, false) => Some(b"close"),
            (Version::Http10, true) => Some(b"keep-alive"),
            (Version::Http10, false) => Some(b"close"),
            _ => None,
        }
    }

    #[inline]
    const fn number_to_bytes(mut n: u128) -> ([u8; 39], usize) {
        let mut buffer = [b'0'; 39];
        let mut i = 39;

        if n == 0 {
            return (buffer, 38);
        }

        while n > 0 {
            i -= 1;
            buffer[i] = b'0' + (n % 10) as u8;
            n /= 10;
        }

        (buffer, i)
    }
}

/// Methods for working with `HTTP/0.9+`
///
/// # Connection
/// Automatically closes the connection unless keep-alive path was used.
///
/// # Panics
/// Error messages:
/// - <code>This method is only for \`HTTP/0.9+\`</code>
/// - ``An `HTTP/0.9+` response must use exactly one method``
///
/// In these methods, panic occurs when:
/// - Called in non-`HTTP/0.9+` responses
/// - Calling any method again
impl Response {
    /// Writes a raw `HTTP/0.9+` response and finalizes it.
    ///
    /// # Examples
    /// ```
    /// # maker_web::run_test(|req, resp| {
    /// use maker_web::{StatusCode, Version};
    ///
    /// // For HTTP/0.9+ requests - simple raw response
    /// if req.version() == Version::Http09 {
    ///     resp.http09("user_data_here")
    /// } else {
    ///     resp.status(StatusCode::Ok)
    ///         .header("content-type", "text/plain")
    ///         .body("user_data_here")
    /// }
    /// # });
    /// ```
    /// JSON:
    /// ```
    /// # maker_web::run_test(|req, resp| {
    /// use maker_web::{StatusCode, Version};
    ///
    /// // HTTP/0.9+ with structured data
    /// if req.version() == Version::Http09 {
    ///     resp.http09(r#"{"user_id":123,"name":"John"}"#)
    /// } else {
    ///     resp.status(StatusCode::Ok)
    ///         .header("content-type", "application/json")
    ///         .body(r#"{"user_id":123,"name":"John"}"#)
    /// }
    /// # });
    /// ```
    #[inline]
    #[track_caller]
    pub fn http09<T: WriteBuffer>(&mut self, data: T) -> Handled {
        debug_assert!(
            self.version == Version::Http09,
            "This method is only for `HTTP/0.9+`"
        );
        debug_assert!(
            self.state == ResponseState::Clean,
            "An `HTTP/0.9+` response must use exactly one method"
        );

        data.write_to(&mut self.buffer);
        self.state = ResponseState::Complete;

        Handled(())
    }

    /// Writes `HTTP/0.9+` response via closure and finalizes it.
    ///
    /// # Examples
    /// ```
    /// # maker_web::run_test(|req, resp| {
    /// use maker_web::{StatusCode, Version};
    /// use std::io::Write;
    ///
    /// // Complex HTTP/0.9 response with formatting
    /// if req.version() == Version::Http09 {
    ///     resp.http09_with(|buf| {
    ///         write!(buf, "user_{}_online:{}", 123, true);
    ///     })
    /// } else {
    ///     resp.status(StatusCode::Ok)
    ///         .body_with(|writer| {
    ///             write!(writer, "user_{}_online:{}", 123, true);
    ///         })
    /// }
    /// # });
    /// ```
    /// Bytes data:  
    /// ```
    /// # maker_web::run_test(|req, resp| {
    /// use maker_web::{StatusCode, Version};
    ///
    /// // HTTP/0.9 with binary data
    /// if req.version() == Version::Http09 {
    ///     resp.http09_with(|buf| {
    ///         buf.extend_from_slice(&[0x01, 0x02, 0x03]);
    ///         buf.extend_from_slice(b"payload");
    ///     })
    /// } else {
    ///     resp.status(StatusCode::Ok)
    ///         .header("content-type", "application/octet-stream")
    ///         .body_with(|writer| {
    ///             writer.write(&[0x01, 0x02, 0x03]);
    ///             writer.write(b"payload");
    ///         })
    /// }
    /// # });
    /// ```
    #[inline]
    #[track_caller]
    pub fn http09_with<F: FnOnce(&mut Vec<u8>)>(&mut self, f: F) -> Handled {
        debug_assert!(
            self.version == Version::Http09,
            "This method is only for `HTTP/0.9+`"
        );
        debug_assert!(
            self.state == ResponseState::Clean,
            "An `HTTP/0.9+` response must use exactly one method"
        );

        f(&mut self.buffer);
        self.state = ResponseState::Complete;

        Handled(())
    }

    /// Writes a status code response in `HTTP/0.9+` format and finalizes it.
    ///
    /// Uses semantic prefixes based on status code range:
    /// - `5xx`: `SERVER_ERROR: [code] [reason]\r\n`
    /// - `4xx`: `CLIENT_ERROR: [code] [reason]\r\n`
    /// - `3xx`: `REDIRECT: [code] [reason]\r\n`
    /// - `2xx`: `SUCCESS: [code] [reason]\r\n`
    /// - `1xx`: `INFO: [code] [reason]\r\n`
    ///
    /// # Examples
    /// ```
    /// # maker_web::run_test(|req, resp| {
    /// # let user_exists = true;
    /// use maker_web::{StatusCode, Version};
    ///
    /// // Simple status response for HTTP/0.9+
    /// if req.version() == Version::Http09 {
    ///     if !user_exists {
    ///         return resp.http09_status(StatusCode::NotFound);
    ///     }
    ///     resp.http09("user_data")
    /// } else {
    ///     resp.status(StatusCode::NotFound).body("Not Found")
    /// }
    /// # });
    /// ```
    #[inline]
    #[track_caller]
    pub fn http09_status(&mut self, status: StatusCode) -> Handled {
        debug_assert!(
            self.version == Version::Http09,
            "This method is only for `HTTP/0.9+`"
        );
        debug_assert!(
            self.state == ResponseState::Clean,
            "An `HTTP/0.9+` response must use exactly one method"
        );

        self.buffer
            .extend_from_slice(Self::get_prefix(&status).as_bytes());
        self.buffer
            .extend_from_slice(status.to_first_line(Version::Http09));

        self.state = ResponseState::Complete;
        Handled(())
    }

    /// Writes a custom message response in `HTTP/0.9+` format and finalizes it.
    ///
    /// Uses semantic prefixes based on status code range:
    /// - `5xx`: `SERVER_ERROR: [code] [custom_message]\r\n`
    /// - `4xx`: `CLIENT_ERROR: [code] [custom_message]\r\n`
    /// - `3xx`: `REDIRECT: [code] [custom_message]\r\n`
    /// - `2xx`: `SUCCESS: [code] [custom_message]\r\n`
    /// - `1xx`: `INFO: [code] [custom_message]\r\n`
    ///
    /// # Examples
    /// ```
    /// # maker_web::run_test(|req, resp| {
    /// # let invalid_input = true;
    /// use maker_web::{StatusCode, Version};
    ///
    /// // Custom error message for HTTP/0.9+
    /// if req.version() == Version::Http09 {
    ///     if invalid_input {
    ///         return resp.http09_msg(StatusCode::BadRequest, "Invalid query parameters");
    ///     }
    ///     resp.http09("success")
    /// } else {
    ///     resp.status(StatusCode::BadRequest).body("Invalid query parameters")
    /// }
    /// # });
    /// ```
    /// Success with custom data:
    /// ```
    /// # maker_web::run_test(|req, resp| {
    /// use maker_web::{StatusCode, Version};
    ///
    /// // Success response with structured data
    /// if req.version() == Version::Http09 {
    ///     resp.http09_msg(StatusCode::Ok, r#"{"status":"ok","id":12345}"#)
    /// } else {
    ///     resp.status(StatusCode::Ok)
    ///         .header("content-type", "application/json")
    ///         .body(r#"{"status":"ok","id":12345}"#)
    /// }
    /// # });
    /// ```
    #[inline]
    #[track_caller]
    pub fn http09_msg<T: WriteBuffer>(&mut self, status: StatusCode, value: T) -> Handled {
        debug_assert!(
            self.version == Version::Http09,
            "This method is only for `HTTP/0.9+`"
        );
        debug_assert!(
            self.state == ResponseState::Clean,
            "An `HTTP/0.9+` response must use exactly one method"
        );

        self.buffer
            .extend_from_slice(Self::get_prefix(&status).as_bytes());
        self.buffer.extend_from_slice(status.as_u16_bytes());
        value.write_to(&mut self.buffer);
        self.buffer.extend_from_slice(b"\r\n");

        self.state = ResponseState::Complete;
        Handled(())
    }

    #[inline]
    const fn get_prefix(status: &StatusCode) -> &str {
        match *status as u16 {
            400..=499 => "CLIENT_ERROR:",
            500..=599 => "SERVER_ERROR:",
            300..=399 => "REDIRECT:",
            200..=299 => "SUCCESS:",
            100..=199 => "INFO:",
            _ => "?:",
        }
    }
}

pub mod write {
    use super::*;

    /// Writer for constructing the HTTP response body.
    /// Used in [body_with](Response::body_with).
    ///
    /// # Examples
    ///
    /// With [WriteBuffer]:
    /// ```
    /// # maker_web::run_test(|_, resp| {
    /// use maker_web::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .body_with(|w| {
    ///         w.write("This goes in the response body");
    ///         w.write("<html>...</html>");
    ///         w.write(true);
    ///     })
    /// # });
    /// ```
    /// With [std::io::Write]:
    /// ```
    /// # maker_web::run_test(|_, resp| {
    /// use maker_web::StatusCode;
    /// use std::io::Write;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .body_with(|w| {
    ///         write!(w, "This goes in the response body");
    ///         write!(w, "{} - {} = {}", 6, 2, 4);
    ///     })
    /// # });
    /// ```
    #[derive(Debug)]
    pub struct BodyWriter<'a>(pub(crate) &'a mut Vec<u8>);

    impl BodyWriter<'_> {
        /// Appends content to the response body.
        ///
        /// Adds data to the body section of the HTTP response. This method
        /// only affects the response body, not headers or status.
        ///
        /// # Examples
        /// ```
        /// # maker_web::run_test(|_, resp| {
        /// use maker_web::StatusCode;
        ///
        /// resp.status(StatusCode::Ok)
        ///     .body_with(|w| {
        ///         w.write("Hello");
        ///         w.write(123);
        ///         w.write(true);
        ///     })
        /// # });
        /// ```
        #[inline]
        pub fn write<T: WriteBuffer>(&mut self, value: T) {
            value.write_to(self.0);
        }
    }

    impl std::io::Write for BodyWriter<'_> {
        #[inline]
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        #[inline]
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Trait for writing data to the [`Response`] buffer.
    ///
    /// Implemented for common types like strings, bytes, booleans
    /// and numeric types (excluding floating-point numbers)
    ///
    /// # Note on Floating-Point
    /// Floating-point numbers are not implemented to avoid locale-dependent
    /// formatting and precision issues in protocol headers.
    ///
    /// For explicit float serialization, consider using the
    /// [`ryu`](https://crates.io/crates/ryu)
    /// crate or formatting to string with controlled precision.
    ///
    /// # Example
    /// ```
    /// use maker_web::WriteBuffer;
    ///
    /// struct MyString(String);
    ///
    /// impl WriteBuffer for MyString {
    ///     fn write_to(&self, buffer: &mut Vec<u8>) {
    ///         buffer.extend_from_slice(self.0.as_bytes())
    ///     }
    /// }
    /// ```
    pub trait WriteBuffer {
        /// Writes the value's representation directly to the buffer.
        ///
        /// This should avoid intermediate allocations and write the
        /// most efficient representation possible.
        fn write_to(&self, buffer: &mut Vec<u8>);
    }

    macro_rules! impl_write_buffer {
        (bytes, $conn:expr => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    let closure = $conn;
                    closure(self, buffer);
                }
            })*
        };
        (number($type:ty), $conn:expr => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    $conn(*self as $type, buffer);
                }
            })*
        };
        (non_zero($type:ty), $conn:expr => $($t:ident),*) => {
            $(impl WriteBuffer for std::num::$t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    $conn(self.get() as $type, buffer);
                }
            })*
        };
    }

    impl<T: WriteBuffer> WriteBuffer for &T {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            T::write_to(*self, buffer);
        }
    }
    impl<T: WriteBuffer> WriteBuffer for &mut T {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            T::write_to(*self, buffer);
        }
    }
    impl_write_buffer! {
        bytes, |value: &str, buffer: &mut Vec<u8>| {
            buffer.extend_from_slice(value.as_bytes());
        } => &str, String, Box<str>, Cow<'_, str>,
        Arc<str>, Rc<str>, Arc<String>, Rc<String>
    }
    impl_write_buffer! {
        bytes, |value: &[u8], buffer: &mut Vec<u8>| {
            buffer.extend_from_slice(value);
        } => &[u8], Vec<u8>, Box<[u8]>, Cow<'_, [u8]>,
        Arc<[u8]>, Rc<[u8]>, Arc<Vec<u8>>, Rc<Vec<u8>>
    }
    impl<const N: usize> WriteBuffer for [u8; N] {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(self);
        }
    }
    impl_write_buffer! {
        number(u128), impl_write_buffer_u128 => u8, u16, u32, u64, u128, usize
    }
    impl_write_buffer! {
        non_zero(u128), impl_write_buffer_u128 => NonZeroU8,
        NonZeroU16, NonZeroU32, NonZeroU64, NonZeroU128, NonZeroUsize
    }
    impl_write_buffer! {
        number(i128), impl_write_buffer_i128 => i8, i16, i32, i64, i128, isize
    }
    impl_write_buffer! {
        non_zero(i128), impl_write_buffer_i128 => NonZeroI8,
        NonZeroI16, NonZeroI32, NonZeroI64, NonZeroI128, NonZeroIsize
    }
    impl WriteBuffer for bool {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(match self {
                true => b"true",
                false => b"false",
            });
        }
    }
    impl WriteBuffer for char {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            let mut buf = [0u8; 4];
            buffer.extend_from_slice(self.encode_utf8(&mut buf).as_bytes());
        }
    }

    #[inline(always)]
    fn impl_write_buffer_u128(value: u128, buffer: &mut Vec<u8>) {
        let (arr, start) = Response::number_to_bytes(value);
        buffer.extend_from_slice(&arr[start..]);
    }

    #[inline(always)]
    fn impl_write_buffer_i128(value: i128, buffer: &mut Vec<u8>) {
        if value < 0 {
            buffer.push(b'-');
        }
        let abs = value.unsigned_abs();

        let (arr, start) = Response::number_to_bytes(abs);
        buffer.extend_from_slice(&arr[start..]);
    }
}


#[cfg(test)]
mod status_tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn basic() {
        let cases = [
            (StatusCode::Ok, "HTTP/1.1 200 OK\r\n"),
            (StatusCode::NotFound, "HTTP/1.1 404 Not Found\r\n"),
            (StatusCode::Found, "HTTP/1.1 302 Found\r\n"),
            (StatusCode::BadRequest, "HTTP/1.1 400 Bad Request\r\n"),
        ];

        for (status, result) in cases {
            let mut resp = Response::new(&RespLimits::default());

            assert_eq!(resp.buffer, []);
            assert_eq!(resp.state, ResponseState::Clean);

            resp.status(status);
            assert_eq!(str_op(&resp.buffer), result);
            assert_eq!(resp.state, ResponseState::Headers);
        }
    }

    #[test]
    #[should_panic(expected = "Must be first and called only once")]
    fn double_call() {
        Response::new(&RespLimits::default())
            .status(StatusCode::Ok)
            .status(StatusCode::Found);
    }

    #[test]
    #[should_panic(expected = "This method is only for `HTTP/1.X`")]
    fn http09_panic() {
        let mut resp = Response::new(&RespLimits::default());
        resp.version = Version::Http09;

        resp.status(StatusCode::Ok);
    }
}

#[cfg(test)]
mod header_tests {
    use super::*;
    use crate::tools::*;

    macro_rules! test_header {
        ($method:ident, $(($name:expr $(, $params:expr)*; $result:expr);)*) => {
           #[test] fn $method() {$(
            let mut resp = Response::new(&RespLimits::default());

            assert_eq!(resp.buffer, []);

            resp.status(StatusCode::Ok);
            assert_eq!(resp.state, ResponseState::Headers);

            resp.$method($name $(, $params)*);
            assert_eq!(str_op(&resp.buffer[17..]), $result);
            assert_eq!(resp.state, ResponseState::Headers);
        )*}};
    }

    test_header! {header,
        ("name", "value"; "name: value\r\n");
        ("", "value"; ": value\r\n");
        ("name", ""; "name: \r\n");

        ("name", 123; "name: 123\r\n");
        ("name", vec![35, 33, 43]; "name: #!+\r\n");
        ("name", false; "name: false\r\n");
        ("name", -123; "name: -123\r\n");
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and before any body method")]
    fn header_before_status() {
        Response::new(&RespLimits::default()).header("Name", "value");
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and before any body method")]
    fn header_after_body() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).body("");
        resp.header("Name", "value");
    }

    test_header! {header_multi,
        ("name", ", ", ["q", "w", "e"]; "name: q, w, e\r\n");
        ("name", ",", [true, false]; "name: true,false\r\n");
        ("name", "; ", [-123, 123]; "name: -123; 123\r\n");
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and before any body method")]
    fn header_multi_before_status() {
        Response::new(&RespLimits::default()).header_multi("Name", ",", ["value1", "value2"]);
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and before any body method")]
    fn header_multi_after_body() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).body("");
        resp.header_multi("Name", ",", ["value1", "value2"]);
    }

    test_header! {header_params,
        ("name", ", ", [("name", Some("value"))]; "name: name=value\r\n");
        (
            "name", ", ", [("q", Some("1")), ("w", Some("2")), ("e", Some("3"))];
            "name: q=1, w=2, e=3\r\n"
        );
        (
            "name", ";", [("q", Some("v1")), ("w", Some("v2")), ("e", Some("v3"))];
            "name: q=v1;w=v2;e=v3\r\n"
        );
        (
            "name", ", ", [("min", Some(-128)), ("max", Some(128)), ("mean", Some(0))];
            "name: min=-128, max=128, mean=0\r\n"
        );
        (
            "u128", ", ", [("min", Some(u128::MIN)), ("max", Some(u128::MAX))];
            "u128: min=0, max=340282366920938463463374607431768211455\r\n"
        );
        (
            "i128", ", ", [("min", Some(i128::MIN)), ("max", Some(i128::MAX))];
    "i128: min=-170141183460469231731687303715884105728, max=170141183460469231731687303715884105727\r\n"
        );
        (
            "name", ", ", [("debug", Some(true)), ("doc", Some(false))];
            "name: debug=true, doc=false\r\n"
        );
        (
            "name", "; ", [("debug", None), ("text", Some("asd"))];
            "name: debug; text=asd\r\n"
        );
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and before any body method")]
    fn header_params_before_status() {
        Response::new(&RespLimits::default()).header_params(
            "Name",
            ",",
            [("name1", Some("value1")), ("name2", None)],
        );
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and before any body method")]
    fn header_params_after_body() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).body("");
        resp.header_params("Name", ",", [("name1", Some("value1")), ("name2", None)]);
    }
}



#[cfg(test)]
mod http09_tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn basic() {
        let result = "just text, just to have it :)";

        let mut resp = Response::new(&RespLimits::default());
        resp.version = Version::Http09;

        assert_eq!(resp.buffer, []);
        assert_eq!(resp.state, ResponseState::Clean);

        resp.http09(result);
        assert_eq!(str_op(&resp.buffer), result);
        assert_eq!(resp.state, ResponseState::Complete);
    }

    #[test]
    #[should_panic(expected = "An `HTTP/0.9+` response must use exactly one method")]
    fn double_call() {
        let mut resp = Response::new(&RespLimits::default());
        resp.version = Version::Http09;

        resp.http09("Call number 1");
        resp.http09("Call number 2 :)");
    }

    #[test]
    #[should_panic(expected = "This method is only for `HTTP/0.9+`")]
    fn http1x_panic() {
        Response::new(&RespLimits::default()).http09("just text");
    }
}


#[cfg(test)]
mod http09_status_tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn basic() {
        let cases = [
            (StatusCode::Continue, "INFO: 100 Continue\r\n"),
            (StatusCode::Ok, "SUCCESS: 200 OK\r\n"),
            (
                StatusCode::MultipleChoices,
                "REDIRECT: 300 Multiple Choices\r\n",
            ),
            (StatusCode::BadRequest, "CLIENT_ERROR: 400 Bad Request\r\n"),
            (
                StatusCode::InternalServerError,
                "SERVER_ERROR: 500 Internal Server Error\r\n",
            ),
        ];

        for (status, result) in cases {
            let mut resp = Response::new(&RespLimits::default());
            resp.version = Version::Http09;

            assert_eq!(resp.buffer, []);
            assert_eq!(resp.state, ResponseState::Clean);

            resp.http09_status(status);
            assert_eq!(str_op(&resp.buffer), result);
            assert_eq!(resp.state, ResponseState::Complete);
        }
    }

    #[test]
    #[should_panic(expected = "An `HTTP/0.9+` response must use exactly one method")]
    fn double_call() {
        let mut resp = Response::new(&RespLimits::default());
        resp.version = Version::Http09;

        resp.http09_status(StatusCode::Ok);
        resp.http09_status(StatusCode::Found);
    }

    #[test]
    #[should_panic(expected = "This method is only for `HTTP/0.9+`")]
    fn http1x_panic() {
        Response::new(&RespLimits::default()).http09_status(StatusCode::Ok);
    }
}



#[cfg(test)]
mod send_file_tests {
    use super::*;
    use crate::tools::*;
    use std::time::{Duration, SystemTime};

    const MTIME: SystemTime = SystemTime::UNIX_EPOCH;

    fn mtime_header() -> String {
        httpdate::fmt_http_date(MTIME)
    }

    #[test]
    fn full_body_without_range() {
        let mut resp = Response::new(&RespLimits::default());
        resp.send_file_bytes("text/plain", b"hello world", MTIME, None, None, None);

        assert_eq!(
            str_op(&resp.buffer),
            "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\n\
             content-length: 0000000011\r\n\r\nhello world"
        );
    }

    #[test]
    fn not_modified_short_circuits_body() {
        let mut resp = Response::new(&RespLimits::default());
        let header = mtime_header();
        resp.send_file_bytes(
            "text/plain",
            b"hello world",
            MTIME,
            None,
            Some(header.as_bytes()),
            None,
        );

        assert_eq!(str_op(&resp.buffer), "HTTP/1.1 304 Not Modified\r\n\r\n");
    }

    #[test]
    fn single_satisfiable_range_is_partial_content() {
        let mut resp = Response::new(&RespLimits::default());
        resp.send_file_bytes(
            "text/plain",
            b"hello world",
            MTIME,
            Some(b"bytes=0-4"),
            None,
            None,
        );

        assert_eq!(
            str_op(&resp.buffer),
            "HTTP/1.1 206 Partial Content\r\ncontent-type: text/plain\r\n\
             content-range: bytes 0-4/11\r\ncontent-length: 0000000005\r\n\r\nhello"
        );
    }

    #[test]
    fn unsatisfiable_range_is_416() {
        let mut resp = Response::new(&RespLimits::default());
        resp.send_file_bytes(
            "text/plain",
            b"hello world",
            MTIME,
            Some(b"bytes=100-200"),
            None,
            None,
        );

        assert!(str_op(&resp.buffer).starts_with("HTTP/1.1 416 Range Not Satisfiable\r\n"));
        assert!(str_op(&resp.buffer).contains("content-range: bytes */11\r\n"));
    }

    #[test]
    fn malformed_range_is_400() {
        let mut resp = Response::new(&RespLimits::default());
        resp.send_file_bytes(
            "text/plain",
            b"hello world",
            MTIME,
            Some(b"nonsense"),
            None,
            None,
        );

        assert!(str_op(&resp.buffer).starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn stale_if_range_degrades_to_full_response() {
        let mut resp = Response::new(&RespLimits::default());
        resp.send_file_bytes(
            "text/plain",
            b"hello world",
            MTIME,
            Some(b"bytes=0-4"),
            None,
            Some(b"Mon, 01 Jan 1990 00:00:00 GMT"),
        );

        assert!(str_op(&resp.buffer).starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[test]
    fn multiple_ranges_produce_chunked_multipart_body() {
        let mut resp = Response::new(&RespLimits::default());
        resp.send_file_bytes(
            "text/plain",
            b"hello world",
            MTIME,
            Some(b"bytes=0-0,6-10"),
            None,
            None,
        );

        let out = str_op(&resp.buffer);
        assert!(out.starts_with("HTTP/1.1 206 Partial Content\r\n"));
        assert!(out.contains("content-type: multipart/byteranges; boundary=----Boundary"));
        assert!(out.contains("transfer-encoding: chunked\r\n"));
        assert!(out.contains("content-range: bytes 0-0/11"));
        assert!(out.contains("content-range: bytes 6-10/11"));
        assert!(out.ends_with("0\r\n\r\n"));
    }
}

#[cfg(test)]
mod sse_tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn events_are_framed_as_data_event_id_retry() {
        let mut resp = Response::new(&RespLimits::default());
        resp.sse(&[SseEvent { data: "hello", event: Some("greeting"), ..Default::default() }]);

        let out = str_op(&resp.buffer);
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("content-type: text/event-stream\r\n"));
        assert!(out.contains("data: hello\nevent: greeting\n\n"));
    }

    #[test]
    fn rejects_crlf_in_event_name_with_a_500_in_every_build_profile() {
        let mut resp = Response::new(&RespLimits::default());
        resp.sse(&[SseEvent { data: "hello", event: Some("x\r\nX-Injected: 1"), ..Default::default() }]);

        assert!(str_op(&resp.buffer).starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(!str_op(&resp.buffer).contains("X-Injected"));
    }
}
