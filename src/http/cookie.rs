//! `Set-Cookie` attribute set for [`Response::cookie`](super::response::Response::cookie).

use std::time::{Duration, SystemTime};

/// `SameSite` attribute of a cookie (RFC 6265bis).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Optional attributes of a `Set-Cookie` header, built with `..Default::default()`
/// the same way [`limits`](crate::limits) structs are.
///
/// # Examples
/// ```
/// use maker_web::CookieOptions;
/// use std::time::Duration;
///
/// let opts = CookieOptions {
///     max_age: Some(Duration::from_secs(3600)),
///     path: Some("/"),
///     http_only: true,
///     secure: true,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieOptions<'a> {
    /// `expires=<RFC1123 GMT>`.
    pub expires: Option<SystemTime>,
    /// `max-age=<seconds>`.
    pub max_age: Option<Duration>,
    /// `path=<percent-encoded>`.
    pub path: Option<&'a str>,
    /// `domain=`.
    pub domain: Option<&'a str>,
    /// `samesite=`.
    pub same_site: Option<SameSite>,
    /// Adds the `secure` flag.
    pub secure: bool,
    /// Adds the `httponly` flag.
    pub http_only: bool,
}
