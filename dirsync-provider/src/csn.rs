//! Change Sequence Number and synchronization cookie codec (spec §4.1).
//!
//! A [`Csn`] is an opaque, lexicographically ordered byte string; the
//! backend stamps one into every committed entry and the maximum observed
//! value is the **context CSN** (spec §3). The [`Cookie`] wraps a `Csn`
//! together with the session/request identifiers a consumer expects
//! echoed back, following the `rid=..,sid=..,csn=..` key/value syntax
//! directory sync cookies use on the wire.

use dirsync_core::error::{CoreError, Result};
use std::cmp::Ordering;
use std::fmt;

/// An opaque change sequence number, compared byte-for-byte (spec §4.1:
/// "Compare operation is raw byte compare").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Csn(Vec<u8>);

impl Csn {
    /// Wrap raw bytes as a CSN without validation.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes, checked by the codec against the configured CSN
    /// buffer size (spec §4.1).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// `Vec<u8>`'s derived `Ord` is already a lexicographic byte compare; we
// implement explicitly so the "raw byte compare" requirement reads as an
// invariant of this type rather than an accident of the derive.
impl PartialOrd for Csn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Csn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for Csn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Csn {
    /// Parse a hex-encoded CSN as emitted by [`fmt::Display`].
    pub fn parse_hex(s: &str) -> Result<Self> {
        if s.len() % 2 != 0 {
            return Err(CoreError::protocol("CSN hex string has odd length"));
        }
        let mut bytes = Vec::with_capacity(s.len() / 2);
        let chars: Vec<char> = s.chars().collect();
        for pair in chars.chunks(2) {
            let hex: String = pair.iter().collect();
            let byte = u8::from_str_radix(&hex, 16)
                .map_err(|e| CoreError::protocol(format!("invalid CSN hex byte: {e}")))?;
            bytes.push(byte);
        }
        Ok(Self(bytes))
    }
}

/// A consumer's synchronization position: the CSN plus round-tripped
/// session/request identifiers (spec §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cookie {
    pub csn: Option<Csn>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
}

impl Cookie {
    /// A cookie carrying only a CSN, with no session/request identifiers.
    pub fn from_csn(csn: Csn) -> Self {
        Self {
            csn: Some(csn),
            session_id: None,
            request_id: None,
        }
    }
}

/// Encodes and decodes cookies, enforcing the configured CSN length bound
/// (spec §4.1: "the codec must reject cookies whose CSN exceeds that size
/// with a protocol error").
#[derive(Debug, Clone, Copy)]
pub struct CookieCodec {
    max_csn_len: usize,
}

impl CookieCodec {
    pub fn new(max_csn_len: usize) -> Self {
        Self { max_csn_len }
    }

    /// Encode a cookie to its wire octet string. Emission is idempotent:
    /// an identical `Cookie` always produces identical bytes (spec §4.1),
    /// because fields are always written in the same order.
    pub fn encode(&self, cookie: &Cookie) -> Result<String> {
        if let Some(csn) = &cookie.csn {
            if csn.len() > self.max_csn_len {
                return Err(CoreError::protocol(format!(
                    "CSN length {} exceeds buffer size {}",
                    csn.len(),
                    self.max_csn_len
                )));
            }
        }

        let mut parts = Vec::with_capacity(3);
        if let Some(rid) = &cookie.request_id {
            parts.push(format!("rid={rid}"));
        }
        if let Some(sid) = &cookie.session_id {
            parts.push(format!("sid={sid}"));
        }
        if let Some(csn) = &cookie.csn {
            parts.push(format!("csn={csn}"));
        }
        Ok(parts.join(","))
    }

    /// Decode a wire octet string into a [`Cookie`].
    ///
    /// An empty string decodes to an empty cookie (no CSN: "cold" consumer
    /// with nothing delivered yet), matching the spec's treatment of an
    /// absent cookie in the synchronization request control (§6).
    pub fn decode(&self, wire: &str) -> Result<Cookie> {
        let wire = wire.trim();
        if wire.is_empty() {
            return Ok(Cookie::default());
        }

        let mut cookie = Cookie::default();
        for field in wire.split(',') {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| CoreError::protocol(format!("malformed cookie field: {field}")))?;
            match key {
                "rid" => cookie.request_id = Some(value.to_string()),
                "sid" => cookie.session_id = Some(value.to_string()),
                "csn" => {
                    let csn = Csn::parse_hex(value)?;
                    if csn.len() > self.max_csn_len {
                        return Err(CoreError::protocol(format!(
                            "CSN length {} exceeds buffer size {}",
                            csn.len(),
                            self.max_csn_len
                        )));
                    }
                    cookie.csn = Some(csn);
                }
                other => {
                    return Err(CoreError::protocol(format!("unknown cookie field: {other}")));
                }
            }
        }
        Ok(cookie)
    }
}
