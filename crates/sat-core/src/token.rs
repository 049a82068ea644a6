//! # Access Token
//!
//! Bearer credential obtained from the authentication operation. It is
//! immutable: renewal produces a new token, it never mutates one.
//!
//! ## Security Invariant
//!
//! The token value is held in a `Zeroizing<String>` and redacted from
//! `Debug` output so it cannot leak into logs.

use chrono::{DateTime, Duration, Utc};
use zeroize::Zeroizing;

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: Zeroizing<String>,
    created: DateTime<Utc>,
    expires: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, created: DateTime<Utc>, expires: DateTime<Utc>) -> Self {
        Self {
            value: Zeroizing::new(value.into()),
            created,
            expires,
        }
    }

    pub fn value(&self) -> &str {
        self.value.as_str()
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    /// Whether the token is unusable at `now`, treating the last
    /// `margin` before expiry as already expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now(), Duration::zero())
    }

    /// Value of the HTTP `Authorization` header for authenticated calls.
    pub fn authorization_header(&self) -> String {
        format!("WRAP access_token=\"{}\"", self.value.as_str())
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("created", &self.created)
            .field("expires", &self.expires)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn token() -> AccessToken {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        AccessToken::new("eyJhbGciOi", created, created + Duration::minutes(5))
    }

    #[test]
    fn expiry_honours_margin() {
        let t = token();
        let almost = t.created() + Duration::minutes(4) + Duration::seconds(40);
        assert!(!t.is_expired_at(almost, Duration::zero()));
        assert!(t.is_expired_at(almost, Duration::seconds(30)));
        assert!(t.is_expired_at(t.expires(), Duration::zero()));
    }

    #[test]
    fn authorization_header_uses_wrap_scheme() {
        assert_eq!(
            token().authorization_header(),
            "WRAP access_token=\"eyJhbGciOi\""
        );
    }

    #[test]
    fn debug_redacts_value() {
        let rendered = format!("{:?}", token());
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("eyJhbGciOi"));
    }
}
