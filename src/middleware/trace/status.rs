//! Span status taxonomy and its mapping from HTTP status codes.

use std::fmt;

/// Outcome of the unit of work a span covers.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SpanStatus {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Unimplemented,
    InternalError,
    Unavailable,
    Unauthenticated,
}

impl SpanStatus {
    /// Maps an HTTP response status onto the span taxonomy.
    ///
    /// Everything below 400 is `Ok`. Codes outside 100..600 are `Unknown`.
    pub fn from_http(code: u16) -> Self {
        match code {
            100..=399 => Self::Ok,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::AlreadyExists,
            413 => Self::FailedPrecondition,
            429 => Self::ResourceExhausted,
            499 => Self::Cancelled,
            400..=499 => Self::InvalidArgument,
            501 => Self::Unimplemented,
            503 => Self::Unavailable,
            504 => Self::DeadlineExceeded,
            500..=599 => Self::InternalError,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok                 => "ok",
            Self::Cancelled          => "cancelled",
            Self::Unknown            => "unknown",
            Self::InvalidArgument    => "invalid_argument",
            Self::DeadlineExceeded   => "deadline_exceeded",
            Self::NotFound           => "not_found",
            Self::AlreadyExists      => "already_exists",
            Self::PermissionDenied   => "permission_denied",
            Self::ResourceExhausted  => "resource_exhausted",
            Self::FailedPrecondition => "failed_precondition",
            Self::Unimplemented      => "unimplemented",
            Self::InternalError      => "internal_error",
            Self::Unavailable        => "unavailable",
            Self::Unauthenticated    => "unauthenticated",
        }
    }
}

impl fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_redirects_are_ok() {
        for code in [200, 201, 204, 301, 304] {
            assert_eq!(SpanStatus::from_http(code), SpanStatus::Ok, "{code}");
        }
    }

    #[test]
    fn client_errors() {
        assert_eq!(SpanStatus::from_http(400), SpanStatus::InvalidArgument);
        assert_eq!(SpanStatus::from_http(401), SpanStatus::Unauthenticated);
        assert_eq!(SpanStatus::from_http(403), SpanStatus::PermissionDenied);
        assert_eq!(SpanStatus::from_http(404), SpanStatus::NotFound);
        assert_eq!(SpanStatus::from_http(409), SpanStatus::AlreadyExists);
        assert_eq!(SpanStatus::from_http(413), SpanStatus::FailedPrecondition);
        assert_eq!(SpanStatus::from_http(418), SpanStatus::InvalidArgument);
        assert_eq!(SpanStatus::from_http(429), SpanStatus::ResourceExhausted);
        assert_eq!(SpanStatus::from_http(499), SpanStatus::Cancelled);
    }

    #[test]
    fn server_errors() {
        assert_eq!(SpanStatus::from_http(500), SpanStatus::InternalError);
        assert_eq!(SpanStatus::from_http(501), SpanStatus::Unimplemented);
        assert_eq!(SpanStatus::from_http(502), SpanStatus::InternalError);
        assert_eq!(SpanStatus::from_http(503), SpanStatus::Unavailable);
        assert_eq!(SpanStatus::from_http(504), SpanStatus::DeadlineExceeded);
    }

    #[test]
    fn out_of_range_is_unknown() {
        assert_eq!(SpanStatus::from_http(42), SpanStatus::Unknown);
        assert_eq!(SpanStatus::from_http(600), SpanStatus::Unknown);
        assert_eq!(SpanStatus::from_http(600).to_string(), "unknown");
    }
}
