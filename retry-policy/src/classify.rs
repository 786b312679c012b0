use std::fmt;

/// Whether retrying a failed remote call can help.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Rate limit, timeout, connection loss, server-side failure.
    Transient,
    /// Authentication, invalid request, permission denied, not found.
    Permanent,
    /// No classification available. Treated as non-retryable.
    Unknown,
}

impl FailureClass {
    pub fn is_retryable(self) -> bool {
        self == FailureClass::Transient
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Transient => write!(f, "transient"),
            FailureClass::Permanent => write!(f, "permanent"),
            FailureClass::Unknown => write!(f, "unknown"),
        }
    }
}

/// Implemented by error types of remote-call abstractions so the backoff
/// policy can decide without looking at error text.
pub trait Classify: fmt::Display {
    fn failure_class(&self) -> FailureClass;
}

/// Status codes that mark a request as not worth repeating. Matched only
/// as whole numbers so `4000ms` or a `:4001` port do not count.
const PERMANENT_STATUS_CODES: [&str; 3] = ["400", "401", "403"];

const PERMANENT_PHRASES: [&str; 6] = [
    "unauthorized",
    "authentication",
    "bad request",
    "invalid request",
    "forbidden",
    "permission denied",
];

fn has_status_code(message: &str, codes: &[&str]) -> bool {
    message
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| codes.contains(&word))
}

/// Heuristic classification from an error message.
///
/// Only consulted for errors whose own classification is
/// [`FailureClass::Unknown`]. Permanent markers win over transient ones.
pub fn classify_message(message: &str) -> FailureClass {
    let message = message.to_lowercase();

    if has_status_code(&message, &PERMANENT_STATUS_CODES)
        || PERMANENT_PHRASES.iter().any(|phrase| message.contains(phrase))
    {
        return FailureClass::Permanent;
    }

    let timeout = message.contains("timeout") || message.contains("timed out");
    let rate_limited = has_status_code(&message, &["429"]) || message.contains("rate limit");
    let connection = message.contains("connection") && (message.contains("failed") || message.contains("error"));
    if timeout || rate_limited || connection {
        return FailureClass::Transient;
    }

    FailureClass::Unknown
}
