//! Retry with a fixed backoff schedule for calls to unreliable remote
//! services.
//!
//! Errors opt in through [`Classify`]; anything that cannot be classified
//! is treated as permanent.

pub mod classify;
pub mod policy;
pub mod sleeper;

pub use classify::{classify_message, Classify, FailureClass};
pub use policy::{AttemptOutcome, BackoffConfig, BackoffPolicy, DEFAULT_DELAYS_MS, DEFAULT_MAX_ATTEMPTS};
pub use sleeper::{RecordingSleeper, Sleeper, ThreadSleeper};
