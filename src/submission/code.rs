/// Submission code generation
///
/// Codes look like `EVL-250314-0427`. Candidates are random; after the
/// configured number of collisions a high-resolution suffix is appended so
/// generation always terminates.
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

static FALLBACK_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct CodeGenerator {
    prefix: String,
}

impl CodeGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// `{PREFIX}-{yymmdd}-{4-digit-random}`
    pub fn candidate(&self, at: DateTime<Utc>) -> String {
        let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
        format!("{}-{}-{:04}", self.prefix, at.format("%y%m%d"), suffix)
    }

    /// Candidate extended with a microsecond timestamp and a process-wide
    /// sequence number
    pub fn fallback(&self, at: DateTime<Utc>) -> String {
        let sequence = FALLBACK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{}{:04}",
            self.candidate(at),
            at.timestamp_micros(),
            sequence % 10_000
        )
    }
}
