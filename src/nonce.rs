//! # Nonce Service
//!
//! Issues and consumes single-use server nonces (`c_nonce`) scoped to a
//! subject binding, typically the JWK thumbprint of the wallet's `DPoP` key.
//!
//! Consumption is an atomic check-and-mark: of any number of concurrent
//! consumers of the same nonce, at most one succeeds.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::core::generate;
use crate::error::NonceError;

/// Default time a nonce remains valid.
pub const DEFAULT_TTL_SECS: i64 = 300;

/// A server-issued nonce.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Nonce {
    /// The nonce value handed to the caller.
    pub value: String,

    /// The subject or session the nonce is bound to.
    pub subject: String,

    /// When the nonce was issued.
    pub issued_at: DateTime<Utc>,

    /// When the nonce expires.
    pub expires_at: DateTime<Utc>,

    /// Whether the nonce has been consumed.
    pub consumed: bool,
}

impl Nonce {
    /// Number of seconds until the nonce expires.
    #[must_use]
    pub fn expires_in(&self) -> i64 {
        self.expires_at.signed_duration_since(Utc::now()).num_seconds().max(0)
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Keyed nonce store with TTL eviction.
#[derive(Debug)]
pub struct NonceService {
    ttl: TimeDelta,
    nonces: Mutex<HashMap<String, Nonce>>,
}

impl Default for NonceService {
    fn default() -> Self {
        Self::new(TimeDelta::try_seconds(DEFAULT_TTL_SECS).unwrap_or_default())
    }
}

impl NonceService {
    /// Create a nonce service issuing nonces valid for `ttl`.
    #[must_use]
    pub fn new(ttl: TimeDelta) -> Self {
        Self {
            ttl,
            nonces: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh nonce bound to `subject`.
    pub fn issue(&self, subject: &str) -> Nonce {
        let now = Utc::now();
        let nonce = Nonce {
            value: generate::nonce(),
            subject: subject.to_string(),
            issued_at: now,
            expires_at: now + self.ttl,
            consumed: false,
        };

        let mut nonces = self.nonces.lock().unwrap_or_else(PoisonError::into_inner);
        nonces.retain(|_, n| !n.is_expired(now));
        nonces.insert(nonce.value.clone(), nonce.clone());

        tracing::debug!(subject, "nonce::issue");
        nonce
    }

    /// Consume `value`, which must have been issued to `subject`.
    ///
    /// # Errors
    ///
    /// Returns `NonceError::Unknown` if the nonce was not issued to the
    /// subject, `NonceError::Expired` if it has expired, and
    /// `NonceError::AlreadyConsumed` if it has already been used.
    pub fn consume(&self, value: &str, subject: &str) -> Result<(), NonceError> {
        let now = Utc::now();
        let mut nonces = self.nonces.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(nonce) = nonces.get_mut(value) else {
            return Err(NonceError::Unknown);
        };
        if nonce.subject != subject {
            return Err(NonceError::Unknown);
        }
        if nonce.is_expired(now) {
            nonces.remove(value);
            return Err(NonceError::Expired);
        }
        if nonce.consumed {
            return Err(NonceError::AlreadyConsumed);
        }
        nonce.consumed = true;

        tracing::debug!(subject, "nonce::consume");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn consume_once() {
        let service = NonceService::default();
        let nonce = service.issue("jkt-1");

        assert_eq!(service.consume(&nonce.value, "jkt-1"), Ok(()));
        assert_eq!(service.consume(&nonce.value, "jkt-1"), Err(NonceError::AlreadyConsumed));
    }

    #[test]
    fn subject_bound() {
        let service = NonceService::default();
        let nonce = service.issue("jkt-1");

        assert_eq!(service.consume(&nonce.value, "jkt-2"), Err(NonceError::Unknown));
        assert_eq!(service.consume(&nonce.value, "jkt-1"), Ok(()));
    }

    #[test]
    fn unknown_and_expired() {
        let service = NonceService::new(TimeDelta::zero());
        assert_eq!(service.consume("never-issued", "jkt-1"), Err(NonceError::Unknown));

        let nonce = service.issue("jkt-1");
        assert_eq!(service.consume(&nonce.value, "jkt-1"), Err(NonceError::Expired));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers() {
        let service = Arc::new(NonceService::default());
        let nonce = service.issue("jkt-1");

        let handles = (0..16)
            .map(|_| {
                let service = Arc::clone(&service);
                let value = nonce.value.clone();
                tokio::spawn(async move { service.consume(&value, "jkt-1") })
            })
            .collect::<Vec<_>>();

        let mut successes = 0;
        for handle in handles {
            match handle.await.expect("task should complete") {
                Ok(()) => successes += 1,
                Err(e) => assert_eq!(e, NonceError::AlreadyConsumed),
            }
        }
        assert_eq!(successes, 1);
    }
}
