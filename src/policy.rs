//! Accept/reject decisions for password authentication attempts.
//!
//! The policy is independent of event emission: every attempt is recorded on
//! the bus before the policy is consulted, and a rejection is a normal
//! outcome rather than an error.

/// Immutable password-authentication policy.
///
/// - No configured username: always reject (record-only service).
/// - Matching username with no configured password: accept any password.
/// - Matching username and password: accept.
/// - Anything else: reject.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Maximum password attempts per connection before disconnecting.
    pub max_retry: u32,
}

impl AuthPolicy {
    /// Record-only policy: every attempt is rejected.
    pub fn reject_all(max_retry: u32) -> Self {
        Self {
            username: None,
            password: None,
            max_retry,
        }
    }

    /// Decide whether the attempt `(username, password)` is accepted.
    pub fn allows(&self, username: &str, password: &str) -> bool {
        let Some(expected_user) = &self.username else {
            return false;
        };
        if username != expected_user {
            return false;
        }
        match &self.password {
            None => true,
            Some(expected_pass) => password == expected_pass,
        }
    }
}
