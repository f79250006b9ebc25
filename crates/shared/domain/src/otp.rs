//! One-time verification codes.
//!
//! `OtpCode` is the plain six digit code that travels to the user;
//! `OtpChallenge` is what the registry keeps, holding only an argon2 hash.

use std::fmt;

use argon2::{
    password_hash::{
        rand_core::{OsRng, RngCore},
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{OTP_HASH_ITERATIONS, OTP_HASH_MEMORY_KIB, OTP_LENGTH, OTP_MODULUS};
use crate::error::{DomainError, DomainResult};

/// A plain verification code.
#[derive(Clone, PartialEq, Eq)]
pub struct OtpCode(String);

// Codes are secrets; keep them out of debug output
impl fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OtpCode").field(&"[REDACTED]").finish()
    }
}

impl OtpCode {
    /// Generate a uniformly distributed code from the OS RNG.
    pub fn generate() -> Self {
        // Rejection sampling keeps the distribution flat over 0..OTP_MODULUS
        let zone = u32::MAX - (u32::MAX % OTP_MODULUS);
        loop {
            let value = OsRng.next_u32();
            if value < zone {
                return Self(format!("{:0width$}", value % OTP_MODULUS, width = OTP_LENGTH));
            }
        }
    }

    /// Parse user input into a code.
    pub fn parse(input: &str) -> DomainResult<Self> {
        let input = input.trim();
        if input.len() != OTP_LENGTH || !input.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::validation(format!(
                "Verification code must be {} digits",
                OTP_LENGTH
            )));
        }
        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hash the code for storage.
    pub fn hash(&self) -> DomainResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        hasher()?
            .hash_password(self.0.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| DomainError::internal(format!("Failed to hash code: {}", e)))
    }

    /// Check this code against a stored hash.
    pub fn matches(&self, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(_) => return false,
        };
        // Verification reads the cost parameters from the hash itself
        Argon2::default()
            .verify_password(self.0.as_bytes(), &parsed)
            .is_ok()
    }
}

fn hasher() -> DomainResult<Argon2<'static>> {
    let params = Params::new(OTP_HASH_MEMORY_KIB, OTP_HASH_ITERATIONS, 1, None)
        .map_err(|e| DomainError::internal(format!("Invalid argon2 params: {}", e)))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// A stored verification challenge. At most one exists per email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpChallenge {
    /// Identity of this issuance; a newer issue replaces it
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub code_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl OtpChallenge {
    /// Create a fresh challenge for `email` valid for `ttl`.
    pub fn new(email: &str, code: &OtpCode, ttl: Duration, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            code_hash: code.hash()?,
            issued_at: now,
            expires_at: now + ttl,
            attempt_count: 0,
            consumed_at: None,
        })
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Check if the wrong-guess ceiling has been reached
    pub fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.attempt_count >= max_attempts
    }

    /// Unconsumed, unexpired and below the attempt ceiling.
    pub fn is_active(&self, now: DateTime<Utc>, max_attempts: u32) -> bool {
        !self.is_consumed() && !self.is_expired(now) && !self.is_exhausted(max_attempts)
    }

    /// Time left before another code may be requested, if any.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>, cooldown: Duration) -> Option<Duration> {
        let ready_at = self.issued_at + cooldown;
        (now < ready_at).then(|| ready_at - now)
    }
}

/// Public view of an issued challenge. Never carries the code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct IssuedChallenge {
    pub email: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&OtpChallenge> for IssuedChallenge {
    fn from(challenge: &OtpChallenge) -> Self {
        Self {
            email: challenge.email.clone(),
            issued_at: challenge.issued_at,
            expires_at: challenge.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..50 {
            let code = OtpCode::generate();
            assert_eq!(code.as_str().len(), 6);
            assert!(code.as_str().chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn parse_rejects_wrong_shapes() {
        assert!(OtpCode::parse("12345").is_err());
        assert!(OtpCode::parse("1234567").is_err());
        assert!(OtpCode::parse("12a456").is_err());
        assert_eq!(OtpCode::parse(" 012345 ").unwrap().as_str(), "012345");
    }

    #[test]
    fn hash_matches_only_the_same_code() {
        let code = OtpCode::parse("424242").unwrap();
        let hash = code.hash().unwrap();
        assert!(code.matches(&hash));
        assert!(!OtpCode::parse("424243").unwrap().matches(&hash));
        assert!(!code.matches("not-a-hash"));
    }

    #[test]
    fn debug_output_is_redacted() {
        let code = OtpCode::parse("123456").unwrap();
        assert!(!format!("{:?}", code).contains("123456"));
    }

    #[test]
    fn challenge_lifecycle_flags() {
        let now = Utc::now();
        let code = OtpCode::generate();
        let mut challenge = OtpChallenge::new("a@x.com", &code, Duration::minutes(10), now).unwrap();

        assert!(challenge.is_active(now, 5));
        assert!(challenge.is_expired(now + Duration::minutes(10)));

        challenge.attempt_count = 5;
        assert!(challenge.is_exhausted(5));
        assert!(!challenge.is_active(now, 5));
    }

    #[test]
    fn cooldown_counts_down_from_issue_time() {
        let now = Utc::now();
        let challenge =
            OtpChallenge::new("a@x.com", &OtpCode::generate(), Duration::minutes(10), now).unwrap();

        let remaining = challenge
            .cooldown_remaining(now + Duration::seconds(20), Duration::seconds(60))
            .unwrap();
        assert_eq!(remaining.num_seconds(), 40);
        assert!(challenge
            .cooldown_remaining(now + Duration::seconds(60), Duration::seconds(60))
            .is_none());
    }
}
