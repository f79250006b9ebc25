//! Domain-level constants.
//!
//! These constants define business rules and verification limits.

// =============================================================================
// Roles
// =============================================================================

/// Job seeker role
pub const ROLE_JOBSEEKER: &str = "jobseeker";

/// Employer role (subject to document review)
pub const ROLE_EMPLOYER: &str = "employer";

/// Administrator role
pub const ROLE_ADMIN: &str = "admin";

/// Super administrator role
pub const ROLE_SUPERADMIN: &str = "superadmin";

/// All valid role values
pub const VALID_ROLES: &[&str] = &[ROLE_JOBSEEKER, ROLE_EMPLOYER, ROLE_ADMIN, ROLE_SUPERADMIN];

/// Check if a role value is valid
pub fn is_valid_role(role: &str) -> bool {
    VALID_ROLES.contains(&role)
}

// =============================================================================
// One-time codes
// =============================================================================

/// Number of decimal digits in a verification code
pub const OTP_LENGTH: usize = 6;

/// Exclusive upper bound for a numeric code of `OTP_LENGTH` digits
pub const OTP_MODULUS: u32 = 1_000_000;

/// Default lifetime of a verification code in seconds (10 minutes)
pub const DEFAULT_OTP_TTL_SECONDS: i64 = 600;

/// Default number of wrong guesses before a challenge is dead
pub const DEFAULT_OTP_MAX_ATTEMPTS: u32 = 5;

/// Default cooldown between two resend requests in seconds
pub const DEFAULT_OTP_RESEND_COOLDOWN_SECONDS: i64 = 60;

/// Argon2 memory cost (KiB) for hashing codes at rest
pub const OTP_HASH_MEMORY_KIB: u32 = 8 * 1024;

/// Argon2 iteration count for hashing codes at rest
pub const OTP_HASH_ITERATIONS: u32 = 1;

// =============================================================================
// Authentication
// =============================================================================

/// Default JWT token expiration in hours
pub const DEFAULT_JWT_EXPIRATION_HOURS: i64 = 24;

/// Minimum JWT secret length (security requirement)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Minimum password length accepted at registration
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Seconds per hour (for token expiration calculation)
pub const SECONDS_PER_HOUR: i64 = 3600;

/// Authorization header prefix for Bearer tokens
pub const BEARER_TOKEN_PREFIX: &str = "Bearer ";

/// JWT token type identifier
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

// =============================================================================
// Employer review
// =============================================================================

/// Maximum accepted size of a single verification document (10 MiB)
pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

/// Content types accepted for verification documents
pub const ACCEPTED_DOCUMENT_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png"];
