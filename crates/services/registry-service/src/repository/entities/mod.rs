//! SeaORM entities for the registry tables.

pub mod account;
pub mod employer_case;
pub mod identity_cleanup;
pub mod otp_challenge;
pub mod verification_document;
