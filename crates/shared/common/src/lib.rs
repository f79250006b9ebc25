//! Common utilities shared across all services.
//!
//! This crate provides:
//! - Unified error handling with stable client-facing codes
//! - The HTTP response envelope
//! - Configuration structures
//! - The notification transport contract

pub mod config;
pub mod error;
pub mod notify;
pub mod response;

pub use config::*;
pub use error::{AppError, AppResult, ErrorKind, OptionExt};
pub use notify::{DeliveryId, LogNotifier, Notifier, TemplateKind};
#[cfg(feature = "relay")]
pub use notify::RelayNotifier;
pub use response::{ApiResponse, Created, ErrorBody};
