//! HTTP request handlers.

pub mod admin_handler;
pub mod auth_handler;
pub mod employer_handler;
pub mod health_handler;

pub use admin_handler::admin_routes;
pub use auth_handler::auth_routes;
pub use employer_handler::employer_routes;
pub use health_handler::health_routes;
