pub mod auth;
pub mod error;
pub mod middleware;
pub mod predict;
pub mod rest;
pub mod routes;
pub mod state;
pub mod users;

// Re-exported for the binaries and integration tests.
pub use middleware::{optional_auth, require_auth};
pub use routes::build_router;
