//! services/api/src/security/mod.rs
//!
//! Password hashing and bearer token issuance/verification.

pub mod password;
pub mod token;

pub use password::{hash_password, verify_password, PasswordError};
pub use token::{TokenError, TokenService};
