//! Authentication
//!
//! Bearer token validation for the REST API. Accounts and sessions are
//! managed by the login service that issues the tokens.

mod error;
pub mod jwt;
mod middleware;

pub use error::{AuthError, AuthResult};
pub use middleware::{require_auth, AuthUser};
