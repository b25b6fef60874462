//! Boundary authentication and input validation (§6).

pub mod hmac_auth;
pub mod input_validation;

pub use hmac_auth::{AuthContext, HmacAuthenticator};
pub use input_validation::{InputValidator, ValidationConfig};
