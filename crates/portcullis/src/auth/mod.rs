//! Credential verification: JWKS retrieval and JWT authentication.

pub mod jwks;
pub mod jwt;

pub use jwks::{Jwk, JwkSet, JwksCache};
pub use jwt::{strip_bearer, AuthOutcome, JwtAuthenticator, SigningFamily};
