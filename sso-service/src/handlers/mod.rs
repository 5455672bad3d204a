pub mod cas;
pub mod oidc;
pub mod sso;
