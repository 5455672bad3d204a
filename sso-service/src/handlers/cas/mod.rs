//! CAS protocol server (v1 through v3 plus the SAML 1.1 validation
//! endpoint).

pub mod login;
pub mod logout;
pub mod proxy;
pub mod saml;
pub mod validate;
pub mod xml;
