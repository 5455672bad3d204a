//! LDAP directory bridge for legacy bind/search clients.

pub mod dn;
pub mod server;

pub use server::LdapServer;
