pub mod client;
pub mod group;
pub mod tenant;
pub mod ticket;
pub mod user;

pub use client::{Client, ClientStatus};
pub use group::{Group, GroupStatus};
pub use tenant::{Tenant, TenantStatus};
pub use ticket::{Artifact, ArtifactKind, Credential, CredentialKind, Session};
pub use user::{User, UserStatus};
