//! Services layer: the issuance engine, key manager, session codec,
//! cleanup job and single-logout queue the protocol handlers are built on.

pub mod cleanup;
pub mod error;
pub mod keys;
pub mod session_token;
pub mod slo;
pub mod tickets;

pub use cleanup::CleanupJob;
pub use error::ServiceError;
pub use keys::{Jwk, JwksDocument, KeyManager};
pub use session_token::SessionTokenCodec;
pub use slo::{SingleLogoutQueue, SloNotice};
pub use tickets::{ArtifactExtras, AudienceMatch, TicketService};
