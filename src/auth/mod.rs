//! Authorization
//!
//! Bitmask role model, the per-route gate built on it, and caller identity
//! resolution.

pub mod gate;
pub mod identity;
pub mod roles;

pub use gate::AuthorizationGate;
#[cfg(feature = "remote-auth")]
pub use identity::RemoteIdentityProvider;
pub use identity::{Identity, IdentityError, IdentityProvider, StaticIdentityProvider, AUTH_TOKEN_HEADER};
pub use roles::{is_admitted, AccessControl, AccessLevelSpec, AuthError, Role};
