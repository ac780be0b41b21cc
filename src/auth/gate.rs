//! Per-route authorization gate
//!
//! Prepended to every bound route. Resolves the caller's role mask and the
//! route's access-level mask, then admits or answers 403.

use async_trait::async_trait;
use http::StatusCode;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::roles::{is_admitted, AccessControl, AuthError, DEFAULT_ACCESS_LEVEL, PUBLIC_ROLE};
use crate::http::context::{Flow, Handler, Middleware, RequestContext};

/// Middleware enforcing one route's access level
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    control: Arc<AccessControl>,
    access_level: String,
    level_mask: u32,
}

impl AuthorizationGate {
    /// Gate for `access_level` (absent means `public`)
    pub fn new(control: Arc<AccessControl>, access_level: Option<&str>) -> Result<Self, AuthError> {
        let access_level = access_level.unwrap_or(DEFAULT_ACCESS_LEVEL).to_string();
        let level_mask = control
            .access_level_mask(&access_level)
            .ok_or_else(|| AuthError::UnknownAccessLevel(access_level.clone()))?;
        Ok(Self {
            control,
            access_level,
            level_mask,
        })
    }

    pub fn into_handler(self) -> Handler {
        Arc::new(self)
    }

    pub fn access_level(&self) -> &str {
        &self.access_level
    }

    /// Role mask of the caller, `None` for a role the model does not define
    fn caller_mask(&self, ctx: &RequestContext) -> Option<u32> {
        let role = ctx
            .identity
            .as_ref()
            .and_then(|identity| identity.role.as_deref())
            .unwrap_or(PUBLIC_ROLE);
        self.control.role_mask(role)
    }
}

#[async_trait]
impl Middleware for AuthorizationGate {
    async fn handle(&self, ctx: &mut RequestContext) -> Flow {
        let Some(role_mask) = self.caller_mask(ctx) else {
            warn!(
                "Caller on {} {} has a role outside the configured role list",
                ctx.method, ctx.path
            );
            return Flow::status(StatusCode::FORBIDDEN);
        };

        if is_admitted(self.level_mask, role_mask) {
            Flow::Continue
        } else {
            debug!(
                "Denied {} {} (level {} mask {}, role mask {})",
                ctx.method, ctx.path, self.access_level, self.level_mask, role_mask
            );
            Flow::status(StatusCode::FORBIDDEN)
        }
    }
}
