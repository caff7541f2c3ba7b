//! Authenticated principal extraction and authorization helpers.
//!
//! API handlers authenticate from the signed session cookie alone; no
//! database round-trip happens at this layer. A session still waiting on
//! its OTP step is rejected here, so `required_2fa` tokens can only reach
//! the two-factor endpoints that accept them explicitly.

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::session::{PlanTier, Role};

use super::session::decode_claims;
use super::state::AuthState;

/// Authenticated user context derived from the session cookie.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
    pub plan_tier: PlanTier,
}

/// Resolve the session cookie into a principal, or return 401.
pub(crate) fn require_auth(
    headers: &HeaderMap,
    auth_state: &AuthState,
) -> Result<Principal, ApiError> {
    let claims = decode_claims(auth_state, headers).ok_or(ApiError::Unauthorized)?;
    if claims.required_2fa {
        // Password accepted but OTP pending; not authenticated yet.
        return Err(ApiError::Unauthorized);
    }
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::Unauthorized)?;
    Ok(Principal {
        user_id,
        role: claims.role,
        plan_tier: claims.plan_tier,
    })
}

/// Enforce a minimum role, or return 403.
pub(crate) fn require_role(principal: &Principal, min_role: Role) -> Result<(), ApiError> {
    if principal.role >= min_role {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Enforce the PRO plan for premium features, or return 403.
pub(crate) fn require_pro(principal: &Principal) -> Result<(), ApiError> {
    if principal.plan_tier == PlanTier::Pro {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role, plan_tier: PlanTier) -> Principal {
        Principal {
            user_id: Uuid::nil(),
            role,
            plan_tier,
        }
    }

    #[test]
    fn require_role_uses_the_role_order() {
        let admin = principal(Role::Admin, PlanTier::Free);
        assert!(require_role(&admin, Role::User).is_ok());
        assert!(require_role(&admin, Role::Admin).is_ok());
        assert!(require_role(&admin, Role::SuperAdmin).is_err());
    }

    #[test]
    fn require_pro_gates_free_tier() {
        assert!(require_pro(&principal(Role::User, PlanTier::Pro)).is_ok());
        assert!(require_pro(&principal(Role::SuperAdmin, PlanTier::Free)).is_err());
    }
}
