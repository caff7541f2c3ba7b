//! Session claims and the signed token that carries them.
//!
//! A session is a single HS256-signed token set as an `HttpOnly` cookie at
//! login. It carries everything the authorization gate needs to make a
//! routing decision without touching the database: the user id, role, the
//! two-factor completion flag, and the business-process hints the UI polls
//! for (onboarding, ERP sync status, plan tier).
//!
//! Claims are minted by the login handler, refreshed by `GET /v1/session`,
//! and destroyed by logout or expiry. The gate only reads them.

pub mod token;

pub use token::{sign_hs256, verify_hs256, Error, SESSION_COOKIE_NAME};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Ordered access levels; a route's minimum role is compared with `>=`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, ToSchema)]
pub enum Role {
    #[serde(rename = "GUEST")]
    Guest,
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "SUPER_ADMIN")]
    SuperAdmin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "GUEST",
            Self::User => "USER",
            Self::Admin => "ADMIN",
            Self::SuperAdmin => "SUPER_ADMIN",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "GUEST" => Some(Self::Guest),
            "USER" => Some(Self::User),
            "ADMIN" => Some(Self::Admin),
            "SUPER_ADMIN" => Some(Self::SuperAdmin),
            _ => None,
        }
    }
}

/// ERP sync lifecycle, driven by the sync worker; terminal states route the
/// browser to a results or error page.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub enum SyncStatus {
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "SYNCING")]
    Syncing,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Syncing => "SYNCING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "IDLE" => Some(Self::Idle),
            "SYNCING" => Some(Self::Syncing),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Subscription level sourced from billing state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub enum PlanTier {
    #[serde(rename = "FREE")]
    Free,
    #[serde(rename = "PRO")]
    Pro,
}

impl PlanTier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Pro => "PRO",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "FREE" => Some(Self::Free),
            "PRO" => Some(Self::Pro),
            _ => None,
        }
    }
}

/// Claims carried inside the signed session token.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// User id; non-empty for authenticated sessions.
    pub sub: String,
    pub role: Role,
    /// True between primary-credential success and OTP completion; a true
    /// value restricts the session to the two-factor route.
    pub required_2fa: bool,
    pub onboarding_completed: bool,
    pub sync_status: SyncStatus,
    pub plan_tier: PlanTier,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    /// Build claims for a fully authenticated session.
    #[must_use]
    pub fn new(sub: String, role: Role, now: i64, ttl_seconds: i64) -> Self {
        Self {
            sub,
            role,
            required_2fa: false,
            onboarding_completed: false,
            sync_status: SyncStatus::Idle,
            plan_tier: PlanTier::Free,
            iat: now,
            exp: now.saturating_add(ttl_seconds),
        }
    }

    #[must_use]
    pub fn with_required_2fa(mut self, required: bool) -> Self {
        self.required_2fa = required;
        self
    }

    #[must_use]
    pub fn with_onboarding_completed(mut self, completed: bool) -> Self {
        self.onboarding_completed = completed;
        self
    }

    #[must_use]
    pub fn with_sync_status(mut self, status: SyncStatus) -> Self {
        self.sync_status = status;
        self
    }

    #[must_use]
    pub fn with_plan_tier(mut self, tier: PlanTier) -> Self {
        self.plan_tier = tier;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_order_matches_access_levels() {
        assert!(Role::Guest < Role::User);
        assert!(Role::User < Role::Admin);
        assert!(Role::Admin < Role::SuperAdmin);
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Guest, Role::User, Role::Admin, Role::SuperAdmin] {
            assert_eq!(Role::from_str(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_str("OPERATOR"), None);
    }

    #[test]
    fn sync_status_terminal_states() {
        assert!(!SyncStatus::Idle.is_terminal());
        assert!(!SyncStatus::Syncing.is_terminal());
        assert!(SyncStatus::Completed.is_terminal());
        assert!(SyncStatus::Failed.is_terminal());
    }

    #[test]
    fn claims_builder_defaults() {
        let claims = SessionClaims::new("user-1".to_string(), Role::User, 1_700_000_000, 3600);
        assert_eq!(claims.exp, 1_700_003_600);
        assert!(!claims.required_2fa);
        assert_eq!(claims.sync_status, SyncStatus::Idle);
        assert_eq!(claims.plan_tier, PlanTier::Free);

        let claims = claims
            .with_required_2fa(true)
            .with_sync_status(SyncStatus::Syncing)
            .with_plan_tier(PlanTier::Pro);
        assert!(claims.required_2fa);
        assert_eq!(claims.sync_status, SyncStatus::Syncing);
        assert_eq!(claims.plan_tier, PlanTier::Pro);
    }

    #[test]
    fn claims_serialize_with_declared_names() {
        let claims = SessionClaims::new("u".to_string(), Role::SuperAdmin, 0, 60);
        let value = serde_json::to_value(&claims).expect("serialize claims");
        assert_eq!(value["role"], "SUPER_ADMIN");
        assert_eq!(value["sync_status"], "IDLE");
        assert_eq!(value["plan_tier"], "FREE");
    }
}
