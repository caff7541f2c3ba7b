//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::session::{PlanTier, Role, SyncStatus};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ActivateRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendActivationRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    /// True when the password was accepted but an OTP step is still pending;
    /// the issued cookie is then restricted to the two-factor route.
    pub requires_2fa: bool,
    pub session: Option<SessionResponse>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorEnableResponse {
    pub secret_base32: String,
    pub otpauth_url: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorVerifyRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorVerifyResponse {
    pub verified: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub required_2fa: bool,
    pub onboarding_completed: bool,
    pub sync_status: SyncStatus,
    pub plan_tier: PlanTier,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn signup_request_round_trips() -> Result<()> {
        let request = SignupRequest {
            email: "alice@example.com".to_string(),
            password: "hunter2hunter2".to_string(),
            display_name: Some("Alice".to_string()),
        };
        let value = serde_json::to_value(&request)?;
        let email = value
            .get("email")
            .and_then(serde_json::Value::as_str)
            .context("missing email")?;
        assert_eq!(email, "alice@example.com");
        let decoded: SignupRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.display_name.as_deref(), Some("Alice"));
        Ok(())
    }

    #[test]
    fn login_response_serializes_pending_state() -> Result<()> {
        let response = LoginResponse {
            requires_2fa: true,
            session: None,
        };
        let value = serde_json::to_value(&response)?;
        assert_eq!(value["requires_2fa"], true);
        assert_eq!(value["session"], serde_json::Value::Null);
        Ok(())
    }

    #[test]
    fn session_response_uses_declared_enum_names() -> Result<()> {
        let response = SessionResponse {
            user_id: "u-1".to_string(),
            email: "alice@example.com".to_string(),
            role: Role::Admin,
            required_2fa: false,
            onboarding_completed: true,
            sync_status: SyncStatus::Completed,
            plan_tier: PlanTier::Pro,
        };
        let value = serde_json::to_value(&response)?;
        assert_eq!(value["role"], "ADMIN");
        assert_eq!(value["sync_status"], "COMPLETED");
        assert_eq!(value["plan_tier"], "PRO");
        Ok(())
    }
}
