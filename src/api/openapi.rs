//! OpenAPI document for the `/docs` UI.

use utoipa::OpenApi;

use crate::api::error::{ErrorBody, ValidationIssue};
use crate::api::handlers::auth::types::{
    ActivateRequest, LoginRequest, LoginResponse, MessageResponse, PasswordResetConfirmRequest,
    PasswordResetRequest, ResendActivationRequest, SessionResponse, SignupRequest,
    TwoFactorEnableResponse, TwoFactorVerifyRequest, TwoFactorVerifyResponse,
};
use crate::api::handlers::billing::{CheckoutAnonRequest, CheckoutResponse, PortalResponse};
use crate::api::handlers::dashboard::{
    AlertResponse, FirstImpactResponse, OverviewMetricsResponse,
};
use crate::api::handlers::erp::{ConnectResponse, ErpStatusResponse, SyncDispatchResponse};
use crate::api::handlers::users::{
    InviteRequest, InviteResponse, InviteVerifyRequest, UserDetail, UserSummary,
};
use crate::session::{PlanTier, Role, SyncStatus};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::auth::signup::signup,
        crate::api::handlers::auth::signup::activate,
        crate::api::handlers::auth::signup::resend_activation,
        crate::api::handlers::auth::login::login,
        crate::api::handlers::auth::login::password_reset_request,
        crate::api::handlers::auth::login::password_reset_confirm,
        crate::api::handlers::auth::session::session,
        crate::api::handlers::auth::session::logout,
        crate::api::handlers::auth::totp::two_factor_enable,
        crate::api::handlers::auth::totp::two_factor_verify,
        crate::api::handlers::auth::totp::two_factor_disable,
        crate::api::handlers::billing::checkout,
        crate::api::handlers::billing::checkout_anon,
        crate::api::handlers::billing::portal,
        crate::api::handlers::erp::connect,
        crate::api::handlers::erp::callback,
        crate::api::handlers::erp::disconnect,
        crate::api::handlers::erp::status,
        crate::api::handlers::erp::sync,
        crate::api::handlers::dashboard::alerts,
        crate::api::handlers::dashboard::overview_metrics,
        crate::api::handlers::dashboard::first_impact,
        crate::api::handlers::users::list_users,
        crate::api::handlers::users::get_user,
        crate::api::handlers::users::invite_user,
        crate::api::handlers::users::invite_verify,
    ),
    components(schemas(
        ActivateRequest,
        AlertResponse,
        CheckoutAnonRequest,
        CheckoutResponse,
        ConnectResponse,
        ErpStatusResponse,
        ErrorBody,
        FirstImpactResponse,
        InviteRequest,
        InviteResponse,
        InviteVerifyRequest,
        LoginRequest,
        LoginResponse,
        MessageResponse,
        OverviewMetricsResponse,
        PasswordResetConfirmRequest,
        PasswordResetRequest,
        PlanTier,
        PortalResponse,
        ResendActivationRequest,
        Role,
        SessionResponse,
        SignupRequest,
        SyncDispatchResponse,
        SyncStatus,
        TwoFactorEnableResponse,
        TwoFactorVerifyRequest,
        TwoFactorVerifyResponse,
        UserDetail,
        UserSummary,
        ValidationIssue,
    )),
    tags(
        (name = "auth", description = "Signup, login, sessions, two-factor"),
        (name = "billing", description = "Checkout and billing portal"),
        (name = "erp", description = "Bling connection and sync dispatch"),
        (name = "dashboard", description = "Inventory-health reads"),
        (name = "users", description = "User management and invites")
    ),
    info(
        title = "Nexus OS API",
        description = "Inventory health platform backend"
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::OpenApi as _;

    #[test]
    fn document_contains_the_api_surface() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/v1/auth/signup",
            "/v1/auth/login",
            "/v1/session",
            "/v1/billing/checkout",
            "/v1/erp/sync",
            "/v1/dashboard/alerts",
            "/v1/users/invite-verify",
        ] {
            assert!(
                paths.iter().any(|path| path.as_str() == expected),
                "missing path {expected}"
            );
        }
    }
}
