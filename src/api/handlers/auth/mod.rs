//! Authentication flows: signup, activation, login, password reset,
//! two-factor, and the session polling endpoint.
//!
//! Flow Overview:
//! 1) Signup creates a `pending_verification` user plus an activation token
//!    and an email outbox row in one transaction.
//! 2) Activation consumes the hashed token and flips the user to `active`.
//! 3) Login verifies the Argon2id password hash and mints the signed session
//!    cookie; accounts with TOTP enabled get a restricted `required_2fa`
//!    session until the OTP step completes.
//! 4) `GET /v1/session` re-mints claims from database state on every poll.

pub mod login;
pub mod principal;
pub mod rate_limit;
pub mod session;
pub mod signup;
pub mod state;
pub(crate) mod storage;
pub mod totp;
pub mod types;
pub(crate) mod utils;

pub use login::{login, password_reset_confirm, password_reset_request};
pub use principal::Principal;
pub use session::{logout, session};
pub use signup::{activate, resend_activation, signup};
pub use state::{AuthConfig, AuthState};
pub use totp::{two_factor_disable, two_factor_enable, two_factor_verify};
