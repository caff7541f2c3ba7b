//! # Nexus OS (Inventory Health Platform)
//!
//! `nexus` is the backend for a subscription SaaS that connects a merchant's
//! ERP ("Bling") account, periodically syncs product/inventory/order data,
//! and surfaces inventory-health alerts (excess stock, rupture risk, dead
//! stock, pricing opportunities) on a dashboard.
//!
//! ## Authorization Gate
//!
//! Every page request passes through a single gate middleware that decodes
//! the signed session cookie and applies a fixed decision table: feature
//! flags, two-factor gating, auth-page bounce, and role checks. The gate is
//! pure request routing; it performs no I/O beyond verifying the cookie.
//!
//! ## Sessions & Roles
//!
//! Sessions are HS256-signed tokens carrying the user id, role
//! (`GUEST < USER < ADMIN < SUPER_ADMIN`), a two-factor completion flag, and
//! business-process hints (onboarding, ERP sync status, plan tier). Only the
//! authentication and billing/sync paths write claims; everything else reads.
//!
//! ## Background Work
//!
//! Outbound email rides a transactional outbox table drained by a background
//! worker. ERP synchronization is dispatched the same way: handlers enqueue a
//! sync job and return immediately; a worker claims jobs, flips the user's
//! sync status, and retries failures with backoff. Clients poll
//! `GET /v1/session` / `GET /v1/erp/status` until a terminal state.

pub mod api;
pub mod billing;
pub mod cli;
pub mod erp;
pub mod gate;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
