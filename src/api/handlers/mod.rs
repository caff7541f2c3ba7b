//! API handlers for Nexus.
//!
//! Every handler follows the same shape: resolve the session, check role or
//! plan, validate the payload, perform one data-access or outbound call, and
//! map the outcome onto the error taxonomy in [`crate::api::error`].

pub mod auth;
pub mod billing;
pub mod dashboard;
pub mod erp;
pub mod health;
pub mod pages;
pub mod users;
