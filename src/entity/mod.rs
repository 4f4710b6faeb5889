//! Database entity models for medianode-session.
//!
//! These Sea-ORM entities describe the two tables this crate touches:
//! application profiles and the read-only plan catalogue.

/// Application-owned profile extending an authenticated identity.
pub mod profile;

/// Subscription plans and their numeric limits.
pub mod subscription_plan;
