//! Core data models for the resource store.
//!
//! Rows map to SQLite tables via `sqlx::FromRow` and serialize as JSON via
//! `serde`. Notification types are ephemeral and never persisted.

pub mod bucket;
pub mod resource;
pub mod webhook;
