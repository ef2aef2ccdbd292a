//! Shared domain types for peerchat.
//!
//! This crate contains the domain types used across the peerchat workspace:
//! Persona, Message, Notification, roster filters, entitlements, session
//! config and events, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod entitlement;
pub mod error;
pub mod event;
pub mod filter;
pub mod message;
pub mod notification;
pub mod persona;
