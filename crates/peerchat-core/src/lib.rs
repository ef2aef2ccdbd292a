//! Conversation engine and port traits for peerchat.
//!
//! This crate owns the session logic: conversations, the simulated
//! counterpart, notifications, blocking, and roster filtering. It defines the
//! "ports" that infrastructure implements (`MessageLog`, `CountryLookup`,
//! `Translator`) and depends only on `peerchat-types` -- never on
//! `peerchat-infra` or any database/IO crate.

pub mod chat;
pub mod event;
pub mod filter;
pub mod notification;
pub mod roster;
pub mod translate;
