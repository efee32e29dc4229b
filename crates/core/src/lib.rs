//! Billing Desk Core - Shared types library.
//!
//! This crate provides common types used across all Billing Desk components:
//! - `admin` - Back-office library and JSON API binary
//! - `cli` - Command-line tools for staff
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no backend access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, amounts, emails, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
