//! Billing desk back-office library.
//!
//! This crate provides the back-office functionality as a library,
//! allowing it to be tested and reused by the HTTP server and the CLI.
//!
//! # Layers
//!
//! - [`backend`] - record and identity capability (REST client, in-memory)
//! - [`models`] - table records and staff identity types
//! - [`store`] - sequenced projections of backend tables
//! - [`services`] - approval workflow, identity resolution, dashboard
//! - [`session`] - per-session context tying the above together
//! - [`routes`] - JSON API over a shared session

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;
pub mod state;
pub mod store;
