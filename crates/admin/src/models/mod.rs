//! Domain models for the back-office.
//!
//! Records mirror the backend tables one-to-one and travel as snake_case
//! JSON. Each record type implements [`Record`](crate::backend::Record) so it
//! can be read and written through the typed table facade.

pub mod admin_user;
pub mod customer;
pub mod invoice;
pub mod request;
pub mod session;

pub use admin_user::{AdminUser, NewAdminUser, StaffAccount};
pub use customer::{Customer, NewCustomer};
pub use invoice::{CustomerContact, Invoice};
pub use request::{RequestStatusPatch, SubscriptionRequest};
pub use session::{CurrentAdmin, Principal};
