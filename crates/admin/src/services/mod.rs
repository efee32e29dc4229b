//! Business logic services for the back-office.
//!
//! # Services
//!
//! - `approval` - Subscription request approval (request to customer)
//! - `dashboard` - Headline figures from the loaded projections
//! - `identity` - Staff sign-in and role resolution

pub mod approval;
pub mod dashboard;
pub mod identity;

pub use approval::{Approval, ApprovalError, ApprovalWorkflow};
pub use dashboard::{DashboardSummary, UPCOMING_DUES_LIMIT};
pub use identity::{IdentityError, IdentityResolver};
