//! Table names and query descriptions understood by every backend.

use std::fmt;

use serde_json::Value;

/// Backend tables used by the back-office.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    SubscriptionRequests,
    Customers,
    Invoices,
    AdminUsers,
    /// The identity provider's user directory. Read-only, used for embeds.
    Users,
}

impl Table {
    /// The table's name in the backend.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SubscriptionRequests => "subscription_requests",
            Self::Customers => "customers",
            Self::Invoices => "invoices",
            Self::AdminUsers => "admin_users",
            Self::Users => "users",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Equality filter on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: &'static str,
    pub value: Value,
}

impl Filter {
    /// Match records whose `column` equals `value`.
    #[must_use]
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            column,
            value: value.into(),
        }
    }

    /// Test a JSON record against this filter.
    #[must_use]
    pub fn matches(&self, record: &Value) -> bool {
        record.get(self.column) == Some(&self.value)
    }
}

/// Sort order on one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub ascending: bool,
}

impl Order {
    #[must_use]
    pub const fn asc(column: &'static str) -> Self {
        Self {
            column,
            ascending: true,
        }
    }

    #[must_use]
    pub const fn desc(column: &'static str) -> Self {
        Self {
            column,
            ascending: false,
        }
    }
}

/// A related record embedded into each selected row through a foreign key.
///
/// The embedded object is stored under the related table's name, e.g. an
/// invoice row gains a `customers` object with the listed columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Embed {
    pub table: Table,
    pub foreign_key: &'static str,
    pub columns: &'static [&'static str],
}

/// A select query: filters, optional order, optional limit, optional embed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
    pub embed: Option<Embed>,
}

impl Query {
    /// A query matching every record, unordered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub const fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn embed(mut self, embed: Embed) -> Self {
        self.embed = Some(embed);
        self
    }
}
