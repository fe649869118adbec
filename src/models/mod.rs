// Models module - Database entity representations

pub mod entitlement;
pub mod order;
pub mod product;

pub use entitlement::{AuditAction, AuditEntry, Entitlement, EntitlementPage, NewAuditEntry};
pub use order::{order_reason, LineItem, Order, OrderEvent};
pub use product::Product;
