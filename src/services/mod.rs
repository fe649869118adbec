// Services module - Business logic

pub mod candidates;
pub mod catalog;
pub mod classification;
pub mod commerce;
pub mod delivery;
pub mod entitlement;
pub mod guard;
pub mod locator;
pub mod range;
pub mod reconcile;
pub mod signature;
pub mod token;
