//! Predicate model: criteria and filters with in-memory and SQL forms

pub mod criteria;
pub mod filter;

pub use criteria::*;
pub use filter::*;
