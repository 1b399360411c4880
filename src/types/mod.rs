//! Runtime data types
//!
//! Values and relations are what flows between plan steps at execution time:
//! a federated fetch produces a [`Relation`], local steps consume and produce them.

pub mod relation;
pub mod value;

pub use relation::Relation;
pub use value::Value;
