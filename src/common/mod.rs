//! Common types and utilities shared across components

pub mod channels;
pub mod errors;
pub mod traits;
pub mod types;
