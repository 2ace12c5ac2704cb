//! Time budget tracking for one decision

pub mod tracker;

pub use tracker::{BudgetAllocation, Component, DecisionBudget, Reallocation, TimeBudgetTracker};
