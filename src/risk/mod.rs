//! Risk guard: session limits consulted before every decision is finalized

pub mod guard;

pub use guard::{check_limits, RiskCheck, RiskGuard, RiskLimits, RiskState, RiskViolation};
