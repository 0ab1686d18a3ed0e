//! Deterministic unit execution

mod runner;

pub use runner::{RunContext, UnitRunner};
