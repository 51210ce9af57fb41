//! hardness-core — Difficulty estimation engine and answer matching.
//!
//! This crate runs repeated independent solve attempts against a problem,
//! compares each final answer with the reference, and turns the accuracy
//! into a difficulty verdict.

pub mod aggregate;
pub mod answer;
pub mod engine;
pub mod error;
pub mod invoker;
pub mod model;
pub mod parser;
pub mod report;
pub mod scheduler;
pub mod traits;

#[cfg(test)]
mod testing;
