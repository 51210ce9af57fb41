//! The Solver Client contract.
//!
//! Implemented by `hardness-providers`. The engine only relies on
//! "request in, text out, or a classified error".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SolverError;

/// Trait for reasoning services that attempt to solve a problem.
#[async_trait]
pub trait Solver: Send + Sync {
    /// Human-readable solver name (e.g. "doubao").
    fn name(&self) -> &str;

    /// Make one solve call. Must not retry internally.
    async fn solve(&self, request: &SolveRequest) -> Result<String, SolverError>;
}

/// Request for a single solve call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveRequest {
    /// The problem statement.
    pub statement: String,
    /// 1-based index of the attempt making the call.
    pub attempt: u32,
}

/// Default system prompt for solver adapters.
///
/// Asks for the bracketed answer marker that the extractor looks for first.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful mathematics problem solver. Read the problem, reason step by step, and finish with the final answer marked as 【答案：...】.";
