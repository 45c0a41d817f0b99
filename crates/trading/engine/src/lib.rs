//! Decision side of the trade pipeline
//!
//! Key pieces:
//! - `advisory`: pluggable recommendation source with a flat fallback
//! - `gemini`: Gemini `generateContent` advisor
//! - `decision`: budget/price sizing, minimum-quantity gate, dry-run gate
//! - `pipeline`: every-K-trades decision loop fed by the trade router
//!
//! Each decision cycle stands alone: no positions are tracked and an order
//! that fails is never resubmitted.

#![deny(clippy::all)]

pub mod advisory;
pub mod decision;
pub mod gemini;
pub mod pipeline;

// Re-exports
pub use advisory::{
    Action, Advisor, AdvisoryError, FixedAdvisor, MarketState, Recommendation, consult,
};
pub use decision::{Decision, DecisionEngine, ExecutionOutcome, NoOpReason, OrderIntent};
pub use gemini::{GeminiAdvisor, GeminiConfig};
pub use pipeline::{DecisionPipeline, PipelineConfig, PipelineSummary};
