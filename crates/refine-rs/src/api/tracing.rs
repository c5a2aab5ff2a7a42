//! Correlation IDs and cost tracking for refine sessions.
//!
//! Each [`Session`](crate::pipeline::session::Session) gets a `trace_id`;
//! each stage within it gets a span id derived from it. Token usage reported
//! by the service is priced per model and accumulated in a [`CostTracker`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::UsageInfo;
use crate::pipeline::session::Stage;

/// Generate a unique trace ID for a session.
pub fn generate_trace_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // Counter disambiguates calls within the same nanosecond.
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("tr-{ts:x}-{count:04x}")
}

/// Span ID for one stage of a session.
pub fn stage_span_id(trace_id: &str, stage: Stage) -> String {
    format!("{trace_id}:{}", stage.to_string().to_lowercase())
}

/// Per-model pricing for cost estimation (USD per 1M tokens).
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub fn estimate_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (prompt_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (completion_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self {
            input_per_million: 3.0,
            output_per_million: 15.0,
        }
    }
}

/// Approximate pricing for a model id such as `"openai/gpt-4o"`.
///
/// Only the segment after the last `/` is inspected, so org prefixes don't
/// cause false matches. Figures are rough; they flag runaway spend, they are
/// not billing.
pub fn pricing_for_model(model: &str) -> ModelPricing {
    let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();

    let (input, output) = if name.contains("gpt-4o-mini") || name.contains("4o-mini") {
        (0.15, 0.60)
    } else if name.contains("gpt-4o") {
        (2.50, 10.0)
    } else if name.contains("gpt-4-turbo") {
        (10.0, 30.0)
    } else if name.contains("gpt-4") {
        (30.0, 60.0)
    } else if name.contains("gpt-3.5") {
        (0.50, 1.50)
    } else if name.contains("opus") {
        (15.0, 75.0)
    } else if name.contains("sonnet") {
        (3.0, 15.0)
    } else if name.contains("haiku") {
        (0.25, 1.25)
    } else if name.contains("gemini") && name.contains("flash") {
        (0.075, 0.30)
    } else if name.contains("gemini") {
        (1.25, 5.0)
    } else {
        return ModelPricing::default();
    };

    ModelPricing {
        input_per_million: input,
        output_per_million: output,
    }
}

/// Cumulative token usage and cost for a session.
#[derive(Debug, Clone, Default)]
pub struct CostTracker {
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub estimated_cost_usd: f64,
    /// Number of completions that reported usage.
    pub calls: u32,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, prompt_tokens: u32, completion_tokens: u32, pricing: &ModelPricing) {
        self.total_prompt_tokens += prompt_tokens as u64;
        self.total_completion_tokens += completion_tokens as u64;
        self.estimated_cost_usd += pricing.estimate_cost(prompt_tokens, completion_tokens);
        self.calls += 1;
    }

    /// Record provider-reported usage for a completion on `model`.
    pub fn record_usage(&mut self, usage: &UsageInfo, model: &str) {
        self.record(
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            &pricing_for_model(model),
        );
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_prompt_tokens + self.total_completion_tokens
    }

    pub fn summary(&self) -> String {
        format!(
            "tokens: {} prompt + {} completion = {} total, est. cost: ${:.4}",
            self.total_prompt_tokens,
            self.total_completion_tokens,
            self.total_tokens(),
            self.estimated_cost_usd,
        )
    }
}
