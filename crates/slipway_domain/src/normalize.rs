use crate::TurnId;
use serde_json::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStepStatus {
    Pending,
    InProgress,
    Completed,
}

impl PlanStepStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "in_progress" | "inProgress" => Self::InProgress,
            "completed" => Self::Completed,
            _ => Self::Pending,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlanStep {
    pub step: String,
    pub status: PlanStepStatus,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TurnPlan {
    pub turn_id: TurnId,
    pub explanation: Option<String>,
    pub steps: Vec<PlanStep>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TokenCounts {
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_output_tokens: u64,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ThreadTokenUsage {
    pub last: TokenCounts,
    pub total: TokenCounts,
    pub model_context_window: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RateLimitWindow {
    pub used_percent: f64,
    pub window_minutes: Option<u64>,
    pub resets_in_seconds: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RateLimitSnapshot {
    pub primary: Option<RateLimitWindow>,
    pub secondary: Option<RateLimitWindow>,
}

/// String fields only; anything else reads as empty.
pub fn as_string(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default()
}

/// The thread payload's own activity timestamp in unix ms, 0 when absent
/// or non-positive.
pub fn thread_timestamp(thread: &Value) -> u64 {
    for key in ["timestamp", "updated_at", "updatedAt"] {
        let Some(raw) = thread.get(key) else {
            continue;
        };
        if let Some(ms) = raw.as_u64()
            && ms > 0
        {
            return ms;
        }
        if let Some(ms) = raw.as_f64()
            && ms > 0.0
        {
            return ms as u64;
        }
    }
    0
}

fn field<'a>(value: &'a Value, snake: &str, camel: &str) -> Option<&'a Value> {
    value.get(snake).or_else(|| value.get(camel))
}

fn read_count(value: Option<&Value>) -> u64 {
    let Some(value) = value else {
        return 0;
    };
    if let Some(count) = value.as_u64() {
        return count;
    }
    if let Some(count) = value.as_f64()
        && count > 0.0
    {
        return count as u64;
    }
    0
}

pub fn normalize_plan_update(turn_id: TurnId, explanation: &Value, plan: &Value) -> TurnPlan {
    let explanation = explanation
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned);

    let steps = plan
        .as_array()
        .map(|items| items.iter().filter_map(normalize_plan_step).collect())
        .unwrap_or_default();

    TurnPlan {
        turn_id,
        explanation,
        steps,
    }
}

fn normalize_plan_step(value: &Value) -> Option<PlanStep> {
    let mut step = as_string(value.get("step"));
    if step.is_empty() {
        step = as_string(value.get("content"));
    }
    if step.trim().is_empty() {
        return None;
    }
    let status = PlanStepStatus::parse(&as_string(value.get("status")));
    Some(PlanStep { step, status })
}

pub fn normalize_token_usage(value: &Value) -> ThreadTokenUsage {
    ThreadTokenUsage {
        last: normalize_token_counts(value.get("last")),
        total: normalize_token_counts(value.get("total")),
        model_context_window: field(value, "model_context_window", "modelContextWindow")
            .and_then(Value::as_u64),
    }
}

fn normalize_token_counts(value: Option<&Value>) -> TokenCounts {
    let Some(value) = value else {
        return TokenCounts::default();
    };

    let input_tokens = read_count(field(value, "input_tokens", "inputTokens"));
    let cached_input_tokens = read_count(field(value, "cached_input_tokens", "cachedInputTokens"));
    let output_tokens = read_count(field(value, "output_tokens", "outputTokens"));
    let reasoning_output_tokens = read_count(field(
        value,
        "reasoning_output_tokens",
        "reasoningOutputTokens",
    ));
    let mut total_tokens = read_count(field(value, "total_tokens", "totalTokens"));
    if total_tokens == 0 {
        total_tokens = input_tokens
            .saturating_add(output_tokens)
            .saturating_add(reasoning_output_tokens);
    }

    TokenCounts {
        total_tokens,
        input_tokens,
        cached_input_tokens,
        output_tokens,
        reasoning_output_tokens,
    }
}

pub fn normalize_rate_limits(value: &Value) -> RateLimitSnapshot {
    RateLimitSnapshot {
        primary: normalize_rate_limit_window(value.get("primary")),
        secondary: normalize_rate_limit_window(value.get("secondary")),
    }
}

fn normalize_rate_limit_window(value: Option<&Value>) -> Option<RateLimitWindow> {
    let value = value?;
    if !value.is_object() {
        return None;
    }
    Some(RateLimitWindow {
        used_percent: field(value, "used_percent", "usedPercent")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            .max(0.0),
        window_minutes: field(value, "window_minutes", "windowMinutes").and_then(Value::as_u64),
        resets_in_seconds: field(value, "resets_in_seconds", "resetsInSeconds")
            .and_then(Value::as_u64),
    })
}
