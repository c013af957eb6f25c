#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AppServerTurnError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub will_retry: bool,
}

/// Notification stream from the agent app-server. Payloads whose shape the
/// server does not guarantee stay raw `serde_json::Value` and go through
/// `normalize` before touching state.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum AppServerEvent {
    #[serde(rename = "thread.started")]
    ThreadStarted {
        #[serde(default)]
        thread: serde_json::Value,
    },
    #[serde(rename = "turn.started")]
    TurnStarted {
        thread_id: String,
        #[serde(default)]
        turn_id: String,
    },
    #[serde(rename = "turn.completed")]
    TurnCompleted {
        thread_id: String,
        #[serde(default)]
        turn_id: String,
    },
    #[serde(rename = "turn.plan_updated")]
    TurnPlanUpdated {
        thread_id: String,
        #[serde(default)]
        turn_id: String,
        #[serde(default)]
        explanation: serde_json::Value,
        #[serde(default)]
        plan: serde_json::Value,
    },
    #[serde(rename = "thread.token_usage_updated")]
    ThreadTokenUsageUpdated {
        thread_id: String,
        #[serde(default)]
        token_usage: serde_json::Value,
    },
    #[serde(rename = "account.rate_limits_updated")]
    AccountRateLimitsUpdated {
        #[serde(default)]
        rate_limits: serde_json::Value,
    },
    #[serde(rename = "turn.failed")]
    TurnFailed {
        thread_id: String,
        #[serde(default)]
        turn_id: String,
        #[serde(default)]
        error: AppServerTurnError,
    },
    #[serde(rename = "thread.compacted")]
    ContextCompacted {
        thread_id: String,
        #[serde(default)]
        turn_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_accepts_minimal_thread_started_payloads() {
        let payload = r#"{"type":"thread.started","thread":{"id":"thread_1"}}"#;
        let parsed = serde_json::from_str::<AppServerEvent>(payload)
            .expect("thread.started should deserialize");
        assert!(matches!(parsed, AppServerEvent::ThreadStarted { .. }));
    }

    #[test]
    fn parsing_defaults_missing_turn_ids() {
        let payload = r#"{"type":"turn.started","thread_id":"thread_1"}"#;
        let parsed = serde_json::from_str::<AppServerEvent>(payload)
            .expect("turn.started without turn_id should deserialize");
        assert!(matches!(
            parsed,
            AppServerEvent::TurnStarted { thread_id, turn_id }
                if thread_id == "thread_1" && turn_id.is_empty()
        ));
    }

    #[test]
    fn parsing_defaults_will_retry_to_false() {
        let payload =
            r#"{"type":"turn.failed","thread_id":"thread_1","turn_id":"turn_1","error":{"message":"boom"}}"#;
        let parsed =
            serde_json::from_str::<AppServerEvent>(payload).expect("turn.failed should deserialize");
        assert!(matches!(
            parsed,
            AppServerEvent::TurnFailed { error, .. }
                if error.message == "boom" && !error.will_retry
        ));
    }

    #[test]
    fn parsing_tolerates_empty_turn_errors() {
        let payload = r#"{"type":"turn.failed","thread_id":"thread_1"}"#;
        let parsed = serde_json::from_str::<AppServerEvent>(payload)
            .expect("turn.failed without an error body should deserialize");
        assert!(matches!(
            parsed,
            AppServerEvent::TurnFailed { error, .. }
                if error.message.is_empty() && !error.will_retry
        ));
    }

    #[test]
    fn parsing_keeps_plan_payload_raw() {
        let payload = r#"{"type":"turn.plan_updated","thread_id":"thread_1","turn_id":"turn_1","plan":[{"step":"read code","status":"in_progress"}]}"#;
        let parsed = serde_json::from_str::<AppServerEvent>(payload)
            .expect("turn.plan_updated should deserialize");
        let AppServerEvent::TurnPlanUpdated {
            explanation, plan, ..
        } = parsed
        else {
            panic!("expected turn.plan_updated");
        };
        assert!(explanation.is_null());
        assert_eq!(plan.as_array().map(Vec::len), Some(1));
    }
}
