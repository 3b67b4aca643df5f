//! Local tools offered to the remote model
//!
//! Each function call gets exactly one response. Failures are returned as
//! `{"error": ...}` so the model can tell them apart from `{"result": ...}`.

use serde_json::{Value, json};

use super::metrics::MetricsSource;
use super::state::SessionState;
use crate::live::{FunctionCall, FunctionResponse};
use crate::voice::Sensitivity;
use crate::{Error, Result};

/// Report host resource usage
pub const GET_SYSTEM_STATUS: &str = "getSystemStatus";

/// Empty the console log
pub const CLEAR_CONSOLE_LOGS: &str = "clearConsoleLogs";

/// Change the wake word sensitivity
pub const SET_CONFIGURATION: &str = "setConfiguration";

/// Function declarations sent in the session setup
#[must_use]
pub fn declarations() -> Vec<Value> {
    let levels: Vec<&str> = Sensitivity::ALL.iter().map(|s| s.as_str()).collect();

    vec![
        json!({
            "name": GET_SYSTEM_STATUS,
            "description": "Returns current CPU, memory and uptime of the host system.",
            "parameters": { "type": "OBJECT", "properties": {} }
        }),
        json!({
            "name": CLEAR_CONSOLE_LOGS,
            "description": "Clears every entry from the console log.",
            "parameters": { "type": "OBJECT", "properties": {} }
        }),
        json!({
            "name": SET_CONFIGURATION,
            "description": "Adjusts assistant settings.",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "sensitivity": {
                        "type": "STRING",
                        "enum": levels,
                        "description": "How strictly the wake word must be spoken."
                    }
                },
                "required": ["sensitivity"]
            }
        }),
    ]
}

/// Executes function calls against the session state
pub struct ToolDispatcher {
    metrics: Box<dyn MetricsSource>,
}

impl ToolDispatcher {
    /// Create a dispatcher reading metrics from `metrics`
    #[must_use]
    pub fn new(metrics: Box<dyn MetricsSource>) -> Self {
        Self { metrics }
    }

    /// Run one call and build its correlated response
    pub fn dispatch(&mut self, call: &FunctionCall, state: &mut SessionState) -> FunctionResponse {
        tracing::info!(tool = %call.name, id = ?call.id, "tool call");

        let response = match self.execute(call, state) {
            Ok(result) => json!({ "result": result }),
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool call failed");
                json!({ "error": e.to_string() })
            }
        };

        FunctionResponse {
            id: call.id.clone(),
            name: call.name.clone(),
            response,
        }
    }

    fn execute(&mut self, call: &FunctionCall, state: &mut SessionState) -> Result<String> {
        match call.name.as_str() {
            GET_SYSTEM_STATUS => Ok(self.metrics.sample().summary()),
            CLEAR_CONSOLE_LOGS => {
                state.clear_log();
                Ok("Console log cleared.".to_string())
            }
            SET_CONFIGURATION => {
                let level = sensitivity_arg(call)?;
                state.set_sensitivity(level);
                Ok(format!("Wake sensitivity updated to {level}."))
            }
            other => Err(Error::UnknownTool(other.to_string())),
        }
    }
}

/// Extract and validate the `sensitivity` argument
fn sensitivity_arg(call: &FunctionCall) -> Result<Sensitivity> {
    match call.args.get("sensitivity") {
        Some(Value::String(level)) => level.parse(),
        Some(other) => Err(Error::InvalidArgument(format!(
            "sensitivity must be a string, got {other}"
        ))),
        None => Err(Error::InvalidArgument(
            "sensitivity is required".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::session::metrics::SystemStats;

    struct FixedMetrics;

    impl MetricsSource for FixedMetrics {
        fn sample(&mut self) -> SystemStats {
            SystemStats {
                cpu_percent: 7.0,
                memory_percent: 33.0,
                uptime: Duration::from_secs(60),
            }
        }
    }

    fn call(name: &str, args: Value) -> FunctionCall {
        FunctionCall {
            id: Some("call-9".to_string()),
            name: name.to_string(),
            args: args.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_declarations() {
        let decls = declarations();
        assert_eq!(decls.len(), 3);
        assert_eq!(decls[2]["parameters"]["required"][0], "sensitivity");
        assert_eq!(
            decls[2]["parameters"]["properties"]["sensitivity"]["enum"],
            json!(["Low", "Medium", "High"])
        );
    }

    #[test]
    fn test_status_report() {
        let mut dispatcher = ToolDispatcher::new(Box::new(FixedMetrics));
        let mut state = SessionState::new(50);

        let response = dispatcher.dispatch(&call(GET_SYSTEM_STATUS, json!({})), &mut state);
        assert_eq!(response.id.as_deref(), Some("call-9"));
        assert!(
            response.response["result"]
                .as_str()
                .unwrap()
                .starts_with("CPU is at 7 percent, memory is at 33 percent")
        );
    }

    #[test]
    fn test_clear_console() {
        let mut dispatcher = ToolDispatcher::new(Box::new(FixedMetrics));
        let mut state = SessionState::new(50);
        state.log_system("one");
        state.log_system("two");

        let response = dispatcher.dispatch(&call(CLEAR_CONSOLE_LOGS, json!({})), &mut state);
        assert_eq!(response.response["result"], "Console log cleared.");
        assert!(state.log().is_empty());
    }

    #[test]
    fn test_set_configuration() {
        let mut dispatcher = ToolDispatcher::new(Box::new(FixedMetrics));
        let mut state = SessionState::new(50);

        let response = dispatcher.dispatch(
            &call(SET_CONFIGURATION, json!({ "sensitivity": "High" })),
            &mut state,
        );
        assert_eq!(response.response["result"], "Wake sensitivity updated to High.");
        assert_eq!(state.sensitivity(), Sensitivity::High);
    }

    #[test]
    fn test_invalid_arguments_are_errors() {
        let mut dispatcher = ToolDispatcher::new(Box::new(FixedMetrics));
        let mut state = SessionState::new(50);

        for args in [json!({}), json!({ "sensitivity": "Max" }), json!({ "sensitivity": 3 })] {
            let response = dispatcher.dispatch(&call(SET_CONFIGURATION, args), &mut state);
            assert!(response.response.get("result").is_none());
            assert!(response.response["error"].as_str().unwrap().starts_with("invalid argument"));
        }
        assert_eq!(state.sensitivity(), Sensitivity::Medium);
    }

    #[test]
    fn test_unknown_tool() {
        let mut dispatcher = ToolDispatcher::new(Box::new(FixedMetrics));
        let mut state = SessionState::new(50);

        let response = dispatcher.dispatch(&call("launchRockets", json!({})), &mut state);
        assert_eq!(response.name, "launchRockets");
        assert_eq!(response.response["error"], "unknown tool: launchRockets");
    }
}
