//! Apps Script execution API client.

use std::sync::Arc;

use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use gworks_auth::Connection;
use gworks_common::http::{decode_json, encode_path_segment};
use gworks_common::{Error, Result};

/// Apps Script execution API base URL.
const SCRIPT_API_BASE: &str = "https://script.googleapis.com/v1";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionRequest<'a> {
    function: &'a str,
    parameters: &'a [serde_json::Value],
    #[serde(skip_serializing_if = "is_false")]
    dev_mode: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Deserialize)]
struct ExecutionResponse {
    #[serde(default)]
    response: Option<OperationResponse>,
    #[serde(default)]
    error: Option<ExecutionError>,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ExecutionError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    script_stack_trace_elements: Vec<StackFrame>,
}

/// One frame of an Apps Script stack trace.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub line_number: Option<i64>,
}

impl StackFrame {
    fn render(&self) -> String {
        format!(
            "{}: {}",
            self.function.as_deref().unwrap_or("<anonymous>"),
            self.line_number.unwrap_or(0)
        )
    }
}

/// Apps Script facade, bound to one script project.
pub struct ScriptRunner {
    conn: Arc<Connection>,
    base_url: String,
    script_id: String,
    parameters: Vec<serde_json::Value>,
    dev_mode: bool,
}

impl ScriptRunner {
    /// Create a runner for a script project on a shared connection.
    pub fn new(conn: Arc<Connection>, script_id: impl Into<String>) -> Self {
        Self {
            conn,
            base_url: SCRIPT_API_BASE.to_string(),
            script_id: script_id.into(),
            parameters: Vec::new(),
            dev_mode: false,
        }
    }

    /// Create a runner pointed at a non-default endpoint (tests, staging).
    pub fn with_base_url(
        conn: Arc<Connection>,
        script_id: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::new(conn, script_id)
        }
    }

    /// Replace the parameters passed to the next run.
    pub fn set_parameters(&mut self, parameters: Vec<serde_json::Value>) {
        self.parameters = parameters;
    }

    /// Builder form of [`set_parameters`](Self::set_parameters).
    pub fn with_parameters(mut self, parameters: Vec<serde_json::Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Run against the project's saved HEAD instead of the deployed version.
    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    /// The script project this runner targets.
    pub fn script_id(&self) -> &str {
        &self.script_id
    }

    /// Execute a function of the script project.
    ///
    /// Returns the function's result as a JSON value (`null` for void
    /// functions). An in-band execution failure is surfaced as
    /// [`Error::Script`] carrying the script's own message and stack trace.
    pub async fn run(&self, function: &str) -> Result<serde_json::Value> {
        info!("Running script function {} on {}", function, self.script_id);

        let url = format!(
            "{}/scripts/{}:run",
            self.base_url,
            encode_path_segment(&self.script_id)
        );
        let token = self.conn.bearer_token().await?;

        let request = ExecutionRequest {
            function,
            parameters: &self.parameters,
            dev_mode: self.dev_mode,
        };

        let response = self
            .conn
            .http()
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to run script: {}", e)))?;

        let execution: ExecutionResponse = decode_json(response).await?;

        if let Some(error) = execution.error {
            return Err(script_error(function, error));
        }

        Ok(execution
            .response
            .and_then(|r| r.result)
            .unwrap_or(serde_json::Value::Null))
    }
}

/// Turn an in-band execution error into a typed one, logging the stack.
fn script_error(function: &str, error: ExecutionError) -> Error {
    let detail = error.details.into_iter().next();

    let mut message = detail
        .as_ref()
        .and_then(|d| d.error_message.clone())
        .or(error.message)
        .unwrap_or_else(|| "Apps Script execution failed".to_string());

    let frames: Vec<String> = detail
        .map(|d| {
            d.script_stack_trace_elements
                .iter()
                .map(StackFrame::render)
                .collect()
        })
        .unwrap_or_default();

    // There may not be a stack trace if the script never started executing.
    if !frames.is_empty() {
        warn!(
            "Script function {} failed: {} (stack: {})",
            function,
            message,
            frames.join(" <- ")
        );
        message.push_str(&format!(" [at {}]", frames.join(" <- ")));
    } else {
        warn!("Script function {} failed: {}", function, message);
    }

    Error::Script(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use gworks_auth::{ConnectionConfig, CredentialStore, OAuthClientConfig, Tokens};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn runner_for(server: &mockito::ServerGuard, script_id: &str) -> (ScriptRunner, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        store
            .save(&Tokens {
                access_token: "ya29.test".to_string(),
                refresh_token: Some("1//r".to_string()),
                token_type: "Bearer".to_string(),
                scope: None,
                expires_at: Utc::now() + Duration::hours(1),
                extra: HashMap::new(),
            })
            .unwrap();

        let conn = Connection::connect(
            ConnectionConfig::new("gworks-test"),
            OAuthClientConfig {
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
                auth_uri: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_uri: "https://oauth2.googleapis.com/token".to_string(),
                redirect_uris: vec![],
            },
            store,
        )
        .unwrap();

        (
            ScriptRunner::with_base_url(Arc::new(conn), script_id, server.url()),
            dir,
        )
    }

    #[tokio::test]
    async fn test_run_returns_the_function_result() {
        let mut server = mockito::Server::new_async().await;
        let route = server
            .mock("POST", "/scripts/proj1:run")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "function": "replaceData",
                "parameters": ["sheet1", 42],
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"done":true,"response":{"result":{"rows":7}}}"#)
            .expect(1)
            .create_async()
            .await;

        let (runner, _dir) = runner_for(&server, "proj1");
        let runner = runner.with_parameters(vec![
            serde_json::json!("sheet1"),
            serde_json::json!(42),
        ]);

        let result = runner.run("replaceData").await.unwrap();
        assert_eq!(result, serde_json::json!({"rows": 7}));

        route.assert_async().await;
    }

    #[tokio::test]
    async fn test_void_result_is_null() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/scripts/proj1:run")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"done":true,"response":{}}"#)
            .create_async()
            .await;

        let (runner, _dir) = runner_for(&server, "proj1");
        assert_eq!(runner.run("noop").await.unwrap(), serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_in_band_error_surfaces_message_and_stack() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/scripts/proj1:run")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"done":true,"error":{"code":3,"message":"ScriptError",
                    "details":[{"@type":"type.googleapis.com/google.apps.script.v1.ExecutionError",
                        "errorMessage":"Range not found",
                        "errorType":"ScriptError",
                        "scriptStackTraceElements":[
                            {"function":"readRange","lineNumber":12},
                            {"function":"replaceData","lineNumber":3}
                        ]}]}}"#,
            )
            .create_async()
            .await;

        let (runner, _dir) = runner_for(&server, "proj1");
        match runner.run("replaceData").await {
            Err(Error::Script(msg)) => {
                assert!(msg.contains("Range not found"));
                assert!(msg.contains("readRange: 12"));
            }
            other => panic!("expected Script error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_provider_http_error_propagates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/scripts/proj1:run")
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":403,"message":"Caller missing permission"}}"#)
            .create_async()
            .await;

        let (runner, _dir) = runner_for(&server, "proj1");
        match runner.run("replaceData").await {
            Err(Error::PermissionDenied(msg)) => assert_eq!(msg, "Caller missing permission"),
            other => panic!("expected PermissionDenied, got {:?}", other),
        }
    }
}
