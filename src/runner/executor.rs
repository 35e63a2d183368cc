use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::context::substitute_vars;
use super::merge::{changed_entries, merge};
use super::script::{run_test_script, SandboxInput};
use super::state::TestOutcomes;
use crate::parser::types::{KeyValue, Request, ResolvedRequest};

/// Response as seen by the executor
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub elapsed_ms: u64,
    pub started_at: DateTime<Utc>,
}

/// Everything the aggregator needs to record one request execution
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub request: Request,
    pub resolved: ResolvedRequest,
    pub response: ExecutedResponse,
    pub tests: TestOutcomes,
}

/// Messages an executor sends while running one pass over the collection
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RequestStarted { id: String, name: String },
    RequestCompleted(Box<RequestOutcome>),
    /// Sent once, after the last request. `aborted` when the pass stopped
    /// early; `globals` as the pass's test scripts left them.
    PassFinished {
        aborted: bool,
        globals: Vec<KeyValue>,
    },
}

/// Per-iteration inputs handed to the executor next to the variables
#[derive(Debug, Clone, Default)]
pub struct IterationScope {
    pub iteration: usize,
    pub globals: Vec<KeyValue>,
    pub data: Vec<KeyValue>,
    pub stop_on_error: bool,
}

/// Runs one pass over an ordered request sequence.
///
/// Implementations execute the requests one after the other, report each
/// through `events` and finish with `PassFinished`. Failures of individual
/// requests are reported as failing outcomes, not as errors.
#[async_trait]
pub trait CollectionExecutor: Send + Sync {
    async fn execute(
        &self,
        requests: &[Request],
        variables: &[KeyValue],
        scope: &IterationScope,
        events: mpsc::UnboundedSender<ExecutionEvent>,
    ) -> Result<()>;
}

/// Executor that sends requests over HTTP and runs their test scripts
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(timeout_ms: Option<u64>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder.build().context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    async fn send(&self, resolved: &ResolvedRequest) -> Result<(u16, BTreeMap<String, String>, String)> {
        let method = reqwest::Method::from_bytes(resolved.method.as_bytes())
            .map_err(|_| anyhow::anyhow!("Invalid HTTP method: {}", resolved.method))?;

        let mut req = self.client.request(method, &resolved.url);
        for (name, value) in &resolved.headers {
            req = req.header(name, value);
        }

        req = match resolved.data_mode.as_deref() {
            Some("urlencoded") => req.form(&data_pairs(&resolved.data)),
            Some("params") => {
                let form = data_pairs(&resolved.data)
                    .into_iter()
                    .fold(reqwest::multipart::Form::new(), |form, (k, v)| form.text(k, v));
                req.multipart(form)
            }
            _ => match resolved.data.as_str() {
                Some(body) if !body.is_empty() => req.body(body.to_string()),
                _ => req,
            },
        };

        let res = req.send().await?;
        let status = res.status().as_u16();
        let headers = res
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = res.text().await?;

        Ok((status, headers, body))
    }
}

#[async_trait]
impl CollectionExecutor for HttpExecutor {
    async fn execute(
        &self,
        requests: &[Request],
        variables: &[KeyValue],
        scope: &IterationScope,
        events: mpsc::UnboundedSender<ExecutionEvent>,
    ) -> Result<()> {
        let mut variables = variables.to_vec();
        let mut globals = scope.globals.clone();
        let mut aborted = false;

        for request in requests {
            let _ = events.send(ExecutionEvent::RequestStarted {
                id: request.id.clone(),
                name: request.name.clone(),
            });

            let resolved = resolve_request(request, &variables);
            let started_at = Utc::now();
            let timer = Instant::now();
            let sent = self.send(&resolved).await;
            let elapsed_ms = timer.elapsed().as_millis() as u64;

            let (response, tests) = match sent {
                Ok((status, headers, body)) => {
                    let response = ExecutedResponse {
                        status,
                        headers,
                        body,
                        elapsed_ms,
                        started_at,
                    };
                    let tests = match request.tests.as_deref() {
                        Some(script) if !script.trim().is_empty() => {
                            let outcome = run_test_script(
                                script,
                                &SandboxInput {
                                    response_body: &response.body,
                                    response_code: response.status,
                                    response_time: response.elapsed_ms,
                                    response_headers: &response.headers,
                                    iteration: scope.iteration,
                                    environment: &variables,
                                    globals: &globals,
                                    data: &scope.data,
                                },
                            );
                            // Globals set by the script are visible to later requests
                            let global_changes = changed_entries(&globals, &outcome.globals);
                            variables = merge(&outcome.environment, &global_changes);
                            globals = outcome.globals;
                            outcome.tests
                        }
                        _ => TestOutcomes::new(),
                    };
                    (response, tests)
                }
                Err(e) => {
                    log::debug!("Request {} failed: {:#}", request.id, e);
                    let response = ExecutedResponse {
                        status: 0,
                        headers: BTreeMap::new(),
                        body: e.to_string(),
                        elapsed_ms,
                        started_at,
                    };
                    let tests = TestOutcomes::from([(format!("Request error: {}", e), false)]);
                    (response, tests)
                }
            };

            let failed = tests.values().any(|&passed| !passed);

            let _ = events.send(ExecutionEvent::RequestCompleted(Box::new(RequestOutcome {
                request: request.clone(),
                resolved,
                response,
                tests,
            })));

            if failed && scope.stop_on_error {
                aborted = true;
                break;
            }
        }

        let _ = events.send(ExecutionEvent::PassFinished { aborted, globals });
        Ok(())
    }
}

/// Substitute variables into url, headers and body
pub fn resolve_request(request: &Request, vars: &[KeyValue]) -> ResolvedRequest {
    let headers = request
        .header_pairs()
        .into_iter()
        .map(|(name, value)| (name, substitute_vars(&value, vars)))
        .collect();

    let data = match request.data_mode.as_deref() {
        Some("urlencoded") | Some("params") => Value::Array(
            request
                .form_pairs()
                .into_iter()
                .map(|(key, value)| json!({ "key": key, "value": substitute_vars(&value, vars) }))
                .collect(),
        ),
        _ => Value::String(substitute_vars(
            request.raw_mode_data.as_deref().unwrap_or_default(),
            vars,
        )),
    };

    ResolvedRequest {
        url: substitute_vars(&request.url, vars),
        method: request.method.to_uppercase(),
        headers,
        data,
        data_mode: request.data_mode.clone(),
    }
}

fn data_pairs(data: &Value) -> Vec<(String, String)> {
    data.as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let key = entry.get("key")?.as_str()?.to_string();
                    let value = entry.get("value")?.as_str()?.to_string();
                    Some((key, value))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Local server answering 200 to everything and recording request paths
    async fn serve(paths: Arc<Mutex<Vec<String>>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]).to_string();
                if let Some(path) = head.split_whitespace().nth(1) {
                    paths.lock().unwrap().push(path.to_string());
                }
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                    .await;
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_resolve_raw_request() {
        let mut request = Request::new("r1", "Create", "{{host}}/users/{{id}}");
        request.method = "post".to_string();
        request.headers = Value::String("Authorization: Bearer {{token}}\n".to_string());
        request.data_mode = Some("raw".to_string());
        request.raw_mode_data = Some(r#"{"id": "{{id}}"}"#.to_string());

        let vars = vec![
            KeyValue::new("host", "http://api"),
            KeyValue::new("id", "7"),
            KeyValue::new("token", "t0k"),
        ];
        let resolved = resolve_request(&request, &vars);

        assert_eq!(resolved.url, "http://api/users/7");
        assert_eq!(resolved.method, "POST");
        assert_eq!(resolved.headers["Authorization"], "Bearer t0k");
        assert_eq!(resolved.data, Value::String(r#"{"id": "7"}"#.to_string()));
    }

    #[test]
    fn test_resolve_form_request() {
        let mut request = Request::new("r1", "Login", "http://api/login");
        request.data_mode = Some("urlencoded".to_string());
        request.data = Some(json!([
            { "key": "user", "value": "{{user}}" },
            { "key": "skip", "value": "x", "enabled": false }
        ]));

        let resolved = resolve_request(&request, &[KeyValue::new("user", "alice")]);

        assert_eq!(resolved.data, json!([{ "key": "user", "value": "alice" }]));
        assert_eq!(
            data_pairs(&resolved.data),
            vec![("user".to_string(), "alice".to_string())]
        );
    }

    #[tokio::test]
    async fn test_transport_error_becomes_failing_outcome() {
        let executor = HttpExecutor::new(Some(500)).unwrap();
        let request = Request::new("r1", "Nowhere", "http://127.0.0.1:1/unreachable");
        let (tx, mut rx) = mpsc::unbounded_channel();

        executor
            .execute(&[request], &[], &IterationScope::default(), tx)
            .await
            .unwrap();

        let mut completed = None;
        let mut finished = false;
        while let Some(event) = rx.recv().await {
            match event {
                ExecutionEvent::RequestCompleted(outcome) => completed = Some(outcome),
                ExecutionEvent::PassFinished { aborted, .. } => {
                    assert!(!aborted);
                    finished = true;
                }
                ExecutionEvent::RequestStarted { .. } => {}
            }
        }

        let outcome = completed.expect("request outcome");
        assert!(finished);
        assert_eq!(outcome.response.status, 0);
        assert!(outcome.tests.values().all(|passed| !passed));
        assert_eq!(outcome.tests.len(), 1);
    }

    #[tokio::test]
    async fn test_script_globals_reach_later_requests() {
        let paths = Arc::new(Mutex::new(Vec::new()));
        let host = serve(paths.clone()).await;

        let mut first = Request::new("r1", "Login", "{{host}}/a");
        first.tests = Some(
            r#"
            postman.setGlobalVariable("token", "abc");
            postman.setEnvironmentVariable("envtok", "xyz");
            "#
            .to_string(),
        );
        let second = Request::new("r2", "Profile", "{{host}}/{{token}}/{{envtok}}");

        let globals = vec![KeyValue::new("token", "old")];
        let variables = vec![KeyValue::new("host", host), KeyValue::new("token", "old")];
        let scope = IterationScope {
            iteration: 1,
            globals,
            ..Default::default()
        };
        let executor = HttpExecutor::new(Some(5000)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        executor
            .execute(&[first, second], &variables, &scope, tx)
            .await
            .unwrap();

        let mut final_globals = None;
        while let Some(event) = rx.recv().await {
            if let ExecutionEvent::PassFinished { globals, .. } = event {
                final_globals = Some(globals);
            }
        }

        assert_eq!(*paths.lock().unwrap(), vec!["/a", "/abc/xyz"]);
        assert_eq!(final_globals.unwrap(), vec![KeyValue::new("token", "abc")]);
    }
}
