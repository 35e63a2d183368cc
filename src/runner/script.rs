//! Test script sandbox using boa_engine
//!
//! Request test scripts run against a context preloaded with the response
//! and the pass's variables:
//! - `responseBody`, `responseCode`, `responseTime`, `responseHeaders`
//! - `environment`, `globals`, `data`, `iteration`
//! - `tests`, filled in by the script
//! - `postman` helpers to set or clear variables

use super::merge::merge;
use super::state::TestOutcomes;
use crate::parser::types::KeyValue;
use boa_engine::{Context, Source};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

const HELPERS: &str = r#"
var tests = {};
var postman = {
    setEnvironmentVariable: function (key, value) { environment[key] = String(value); },
    clearEnvironmentVariable: function (key) { delete environment[key]; },
    setGlobalVariable: function (key, value) { globals[key] = String(value); },
    clearGlobalVariable: function (key) { delete globals[key]; },
    getResponseHeader: function (name) {
        var wanted = String(name).toLowerCase();
        for (var header in responseHeaders) {
            if (header.toLowerCase() === wanted) { return responseHeaders[header]; }
        }
        return undefined;
    }
};
function __collectOutcome() {
    var passed = {};
    for (var name in tests) {
        if (Object.prototype.hasOwnProperty.call(tests, name)) { passed[name] = !!tests[name]; }
    }
    return JSON.stringify({ tests: passed, environment: environment, globals: globals });
}
"#;

/// What a test script gets to see
pub struct SandboxInput<'a> {
    pub response_body: &'a str,
    pub response_code: u16,
    pub response_time: u64,
    pub response_headers: &'a BTreeMap<String, String>,
    pub iteration: usize,
    pub environment: &'a [KeyValue],
    pub globals: &'a [KeyValue],
    pub data: &'a [KeyValue],
}

/// Test results plus the variables as the script left them
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutcome {
    pub tests: TestOutcomes,
    pub environment: Vec<KeyValue>,
    pub globals: Vec<KeyValue>,
}

/// JavaScript context for one test script run
pub struct TestSandbox {
    context: Context,
}

impl TestSandbox {
    pub fn new() -> Self {
        Self {
            context: Context::default(),
        }
    }

    /// Run a test script.
    ///
    /// A script that throws keeps the tests it managed to set and gets one
    /// extra failing test carrying the error.
    pub fn run(&mut self, script: &str, input: &SandboxInput) -> ScriptOutcome {
        let unchanged = ScriptOutcome {
            tests: TestOutcomes::new(),
            environment: input.environment.to_vec(),
            globals: input.globals.to_vec(),
        };

        if let Err(e) = self.eval(&prelude(input)).and_then(|_| self.eval(HELPERS)) {
            let mut outcome = unchanged;
            outcome.tests.insert(format!("Test script error: {}", e), false);
            return outcome;
        }

        let script_error = self.eval(script).err();

        let mut outcome = match self.collect(input) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::debug!("Could not read test script outcome: {}", e);
                unchanged
            }
        };

        if let Some(e) = script_error {
            outcome.tests.insert(format!("Test script error: {}", e), false);
        }

        outcome
    }

    fn eval(&mut self, code: &str) -> Result<String, String> {
        match self.context.eval(Source::from_bytes(code)) {
            Ok(value) => Ok(value
                .as_string()
                .map(|s| s.to_std_string_escaped())
                .unwrap_or_default()),
            Err(e) => Err(e.to_string()),
        }
    }

    fn collect(&mut self, input: &SandboxInput) -> Result<ScriptOutcome, String> {
        let raw = self.eval("__collectOutcome()")?;
        let value: Value = serde_json::from_str(&raw).map_err(|e| e.to_string())?;

        let tests = value
            .get("tests")
            .and_then(Value::as_object)
            .map(|tests| {
                tests
                    .iter()
                    .map(|(name, passed)| (name.clone(), passed.as_bool().unwrap_or(false)))
                    .collect()
            })
            .unwrap_or_default();

        let environment = match value.get("environment").and_then(Value::as_object) {
            Some(updated) => apply_object(input.environment, updated),
            None => input.environment.to_vec(),
        };
        let globals = match value.get("globals").and_then(Value::as_object) {
            Some(updated) => apply_object(input.globals, updated),
            None => input.globals.to_vec(),
        };

        Ok(ScriptOutcome {
            tests,
            environment,
            globals,
        })
    }
}

impl Default for TestSandbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a script in a fresh sandbox
pub fn run_test_script(script: &str, input: &SandboxInput) -> ScriptOutcome {
    TestSandbox::new().run(script, input)
}

fn prelude(input: &SandboxInput) -> String {
    let response_code = json!({ "code": input.response_code, "name": "", "detail": "" });

    format!(
        "var responseBody = {};\nvar responseCode = {};\nvar responseTime = {};\n\
         var responseHeaders = {};\nvar iteration = {};\nvar environment = {};\n\
         var globals = {};\nvar data = {};\n",
        Value::from(input.response_body),
        response_code,
        input.response_time,
        json!(input.response_headers),
        input.iteration,
        Value::Object(to_object(input.environment)),
        Value::Object(to_object(input.globals)),
        Value::Object(to_object(input.data)),
    )
}

fn to_object(vars: &[KeyValue]) -> Map<String, Value> {
    vars.iter()
        .map(|kv| (kv.key.clone(), kv.value.clone()))
        .collect()
}

/// Bring a key/value sequence in line with the object a script left behind:
/// deleted keys go, changed keys keep their place, new keys are appended
fn apply_object(original: &[KeyValue], updated: &Map<String, Value>) -> Vec<KeyValue> {
    let kept: Vec<KeyValue> = original
        .iter()
        .filter(|kv| updated.contains_key(&kv.key))
        .cloned()
        .collect();
    let changes: Vec<KeyValue> = updated
        .iter()
        .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
        .collect();

    merge(&kept, &changes)
}
