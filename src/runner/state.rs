use crate::parser::types::{KeyValue, ResponseCode};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Test name -> passed, in the order the test script set them
pub type TestOutcomes = IndexMap<String, bool>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PassFailCount {
    pub pass: u32,
    pub fail: u32,
}

/// Per-test pass/fail counts of a single run of a request
pub fn pass_fail_counts(tests: &TestOutcomes) -> IndexMap<String, PassFailCount> {
    tests
        .iter()
        .map(|(name, &passed)| {
            let count = PassFailCount {
                pass: passed as u32,
                fail: !passed as u32,
            };
            (name.clone(), count)
        })
        .collect()
}

/// Names of the failed tests, in map order
pub fn failed_tests(tests: &TestOutcomes) -> Vec<&str> {
    tests
        .iter()
        .filter(|&(_, &passed)| !passed)
        .map(|(name, _)| name.as_str())
        .collect()
}

/// Outcome of one execution of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResult {
    pub id: String,
    pub name: String,
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub data: serde_json::Value,
    pub data_mode: Option<String>,
    pub response_code: ResponseCode,
    pub response_headers: BTreeMap<String, String>,
    pub response_body: String,
    pub tests: TestOutcomes,
    pub test_pass_fail_counts: IndexMap<String, PassFailCount>,
    pub time: u64,
    /// Request start, in milliseconds since the epoch
    pub timestamp: i64,
}

impl RequestResult {
    pub fn passed(&self) -> bool {
        self.tests.values().all(|&passed| passed)
    }

    pub fn failed_tests(&self) -> Vec<&str> {
        failed_tests(&self.tests)
    }
}

/// Everything one iteration produced, grouped by folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    pub iteration: usize,
    pub collection_name: String,
    #[serde(default)]
    pub data: Vec<KeyValue>,
    pub results: BTreeMap<String, Vec<RequestResult>>,
}

impl IterationRecord {
    pub fn new(iteration: usize, collection_name: &str, data: Vec<KeyValue>) -> Self {
        Self {
            iteration,
            collection_name: collection_name.to_string(),
            data,
            results: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, folder: &str, result: RequestResult) {
        self.results
            .entry(folder.to_string())
            .or_default()
            .push(result);
    }

    pub fn result_count(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }
}

/// Run-wide accumulation of every result for one request id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub id: String,
    pub name: String,
    pub url: String,
    pub total_time: u64,
    pub response_code: ResponseCode,
    pub response_body: String,
    pub response_headers: BTreeMap<String, String>,
    pub tests: TestOutcomes,
    pub test_pass_fail_counts: IndexMap<String, PassFailCount>,
    /// Always empty; kept for readers of the summary document
    pub times: Vec<u64>,
    /// Test maps of every run, newest first
    pub all_tests: Vec<TestOutcomes>,
    pub time: u64,
}

impl SummaryResult {
    pub fn from_result(result: &RequestResult) -> Self {
        Self {
            id: result.id.clone(),
            name: result.name.clone(),
            url: result.url.clone(),
            total_time: result.time,
            response_code: result.response_code.clone(),
            response_body: result.response_body.clone(),
            response_headers: result.response_headers.clone(),
            tests: result.tests.clone(),
            test_pass_fail_counts: result.test_pass_fail_counts.clone(),
            times: Vec::new(),
            all_tests: vec![result.tests.clone()],
            time: result.time,
        }
    }

    /// Fold a later run of the same request in: latest fields win, time and
    /// test history accumulate
    pub fn absorb(&mut self, result: &RequestResult) {
        let total_time = self.total_time + result.time;
        let mut all_tests = vec![result.tests.clone()];
        all_tests.append(&mut self.all_tests);

        *self = Self {
            total_time,
            all_tests,
            ..Self::from_result(result)
        };
    }
}

/// Totals printed at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub iterations: usize,
    pub requests: usize,
    pub failed_requests: usize,
    pub tests_passed: usize,
    pub tests_failed: usize,
    pub total_time_ms: u64,
}

impl RunStats {
    pub fn from_iterations(iterations: &[IterationRecord]) -> Self {
        let mut stats = Self {
            iterations: iterations.len(),
            ..Default::default()
        };

        for result in iterations.iter().flat_map(|i| i.results.values().flatten()) {
            stats.requests += 1;
            if !result.passed() {
                stats.failed_requests += 1;
            }
            let failed = result.failed_tests().len();
            stats.tests_failed += failed;
            stats.tests_passed += result.tests.len() - failed;
            stats.total_time_ms += result.time;
        }

        stats
    }
}

#[cfg(test)]
pub(crate) fn sample_result(id: &str, time: u64, tests: &[(&str, bool)]) -> RequestResult {
    let tests: TestOutcomes = tests
        .iter()
        .map(|(name, passed)| (name.to_string(), *passed))
        .collect();
    RequestResult {
        id: id.to_string(),
        name: id.to_string(),
        url: format!("http://localhost/{}", id),
        method: "GET".to_string(),
        headers: BTreeMap::new(),
        data: serde_json::Value::Null,
        data_mode: None,
        response_code: ResponseCode::new(200),
        response_headers: BTreeMap::new(),
        response_body: "ok".to_string(),
        test_pass_fail_counts: pass_fail_counts(&tests),
        tests,
        time,
        timestamp: 0,
    }
}
