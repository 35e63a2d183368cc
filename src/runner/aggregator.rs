use super::executor::RequestOutcome;
use super::state::{pass_fail_counts, IterationRecord, RequestResult, SummaryResult};
use crate::parser::types::{
    data_row_suffix, Collection, KeyValue, ResponseCode, ResponseRecord, FAIL_MARKER, PASS_MARKER,
};
use uuid::Uuid;

/// Folds request outcomes into iteration records, run-wide summaries and the
/// source collection's response history.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    current: Option<IterationRecord>,
    summaries: Vec<SummaryResult>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an empty record for the iteration about to run
    pub fn begin_iteration(&mut self, iteration: usize, collection_name: &str, data: Vec<KeyValue>) {
        if let Some(unfinished) = self.current.take() {
            log::warn!(
                "Iteration {} was never finished; dropping {} results",
                unfinished.iteration,
                unfinished.result_count()
            );
        }
        self.current = Some(IterationRecord::new(iteration, collection_name, data));
    }

    /// Close the current record and hand it over for the iteration log
    pub fn finish_iteration(&mut self) -> Option<IterationRecord> {
        self.current.take()
    }

    pub fn current(&self) -> Option<&IterationRecord> {
        self.current.as_ref()
    }

    pub fn summaries(&self) -> &[SummaryResult] {
        &self.summaries
    }

    pub fn into_summaries(self) -> Vec<SummaryResult> {
        self.summaries
    }

    /// Record one request execution
    pub fn record(&mut self, collection: &mut Collection, outcome: &RequestOutcome) {
        let RequestOutcome {
            request,
            resolved,
            response,
            tests,
        } = outcome;

        let passed = tests.values().all(|&passed| passed);
        let data = self
            .current
            .as_ref()
            .map(|record| record.data.as_slice())
            .unwrap_or_default();
        let display_name = format!(
            "{}{} {}",
            if passed { PASS_MARKER } else { FAIL_MARKER },
            data_row_suffix(data),
            request.name
        );

        match collection.request_mut(&request.id) {
            Some(source) => {
                source.push_response(ResponseRecord {
                    response_code: ResponseCode::new(response.status),
                    time: response.elapsed_ms,
                    headers: response.headers.clone(),
                    text: response.body.clone(),
                    language: "javascript".to_string(),
                    id: Uuid::new_v4().to_string(),
                    name: display_name,
                    request: resolved.clone(),
                });
                if !passed {
                    source.mark_failed();
                }
            }
            None => log::debug!("Request {} is not part of the source collection", request.id),
        }

        let result = RequestResult {
            id: request.id.clone(),
            name: request.name.clone(),
            url: resolved.url.clone(),
            method: resolved.method.clone(),
            headers: resolved.headers.clone(),
            data: resolved.data.clone(),
            data_mode: resolved.data_mode.clone(),
            response_code: ResponseCode::new(response.status),
            response_headers: response.headers.clone(),
            response_body: response.body.clone(),
            tests: tests.clone(),
            test_pass_fail_counts: pass_fail_counts(tests),
            time: response.elapsed_ms,
            timestamp: response.started_at.timestamp_millis(),
        };

        match self.summaries.iter_mut().find(|s| s.id == result.id) {
            Some(summary) => summary.absorb(&result),
            None => self.summaries.push(SummaryResult::from_result(&result)),
        }

        match self.current.as_mut() {
            Some(record) => record.push(request.folder(), result),
            None => log::warn!(
                "Result for {} arrived outside of an iteration and was not grouped",
                request.id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::Request;
    use crate::runner::executor::ExecutedResponse;
    use crate::runner::state::TestOutcomes;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn collection() -> Collection {
        serde_json::from_str(
            r#"{
                "id": "c1",
                "name": "Users",
                "folders": [{"name": "F", "order": ["a"]}],
                "requests": [
                    {"id": "a", "name": "Get A", "url": "http://api/a"},
                    {"id": "b", "name": "Get B", "url": "http://api/b"}
                ]
            }"#,
        )
        .unwrap()
    }

    fn outcome(id: &str, folder: &str, elapsed_ms: u64, tests: &[(&str, bool)]) -> RequestOutcome {
        let mut request = Request::new(id, &format!("Get {}", id.to_uppercase()), "");
        request.folder_name = Some(folder.to_string());
        RequestOutcome {
            resolved: crate::parser::types::ResolvedRequest {
                url: format!("http://api/{}", id),
                method: "GET".to_string(),
                ..Default::default()
            },
            request,
            response: ExecutedResponse {
                status: 200,
                headers: BTreeMap::new(),
                body: "{}".to_string(),
                elapsed_ms,
                started_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            },
            tests: tests
                .iter()
                .map(|(name, passed)| (name.to_string(), *passed))
                .collect::<TestOutcomes>(),
        }
    }

    #[test]
    fn test_results_grouped_by_folder_in_completion_order() {
        let mut source = collection();
        let mut aggregator = ResultAggregator::new();
        aggregator.begin_iteration(1, "Users", Vec::new());

        aggregator.record(&mut source, &outcome("a", "F", 5, &[("ok", true)]));
        aggregator.record(&mut source, &outcome("b", "root", 7, &[]));
        aggregator.record(&mut source, &outcome("a", "F", 3, &[("ok", true)]));

        let record = aggregator.finish_iteration().unwrap();
        assert_eq!(record.results["F"].len(), 2);
        assert_eq!(record.results["root"].len(), 1);
        assert_eq!(record.results["F"][1].time, 3);
        assert_eq!(record.results["F"][0].timestamp, 1_700_000_000_000);
        assert!(aggregator.current().is_none());

        let summary = &aggregator.summaries()[0];
        assert_eq!(summary.id, "a");
        assert_eq!(summary.total_time, 8);
        assert_eq!(summary.all_tests.len(), 2);
        assert_eq!(aggregator.summaries().len(), 2);
    }

    #[test]
    fn test_source_collection_gets_history_and_fail_marker() {
        let mut source = collection();
        let mut aggregator = ResultAggregator::new();
        aggregator.begin_iteration(
            1,
            "Users",
            vec![KeyValue::new("x", "1"), KeyValue::new("y", 2)],
        );

        aggregator.record(&mut source, &outcome("a", "F", 5, &[("ok", true)]));
        aggregator.record(&mut source, &outcome("a", "F", 5, &[("ok", false)]));
        aggregator.record(&mut source, &outcome("a", "F", 5, &[("ok", false)]));

        let request = &source.requests[0];
        assert_eq!(request.name, "FAIL: Get A");
        assert_eq!(request.responses.len(), 3);
        assert_eq!(request.responses[0]["name"], "PASS:[x:1][y:2] Get A");
        assert_eq!(request.responses[1]["name"], "FAIL:[x:1][y:2] Get A");
        assert_eq!(request.responses[0]["responseCode"]["code"], 200);
        assert_eq!(request.responses[0]["request"]["url"], "http://api/a");
        assert_ne!(request.responses[0]["id"], request.responses[1]["id"]);

        assert_eq!(source.requests[1].name, "Get B");
        assert!(source.requests[1].responses.is_empty());
    }
}
