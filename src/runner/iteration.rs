use anyhow::{Context, Result};
use tokio::sync::mpsc;

use super::aggregator::ResultAggregator;
use super::context::RunContext;
use super::events::{EventEmitter, RunEvent};
use super::executor::{CollectionExecutor, ExecutionEvent, IterationScope};
use super::folder::{filter_by_folder, resolve_folder, tag_folder_membership, FolderIndex};
use super::merge::{merge, with_globals};
use super::state::{IterationRecord, RunStats, SummaryResult};
use crate::error::SetupError;
use crate::parser::collection::ordered_requests;
use crate::parser::types::{Collection, DataRow, Environment, KeyValue, Request};
use crate::report::{self, ExportTargets};

/// Inputs of a run, besides the collection and the executor
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    /// Run only the requests of this folder
    pub folder: Option<String>,
    /// Explicit number of iterations
    pub iteration_count: Option<usize>,
    pub data_rows: Vec<DataRow>,
    pub globals: Vec<KeyValue>,
    pub environment: Environment,
    /// Stop iterating once a pass aborted on a failure
    pub stop_on_error: bool,
    pub exports: ExportTargets,
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationState {
    Idle,
    Running(usize),
    Done,
}

/// What a finished run leaves behind
#[derive(Debug)]
pub struct RunOutcome {
    pub context: RunContext,
    pub collection: Collection,
    pub summaries: Vec<SummaryResult>,
    pub stats: RunStats,
}

impl RunOutcome {
    pub fn iterations(&self) -> &[IterationRecord] {
        &self.context.iterations
    }

    pub fn has_failures(&self) -> bool {
        self.stats.failed_requests > 0
    }
}

/// Runs the collection once per data row (or a fixed count), one iteration
/// at a time
pub struct IterationRunner {
    collection: Collection,
    requests: Vec<Request>,
    data_rows: Vec<DataRow>,
    globals: Vec<KeyValue>,
    total: usize,
    stop_on_error: bool,
    exports: ExportTargets,
    context: RunContext,
    aggregator: ResultAggregator,
    executor: Box<dyn CollectionExecutor>,
    emitter: EventEmitter,
    state: IterationState,
}

impl IterationRunner {
    /// Prepare a run: order, filter and tag the requests and work out how
    /// many iterations to do. Fails if the requested folder does not exist.
    pub fn new(
        collection: Collection,
        plan: RunPlan,
        executor: Box<dyn CollectionExecutor>,
    ) -> Result<Self, SetupError> {
        let mut requests = ordered_requests(&collection);

        if let Some(name) = plan.folder.as_deref() {
            let folder = resolve_folder(&collection, name)?;
            requests = filter_by_folder(requests, folder);
        }

        let index = FolderIndex::build(&collection);
        tag_folder_membership(&mut requests, &index);

        let total = iteration_total(plan.iteration_count, plan.data_rows.len());

        Ok(Self {
            collection,
            requests,
            data_rows: plan.data_rows,
            globals: plan.globals,
            total,
            stop_on_error: plan.stop_on_error,
            exports: plan.exports,
            context: RunContext::new(plan.environment),
            aggregator: ResultAggregator::new(),
            executor,
            emitter: EventEmitter::default(),
            state: IterationState::Idle,
        })
    }

    /// Send progress events to `emitter` instead of discarding them
    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn total_iterations(&self) -> usize {
        self.total
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn state(&self) -> IterationState {
        self.state
    }

    /// Run every iteration, export the reports and hand back the run state
    pub async fn run(mut self) -> Result<RunOutcome> {
        self.emitter.emit(RunEvent::RunStarted {
            collection: self.collection.name.clone(),
            iterations: self.total,
        });

        while let Some(iteration) = self.advance() {
            let aborted = self.run_iteration(iteration).await?;
            if aborted && self.stop_on_error {
                log::warn!(
                    "Stopping after iteration {} of {} on first error",
                    iteration,
                    self.total
                );
                self.state = IterationState::Done;
            }
        }

        let stats = RunStats::from_iterations(&self.context.iterations);
        report::export(
            &self.exports,
            &self.context,
            &mut self.collection,
            &self.globals,
            self.aggregator.summaries(),
        )
        .context("Failed to export run results")?;

        self.emitter.emit(RunEvent::RunFinished {
            stats: stats.clone(),
        });

        Ok(RunOutcome {
            context: self.context,
            collection: self.collection,
            summaries: self.aggregator.into_summaries(),
            stats,
        })
    }

    /// Move to the next state; the iteration number to run, if any
    fn advance(&mut self) -> Option<usize> {
        self.state = match self.state {
            IterationState::Idle if self.total > 0 => IterationState::Running(1),
            IterationState::Running(i) if i < self.total => IterationState::Running(i + 1),
            _ => IterationState::Done,
        };

        match self.state {
            IterationState::Running(i) => Some(i),
            _ => None,
        }
    }

    /// One pass with its own effective environment. Returns whether the
    /// executor aborted the pass.
    async fn run_iteration(&mut self, iteration: usize) -> Result<bool> {
        let number = self.context.next_iteration();
        debug_assert_eq!(number, iteration);

        let row = self.data_rows.get(iteration - 1).cloned().unwrap_or_default();

        let snapshot = self.context.snapshot();
        let baseline = with_globals(&snapshot, &self.globals);
        let effective = merge(&baseline, &row);
        self.context.install(effective.clone());

        self.aggregator
            .begin_iteration(iteration, &self.collection.name, row.clone());

        let mut end = PassEnd::default();
        if !self.requests.is_empty() {
            self.emitter.emit(RunEvent::IterationStarted {
                iteration,
                total: self.total,
            });

            let scope = IterationScope {
                iteration,
                globals: self.globals.clone(),
                data: row,
                stop_on_error: self.stop_on_error,
            };
            end = self.execute_pass(&effective, &scope).await?;
        } else {
            log::debug!("Iteration {}: no requests to run", iteration);
        }

        // Globals written by test scripts persist into later iterations
        if let Some(globals) = end.globals {
            self.globals = globals;
        }
        self.context.install(with_globals(&baseline, &self.globals));

        if let Some(record) = self.aggregator.finish_iteration() {
            self.emitter.emit(RunEvent::IterationFinished {
                iteration,
                results: record.result_count(),
            });
            self.context.push_iteration(record);
        }

        Ok(end.aborted)
    }

    /// Drive the executor and record its outcomes until it reports the pass
    /// as finished
    async fn execute_pass(&mut self, variables: &[KeyValue], scope: &IterationScope) -> Result<PassEnd> {
        let (tx, rx) = mpsc::unbounded_channel();

        let executor = &self.executor;
        let requests = &self.requests;
        let pass = executor.execute(requests, variables, scope, tx);
        let drain = drain_events(
            rx,
            &mut self.aggregator,
            &mut self.collection,
            &self.emitter,
        );

        let (executed, end) = tokio::join!(pass, drain);
        executed.with_context(|| format!("Iteration {} failed to execute", scope.iteration))?;

        Ok(end)
    }
}

/// Number of iterations: explicit non-zero count, else one per data row,
/// else one
pub fn iteration_total(explicit: Option<usize>, rows: usize) -> usize {
    if count_exceeds_rows(explicit, rows) {
        log::warn!(
            "Iteration count {} exceeds the {} data rows; later iterations run without row data",
            explicit.unwrap_or_default(),
            rows
        );
    }

    match explicit.filter(|&count| count > 0) {
        Some(count) => count,
        None if rows > 0 => rows,
        None => 1,
    }
}

/// Whether an explicit count asks for more iterations than there are rows
pub fn count_exceeds_rows(explicit: Option<usize>, rows: usize) -> bool {
    matches!(explicit, Some(count) if rows > 0 && count > rows)
}

/// How a pass ended
#[derive(Debug, Default)]
struct PassEnd {
    aborted: bool,
    /// Globals after the pass; `None` when the executor never finished it
    globals: Option<Vec<KeyValue>>,
}

async fn drain_events(
    mut rx: mpsc::UnboundedReceiver<ExecutionEvent>,
    aggregator: &mut ResultAggregator,
    collection: &mut Collection,
    emitter: &EventEmitter,
) -> PassEnd {
    while let Some(event) = rx.recv().await {
        match event {
            ExecutionEvent::RequestStarted { name, .. } => {
                emitter.emit(RunEvent::RequestStarted { name });
            }
            ExecutionEvent::RequestCompleted(outcome) => {
                aggregator.record(collection, &outcome);
                emitter.emit(RunEvent::RequestFinished {
                    name: outcome.request.name.clone(),
                    status: outcome.response.status,
                    duration_ms: outcome.response.elapsed_ms,
                    tests: outcome.tests.clone(),
                });
            }
            ExecutionEvent::PassFinished { aborted, globals } => {
                return PassEnd {
                    aborted,
                    globals: Some(globals),
                }
            }
        }
    }

    log::debug!("Executor closed its channel without finishing the pass");
    PassEnd::default()
}
