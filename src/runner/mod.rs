pub mod aggregator;
pub mod context;
pub mod events;
pub mod executor;
pub mod folder;
pub mod iteration;
pub mod merge;
pub mod script;
pub mod state;

use anyhow::{Context, Result};

use crate::parser::{load_collection, load_data_rows, load_environment, load_globals};
use crate::utils::config::RunConfig;

pub use events::*;
pub use iteration::{IterationRunner, IterationState, RunOutcome, RunPlan};
pub use state::*;

/// Load everything a run needs, run the collection over HTTP and export the
/// results
pub async fn run_collection(config: &RunConfig) -> Result<RunOutcome> {
    let collection = load_collection(&config.collection)?;
    let data_rows = load_data_rows(config.data_file.as_deref())?;
    let globals = load_globals(config.globals_file.as_deref())?;
    let environment = load_environment(config.environment_file.as_deref())?;

    log::debug!(
        "Loaded collection {} with {} requests, {} data rows, {} globals",
        collection.name,
        collection.requests.len(),
        data_rows.len(),
        globals.len()
    );

    let executor = executor::HttpExecutor::new(config.request_timeout_ms)?;
    let plan = config.plan(data_rows, globals, environment);
    let runner = IterationRunner::new(collection, plan, Box::new(executor))?;

    let (emitter, receiver) = EventEmitter::new();
    let listener = tokio::spawn(ConsoleEventListener::listen(receiver));

    let outcome = runner.with_emitter(emitter).run().await;

    // The runner owned the emitter; once it is gone the listener drains and stops
    listener.await.context("Console listener crashed")?;

    outcome
}
