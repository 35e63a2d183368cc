use super::state::{RunStats, TestOutcomes};
use tokio::sync::broadcast;

/// Run progress events for console output
#[derive(Debug, Clone)]
pub enum RunEvent {
    // Run events
    RunStarted {
        collection: String,
        iterations: usize,
    },
    RunFinished {
        stats: RunStats,
    },

    // Iteration events
    IterationStarted {
        iteration: usize,
        total: usize,
    },
    IterationFinished {
        iteration: usize,
        results: usize,
    },

    // Request events
    RequestStarted {
        name: String,
    },
    RequestFinished {
        name: String,
        status: u16,
        duration_ms: u64,
        tests: TestOutcomes,
    },
}

/// Event emitter for broadcasting run events
pub struct EventEmitter {
    sender: broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<RunEvent>) {
        let (sender, receiver) = broadcast::channel(100);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }
}

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration as StdDuration;

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    /// Print events until every emitter is dropped
    pub async fn listen(mut receiver: broadcast::Receiver<RunEvent>) {
        use colored::Colorize;
        use std::io::IsTerminal;

        let mut spinner: Option<ProgressBar> = None;

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("Console listener skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                RunEvent::RunStarted {
                    collection,
                    iterations,
                } => {
                    println!(
                        "\n{} {} ({} iteration{})",
                        "▶".green().bold(),
                        collection.white().bold(),
                        iterations,
                        if iterations == 1 { "" } else { "s" }
                    );
                }

                RunEvent::IterationStarted { iteration, total } => {
                    println!(
                        "\n  {} Iteration {} of {}",
                        "→".blue(),
                        iteration.to_string().cyan(),
                        total
                    );
                }

                RunEvent::RequestStarted { name } => {
                    let pb = if std::io::stdout().is_terminal() {
                        ProgressBar::new_spinner()
                    } else {
                        // Piped output: no escape codes
                        ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden())
                    };
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("    {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }
                    pb.set_message(format!("{}... ", name.dimmed()));
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    spinner = Some(pb);
                }

                RunEvent::RequestFinished {
                    name,
                    status,
                    duration_ms,
                    tests,
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }

                    let failed = tests.values().any(|passed| !passed);
                    let status_str = if status == 0 {
                        "ERR".red()
                    } else if status >= 400 {
                        status.to_string().yellow()
                    } else {
                        status.to_string().green()
                    };
                    println!(
                        "    {} {} [{}, {}ms]",
                        if failed { "✗".red() } else { "✓".green() },
                        name,
                        status_str,
                        duration_ms
                    );
                    for (test, passed) in &tests {
                        if *passed {
                            println!("      {} {}", "✓".green(), test);
                        } else {
                            println!("      {} {}", "✗".red(), test.red());
                        }
                    }
                }

                RunEvent::IterationFinished { iteration, results } => {
                    log::debug!("Iteration {} recorded {} results", iteration, results);
                }

                RunEvent::RunFinished { stats } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("\n{} Run finished", "■".blue().bold());
                    println!("  Iterations: {}", stats.iterations);
                    println!(
                        "  Requests: {} ({} failed)",
                        stats.requests,
                        stats.failed_requests.to_string().red()
                    );
                    println!(
                        "  Tests: {} passed, {} failed",
                        stats.tests_passed.to_string().green(),
                        stats.tests_failed.to_string().red()
                    );
                    println!("  Total request time: {}ms", stats.total_time_ms);
                }
            }
        }
    }
}
