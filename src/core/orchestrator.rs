//! Cycle test orchestration
//!
//! [`RobotCommander`] sequences REPL commands, the background log reader and
//! the timed waits that stand in for a completion signal from the robot.
//! Serial I/O is blocking and runs on Tokio's blocking pool; every wait can
//! be cut short through the commander's cancellation token.

use super::cycle::{CycleTestParameters, DurabilityPlan, TimingConfig};
use super::error::{Result, RobotError};
use super::logger::Session;
use super::reader::{BackgroundLogReader, ReaderReport};
use super::repl::{Command, Interrupt, ReplClient};
use super::transport::{SerialChannel, SerialConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Statement run after connecting so `rob` exists on the device
pub const DEFAULT_STARTUP_IMPORT: &str = "import source.RobotTester";

/// Commander configuration
#[derive(Debug, Clone)]
pub struct CommanderConfig {
    /// Device timing table
    pub timing: TimingConfig,
    /// Directory receiving session log files
    pub log_dir: PathBuf,
    /// Start a new log file for every cycle test
    pub session_per_cycle: bool,
    /// Statements run once after connecting
    pub startup_imports: Vec<Command>,
}

impl CommanderConfig {
    /// Defaults with logs under `log_dir`
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            timing: TimingConfig::default(),
            log_dir: log_dir.into(),
            session_per_cycle: false,
            startup_imports: vec![Command::new_unchecked(DEFAULT_STARTUP_IMPORT.to_string())],
        }
    }
}

/// Totals of a durability run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurabilitySummary {
    /// Completed rounds over all slots
    pub rounds: u32,
    /// Completed cycle tests
    pub tests: u32,
    /// Card presentations requested
    pub presses: u64,
    /// Captured console lines
    pub lines_logged: usize,
    /// Run ended by a shutdown request
    pub cancelled: bool,
}

/// Drives the robot over one serial connection
#[derive(Debug)]
pub struct RobotCommander {
    client: ReplClient,
    reader: BackgroundLogReader,
    session: Session,
    config: CommanderConfig,
    shutdown: CancellationToken,
}

impl RobotCommander {
    /// Wrap an open channel and start a logging session
    pub fn new(channel: SerialChannel, config: CommanderConfig, shutdown: CancellationToken) -> Self {
        let session = Session::start(&config.log_dir);
        Self {
            client: ReplClient::new(channel.clone()),
            reader: BackgroundLogReader::new(channel),
            session,
            config,
            shutdown,
        }
    }

    /// Open `serial`, then run the startup imports
    pub async fn connect(
        serial: SerialConfig,
        config: CommanderConfig,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let channel = tokio::task::spawn_blocking(move || SerialChannel::open(&serial)).await??;
        let commander = Self::new(channel, config, shutdown);
        commander.run_startup_imports().await?;
        Ok(commander)
    }

    /// REPL client
    pub fn client(&self) -> &ReplClient {
        &self.client
    }

    /// Current logging session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Timing table in use
    pub fn timing(&self) -> &TimingConfig {
        &self.config.timing
    }

    /// Run the configured startup statements
    pub async fn run_startup_imports(&self) -> Result<()> {
        if self.config.startup_imports.is_empty() {
            return Ok(());
        }
        tracing::info!("Running {} startup import(s)", self.config.startup_imports.len());
        self.run_commands(self.config.startup_imports.clone()).await?;
        Ok(())
    }

    /// Run statements interactively, returning the drained outputs
    pub async fn run_commands(&self, commands: Vec<Command>) -> Result<Vec<String>> {
        self.blocking(move |client| client.run_commands(&commands, true))
            .await
    }

    /// Drain the output of the last interactive statement
    pub async fn read_prompt_output(&self) -> Result<String> {
        self.blocking(|client| client.read_prompt_output()).await
    }

    /// Present a card interactively and wait for the cycle to finish
    pub async fn present_card(&self, params: CycleTestParameters) -> Result<()> {
        let command = params.command();
        let total = params.total_duration(&self.config.timing);
        tracing::info!("{} (expected {:.1} s)", command, total.as_secs_f64());

        self.blocking(move |client| client.run_commands(&[command], true))
            .await?;
        self.wait(total).await
    }

    /// Present a card while logging the console to the session file
    ///
    /// When cancelled, the reader is still stopped and the running statement
    /// is halted before [`RobotError::Cancelled`] is returned.
    pub async fn present_card_cycle_test(
        &mut self,
        params: CycleTestParameters,
    ) -> Result<ReaderReport> {
        let sink = if self.config.session_per_cycle {
            let session = Session::start(&self.config.log_dir);
            let sink = session.open_sink()?;
            self.session = session;
            sink
        } else {
            self.session.open_sink()?
        };
        tracing::info!("Logging console to {}", sink.path().display());

        let command = params.command();
        let total = params.total_duration(&self.config.timing);
        tracing::info!("{} (expected {:.1} s)", command, total.as_secs_f64());

        self.reader.start(Box::new(sink))?;
        let outcome = self.stream_and_wait(command, total).await;
        let stopped = self.reader.stop().await;

        match outcome {
            Ok(()) => stopped,
            Err(RobotError::Cancelled) => {
                stopped?;
                tracing::warn!("Cycle test cancelled, halting robot");
                let output = self.halt_execution().await?;
                tracing::debug!("Halt output: {:?}", output);
                Err(RobotError::Cancelled)
            }
            Err(e) => {
                if let Err(stop_err) = stopped {
                    tracing::warn!("Log reader also failed: {}", stop_err);
                }
                Err(e)
            }
        }
    }

    /// Soft-reset the interpreter and return its boot output
    pub async fn reset_robot(&self) -> Result<String> {
        self.blocking(|client| client.send_interrupt(Interrupt::SoftReset))
            .await?;
        self.wait(self.config.timing.reset_settle()).await?;
        self.read_prompt_output().await
    }

    /// Interrupt the running statement and return its output
    pub async fn halt_execution(&self) -> Result<String> {
        self.blocking(|client| {
            client.send_interrupt(Interrupt::Halt)?;
            client.read_prompt_output()
        })
        .await
    }

    /// Loop cycle tests over the plan's slots until done or cancelled
    pub async fn run_durability_test(&mut self, plan: &DurabilityPlan) -> Result<DurabilitySummary> {
        if plan.slots.is_empty() {
            return Err(RobotError::Config("durability plan has no slots".to_string()));
        }

        let mut summary = DurabilitySummary::default();
        while plan.rounds.map_or(true, |max| summary.rounds < max) {
            for &slot in &plan.slots {
                tracing::info!(
                    "Round {}: cycle test on slot {} ({} presses)",
                    summary.rounds + 1,
                    slot,
                    plan.num
                );

                let report = match self.present_card_cycle_test(plan.parameters(slot)).await {
                    Err(RobotError::Cancelled) => {
                        summary.cancelled = true;
                        return Ok(summary);
                    }
                    other => other?,
                };
                summary.tests += 1;
                summary.presses += u64::from(plan.num);
                summary.lines_logged += report.lines_logged;

                match self.wait(plan.pause).await {
                    Err(RobotError::Cancelled) => {
                        summary.cancelled = true;
                        return Ok(summary);
                    }
                    other => other?,
                }
            }
            summary.rounds += 1;
        }

        Ok(summary)
    }

    async fn stream_and_wait(&self, command: Command, total: Duration) -> Result<()> {
        self.blocking(move |client| client.run_commands(&[command], false))
            .await?;
        self.wait(total).await
    }

    async fn wait(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            () = tokio::time::sleep(duration) => Ok(()),
            () = self.shutdown.cancelled() => Err(RobotError::Cancelled),
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(ReplClient) -> Result<T> + Send + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || f(client)).await?
    }
}
