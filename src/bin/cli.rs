//! Cardbot CLI - drive the card-presentation robot from the command line
//!
//! Runs single card presentations, logged cycle tests and unattended
//! durability loops against the robot's serial console.

use anyhow::Context;
use cardbot_core::config::RobotConfig;
use cardbot_core::core::transport::port_description;
use cardbot_core::{
    print_exit_codes, CliResult, Command, CycleTestParameters, ExitCodes, RobotCommander,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Cardbot CLI
#[derive(Parser, Debug)]
#[command(
    name = "cardbot",
    version,
    about = "Card-presentation robot driver and console logger",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, env = "CARDBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port, skips discovery
    #[arg(short, long, env = "CARDBOT_PORT")]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Directory for session log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts,

    /// Present a card and wait for the cycle to finish
    Present(CycleArgs),

    /// Present a card while logging the console to the session file
    CycleTest {
        #[command(flatten)]
        cycle: CycleArgs,

        /// Start a new log file for this test
        #[arg(long)]
        new_session: bool,
    },

    /// Run cycle tests over several slots until done or interrupted
    Durability {
        /// Slots visited every round
        #[arg(long, value_delimiter = ',')]
        slots: Option<Vec<u8>>,

        /// Repetitions per cycle test
        #[arg(short, long)]
        num: Option<u32>,

        /// Press duration (ms)
        #[arg(long)]
        press: Option<u64>,

        /// Retract duration (ms)
        #[arg(long)]
        retract: Option<u64>,

        /// Pause between cycle tests (seconds)
        #[arg(long)]
        pause: Option<u64>,

        /// Number of rounds (runs until Ctrl-C when omitted)
        #[arg(long)]
        rounds: Option<u32>,

        /// Start a new log file for every cycle test
        #[arg(long)]
        session_per_cycle: bool,
    },

    /// Soft-reset the interpreter
    Reset,

    /// Stop the running statement
    Halt,

    /// Run interpreter statements and print their output
    Exec {
        /// Statements, run in order
        #[arg(required = true)]
        statements: Vec<String>,
    },

    /// Show exit codes
    ExitCodes,
}

#[derive(Args, Debug)]
struct CycleArgs {
    /// Card slot
    #[arg(short, long)]
    slot: u8,

    /// Repetitions
    #[arg(short, long, default_value = "1")]
    num: u32,

    /// Press duration (ms)
    #[arg(long)]
    press: Option<u64>,

    /// Retract duration (ms)
    #[arg(long)]
    retract: Option<u64>,
}

impl CycleArgs {
    fn parameters(&self, config: &RobotConfig) -> CycleTestParameters {
        CycleTestParameters::new(
            self.slot,
            self.num,
            self.press.unwrap_or(config.cycle.press_ms),
            self.retract.unwrap_or(config.cycle.retract_ms),
        )
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let quiet = cli.quiet;

    let result = match run(cli).await {
        Ok(result) => result,
        Err(err) => CliResult::from(err),
    };

    match &result {
        CliResult::Success(Some(msg)) if !quiet => println!("{msg}"),
        CliResult::Error(code, msg) => eprintln!("Error: {msg} (exit code {code})"),
        _ => {}
    }
    result.to_exit_code()
}

async fn run(cli: Cli) -> anyhow::Result<CliResult> {
    let mut config = RobotConfig::load(cli.config.as_deref()).context("loading configuration")?;
    apply_overrides(&mut config, &cli);

    let _guard = init_tracing(&cli, &config)?;
    tracing::info!("Cardbot v{}", cardbot_core::VERSION);

    match &cli.command {
        Commands::ListPorts => list_ports(),
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(CliResult::success())
        }
        command => {
            let shutdown = shutdown_on_ctrl_c();
            let mut robot = connect(&config, shutdown).await?;
            run_robot_command(&mut robot, &config, command).await
        }
    }
}

fn apply_overrides(config: &mut RobotConfig, cli: &Cli) {
    if let Some(port) = &cli.port {
        config.serial.port = Some(port.clone());
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(dir) = &cli.log_dir {
        config.logging.log_dir = Some(dir.clone());
    }

    match &cli.command {
        Commands::CycleTest { new_session: true, .. } => config.logging.session_per_cycle = true,
        Commands::Durability {
            slots,
            num,
            press,
            retract,
            pause,
            rounds,
            session_per_cycle,
        } => {
            let cycle = &mut config.cycle;
            if let Some(slots) = slots {
                cycle.slots = slots.clone();
            }
            cycle.num = num.unwrap_or(cycle.num);
            cycle.press_ms = press.unwrap_or(cycle.press_ms);
            cycle.retract_ms = retract.unwrap_or(cycle.retract_ms);
            cycle.pause_secs = pause.unwrap_or(cycle.pause_secs);
            if rounds.is_some() {
                cycle.rounds = *rounds;
            }
            if *session_per_cycle {
                config.logging.session_per_cycle = true;
            }
        }
        _ => {}
    }
}

fn init_tracing(cli: &Cli, config: &RobotConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if cli.quiet {
        tracing::Level::ERROR
    } else if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = if config.logging.diagnostics_file {
        let dir = config.log_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(dir, "cardbot.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current step");
            trigger.cancel();
        }
    });
    token
}

async fn connect(config: &RobotConfig, shutdown: CancellationToken) -> anyhow::Result<RobotCommander> {
    let serial = config.serial_config()?;
    let commander_config = config.commander_config()?;
    let robot = RobotCommander::connect(serial, commander_config, shutdown)
        .await
        .context("connecting to robot")?;
    tracing::info!("Session log: {}", robot.session().log_path().display());
    Ok(robot)
}

async fn run_robot_command(
    robot: &mut RobotCommander,
    config: &RobotConfig,
    command: &Commands,
) -> anyhow::Result<CliResult> {
    match command {
        Commands::Present(args) => {
            robot.present_card(args.parameters(config)).await?;
            Ok(CliResult::success_with_message(format!(
                "Presented slot {} x{}",
                args.slot, args.num
            )))
        }
        Commands::CycleTest { cycle, .. } => {
            let report = robot.present_card_cycle_test(cycle.parameters(config)).await?;
            Ok(CliResult::success_with_message(format!(
                "Cycle test done: {} console lines logged to {}",
                report.lines_logged,
                robot.session().log_path().display()
            )))
        }
        Commands::Durability { .. } => {
            let summary = robot.run_durability_test(&config.durability_plan()).await?;
            let message = format!(
                "{} rounds, {} cycle tests, {} presses, {} console lines",
                summary.rounds, summary.tests, summary.presses, summary.lines_logged
            );
            if summary.cancelled {
                Ok(CliResult::error(
                    ExitCodes::CANCELLED,
                    format!("Interrupted after {message}"),
                ))
            } else {
                Ok(CliResult::success_with_message(message))
            }
        }
        Commands::Reset => {
            let output = robot.reset_robot().await?;
            print!("{output}");
            Ok(CliResult::success())
        }
        Commands::Halt => {
            let output = robot.halt_execution().await?;
            print!("{output}");
            Ok(CliResult::success())
        }
        Commands::Exec { statements } => {
            let commands = statements
                .iter()
                .map(Command::new)
                .collect::<Result<Vec<_>, _>>()?;
            let mut outputs = robot.run_commands(commands).await?;
            outputs.push(robot.read_prompt_output().await?);
            for output in outputs {
                print!("{output}");
            }
            Ok(CliResult::success())
        }
        Commands::ListPorts | Commands::ExitCodes => Ok(CliResult::success()),
    }
}

fn list_ports() -> anyhow::Result<CliResult> {
    let ports = cardbot_core::list_ports()?;

    if ports.is_empty() {
        return Ok(CliResult::success_with_message("No serial ports found."));
    }

    println!("{:<20} Description", "Port");
    println!("{:-<60}", "");
    for info in &ports {
        println!("{:<20} {}", info.port_name, port_description(info));
    }
    Ok(CliResult::success())
}
