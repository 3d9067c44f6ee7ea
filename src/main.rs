use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;

mod cli;

use cli::Cli;
use cli::commands::{Commands, StateCommands};
use graphbot::clock::{Clock, SystemClock};
use graphbot::config::Config;
use graphbot::scheduler::schedule::{FixedTime, compute_next_trigger};
use graphbot::scheduler::store::StateStore;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("graphbot")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("graphbot.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None => handle_schedule_command(3, config),
        Some(Commands::Schedule { count }) => handle_schedule_command(*count, config),
        Some(Commands::State { command }) => match command {
            StateCommands::Show => handle_state_show_command(config),
            StateCommands::Clear => handle_state_clear_command(config),
        },
    }
}

fn handle_schedule_command(count: u32, config: &Config) -> Result<()> {
    info!("Previewing {} upcoming trigger(s)", count);

    let scheduling = &config.scheduling;
    scheduling.validate().context("Invalid scheduling config")?;
    let fixed = FixedTime::parse(&scheduling.fixed_update_time)?;

    let store = StateStore::new(&config.storage.state_file);
    let (state, _) = store.load();

    println!(
        "{} every {} day(s){}",
        "Schedule:".cyan(),
        scheduling.update_days,
        if fixed.is_disabled() {
            String::new()
        } else {
            format!(" at {}", scheduling.fixed_update_time)
        }
    );
    if let Some(last) = state.last_update {
        println!("{} {}", "Last update:".cyan(), last.format("%Y-%m-%d %H:%M:%S"));
    } else {
        println!("{} never", "Last update:".cyan());
    }

    let now = SystemClock.now();
    let mut last = state.last_update;
    for i in 0..count {
        // Each preview step assumes the previous trigger fired on time.
        let anchor = last.unwrap_or(now).max(now);
        let next = compute_next_trigger(anchor, scheduling.update_days, fixed, last);
        if i == 0 {
            let until = next - now;
            println!(
                "{} {} (in {}h {}m)",
                "Next update:".green(),
                next.format("%Y-%m-%d %H:%M:%S"),
                until.num_hours(),
                until.num_minutes() % 60
            );
        } else {
            println!("             {}", next.format("%Y-%m-%d %H:%M:%S"));
        }
        last = Some(next);
    }
    Ok(())
}

fn handle_state_show_command(config: &Config) -> Result<()> {
    info!("Showing persisted state");

    let store = StateStore::new(&config.storage.state_file);
    println!("{} {}", "State file:".cyan(), store.path().display());

    if !store.exists() {
        println!("{}", "No state file found (fresh schedule)".yellow());
        return Ok(());
    }

    let (state, saved_config) = store.load();
    match state.last_update {
        Some(t) => println!("{} {}", "Last update:".green(), t.format("%Y-%m-%d %H:%M:%S")),
        None => println!("{} never", "Last update:".green()),
    }
    match state.next_update {
        Some(t) => println!("{} {}", "Next update:".green(), t.format("%Y-%m-%d %H:%M:%S")),
        None => println!("{} not scheduled", "Next update:".green()),
    }
    println!("{} {}", "Running:".green(), state.is_running);
    if let Some(saved) = saved_config {
        println!(
            "{} every {} day(s) at {}",
            "Saved under:".cyan(),
            saved.update_days,
            saved.fixed_update_time
        );
    }
    Ok(())
}

fn handle_state_clear_command(config: &Config) -> Result<()> {
    info!("Clearing persisted state");

    let store = StateStore::new(&config.storage.state_file);
    if !store.exists() {
        println!("{}", "No state file to clear".yellow());
        return Ok(());
    }

    store.delete().context("Failed to delete state file")?;
    println!("{}", "State cleared; schedule will recalculate on next start".green());
    Ok(())
}

fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    run_application(&cli, &config)
}
