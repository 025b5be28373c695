use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};

use crate::{commands, settings::SettingsUpdate, AppState};

/// How long shutdown waits for an in-flight refresh.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "equipsync")]
#[command(
    version,
    about = "Keeps a categorized snapshot of portal equipment data fresh",
    long_about = None
)]
pub struct Cli {
    /// Settings file; missing keys fall back to defaults
    #[arg(long, global = true, default_value = "settings.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Refresh on a timer and accept console commands (default)
    Serve,
    /// Run one refresh and print the snapshot as JSON
    Scrape,
    /// Report whether the saved cookies still authenticate
    Probe,
    /// Forget the saved session cookies
    ClearCookies,
}

/// A line typed on the `serve` console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Refresh,
    Status,
    Interval(u64),
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let argument = words.next();
        match (command.as_str(), argument) {
            ("refresh", None) => Ok(ConsoleCommand::Refresh),
            ("status", None) => Ok(ConsoleCommand::Status),
            ("quit" | "exit", None) => Ok(ConsoleCommand::Quit),
            ("interval", Some(minutes)) => minutes
                .parse()
                .map(ConsoleCommand::Interval)
                .map_err(|_| format!("not a number of minutes: '{minutes}'")),
            ("interval", None) => Err("usage: interval <minutes>".into()),
            _ => Err(format!(
                "unknown command '{}' (try refresh, status, interval <minutes>, quit)",
                line.trim()
            )),
        }
    }
}

pub async fn execute(cli: Cli) -> Result<()> {
    let state = AppState::new(cli.config.clone())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&state).await?,
        Command::Scrape => scrape(&state).await?,
        Command::Probe => {
            let authenticated = commands::probe_session(&state)
                .await
                .context("probing portal session")?;
            println!(
                "{}",
                if authenticated { "authenticated" } else { "not authenticated" }
            );
        }
        Command::ClearCookies => {
            commands::clear_cookies(&state)
                .await
                .context("clearing cookies")?;
            println!("cookies cleared");
        }
    }

    Ok(())
}

async fn scrape(state: &AppState) -> Result<()> {
    let outcome = state.pipeline.run_once().await;
    state.close_session().await;

    let snapshot = match outcome {
        Some(result) => result.context("refresh failed")?,
        None => bail!("a refresh is already running"),
    };
    println!("{}", serde_json::to_string_pretty(&*snapshot)?);
    Ok(())
}

async fn serve(state: &AppState) -> Result<()> {
    let period = state.settings.current().refresh_interval()?;

    let mut updates = state.store.subscribe();
    let subscriber = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(snapshot) => log::info!(
                    "snapshot v{} published: {} instruments, {} docking stations",
                    snapshot.version,
                    snapshot.instruments.len(),
                    snapshot.docking_stations.len()
                ),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("snapshot subscriber lagged, {skipped} update(s) skipped")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    state.scheduler.start(period).await;
    log::info!("serving; console commands: refresh, status, interval <minutes>, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut console_open = true;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    log::error!("failed to listen for ctrl-c: {err}");
                }
                break;
            }
            line = lines.next_line(), if console_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if !handle_console_line(state, &line).await {
                        break;
                    }
                }
                Ok(None) => {
                    log::info!("console closed; stop with ctrl-c");
                    console_open = false;
                }
                Err(err) => {
                    log::warn!("console read failed: {err}");
                    console_open = false;
                }
            }
        }
    }

    state.scheduler.shutdown(SHUTDOWN_GRACE).await;
    state.close_session().await;
    subscriber.abort();
    Ok(())
}

/// Returns false when the console asked to quit.
async fn handle_console_line(state: &AppState, line: &str) -> bool {
    match ConsoleCommand::parse(line) {
        Ok(ConsoleCommand::Refresh) => {
            let ack = commands::refresh_now(state);
            println!("{}", serde_json::json!(ack));
        }
        Ok(ConsoleCommand::Status) => {
            let health = commands::health(state).await;
            match serde_json::to_string_pretty(&health) {
                Ok(json) => println!("{json}"),
                Err(err) => log::error!("could not render status: {err}"),
            }
        }
        Ok(ConsoleCommand::Interval(minutes)) => {
            let update = SettingsUpdate {
                refresh_interval_minutes: Some(minutes),
                ..Default::default()
            };
            match commands::update_settings(state, update).await {
                Ok(applied) => println!(
                    "refresh interval is now {} minute(s)",
                    applied.refresh_interval_minutes
                ),
                Err(err) => println!("{err}"),
            }
        }
        Ok(ConsoleCommand::Quit) => return false,
        Err(message) => println!("{message}"),
    }
    true
}
