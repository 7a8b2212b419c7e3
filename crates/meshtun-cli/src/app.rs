//! Interactive tunnel host
//!
//! Stands in for an OS service host: control lines arrive on stdin, are dispatched to the
//! session as host commands, and status events are printed by a listener thread as they
//! are broadcast. The engine and platform are the in-memory implementations from
//! `meshtun-harness`.

use crate::config::AppConfig;
use crate::error::{CliError, Result};
use meshtun_core::{StatusBroadcaster, StatusEvent, StatusReceiver, UiInterest};
use meshtun_harness::{EngineStatus, MemoryPlatform, MockEngineFactory};
use meshtun_runtime::{HostCommand, SessionBuilder, TunnelSession, WorkerHealth};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// What the control loop should do after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

// ----------------------------------------------------------------------------
// Tunnel Application
// ----------------------------------------------------------------------------

/// A session wired to in-memory collaborators
pub struct TunnelApp {
    session: TunnelSession,
    ui: Arc<UiInterest>,
}

impl TunnelApp {
    pub fn new(config: AppConfig) -> Result<Self> {
        let status = EngineStatus {
            routing_entries: config.demo.routing_entries,
            tree_report: config.demo.tree_report.clone(),
            ..EngineStatus::default()
        };
        let engines = if config.demo.loopback {
            MockEngineFactory::loopback(status)
        } else {
            MockEngineFactory::with_status(status)
        };
        let ui = Arc::new(UiInterest::new(config.ui.live_updates));

        let session = SessionBuilder::new(config.tunnel)
            .engine_factory(Arc::new(engines))
            .platform(Arc::new(MemoryPlatform::new()))
            .update_gate(ui.clone())
            .broadcaster(StatusBroadcaster::new(config.ui.event_capacity))
            .build()?;

        Ok(Self { session, ui })
    }

    pub fn session(&self) -> &TunnelSession {
        &self.session
    }

    pub fn subscribe(&self) -> StatusReceiver {
        self.session.subscribe()
    }

    /// Run the control loop until `quit` or end of input
    pub fn run<R: BufRead, W: Write>(&self, input: R, mut output: W) -> Result<()> {
        writeln!(output, "meshtun ready; type 'help' for commands")?;
        for line in input.lines() {
            let line = line?;
            match self.execute(&line, &mut output) {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(CliError::UnknownCommand(command)) => {
                    writeln!(output, "unknown command '{}'", command)?;
                }
                Err(e) => return Err(e),
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Execute one control line
    pub fn execute<W: Write>(&self, line: &str, output: &mut W) -> Result<Flow> {
        let line = line.trim();
        match line {
            "" => {}
            "quit" | "exit" => return Ok(Flow::Quit),
            "help" => writeln!(
                output,
                "commands: start stop toggle connect resume status health live on|off quit"
            )?,
            "status" => writeln!(output, "state: {}", self.session.state())?,
            "health" => {
                let health = self.session.health();
                if health.is_empty() {
                    writeln!(output, "no workers started")?;
                }
                for (kind, status) in health {
                    writeln!(output, "{}: {}", kind, describe_health(&status))?;
                }
            }
            "live on" => {
                self.ui.set(true);
                writeln!(output, "live updates on")?;
            }
            "live off" => {
                self.ui.set(false);
                writeln!(output, "live updates off")?;
            }
            other => {
                let command: HostCommand = other
                    .parse()
                    .map_err(|_| CliError::UnknownCommand(other.to_string()))?;
                let residency = self.session.dispatch(command);
                debug!("Host residency after {}: {:?}", command, residency);
                writeln!(output, "{} -> {}", command, self.session.state())?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Stop the session and reap its workers
    pub fn shutdown(&self) {
        self.session.stop();
        if !self.session.join_workers(SHUTDOWN_GRACE) {
            warn!("Some workers did not exit within {:?}", SHUTDOWN_GRACE);
        }
        info!("Tunnel host shut down");
    }
}

fn describe_health(health: &WorkerHealth) -> String {
    match health {
        WorkerHealth::Running => "running".to_string(),
        WorkerHealth::Exited(reason) => format!("exited ({})", reason),
        WorkerHealth::Failed(reason) => format!("failed ({})", reason),
    }
}

// ----------------------------------------------------------------------------
// Event Listener
// ----------------------------------------------------------------------------

/// Print every status event as a JSON line until the channel closes
pub fn spawn_event_printer(mut receiver: StatusReceiver) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("meshtun-events".to_string())
        .spawn(move || loop {
            match receiver.blocking_recv() {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => warn!("Missed {} status events", missed),
                Err(RecvError::Closed) => break,
            }
        })?;
    Ok(handle)
}

fn print_event(event: &StatusEvent) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Failed to render status event: {}", e),
    }
}
