//! `run`: start the agent and keep it up until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use headlink_core::store::{SETTING_CUSTOM_COLOR, SETTING_OPERATOR_NAME};
use headlink_core::{
    Agent, DesktopNotifier, HeadsetTransport, MemoryStore, MonitorEvent, SimulatedTransport,
};

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;

use super::Location;

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let location = Location::resolve(global);
    let config = location.load()?;
    let mut agent_config = headlink_config::to_agent_config(&config, &location.base_dir)?;
    if args.simulate {
        agent_config.monitor.simulation = true;
    }

    // No hardware backend is compiled in; the simulated headset stands in.
    let transport: Arc<dyn HeadsetTransport> =
        Arc::new(SimulatedTransport::new(agent_config.monitor.simulation_tick));
    let store = Arc::new(MemoryStore::with_settings([
        (SETTING_OPERATOR_NAME, config.operator.name.as_str()),
        (SETTING_CUSTOM_COLOR, config.operator.color.as_str()),
    ]));

    let agent = Agent::new(&agent_config, transport, store, Arc::new(DesktopNotifier))?;
    let mut events = agent.monitor().subscribe();
    agent.start().await?;
    if !global.quiet {
        eprintln!("headlink running, press Ctrl-C to stop");
    }

    let result = supervise(&agent, &mut events, args.report.map(Duration::from_secs)).await;

    agent.shutdown().await?;
    result
}

async fn supervise(
    agent: &Agent,
    events: &mut broadcast::Receiver<MonitorEvent>,
    report: Option<Duration>,
) -> Result<(), CliError> {
    let mut ticker = report.filter(|d| !d.is_zero()).map(tokio::time::interval);

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("interrupt received, shutting down");
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
            () = tick(ticker.as_mut()) => {
                println!("{}", serde_json::to_string(&agent.monitor().telemetry())?);
            }
        }
    }
}

async fn tick(ticker: Option<&mut tokio::time::Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn log_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::DeviceAttached(d) => {
            tracing::info!(device_id = d.id, name = %d.name, serial = %d.serial_number, "headset attached");
        }
        MonitorEvent::DeviceDetached(d) => {
            tracing::info!(device_id = d.id, name = %d.name, "headset detached");
        }
        MonitorEvent::Button(b) => {
            tracing::debug!(device_id = b.device_id, button = %b.button, pressed = b.pressed, "button");
        }
        MonitorEvent::Battery { device_id, status } => {
            tracing::debug!(device_id, level = ?status.level, charging = status.is_charging, "battery");
        }
        MonitorEvent::StatusChanged(status) => {
            tracing::info!(%status, "connection status changed");
        }
    }
}
