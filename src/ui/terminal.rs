use std::sync::Arc;
use std::time::Duration;
use futures::channel::mpsc::UnboundedReceiver;
use futures::StreamExt;
use log::{debug, error, info};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio::spawn;
use tokio::task::JoinHandle;

use crate::device::events::{DeviceEvent, EventKind};
use crate::device::treadmill::Treadmill;
use crate::device::types::DeviceState;
use crate::error::AppRunError;
use crate::session::types::{ReportWindow, SessionSummary};
use crate::ui::types::{UserCommand, HELP_TEXT};

pub fn format_speed(speed: u8) -> String {
    format!("Speed: < {} >", f64::from(speed) / 16.0)
}

pub fn format_status(state: &DeviceState) -> String {
    if !state.running {
        return String::from("Stopped. Press [Enter] to start");
    }

    match &state.stats {
        Some(stats) => format!(
            "Running. {} | distance {} | time {} | steps {} | Press [Enter] to stop",
            format_speed(state.current_speed),
            stats.distance,
            humantime::format_duration(Duration::from_secs(u64::from(stats.elapsed_time))),
            stats.steps,
        ),
        None => format!("Running. {} | Press [Enter] to stop", format_speed(state.current_speed)),
    }
}

pub fn format_summary(window: ReportWindow, summary: &SessionSummary) -> String {
    format!(
        "{}: {} sessions | distance {} | time {} | steps {}",
        window.label(),
        summary.sessions,
        summary.distance,
        humantime::format_duration(Duration::from_secs(summary.duration)),
        summary.steps,
    )
}

async fn print_report(treadmill: &Treadmill, window: ReportWindow) {
    match treadmill.recorder().aggregate(window).await {
        Ok(summary) => println!("{}", format_summary(window, &summary)),
        Err(err) => error!("Failed to aggregate sessions: {}", err),
    }
}

// Renders every bus event. Ends when all subscriptions are removed.
fn print_events_task(treadmill: Arc<Treadmill>, mut events: UnboundedReceiver<DeviceEvent>) -> JoinHandle<()> {
    spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                DeviceEvent::LinkEstablished => println!("Connected to treadmill"),
                DeviceEvent::SpeedChanged(speed) => println!("{}", format_speed(speed)),
                DeviceEvent::StatusUpdated => println!("{}", format_status(&treadmill.snapshot())),
                DeviceEvent::SessionCreated(record) => {
                    println!(
                        "Session saved: distance {} | time {} | steps {}",
                        record.distance,
                        humantime::format_duration(Duration::from_secs(u64::from(record.duration))),
                        record.steps,
                    );
                    print_report(&treadmill, ReportWindow::Today).await;
                },
            }
        }

        debug!("Event printer stopped");
    })
}

async fn toggle(treadmill: &Treadmill) {
    if treadmill.snapshot().running {
        match treadmill.stop().await {
            Ok(_) => {},
            Err(err) => error!("Failed to stop: {}", err),
        }
    } else {
        match treadmill.run().await {
            Ok(()) => println!("{}", format_status(&treadmill.snapshot())),
            Err(err) => error!("Failed to run: {}", err),
        }
    }
}

async fn shutdown(treadmill: &Treadmill) {
    if treadmill.snapshot().running {
        if let Err(err) = treadmill.stop().await {
            error!("Failed to stop before quitting: {}", err);
        }
    }

    if let Err(err) = treadmill.disconnect().await {
        error!("Failed to disconnect: {}", err);
    }
}

/// Reads one command per line from stdin until `quit` or end of input.
///
/// Command failures are reported and the loop continues; only reading stdin can fail the loop.
pub async fn run_terminal(treadmill: Arc<Treadmill>) -> Result<(), AppRunError> {
    let (subscriptions, events) = treadmill.events().subscribe_channel(&EventKind::ALL);
    let printer = print_events_task(treadmill.clone(), events);

    println!("{}", format_status(&treadmill.snapshot()));
    println!("Type \"help\" for a list of commands");

    let mut lines = BufReader::new(stdin()).lines();
    let result = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("End of input");
                break Ok(());
            },
            Err(err) => break Err(AppRunError::from(err)),
        };

        match UserCommand::parse(&line) {
            UserCommand::Toggle => toggle(&treadmill).await,
            UserCommand::Faster => {
                if let Err(err) = treadmill.increase_speed().await {
                    error!("Failed to increase speed: {}", err);
                }
            },
            UserCommand::Slower => {
                if let Err(err) = treadmill.decrease_speed().await {
                    error!("Failed to decrease speed: {}", err);
                }
            },
            UserCommand::Stats => {
                if let Err(err) = treadmill.get_stats().await {
                    error!("Failed to fetch stats: {}", err);
                }
            },
            UserCommand::Report(window) => print_report(&treadmill, window).await,
            UserCommand::Help => println!("{}", HELP_TEXT),
            UserCommand::Quit => break Ok(()),
            UserCommand::Unknown(input) => println!("Unknown command {:?}, type \"help\" for a list of commands", input),
        }
    };

    shutdown(&treadmill).await;

    for id in subscriptions {
        treadmill.events().unsubscribe(id);
    }
    if let Err(err) = printer.await {
        error!("Event printer failed: {}", err);
    }

    result
}
