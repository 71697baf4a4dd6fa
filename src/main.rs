//! Waikāne Monitoring Service
//!
//! Refreshes every configured source on a fixed interval and, optionally,
//! serves the indicator panel as JSON:
//! 1. Loads settings from the environment and sources from sources.toml
//! 2. Subscribes every source to the refresh scheduler
//! 3. Serves GET /health, /indicator, /source/{id}, /alerts when asked
//!
//! Usage:
//!   cargo run --release                     # Refresh loop only
//!   cargo run --release -- --endpoint 8080  # Refresh loop + HTTP endpoint
//!   cargo run --release -- --once           # One refresh, print the panel, exit
//!
//! Environment:
//!   WAIKANE_API_BASE, NWS_ALERTS_URL, NWS_ALERT_ZONE, HTTP_TIMEOUT_SECS,
//!   REFRESH_INTERVAL_SECS, CACHE_TTL_SECS, SOURCES_PATH, WORKER_THREADS,
//!   RUST_LOG

use std::env;
use std::error::Error;

use tracing::info;

use waikane_monitor::analysis::events::describe;
use waikane_monitor::config::{load_sources, ServiceConfig};
use waikane_monitor::endpoint;
use waikane_monitor::hst::format_hst_short;
use waikane_monitor::ingest::nws::WeatherAlert;
use waikane_monitor::logging;
use waikane_monitor::model::SourceState;
use waikane_monitor::monitor::{IndicatorPanel, Monitor};
use waikane_monitor::scheduler::{Scheduler, SchedulerConfig, Subscription};

struct Args {
    endpoint_port: Option<u16>,
    once: bool,
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("waikane_monitor");
    let usage = format!("Usage: {} [--endpoint PORT] [--once]", program);

    let mut parsed = Args {
        endpoint_port: None,
        once: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--endpoint" => {
                let port = args
                    .get(i + 1)
                    .and_then(|p| p.parse().ok())
                    .ok_or_else(|| format!("--endpoint requires a port number\n{}", usage))?;
                parsed.endpoint_port = Some(port);
                i += 2;
            }
            "--once" => {
                parsed.once = true;
                i += 1;
            }
            other => return Err(format!("Unknown argument: {}\n{}", other, usage)),
        }
    }
    Ok(parsed)
}

fn main() -> Result<(), Box<dyn Error>> {
    logging::init("info");

    let args = parse_args()?;
    let config = ServiceConfig::from_env()?;
    let registry = load_sources(&config.sources_path)?;
    info!(
        sources = registry.sources.len(),
        api_base = %config.api_base,
        "configuration loaded"
    );

    let monitor = Monitor::new(config.clone(), registry)?;

    if args.once {
        monitor.refresh_all();
        let _ = monitor.refresh_alerts();
        print_panel(&monitor.indicator(), &monitor.alerts());
        return Ok(());
    }

    let scheduler = Scheduler::start(
        monitor.clone(),
        SchedulerConfig {
            interval: config.refresh_interval(),
            include_alerts: true,
        },
    );
    let _subscriptions: Vec<Subscription> = monitor
        .registry()
        .ids()
        .into_iter()
        .map(|id| scheduler.subscribe(id))
        .collect();

    match args.endpoint_port {
        Some(port) => endpoint::start_endpoint_server(port, monitor)?,
        None => loop {
            std::thread::park();
        },
    }

    scheduler.stop();
    Ok(())
}

fn print_panel(panel: &IndicatorPanel, alerts: &[WeatherAlert]) {
    println!("Overall: {} ({})", panel.label, panel.overall);
    println!("As of {}\n", format_hst_short(&panel.generated_at));

    for source in &panel.sources {
        match &source.state {
            SourceState::Ready(reading) => {
                let resolution = &reading.resolution;
                let value = resolution
                    .current_value()
                    .map(|v| format!("{:.2} {}", v, reading.unit))
                    .unwrap_or_else(|| "N/A".to_string());
                let stale = if reading.stale { " (stale)" } else { "" };
                println!(
                    "  {:<18} {:>12}  {:<8} {}{}",
                    source.name,
                    value,
                    resolution.direction.to_string(),
                    resolution.classification.status_label(),
                    stale
                );
                if let Some(event) = &reading.next_tide {
                    println!("  {:<18} next: {}", "", describe(event));
                }
            }
            SourceState::NoData(detail) => println!("  {:<18} no data: {}", source.name, detail),
            SourceState::Error(detail) => println!("  {:<18} error: {}", source.name, detail),
            SourceState::Loading => println!("  {:<18} loading", source.name),
        }
    }

    if !alerts.is_empty() {
        println!("\nActive alerts:");
        for alert in alerts {
            println!("  {} [{}]", alert.event, alert.severity);
        }
    }
}
