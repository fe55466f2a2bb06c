// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printscout: find IPP printers on the local network.
//
// Entry point. Initialises logging, loads configuration, and runs either a
// timed discovery session or a one-off hostname probe.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use printscout_core::DiscoveryConfig;
use printscout_core::error::Result;
use printscout_discovery::{
    ConnectivityMonitor, Discovery, DiscoverySession, EndpointProber, IppCapabilityCache,
    ManualDiscovery, MdnsDiscovery, PrinterInfo, ProbeOutcome, RosterEvent,
};

/// printscout: discover and probe network printers.
#[derive(Debug, Parser)]
#[command(name = "printscout", version, about, long_about = None)]
struct Cli {
    /// JSON configuration file. Defaults apply to anything it leaves out.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watch for printers and print roster changes.
    Discover {
        /// How long to run before tearing the session down.
        #[arg(long, default_value_t = 10)]
        seconds: u64,

        /// Hostname or address to add as a manual printer first. Repeatable.
        #[arg(long = "host")]
        hosts: Vec<String>,
    },
    /// Find the IPP endpoint of a printer by hostname.
    Probe {
        /// Hostname or address of the printer.
        host: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => DiscoveryConfig::load(path)?,
        None => DiscoveryConfig::default(),
    };
    let fetcher = Arc::new(IppCapabilityCache::new(config.probe_timeout()));

    match cli.command {
        Command::Discover { seconds, hosts } => {
            discover(fetcher, &config, Duration::from_secs(seconds), &hosts).await
        }
        Command::Probe { host } => probe(fetcher, &config, &host).await,
    }
}

async fn discover(
    fetcher: Arc<IppCapabilityCache>,
    config: &DiscoveryConfig,
    duration: Duration,
    hosts: &[String],
) -> Result<()> {
    let monitor = ConnectivityMonitor::spawn(config.connectivity_poll());
    let manual = Arc::new(
        ManualDiscovery::new(Arc::clone(&fetcher), config).with_connectivity(monitor.subscribe()),
    );
    for host in hosts {
        match manual.add_manual_printer(host).await {
            Ok(outcome) => report_probe(host, &outcome),
            Err(e) => warn!(host = %host, error = %e, "cannot add printer"),
        }
    }
    let priority = manual
        .saved_printers()
        .iter()
        .map(|s| s.printer.id())
        .collect();

    let mut backends: Vec<Arc<dyn Discovery>> = vec![manual as Arc<dyn Discovery>];
    let mdns = match MdnsDiscovery::new() {
        Ok(mdns) => {
            let mdns = Arc::new(mdns);
            backends.push(mdns.clone());
            Some(mdns)
        }
        Err(e) => {
            warn!(error = %e, "mDNS unavailable; only manual printers will be found");
            None
        }
    };

    let (session, mut events) = DiscoverySession::spawn(fetcher, backends, config);
    session.start(priority)?;
    info!(seconds = duration.as_secs(), "discovering printers");

    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            event = events.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
        }
    }

    session.destroy().await?;
    // The session held the other references; shut the daemon down cleanly.
    if let Some(mdns) = mdns.and_then(Arc::into_inner) {
        mdns.shutdown()?;
    }
    Ok(())
}

async fn probe(
    fetcher: Arc<IppCapabilityCache>,
    config: &DiscoveryConfig,
    host: &str,
) -> Result<()> {
    let prober = EndpointProber::new(fetcher, config.endpoint_templates.clone());
    let outcome = prober.probe(host).await?;
    report_probe(host, &outcome);
    Ok(())
}

fn report_probe(host: &str, outcome: &ProbeOutcome) {
    match outcome {
        ProbeOutcome::Found { printer, supported } => {
            println!("{host}: found {} at {}", printer.name, printer.path);
            if let Some(uuid) = &printer.uuid {
                println!("  uuid: {uuid}");
            }
            if !supported {
                println!("  printer does not accept any supported document format");
            }
        }
        ProbeOutcome::NotFound => println!("{host}: no printer found"),
    }
}

fn print_event(event: &RosterEvent) {
    match event {
        RosterEvent::Added(infos) => infos.iter().for_each(print_info),
        RosterEvent::Removed(ids) => {
            for id in ids {
                println!("- {id}");
            }
        }
    }
}

fn print_info(info: &PrinterInfo) {
    println!("+ {} [{:?}] {}", info.name, info.status, info.id);
    println!("  {}", info.description);
    if let Some(location) = &info.location {
        println!("  location: {location}");
    }
}
