//! `realityctl query` — query a running daemon through its REST API.

use std::path::Path;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use uuid::Uuid;

use crate::client::RealityClient;
use crate::config;
use crate::domain::types::{
    BandwidthPeriod, BandwidthQuery, FleetHealth, HealthReport, PerNodeStatistics,
};

#[derive(Subcommand)]
pub enum QueryCommands {
    /// Fleet traffic totals and host counts
    Stats,
    /// Bandwidth per period
    Bandwidth {
        /// today, last7Days, last30Days or currentMonth
        #[arg(long)]
        period: Option<BandwidthPeriod>,
        /// Restrict to a single node
        #[arg(long)]
        node: Option<String>,
    },
    /// Per-node statistics
    Nodes,
    /// Fleet health
    Health,
    /// Raw Prometheus metrics per node
    Metrics,
    /// Generate x25519 keypairs on the daemon
    Keypairs,
    /// List hosts, or show one by id
    Hosts {
        id: Option<Uuid>,
    },
}

pub fn run(
    url: Option<&str>,
    config_path: Option<&Path>,
    format: &str,
    command: &QueryCommands,
) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(url, config_path, format, command))
}

async fn run_async(
    url: Option<&str>,
    config_path: Option<&Path>,
    format: &str,
    command: &QueryCommands,
) -> Result<()> {
    let client = match url {
        Some(url) => RealityClient::for_addr(url)?,
        None => RealityClient::for_addr(&config::load(config_path)?.daemon.http_addr)?,
    };
    let json = format == "json";

    match command {
        QueryCommands::Stats => print_json(&client.stats().await?),
        QueryCommands::Bandwidth { period, node } => {
            let query = BandwidthQuery {
                period: *period,
                node_id: node.clone(),
            };
            print_json(&client.bandwidth(&query).await?)
        }
        QueryCommands::Nodes => {
            let nodes = client.nodes().await?;
            if json {
                print_json(&nodes)
            } else {
                print_nodes(&nodes);
                Ok(())
            }
        }
        QueryCommands::Health => {
            let health = client.health().await?;
            if json {
                print_json(&health)
            } else {
                print_health(&health);
                Ok(())
            }
        }
        QueryCommands::Metrics => {
            let metrics = client.metrics().await?;
            if json {
                return print_json(&metrics);
            }
            for entry in metrics {
                println!("{} {}", "#".dimmed(), entry.node_id.bold());
                print!("{}", entry.metrics);
                if !entry.metrics.ends_with('\n') {
                    println!();
                }
            }
            Ok(())
        }
        QueryCommands::Keypairs => print_json(&client.keypairs().await?),
        QueryCommands::Hosts { id } => match id {
            Some(id) => print_json(&client.host(*id).await?),
            None => print_json(&client.hosts().await?),
        },
    }
}

fn print_json<T: serde::Serialize>(data: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

fn print_health(health: &HealthReport) {
    let status = match health.status {
        FleetHealth::Healthy => "HEALTHY".green().bold(),
        FleetHealth::Degraded => "DEGRADED".red().bold(),
    };
    println!("fleet:  {} ({} nodes)", status, health.node_count);
    if health.node_count == 0 {
        println!("  {}", "no nodes registered".dimmed());
    }
    for node in &health.failed_nodes {
        println!("  {} {}", "!!".red().bold(), node);
    }
    for missing in &health.missing_payloads {
        let kinds: Vec<&str> = missing.kinds.iter().map(|k| k.as_str()).collect();
        println!(
            "  {} {} missing {}",
            "::".yellow().bold(),
            missing.node_id,
            kinds.join(", ")
        );
    }
    if health.deadline_exceeded {
        println!("  {}", "aggregation deadline exceeded".yellow());
    }
}

fn print_nodes(nodes: &[PerNodeStatistics]) {
    if nodes.is_empty() {
        println!("{}", "no nodes registered".dimmed());
        return;
    }
    for node in nodes {
        let icon = if node.reachable {
            "ok".green().bold()
        } else {
            "!!".red().bold()
        };
        match &node.stats {
            Some(s) => println!(
                "  {} {:<20} sent={} recv={} conns={} users={}",
                icon, node.node_id, s.bytes_sent, s.bytes_received, s.connections, s.users_online
            ),
            None => println!("  {} {:<20} {}", icon, node.node_id, "no stats".dimmed()),
        }
        for err in &node.errors {
            println!("       {}", err.dimmed());
        }
    }
}
