use anyhow::Result;
use oxtrap_agent::cli::{Command, USAGE};
use oxtrap_agent::config::TrapConfig;
use oxtrap_agent::scheduler::RuleScheduler;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprint!("{USAGE}");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("oxtrap=info".parse()?))
        .init();

    let command = Command::parse(std::env::args().skip(1)).inspect_err(|_| print_usage())?;

    match command {
        Command::CheckConfig { config_path } => run_check_config(&config_path),
        Command::Help => {
            print_usage();
            Ok(())
        }
        Command::Version => {
            print_version();
            Ok(())
        }
        Command::Run { config_path } => run_agent(&config_path).await,
    }
}

#[allow(clippy::print_stdout)]
fn print_version() {
    println!("oxtrap {}", env!("CARGO_PKG_VERSION"));
}

#[allow(clippy::print_stdout)]
fn run_check_config(config_path: &str) -> Result<()> {
    let config = TrapConfig::load(config_path)?;
    let root = config.validate()?;

    println!("oid_root:  {root}");
    println!("receivers: {}", config.receivers.len());
    for receiver in &config.receivers {
        println!("  {:<16} {}", receiver.id, receiver.endpoint());
    }
    println!("rules:     {}", config.rules.len());
    for rule in &config.rules {
        println!(
            "  {:<16} {} every {}s ({}) -> {}",
            rule.id,
            root.join(&rule.oid),
            rule.interval,
            rule.value_type,
            rule.receivers.join(", ")
        );
    }
    for (rule_id, receiver_id) in config.dangling_receivers() {
        println!("warning: rule '{rule_id}' references unknown receiver '{receiver_id}'");
    }
    Ok(())
}

async fn run_agent(config_path: &str) -> Result<()> {
    let config = TrapConfig::load(config_path)?;
    tracing::info!(config = config_path, "oxtrap starting");

    let mut scheduler = RuleScheduler::with_defaults(config)?;
    scheduler.start().await;

    signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully");
    scheduler.stop().await;

    Ok(())
}
