//! Command-line front end over the provisioning facade.

use crate::config::Config;
use crate::panel::{DataCap, Expiry};
use crate::provision::{ProvisioningFacade, ProvisioningRequest, sanitize_identity, unique_identity};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::process::ExitCode;

/// Issue VPN access keys on 3x-ui and Marzban panels
#[derive(Parser, Debug)]
#[command(name = "keysmith", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision keys for a customer according to a plan
    Create {
        /// Plan name from the config file
        plan: String,
        /// Customer name; sanitized and made unique
        name: String,
    },
    /// List inbounds on the tunnel panel
    Inbounds,
    /// Show a proxy panel user
    User {
        username: String,
    },
    /// List configured plans
    Plans,
}

pub async fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Commands::Create { plan, name } => create(&plan, &name).await,
        Commands::Inbounds => inbounds().await,
        Commands::User { username } => user(&username).await,
        Commands::Plans => plans(),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

async fn create(plan_name: &str, name: &str) -> Result<ExitCode> {
    let config = Config::load().context("Failed to load config")?;
    let plan = config.plan(plan_name)?;

    let now = now_secs();
    let identity = unique_identity(&sanitize_identity(name, now), now);
    let (backend, request) = ProvisioningRequest::from_plan(plan, identity)?;

    let facade = ProvisioningFacade::from_config(&config)?;
    let outcome = facade.provision(backend, &request).await;
    print!("{outcome}");

    if outcome.success_count() > 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn inbounds() -> Result<ExitCode> {
    let config = Config::load().context("Failed to load config")?;
    let facade = ProvisioningFacade::from_config(&config)?;
    let Some(client) = facade.tunnel() else {
        bail!("tunnel panel is not configured");
    };

    let inbounds = client.list_inbounds().await?;
    if inbounds.is_empty() {
        println!("No inbounds.");
    }
    for inbound in inbounds {
        let state = if inbound.enable { "" } else { "  (disabled)" };
        println!(
            "{:>4}  {:<24} {:<8} {}{state}",
            inbound.id, inbound.remark, inbound.protocol, inbound.port
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn user(username: &str) -> Result<ExitCode> {
    let config = Config::load().context("Failed to load config")?;
    let facade = ProvisioningFacade::from_config(&config)?;
    let Some(client) = facade.proxy() else {
        bail!("proxy panel is not configured");
    };

    let user = client.get_user(username).await?;
    println!("User:    {}", user.username);
    println!("Status:  {}", user.status.as_deref().unwrap_or("unknown"));
    let limit = DataCap::bytes(user.data_limit.unwrap_or_default());
    println!("Traffic: {} used of {limit}", DataCap::bytes(user.used_traffic));
    match user
        .expire
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
    {
        Some(at) => println!("Expires: {}", Expiry::at(at)),
        None => println!("Expires: never"),
    }
    if let Some(sub) = &user.subscription_url {
        println!("Sub:     {sub}");
    }
    for link in &user.links {
        println!("Key:     {link}");
    }
    Ok(ExitCode::SUCCESS)
}

fn plans() -> Result<ExitCode> {
    let config = Config::load().context("Failed to load config")?;
    if config.plans.is_empty() {
        println!("No plans configured in {}", Config::default_path().display());
        return Ok(ExitCode::SUCCESS);
    }
    for (name, plan) in &config.plans {
        println!(
            "{name}: {} key(s) on {}, {} device(s), {}, {} day(s)",
            plan.keys,
            plan.backend,
            plan.devices,
            DataCap::megabytes(plan.data_mb),
            plan.expiry_days
        );
        if let Some(description) = &plan.description {
            println!("    {description}");
        }
    }
    Ok(ExitCode::SUCCESS)
}
