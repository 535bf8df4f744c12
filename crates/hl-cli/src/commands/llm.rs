//! Talking to the inference server through the tunnel

use anyhow::{Context as _, Result};

use hl_core::config::ConfigFile;
use hl_orchestrator::inference::InferenceClient;

use crate::output::{format_health, print_success};

fn client(config: &ConfigFile) -> Result<InferenceClient> {
    Ok(InferenceClient::new(config.tunnel.local_url())?)
}

pub async fn ask(config: &ConfigFile, message: &str) -> Result<()> {
    let reply = client(config)?
        .query(message)
        .await
        .context("Query failed; is `hpc-link serve` running?")?;
    println!("{}", reply.response);
    Ok(())
}

pub async fn reset(config: &ConfigFile) -> Result<()> {
    client(config)?
        .reset()
        .await
        .context("Failed to reset conversation context")?;
    print_success("Conversation context cleared");
    Ok(())
}

pub async fn health(config: &ConfigFile) -> Result<()> {
    let client = client(config)?;
    let health = client
        .health()
        .await
        .context("Health check failed; is `hpc-link serve` running?")?;
    print!("{}", format_health(client.base_url(), &health));
    Ok(())
}
