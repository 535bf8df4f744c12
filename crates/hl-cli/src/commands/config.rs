//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use hl_core::config::{self, ConfigFile};

fn resolve_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path)
}

/// Print the path of the config file in use
pub fn config_path(config_path: Option<&Path>) -> Result<()> {
    println!("{}", resolve_path(config_path).display());
    Ok(())
}

/// Show current configuration
pub fn config_show(config_path: Option<&Path>) -> Result<()> {
    let path = resolve_path(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Run 'hpc-link config init' to create one");
        return Ok(());
    }

    // Parse first so a broken file is reported rather than echoed
    let _: ConfigFile = config::load_config(&path)
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    print_info(&format!("Configuration file: {:?}", path));
    println!();

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    println!("{}", content);

    Ok(())
}

/// Write a commented default configuration
pub fn config_init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let config_file = resolve_path(config_path);

    if let Some(dir) = config_file.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {:?}", dir))?;
            print_success(&format!("Created config directory: {:?}", dir));
        }
    }

    if config_file.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", config_file));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    std::fs::write(&config_file, generate_default_config())
        .with_context(|| format!("Failed to write config file: {:?}", config_file))?;

    print_success(&format!("Created configuration file: {:?}", config_file));
    print_info("Set [cluster].host and username, then run 'hpc-link verify'");
    print_info("Passwords are read from HPC_LINK_PASSWORD and never stored");

    Ok(())
}

/// Generate default configuration content
fn generate_default_config() -> String {
    r#"# hpc-link configuration

[cluster]
# Login node of the cluster
host = ""
port = 22
# Defaults to the local login name
# username = "alice"
# Private key used when HPC_LINK_PASSWORD is not set
# private_key_path = "~/.ssh/id_ed25519"

[executor]
# Attempts per remote command, including the first
max_attempts = 3
# Attempt n waits n * retry_delay_ms before the next one
retry_delay_ms = 1000
# Seconds allowed for connect + authenticate
connect_timeout = 10

[tunnel]
# 127.0.0.1 port the inference server is reachable on
local_port = 5000
# Port the server listens on at the compute node
remote_port = 5000
# Path to hl-tunnel (defaults to the copy next to hpc-link, then $PATH)
# program = "/usr/local/bin/hl-tunnel"

[job]
model = "meta-llama/Meta-Llama-3-8B-Instruct"
partition = "kamiak"
cpus = 4
memory = "32G"
gres = "gpu:1"
time = "04:00:00"
modules = ["python3/3.13.1", "cuda/12.2.0"]
# Seconds between queue polls
poll_interval = 5
# scancel the job when the server is stopped
cancel_on_stop = false
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config: ConfigFile = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.cluster.port, 22);
        assert_eq!(config.executor.max_attempts, 3);
        assert_eq!(config.executor.retry_delay.as_millis(), 1000);
        assert_eq!(config.tunnel.local_port, 5000);
        assert_eq!(config.job.partition, "kamiak");
        assert_eq!(config.job.poll_interval.as_secs(), 5);
        assert!(!config.job.cancel_on_stop);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        config_init(Some(&path), false).unwrap();
        std::fs::write(&path, "# edited\n").unwrap();

        config_init(Some(&path), false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# edited\n");

        config_init(Some(&path), true).unwrap();
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .starts_with("# hpc-link configuration"));
    }
}
