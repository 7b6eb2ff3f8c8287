//! Configuration management for the proof service
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use starter_workflow::BusyPolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Where proofs are sent for independent verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainMode {
    /// In-process verifier bound to the same circuit and reference string
    #[default]
    Local,
    /// `eth_call` against a deployed verifier contract
    Rpc,
}

impl FromStr for ChainMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(ChainMode::Local),
            "rpc" => Ok(ChainMode::Rpc),
            other => anyhow::bail!("unknown chain mode '{}'", other),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    /// Circuit artifact to load instead of the bundled one
    pub circuit_path: Option<PathBuf>,

    /// Serialized reference string; a seeded development one is used if unset
    pub srs_path: Option<PathBuf>,

    pub srs_seed: u64,

    /// Worker threads per proving backend
    pub backend_threads: usize,

    pub chain_mode: ChainMode,

    pub chain_rpc_url: String,

    pub verifier_address: Option<String>,

    pub busy_policy: BusyPolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let config = Config {
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid API_PORT")?,

            circuit_path: env::var("CIRCUIT_PATH").ok().map(PathBuf::from),

            srs_path: env::var("SRS_PATH").ok().map(PathBuf::from),

            srs_seed: env::var("SRS_SEED")
                .unwrap_or_else(|_| "42".to_string())
                .parse()
                .context("Invalid SRS_SEED")?,

            backend_threads: env::var("BACKEND_THREADS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("Invalid BACKEND_THREADS")?,

            chain_mode: env::var("CHAIN_MODE")
                .unwrap_or_else(|_| "local".to_string())
                .parse()
                .context("Invalid CHAIN_MODE")?,

            chain_rpc_url: env::var("CHAIN_RPC_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8545".to_string()),

            verifier_address: env::var("VERIFIER_ADDRESS").ok(),

            busy_policy: env::var("BUSY_POLICY")
                .unwrap_or_else(|_| "reject".to_string())
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid BUSY_POLICY")?,
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than 0");
        }

        if self.backend_threads == 0 {
            anyhow::bail!("BACKEND_THREADS must be greater than 0");
        }

        if self.chain_mode == ChainMode::Rpc && self.verifier_address.is_none() {
            anyhow::bail!("VERIFIER_ADDRESS is required when CHAIN_MODE=rpc");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
            circuit_path: None,
            srs_path: None,
            srs_seed: 42,
            backend_threads: 4,
            chain_mode: ChainMode::Local,
            chain_rpc_url: "http://127.0.0.1:8545".to_string(),
            verifier_address: None,
            busy_policy: BusyPolicy::Reject,
        }
    }
}
