use std::{
    env,
    net::{IpAddr, SocketAddr},
    path::Path,
};

use anyhow::{anyhow, Context, Result};
use blob_store::BlobStorageConfig;
use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

const LOCAL_ENV: &str = "local";

/// Replaces `allowed_ips` when set. Comma or colon separated.
pub const ALLOWED_IPS_ENV: &str = "ALLOWED_IPS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default = "default_listen_addr_grpc")]
    pub listen_addr_grpc: String,
    /// Peer addresses allowed to call the file service.
    #[serde(default = "default_allowed_ips")]
    pub allowed_ips: Vec<String>,
    /// Optional path to additionally write logs to, rotated daily.
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default)]
    pub blob_storage: BlobStorageConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            env: default_env(),
            listen_addr_grpc: default_listen_addr_grpc(),
            allowed_ips: default_allowed_ips(),
            log_file: None,
            blob_storage: Default::default(),
        }
    }
}

fn default_env() -> String {
    LOCAL_ENV.to_string()
}

fn default_listen_addr_grpc() -> String {
    "0.0.0.0:8901".to_string()
}

fn default_allowed_ips() -> Vec<String> {
    vec!["127.0.0.1".to_string(), "::1".to_string()]
}

impl ServerConfig {
    /// Loads the config file at `path`, or the defaults when there is none,
    /// then applies environment overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<ServerConfig> {
        let config = match path {
            Some(path) => {
                let config_str = std::fs::read_to_string(path)
                    .with_context(|| format!("unable to read config file {}", path.display()))?;
                Self::from_yaml_str(&config_str)?
            }
            None => ServerConfig::default(),
        };
        config.resolve(env::var(ALLOWED_IPS_ENV).ok().as_deref())
    }

    fn from_yaml_str(config_str: &str) -> Result<ServerConfig> {
        let config: ServerConfig = Figment::new().merge(Yaml::string(config_str)).extract()?;
        Ok(config)
    }

    fn resolve(mut self, allowed_ips_override: Option<&str>) -> Result<ServerConfig> {
        if let Some(value) = allowed_ips_override {
            self.allowed_ips = parse_ip_list(value);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_addr_grpc.parse::<SocketAddr>().is_err() {
            return Err(anyhow!(
                "invalid listen address grpc: {}",
                self.listen_addr_grpc
            ));
        }
        if self.allowed_ips.is_empty() {
            return Err(anyhow!("allowed_ips cannot be empty"));
        }
        self.allowed_ip_addrs()?;
        if let Some(log_file) = &self.log_file {
            if Path::new(log_file).file_name().is_none() {
                return Err(anyhow!("invalid log file path: {}", log_file));
            }
        }
        self.blob_storage.validate()?;
        Ok(())
    }

    pub fn allowed_ip_addrs(&self) -> Result<Vec<IpAddr>> {
        self.allowed_ips
            .iter()
            .map(|ip| {
                ip.parse::<IpAddr>()
                    .map_err(|e| anyhow!("invalid allowed ip {:?}: {}", ip, e))
            })
            .collect()
    }

    pub fn structured_logging(&self) -> bool {
        self.env != LOCAL_ENV
    }
}

/// Splits an allow-list given as a single string.
///
/// Commas always separate entries. Without commas a colon separates entries,
/// unless the whole value is a single IPv6 address.
fn parse_ip_list(value: &str) -> Vec<String> {
    let value = value.trim();
    let entries: Vec<&str> = if value.contains(',') {
        value.split(',').collect()
    } else if value.parse::<IpAddr>().is_ok() {
        vec![value]
    } else {
        value.split(':').collect()
    };
    entries
        .into_iter()
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(String::from)
        .collect()
}
