use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use serde_yaml;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "blogo")]
#[command(about = "Runs the blogo article service", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,

    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".blogo")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_static_dir")]
    static_dir: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    8081
}

fn default_static_dir() -> String {
    "./static".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for App {
    fn default() -> Self {
        App {
            port: default_port(),
            static_dir: default_static_dir(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl App {
    pub fn get_port(&self) -> u16 {
        return self.port;
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn get_static_dir(&self) -> &str {
        return &self.static_dir;
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Store {
    #[serde(default = "default_database")]
    database: String,
    #[serde(default = "default_collection")]
    collection: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_database() -> String {
    "blogo".to_string()
}

fn default_collection() -> String {
    "article".to_string()
}

impl Default for Store {
    fn default() -> Self {
        Store {
            database: default_database(),
            collection: default_collection(),
            url: None,
            auth_token: None,
        }
    }
}

impl Store {
    pub fn get_database(&self) -> &str {
        return &self.database;
    }

    pub fn get_collection(&self) -> &str {
        return &self.collection;
    }

    /// Remote url and token, when both are set to something non-empty.
    pub fn remote(&self) -> Option<(&str, &str)> {
        let url = self.url.as_deref().filter(|s| !s.is_empty())?;
        let token = self.auth_token.as_deref().filter(|s| !s.is_empty())?;
        Some((url, token))
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub store: Store,
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let cfg = Config::load_config(path)?;
        Ok(cfg)
    }

    /// Loads `path` if it exists, otherwise falls back to the built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let path = path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("config path is not valid utf-8: {:?}", path))?;
            return Config::new(path);
        }
        Ok(Config::default())
    }

    fn load_config(path: &str) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)?;
        Config::from_yaml(&yaml_str)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Config> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                // ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!(var = %var_name, "environment variable not found");
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok(result)
    }
}
