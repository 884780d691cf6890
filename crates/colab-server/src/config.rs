//! Server configuration: flag defaults overridable from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub db_path: PathBuf,
    /// Public origin used in emailed links.
    pub origin: String,
    /// Marks cookies `Secure`; off for local development.
    pub secure_cookies: bool,
    pub allow_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3001".parse().expect("valid default addr"),
            db_path: default_db_path(),
            origin: "http://localhost:5173".to_string(),
            secure_cookies: false,
            allow_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

impl Config {
    /// Defaults, then environment overrides (`COLAB_*`).
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(listen) = std::env::var("COLAB_LISTEN") {
            config.listen = listen
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid COLAB_LISTEN value {listen:?}: {e}"))?;
        }
        if let Ok(path) = std::env::var("COLAB_DB") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(origin) = std::env::var("COLAB_ORIGIN") {
            config.origin = origin;
        }
        if let Ok(value) = std::env::var("COLAB_SECURE_COOKIES") {
            config.secure_cookies = value == "1" || value.eq_ignore_ascii_case("true");
        }
        if let Ok(origins) = std::env::var("COLAB_ALLOW_ORIGINS") {
            config.allow_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
        }

        Ok(config)
    }
}

fn default_db_path() -> PathBuf {
    if let Ok(data_dir) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_dir).join("colab").join("colab.db");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/share/colab/colab.db");
    }
    PathBuf::from("colab.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_local_dev_friendly() {
        let config = Config::default();
        assert_eq!(config.listen.port(), 3001);
        assert!(!config.secure_cookies);
        assert!(config.origin.starts_with("http://localhost"));
    }
}
