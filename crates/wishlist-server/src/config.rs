use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub app_url: String,
    pub store_timeout: Duration,
    pub smtp: Option<SmtpConfig>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = var("WISHLIST_PORT", "5000")
            .parse()
            .context("WISHLIST_PORT must be a port number")?;
        let timeout_ms: u64 = var("WISHLIST_STORE_TIMEOUT_MS", "5000")
            .parse()
            .context("WISHLIST_STORE_TIMEOUT_MS must be milliseconds")?;
        if timeout_ms == 0 {
            bail!("WISHLIST_STORE_TIMEOUT_MS must be positive");
        }

        let smtp = match lookup("SMTP_HOST") {
            Some(host) => {
                let username = lookup("SMTP_USERNAME").context("SMTP_USERNAME is required with SMTP_HOST")?;
                let password = lookup("SMTP_PASSWORD").context("SMTP_PASSWORD is required with SMTP_HOST")?;
                let from = lookup("SMTP_FROM").unwrap_or_else(|| username.clone());
                Some(SmtpConfig {
                    host,
                    username,
                    password,
                    from,
                })
            }
            None => None,
        };

        Ok(Self {
            jwt_secret: var("WISHLIST_JWT_SECRET", "dev-secret-change-me"),
            db_path: PathBuf::from(var("WISHLIST_DB_PATH", "wishlist.db")),
            host: var("WISHLIST_HOST", "0.0.0.0"),
            port,
            app_url: var("WISHLIST_APP_URL", "http://localhost:5173"),
            store_timeout: Duration::from_millis(timeout_ms),
            smtp,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.db_path, PathBuf::from("wishlist.db"));
        assert_eq!(cfg.store_timeout, Duration::from_secs(5));
        assert_eq!(cfg.bind_addr().unwrap().to_string(), "0.0.0.0:5000");
        assert!(cfg.smtp.is_none());
    }

    #[test]
    fn overrides_and_bad_values() {
        let cfg = config(&[("WISHLIST_PORT", "8080"), ("WISHLIST_STORE_TIMEOUT_MS", "250")]).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.store_timeout, Duration::from_millis(250));

        assert!(config(&[("WISHLIST_PORT", "eighty")]).is_err());
        assert!(config(&[("WISHLIST_STORE_TIMEOUT_MS", "0")]).is_err());
    }

    #[test]
    fn smtp_needs_credentials() {
        assert!(config(&[("SMTP_HOST", "smtp.example.com")]).is_err());

        let cfg = config(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USERNAME", "bot@example.com"),
            ("SMTP_PASSWORD", "secret"),
        ])
        .unwrap();
        assert_eq!(cfg.smtp.unwrap().from, "bot@example.com");
    }
}
