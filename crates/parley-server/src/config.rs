use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use parley_api::admission::{AdmissionGate, Rate, SlidingWindowLimiter, Throttles, Unlimited};
use parley_types::models::UserId;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

const DEFAULT_SEND_RATE: &str = "20/min";
const DEFAULT_LOGIN_RATE: &str = "5/min";
const DEFAULT_REGISTER_RATE: &str = "3/min";

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// Per sender. `None` disables throttling, as for the two below.
    pub send_rate: Option<Rate>,
    /// Per client address.
    pub login_rate: Option<Rate>,
    /// Per client address.
    pub register_rate: Option<Rate>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("PARLEY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PARLEY_JWT_SECRET is unset or still a placeholder");
        }

        let host = lookup("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("PARLEY_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("PARLEY_PORT must be a port number")?;
        let db_path = lookup("PARLEY_DB_PATH")
            .unwrap_or_else(|| "parley.db".into())
            .into();

        let rate = |key: &str, default: &str| -> Result<Option<Rate>> {
            match lookup(key).as_deref().map(str::trim).unwrap_or(default) {
                "off" => Ok(None),
                raw => Ok(Some(raw.parse::<Rate>().with_context(|| format!("{key} is not a rate"))?)),
            }
        };
        let send_rate = rate("PARLEY_SEND_RATE", DEFAULT_SEND_RATE)?;
        let login_rate = rate("PARLEY_LOGIN_RATE", DEFAULT_LOGIN_RATE)?;
        let register_rate = rate("PARLEY_REGISTER_RATE", DEFAULT_REGISTER_RATE)?;

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            send_rate,
            login_rate,
            register_rate,
        })
    }

    pub fn throttles(&self) -> Throttles {
        Throttles {
            send: gate::<UserId>(self.send_rate),
            register: gate::<IpAddr>(self.register_rate),
            login: gate::<IpAddr>(self.login_rate),
        }
    }
}

fn gate<K>(rate: Option<Rate>) -> Arc<dyn AdmissionGate<K>>
where
    K: Eq + std::hash::Hash + Send + 'static,
{
    match rate {
        Some(rate) => Arc::new(SlidingWindowLimiter::<K>::new(rate)),
        None => Arc::new(Unlimited),
    }
}
