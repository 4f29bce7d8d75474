use std::time::Duration;

use pingops_common::error::{PingOpsError, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    #[default]
    NorthAmerica,
    Europe,
    Canada,
    AsiaPacific,
}

impl Region {
    pub fn from_code(code: &str) -> Result<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "" | "NA" | "COM" => Ok(Self::NorthAmerica),
            "EU" => Ok(Self::Europe),
            "CA" => Ok(Self::Canada),
            "AP" | "ASIA" => Ok(Self::AsiaPacific),
            other => Err(PingOpsError::InvalidInput(format!(
                "unknown PingOne region: {other}"
            ))),
        }
    }

    fn tld(&self) -> &'static str {
        match self {
            Self::NorthAmerica => "com",
            Self::Europe => "eu",
            Self::Canada => "ca",
            Self::AsiaPacific => "asia",
        }
    }

    pub fn api_url(&self) -> String {
        format!("https://api.pingone.{}/v1", self.tld())
    }

    pub fn auth_url(&self) -> String {
        format!("https://auth.pingone.{}", self.tld())
    }
}

#[derive(Debug, Clone)]
pub struct PingOneConfig {
    pub environment_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub api_url: String,
    pub auth_url: String,
    pub population_id: Option<String>,
    pub request_timeout: Duration,
}

impl PingOneConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let optional = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |name: &str| {
            optional(name).ok_or_else(|| {
                PingOpsError::InvalidInput(format!("{name} must be set"))
            })
        };

        let region = Region::from_code(optional("PINGONE_REGION").as_deref().unwrap_or(""))?;
        let api_url = match optional("PINGONE_API_URL") {
            Some(value) => normalize_url(&value)?,
            None => region.api_url(),
        };
        let auth_url = match optional("PINGONE_AUTH_URL") {
            Some(value) => normalize_url(&value)?,
            None => region.auth_url(),
        };
        let timeout_secs = match optional("PINGONE_TIMEOUT_SECS") {
            Some(value) => value.parse::<u64>().map_err(|_| {
                PingOpsError::InvalidInput(format!(
                    "PINGONE_TIMEOUT_SECS must be a whole number of seconds, got {value}"
                ))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            environment_id: required("PINGONE_ENVIRONMENT_ID")?,
            client_id: required("PINGONE_CLIENT_ID")?,
            client_secret: required("PINGONE_CLIENT_SECRET")?,
            api_url,
            auth_url,
            population_id: optional("PINGONE_POPULATION_ID"),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn users_url(&self) -> String {
        format!("{}/environments/{}/users", self.api_url, self.environment_id)
    }

    pub fn token_url(&self) -> String {
        format!("{}/{}/as/token", self.auth_url, self.environment_id)
    }
}

fn normalize_url(value: &str) -> Result<String> {
    let parsed = url::Url::parse(value)
        .map_err(|err| PingOpsError::InvalidInput(format!("invalid url {value}: {err}")))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}
