use serde::Deserialize;
use url::Url;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum StoreConfigError {
    #[error("invalid store url {0}: {1}")]
    InvalidUrl(String, String),
    #[error("store url must use http or https: {0}")]
    UnsupportedScheme(String),
    #[error("store password given without a username")]
    PasswordWithoutUsername,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreConfig {
    /// etcd v3 through its JSON gateway. Authentication is enabled when a
    /// username is configured.
    Etcd {
        url: String,
        username: Option<String>,
        password: Option<String>,
    },
    /// Process-local map. Pinnings do not survive a restart.
    Memory,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), StoreConfigError> {
        let StoreConfig::Etcd {
            url,
            username,
            password,
        } = self
        else {
            return Ok(());
        };

        let parsed =
            Url::parse(url).map_err(|e| StoreConfigError::InvalidUrl(url.clone(), e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StoreConfigError::UnsupportedScheme(url.clone()));
        }

        if password.is_some() && username.as_deref().is_none_or(str::is_empty) {
            return Err(StoreConfigError::PasswordWithoutUsername);
        }

        Ok(())
    }
}
