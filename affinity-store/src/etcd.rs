//! Affinity store backed by etcd v3, spoken through its JSON gateway.
//!
//! Keys and values travel base64-encoded. When a username is configured a
//! bearer token is obtained from `/v3/auth/authenticate` before the first
//! data operation and reused until a data operation is rejected with 401.

use crate::AffinityStore;
use crate::auth::TokenCache;
use crate::metrics_defs::{STORE_AUTH_REQUESTS, STORE_REQUEST_FAILURES};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::FutureExt;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::counter;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store authentication failed")]
    Authentication,
    #[error("store rejected the auth token")]
    Unauthorized,
    #[error("store returned status {0}")]
    Http(StatusCode),
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("could not decode stored value: {0}")]
    Decode(String),
}

#[derive(Clone)]
struct Credentials {
    name: String,
    password: String,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    name: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Serialize)]
struct KeyRequest {
    key: String,
}

#[derive(Serialize)]
struct PutRequest {
    key: String,
    value: String,
}

// The gateway omits empty fields, so a miss has no `kvs` at all.
#[derive(Deserialize)]
struct RangeResponse {
    #[serde(default)]
    kvs: Vec<KeyValue>,
}

#[derive(Deserialize)]
struct KeyValue {
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct Ignored {}

pub struct EtcdStore {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
    tokens: TokenCache,
}

impl EtcdStore {
    pub fn new(base_url: String, username: Option<String>, password: Option<String>) -> Self {
        let credentials = username
            .filter(|name| !name.is_empty())
            .map(|name| Credentials {
                name,
                password: password.unwrap_or_default(),
            });

        EtcdStore {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            tokens: TokenCache::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Reads `key`, distinguishing a miss (`Ok(None)`) from a failure.
    pub async fn try_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let response: RangeResponse = self
            .post(
                "/v3/kv/range",
                &KeyRequest {
                    key: STANDARD.encode(key),
                },
            )
            .await?;

        let Some(kv) = response.kvs.into_iter().next() else {
            return Ok(None);
        };

        let bytes = STANDARD
            .decode(kv.value)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    pub async fn try_put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _: Ignored = self
            .post(
                "/v3/kv/put",
                &PutRequest {
                    key: STANDARD.encode(key),
                    value: STANDARD.encode(value),
                },
            )
            .await?;
        Ok(())
    }

    pub async fn try_delete(&self, key: &str) -> Result<(), StoreError> {
        let _: Ignored = self
            .post(
                "/v3/kv/deleterange",
                &KeyRequest {
                    key: STANDARD.encode(key),
                },
            )
            .await?;
        Ok(())
    }

    /// Returns the token to send, `None` when the store runs without auth.
    async fn token(&self) -> Result<Option<String>, StoreError> {
        let Some(credentials) = self.credentials.clone() else {
            return Ok(None);
        };

        let client = self.client.clone();
        let url = self.endpoint("/v3/auth/authenticate");

        self.tokens
            .get_or_acquire(move || {
                async move { request_token(&client, &url, &credentials).await }.boxed()
            })
            .await
            .map(Some)
            .ok_or(StoreError::Authentication)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, StoreError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.token().await?;

        let mut request = self.client.post(self.endpoint(path)).json(body);
        if let Some(token) = &token {
            request = request.header(AUTHORIZATION, token.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            if let Some(token) = &token {
                self.tokens.invalidate(token);
            }
            return Err(StoreError::Unauthorized);
        }
        if !status.is_success() {
            return Err(StoreError::Http(status));
        }

        Ok(response.json::<T>().await?)
    }
}

async fn request_token(
    client: &reqwest::Client,
    url: &str,
    credentials: &Credentials,
) -> Option<String> {
    tracing::info!(user = %credentials.name, "Requesting store auth token");

    let result = async {
        let response = client
            .post(url)
            .json(&AuthRequest {
                name: &credentials.name,
                password: &credentials.password,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Http(status));
        }

        Ok::<_, StoreError>(response.json::<AuthResponse>().await?.token)
    }
    .await;

    match result {
        Ok(token) => {
            counter!(STORE_AUTH_REQUESTS, "outcome" => "success").increment(1);
            tracing::info!("Obtained store auth token");
            Some(token)
        }
        Err(e) => {
            counter!(STORE_AUTH_REQUESTS, "outcome" => "failure").increment(1);
            tracing::error!(error = %e, "Store authentication failed");
            None
        }
    }
}

#[async_trait]
impl AffinityStore for EtcdStore {
    async fn get(&self, key: &str) -> Option<String> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(e) => {
                counter!(STORE_REQUEST_FAILURES, "op" => "get").increment(1);
                tracing::warn!(key = %key, error = %e, "Store get failed, treating as missing");
                None
            }
        }
    }

    async fn put(&self, key: &str, value: &str) -> bool {
        match self.try_put(key, value).await {
            Ok(()) => true,
            Err(e) => {
                counter!(STORE_REQUEST_FAILURES, "op" => "put").increment(1);
                tracing::error!(key = %key, error = %e, "Store put failed");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        match self.try_delete(key).await {
            Ok(()) => true,
            Err(e) => {
                counter!(STORE_REQUEST_FAILURES, "op" => "delete").increment(1);
                tracing::error!(key = %key, error = %e, "Store delete failed");
                false
            }
        }
    }
}
