use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::warn;

use signoff_core::domain::UserId;

use crate::api::DEFAULT_BASE_URL;

/// Resolves user ids to human-readable names for audit summaries and
/// notification text. Resolution is best-effort: failures fall back to the
/// mention token, which Slack still renders as a name.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn display_name(&self, user: &UserId) -> String;
}

pub struct HttpDirectory {
    client: reqwest::Client,
    bot_token: SecretString,
    base_url: String,
    cache: Mutex<HashMap<UserId, String>>,
}

#[derive(Deserialize)]
struct UsersInfoResponse {
    ok: bool,
    #[serde(default)]
    user: Option<UserInfo>,
}

#[derive(Deserialize)]
struct UserInfo {
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl HttpDirectory {
    pub fn new(bot_token: SecretString) -> Self {
        Self::with_base_url(bot_token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(bot_token: SecretString, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, bot_token, base_url: base_url.into(), cache: Mutex::new(HashMap::new()) }
    }

    async fn lookup(&self, user: &UserId) -> Option<String> {
        let url = format!("{}/users.info", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.bot_token.expose_secret())
            .query(&[("user", user.0.as_str())])
            .send()
            .await
            .ok()?;
        let body: UsersInfoResponse = response.json().await.ok()?;
        if !body.ok {
            return None;
        }
        let info = body.user?;
        info.real_name.filter(|name| !name.is_empty()).or(info.name)
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn display_name(&self, user: &UserId) -> String {
        if let Some(name) = self.cache.lock().await.get(user) {
            return name.clone();
        }
        match self.lookup(user).await {
            Some(name) => {
                self.cache.lock().await.insert(user.clone(), name.clone());
                name
            }
            None => {
                warn!(event_name = "directory.lookup_failed", user_id = %user, "falling back to mention token");
                user.mention()
            }
        }
    }
}

/// Fixed id-to-name map for tests; anything unmapped falls back to the
/// mention token.
#[derive(Default)]
pub struct StaticDirectory {
    names: HashMap<UserId, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, user: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(UserId(user.into()), name.into());
        self
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn display_name(&self, user: &UserId) -> String {
        self.names.get(user).cloned().unwrap_or_else(|| user.mention())
    }
}
