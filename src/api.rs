//! REST host directory.
//!
//! The dashboard's REST API is an external collaborator; only host list and
//! host detail are consumed here, to learn which hosts to open channels for
//! and what to call them.

use async_trait::async_trait;
use hostdeck_common::HostId;
use reqwest::Url;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::errors::DirectoryError;

/// One host as listed by `GET {api}/hosts/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    #[serde(deserialize_with = "host_id_from_number_or_string")]
    pub id: HostId,
    pub name: String,
    /// Address of the managed server.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub last_update: Option<String>,
    #[serde(default)]
    pub last_commit: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
}

fn host_id_from_number_or_string<'de, D>(deserializer: D) -> Result<HostId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => HostId::from(n),
        RawId::Text(s) => HostId::from(s),
    })
}

#[async_trait]
pub trait HostDirectory: Send + Sync {
    async fn list_hosts(&self) -> Result<Vec<HostRecord>, DirectoryError>;

    async fn get_host(&self, id: &HostId) -> Result<HostRecord, DirectoryError>;
}

/// `reqwest` client for the dashboard REST API.
#[derive(Debug, Clone)]
pub struct RestDirectory {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl RestDirectory {
    /// `base_url` is the API root, e.g. `http://localhost:8000/api/`.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, DirectoryError> {
        let mut base =
            Url::parse(base_url).map_err(|e| DirectoryError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(DirectoryError::InvalidUrl(base_url.to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn hosts_url(&self, id: Option<&HostId>) -> Result<Url, DirectoryError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| DirectoryError::InvalidUrl(self.base.to_string()))?;
            segments.pop_if_empty().push("hosts");
            if let Some(id) = id {
                segments.push(id.as_str());
            }
            segments.push("");
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, DirectoryError> {
        debug!(url = %url, "GET");
        let mut request = self.client.get(url.clone()).header(ACCEPT, "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl HostDirectory for RestDirectory {
    async fn list_hosts(&self) -> Result<Vec<HostRecord>, DirectoryError> {
        let url = self.hosts_url(None)?;
        self.get_json(url).await
    }

    async fn get_host(&self, id: &HostId) -> Result<HostRecord, DirectoryError> {
        let url = self.hosts_url(Some(id))?;
        self.get_json(url).await
    }
}
