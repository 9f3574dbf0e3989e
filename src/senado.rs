//! Client for the Senado Federal open-data legislation API.
//!
//! Every request made through one [`SenadoClient`] is paced so that at least
//! `min_interval` separates consecutive outbound calls, whichever task issues
//! them.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, error};

use crate::config::AppConfig;

pub const LIST_ENDPOINT: &str = "/legislacao/lista.json";

const USER_AGENT: &str = concat!("senado-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} responded with status {status}")]
    Status { endpoint: String, status: StatusCode },
    #[error("could not decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

pub type FetchResult<T> = Result<T, FetchError>;

/// Filters accepted by the list endpoint. Unset filters are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub act_type: Option<String>,
    pub number: Option<String>,
    pub year: Option<i32>,
    pub date: Option<String>,
}

impl ListParams {
    pub fn year(year: i32) -> Self {
        Self {
            year: Some(year),
            ..Self::default()
        }
    }

    pub fn act_type(act_type: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            act_type: Some(act_type.into()),
            year,
            ..Self::default()
        }
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(act_type) = &self.act_type {
            query.push(("tipo", act_type.clone()));
        }
        if let Some(number) = &self.number {
            query.push(("numero", number.clone()));
        }
        if let Some(year) = self.year {
            query.push(("ano", year.to_string()));
        }
        if let Some(date) = &self.date {
            query.push(("data", date.clone()));
        }
        query
    }
}

impl fmt::Display for ListParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .query()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        f.write_str(&parts.join("&"))
    }
}

/// Envelope returned by `/legislacao/lista.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiResponse {
    #[serde(rename = "ListaDocumento", default)]
    pub document_list: Option<DocumentList>,
}

impl ApiResponse {
    /// Absence of any level of the envelope means "no results".
    pub fn into_documents(self) -> Vec<ExternalDocument> {
        self.document_list
            .and_then(|list| list.documents)
            .map(|collection| collection.document)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentList {
    #[serde(rename = "Metadados", default)]
    pub metadata: Option<ApiMetadata>,
    #[serde(rename = "documentos", default)]
    pub documents: Option<DocumentCollection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiMetadata {
    #[serde(rename = "Versao", default)]
    pub version: Option<String>,
    #[serde(rename = "VersaoServico", default)]
    pub service_version: Option<String>,
    #[serde(rename = "DataVersaoServico", default)]
    pub service_version_date: Option<String>,
    #[serde(rename = "DescricaoDataSet", default)]
    pub dataset_description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentCollection {
    #[serde(rename = "documento", default, deserialize_with = "one_or_many")]
    pub document: Vec<ExternalDocument>,
}

/// One item of the list endpoint, exactly as the API spells it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExternalDocument {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub norma: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tipo: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub numero: Option<String>,
    #[serde(rename = "normaNome", default, deserialize_with = "lenient_string")]
    pub norma_nome: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub descricao: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ementa: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub dataassinatura: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub anoassinatura: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub apelido: Option<String>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<ExternalDocument>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<ExternalDocument>),
        One(Box<ExternalDocument>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::Many(documents)) => documents,
        Some(OneOrMany::One(document)) => vec![*document],
        None => Vec::new(),
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(value)) => Ok(Some(value)),
        Some(serde_json::Value::Number(value)) => Ok(Some(value.to_string())),
        Some(serde_json::Value::Bool(value)) => Ok(Some(value.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Source of legislation listings consumed by the sync orchestrator.
#[async_trait]
pub trait LegislationSource: Send + Sync + 'static {
    async fn fetch_list(&self, params: &ListParams) -> FetchResult<ApiResponse>;
}

/// Single-slot pacer: holds the timestamp of the last outbound request.
struct RequestPacer {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    async fn wait_turn(&self) {
        // The lock is held across the sleep so concurrent callers queue up.
        let mut last_request = self.last_request.lock().await;
        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}

pub struct SenadoClient {
    http: Client,
    base_url: String,
    pacer: RequestPacer,
}

impl SenadoClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        min_interval: Duration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pacer: RequestPacer::new(min_interval),
        })
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Self::new(
            config.senado_api_base_url.clone(),
            config.senado_api_timeout,
            config.senado_api_min_interval,
        )
    }

    async fn get(&self, endpoint: &str, query: &[(&str, String)]) -> FetchResult<ApiResponse> {
        self.pacer.wait_turn().await;

        let url = format!("{}{}", self.base_url, endpoint);
        debug!(%url, ?query, "requesting senado api");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(endpoint, %status, "senado api request failed");
            return Err(FetchError::Status {
                endpoint: endpoint.to_string(),
                status,
            });
        }

        response
            .json::<ApiResponse>()
            .await
            .map_err(|source| FetchError::Decode {
                endpoint: endpoint.to_string(),
                source,
            })
    }
}

#[async_trait]
impl LegislationSource for SenadoClient {
    async fn fetch_list(&self, params: &ListParams) -> FetchResult<ApiResponse> {
        self.get(LIST_ENDPOINT, &params.query()).await
    }
}
