//! HTTP client for the Korean public procurement notice service.
//!
//! One list-search operation per notice category, JSON responses, no
//! automatic retry: a failed call is classified and handed back to the
//! caller, which owns retry policy.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info_span, Instrument};

use bidscope_core::{EngineError, QueryValue, SearchQuery};

pub const CRATE_NAME: &str = "bidscope-client";

const DEFAULT_BASE_URL: &str = "https://apis.data.go.kr/1230000/ad/BidPublicInfoService";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PAGE_SIZE: u32 = 50;
const DEFAULT_CONCURRENCY: usize = 3;

/// Canonical-label → upstream-wire-key aliases. Everything not listed here
/// goes over the wire under its canonical name.
const WIRE_ALIASES: &[(&str, &str)] = &[("fromBidDt", "inqryBgnDt"), ("toBidDt", "inqryEndDt")];

/// Keys that steer local post-processing and must never reach upstream.
const APP_LEVEL_KEYS: &[&str] = &["excludeDeadline"];

/// Notice categories of the upstream service, one list operation each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeCategory {
    Goods,
    Services,
    Construction,
}

impl NoticeCategory {
    pub const ALL: [NoticeCategory; 3] = [
        NoticeCategory::Goods,
        NoticeCategory::Services,
        NoticeCategory::Construction,
    ];

    pub fn operation(&self) -> &'static str {
        match self {
            NoticeCategory::Goods => "getBidPblancListInfoThngPPSSrch",
            NoticeCategory::Services => "getBidPblancListInfoSvcPPSSrch",
            NoticeCategory::Construction => "getBidPblancListInfoCnstwkPPSSrch",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NoticeCategory::Goods => "물품",
            NoticeCategory::Services => "용역",
            NoticeCategory::Construction => "공사",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub service_key: String,
    pub timeout: Duration,
    pub page_size: u32,
    pub user_agent: Option<String>,
    pub concurrency: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            service_key: String::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            page_size: DEFAULT_PAGE_SIZE,
            user_agent: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl UpstreamConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = env::var("BIDSCOPE_BASE_URL") {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }
        if let Ok(key) = env::var("BIDSCOPE_SERVICE_KEY") {
            config.service_key = key;
        }
        if let Ok(secs) = env::var("BIDSCOPE_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.timeout = Duration::from_secs(secs.max(1));
            }
        }
        if let Ok(rows) = env::var("BIDSCOPE_PAGE_SIZE") {
            if let Ok(rows) = rows.parse::<u32>() {
                config.page_size = rows.clamp(1, 999);
            }
        }
        config
    }
}

/// Classified outcome of one upstream call, before the canonical query is
/// attached. `into_engine` lifts it into the shared taxonomy.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream unavailable (HTTP {status})")]
    Unavailable { status: u16 },
    #[error("invalid request (HTTP {status}): {body}")]
    Invalid { status: u16, body: String },
    #[error("unparseable response body: {0}")]
    Unparseable(String),
}

impl CallError {
    pub fn into_engine(self, query: &SearchQuery) -> EngineError {
        let query = query.canonical_string();
        match self {
            CallError::Network(cause) => EngineError::Network { query, cause },
            CallError::Unavailable { status } => EngineError::UpstreamUnavailable {
                status,
                query,
                cause: "upstream returned a transient failure".to_string(),
            },
            CallError::Invalid { status, body } => EngineError::InvalidRequest {
                status,
                query,
                cause: body,
            },
            CallError::Unparseable(cause) => EngineError::ParseDegraded { query, cause },
        }
    }
}

/// Non-success HTTP status → call error. 404 counts as unavailable because
/// the agency gateway serves it for temporarily unroutable operations.
pub fn classify_status(status: StatusCode, body_snippet: &str) -> CallError {
    if status.is_server_error() || status == StatusCode::NOT_FOUND {
        CallError::Unavailable {
            status: status.as_u16(),
        }
    } else {
        CallError::Invalid {
            status: status.as_u16(),
            body: body_snippet.chars().take(200).collect(),
        }
    }
}

/// Seam for the upstream service so the engine and the web layer can run
/// against canned responses in tests.
#[async_trait]
pub trait BidApi: Send + Sync {
    /// Fetch one page of one category's notice list. Returns the raw JSON
    /// envelope untouched; normalization happens downstream.
    async fn fetch_list(
        &self,
        category: NoticeCategory,
        page_no: u32,
        query: &SearchQuery,
    ) -> Result<Value, CallError>;
}

#[derive(Debug)]
pub struct UpstreamClient {
    client: reqwest::Client,
    config: UpstreamConfig,
    limit: Arc<Semaphore>,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;
        let limit = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Ok(Self {
            client,
            config,
            limit,
        })
    }

    /// Wire key for a canonical label, applying the alias table.
    fn wire_key(label: &str) -> &str {
        WIRE_ALIASES
            .iter()
            .find(|(from, _)| *from == label)
            .map(|(_, to)| *to)
            .unwrap_or(label)
    }

    /// Wire query pairs for one page request. App-level keys are filtered
    /// out here, not in the sanitizer, so the canonical query stays whole.
    fn wire_pairs(&self, page_no: u32, query: &SearchQuery) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("ServiceKey".to_string(), self.config.service_key.clone()),
            ("pageNo".to_string(), page_no.to_string()),
            ("numOfRows".to_string(), self.config.page_size.to_string()),
            ("type".to_string(), "json".to_string()),
        ];
        for (key, value) in query.iter() {
            if APP_LEVEL_KEYS.contains(&key.as_str()) {
                continue;
            }
            let wire = Self::wire_key(key).to_string();
            match value {
                QueryValue::One(v) => pairs.push((wire, v.clone())),
                QueryValue::Many(vs) => pairs.push((wire, vs.join(","))),
            }
        }
        pairs
    }
}

#[async_trait]
impl BidApi for UpstreamClient {
    async fn fetch_list(
        &self,
        category: NoticeCategory,
        page_no: u32,
        query: &SearchQuery,
    ) -> Result<Value, CallError> {
        let _permit = self
            .limit
            .acquire()
            .await
            .map_err(|_| CallError::Network("client shut down".to_string()))?;

        let url = format!("{}/{}", self.config.base_url, category.operation());
        let pairs = self.wire_pairs(page_no, query);

        let span = info_span!("upstream_fetch", operation = category.operation(), page_no);
        async {
            let response = self
                .client
                .get(&url)
                .query(&pairs)
                .send()
                .await
                .map_err(|err| CallError::Network(err.to_string()))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|err| CallError::Network(err.to_string()))?;

            if !status.is_success() {
                return Err(classify_status(status, &body));
            }

            // The agency gateway is known to return HTML error pages with
            // HTTP 200; treat any non-JSON body as a degraded response.
            serde_json::from_str(&body).map_err(|err| {
                CallError::Unparseable(format!(
                    "expected JSON, got {}: {}",
                    body.chars().take(80).collect::<String>(),
                    err
                ))
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_maps_to_a_distinct_operation() {
        let ops: Vec<&str> = NoticeCategory::ALL.iter().map(|c| c.operation()).collect();
        assert_eq!(ops.len(), 3);
        assert!(ops.contains(&"getBidPblancListInfoThngPPSSrch"));
        assert!(ops.contains(&"getBidPblancListInfoSvcPPSSrch"));
        assert!(ops.contains(&"getBidPblancListInfoCnstwkPPSSrch"));
    }

    #[test]
    fn status_classification_matches_taxonomy() {
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "bad date"),
            CallError::Invalid { status: 400, .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, ""),
            CallError::Unavailable { status: 404 }
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            CallError::Unavailable { status: 502 }
        ));
        assert!(matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            CallError::Unavailable { status: 500 }
        ));
    }

    #[test]
    fn wire_pairs_alias_dates_and_hold_back_app_level_keys() {
        let client = UpstreamClient::new(UpstreamConfig {
            service_key: "test-key".to_string(),
            ..UpstreamConfig::default()
        })
        .unwrap();

        let mut query = SearchQuery::new();
        query.set("fromBidDt", "202601010000");
        query.set("toBidDt", "202601312359");
        query.set("excludeDeadline", "true");
        query.set("bidNtceNm", "도로");

        let pairs = client.wire_pairs(2, &query);
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();

        assert!(keys.contains(&"inqryBgnDt"));
        assert!(keys.contains(&"inqryEndDt"));
        assert!(keys.contains(&"bidNtceNm"));
        assert!(!keys.contains(&"fromBidDt"));
        assert!(!keys.contains(&"excludeDeadline"));
        assert!(pairs.contains(&("pageNo".to_string(), "2".to_string())));
        assert!(pairs.contains(&("type".to_string(), "json".to_string())));
    }

    #[test]
    fn call_errors_lift_into_the_shared_taxonomy() {
        let mut query = SearchQuery::new();
        query.set("inqryDiv", "1");

        let lifted = CallError::Unparseable("html page".to_string()).into_engine(&query);
        assert!(matches!(lifted, EngineError::ParseDegraded { .. }));

        let lifted = CallError::Network("timeout".to_string()).into_engine(&query);
        match lifted {
            EngineError::Network { query, .. } => assert_eq!(query, "inqryDiv=1"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
