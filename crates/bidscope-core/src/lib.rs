//! Core domain model and error taxonomy for BIDSCOPE.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "bidscope-core";

/// Sentinel rendered for fields the upstream did not supply. Downstream
/// consumers never have to distinguish "key absent" from "key null".
pub const UNKNOWN: &str = "-";

/// The "no constraint" option value used by the Korean procurement UI.
pub const ALL_SENTINEL: &str = "전체";

/// Composite key of a procurement notice: agency-assigned number plus the
/// amendment/re-posting order (0 for the original posting).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeIdentity {
    pub notice_no: String,
    pub notice_ord: u32,
}

impl NoticeIdentity {
    pub fn new(notice_no: impl Into<String>, notice_ord: u32) -> Self {
        Self {
            notice_no: notice_no.into(),
            notice_ord,
        }
    }

    /// Identity given to rows the parser could not key, so operators see the
    /// gap instead of losing the row.
    pub fn placeholder() -> Self {
        Self {
            notice_no: UNKNOWN.to_string(),
            notice_ord: 0,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.notice_no == UNKNOWN
    }

    /// Display key with the order zero-padded to 3 digits, e.g.
    /// `R26BK01270659-001`. Comparison stays numeric; padding is render-only.
    pub fn display_key(&self) -> String {
        format!("{}-{:03}", self.notice_no, self.notice_ord)
    }
}

impl fmt::Display for NoticeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_key())
    }
}

/// Flattened notice record produced by the normalizer. Every field except the
/// identity defaults to [`UNKNOWN`]; `raw` keeps the full upstream item since
/// the agency sends undocumented extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeSummary {
    pub identity: NoticeIdentity,
    pub title: String,
    pub announcing_institution: String,
    pub demanding_institution: String,
    pub posted_at: String,
    pub closes_at: String,
    pub classification: String,
    #[serde(default)]
    pub raw: Map<String, Value>,
}

/// One classified field of a notice detail: raw value kept untouched,
/// display string formatted for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub key: String,
    pub label: String,
    pub value: Value,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub label: String,
}

/// Superset of a summary with fields bucketed for display. Buckets are
/// pairwise disjoint: a key claimed by amounts/schedule/qualifications never
/// reappears in `other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeDetail {
    pub summary: NoticeSummary,
    pub amounts: Vec<FieldEntry>,
    pub schedule: Vec<FieldEntry>,
    pub qualifications: Vec<FieldEntry>,
    pub attachments: Vec<Attachment>,
    pub other: Vec<FieldEntry>,
}

/// A single canonical query value: scalar or (filtered) list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    One(String),
    Many(Vec<String>),
}

impl QueryValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            QueryValue::One(s) => Some(s.as_str()),
            QueryValue::Many(_) => None,
        }
    }

    fn render(&self) -> String {
        match self {
            QueryValue::One(s) => s.clone(),
            QueryValue::Many(vs) => vs.join(","),
        }
    }
}

/// Canonical sanitized search query. Absence of a key means "unconstrained";
/// no key ever holds the all-sentinel, an empty string or an empty list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchQuery(BTreeMap<String, QueryValue>);

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), QueryValue::One(value.into()));
    }

    pub fn set_many(&mut self, key: &str, values: Vec<String>) {
        self.0.insert(key.to_string(), QueryValue::Many(values));
    }

    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(QueryValue::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &QueryValue)> {
        self.0.iter()
    }

    /// Stable textual form, used as cache key and attached to errors for
    /// operator reproducibility.
    pub fn canonical_string(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.render()))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_string())
    }
}

/// Free-form search request as the caller sends it, before sanitization.
/// Every field is optional; array elements may be null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSearchRequest {
    pub bid_ntce_no: Option<String>,
    pub bid_ntce_nm: Option<String>,
    pub inqry_div: Option<String>,
    pub from_bid_dt: Option<String>,
    pub to_bid_dt: Option<String>,
    pub bid_ntce_dtl_clsf_cd: Option<String>,
    pub instt_nm: Option<String>,
    pub ref_no: Option<String>,
    pub area: Option<String>,
    pub industry: Option<String>,
    pub from_est_price: Option<String>,
    pub to_est_price: Option<String>,
    pub exclude_deadline: Option<bool>,
    pub business_types: Option<Vec<Option<String>>>,
    pub business_statuses: Option<Vec<Option<String>>>,
}

/// Field-level disagreement between two snapshots of the same notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMismatch {
    pub notice_no: String,
    pub field: String,
    pub ours: String,
    pub theirs: String,
}

/// Outcome of comparing two independently obtained notice sets. Transient;
/// computed per run, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub ours: usize,
    pub theirs: usize,
    pub common: usize,
    pub only_ours: usize,
    pub only_theirs: usize,
    pub match_rate_percent: f64,
    pub only_ours_nos: Vec<String>,
    pub only_theirs_nos: Vec<String>,
    pub field_mismatches: Vec<FieldMismatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkEntry {
    pub user_id: String,
    pub notice_no: String,
    pub created_at: DateTime<Utc>,
}

/// Diagnostic metadata attached to every search execution, success or
/// partial failure, so the operator panel never special-cases "no metadata".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMeta {
    pub run_id: Uuid,
    pub from_cache: bool,
    pub total_count: u64,
    pub api_call_count: u32,
    pub successful_calls: u32,
    pub partial_failure: bool,
    pub warnings: Vec<String>,
    pub query: SearchQuery,
}

impl VerificationMeta {
    pub fn new(query: SearchQuery) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            from_cache: false,
            total_count: 0,
            api_call_count: 0,
            successful_calls: 0,
            partial_failure: false,
            warnings: Vec::new(),
            query,
        }
    }
}

/// Error taxonomy of the engine. Every variant carries the canonical query
/// that produced it and a short human-readable cause; nothing here is fatal
/// to the process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// No response reached us at all. Recoverable by caller retry.
    #[error("network error for [{query}]: {cause}")]
    Network { query: String, cause: String },
    /// HTTP 5xx or 404 from upstream, treated as transient.
    #[error("upstream unavailable (HTTP {status}) for [{query}]: {cause}")]
    UpstreamUnavailable {
        status: u16,
        query: String,
        cause: String,
    },
    /// The request itself is malformed; retrying without changing the query
    /// cannot help.
    #[error("invalid request (HTTP {status}) for [{query}]: {cause}")]
    InvalidRequest {
        status: u16,
        query: String,
        cause: String,
    },
    /// Mutating bookmark operation without a session.
    #[error("authentication required: {0}")]
    AuthRequired(String),
    /// A response arrived but matched no known envelope shape. Fails open.
    #[error("response degraded for [{query}]: {cause}")]
    ParseDegraded { query: String, cause: String },
}

impl EngineError {
    /// Whether a caller retry with backoff is worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Network { .. } | EngineError::UpstreamUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_key_is_zero_padded_to_three_digits() {
        let original = NoticeIdentity::new("R26BK01270659", 0);
        let amended = NoticeIdentity::new("R26BK01270659", 1);
        assert_eq!(original.display_key(), "R26BK01270659-000");
        assert_eq!(amended.display_key(), "R26BK01270659-001");
        assert_ne!(original, amended);
    }

    #[test]
    fn identity_equality_is_composite() {
        let a = NoticeIdentity::new("20260101", 2);
        let b = NoticeIdentity::new("20260101", 2);
        let c = NoticeIdentity::new("20260102", 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn canonical_string_is_ordered_and_stable() {
        let mut q = SearchQuery::new();
        q.set("inqryDiv", "1");
        q.set("bidNtceNm", "부산");
        q.set_many("businessTypes", vec!["물품".into(), "공사".into()]);
        assert_eq!(
            q.canonical_string(),
            "bidNtceNm=부산&businessTypes=물품,공사&inqryDiv=1"
        );
    }

    #[test]
    fn raw_request_deserializes_from_camel_case_json() {
        let raw: RawSearchRequest = serde_json::from_str(
            r#"{"bidNtceNo":"", "bidNtceDtlClsfCd":"전체", "inqryDiv":"1",
                "businessTypes":["전체", null]}"#,
        )
        .unwrap();
        assert_eq!(raw.bid_ntce_no.as_deref(), Some(""));
        assert_eq!(raw.inqry_div.as_deref(), Some("1"));
        assert_eq!(raw.business_types.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn retryable_split_follows_taxonomy() {
        let net = EngineError::Network {
            query: "inqryDiv=1".into(),
            cause: "timeout".into(),
        };
        let bad = EngineError::InvalidRequest {
            status: 400,
            query: "inqryDiv=1".into(),
            cause: "bad date".into(),
        };
        assert!(net.is_retryable());
        assert!(!bad.is_retryable());
    }
}
