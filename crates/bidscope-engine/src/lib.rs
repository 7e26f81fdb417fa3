//! Search orchestration: parameter sanitizing, category fan-out with
//! verification metadata, snapshot reconciliation and the bookmark index.

use std::collections::{HashMap, HashSet};
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{info_span, warn, Instrument};

use bidscope_client::{BidApi, CallError, NoticeCategory};
use bidscope_core::{
    BookmarkEntry, EngineError, FieldMismatch, NoticeDetail, NoticeIdentity, NoticeSummary,
    RawSearchRequest, ReconciliationResult, SearchQuery, VerificationMeta, ALL_SENTINEL,
};
use bidscope_normalize::{identity_from_item, normalize_items, standardize_detail, summary_from_item, total_count};

pub const CRATE_NAME: &str = "bidscope-engine";

const DEFAULT_CACHE_TTL_SECS: u64 = 600;
const DEFAULT_RECOMMENDED_SPAN_DAYS: i64 = 93;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache_ttl: Duration,
    pub recommended_span_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            recommended_span_days: DEFAULT_RECOMMENDED_SPAN_DAYS,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(secs) = env::var("BIDSCOPE_CACHE_TTL_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.cache_ttl = Duration::from_secs(secs);
            }
        }
        if let Ok(days) = env::var("BIDSCOPE_RECOMMENDED_SPAN_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                config.recommended_span_days = days.max(1);
            }
        }
        config
    }
}

fn cleaned(input: &Option<String>) -> Option<String> {
    input.as_ref().and_then(|s| {
        let trimmed = s.trim();
        (!trimmed.is_empty() && trimmed != ALL_SENTINEL).then(|| trimmed.to_string())
    })
}

/// 8-digit dates expand to 12 with the given suffix; 12-digit stamps pass
/// through (keeps the mapping idempotent); anything else is dropped.
fn expand_date(input: &Option<String>, suffix: &str) -> Option<String> {
    let value = cleaned(input)?;
    if !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match value.len() {
        8 => Some(format!("{value}{suffix}")),
        12 => Some(value),
        _ => None,
    }
}

/// Price bounds keep only clean non-negative integers, commas and spaces
/// stripped.
fn clean_price(input: &Option<String>) -> Option<String> {
    let value = cleaned(input)?;
    let stripped: String = value.chars().filter(|c| !matches!(*c, ',' | ' ')).collect();
    stripped.parse::<u64>().ok().map(|n| n.to_string())
}

fn clean_list(input: &Option<Vec<Option<String>>>) -> Option<Vec<String>> {
    let values: Vec<String> = input
        .as_ref()?
        .iter()
        .filter_map(|v| cleaned(v))
        .collect();
    (!values.is_empty()).then_some(values)
}

/// Map a free-form request to the canonical query. Total and idempotent:
/// malformed fields degrade to omission, never to an error, and the
/// inquiry-division and deadline-exclusion keys are always present.
pub fn sanitize(raw: &RawSearchRequest) -> SearchQuery {
    let mut query = SearchQuery::new();

    query.set("inqryDiv", cleaned(&raw.inqry_div).unwrap_or_else(|| "1".to_string()));
    query.set(
        "excludeDeadline",
        if raw.exclude_deadline.unwrap_or(true) { "true" } else { "false" },
    );

    let scalars = [
        ("bidNtceNo", &raw.bid_ntce_no),
        ("bidNtceNm", &raw.bid_ntce_nm),
        ("bidNtceDtlClsfCd", &raw.bid_ntce_dtl_clsf_cd),
        ("insttNm", &raw.instt_nm),
        ("refNo", &raw.ref_no),
        ("area", &raw.area),
        ("industry", &raw.industry),
    ];
    for (key, value) in scalars {
        if let Some(value) = cleaned(value) {
            query.set(key, value);
        }
    }

    if let Some(from) = expand_date(&raw.from_bid_dt, "0000") {
        query.set("fromBidDt", from);
    }
    if let Some(to) = expand_date(&raw.to_bid_dt, "2359") {
        query.set("toBidDt", to);
    }
    if let Some(from) = clean_price(&raw.from_est_price) {
        query.set("fromEstPrice", from);
    }
    if let Some(to) = clean_price(&raw.to_est_price) {
        query.set("toEstPrice", to);
    }
    if let Some(types) = clean_list(&raw.business_types) {
        query.set_many("businessTypes", types);
    }
    if let Some(statuses) = clean_list(&raw.business_statuses) {
        query.set_many("businessStatuses", statuses);
    }

    query
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchPage {
    pub page_no: u32,
}

impl Default for SearchPage {
    fn default() -> Self {
        Self { page_no: 1 }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub items: Vec<NoticeSummary>,
    pub meta: VerificationMeta,
}

#[derive(Debug, Clone)]
struct CachedSearch {
    stored_at: Instant,
    items: Vec<NoticeSummary>,
    total_count: u64,
    warnings: Vec<String>,
}

/// Fan-out search service over the three notice categories, with a TTL'd
/// result cache and per-run verification metadata.
pub struct SearchService {
    api: Arc<dyn BidApi>,
    config: EngineConfig,
    cache: Mutex<HashMap<String, CachedSearch>>,
}

fn digit_stamp(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Whether a notice is still open at `now` (a 12-digit stamp). Notices
/// without a parseable deadline are kept.
fn closes_in_future(closes_at: &str, now: &str) -> bool {
    let digits = digit_stamp(closes_at);
    if digits.len() < 12 {
        return true;
    }
    &digits[..12] >= now
}

fn span_days(query: &SearchQuery) -> Option<i64> {
    let from = digit_stamp(query.get_str("fromBidDt")?);
    let to = digit_stamp(query.get_str("toBidDt")?);
    if from.len() < 8 || to.len() < 8 {
        return None;
    }
    let from = NaiveDate::parse_from_str(&from[..8], "%Y%m%d").ok()?;
    let to = NaiveDate::parse_from_str(&to[..8], "%Y%m%d").ok()?;
    Some(to.signed_duration_since(from).num_days())
}

impl SearchService {
    pub fn new(api: Arc<dyn BidApi>, config: EngineConfig) -> Self {
        Self {
            api,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn cache_lookup(&self, key: &str) -> Option<CachedSearch> {
        let mut cache = self.cache.lock().await;
        match cache.get(key) {
            Some(hit) if hit.stored_at.elapsed() < self.config.cache_ttl => Some(hit.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    /// Run one search: sanitize, fan the three category list calls out
    /// concurrently, merge, dedupe and order the results.
    ///
    /// A failed sub-call becomes a warning and flips `partial_failure`; the
    /// whole search errors only when every category fails hard. All-degraded
    /// responses fail open to an empty result set.
    pub async fn search(
        &self,
        raw: &RawSearchRequest,
        page: SearchPage,
    ) -> Result<SearchOutcome, EngineError> {
        let query = sanitize(raw);
        let cache_key = format!("{}|page={}", query.canonical_string(), page.page_no);

        if let Some(hit) = self.cache_lookup(&cache_key).await {
            let mut meta = VerificationMeta::new(query);
            meta.from_cache = true;
            meta.total_count = hit.total_count;
            meta.warnings = hit.warnings;
            return Ok(SearchOutcome {
                items: hit.items,
                meta,
            });
        }

        let mut meta = VerificationMeta::new(query.clone());

        if let Some(days) = span_days(&query) {
            if days > self.config.recommended_span_days {
                meta.warnings.push(format!(
                    "requested date span of {days} days exceeds the recommended {} days",
                    self.config.recommended_span_days
                ));
            }
        }

        let span = info_span!("bid_search", run_id = %meta.run_id, page_no = page.page_no);
        let slots = async {
            let mut set = JoinSet::new();
            for (slot, category) in NoticeCategory::ALL.into_iter().enumerate() {
                let api = Arc::clone(&self.api);
                let query = query.clone();
                set.spawn(async move {
                    let result = api.fetch_list(category, page.page_no, &query).await;
                    (slot, category, result)
                });
            }

            let mut slots: [Option<(NoticeCategory, Result<Value, CallError>)>; 3] =
                [None, None, None];
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((slot, category, result)) => slots[slot] = Some((category, result)),
                    Err(err) => warn!(error = %err, "category fetch task aborted"),
                }
            }
            slots
        }
        .instrument(span)
        .await;

        meta.api_call_count = slots.len() as u32;
        let mut merged: Vec<NoticeSummary> = Vec::new();
        let mut first_hard: Option<EngineError> = None;

        for slot in slots {
            match slot {
                Some((_, Ok(payload))) => {
                    meta.successful_calls += 1;
                    meta.total_count += total_count(&payload);
                    for item in normalize_items(&payload) {
                        merged.push(summary_from_item(&item));
                    }
                }
                Some((category, Err(err))) => {
                    meta.warnings
                        .push(format!("{} list call failed: {err}", category.label()));
                    let lifted = err.into_engine(&query);
                    if first_hard.is_none()
                        && !matches!(lifted, EngineError::ParseDegraded { .. })
                    {
                        first_hard = Some(lifted);
                    }
                }
                None => meta
                    .warnings
                    .push("category fetch task aborted before completion".to_string()),
            }
        }

        if meta.successful_calls == 0 {
            if let Some(err) = first_hard {
                return Err(err);
            }
            // Every category answered with an unrecognizable body: fail
            // open with the warnings attached.
        }
        meta.partial_failure = meta.successful_calls < meta.api_call_count;

        let mut seen = HashSet::new();
        merged.retain(|summary| seen.insert(summary.identity.clone()));
        merged.sort_by(|a, b| {
            digit_stamp(&b.posted_at)
                .cmp(&digit_stamp(&a.posted_at))
                .then_with(|| a.identity.notice_no.cmp(&b.identity.notice_no))
        });

        if query.get_str("excludeDeadline") == Some("true") {
            let now = Utc::now().format("%Y%m%d%H%M").to_string();
            merged.retain(|summary| closes_in_future(&summary.closes_at, &now));
        }

        if meta.successful_calls > 0 {
            let mut cache = self.cache.lock().await;
            cache.insert(
                cache_key,
                CachedSearch {
                    stored_at: Instant::now(),
                    items: merged.clone(),
                    total_count: meta.total_count,
                    warnings: meta.warnings.clone(),
                },
            );
        }

        Ok(SearchOutcome {
            items: merged,
            meta,
        })
    }

    /// Look a single notice up by identity. The categories are probed in
    /// order; an item matching the notice number with a different order is
    /// kept as fallback. `Ok(None)` means the upstream answered and the
    /// notice simply is not there.
    pub async fn detail(
        &self,
        identity: &NoticeIdentity,
    ) -> Result<Option<NoticeDetail>, EngineError> {
        let mut query = SearchQuery::new();
        query.set("bidNtceNo", identity.notice_no.clone());
        query.set("inqryDiv", "2");

        let mut first_hard: Option<EngineError> = None;
        let mut any_success = false;
        let mut fallback: Option<Value> = None;

        for category in NoticeCategory::ALL {
            match self.api.fetch_list(category, 1, &query).await {
                Ok(payload) => {
                    any_success = true;
                    for item in normalize_items(&payload) {
                        let found = identity_from_item(&item);
                        if found.notice_no != identity.notice_no {
                            continue;
                        }
                        if found.notice_ord == identity.notice_ord {
                            return Ok(Some(standardize_detail(&item)));
                        }
                        if fallback.is_none() {
                            fallback = Some(item);
                        }
                    }
                }
                Err(err) => {
                    let lifted = err.into_engine(&query);
                    if first_hard.is_none()
                        && !matches!(lifted, EngineError::ParseDegraded { .. })
                    {
                        first_hard = Some(lifted);
                    }
                }
            }
        }

        if let Some(item) = fallback {
            return Ok(Some(standardize_detail(&item)));
        }
        if !any_success {
            if let Some(err) = first_hard {
                return Err(err);
            }
        }
        Ok(None)
    }
}

/// Compare two independently obtained notice sets, keyed by notice number
/// only (amendment orders are intentionally collapsed). Pure; no I/O.
pub fn reconcile(ours: &[NoticeSummary], theirs: &[NoticeSummary]) -> ReconciliationResult {
    let ours_map: HashMap<&str, &NoticeSummary> = ours
        .iter()
        .map(|s| (s.identity.notice_no.as_str(), s))
        .collect();
    let theirs_map: HashMap<&str, &NoticeSummary> = theirs
        .iter()
        .map(|s| (s.identity.notice_no.as_str(), s))
        .collect();

    let mut common_keys: Vec<&str> = ours_map
        .keys()
        .filter(|k| theirs_map.contains_key(**k))
        .copied()
        .collect();
    common_keys.sort_unstable();

    let mut only_ours_nos: Vec<String> = ours_map
        .keys()
        .filter(|k| !theirs_map.contains_key(**k))
        .map(|k| k.to_string())
        .collect();
    only_ours_nos.sort_unstable();

    let mut only_theirs_nos: Vec<String> = theirs_map
        .keys()
        .filter(|k| !ours_map.contains_key(**k))
        .map(|k| k.to_string())
        .collect();
    only_theirs_nos.sort_unstable();

    let common = common_keys.len();
    let union = common + only_ours_nos.len() + only_theirs_nos.len();
    let match_rate_percent = if union == 0 {
        0.0
    } else {
        (common as f64 / union as f64 * 100.0 * 100.0).round() / 100.0
    };

    let mut field_mismatches = Vec::new();
    for key in &common_keys {
        let a = ours_map[key];
        let b = theirs_map[key];
        // Exact equality on the agreed fields; no normalization.
        for (field, ours_value, theirs_value) in [
            ("title", &a.title, &b.title),
            (
                "announcingInstitution",
                &a.announcing_institution,
                &b.announcing_institution,
            ),
        ] {
            if ours_value != theirs_value {
                field_mismatches.push(FieldMismatch {
                    notice_no: key.to_string(),
                    field: field.to_string(),
                    ours: ours_value.clone(),
                    theirs: theirs_value.clone(),
                });
            }
        }
    }

    ReconciliationResult {
        ours: ours_map.len(),
        theirs: theirs_map.len(),
        common,
        only_ours: only_ours_nos.len(),
        only_theirs: only_theirs_nos.len(),
        match_rate_percent,
        only_ours_nos,
        only_theirs_nos,
        field_mismatches,
    }
}

/// Persistence seam for bookmarks. The real store belongs to a
/// collaborator service; the in-memory implementation below backs tests
/// and single-node deployments.
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    async fn insert(&self, entry: BookmarkEntry) -> anyhow::Result<()>;
    async fn remove(&self, user_id: &str, notice_no: &str) -> anyhow::Result<()>;
    async fn list(&self, user_id: &str) -> anyhow::Result<Vec<BookmarkEntry>>;
    async fn contains(&self, user_id: &str, notice_no: &str) -> anyhow::Result<bool>;
}

#[derive(Default)]
pub struct MemoryBookmarkStore {
    entries: Mutex<HashMap<(String, String), BookmarkEntry>>,
}

impl MemoryBookmarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookmarkStore for MemoryBookmarkStore {
    async fn insert(&self, entry: BookmarkEntry) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().await;
        entries
            .entry((entry.user_id.clone(), entry.notice_no.clone()))
            .or_insert(entry);
        Ok(())
    }

    async fn remove(&self, user_id: &str, notice_no: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(&(user_id.to_string(), notice_no.to_string()));
        Ok(())
    }

    async fn list(&self, user_id: &str) -> anyhow::Result<Vec<BookmarkEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn contains(&self, user_id: &str, notice_no: &str) -> anyhow::Result<bool> {
        let entries = self.entries.lock().await;
        Ok(entries.contains_key(&(user_id.to_string(), notice_no.to_string())))
    }
}

/// Per-user bookmark operations. Adds and removes are idempotent no-op
/// successes; every operation on an anonymous session is `AuthRequired`
/// except the membership probe, which answers `false`.
#[derive(Clone)]
pub struct BookmarkIndex {
    store: Arc<dyn BookmarkStore>,
}

fn store_error(err: anyhow::Error) -> EngineError {
    EngineError::UpstreamUnavailable {
        status: 503,
        query: "bookmarks".to_string(),
        cause: err.to_string(),
    }
}

fn require_user(user: Option<&str>) -> Result<&str, EngineError> {
    match user {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(EngineError::AuthRequired(
            "bookmark operations need a signed-in user".to_string(),
        )),
    }
}

impl BookmarkIndex {
    pub fn new(store: Arc<dyn BookmarkStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBookmarkStore::new()))
    }

    pub async fn add(&self, user: Option<&str>, notice_no: &str) -> Result<(), EngineError> {
        let user = require_user(user)?;
        let entry = BookmarkEntry {
            user_id: user.to_string(),
            notice_no: notice_no.to_string(),
            created_at: Utc::now(),
        };
        self.store.insert(entry).await.map_err(store_error)
    }

    pub async fn remove(&self, user: Option<&str>, notice_no: &str) -> Result<(), EngineError> {
        let user = require_user(user)?;
        self.store.remove(user, notice_no).await.map_err(store_error)
    }

    pub async fn list(&self, user: Option<&str>) -> Result<Vec<BookmarkEntry>, EngineError> {
        let user = require_user(user)?;
        self.store.list(user).await.map_err(store_error)
    }

    pub async fn is_bookmarked(
        &self,
        user: Option<&str>,
        notice_no: &str,
    ) -> Result<bool, EngineError> {
        match user {
            Some(id) if !id.trim().is_empty() => {
                self.store.contains(id, notice_no).await.map_err(store_error)
            }
            _ => Ok(false),
        }
    }
}
