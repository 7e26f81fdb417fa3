//! Response normalization for procurement notice payloads.
//!
//! The upstream service answers in two envelope generations and fills items
//! with an open-ended mix of documented and undocumented keys. This crate
//! turns those payloads into flat summaries and classified details without
//! ever erroring: unrecognized shapes degrade to empty sequences, missing
//! keys degrade to the unknown sentinel.

use serde_json::{Map, Value};

use bidscope_core::{
    Attachment, FieldEntry, NoticeDetail, NoticeIdentity, NoticeSummary, UNKNOWN,
};

pub const CRATE_NAME: &str = "bidscope-normalize";

const AMOUNT_KEYS: &[&str] = &[
    "estPrice",
    "bsnsBdgtAmt",
    "baseAmt",
    "presmtPrce",
    "presmptPrce",
    "sldngPrce",
    "estmtAmt",
    "basePrce",
    "sldngLwstPrce",
    "sucsfbidAmt",
    "prcurmtAmt",
    "prcurmtPrce",
    "bsnsBdgt",
    "presmtPrc",
    "basePrc",
];

const SCHEDULE_KEYS: &[&str] = &[
    "bidNtceDt",
    "bidClseDt",
    "bidClsDt",
    "opengDt",
    "opengDtTm",
    "bidBegnDt",
    "bidEndDt",
];

const QUALIFICATION_KEYS: &[&str] = &[
    "licnsReq",
    "licnsReqNm",
    "partcptLmt",
    "partcptLmtNm",
    "bsnsCond",
    "bsnsCondNm",
];

const AMOUNT_TOKENS_ASCII: &[&str] = &["amt", "price", "prce", "prc"];
const AMOUNT_TOKENS_KOREAN: &[&str] = &["금액", "가격", "추정", "기초", "낙찰", "예산"];

/// Keys already surfaced on the summary; never repeated in `other`.
const SUMMARY_KEYS: &[&str] = &[
    "bidNtceNo",
    "bidNtceOrd",
    "bidNtceNm",
    "insttNm",
    "ntceInsttNm",
    "dmandInsttNm",
    "dminsttNm",
    "bidNtceDtlClsfCd",
    "standardized",
    "attachments",
];

const DOC_EXTENSIONS: &[&str] = &[".pdf", ".hwp", ".hwpx", ".doc", ".docx"];
const DOWNLOAD_TOKENS: &[&str] = &["fileDown", "download", "atchFile", "pblancFile"];

const MAX_SCAN_DEPTH: usize = 8;

/// Display labels for well-known wire keys. Unlisted keys display as-is.
const LABELS: &[(&str, &str)] = &[
    ("bidNtceNo", "공고번호"),
    ("bidNtceOrd", "공고차수"),
    ("bidNtceNm", "공고명"),
    ("insttNm", "공고기관"),
    ("ntceInsttNm", "공고기관"),
    ("dmandInsttNm", "수요기관"),
    ("dminsttNm", "수요기관"),
    ("estPrice", "추정가격"),
    ("bsnsBdgtAmt", "기초금액"),
    ("baseAmt", "기초금액"),
    ("presmtPrce", "추정가격"),
    ("presmptPrce", "추정가격"),
    ("sldngPrce", "낙찰하한가"),
    ("estmtAmt", "추정금액"),
    ("basePrce", "기초가격"),
    ("sldngLwstPrce", "낙찰하한가"),
    ("sucsfbidAmt", "낙찰금액"),
    ("prcurmtAmt", "조달금액"),
    ("prcurmtPrce", "조달가격"),
    ("bsnsBdgt", "사업예산"),
    ("presmtPrc", "추정가격"),
    ("basePrc", "기초가격"),
    ("bidNtceDt", "게시일시"),
    ("bidClseDt", "마감일시"),
    ("bidClsDt", "마감일시"),
    ("opengDt", "개찰일시"),
    ("opengDtTm", "개찰일시"),
    ("bidBegnDt", "입찰시작일시"),
    ("bidEndDt", "입찰종료일시"),
    ("licnsReq", "면허제한"),
    ("licnsReqNm", "면허제한"),
    ("partcptLmt", "참가자격"),
    ("partcptLmtNm", "참가자격"),
    ("bsnsCond", "사업조건"),
    ("bsnsCondNm", "사업조건"),
];

/// The two envelope generations the service answers with, plus the two
/// degenerate shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Proxy-era shape: `{ data: { items: [...] }, totalCount }`.
    Current {
        items: Vec<Value>,
        total_count: u64,
    },
    /// Agency-direct shape: `{ response: { body: { items: { item }, totalCount } } }`.
    /// A single-object `item` is wrapped into a one-element list.
    Legacy {
        items: Vec<Value>,
        total_count: u64,
    },
    /// Recognized shape with nothing in it.
    Empty,
    /// Anything else. Treated as zero items, never an error.
    Unrecognized,
}

impl Envelope {
    pub fn items(self) -> Vec<Value> {
        match self {
            Envelope::Current { items, .. } | Envelope::Legacy { items, .. } => items,
            Envelope::Empty | Envelope::Unrecognized => Vec::new(),
        }
    }

    pub fn total_count(&self) -> u64 {
        match self {
            Envelope::Current { total_count, .. } | Envelope::Legacy { total_count, .. } => {
                *total_count
            }
            Envelope::Empty | Envelope::Unrecognized => 0,
        }
    }
}

fn count_from(value: Option<&Value>, fallback: usize) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(fallback as u64),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(fallback as u64),
        _ => fallback as u64,
    }
}

/// Classify a raw payload into one of the known envelope shapes, checked in
/// preference order: current first, legacy second.
pub fn parse_envelope(payload: &Value) -> Envelope {
    if let Some(items) = payload.pointer("/data/items").and_then(Value::as_array) {
        let total = count_from(payload.get("totalCount"), items.len());
        if items.is_empty() {
            return Envelope::Empty;
        }
        return Envelope::Current {
            items: items.clone(),
            total_count: total,
        };
    }

    if let Some(body) = payload.pointer("/response/body") {
        let total_value = body.get("totalCount");
        match body.pointer("/items/item") {
            Some(Value::Array(items)) => {
                if items.is_empty() {
                    return Envelope::Empty;
                }
                return Envelope::Legacy {
                    total_count: count_from(total_value, items.len()),
                    items: items.clone(),
                };
            }
            Some(item @ Value::Object(_)) => {
                return Envelope::Legacy {
                    items: vec![item.clone()],
                    total_count: count_from(total_value, 1),
                };
            }
            // `items` present but empty string / empty object: a recognized
            // legacy "no results" answer.
            _ if body.get("items").is_some() => return Envelope::Empty,
            _ => {}
        }
    }

    Envelope::Unrecognized
}

/// Items of a payload under the envelope preference order. Total function:
/// any input yields a (possibly empty) list.
pub fn normalize_items(payload: &Value) -> Vec<Value> {
    parse_envelope(payload).items()
}

pub fn total_count(payload: &Value) -> u64 {
    parse_envelope(payload).total_count()
}

fn str_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_non_empty(map: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| map.get(*k).and_then(str_of))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Notice order parsed from string or number, defaulting to 0 for the
/// original posting.
fn parse_ord(value: Option<&Value>) -> u32 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as u32,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Identity of an item. Items with no usable notice number keep the
/// placeholder identity so parser gaps stay visible downstream.
pub fn identity_from_item(item: &Value) -> NoticeIdentity {
    let notice_no = item.get("bidNtceNo").and_then(str_of);
    match notice_no {
        Some(no) => NoticeIdentity::new(no, parse_ord(item.get("bidNtceOrd"))),
        None => NoticeIdentity::placeholder(),
    }
}

/// Flatten one raw item into a summary. Missing fields become the unknown
/// sentinel; the full raw object is retained.
pub fn summary_from_item(item: &Value) -> NoticeSummary {
    let map = match item.as_object() {
        Some(map) => map.clone(),
        None => Map::new(),
    };
    NoticeSummary {
        identity: identity_from_item(item),
        title: first_non_empty(&map, &["bidNtceNm"]),
        announcing_institution: first_non_empty(&map, &["insttNm", "ntceInsttNm"]),
        demanding_institution: first_non_empty(&map, &["dmandInsttNm", "dminsttNm"]),
        posted_at: first_non_empty(&map, &["bidNtceDt"]),
        closes_at: first_non_empty(&map, &["bidClseDt", "bidClsDt"]),
        classification: first_non_empty(&map, &["bidNtceDtlClsfCd"]),
        raw: map,
    }
}

pub fn label_for(key: &str) -> &str {
    LABELS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, label)| *label)
        .unwrap_or(key)
}

/// Whether a key looks like an amount field without being on the allow-list.
/// ASCII tokens match case-insensitively, Korean tokens verbatim.
pub fn matches_amount_pattern(key: &str) -> bool {
    let lower = key.to_lowercase();
    AMOUNT_TOKENS_ASCII.iter().any(|t| lower.contains(t))
        || AMOUNT_TOKENS_KOREAN.iter().any(|t| key.contains(t))
}

/// Digits of a string, or the number itself. Used for amount rendering.
fn as_integer_amount(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| !matches!(*c, ',' | ' ')).collect();
            cleaned.parse().ok()
        }
        _ => None,
    }
}

/// Render an amount as a comma-grouped won figure, e.g. `5,000,000원`.
/// Non-numeric values pass through untouched.
pub fn format_amount(value: &Value) -> String {
    match as_integer_amount(value) {
        Some(n) => {
            let digits = n.unsigned_abs().to_string();
            let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 4);
            if n < 0 {
                grouped.push('-');
            }
            for (i, c) in digits.chars().enumerate() {
                if i > 0 && (digits.len() - i) % 3 == 0 {
                    grouped.push(',');
                }
                grouped.push(c);
            }
            grouped.push('원');
            grouped
        }
        None => raw_display(value),
    }
}

/// Render 8/12/14-digit timestamps as `YYYY-MM-DD` or `YYYY-MM-DD HH:MM`;
/// anything else passes through.
pub fn format_timestamp(value: &Value) -> String {
    let raw = raw_display(value);
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        8 => format!("{}-{}-{}", &digits[0..4], &digits[4..6], &digits[6..8]),
        12 | 14 => format!(
            "{}-{}-{} {}:{}",
            &digits[0..4],
            &digits[4..6],
            &digits[6..8],
            &digits[8..10],
            &digits[10..12]
        ),
        _ => raw,
    }
}

fn raw_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => UNKNOWN.to_string(),
        other => other.to_string(),
    }
}

fn entry(key: &str, value: &Value, display: String) -> FieldEntry {
    FieldEntry {
        key: key.to_string(),
        label: label_for(key).to_string(),
        value: value.clone(),
        display,
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

/// Canonical keys of the pre-standardized sub-object, with display labels
/// and the bucket each belongs to.
const STANDARDIZED_AMOUNTS: &[(&str, &str)] = &[
    ("basePrice", "기초금액"),
    ("estimatedPrice", "추정가격"),
    ("bidFloorPrice", "낙찰하한가"),
    ("successfulBidAmount", "낙찰금액"),
];

const STANDARDIZED_SCHEDULE: &[(&str, &str)] = &[
    ("noticeDate", "게시일시"),
    ("deadlineDate", "마감일시"),
    ("openingDate", "개찰일시"),
];

fn standardized_entries(
    std: &Map<String, Value>,
    keys: &[(&str, &str)],
    format: fn(&Value) -> String,
) -> Vec<FieldEntry> {
    keys.iter()
        .filter_map(|(key, label)| {
            std.get(*key).filter(|v| is_present(v)).map(|v| FieldEntry {
                key: (*key).to_string(),
                label: (*label).to_string(),
                value: v.clone(),
                display: format(v),
            })
        })
        .collect()
}

fn looks_like_attachment(url: &str) -> bool {
    if !(url.starts_with("http://") || url.starts_with("https://")) || url.len() <= 20 {
        return false;
    }
    let lower = url.to_lowercase();
    DOC_EXTENSIONS.iter().any(|ext| lower.contains(ext))
        || DOWNLOAD_TOKENS
            .iter()
            .any(|t| url.contains(t) || lower.contains(&t.to_lowercase()))
}

fn scan_urls(value: &Value, depth: usize, found: &mut Vec<String>) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if looks_like_attachment(trimmed) && !found.iter().any(|u| u == trimmed) {
                found.push(trimmed.to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                scan_urls(item, depth + 1, found);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                if key.starts_with('_') {
                    continue;
                }
                scan_urls(item, depth + 1, found);
            }
        }
        _ => {}
    }
}

/// Attachment URLs found anywhere in the raw payload, bounded depth-first.
pub fn collect_attachment_urls(value: &Value) -> Vec<String> {
    let mut found = Vec::new();
    scan_urls(value, 0, &mut found);
    found
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let h1 = bytes[i + 1] as char;
            let h2 = bytes[i + 2] as char;
            if let (Some(a), Some(b)) = (h1.to_digit(16), h2.to_digit(16)) {
                out.push(((a << 4) + b) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}

/// Label = decoded last path segment, query string stripped.
fn attachment_from_url(url: String) -> Attachment {
    let segment = url.rsplit('/').next().unwrap_or("");
    let name = segment.split('?').next().unwrap_or("");
    let label = if name.is_empty() {
        "첨부파일".to_string()
    } else {
        percent_decode(name)
    };
    Attachment { url, label }
}

fn attachments_for(item: &Value, std: Option<&Map<String, Value>>) -> Vec<Attachment> {
    if let Some(urls) = std
        .and_then(|m| m.get("attachmentFileUrls"))
        .and_then(Value::as_array)
    {
        let list: Vec<Attachment> = urls
            .iter()
            .filter_map(str_of)
            .map(attachment_from_url)
            .collect();
        if !list.is_empty() {
            return list;
        }
    }

    if let Some(structured) = item.get("attachments").and_then(Value::as_array) {
        let list: Vec<Attachment> = structured
            .iter()
            .filter_map(|a| {
                let url = a.get("url").and_then(str_of).or_else(|| str_of(a))?;
                let label = a
                    .get("name")
                    .and_then(str_of)
                    .unwrap_or_else(|| attachment_from_url(url.clone()).label);
                Some(Attachment { url, label })
            })
            .collect();
        if !list.is_empty() {
            return list;
        }
    }

    collect_attachment_urls(item)
        .into_iter()
        .map(attachment_from_url)
        .collect()
}

/// Bucket a raw item into a classified detail.
///
/// Bucket order: a pre-standardized sub-object wins outright for the bucket
/// it covers; otherwise allow-lists claim keys, then the amount token
/// pattern. `other` holds the rest, minus internal `_`-keys and everything
/// already surfaced. Buckets are pairwise disjoint by construction.
pub fn standardize_detail(item: &Value) -> NoticeDetail {
    let summary = summary_from_item(item);
    let map = summary.raw.clone();
    let std = map
        .get("standardized")
        .and_then(Value::as_object)
        .filter(|m| !m.is_empty());

    let mut amounts = std
        .map(|m| standardized_entries(m, STANDARDIZED_AMOUNTS, format_amount))
        .unwrap_or_default();
    let mut schedule = std
        .map(|m| standardized_entries(m, STANDARDIZED_SCHEDULE, format_timestamp))
        .unwrap_or_default();
    let mut qualifications: Vec<FieldEntry> = std
        .and_then(|m| m.get("participantQualifications"))
        .filter(|v| is_present(v))
        .map(|v| {
            vec![FieldEntry {
                key: "participantQualifications".to_string(),
                label: "참가자격".to_string(),
                value: v.clone(),
                display: raw_display(v),
            }]
        })
        .unwrap_or_default();

    let std_amounts = !amounts.is_empty();
    let std_schedule = !schedule.is_empty();
    let std_qualifications = !qualifications.is_empty();

    let mut other = Vec::new();
    for (key, value) in &map {
        if key.starts_with('_') || SUMMARY_KEYS.contains(&key.as_str()) || !is_present(value) {
            continue;
        }
        let key_str = key.as_str();
        if AMOUNT_KEYS.contains(&key_str) {
            if !std_amounts {
                amounts.push(entry(key_str, value, format_amount(value)));
            }
        } else if SCHEDULE_KEYS.contains(&key_str) {
            if !std_schedule {
                schedule.push(entry(key_str, value, format_timestamp(value)));
            }
        } else if QUALIFICATION_KEYS.contains(&key_str) {
            if !std_qualifications {
                qualifications.push(entry(key_str, value, raw_display(value)));
            }
        } else if matches_amount_pattern(key_str) {
            if !std_amounts {
                amounts.push(entry(key_str, value, format_amount(value)));
            }
        } else {
            other.push(entry(key_str, value, raw_display(value)));
        }
    }

    NoticeDetail {
        attachments: attachments_for(item, std),
        summary,
        amounts,
        schedule,
        qualifications,
        other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn current_envelope_is_preferred() {
        let payload = json!({
            "data": { "items": [ { "bidNtceNo": "A1" } ] },
            "totalCount": 7,
            "response": { "body": { "items": { "item": { "bidNtceNo": "B2" } } } }
        });
        let envelope = parse_envelope(&payload);
        assert_eq!(envelope.total_count(), 7);
        let items = envelope.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["bidNtceNo"], "A1");
    }

    #[test]
    fn legacy_single_object_is_wrapped() {
        let payload = json!({
            "response": { "body": {
                "items": { "item": { "bidNtceNo": "R26BK01270659" } },
                "totalCount": "1"
            } }
        });
        let items = normalize_items(&payload);
        assert_eq!(items.len(), 1);
        assert_eq!(total_count(&payload), 1);
    }

    #[test]
    fn legacy_array_is_used_directly() {
        let payload = json!({
            "response": { "body": {
                "items": { "item": [ { "bidNtceNo": "X" }, { "bidNtceNo": "Y" } ] },
                "totalCount": 2
            } }
        });
        assert_eq!(normalize_items(&payload).len(), 2);
    }

    #[test]
    fn unrecognized_shapes_yield_empty_never_error() {
        for payload in [json!(null), json!("OpenAPI_ServiceError"), json!({"odd": true})] {
            assert!(normalize_items(&payload).is_empty());
            assert_eq!(parse_envelope(&payload), Envelope::Unrecognized);
        }
        let empty = json!({ "response": { "body": { "items": "" } } });
        assert_eq!(parse_envelope(&empty), Envelope::Empty);
    }

    #[test]
    fn identity_defaults_order_and_keeps_placeholder() {
        let with_string_ord = json!({ "bidNtceNo": "R26BK01270659", "bidNtceOrd": "2" });
        let without_ord = json!({ "bidNtceNo": "R26BK01270659" });
        let keyless = json!({ "bidNtceNm": "무번호 공고" });

        assert_eq!(identity_from_item(&with_string_ord).notice_ord, 2);
        assert_eq!(identity_from_item(&without_ord).notice_ord, 0);
        assert!(identity_from_item(&keyless).is_placeholder());
    }

    #[test]
    fn summary_defaults_missing_fields_to_unknown() {
        let item = json!({ "bidNtceNo": "X1", "bidNtceNm": "도로 보수" });
        let summary = summary_from_item(&item);
        assert_eq!(summary.title, "도로 보수");
        assert_eq!(summary.announcing_institution, UNKNOWN);
        assert_eq!(summary.closes_at, UNKNOWN);
        assert_eq!(summary.raw.len(), 2);
    }

    #[test]
    fn base_budget_amount_lands_in_amounts_with_label_and_won_display() {
        let item = json!({ "bidNtceNo": "X1", "bsnsBdgtAmt": 5000000 });
        let detail = standardize_detail(&item);
        assert_eq!(detail.amounts.len(), 1);
        let field = &detail.amounts[0];
        assert_eq!(field.key, "bsnsBdgtAmt");
        assert_eq!(field.label, "기초금액");
        assert_eq!(field.display, "5,000,000원");
        assert_eq!(field.value, json!(5000000));
    }

    #[test]
    fn buckets_are_pairwise_disjoint() {
        let item = json!({
            "bidNtceNo": "X1",
            "bidNtceNm": "물품 구매",
            "estPrice": "12345678",
            "rsrvtnPrceDcsnAmt": "999",
            "bidClseDt": "202603121500",
            "partcptLmtNm": "지역제한",
            "cntrctCnclsMthdNm": "일반경쟁",
            "_internal": "skip me"
        });
        let detail = standardize_detail(&item);
        let mut seen = HashSet::new();
        for bucket in [
            &detail.amounts,
            &detail.schedule,
            &detail.qualifications,
            &detail.other,
        ] {
            for field in bucket.iter() {
                assert!(seen.insert(field.key.clone()), "duplicate key {}", field.key);
            }
        }
        assert!(!seen.contains("_internal"));
        assert!(!seen.contains("bidNtceNm"));
        // Pattern-matched amount key without allow-list membership.
        assert!(detail.amounts.iter().any(|f| f.key == "rsrvtnPrceDcsnAmt"));
        assert!(detail.other.iter().any(|f| f.key == "cntrctCnclsMthdNm"));
    }

    #[test]
    fn standardized_sub_object_wins_over_raw_keys() {
        let item = json!({
            "bidNtceNo": "X1",
            "bsnsBdgtAmt": "111",
            "bidClseDt": "202601010000",
            "standardized": {
                "basePrice": 5000000,
                "deadlineDate": "202603121500",
                "participantQualifications": "지역제한 없음",
                "attachmentFileUrls": ["https://example.go.kr/atchFileDownload?id=12345"]
            }
        });
        let detail = standardize_detail(&item);
        assert_eq!(detail.amounts.len(), 1);
        assert_eq!(detail.amounts[0].key, "basePrice");
        assert_eq!(detail.amounts[0].display, "5,000,000원");
        assert_eq!(detail.schedule.len(), 1);
        assert_eq!(detail.schedule[0].display, "2026-03-12 15:00");
        assert_eq!(detail.qualifications[0].display, "지역제한 없음");
        assert_eq!(detail.attachments.len(), 1);
    }

    #[test]
    fn attachment_scan_filters_short_and_non_document_urls() {
        let item = json!({
            "bidNtceNo": "X1",
            "nested": { "deep": [
                "https://a.kr/x.pdf",
                "https://example.go.kr/files/notice_2026.hwp",
                "https://example.go.kr/portal/main/index.html",
                "https://example.go.kr/cmmn/fileDown.do?atchFileId=F1"
            ] },
            "_hidden": "https://example.go.kr/secret/atchFileDownload.pdf"
        });
        let urls = collect_attachment_urls(&item);
        assert_eq!(urls.len(), 2);
        assert!(urls.iter().all(|u| u.len() > 20));
        assert!(!urls.iter().any(|u| u.contains("secret")));
    }

    #[test]
    fn timestamp_formats_by_digit_length() {
        assert_eq!(format_timestamp(&json!("20260312")), "2026-03-12");
        assert_eq!(format_timestamp(&json!("202603121500")), "2026-03-12 15:00");
        assert_eq!(
            format_timestamp(&json!("20260312150000")),
            "2026-03-12 15:00"
        );
        assert_eq!(format_timestamp(&json!("입찰시 공고")), "입찰시 공고");
    }

    #[test]
    fn amount_formatting_groups_and_suffixes() {
        assert_eq!(format_amount(&json!(5000000)), "5,000,000원");
        assert_eq!(format_amount(&json!("1,234,567")), "1,234,567원");
        assert_eq!(format_amount(&json!(0)), "0원");
        assert_eq!(format_amount(&json!("협의")), "협의");
    }

    #[test]
    fn every_amount_key_has_a_label() {
        for key in AMOUNT_KEYS {
            assert_ne!(label_for(key), *key, "missing label for {key}");
        }
        assert_eq!(label_for("estmtAmt"), "추정금액");
        assert_eq!(label_for("prcurmtAmt"), "조달금액");
        assert_eq!(label_for("prcurmtPrce"), "조달가격");
        assert_eq!(label_for("basePrc"), "기초가격");
        assert_eq!(label_for("bidBegnDt"), "입찰시작일시");
        assert_eq!(label_for("bidEndDt"), "입찰종료일시");
        assert_eq!(label_for("bsnsCondNm"), "사업조건");
    }

    #[test]
    fn attachment_labels_strip_queries_and_decode() {
        let item = json!({
            "bidNtceNo": "X1",
            "files": [
                "https://example.go.kr/files/%EC%9E%85%EC%B0%B0%EA%B3%B5%EA%B3%A0.pdf?atchFileId=F1",
                "https://example.go.kr/cmmn/fileDown.do?atchFileId=F2&seq=1"
            ]
        });
        let detail = standardize_detail(&item);
        let labels: Vec<&str> = detail.attachments.iter().map(|a| a.label.as_str()).collect();
        assert!(labels.contains(&"입찰공고.pdf"));
        assert!(labels.contains(&"fileDown.do"));
        assert!(labels.iter().all(|l| !l.contains('?')));
    }

    #[test]
    fn amount_pattern_covers_ascii_and_korean_tokens() {
        assert!(matches_amount_pattern("rsrvtnPrceDcsnAmt"));
        assert!(matches_amount_pattern("VAT가격"));
        assert!(matches_amount_pattern("예산구분"));
        assert!(!matches_amount_pattern("cntrctCnclsMthdNm"));
    }
}
