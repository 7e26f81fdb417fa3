//! Axum JSON API over the bid search engine, mirroring the proxy contract
//! the UI collaborator consumes.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

use bidscope_core::{EngineError, NoticeIdentity, NoticeSummary, RawSearchRequest};
use bidscope_engine::{reconcile, BookmarkIndex, SearchPage, SearchService};

pub const CRATE_NAME: &str = "bidscope-web";

#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchService>,
    pub bookmarks: BookmarkIndex,
}

impl AppState {
    pub fn new(search: Arc<SearchService>, bookmarks: BookmarkIndex) -> Self {
        Self { search, bookmarks }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/bid-search", get(bid_search))
        .route("/api/bid-detail", get(bid_detail))
        .route("/api/compare", post(compare))
        .route("/api/bookmarks", get(list_bookmarks).post(add_bookmark))
        .route("/api/bookmarks/{bid_ntce_no}", delete(remove_bookmark))
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "bid api listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Flat query-string form of a search request. Axum's query extractor has
/// no list syntax, so the list filters arrive comma-joined.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct SearchParams {
    bid_ntce_no: Option<String>,
    bid_ntce_nm: Option<String>,
    inqry_div: Option<String>,
    from_bid_dt: Option<String>,
    to_bid_dt: Option<String>,
    bid_ntce_dtl_clsf_cd: Option<String>,
    instt_nm: Option<String>,
    ref_no: Option<String>,
    area: Option<String>,
    industry: Option<String>,
    from_est_price: Option<String>,
    to_est_price: Option<String>,
    exclude_deadline: Option<bool>,
    business_types: Option<String>,
    business_statuses: Option<String>,
    page_no: Option<u32>,
}

fn split_list(input: Option<String>) -> Option<Vec<Option<String>>> {
    input.map(|s| s.split(',').map(|part| Some(part.to_string())).collect())
}

impl SearchParams {
    fn into_request(self) -> (RawSearchRequest, SearchPage) {
        let page = SearchPage {
            page_no: self.page_no.unwrap_or(1).max(1),
        };
        let request = RawSearchRequest {
            bid_ntce_no: self.bid_ntce_no,
            bid_ntce_nm: self.bid_ntce_nm,
            inqry_div: self.inqry_div,
            from_bid_dt: self.from_bid_dt,
            to_bid_dt: self.to_bid_dt,
            bid_ntce_dtl_clsf_cd: self.bid_ntce_dtl_clsf_cd,
            instt_nm: self.instt_nm,
            ref_no: self.ref_no,
            area: self.area,
            industry: self.industry,
            from_est_price: self.from_est_price,
            to_est_price: self.to_est_price,
            exclude_deadline: self.exclude_deadline,
            business_types: split_list(self.business_types),
            business_statuses: split_list(self.business_statuses),
        };
        (request, page)
    }
}

fn error_response(err: &EngineError) -> Response {
    let status = match err {
        EngineError::Network { .. } | EngineError::UpstreamUnavailable { .. } => {
            StatusCode::BAD_GATEWAY
        }
        EngineError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        EngineError::AuthRequired(_) => StatusCode::UNAUTHORIZED,
        // Degraded parses fail open; reaching here means a caller skipped
        // that path, so answer 200 with an empty result.
        EngineError::ParseDegraded { .. } => StatusCode::OK,
    };
    (
        status,
        Json(json!({ "success": false, "error": err.to_string() })),
    )
        .into_response()
}

fn user_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn bid_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let (request, page) = params.into_request();
    match state.search.search(&request, page).await {
        Ok(outcome) => Json(json!({
            "success": true,
            "cached": outcome.meta.from_cache,
            "data": {
                "items": outcome.items,
                "totalCount": outcome.meta.total_count,
            },
            "warnings": outcome.meta.warnings,
            "meta": outcome.meta,
        }))
        .into_response(),
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailParams {
    bid_ntce_no: String,
    #[serde(default)]
    bid_ntce_ord: Option<u32>,
}

async fn bid_detail(
    State(state): State<AppState>,
    Query(params): Query<DetailParams>,
) -> Response {
    let identity = NoticeIdentity::new(params.bid_ntce_no, params.bid_ntce_ord.unwrap_or(0));
    match state.search.detail(&identity).await {
        Ok(Some(detail)) => Json(json!({ "success": true, "data": detail })).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "error": format!("notice {} not found", identity.display_key()),
            })),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
struct CompareBody {
    ours: Vec<NoticeSummary>,
    theirs: Vec<NoticeSummary>,
}

async fn compare(Json(body): Json<CompareBody>) -> Response {
    let result = reconcile(&body.ours, &body.theirs);
    Json(json!({ "success": true, "data": result })).into_response()
}

async fn list_bookmarks(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match state.bookmarks.list(user_id(&headers)).await {
        Ok(entries) => Json(json!({ "success": true, "data": entries })).into_response(),
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookmarkBody {
    bid_ntce_no: String,
}

async fn add_bookmark(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BookmarkBody>,
) -> Response {
    match state
        .bookmarks
        .add(user_id(&headers), &body.bid_ntce_no)
        .await
    {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn remove_bookmark(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(bid_ntce_no): AxumPath<String>,
) -> Response {
    match state.bookmarks.remove(user_id(&headers), &bid_ntce_no).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(err) => error_response(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use bidscope_client::{BidApi, CallError, NoticeCategory};
    use bidscope_core::SearchQuery;
    use bidscope_engine::EngineConfig;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    struct FakeApi;

    #[async_trait]
    impl BidApi for FakeApi {
        async fn fetch_list(
            &self,
            category: NoticeCategory,
            _page_no: u32,
            _query: &SearchQuery,
        ) -> Result<Value, CallError> {
            Ok(match category {
                NoticeCategory::Goods => json!({
                    "data": { "items": [ {
                        "bidNtceNo": "R26BK01270659",
                        "bidNtceOrd": 0,
                        "bidNtceNm": "사무용 물품 구매",
                        "bidNtceDt": "202608201000",
                        "bidClseDt": "209912312359",
                        "bsnsBdgtAmt": 5000000
                    } ] },
                    "totalCount": 1
                }),
                NoticeCategory::Services => json!({
                    "response": { "body": {
                        "items": { "item": {
                            "bidNtceNo": "SVC-001",
                            "bidNtceNm": "청소 용역",
                            "bidNtceDt": "202608211000",
                            "bidClseDt": "209912312359"
                        } },
                        "totalCount": 1
                    } }
                }),
                NoticeCategory::Construction => json!({ "data": { "items": [] }, "totalCount": 0 }),
            })
        }
    }

    fn test_state() -> AppState {
        AppState::new(
            Arc::new(SearchService::new(Arc::new(FakeApi), EngineConfig::default())),
            BookmarkIndex::in_memory(),
        )
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn handler_smoke_bid_search() {
        let app = app(test_state());
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/bid-search?bidNtceNm=%EB%AC%BC%ED%92%88")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["cached"], json!(false));
        assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"]["totalCount"], json!(2));
        assert_eq!(body["meta"]["successfulCalls"], json!(3));
    }

    #[tokio::test]
    async fn handler_smoke_bid_detail_found_and_missing() {
        let app = app(test_state());
        let found = app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/bid-detail?bidNtceNo=R26BK01270659")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(found.status(), StatusCode::OK);
        let body = body_json(found).await;
        assert_eq!(
            body["data"]["amounts"][0]["display"],
            json!("5,000,000원")
        );

        let missing = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/bid-detail?bidNtceNo=NOPE")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let body = body_json(missing).await;
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn handler_smoke_compare() {
        let app = app(test_state());
        let payload = json!({
            "ours": [ { "identity": { "noticeNo": "A", "noticeOrd": 0 },
                "title": "같음", "announcingInstitution": "-", "demandingInstitution": "-",
                "postedAt": "-", "closesAt": "-", "classification": "-", "raw": {} } ],
            "theirs": [ { "identity": { "noticeNo": "A", "noticeOrd": 0 },
                "title": "같음", "announcingInstitution": "-", "demandingInstitution": "-",
                "postedAt": "-", "closesAt": "-", "classification": "-", "raw": {} } ]
        });
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/compare")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["matchRatePercent"], json!(100.0));
        assert_eq!(body["data"]["common"], json!(1));
    }

    #[tokio::test]
    async fn bookmark_mutation_without_user_header_is_unauthorized() {
        let app = app(test_state());
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/bookmarks")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"bidNtceNo":"A"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bookmark_roundtrip_with_user_header() {
        let app = app(test_state());

        let added = app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/bookmarks")
                    .header("content-type", "application/json")
                    .header("x-user-id", "user-1")
                    .body(Body::from(r#"{"bidNtceNo":"R26BK01270659"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(added.status(), StatusCode::OK);

        let listed = app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/bookmarks")
                    .header("x-user-id", "user-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(listed).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let removed = app
            .oneshot(
                axum::http::Request::builder()
                    .method("DELETE")
                    .uri("/api/bookmarks/R26BK01270659")
                    .header("x-user-id", "user-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(removed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn handler_smoke_health() {
        let app = app(test_state());
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
