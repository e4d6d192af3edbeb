use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use simsearch_core::explain::{ExplainOptions, Explanation};
use simsearch_core::metadata::{Location, SourceExcerpt};
use simsearch_core::persist::save_metadata;
use simsearch_core::{load_bundle, DocId, Hit, KeywordQuery, SearchError, Session, Warning};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_K: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<Session>>,
    pub bundle_dir: PathBuf,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn load(bundle_dir: impl Into<PathBuf>, admin_token: Option<String>) -> Result<Self> {
        let bundle_dir = bundle_dir.into();
        let (session, meta) = load_bundle(&bundle_dir)?;
        tracing::info!(num_docs = meta.num_docs, num_topics = meta.num_topics, created_at = %meta.created_at, "serving bundle");
        Ok(Self { session: Arc::new(RwLock::new(session)), bundle_dir, admin_token })
    }
}

/// JSON error body with the status derived from the core error.
#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        let status = match &err {
            SearchError::DocumentOutOfRange { .. } | SearchError::UnknownTag(_) | SearchError::WordNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            SearchError::Decoding { .. } | SearchError::InvalidConfig(_) | SearchError::InvalidTopicCount { .. } => {
                StatusCode::BAD_REQUEST
            }
            SearchError::UntrainedModel { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "request failed");
        }
        ApiError(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/similar/:doc_id", get(similar_handler))
        .route("/keyword", get(keyword_handler))
        .route("/tags", get(tags_handler))
        .route("/tags/:tag/more", get(more_of_tag_handler))
        .route("/explain/:a/:b", get(explain_handler))
        .route("/topics", get(topics_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/doc/:doc_id/tags", post(tag_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

#[derive(Deserialize)]
pub struct TopParams {
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    10
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub title: String,
    pub tags: Vec<String>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub results: Vec<SearchHit>,
    pub warnings: Vec<Warning>,
}

#[derive(Serialize)]
pub struct HitsResponse {
    pub results: Vec<SearchHit>,
}

fn to_hits(session: &Session, hits: Vec<Hit>) -> Result<Vec<SearchHit>, ApiError> {
    let metadata = session.metadata();
    hits.into_iter()
        .map(|hit| {
            Ok(SearchHit {
                doc_id: hit.doc_id,
                score: hit.score,
                title: metadata.title(hit.doc_id)?.to_string(),
                tags: metadata.tags_of(hit.doc_id)?.into_iter().map(String::from).collect(),
            })
        })
        .collect()
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<SearchResponse> {
    let start = std::time::Instant::now();
    let session = state.session.read();
    let outcome = session.find_similar_to_text(&params.q, params.k.clamp(1, MAX_K))?;
    let results = to_hits(&session, outcome.results)?;
    Ok(Json(SearchResponse { query: params.q, took_s: start.elapsed().as_secs_f64(), results, warnings: outcome.warnings }))
}

pub async fn similar_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
    Query(params): Query<TopParams>,
) -> ApiResult<HitsResponse> {
    let session = state.session.read();
    let hits = session.find_similar_to_doc(doc_id, params.k.clamp(1, MAX_K))?;
    Ok(Json(HitsResponse { results: to_hits(&session, hits)? }))
}

pub async fn more_of_tag_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    Query(params): Query<TopParams>,
) -> ApiResult<HitsResponse> {
    let session = state.session.read();
    let hits = session.find_more_of_tag(&tag, params.k.clamp(1, MAX_K))?;
    Ok(Json(HitsResponse { results: to_hits(&session, hits)? }))
}

#[derive(Deserialize)]
pub struct KeywordParams {
    /// Comma-separated words every match must contain.
    #[serde(default)]
    pub include: String,
    /// Comma-separated words no match may contain.
    #[serde(default)]
    pub exclude: String,
    /// Restrict the scan to documents with this tag.
    pub tag: Option<String>,
}

#[derive(Serialize)]
pub struct DocSummary {
    pub doc_id: DocId,
    pub title: String,
}

#[derive(Serialize)]
pub struct KeywordResponse {
    pub total_hits: usize,
    pub results: Vec<DocSummary>,
    pub warnings: Vec<Warning>,
}

fn split_words(list: &str) -> Vec<String> {
    list.split(',').map(str::trim).filter(|w| !w.is_empty()).map(String::from).collect()
}

pub async fn keyword_handler(State(state): State<AppState>, Query(params): Query<KeywordParams>) -> ApiResult<KeywordResponse> {
    let session = state.session.read();
    let mut query = KeywordQuery::new(split_words(&params.include), split_words(&params.exclude));
    if let Some(tag) = &params.tag {
        let docs = session.metadata().docs_with_tag(tag).ok_or_else(|| SearchError::UnknownTag(tag.to_lowercase()))?;
        query = query.within(docs.iter().copied().collect());
    }
    let outcome = session.keyword_search(&query)?;
    let results = outcome
        .results
        .iter()
        .map(|&doc_id| Ok(DocSummary { doc_id, title: session.metadata().title(doc_id)?.to_string() }))
        .collect::<Result<Vec<_>, SearchError>>()?;
    Ok(Json(KeywordResponse { total_hits: results.len(), results, warnings: outcome.warnings }))
}

#[derive(Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

pub async fn tags_handler(State(state): State<AppState>) -> Json<Vec<TagCount>> {
    let session = state.session.read();
    let counts = session.metadata().tag_counts();
    Json(counts.into_iter().map(|(tag, count)| TagCount { tag: tag.to_string(), count }).collect())
}

pub async fn explain_handler(
    State(state): State<AppState>,
    Path((a, b)): Path<(DocId, DocId)>,
    Query(options): Query<ExplainOptions>,
) -> ApiResult<Explanation> {
    let session = state.session.read();
    Ok(Json(session.explain_docs(a, b, &options)?))
}

#[derive(Deserialize)]
pub struct TopicParams {
    #[serde(default = "default_k")]
    pub n: usize,
}

#[derive(Serialize)]
pub struct TopicWord {
    pub word: String,
    pub weight: f64,
}

pub async fn topics_handler(State(state): State<AppState>, Query(params): Query<TopicParams>) -> ApiResult<Vec<Vec<TopicWord>>> {
    let session = state.session.read();
    let topics = session.topics(params.n.clamp(1, MAX_K))?;
    Ok(Json(
        topics
            .into_iter()
            .map(|words| words.into_iter().map(|(w, weight)| TopicWord { word: w.to_string(), weight }).collect())
            .collect(),
    ))
}

#[derive(Deserialize)]
pub struct DocParams {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
}

fn default_max_lines() -> usize {
    8
}

#[derive(Serialize)]
pub struct DocResponse {
    pub doc_id: DocId,
    pub title: String,
    pub tags: Vec<String>,
    pub location: Option<Location>,
    pub source: Option<SourceExcerpt>,
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
    Query(params): Query<DocParams>,
) -> ApiResult<DocResponse> {
    let session = state.session.read();
    let metadata = session.metadata();
    let title = metadata.title(doc_id)?.to_string();
    // An unreadable source file still returns the rest of the document.
    let source = match metadata.read_source(doc_id, params.max_lines) {
        Ok(source) => source,
        Err(SearchError::Io(e)) => {
            tracing::warn!(doc_id, error = %e, "source file unreadable");
            None
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Json(DocResponse {
        doc_id,
        title,
        tags: metadata.tags_of(doc_id)?.into_iter().map(String::from).collect(),
        location: metadata.location(doc_id)?,
        source,
    }))
}

#[derive(Deserialize)]
pub struct TagRequest {
    pub tag: String,
    #[serde(default)]
    pub remove: bool,
}

#[derive(Serialize)]
pub struct TagResponse {
    pub doc_id: DocId,
    pub tags: Vec<String>,
    pub changed: bool,
}

/// Tag or untag a document and persist the metadata artifact.
pub async fn tag_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<DocId>,
    Json(req): Json<TagRequest>,
) -> ApiResult<TagResponse> {
    authorize(&state, &headers)?;
    if req.tag.trim().is_empty() {
        return Err(ApiError(StatusCode::BAD_REQUEST, "tag must not be empty".into()));
    }
    let mut session = state.session.write();
    // Edit a copy; the live session only changes once the copy is on disk.
    let mut metadata = session.metadata().clone();
    let changed = if req.remove {
        metadata.untag_document(doc_id, req.tag.trim())?
    } else {
        metadata.tag_document(doc_id, req.tag.trim())?
    };
    if changed {
        save_metadata(&metadata, &state.bundle_dir)?;
        session.replace_metadata(metadata)?;
        tracing::info!(doc_id, tag = %req.tag, remove = req.remove, "tags updated");
    }
    let tags = session.metadata().tags_of(doc_id)?.into_iter().map(String::from).collect();
    Ok(Json(TagResponse { doc_id, tags, changed }))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError(StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError(StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
