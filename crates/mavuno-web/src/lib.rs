//! Axum JSON API for the Mavuno surplus exchange.
//!
//! The browser frontend is a separate SPA; this crate exposes the routes it
//! consumes: listing CRUD with embedded match results, and the forecasting
//! endpoints (demo data, JSON history, raw CSV upload).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mavuno_core::{DataPoint, Listing, ListingDraft, ListingSource, ListingStatus, ListingType};
use mavuno_forecast::{generate_demo_data, parse_csv_data, Forecaster};
use mavuno_match::{BeneficiaryRegistry, MatchConfig, MatchEngine};
use mavuno_store::{ListingFilter, ListingStore, StoreError, UploadStore};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "mavuno-web";

pub struct AppState {
    pub store: ListingStore,
    pub uploads: UploadStore,
    pub forecaster: Forecaster,
}

impl AppState {
    pub async fn open(data_dir: impl Into<PathBuf>, engine: MatchEngine) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        let store = ListingStore::open(&data_dir, engine).await?;
        let uploads = UploadStore::new(data_dir.join("uploads"));
        Ok(Self {
            store,
            uploads,
            forecaster: Forecaster::default(),
        })
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/listings", get(listings_handler).post(create_listing_handler))
        .route("/api/listings/waste", get(waste_listings_handler))
        .route("/api/listings/{id}", get(listing_detail_handler))
        .route("/api/listings/{id}/matches", get(listing_matches_handler))
        .route("/api/listings/{id}/status", post(update_status_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/forecast", post(forecast_handler))
        .route("/api/forecast/demo", get(forecast_demo_handler))
        .route("/api/forecast/csv", post(forecast_csv_handler))
        .with_state(state)
}

/// Bind and serve using environment configuration:
/// `MAVUNO_WEB_PORT` (default 8080), `MAVUNO_DATA_DIR` (default `./data`),
/// `MAVUNO_BENEFICIARIES` (YAML registry path; built-in catalogue when
/// unset).
pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("MAVUNO_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let data_dir = std::env::var("MAVUNO_DATA_DIR").unwrap_or_else(|_| "./data".to_string());

    let registry = match std::env::var("MAVUNO_BENEFICIARIES") {
        Ok(path) => BeneficiaryRegistry::load(std::path::Path::new(&path))?,
        Err(_) => BeneficiaryRegistry::builtin(),
    };
    let engine = MatchEngine::new(registry, MatchConfig::default());

    let state = Arc::new(AppState::open(&data_dir, engine).await?);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, data_dir, "serving mavuno web api");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

#[derive(Debug, Deserialize, Default)]
struct ListingsQuery {
    #[serde(rename = "type")]
    kind: Option<ListingType>,
    source: Option<ListingSource>,
    status: Option<ListingStatus>,
    page: Option<usize>,
    per_page: Option<usize>,
}

#[derive(Debug, Serialize)]
struct Page<T> {
    items: Vec<T>,
    page: usize,
    total_pages: usize,
    total: usize,
}

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    status: ListingStatus,
}

#[derive(Debug, Serialize)]
struct CsvForecastResponse {
    content_hash: String,
    rows_parsed: usize,
    deduplicated: bool,
    result: mavuno_core::ForecastResult,
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn listings_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListingsQuery>,
) -> Json<Page<Listing>> {
    let filter = ListingFilter {
        kind: query.kind,
        source: query.source,
        status: query.status,
    };
    let rows = state.store.filtered(filter).await;
    Json(paginate(rows, query.page, query.per_page))
}

async fn create_listing_handler(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<ListingDraft>,
) -> Response {
    match state.store.create(draft).await {
        Ok(listing) => (StatusCode::CREATED, Json(listing)).into_response(),
        Err(err) => store_error(err),
    }
}

async fn waste_listings_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Listing>> {
    Json(state.store.waste_listings().await)
}

async fn listing_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
) -> Response {
    match state.store.get(id).await {
        Some(listing) => Json(listing).into_response(),
        None => not_found(id),
    }
}

async fn listing_matches_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
) -> Response {
    match state.store.get(id).await {
        Some(listing) => Json(listing.matches).into_response(),
        None => not_found(id),
    }
}

async fn update_status_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
    Json(update): Json<StatusUpdate>,
) -> Response {
    match state.store.update_status(id, update.status).await {
        Ok(listing) => Json(listing).into_response(),
        Err(err) => store_error(err),
    }
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let listings = state.store.list().await;
    let mut by_type = BTreeMap::<String, usize>::new();
    let mut by_status = BTreeMap::<String, usize>::new();
    for listing in &listings {
        *by_type.entry(enum_label(&listing.kind)).or_default() += 1;
        *by_status.entry(enum_label(&listing.status)).or_default() += 1;
    }
    Json(serde_json::json!({
        "total": listings.len(),
        "by_type": by_type,
        "by_status": by_status,
        "beneficiaries": state.store.engine().registry().len(),
    }))
}

async fn forecast_handler(
    State(state): State<Arc<AppState>>,
    Json(history): Json<Vec<DataPoint>>,
) -> Json<mavuno_core::ForecastResult> {
    Json(state.forecaster.forecast(&history, &mut rand::thread_rng()))
}

async fn forecast_demo_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let mut rng = rand::thread_rng();
    let history = generate_demo_data(&mut rng);
    let result = state.forecaster.forecast(&history, &mut rng);
    Json(serde_json::json!({
        "history": history,
        "result": result,
    }))
}

async fn forecast_csv_handler(State(state): State<Arc<AppState>>, body: String) -> Response {
    let stored = match state.uploads.store_bytes("csv", body.as_bytes()).await {
        Ok(stored) => stored,
        Err(err) => return store_error(err),
    };
    let history = parse_csv_data(&body);
    if history.is_empty() {
        warn!(content_hash = %stored.content_hash, "csv upload produced no usable rows");
    }
    let result = state.forecaster.forecast(&history, &mut rand::thread_rng());
    Json(CsvForecastResponse {
        content_hash: stored.content_hash,
        rows_parsed: history.len(),
        deduplicated: stored.deduplicated,
        result,
    })
    .into_response()
}

fn paginate<T>(rows: Vec<T>, page: Option<usize>, per_page: Option<usize>) -> Page<T> {
    let total = rows.len();
    let per_page = per_page.unwrap_or(20).max(1);
    let total_pages = total.max(1).div_ceil(per_page);
    let page = page.unwrap_or(1).clamp(1, total_pages);
    let start = (page - 1) * per_page;
    let items = rows.into_iter().skip(start).take(per_page).collect();
    Page {
        items,
        page,
        total_pages,
        total,
    }
}

fn enum_label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(ToString::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

fn not_found(id: Uuid) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": format!("listing {id} not found") })),
    )
        .into_response()
}

fn store_error(err: StoreError) -> Response {
    match err {
        StoreError::NotFound(id) => not_found(id),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": other.to_string() })),
        )
            .into_response(),
    }
}
