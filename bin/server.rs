// Relief Desk - Web Server
// REST API over the verification controller with Axum

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use relief_desk::{
    logging, mock, AppConfig, AuditSink, Beneficiary, BeneficiaryFilter, ConfirmOutcome,
    ConfirmationPreview, DateWindow, Event, FanoutSink, IdentityStatus, AccountStatus, PendingAction,
    RecordStore, Sort, SortDirection, SortKey, SqliteAuditSink, SqliteStore, Statistics,
    StoreError, TracingSink, VerificationController, VerificationError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
struct AppState {
    controller: Arc<Mutex<VerificationController>>,
    store: SqliteStore,
    audit: SqliteAuditSink,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Failure surfaced as an HTTP status plus an `ApiResponse` body
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<VerificationError> for ApiError {
    fn from(err: VerificationError) -> Self {
        let status = match &err {
            VerificationError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            VerificationError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            VerificationError::Store(StoreError::Backend(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            VerificationError::EmptyBatch => StatusCode::BAD_REQUEST,
            VerificationError::BatchInFlight => StatusCode::CONFLICT,
            VerificationError::PendingActionChanged => StatusCode::CONFLICT,
        };
        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        VerificationError::from(err).into()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{:#}", err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "request failed");
        }
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

// ============================================================================
// Request / response shapes
// ============================================================================

/// Query string of `GET /api/beneficiaries`
#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    search: Option<String>,
    status: Option<AccountStatus>,
    identity_status: Option<IdentityStatus>,
    governorate: Option<String>,
    created_within: Option<DateWindow>,
    sort: Option<SortKey>,
    direction: Option<SortDirection>,
    page: Option<usize>,
}

impl ListQuery {
    fn filter(&self) -> BeneficiaryFilter {
        let mut filter = BeneficiaryFilter::new();
        if let Some(search) = &self.search {
            filter = filter.with_search(search);
        }
        if let Some(status) = self.status {
            filter = filter.with_status(status);
        }
        if let Some(status) = self.identity_status {
            filter = filter.with_identity_status(status);
        }
        if let Some(governorate) = &self.governorate {
            filter = filter.with_governorate(governorate);
        }
        if let Some(window) = self.created_within {
            filter = filter.created_within(window);
        }
        filter
    }
}

#[derive(Serialize)]
struct PageResponse {
    items: Vec<Beneficiary>,
    page: usize,
    page_size: usize,
    total_pages: usize,
    total: usize,
    selected: Vec<String>,
}

impl PageResponse {
    fn from_controller(controller: &VerificationController) -> Self {
        let page = controller.page();
        PageResponse {
            items: controller.current_page().to_vec(),
            page: page.number,
            page_size: page.size,
            total_pages: controller.total_pages(),
            total: controller.beneficiaries().len(),
            selected: controller.selection().to_vec(),
        }
    }
}

#[derive(Serialize)]
struct SelectionResponse {
    ids: Vec<String>,
    count: usize,
}

impl SelectionResponse {
    fn from_controller(controller: &VerificationController) -> Self {
        let ids = controller.selection().to_vec();
        SelectionResponse {
            count: ids.len(),
            ids,
        }
    }
}

#[derive(Deserialize)]
struct ToggleRequest {
    id: String,
}

#[derive(Serialize)]
struct StagedResponse {
    action: PendingAction,
    preview: ConfirmationPreview,
}

impl StagedResponse {
    fn from_controller(controller: &VerificationController) -> Option<Self> {
        let action = controller.pending_action()?.clone();
        let preview = controller.preview()?;
        Some(StagedResponse { action, preview })
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/beneficiaries - Filtered, sorted, paged list
async fn list_beneficiaries(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PageResponse> {
    let mut controller = state.controller.lock().await;

    if let Some(key) = query.sort {
        let direction = query.direction.unwrap_or(SortDirection::Asc);
        controller.set_sort(Sort::new(key, direction));
    }
    controller.set_filter(query.filter()).await?;
    if let Some(page) = query.page {
        controller.set_page(page);
    }

    ok(PageResponse::from_controller(&controller))
}

/// GET /api/stats - Counts over every beneficiary
async fn get_stats(State(state): State<AppState>) -> ApiResult<Statistics> {
    let all = state.store.list(&BeneficiaryFilter::default()).await?;
    ok(Statistics::from_beneficiaries(&all))
}

/// GET /api/beneficiaries/:id
async fn get_beneficiary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Beneficiary> {
    ok(state.store.get(&id).await?)
}

/// GET /api/beneficiaries/:id/events - Audit trail, newest first
async fn get_beneficiary_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Event>> {
    ok(state.audit.events_for(&id)?)
}

/// GET /api/selection
async fn get_selection(State(state): State<AppState>) -> ApiResult<SelectionResponse> {
    let controller = state.controller.lock().await;
    ok(SelectionResponse::from_controller(&controller))
}

/// POST /api/selection/toggle - Add or remove one id
async fn toggle_selection(
    State(state): State<AppState>,
    Json(request): Json<ToggleRequest>,
) -> ApiResult<SelectionResponse> {
    let mut controller = state.controller.lock().await;
    controller.toggle_selection(&request.id);
    ok(SelectionResponse::from_controller(&controller))
}

/// POST /api/selection/page - Select-all toggle for the current page
async fn select_page(State(state): State<AppState>) -> ApiResult<SelectionResponse> {
    let mut controller = state.controller.lock().await;
    controller.select_current_page();
    ok(SelectionResponse::from_controller(&controller))
}

/// DELETE /api/selection
async fn clear_selection(State(state): State<AppState>) -> ApiResult<SelectionResponse> {
    let mut controller = state.controller.lock().await;
    controller.clear_selection();
    ok(SelectionResponse::from_controller(&controller))
}

/// POST /api/selection/approve - Stage batch verification of the selection
async fn stage_selection_approve(State(state): State<AppState>) -> ApiResult<Option<StagedResponse>> {
    let mut controller = state.controller.lock().await;
    controller.batch_approve_selected()?;
    ok(StagedResponse::from_controller(&controller))
}

/// POST /api/selection/reupload - Stage batch reupload request for the selection
async fn stage_selection_reupload(
    State(state): State<AppState>,
) -> ApiResult<Option<StagedResponse>> {
    let mut controller = state.controller.lock().await;
    controller.batch_request_reupload_selected()?;
    ok(StagedResponse::from_controller(&controller))
}

/// POST /api/actions - Stage any action for confirmation
async fn stage_action(
    State(state): State<AppState>,
    Json(action): Json<PendingAction>,
) -> ApiResult<Option<StagedResponse>> {
    let mut controller = state.controller.lock().await;
    controller.stage(action)?;
    ok(StagedResponse::from_controller(&controller))
}

/// GET /api/actions - The pending action and its preview, if any
async fn get_pending_action(State(state): State<AppState>) -> ApiResult<Option<StagedResponse>> {
    let controller = state.controller.lock().await;
    ok(StagedResponse::from_controller(&controller))
}

/// DELETE /api/actions - Cancel without side effects
async fn cancel_action(State(state): State<AppState>) -> ApiResult<Option<PendingAction>> {
    let mut controller = state.controller.lock().await;
    ok(controller.cancel())
}

/// POST /api/actions/confirm - Execute the pending action.
///
/// The body is the `action` returned when it was staged; if another client
/// has replaced it since, nothing runs and 409 is returned.
async fn confirm_action(
    State(state): State<AppState>,
    Json(previewed): Json<PendingAction>,
) -> ApiResult<ConfirmOutcome> {
    let mut controller = state.controller.lock().await;
    ok(controller.confirm_previewed(&previewed).await?)
}

fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/beneficiaries", get(list_beneficiaries))
        .route("/beneficiaries/:id", get(get_beneficiary))
        .route("/beneficiaries/:id/events", get(get_beneficiary_events))
        .route("/stats", get(get_stats))
        .route("/selection", get(get_selection).delete(clear_selection))
        .route("/selection/toggle", post(toggle_selection))
        .route("/selection/page", post(select_page))
        .route("/selection/approve", post(stage_selection_approve))
        .route("/selection/reupload", post(stage_selection_reupload))
        .route(
            "/actions",
            get(get_pending_action).post(stage_action).delete(cancel_action),
        )
        .route("/actions/confirm", post(confirm_action))
        .with_state(state)
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("info");

    println!("🌐 Relief Desk - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = AppConfig::load()?;

    let store = SqliteStore::open(&config.database_path)?;
    println!("✓ Database opened: {:?}", config.database_path);

    if config.seed_mock_data {
        let seeded = mock::seed_if_empty(&store).await?;
        if seeded > 0 {
            println!("✓ Seeded {} demonstration beneficiaries", seeded);
        }
    }

    let audit = SqliteAuditSink::new(store.connection(), &config.actor);
    let sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(TracingSink), Arc::new(audit.clone())];

    let mut controller = VerificationController::new(
        Arc::new(store.clone()),
        Arc::new(FanoutSink::new(sinks)),
    )
    .with_page_size(config.page_size);
    controller.refresh().await?;

    // Create shared state
    let state = AppState {
        controller: Arc::new(Mutex::new(controller)),
        store,
        audit,
    };

    let app = Router::new()
        .nest("/api", api_routes(state))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "server listening");
    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   API: http://{}/api/beneficiaries", config.bind_addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server terminated")?;

    Ok(())
}
