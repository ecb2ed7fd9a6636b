use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    errors::{classify_database_error, ApiError, ApiErrorResponse, ErrorContext},
    filter::{FilterSelection, QuestionFilter},
    models::*,
    query::QuestionQuery,
    question_service::QuestionService,
    reconciler::{ListSync, ReconcileReport},
    reminders::ReminderService,
    solutions::SolutionService,
};

// Import logging macros
use crate::api_error;
use crate::{log_api_error, log_api_start, log_api_success, log_api_warn};

#[derive(Clone)]
pub struct AppState {
    pub question_service: QuestionService,
    /// Inbound list merges are queued behind the reconcile worker
    pub list_sync: ListSync,
    pub reminder_service: ReminderService,
    pub solution_service: SolutionService,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiErrorResponse>;

#[derive(Debug, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub filter: QuestionFilter,
    pub text: Option<String>,
    #[serde(default)]
    pub only_unsolved: bool,
}

#[derive(Debug, Deserialize)]
pub struct SyncListsRequest {
    pub lists: Vec<ListSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct BuildFilterRequest {
    pub selection: FilterSelection,
    #[serde(default)]
    pub clear_all: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

fn question_not_found(operation: &str, id: i64) -> ApiErrorResponse {
    ApiError::NotFound(format!("Question with ID '{}' not found", id))
        .to_response_with_context(ErrorContext::new(operation, "question").with_id(&id.to_string()))
}

fn reminder_not_found(operation: &str, id: Uuid) -> ApiErrorResponse {
    ApiError::NotFound(format!("Reminder with ID '{}' not found", id))
        .to_response_with_context(ErrorContext::new(operation, "reminder").with_id(&id.to_string()))
}

/// Fetch the question or produce the 404 response
async fn require_question(state: &AppState, operation: &str, id: i64) -> Result<Question, ApiErrorResponse> {
    match state.question_service.get_question(id).await {
        Ok(Some(question)) => Ok(question),
        Ok(None) => {
            log_api_warn!(operation, question_id = id, "question not found");
            Err(question_not_found(operation, id))
        }
        Err(e) => {
            log_api_error!(operation, question_id = id, error = e, "database error retrieving question");
            Err(ApiError::DatabaseError(e)
                .to_response_with_context(ErrorContext::new(operation, "question").with_id(&id.to_string())))
        }
    }
}

// Question endpoints
pub async fn get_all_questions(State(state): State<AppState>) -> ApiResult<Vec<Question>> {
    log_api_start!("get_all_questions");

    match state.question_service.get_all_questions().await {
        Ok(questions) => {
            log_api_success!("get_all_questions", count = questions.len(), "questions listed");
            Ok(Json(ApiResponse::success(questions)))
        }
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("get_all_questions", "question"))),
    }
}

pub async fn search_questions(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Vec<Question>> {
    debug!(
        filter = %request.filter.summary(),
        text = ?request.text,
        only_unsolved = request.only_unsolved,
        "Searching questions"
    );

    let mut query = QuestionQuery::new(request.filter).only_unsolved(request.only_unsolved);
    if let Some(text) = request.text {
        query = query.with_text(text);
    }

    match state.question_service.search(&query).await {
        Ok(questions) => {
            log_api_success!("search_questions", count = questions.len(), "search completed");
            Ok(Json(ApiResponse::success(questions)))
        }
        Err(e) => Err(classify_database_error(&e)
            .to_response_with_context(ErrorContext::new("search_questions", "question"))),
    }
}

pub async fn get_question(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Question> {
    log_api_start!("get_question", question_id = id);
    let question = require_question(&state, "get_question", id).await?;
    state.solution_service.show(id);
    Ok(Json(ApiResponse::success(question)))
}

async fn toggle_list(state: &AppState, kind: ListKind, id: i64) -> ApiResult<Question> {
    let operation = match kind {
        ListKind::Solved => "toggle_solved",
        ListKind::Saved => "toggle_saved",
    };
    log_api_start!(operation, question_id = id);

    let result = match kind {
        ListKind::Solved => state.question_service.toggle_solved(id).await,
        ListKind::Saved => state.question_service.toggle_saved(id).await,
    };
    match result {
        Ok(Some(question)) => {
            log_api_success!(operation, question_id = id, "list flag toggled");
            Ok(Json(ApiResponse::success(question)))
        }
        Ok(None) => Err(question_not_found(operation, id)),
        Err(e) => {
            log_api_error!(operation, question_id = id, error = e, "failed to toggle list flag");
            Err(ApiError::DatabaseError(e)
                .to_response_with_context(ErrorContext::new(operation, "question").with_id(&id.to_string())))
        }
    }
}

pub async fn toggle_solved(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Question> {
    toggle_list(&state, ListKind::Solved, id).await
}

pub async fn toggle_saved(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Question> {
    toggle_list(&state, ListKind::Saved, id).await
}

pub async fn get_note(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Option<Note>> {
    require_question(&state, "get_note", id).await?;

    match state.question_service.note(id).await {
        Ok(note) => Ok(Json(ApiResponse::success(note))),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("get_note", "note").with_id(&id.to_string()))),
    }
}

pub async fn save_note(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<SaveNoteRequest>,
) -> ApiResult<Option<Note>> {
    require_question(&state, "save_note", id).await?;

    match state.question_service.save_note(id, &request.content).await {
        Ok(note) => {
            log_api_success!("save_note", question_id = id, if note.is_some() { "note saved" } else { "note cleared" });
            Ok(Json(ApiResponse::success(note)))
        }
        Err(e) => Err(classify_database_error(&e)
            .to_response_with_context(ErrorContext::new("save_note", "note").with_id(&id.to_string()))),
    }
}

pub async fn get_solutions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<BTreeMap<Language, SolutionSlot>> {
    let question = require_question(&state, "get_solutions", id).await?;

    match state.solution_service.populate_displayed(&question).await {
        Ok(slots) => Ok(Json(ApiResponse::success(slots))),
        Err(e) => {
            log_api_error!("get_solutions", question_id = id, error = e, "failed to populate solutions");
            Err(ApiError::FetchError(e.to_string())
                .to_response_with_context(ErrorContext::new("get_solutions", "solution").with_id(&id.to_string())))
        }
    }
}

// List sync endpoints
pub async fn get_list_snapshot(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> ApiResult<ListSnapshot> {
    let kind: ListKind = kind
        .parse()
        .map_err(|e: anyhow::Error| api_error!(validation, "get_list_snapshot", "list", e))?;

    match state.question_service.list_snapshot(kind).await {
        Ok(snapshot) => Ok(Json(ApiResponse::success(snapshot))),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("get_list_snapshot", "list").with_id(kind.as_str()))),
    }
}

pub async fn sync_lists(
    State(state): State<AppState>,
    Json(request): Json<SyncListsRequest>,
) -> ApiResult<ReconcileReport> {
    info!(lists = request.lists.len(), "Applying inbound list snapshots");

    match state.list_sync.submit(request.lists).await {
        Ok(report) => {
            log_api_success!("sync_lists", count = report.touched().len(), "lists reconciled");
            Ok(Json(ApiResponse::success(report)))
        }
        Err(e) => {
            log_api_error!("sync_lists", error = e, "reconcile failed");
            Err(ApiError::DatabaseError(e).to_response_with_context(ErrorContext::new("sync_lists", "list")))
        }
    }
}

// Facets, filters and stats
pub async fn get_tags(State(state): State<AppState>) -> ApiResult<Vec<FacetCount>> {
    match state.question_service.tags().await {
        Ok(tags) => Ok(Json(ApiResponse::success(tags))),
        Err(e) => Err(ApiError::DatabaseError(e).to_response_with_context(ErrorContext::new("get_tags", "tag"))),
    }
}

pub async fn get_companies(State(state): State<AppState>) -> ApiResult<Vec<FacetCount>> {
    match state.question_service.companies().await {
        Ok(companies) => Ok(Json(ApiResponse::success(companies))),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("get_companies", "company"))),
    }
}

pub async fn build_filter(Json(request): Json<BuildFilterRequest>) -> ApiResult<QuestionFilter> {
    let filter = request.selection.build(request.clear_all);
    debug!(filter = %filter.summary(), clear_all = request.clear_all, "Filter built");
    Ok(Json(ApiResponse::success(filter)))
}

pub async fn get_stats(State(state): State<AppState>) -> ApiResult<ProgressStats> {
    match state.question_service.stats().await {
        Ok(stats) => Ok(Json(ApiResponse::success(stats))),
        Err(e) => Err(ApiError::DatabaseError(e).to_response_with_context(ErrorContext::new("get_stats", "stats"))),
    }
}

// Reminder endpoints
pub async fn get_reminders(State(state): State<AppState>) -> ApiResult<Vec<Reminder>> {
    match state.reminder_service.list().await {
        Ok(reminders) => {
            log_api_success!("get_reminders", count = reminders.len(), "reminders listed");
            Ok(Json(ApiResponse::success(reminders)))
        }
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("get_reminders", "reminder"))),
    }
}

pub async fn create_reminder(
    State(state): State<AppState>,
    Json(request): Json<CreateReminderRequest>,
) -> ApiResult<Reminder> {
    log_api_start!("create_reminder");

    match state.reminder_service.create(request).await {
        Ok(reminder) => {
            log_api_success!("create_reminder", reminder_id = reminder.id, "reminder created");
            Ok(Json(ApiResponse::success(reminder)))
        }
        Err(e) => Err(api_error!(database, "create_reminder", "reminder", e)),
    }
}

pub async fn get_reminder(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Reminder> {
    log_api_start!("get_reminder", reminder_id = id);

    match state.reminder_service.get(id).await {
        Ok(Some(reminder)) => Ok(Json(ApiResponse::success(reminder))),
        Ok(None) => Err(api_error!(not_found, "get_reminder", "reminder", id)),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("get_reminder", "reminder").with_id(&id.to_string()))),
    }
}

pub async fn update_reminder(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateReminderRequest>,
) -> ApiResult<Reminder> {
    log_api_start!("update_reminder", reminder_id = id);

    match state.reminder_service.update(id, request).await {
        Ok(Some(reminder)) => {
            log_api_success!("update_reminder", reminder_id = id, "reminder updated");
            Ok(Json(ApiResponse::success(reminder)))
        }
        Ok(None) => Err(reminder_not_found("update_reminder", id)),
        Err(e) => Err(classify_database_error(&e)
            .to_response_with_context(ErrorContext::new("update_reminder", "reminder").with_id(&id.to_string()))),
    }
}

pub async fn set_reminder_enabled(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetEnabledRequest>,
) -> ApiResult<Reminder> {
    match state.reminder_service.set_enabled(id, request.enabled).await {
        Ok(Some(reminder)) => {
            log_api_success!("set_reminder_enabled", reminder_id = id, if reminder.enabled { "enabled" } else { "disabled" });
            Ok(Json(ApiResponse::success(reminder)))
        }
        Ok(None) => Err(reminder_not_found("set_reminder_enabled", id)),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("set_reminder_enabled", "reminder").with_id(&id.to_string()))),
    }
}

pub async fn mark_reminder_fired(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Reminder> {
    match state.reminder_service.mark_fired(id).await {
        Ok(Some(reminder)) => Ok(Json(ApiResponse::success(reminder))),
        Ok(None) => Err(reminder_not_found("mark_reminder_fired", id)),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("mark_reminder_fired", "reminder").with_id(&id.to_string()))),
    }
}

pub async fn delete_reminder(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<bool> {
    match state.reminder_service.delete(id).await {
        Ok(true) => {
            log_api_success!("delete_reminder", reminder_id = id, "reminder deleted");
            Ok(Json(ApiResponse::success(true)))
        }
        Ok(false) => Err(reminder_not_found("delete_reminder", id)),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("delete_reminder", "reminder").with_id(&id.to_string()))),
    }
}

/// `data` is null when every matching question is already solved
pub async fn get_reminder_suggestion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Option<Question>> {
    if let Ok(None) = state.reminder_service.get(id).await {
        return Err(reminder_not_found("get_reminder_suggestion", id));
    }

    match state.reminder_service.suggest_question(id).await {
        Ok(question) => Ok(Json(ApiResponse::success(question))),
        Err(e) => Err(ApiError::DatabaseError(e)
            .to_response_with_context(ErrorContext::new("get_reminder_suggestion", "reminder").with_id(&id.to_string()))),
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Question routes
        .route("/api/questions", get(get_all_questions))
        .route("/api/questions/search", post(search_questions))
        .route("/api/questions/:id", get(get_question))
        .route("/api/questions/:id/solved", post(toggle_solved))
        .route("/api/questions/:id/saved", post(toggle_saved))
        .route("/api/questions/:id/note", get(get_note).put(save_note))
        .route("/api/questions/:id/solutions", get(get_solutions))

        // List sync routes
        .route("/api/lists/:kind", get(get_list_snapshot))
        .route("/api/sync/lists", post(sync_lists))

        // Filter screen routes
        .route("/api/tags", get(get_tags))
        .route("/api/companies", get(get_companies))
        .route("/api/filters/build", post(build_filter))
        .route("/api/stats", get(get_stats))

        // Reminder routes
        .route("/api/reminders", get(get_reminders).post(create_reminder))
        .route(
            "/api/reminders/:id",
            get(get_reminder).put(update_reminder).delete(delete_reminder),
        )
        .route("/api/reminders/:id/enabled", post(set_reminder_enabled))
        .route("/api/reminders/:id/fired", post(mark_reminder_fired))
        .route("/api/reminders/:id/suggestion", get(get_reminder_suggestion))

        .with_state(state)
}
