//! The application viewset.
//!
//! One handler serves every operation on the application resource from a
//! single collection path; individual records are addressed with the `id`
//! query parameter.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        ApplicationIdQuery, ApplicationListResponse, ApplicationQuery, ApplicationResponse,
        CreateApplicationRequest, UpdateApplicationRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
    },
    models::{Application, ApplicationFilter},
    routes::APPLY_ROUTE,
    services::{record_application_event, ReplaceOutcome},
    startup::AppState,
};

/// Method dispatch for the `apply` route.
pub fn application_viewset() -> MethodRouter<AppState> {
    get(list_or_retrieve)
        .post(create_application)
        .put(update_application)
        .patch(partial_update_application)
        .delete(delete_application)
}

fn query_error(rejection: QueryRejection) -> AppError {
    AppError::BadRequest(anyhow::anyhow!(rejection.body_text()))
}

fn json_error(rejection: JsonRejection) -> AppError {
    AppError::BadRequest(anyhow::anyhow!(rejection.body_text()))
}

fn not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Application not found"))
}

/// Canonical form of a record id; anything that is not a UUID cannot exist.
fn parse_id(raw: &str) -> Result<String, AppError> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.to_string())
        .map_err(|_| not_found())
}

fn required_id(query: Result<Query<ApplicationIdQuery>, QueryRejection>) -> Result<String, AppError> {
    let Query(query) = query.map_err(query_error)?;
    let raw = query.id.ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("Missing 'id' query parameter"))
    })?;
    parse_id(&raw)
}

async fn find_application(state: &AppState, id: &str) -> Result<Application, AppError> {
    state
        .store
        .get(id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(not_found)
}

/// Write `updated` over the `current` snapshot it was derived from.
async fn save_application(
    state: &AppState,
    current: &Application,
    updated: &Application,
) -> Result<(), AppError> {
    let outcome = state
        .store
        .replace(current, updated)
        .await
        .map_err(AppError::DatabaseError)?;

    match outcome {
        ReplaceOutcome::Replaced => Ok(()),
        ReplaceOutcome::Stale => {
            tracing::warn!(application_id = %current.id, "Concurrent modification detected");
            Err(AppError::Conflict(anyhow::anyhow!(
                "Application was modified concurrently, retry the request"
            )))
        }
        ReplaceOutcome::Missing => Err(not_found()),
    }
}

/// `GET` lists applications, or retrieves one when `id` is given.
pub async fn list_or_retrieve(
    State(state): State<AppState>,
    query: Result<Query<ApplicationQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(query_error)?;

    match query.id.as_deref() {
        Some(raw) => {
            let id = parse_id(raw)?;
            tracing::debug!(application_id = %id, "Fetching application");
            let application = find_application(&state, &id).await?;
            Ok(Json(ApplicationResponse::from(application)).into_response())
        }
        None => list_applications(&state, query).await.map(IntoResponse::into_response),
    }
}

async fn list_applications(
    state: &AppState,
    query: ApplicationQuery,
) -> Result<Json<ApplicationListResponse>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let skip = (page - 1).saturating_mul(page_size);

    let filter = ApplicationFilter {
        status: query.status,
    };

    let (applications, total) = state
        .store
        .list(&filter, page_size, skip)
        .await
        .map_err(AppError::DatabaseError)?;

    tracing::debug!(
        page,
        page_size,
        total,
        status = ?filter.status,
        "Listed applications"
    );

    Ok(Json(ApplicationListResponse {
        applications: applications
            .into_iter()
            .map(ApplicationResponse::from)
            .collect(),
        total,
        page,
        page_size,
        total_pages: total.div_ceil(page_size),
    }))
}

/// `POST` submits a new application.
pub async fn create_application(
    State(state): State<AppState>,
    payload: Result<Json<CreateApplicationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload.map_err(json_error)?;
    let payload = payload.normalized();
    payload.validate()?;

    let application = Application::new(
        payload.full_name,
        payload.email,
        payload.phone,
        payload.organization,
        payload.message,
    );

    tracing::info!(
        application_id = %application.id,
        email = %application.email,
        "Creating application"
    );

    state
        .store
        .insert(application.clone())
        .await
        .map_err(AppError::DatabaseError)?;
    record_application_event("created");

    let location = format!("{}?id={}", state.urls.reverse(APPLY_ROUTE)?, application.id);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(ApplicationResponse::from(application)),
    ))
}

/// `PUT` replaces the applicant details; the status is left alone.
pub async fn update_application(
    State(state): State<AppState>,
    query: Result<Query<ApplicationIdQuery>, QueryRejection>,
    payload: Result<Json<CreateApplicationRequest>, JsonRejection>,
) -> Result<Json<ApplicationResponse>, AppError> {
    let id = required_id(query)?;
    let Json(payload) = payload.map_err(json_error)?;
    let payload = payload.normalized();
    payload.validate()?;

    let current = find_application(&state, &id).await?;

    if current.status.is_terminal() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Application is {} and can no longer be changed",
            current.status
        )));
    }

    let mut application = current.clone();

    application.full_name = payload.full_name;
    application.email = payload.email;
    application.phone = payload.phone;
    application.organization = payload.organization;
    application.message = payload.message;
    application.updated_at = Utc::now();

    save_application(&state, &current, &application).await?;
    record_application_event("updated");

    tracing::info!(application_id = %id, "Replaced application");

    Ok(Json(ApplicationResponse::from(application)))
}

/// `PATCH` changes any subset of fields, including the status.
pub async fn partial_update_application(
    State(state): State<AppState>,
    query: Result<Query<ApplicationIdQuery>, QueryRejection>,
    payload: Result<Json<UpdateApplicationRequest>, JsonRejection>,
) -> Result<Json<ApplicationResponse>, AppError> {
    let id = required_id(query)?;
    let Json(payload) = payload.map_err(json_error)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Request body contains no fields to update"
        )));
    }
    let payload = payload.normalized();
    payload.validate()?;

    let current = find_application(&state, &id).await?;
    let previous_status = current.status;

    let changes_details = payload.full_name.is_some()
        || payload.email.is_some()
        || payload.phone.is_some()
        || payload.organization.is_some()
        || payload.message.is_some();

    if changes_details && previous_status.is_terminal() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Application is {} and can no longer be changed",
            previous_status
        )));
    }

    if !changes_details && payload.status == Some(previous_status) {
        tracing::debug!(application_id = %id, "Status unchanged, nothing to save");
        return Ok(Json(ApplicationResponse::from(current)));
    }

    let mut application = current.clone();

    if let Some(next) = payload.status {
        if !previous_status.can_transition_to(next) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Cannot move application from {} to {}",
                previous_status,
                next
            )));
        }
        application.status = next;
    }

    if let Some(full_name) = payload.full_name {
        application.full_name = full_name;
    }
    if let Some(email) = payload.email {
        application.email = email;
    }
    // An empty string clears an optional field
    if let Some(phone) = payload.phone {
        application.phone = Some(phone).filter(|s| !s.is_empty());
    }
    if let Some(organization) = payload.organization {
        application.organization = Some(organization).filter(|s| !s.is_empty());
    }
    if let Some(message) = payload.message {
        application.message = Some(message).filter(|s| !s.is_empty());
    }
    application.updated_at = Utc::now();

    save_application(&state, &current, &application).await?;
    record_application_event("updated");

    if application.status != previous_status {
        record_application_event(application.status.as_str());
        tracing::info!(
            application_id = %id,
            from = %previous_status,
            to = %application.status,
            "Application status changed"
        );
    } else {
        tracing::info!(application_id = %id, "Updated application");
    }

    Ok(Json(ApplicationResponse::from(application)))
}

/// `DELETE` removes an application.
pub async fn delete_application(
    State(state): State<AppState>,
    query: Result<Query<ApplicationIdQuery>, QueryRejection>,
) -> Result<StatusCode, AppError> {
    let id = required_id(query)?;

    let deleted = state
        .store
        .delete(&id)
        .await
        .map_err(AppError::DatabaseError)?;
    if !deleted {
        return Err(not_found());
    }

    record_application_event("deleted");
    tracing::info!(application_id = %id, "Deleted application");

    Ok(StatusCode::NO_CONTENT)
}
