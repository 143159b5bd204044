//! JSON routes over the demande lifecycle.
//!
//! - `POST  /demandes`                     create a draft (client)
//! - `GET   /demandes`                     scoped, paginated listing
//! - `GET   /demandes/statistics`          scoped counters
//! - `GET   /demandes/{id}`                one demande plus the actions open to the caller
//! - `PATCH /demandes/{id}`                edit a draft (owner)
//! - `POST  /demandes/{id}/submit`         owner submits
//! - `POST  /demandes/{id}/cancel`         owner cancels
//! - `POST  /demandes/{id}/take-over`      staff takes the demande for review
//! - `POST  /demandes/{id}/escalate`       staff hands it to a higher responsible
//! - `POST  /demandes/{id}/decision`       VALIDATE, REJECT or REQUEST_INFO
//! - `POST  /demandes/{id}/regularize`     mark a validated forcing as covered
//! - `GET   /me/capabilities`              capability set of the caller's role
//!
//! Identity comes from the upstream gateway through `x-actor-*` headers.

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use forcage_core::{
    capabilities_for, Actor, AgencyId, DecisionAction, DecisionData, Demande, DemandeAction,
    DemandeId, DemandeLifecycle, DemandePatch, DemandeStatistics, DemandeStatus, ErrorKind,
    EscalationData, LifecycleError, ListQuery, NewDemande, OperationType, Page, Pagination,
    Priority, RequestedFilters, RiskScore, Role, SortDirection, SortField, SortOrder, UserId,
};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_AGENCY_HEADER: &str = "x-actor-agency";
pub const ACTOR_CEILING_HEADER: &str = "x-actor-ceiling";

#[derive(Clone)]
pub struct ApiState {
    lifecycle: DemandeLifecycle,
    api_token: Option<SecretString>,
}

impl ApiState {
    pub fn new(lifecycle: DemandeLifecycle, api_token: Option<SecretString>) -> Self {
        Self { lifecycle, api_token }
    }
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoteRequest {
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionRequest {
    pub action: String,
    #[serde(default, alias = "montantAutorise")]
    pub authorized_amount: Option<Decimal>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub conditions: Option<String>,
}

/// Query string of the listing and statistics routes. List values are comma-separated.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub status: Option<String>,
    pub operation_type: Option<String>,
    pub min_risk: Option<String>,
    pub agency_id: Option<String>,
    pub client_id: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct DemandeView {
    #[serde(flatten)]
    pub demande: Demande,
    pub available_actions: Vec<DemandeAction>,
    pub current_priority: Priority,
    pub overdue: bool,
}

#[derive(Debug, Serialize)]
pub struct CapabilitiesResponse {
    pub actor_id: UserId,
    pub role: Role,
    pub capabilities: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    pub user_message: &'static str,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn lifecycle(operation: &'static str, correlation_id: &str, error: LifecycleError) -> Self {
        if error.kind() == ErrorKind::Unavailable {
            error!(
                event_name = "api.demande.unavailable",
                correlation_id = %correlation_id,
                operation,
                error = %error,
                "lifecycle collaborator failed"
            );
        } else {
            warn!(
                event_name = "api.demande.refused",
                correlation_id = %correlation_id,
                operation,
                kind = error.kind().as_str(),
                error = %error,
                "lifecycle operation refused"
            );
        }

        let interface = error.into_interface(correlation_id);
        let status = StatusCode::from_u16(interface.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            body: ErrorBody {
                kind: interface.kind.as_str(),
                user_message: interface.user_message(),
                message: interface.message,
                correlation_id: interface.correlation_id,
            },
        }
    }

    fn unauthorized(correlation_id: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(
            event_name = "api.auth.rejected",
            correlation_id = %correlation_id,
            reason = %message,
            "request rejected before reaching the lifecycle"
        );
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorBody {
                kind: "unauthorized",
                message,
                user_message: "Authentication is required.",
                correlation_id: correlation_id.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/demandes", post(create_demande).get(list_demandes))
        .route("/demandes/statistics", get(demande_statistics))
        .route("/demandes/{id}", get(get_demande).patch(update_demande))
        .route("/demandes/{id}/submit", post(submit_demande))
        .route("/demandes/{id}/cancel", post(cancel_demande))
        .route("/demandes/{id}/take-over", post(take_over_demande))
        .route("/demandes/{id}/escalate", post(escalate_demande))
        .route("/demandes/{id}/decision", post(decide_demande))
        .route("/demandes/{id}/regularize", post(regularize_demande))
        .route("/me/capabilities", get(my_capabilities))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_demande(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<NewDemande>, JsonRejection>,
) -> Result<(StatusCode, Json<Demande>), ApiError> {
    let correlation_id = new_correlation_id();
    let actor = authenticate(&headers, &state, &correlation_id)?;
    let Json(payload) = payload.map_err(|rejection| body_error(&correlation_id, rejection))?;

    let result = state.lifecycle.create(&actor, payload).await;
    let Json(demande) = applied("api.demande.created", "create", &correlation_id, &actor, result)?;
    Ok((StatusCode::CREATED, Json(demande)))
}

async fn list_demandes(
    State(state): State<ApiState>,
    headers: HeaderMap,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Page>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = authenticate(&headers, &state, &correlation_id)?;
    let Query(params) = params.map_err(|rejection| query_error(&correlation_id, rejection))?;

    let query = params.into_query().map_err(|e| ApiError::lifecycle("list", &correlation_id, e))?;
    let page = state
        .lifecycle
        .list(&actor, query)
        .await
        .map_err(|e| ApiError::lifecycle("list", &correlation_id, e))?;

    info!(
        event_name = "api.demande.listed",
        correlation_id = %correlation_id,
        actor_id = %actor.id,
        total = page.total,
        returned = page.items.len(),
        "demandes listed"
    );
    Ok(Json(page))
}

async fn demande_statistics(
    State(state): State<ApiState>,
    headers: HeaderMap,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<DemandeStatistics>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = authenticate(&headers, &state, &correlation_id)?;
    let Query(params) = params.map_err(|rejection| query_error(&correlation_id, rejection))?;

    let filters =
        params.filters().map_err(|e| ApiError::lifecycle("statistics", &correlation_id, e))?;
    let statistics = state
        .lifecycle
        .statistics(&actor, filters)
        .await
        .map_err(|e| ApiError::lifecycle("statistics", &correlation_id, e))?;
    Ok(Json(statistics))
}

async fn get_demande(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DemandeView>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = authenticate(&headers, &state, &correlation_id)?;

    let demande = state
        .lifecycle
        .get_by_id(&actor, &DemandeId(id))
        .await
        .map_err(|e| ApiError::lifecycle("get", &correlation_id, e))?;

    let now = Utc::now();
    Ok(Json(DemandeView {
        available_actions: state.lifecycle.available_actions(&actor, &demande),
        current_priority: demande.current_priority(now),
        overdue: demande.is_overdue(now),
        demande,
    }))
}

async fn update_demande(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<Demande>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = authenticate(&headers, &state, &correlation_id)?;
    let Json(payload) = payload.map_err(|rejection| body_error(&correlation_id, rejection))?;

    let patch = DemandePatch::from_json(payload)
        .map_err(|e| ApiError::lifecycle("update", &correlation_id, e))?;
    let result = state.lifecycle.update(&actor, &DemandeId(id), patch).await;
    applied("api.demande.updated", "update", &correlation_id, &actor, result)
}

async fn submit_demande(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Demande>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = authenticate(&headers, &state, &correlation_id)?;

    let result = state.lifecycle.submit(&actor, &DemandeId(id)).await;
    applied("api.demande.submitted", "submit", &correlation_id, &actor, result)
}

async fn cancel_demande(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Demande>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = authenticate(&headers, &state, &correlation_id)?;

    let result = state.lifecycle.cancel(&actor, &DemandeId(id)).await;
    applied("api.demande.cancelled", "cancel", &correlation_id, &actor, result)
}

async fn take_over_demande(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Demande>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = authenticate(&headers, &state, &correlation_id)?;
    let request: NoteRequest = optional_body(&body)
        .map_err(|e| ApiError::lifecycle("take_over", &correlation_id, e))?;

    let result = state.lifecycle.take_over(&actor, &DemandeId(id), request.note).await;
    applied("api.demande.assigned", "take_over", &correlation_id, &actor, result)
}

async fn escalate_demande(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Demande>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = authenticate(&headers, &state, &correlation_id)?;
    let data: EscalationData = optional_body(&body)
        .map_err(|e| ApiError::lifecycle("escalate", &correlation_id, e))?;

    let result = state.lifecycle.escalate(&actor, &DemandeId(id), data).await;
    applied("api.demande.escalated", "escalate", &correlation_id, &actor, result)
}

async fn decide_demande(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<Demande>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = authenticate(&headers, &state, &correlation_id)?;
    let Json(request) = payload.map_err(|rejection| body_error(&correlation_id, rejection))?;

    let action = DecisionAction::parse(&request.action).ok_or_else(|| {
        ApiError::lifecycle(
            "decide",
            &correlation_id,
            LifecycleError::validation("action", "expected VALIDATE, REJECT or REQUEST_INFO"),
        )
    })?;
    let data = DecisionData {
        authorized_amount: request.authorized_amount,
        comment: request.comment,
        conditions: request.conditions,
    };

    let result = state.lifecycle.decide(&actor, &DemandeId(id), action, data).await;
    applied("api.demande.decided", "decide", &correlation_id, &actor, result)
}

async fn regularize_demande(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Demande>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = authenticate(&headers, &state, &correlation_id)?;
    let request: NoteRequest = optional_body(&body)
        .map_err(|e| ApiError::lifecycle("regularize", &correlation_id, e))?;

    let result = state.lifecycle.regularize(&actor, &DemandeId(id), request.note).await;
    applied("api.demande.regularized", "regularize", &correlation_id, &actor, result)
}

async fn my_capabilities(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<CapabilitiesResponse>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = authenticate(&headers, &state, &correlation_id)?;

    Ok(Json(CapabilitiesResponse {
        capabilities: capabilities_for(actor.role)
            .into_iter()
            .map(|capability| capability.as_str())
            .collect(),
        actor_id: actor.id,
        role: actor.role,
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_correlation_id() -> String {
    format!("req-{}", Uuid::new_v4().simple())
}

fn authenticate(
    headers: &HeaderMap,
    state: &ApiState,
    correlation_id: &str,
) -> Result<Actor, ApiError> {
    if let Some(expected) = &state.api_token {
        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        let matches = presented.is_some_and(|token| {
            bool::from(token.as_bytes().ct_eq(expected.expose_secret().as_bytes()))
        });
        if !matches {
            return Err(ApiError::unauthorized(correlation_id, "missing or invalid bearer token"));
        }
    }

    let id = required_header(headers, ACTOR_ID_HEADER, correlation_id)?;
    let raw_role = required_header(headers, ACTOR_ROLE_HEADER, correlation_id)?;
    let role = Role::parse(raw_role).ok_or_else(|| {
        ApiError::unauthorized(correlation_id, format!("unknown role `{raw_role}`"))
    })?;
    let agency = required_header(headers, ACTOR_AGENCY_HEADER, correlation_id)?;

    let actor = Actor::new(id, role, agency);
    match header_value(headers, ACTOR_CEILING_HEADER) {
        Some(raw) => {
            let ceiling = raw.parse::<Decimal>().map_err(|_| {
                ApiError::lifecycle(
                    "authenticate",
                    correlation_id,
                    LifecycleError::validation(ACTOR_CEILING_HEADER, "must be a decimal amount"),
                )
            })?;
            Ok(actor.with_ceiling(ceiling))
        }
        None => Ok(actor),
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn required_header<'a>(
    headers: &'a HeaderMap,
    name: &str,
    correlation_id: &str,
) -> Result<&'a str, ApiError> {
    header_value(headers, name)
        .ok_or_else(|| ApiError::unauthorized(correlation_id, format!("missing `{name}` header")))
}

/// An empty body stands for the type's default.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, LifecycleError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|error| LifecycleError::validation("body", error.to_string()))
}

fn body_error(correlation_id: &str, rejection: JsonRejection) -> ApiError {
    ApiError::lifecycle(
        "decode_body",
        correlation_id,
        LifecycleError::validation("body", rejection.body_text()),
    )
}

fn query_error(correlation_id: &str, rejection: QueryRejection) -> ApiError {
    ApiError::lifecycle(
        "decode_query",
        correlation_id,
        LifecycleError::validation("query", rejection.body_text()),
    )
}

fn applied(
    event_name: &'static str,
    operation: &'static str,
    correlation_id: &str,
    actor: &Actor,
    result: Result<Demande, LifecycleError>,
) -> Result<Json<Demande>, ApiError> {
    let demande = result.map_err(|error| ApiError::lifecycle(operation, correlation_id, error))?;
    info!(
        event_name,
        correlation_id = %correlation_id,
        demande_ref = %demande.reference,
        actor_id = %actor.id,
        actor_role = actor.role.as_str(),
        status = demande.status.as_str(),
        "demande operation applied"
    );
    Ok(Json(demande))
}

impl ListParams {
    pub fn filters(&self) -> Result<RequestedFilters, LifecycleError> {
        let min_risk = match self.min_risk.as_deref() {
            Some(raw) => Some(RiskScore::parse(raw).ok_or_else(|| {
                LifecycleError::validation("min_risk", format!("unknown risk score `{raw}`"))
            })?),
            None => None,
        };

        Ok(RequestedFilters {
            statuses: parse_list("status", self.status.as_deref(), DemandeStatus::parse)?,
            operation_types: parse_list(
                "operation_type",
                self.operation_type.as_deref(),
                OperationType::parse,
            )?,
            min_risk,
            created_from: self.created_from,
            created_to: self.created_to,
            agency_id: self.agency_id.clone().map(AgencyId),
            client_id: self.client_id.clone().map(UserId),
        })
    }

    pub fn into_query(self) -> Result<ListQuery, LifecycleError> {
        let filters = self.filters()?;
        let defaults = Pagination::default();
        let pagination = Pagination {
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        };

        let mut sort = SortOrder::default();
        if let Some(raw) = self.sort.as_deref() {
            sort.field = SortField::parse(raw).ok_or_else(|| {
                LifecycleError::validation("sort", "expected created_at, amount or due_date")
            })?;
        }
        if let Some(raw) = self.direction.as_deref() {
            sort.direction = match raw.trim().to_ascii_lowercase().as_str() {
                "asc" => SortDirection::Asc,
                "desc" => SortDirection::Desc,
                _ => return Err(LifecycleError::validation("direction", "expected asc or desc")),
            };
        }

        Ok(ListQuery { filters, pagination, sort })
    }
}

fn parse_list<T>(
    field: &str,
    raw: Option<&str>,
    parse: fn(&str) -> Option<T>,
) -> Result<Vec<T>, LifecycleError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            parse(value).ok_or_else(|| {
                LifecycleError::validation(field, format!("unknown value `{value}`"))
            })
        })
        .collect()
}
