use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::domain::{TransactionStatus, Transition};
use crate::error::AppError;
use crate::schemas::{CreateTransactionRequest, StatusQuery};
use crate::validation::validate_create_request;
use crate::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw)
        .map_err(|_| AppError::Validation(format!("invalid transaction id '{}'", raw)))
}

fn user_id(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", USER_ID_HEADER)))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user_id(&headers)?;
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let input =
        validate_create_request(&request).map_err(|e| AppError::Validation(e.to_string()))?;

    let tx = state.transactions.create(&user_id, input).await?;

    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, AppError> {
    let status = match query.status.as_deref() {
        None => TransactionStatus::Pending,
        Some(raw) => raw
            .parse::<TransactionStatus>()
            .map_err(|e| AppError::Validation(e.to_string()))?,
    };

    let transactions = state.transactions.list(status).await?;
    Ok(Json(transactions))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.transactions.get(parse_id(&id)?).await?;
    Ok(Json(tx))
}

async fn apply(
    state: AppState,
    id: String,
    transition: Transition,
) -> Result<impl IntoResponse, AppError> {
    let tx = state
        .transactions
        .transition(parse_id(&id)?, transition)
        .await?;
    Ok(Json(tx))
}

pub async fn review_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    apply(state, id, Transition::Review).await
}

pub async fn approve_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    apply(state, id, Transition::Approve).await
}

pub async fn reject_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    apply(state, id, Transition::Reject).await
}
