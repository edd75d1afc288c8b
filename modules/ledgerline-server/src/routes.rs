use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use ledgerline_account::{AccountError, AccountRepository, AccountState};
use ledgerline_events::{EventLike, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;
use uuid::Uuid;

use crate::backend::AccountStore;

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountRepository<AccountStore>>,
}

impl AppState {
    pub fn new(store: Arc<AccountStore>) -> Self {
        Self {
            accounts: Arc::new(AccountRepository::new(store)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/accounts", get(list_accounts).post(create_account))
        .route("/accounts/{id}", get(get_account))
        .route("/accounts/{id}/history", get(account_history))
        .route("/accounts/{id}/credit", post(credit_account))
        .route("/accounts/{id}/debit", post(debit_account))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

// --- Request / response bodies ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccount {
    holder_name: String,
    currency: String,
}

#[derive(Deserialize)]
pub struct Movement {
    amount: i64,
    currency: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    sequence: i64,
    name: String,
    payload: serde_json::Value,
    appended_at: DateTime<Utc>,
}

// --- Errors ---

/// Maps account errors onto HTTP statuses.
pub struct ApiError(AccountError);

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_conflict() {
            StatusCode::CONFLICT
        } else if self.0.is_rule_violation() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else if matches!(self.0, AccountError::NotFound(_)) {
            StatusCode::NOT_FOUND
        } else {
            warn!(error = %self.0, "Account request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// --- Handlers ---

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn create_account(
    State(state): State<AppState>,
    Json(body): Json<CreateAccount>,
) -> Result<(StatusCode, Json<AccountState>), ApiError> {
    let account_id = Uuid::new_v4().to_string();
    let account = state
        .accounts
        .create(&account_id, &body.holder_name, &body.currency)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn credit_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Movement>,
) -> Result<Json<AccountState>, ApiError> {
    let account = state.accounts.credit(&id, body.amount, &body.currency).await?;
    Ok(Json(account))
}

async fn debit_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Movement>,
) -> Result<Json<AccountState>, ApiError> {
    let account = state.accounts.debit(&id, body.amount, &body.currency).await?;
    Ok(Json(account))
}

async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AccountState>, ApiError> {
    Ok(Json(state.accounts.get(&id).await?))
}

async fn account_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let records = state.accounts.history(&id).await?;

    let entries = records
        .into_iter()
        .map(|record| -> Result<HistoryEntry, AccountError> {
            Ok(HistoryEntry {
                sequence: record.sequence,
                name: record.event.name().to_string(),
                payload: record.event.to_payload().map_err(StoreError::from)?,
                appended_at: record.appended_at,
            })
        })
        .collect::<Result<Vec<_>, AccountError>>()?;

    Ok(Json(entries))
}

async fn list_accounts(State(state): State<AppState>) -> Result<Json<Vec<AccountState>>, ApiError> {
    Ok(Json(state.accounts.list().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AccountError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn maps_errors_to_statuses() {
        let conflict = AccountError::Store(StoreError::Concurrency {
            entity_name: "Account".into(),
            entity_id: "123".into(),
            sequence_in_conflict: 1,
        });
        assert_eq!(status_of(conflict), StatusCode::CONFLICT);

        assert_eq!(
            status_of(AccountError::NotFound("123".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(AccountError::InvalidAmount(0)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(AccountError::BalanceOverflow {
                balance: i64::MAX,
                amount: 1
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(AccountError::Store(StoreError::backend("connection reset"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
