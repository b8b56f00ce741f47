//! API request handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::callback::CallbackAction;
use crate::catalog::{CatalogManager, Item};
use crate::config::Config;
use crate::delivery::{Delivery, DeliveryEngine, DeliveryOutcome, DeliveryRequest};
use crate::error::ProbeError;
use crate::grant::{GrantManager, GrantReceipt};
use crate::ledger::{EntitlementRecord, LedgerManager};
use crate::users::{UserManager, UserProfile};

/// Application state shared by all handlers
pub struct AppState {
    pub engine: Arc<DeliveryEngine>,
    pub ledger: Arc<LedgerManager>,
    pub catalog: Arc<CatalogManager>,
    pub grants: Arc<GrantManager>,
    pub users: Arc<UserManager>,
    pub config: Arc<Config>,
}

/// Response with error details
#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
}

type HandlerError = (StatusCode, Json<ApiError>);

fn error_response(err: ProbeError) -> HandlerError {
    let status = match &err {
        ProbeError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ProbeError::InvalidSubject { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(ApiError { error: err.to_string() }))
}

fn forbidden() -> HandlerError {
    (
        StatusCode::FORBIDDEN,
        Json(ApiError {
            error: "Not an administrator".to_string(),
        }),
    )
}

/// Delivery result as rendered to the transport adapter.
#[derive(Serialize)]
pub struct DeliverResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<Delivery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<DeliveryOutcome> for DeliverResponse {
    fn from(outcome: DeliveryOutcome) -> Self {
        match outcome {
            DeliveryOutcome::Delivered(delivery) => DeliverResponse {
                status: "delivered",
                item: Some(delivery),
                reason: None,
                detail: None,
            },
            DeliveryOutcome::Denied(reason) => DeliverResponse {
                status: "denied",
                item: None,
                detail: Some(reason.detail()),
                reason: Some(reason.code()),
            },
        }
    }
}

/// A raw chat callback, parsed and dispatched at this boundary.
#[derive(Deserialize)]
pub struct CallbackRequest {
    pub user_id: i64,
    pub data: String,
}

#[derive(Serialize)]
pub struct CallbackResponse {
    pub action: CallbackAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliverResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribers: Option<i64>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub first_time: bool,
}

#[derive(Deserialize)]
pub struct GrantRequest {
    pub admin_id: i64,
    pub user_id: i64,
    pub subject: String,
    pub tier: String,
    pub amount: i64,
}

#[derive(Deserialize)]
pub struct IngestRequest {
    pub admin_id: i64,
    pub subject: String,
    pub tier: String,
    pub label: String,
    pub file_ref: String,
}

#[derive(Serialize)]
pub struct SubscriberCount {
    pub count: i64,
}

/// GET /health - Liveness check
pub async fn health() -> &'static str {
    "OK"
}

/// POST /api/deliver - Run one delivery request through the engine
pub async fn deliver(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeliveryRequest>,
) -> Result<Json<DeliverResponse>, HandlerError> {
    let outcome = state
        .engine
        .deliver(request.user_id, &request.subject, &request.tier)
        .await
        .map_err(error_response)?;

    Ok(Json(outcome.into()))
}

/// POST /api/callback - Parse a raw chat callback payload and dispatch it
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CallbackRequest>,
) -> Result<Json<CallbackResponse>, HandlerError> {
    let action = CallbackAction::parse(&request.data).map_err(error_response)?;

    let mut response = CallbackResponse {
        action: action.clone(),
        delivery: None,
        subscribers: None,
    };

    match action {
        CallbackAction::Variant { subject, tier } => {
            let outcome = state
                .engine
                .deliver(request.user_id, &subject, &tier)
                .await
                .map_err(error_response)?;
            response.delivery = Some(outcome.into());
        }
        CallbackAction::Subscribers => {
            response.subscribers = Some(state.users.count().await.map_err(error_response)?);
        }
        // Menu navigation is rendered by the transport; nothing to decide here.
        CallbackAction::Menu | CallbackAction::Subjects | CallbackAction::Subject { .. } => {}
    }

    Ok(Json(response))
}

/// POST /api/register - First-contact registration
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(profile): Json<UserProfile>,
) -> Result<Json<RegisterResponse>, HandlerError> {
    let first_time = state
        .users
        .register_if_absent(&profile)
        .await
        .map_err(error_response)?;

    Ok(Json(RegisterResponse { first_time }))
}

/// POST /api/grant - Administrative quota grant
pub async fn grant(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GrantRequest>,
) -> Result<Json<GrantReceipt>, HandlerError> {
    if !state.config.delivery.is_admin(request.admin_id) {
        return Err(forbidden());
    }

    let receipt = state
        .grants
        .grant_access(request.user_id, &request.subject, &request.tier, request.amount)
        .await
        .map_err(error_response)?;

    Ok(Json(receipt))
}

/// POST /api/catalog - Administrative catalog ingestion
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> Result<(StatusCode, Json<Item>), HandlerError> {
    if !state.config.delivery.is_admin(request.admin_id) {
        return Err(forbidden());
    }
    if !state.config.delivery.is_configured(&request.subject, &request.tier) {
        return Err(error_response(ProbeError::InvalidSubject {
            subject: request.subject,
            tier: request.tier,
        }));
    }

    let item = state
        .catalog
        .ingest(&request.subject, &request.tier, &request.label, &request.file_ref)
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /api/entitlements/:user_id/:subject/:tier - Ledger read
pub async fn get_entitlement(
    State(state): State<Arc<AppState>>,
    Path((user_id, subject, tier)): Path<(i64, String, String)>,
) -> Result<Json<EntitlementRecord>, HandlerError> {
    let record = state
        .ledger
        .read(user_id, &subject, &tier)
        .await
        .map_err(error_response)?;

    record.map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: "No entitlement record".to_string(),
            }),
        )
    })
}

/// GET /api/stats/subscribers - Registered-user count
pub async fn subscribers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SubscriberCount>, HandlerError> {
    let count = state.users.count().await.map_err(error_response)?;

    Ok(Json(SubscriberCount { count }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DenyReason;

    #[test]
    fn test_deliver_response_from_delivered() {
        let outcome = DeliveryOutcome::Delivered(Delivery {
            item_id: 1,
            label: "Variant 1".to_string(),
            file_ref: "file-1".to_string(),
            caption: "Practice probe (free): Variant 1".to_string(),
        });

        let response: DeliverResponse = outcome.into();
        assert_eq!(response.status, "delivered");
        assert!(response.item.is_some());
        assert!(response.reason.is_none());
    }

    #[test]
    fn test_deliver_response_from_denied() {
        let outcome = DeliveryOutcome::Denied(DenyReason::CooldownActive {
            retry_after_secs: 3600,
        });

        let response: DeliverResponse = outcome.into();
        assert_eq!(response.status, "denied");
        assert!(response.item.is_none());
        assert_eq!(response.reason, Some("cooldown_active"));
        assert!(response.detail.unwrap().contains("1 h 0 min"));
    }
}
