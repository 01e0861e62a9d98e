use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use super::{AppState, VerifiedWebhook};
use crate::errors::AppError;
use crate::guard::{SHOP_HEADER, TOPIC_HEADER};

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub vault_configured: bool,
    pub distributed_rate_limit: bool,
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct CallbackResponse {
    pub status: &'static str,
    pub shop: Option<String>,
}

pub async fn readiness(State(state): State<Arc<AppState>>) -> Json<ReadinessResponse> {
    Json(ReadinessResponse {
        vault_configured: state.guard.vault().is_configured(),
        distributed_rate_limit: state.guard.limiter().is_distributed_enabled(),
    })
}

/// Webhook delivery. The body is taken as raw bytes so the signature is
/// checked against exactly what the partner signed.
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let shop = headers
        .get(SHOP_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let topic = headers
        .get(TOPIC_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    let stored = state.credentials.stored_token(shop).await?;
    let admitted = state
        .guard
        .admit_webhook(&headers, &body, stored.as_deref())
        .await?;

    let Some(access_token) = admitted else {
        // acknowledged anyway so the partner stops retrying for an uninstalled shop
        tracing::info!(shop, topic, "webhook for unknown shop, ignoring");
        return Ok((StatusCode::OK, Json(WebhookAck { status: "ignored" })));
    };

    tracing::info!(shop, topic, bytes = body.len(), "webhook accepted");
    state
        .sink
        .deliver(VerifiedWebhook {
            shop: shop.to_string(),
            topic: topic.to_string(),
            access_token,
            body,
        })
        .await?;
    Ok((StatusCode::OK, Json(WebhookAck { status: "accepted" })))
}

pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<CallbackResponse>, AppError> {
    state.guard.admit_oauth_callback(&headers, &params).await?;

    let shop = params
        .iter()
        .find(|(k, _)| k == "shop")
        .map(|(_, v)| v.clone());
    tracing::info!(shop = shop.as_deref().unwrap_or("-"), "oauth callback verified");
    Ok(Json(CallbackResponse {
        status: "verified",
        shop,
    }))
}
