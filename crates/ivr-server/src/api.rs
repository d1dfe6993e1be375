//! HTTP handlers: menu inspection, dry-run resolution, metrics and call setup.

use crate::AppState;
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ivr_dialogue::{Navigation, RenderedResponse};
use ivr_observe::MetricsSnapshot;
use ivr_types::{Language, NodeKind, Slots};
use ivr_voice::{CallTokens, VoiceError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// One node of the loaded menu, as listed by `GET /api/menu`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MenuNodeSummary {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub children: Vec<String>,
}

/// Response body for `GET /api/menu`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MenuResponse {
    pub version: String,
    pub default_language: Language,
    pub nodes: Vec<MenuNodeSummary>,
}

/// Request body for a dry-run resolution.
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub utterance: String,
    #[serde(default)]
    pub slots: Slots,
    /// Language already chosen by the caller, if any.
    #[serde(default)]
    pub language: Option<Language>,
}

/// One selection on the resolved path.
#[derive(Debug, Serialize, Deserialize)]
pub struct PathStep {
    pub id: String,
    pub label: String,
    pub selector: String,
}

/// Response body for a dry-run resolution.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolveResponse {
    Resolved {
        node_id: String,
        language: Language,
        confidence: f32,
        path: Vec<PathStep>,
        response: RenderedResponse,
    },
    Unresolved,
    Blocked {
        reason: String,
    },
}

/// Request body for `POST /api/voice/join`.
#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    /// Caller identity inside the call room, e.g. the calling number.
    pub identity: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Errors that can occur during API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("upstream error: {0}")]
    BadGateway(String),

    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalServerError(msg) => {
                tracing::error!("internal server error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

impl From<VoiceError> for ApiError {
    fn from(err: VoiceError) -> Self {
        match err {
            VoiceError::NotConfigured => ApiError::ServiceUnavailable(err.to_string()),
            VoiceError::RoomService(_) => ApiError::BadGateway(err.to_string()),
            VoiceError::Token(_) => ApiError::InternalServerError(err.to_string()),
        }
    }
}

/// Handler for `GET /api/menu`.
pub async fn get_menu_handler(Extension(state): Extension<Arc<AppState>>) -> Json<MenuResponse> {
    let tree = state.engine.tree();
    let nodes = tree
        .nodes()
        .map(|node| MenuNodeSummary {
            id: node.id.clone(),
            label: node.label.clone(),
            kind: node.kind,
            selector: node.selector.clone(),
            parent: node.parent.clone(),
            children: node.children.iter().map(|c| c.id.clone()).collect(),
        })
        .collect();

    Json(MenuResponse {
        version: tree.version().to_string(),
        default_language: tree.default_language(),
        nodes,
    })
}

/// Handler for `POST /api/resolve`.
///
/// Runs resolution and rendering exactly as a session turn would, without
/// touching any session state or metrics.
pub async fn resolve_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, ApiError> {
    if payload.utterance.trim().is_empty() {
        return Err(ApiError::BadRequest("utterance must not be empty".to_string()));
    }

    let navigation = state
        .engine
        .navigate(&payload.utterance, &payload.slots, payload.language)
        .map_err(|e| ApiError::InternalServerError(e.to_string()))?;

    let response = match navigation {
        Navigation::Resolved {
            node_id,
            language,
            confidence,
            response,
        } => {
            let path = state
                .engine
                .tree()
                .steps_to(&node_id)
                .map_err(|e| ApiError::InternalServerError(e.to_string()))?
                .into_iter()
                .map(|node| PathStep {
                    id: node.id.clone(),
                    label: node.label.clone(),
                    selector: node.selector.clone().unwrap_or_default(),
                })
                .collect();
            ResolveResponse::Resolved {
                node_id,
                language,
                confidence,
                path,
                response,
            }
        }
        Navigation::Unresolved => ResolveResponse::Unresolved,
        Navigation::Blocked(reason) => ResolveResponse::Blocked {
            reason: reason.label().to_string(),
        },
    };

    Ok(Json(response))
}

/// Handler for `GET /api/metrics`.
pub async fn get_metrics_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<MetricsSnapshot> {
    Json(state.engine.metrics().snapshot())
}

/// Handler for `POST /api/voice/join`.
///
/// Creates a LiveKit room for one caller and returns the caller's and the
/// navigator's join tokens.
pub async fn join_voice_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<JoinRequest>,
) -> Result<Json<CallTokens>, ApiError> {
    let identity = payload.identity.trim();
    if identity.is_empty() {
        return Err(ApiError::BadRequest("identity must not be empty".to_string()));
    }
    let name = payload.name.as_deref().unwrap_or(identity);

    let tokens = state.voice.open_call(identity, name).await.map_err(|e| {
        tracing::warn!(error = %e, caller = identity, "failed to open call room");
        ApiError::from(e)
    })?;
    Ok(Json(tokens))
}
