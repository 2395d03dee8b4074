//! HTTP API for the ticket dashboard, plus the live WebSocket feed.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ApprovalError;
use crate::notify::BroadcastHub;
use crate::store::TicketStore;
use crate::tickets::approval::ApprovalService;
use crate::tickets::model::{NewTicket, TicketFilter, TicketUpdate};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TicketStore>,
    pub approvals: Arc<ApprovalService>,
    /// Live feed source for `/ws`.
    pub hub: Arc<BroadcastHub>,
    pub topic: String,
}

/// Build the router. `frontend_origin` is allowed for CORS; `None` allows any.
pub fn ticket_routes(state: AppState, frontend_origin: Option<&str>) -> Router {
    let origin = match frontend_origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(value) => AllowOrigin::exact(value),
        None => AllowOrigin::any(),
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/api/v1/tickets", get(list_tickets).post(create_ticket))
        .route(
            "/api/v1/tickets/{id}",
            get(get_ticket).put(update_ticket).delete(delete_ticket),
        )
        .route("/api/v1/tickets/{id}/approve", post(approve_ticket))
        .layer(cors)
        .with_state(state)
}

fn error_body(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(json!({ "error": message.into() })))
}

fn parse_id(raw: &str) -> Result<Uuid, (StatusCode, Json<serde_json::Value>)> {
    Uuid::parse_str(raw).map_err(|_| error_body(StatusCode::BAD_REQUEST, "Invalid ticket ID"))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "support-triage"
    }))
}

// ── Tickets ─────────────────────────────────────────────────────────────

async fn list_tickets(
    State(state): State<AppState>,
    Query(filter): Query<TicketFilter>,
) -> impl IntoResponse {
    match state.store.list(filter).await {
        Ok(tickets) => (StatusCode::OK, Json(json!(tickets))),
        Err(e) => {
            error!(error = %e, "Failed to list tickets");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn create_ticket(
    State(state): State<AppState>,
    Json(body): Json<NewTicket>,
) -> impl IntoResponse {
    if body.original_message.trim().is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "original_message must not be empty");
    }
    let ticket = body.into_ticket();
    match state.store.create(&ticket).await {
        Ok(()) => {
            info!(id = %ticket.id, "Ticket created via API");
            (StatusCode::CREATED, Json(json!(ticket)))
        }
        Err(e) => {
            error!(error = %e, "Failed to create ticket");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn get_ticket(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.store.get(id).await {
        Ok(Some(ticket)) => (StatusCode::OK, Json(json!(ticket))),
        Ok(None) => error_body(StatusCode::NOT_FOUND, "Ticket not found"),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn update_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<TicketUpdate>,
) -> impl IntoResponse {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if update.is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "No fields to update");
    }
    match state.store.update(id, update).await {
        Ok(true) => match state.store.get(id).await {
            Ok(Some(ticket)) => (StatusCode::OK, Json(json!(ticket))),
            Ok(None) => error_body(StatusCode::NOT_FOUND, "Ticket not found"),
            Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        Ok(false) => error_body(StatusCode::NOT_FOUND, "Ticket not found"),
        Err(e) => {
            error!(id = %id, error = %e, "Failed to update ticket");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn delete_ticket(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.store.delete(id).await {
        Ok(true) => (StatusCode::OK, Json(json!({ "status": "deleted" }))),
        Ok(false) => error_body(StatusCode::NOT_FOUND, "Ticket not found"),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApproveRequest {
    #[serde(default)]
    reply: Option<String>,
}

async fn approve_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    // The body is optional; an empty one approves the stored draft.
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ApproveRequest::default()
    } else {
        match serde_json::from_slice::<ApproveRequest>(&body) {
            Ok(req) => req,
            Err(e) => return error_body(StatusCode::BAD_REQUEST, format!("Invalid body: {e}")),
        }
    };

    match state.approvals.approve(id, request.reply).await {
        Ok(ticket) => (StatusCode::OK, Json(json!(ticket))),
        Err(e) => {
            let status = match &e {
                ApprovalError::NotFound(_) => StatusCode::NOT_FOUND,
                ApprovalError::MissingRecipient(_) | ApprovalError::MissingReply(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ApprovalError::Delivery(_) => StatusCode::BAD_GATEWAY,
                ApprovalError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!(id = %id, error = %e, "Approval failed");
            error_body(status, e.to_string())
        }
    }
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket client connecting");
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub, state.topic))
}

async fn handle_socket(mut socket: WebSocket, hub: Arc<BroadcastHub>, topic: String) {
    let mut rx = hub.subscribe(&topic).await;
    info!(topic = %topic, "WebSocket client subscribed");

    // Tells the client that notices from here on will be delivered.
    let hello = json!({ "type": "subscribed", "topic": topic }).to_string();
    if socket.send(Message::Text(hello.into())).await.is_err() {
        warn!("Failed to send subscription ack, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(payload) => {
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        // Missed notices are still visible through the list endpoint.
                        warn!(missed = n, "WS client lagged behind broadcast");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket connection closed");
}
