use actix_web::http::header::{self, ContentType};
use actix_web::http::Method;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tracing::{error, info};

use crate::duplex::MessageConn;
use crate::error::{AppError, WebSocketError};
use crate::session;
use crate::websocket::WsConnection;
use crate::AppState;

const CHAT_TEMPLATE: &str = include_str!("../../templates/chat.html");

/// Register the chat endpoint. Every path goes through one handler.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.default_service(web::to(chat_entry));
}

fn wants_upgrade(req: &HttpRequest) -> bool {
    req.headers()
        .get_all(header::UPGRADE)
        .any(|value| value.as_bytes().eq_ignore_ascii_case(b"websocket"))
}

pub fn render_chat_page(state: &AppState) -> String {
    CHAT_TEMPLATE.replace("{{addr}}", &state.config.server.public_addr())
}

/// Upgrade requests join the chat; plain `GET /` gets the chat page.
pub async fn chat_entry(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if !wants_upgrade(&req) {
        if req.method() != Method::GET {
            return Ok(HttpResponse::MethodNotAllowed().body("Method not allowed"));
        }
        if req.path() != "/" {
            return Ok(HttpResponse::NotFound().body("404 page not found"));
        }
        return Ok(HttpResponse::Ok()
            .content_type(ContentType::html())
            .body(render_chat_page(&state)));
    }

    let peer_addr = req
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    info!("New WebSocket connection request from: {}", peer_addr);

    let (conn, port) = MessageConn::channel();
    let response = ws::start(WsConnection::new(port, peer_addr.clone()), &req, stream)
        .map_err(|e| {
            error!("Upgrade err: {}", e);
            AppError::from(WebSocketError::HandshakeFailed(e.to_string()))
        })?;

    let state = state.get_ref().clone();
    tokio::spawn(async move {
        session::drive(&state, conn, &peer_addr).await;
    });

    Ok(response)
}
