// src/routes/commands.rs

use actix_web::{post, web, HttpRequest, HttpResponse, Responder, Scope};
use chrono::Utc;
use serde::Deserialize;

use crate::services::control::{ControlSurface, Reply, ReplyKind};
use crate::utils::signature::verify_hmac;
use crate::utils::types::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct CommandParams {
    pub caller_id: i64,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Optional shared secret for the `X-RR-SIG` check; `None` disables it.
#[derive(Debug, Clone, Default)]
pub struct CommandAuth {
    pub hmac_secret: Option<String>,
}

#[post("/command")]
pub async fn command(
    req: HttpRequest,
    body: web::Bytes,
    control: web::Data<ControlSurface>,
    auth: web::Data<CommandAuth>,
) -> impl Responder {
    if let Some(secret) = auth.hmac_secret.as_deref() {
        if let Err(e) = verify_hmac(req.headers(), &body, secret, Utc::now().timestamp()) {
            log::warn!("command rejected: {e}");
            return HttpResponse::Unauthorized().json(ApiResponse::err("invalid signature"));
        }
    }

    let params: CommandParams = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            return HttpResponse::BadRequest().json(ApiResponse::err(format!("bad payload: {e}")))
        }
    };

    let reply: Reply = control
        .dispatch(params.caller_id, &params.command, &params.args)
        .await;
    let mut resp = match reply.kind {
        ReplyKind::Ok => HttpResponse::Ok(),
        ReplyKind::Denied => HttpResponse::Forbidden(),
        ReplyKind::BadCommand => HttpResponse::BadRequest(),
        ReplyKind::Failed => HttpResponse::BadGateway(),
    };
    resp.json(ApiResponse {
        success: reply.kind == ReplyKind::Ok,
        message: Some(reply.text.clone()),
        data: Some(reply),
    })
}

pub fn command_scope() -> Scope {
    web::scope("/api").service(command)
}
