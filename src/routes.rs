use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{create_jwt, Auth, ADMIN_ROLE};
use crate::config::Config;
use crate::error::ApiError;
use crate::models::*;
use crate::repo::MessageRepo;

const DEFAULT_POLL_LIMIT: i64 = 50;
const DEFAULT_LATEST_LIMIT: i64 = 10;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn MessageRepo>,
    pub config: Config,
}

/// Route table. Authorization policy, per route:
/// health, login, the active list, stats and the public submit form need no
/// token; everything that mutates or drives the notification poller needs
/// the admin bearer token. The literal `/messages/...` resources must stay
/// registered ahead of the `{id}` captures.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(web::resource("/health").route(web::get().to(health)))
            .service(web::resource("/login").route(web::post().to(login)))
            .service(web::resource("/verify-token").route(web::get().to(verify_token)))
            .service(web::resource("/stats").route(web::get().to(get_stats)))
            .service(web::resource("/messages/public").route(web::post().to(create_message_public)))
            .service(web::resource("/messages/ordered").route(web::get().to(list_ordered)))
            .service(web::resource("/messages/new").route(web::get().to(list_new)))
            .service(web::resource("/messages/unread-count").route(web::get().to(unread_count)))
            .service(web::resource("/messages/latest").route(web::get().to(list_latest)))
            .service(
                web::resource("/messages")
                    .route(web::get().to(list_messages))
                    .route(web::post().to(create_message))
                    .route(web::delete().to(delete_all_messages)),
            )
            .service(
                web::resource("/messages/{id}")
                    .route(web::put().to(update_message))
                    .route(web::delete().to(delete_message)),
            )
            .service(web::resource("/messages/{id}/printed").route(web::put().to(mark_printed))),
    );
}

// Request DTOs use optional fields so that an absent field produces our 400
// envelope instead of actix's default deserialization error.

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateMessageRequest {
    #[serde(rename = "remetente_nome", default)]
    pub sender_name: Option<String>,
    #[serde(rename = "destinatario_nome", default)]
    pub recipient_name: Option<String>,
    #[serde(rename = "mensagem", default)]
    pub body: Option<String>,
}

impl CreateMessageRequest {
    fn into_validated(self) -> Result<NewMessage, ApiError> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        match (
            non_empty(self.sender_name),
            non_empty(self.recipient_name),
            non_empty(self.body),
        ) {
            (Some(sender_name), Some(recipient_name), Some(body)) => Ok(NewMessage {
                sender_name,
                recipient_name,
                body,
            }),
            _ => Err(ApiError::Validation(
                "remetente_nome, destinatario_nome and mensagem are required".into(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewMessagesQuery {
    pub since_id: Option<Id>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service and storage status"))
)]
pub async fn health(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let connected = data.repo.ping().await;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "service": "kudos backend",
        "status": "online",
        "database": if connected { "connected" } else { "disconnected" },
        "timestamp": Utc::now(),
        "environment": data.config.environment,
    })))
}

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued"),
        (status = 400, description = "Missing email or password"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let (email, password) = match (payload.email, payload.password) {
        (Some(e), Some(p)) if !e.is_empty() && !p.is_empty() => (e, p),
        _ => return Err(ApiError::Validation("email and password are required".into())),
    };

    // One error for both mismatch cases; the response must not reveal which
    // field was wrong.
    if email != data.config.admin_email || password != data.config.admin_password {
        return Err(ApiError::InvalidCredentials);
    }

    let token = create_jwt(&email).map_err(|e| {
        tracing::error!(error = %e, "failed to sign JWT");
        ApiError::Internal
    })?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "login successful",
        "token": token,
        "user": { "email": email, "role": ADMIN_ROLE },
    })))
}

#[utoipa::path(
    get,
    path = "/api/verify-token",
    responses(
        (status = 200, description = "Claims echoed back"),
        (status = 401, description = "Token missing"),
        (status = 403, description = "Token invalid or expired")
    )
)]
pub async fn verify_token(auth: Auth) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "user": { "email": auth.0.sub, "role": auth.0.role },
    })))
}

async fn create_and_respond(
    data: &AppState,
    payload: CreateMessageRequest,
) -> Result<HttpResponse, ApiError> {
    let new = payload.into_validated()?;
    let msg = data.repo.create(new).await?;
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "message saved",
        "data": msg,
    })))
}

#[utoipa::path(
    post,
    path = "/api/messages/public",
    request_body = CreateMessageRequest,
    responses(
        (status = 201, description = "Message created", body = Message),
        (status = 400, description = "Required field missing or empty")
    )
)]
pub async fn create_message_public(
    data: web::Data<AppState>,
    payload: web::Json<CreateMessageRequest>,
) -> Result<HttpResponse, ApiError> {
    create_and_respond(&data, payload.into_inner()).await
}

// Same contract as the public variant; kept so the admin frontend does not
// need a separate code path.
#[utoipa::path(
    post,
    path = "/api/messages",
    request_body = CreateMessageRequest,
    responses(
        (status = 201, description = "Message created", body = Message),
        (status = 400, description = "Required field missing or empty"),
        (status = 401, description = "Token missing"),
        (status = 403, description = "Token invalid or expired")
    )
)]
pub async fn create_message(
    _auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<CreateMessageRequest>,
) -> Result<HttpResponse, ApiError> {
    create_and_respond(&data, payload.into_inner()).await
}

#[utoipa::path(
    get,
    path = "/api/messages",
    responses((status = 200, description = "All active messages", body = [Message]))
)]
pub async fn list_messages(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let msgs = data.repo.list_active().await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "count": msgs.len(),
        "data": msgs,
    })))
}

#[utoipa::path(
    get,
    path = "/api/stats",
    responses((status = 200, description = "Aggregate statistics", body = MessageStats))
)]
pub async fn get_stats(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let stats = data.repo.stats().await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": stats })))
}

#[utoipa::path(
    delete,
    path = "/api/messages/{id}",
    params(("id" = Id, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message soft-deleted", body = Message),
        (status = 404, description = "No active message with that id")
    )
)]
pub async fn delete_message(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let msg = data.repo.soft_delete(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "message deleted",
        "data": msg,
    })))
}

#[utoipa::path(
    delete,
    path = "/api/messages",
    responses((status = 200, description = "All active messages soft-deleted"))
)]
pub async fn delete_all_messages(
    _auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let affected = data.repo.soft_delete_all().await?;
    let count = affected.len();
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": format!("{count} messages deleted"),
        "count": count,
    })))
}

#[utoipa::path(
    put,
    path = "/api/messages/{id}",
    request_body = UpdateMessage,
    params(("id" = Id, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message updated", body = Message),
        (status = 400, description = "No updatable field provided"),
        (status = 404, description = "No active message with that id")
    )
)]
pub async fn update_message(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateMessage>,
) -> Result<HttpResponse, ApiError> {
    let upd = payload.into_inner();
    if upd.is_empty() {
        return Err(ApiError::Validation(
            "at least one of remetente_nome, destinatario_nome or mensagem is required".into(),
        ));
    }
    if [&upd.sender_name, &upd.recipient_name, &upd.body]
        .iter()
        .any(|f| f.as_deref().is_some_and(|s| s.trim().is_empty()))
    {
        return Err(ApiError::Validation("fields must not be empty".into()));
    }
    let msg = data.repo.update(path.into_inner(), upd).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "message updated",
        "data": msg,
    })))
}

#[utoipa::path(
    put,
    path = "/api/messages/{id}/printed",
    params(("id" = Id, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message marked as printed", body = Message),
        (status = 404, description = "No message with that id")
    )
)]
pub async fn mark_printed(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let msg = data.repo.mark_printed(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "message marked as printed",
        "data": msg,
    })))
}

#[utoipa::path(
    get,
    path = "/api/messages/ordered",
    responses((status = 200, description = "Active messages, unprinted first", body = [Message]))
)]
pub async fn list_ordered(
    _auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let msgs = data.repo.list_ordered().await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "count": msgs.len(),
        "data": msgs,
    })))
}

#[utoipa::path(
    get,
    path = "/api/messages/new",
    params(
        ("since_id" = Option<Id>, Query, description = "Return rows with id greater than this (default 0)"),
        ("limit" = Option<i64>, Query, description = "Cap on returned rows (default 50)")
    ),
    responses((status = 200, description = "Messages newer than the cursor", body = [Message]))
)]
pub async fn list_new(
    _auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<NewMessagesQuery>,
) -> Result<HttpResponse, ApiError> {
    let since_id = query.since_id.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_POLL_LIMIT);
    let msgs = data.repo.list_since(since_id, limit).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "count": msgs.len(),
        "data": msgs,
    })))
}

#[utoipa::path(
    get,
    path = "/api/messages/unread-count",
    responses((status = 200, description = "Count of unprinted messages"))
)]
pub async fn unread_count(
    _auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let count = data.repo.unprinted_count().await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "count": count })))
}

#[utoipa::path(
    get,
    path = "/api/messages/latest",
    params(("limit" = Option<i64>, Query, description = "Number of rows (default 10)")),
    responses((status = 200, description = "Newest messages without bodies", body = [MessageSummary]))
)]
pub async fn list_latest(
    _auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<LatestQuery>,
) -> Result<HttpResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LATEST_LIMIT);
    let msgs = data.repo.list_latest(limit).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "count": msgs.len(),
        "data": msgs,
    })))
}
