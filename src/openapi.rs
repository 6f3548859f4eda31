use utoipa::OpenApi;

use crate::models::{Message, MessageStats, MessageStatus, MessageSummary, NewMessage, UpdateMessage};
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health,
        routes::login,
        routes::verify_token,
        routes::create_message_public,
        routes::create_message,
        routes::list_messages,
        routes::get_stats,
        routes::delete_message,
        routes::delete_all_messages,
        routes::update_message,
        routes::mark_printed,
        routes::list_ordered,
        routes::list_new,
        routes::unread_count,
        routes::list_latest,
    ),
    components(schemas(
        Message,
        MessageStatus,
        MessageSummary,
        MessageStats,
        NewMessage,
        UpdateMessage,
        routes::LoginRequest,
        routes::CreateMessageRequest,
    )),
    tags((name = "kudos", description = "Recognition-notes messaging API"))
)]
pub struct ApiDoc;
