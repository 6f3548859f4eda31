use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// Lifecycle state of a message row. Rows are never hard-deleted; a delete
/// only flips `active` to `deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Active,
    Deleted,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Active => "active",
            MessageStatus::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MessageStatus::Active),
            "deleted" => Ok(MessageStatus::Deleted),
            other => Err(format!("unknown message status '{other}'")),
        }
    }
}

/// A recognition note. The three text fields keep the original wire names
/// (`remetente_nome` / `destinatario_nome` / `mensagem`) that the existing
/// frontend sends and expects back.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Id,
    #[serde(rename = "remetente_nome")]
    pub sender_name: String,
    #[serde(rename = "destinatario_nome")]
    pub recipient_name: String,
    #[serde(rename = "mensagem")]
    pub body: String,
    pub is_printed: bool,
    pub printed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
}

/// Creation payload. All three fields are required and must be non-empty;
/// the API surface rejects anything else before it reaches storage.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewMessage {
    #[serde(rename = "remetente_nome")]
    pub sender_name: String,
    #[serde(rename = "destinatario_nome")]
    pub recipient_name: String,
    #[serde(rename = "mensagem")]
    pub body: String,
}

/// Field-level update: only the text fields are mutable here. Printed state
/// and status have dedicated operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateMessage {
    #[serde(rename = "remetente_nome")]
    pub sender_name: Option<String>,
    #[serde(rename = "destinatario_nome")]
    pub recipient_name: Option<String>,
    #[serde(rename = "mensagem")]
    pub body: Option<String>,
}

impl UpdateMessage {
    pub fn is_empty(&self) -> bool {
        self.sender_name.is_none() && self.recipient_name.is_none() && self.body.is_none()
    }
}

/// Body-less projection served by `/api/messages/latest`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageSummary {
    pub id: Id,
    #[serde(rename = "remetente_nome")]
    pub sender_name: String,
    #[serde(rename = "destinatario_nome")]
    pub recipient_name: String,
    pub is_printed: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessageSummary {
    fn from(m: &Message) -> Self {
        MessageSummary {
            id: m.id,
            sender_name: m.sender_name.clone(),
            recipient_name: m.recipient_name.clone(),
            is_printed: m.is_printed,
            created_at: m.created_at,
        }
    }
}

/// Aggregate counts over active messages.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageStats {
    pub total: i64,
    pub printed: i64,
    #[serde(rename = "uniqueRecipients")]
    pub unique_recipients: i64,
    pub recent: i64,
}
