use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Record-level operations over the `messages` table. Every method captures
/// its own failures into `RepoResult`; nothing panics across this boundary.
#[async_trait]
pub trait MessageRepo: Send + Sync {
    /// Insert a new active, unprinted message. The storage clock stamps
    /// `created_at`.
    async fn create(&self, new: NewMessage) -> RepoResult<Message>;

    /// All active messages, newest first.
    async fn list_active(&self) -> RepoResult<Vec<Message>>;

    /// One active message by id. Soft-deleted rows are invisible here.
    async fn get(&self, id: Id) -> RepoResult<Message>;

    /// Flip one active row to deleted, returning its updated state.
    async fn soft_delete(&self, id: Id) -> RepoResult<Message>;

    /// Flip every active row to deleted in one statement; the returned set
    /// is exactly the rows affected (possibly empty).
    async fn soft_delete_all(&self) -> RepoResult<Vec<Message>>;

    /// Mark a row printed and stamp `printed_at`. Repeat calls re-stamp the
    /// timestamp; that is intended, not guarded against.
    async fn mark_printed(&self, id: Id) -> RepoResult<Message>;

    /// Active messages with unprinted rows first, then newest-first within
    /// each group.
    async fn list_ordered(&self) -> RepoResult<Vec<Message>>;

    /// Rows of any status with `id > since_id`, id descending, capped at
    /// `limit`. Pollers take the max id they see as their new cursor.
    async fn list_since(&self, since_id: Id, limit: i64) -> RepoResult<Vec<Message>>;

    /// Count of unprinted rows, regardless of status.
    async fn unprinted_count(&self) -> RepoResult<i64>;

    /// Newest `limit` rows by id, without bodies.
    async fn list_latest(&self, limit: i64) -> RepoResult<Vec<MessageSummary>>;

    /// Field-level update of the text columns on an active row.
    async fn update(&self, id: Id, upd: UpdateMessage) -> RepoResult<Message>;

    /// Four independent aggregates over active rows. They run concurrently;
    /// minor skew between them under concurrent writes is acceptable.
    async fn stats(&self) -> RepoResult<MessageStats>;

    /// Connectivity probe for the health endpoint.
    async fn ping(&self) -> bool;
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::{Duration, Utc};
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, RwLock};

    #[derive(Default)]
    struct State {
        messages: HashMap<Id, Message>,
        next_id: Id,
    }

    /// In-memory backend. Holds everything behind one `RwLock`; used by the
    /// integration tests and as a no-database dev mode.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    // Unprinted first, then newest first. Id breaks created_at ties so the
    // order stays deterministic under rapid inserts.
    fn ordered_key(m: &Message) -> (u8, i64, i64) {
        (u8::from(m.is_printed), -m.created_at.timestamp_nanos_opt().unwrap_or(0), -m.id)
    }

    #[async_trait]
    impl MessageRepo for InMemRepo {
        async fn create(&self, new: NewMessage) -> RepoResult<Message> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let msg = Message {
                id,
                sender_name: new.sender_name,
                recipient_name: new.recipient_name,
                body: new.body,
                is_printed: false,
                printed_at: None,
                created_at: Utc::now(),
                status: MessageStatus::Active,
            };
            s.messages.insert(id, msg.clone());
            Ok(msg)
        }

        async fn list_active(&self) -> RepoResult<Vec<Message>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .messages
                .values()
                .filter(|m| m.status == MessageStatus::Active)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(v)
        }

        async fn get(&self, id: Id) -> RepoResult<Message> {
            let s = self.state.read().unwrap();
            s.messages
                .get(&id)
                .filter(|m| m.status == MessageStatus::Active)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn soft_delete(&self, id: Id) -> RepoResult<Message> {
            let mut s = self.state.write().unwrap();
            let msg = s
                .messages
                .get_mut(&id)
                .filter(|m| m.status == MessageStatus::Active)
                .ok_or(RepoError::NotFound)?;
            msg.status = MessageStatus::Deleted;
            Ok(msg.clone())
        }

        async fn soft_delete_all(&self) -> RepoResult<Vec<Message>> {
            let mut s = self.state.write().unwrap();
            let mut affected = Vec::new();
            for m in s.messages.values_mut() {
                if m.status == MessageStatus::Active {
                    m.status = MessageStatus::Deleted;
                    affected.push(m.clone());
                }
            }
            affected.sort_by_key(|m| m.id);
            Ok(affected)
        }

        async fn mark_printed(&self, id: Id) -> RepoResult<Message> {
            let mut s = self.state.write().unwrap();
            let msg = s.messages.get_mut(&id).ok_or(RepoError::NotFound)?;
            msg.is_printed = true;
            msg.printed_at = Some(Utc::now());
            Ok(msg.clone())
        }

        async fn list_ordered(&self) -> RepoResult<Vec<Message>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .messages
                .values()
                .filter(|m| m.status == MessageStatus::Active)
                .cloned()
                .collect();
            v.sort_by_key(ordered_key);
            Ok(v)
        }

        async fn list_since(&self, since_id: Id, limit: i64) -> RepoResult<Vec<Message>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .messages
                .values()
                .filter(|m| m.id > since_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.id.cmp(&a.id));
            v.truncate(limit.max(0) as usize);
            Ok(v)
        }

        async fn unprinted_count(&self) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.messages.values().filter(|m| !m.is_printed).count() as i64)
        }

        async fn list_latest(&self, limit: i64) -> RepoResult<Vec<MessageSummary>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.messages.values().collect();
            v.sort_by(|a, b| b.id.cmp(&a.id));
            v.truncate(limit.max(0) as usize);
            Ok(v.into_iter().map(MessageSummary::from).collect())
        }

        async fn update(&self, id: Id, upd: UpdateMessage) -> RepoResult<Message> {
            let mut s = self.state.write().unwrap();
            let msg = s
                .messages
                .get_mut(&id)
                .filter(|m| m.status == MessageStatus::Active)
                .ok_or(RepoError::NotFound)?;
            if let Some(sender) = upd.sender_name {
                msg.sender_name = sender;
            }
            if let Some(recipient) = upd.recipient_name {
                msg.recipient_name = recipient;
            }
            if let Some(body) = upd.body {
                msg.body = body;
            }
            Ok(msg.clone())
        }

        async fn stats(&self) -> RepoResult<MessageStats> {
            let s = self.state.read().unwrap();
            let cutoff = Utc::now() - Duration::days(7);
            let active = || s.messages.values().filter(|m| m.status == MessageStatus::Active);
            let recipients: HashSet<&str> =
                active().map(|m| m.recipient_name.as_str()).collect();
            Ok(MessageStats {
                total: active().count() as i64,
                printed: active().filter(|m| m.is_printed).count() as i64,
                unique_recipients: recipients.len() as i64,
                recent: active().filter(|m| m.created_at >= cutoff).count() as i64,
            })
        }

        async fn ping(&self) -> bool {
            true
        }
    }
}

#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use chrono::{DateTime, Utc};
    use sqlx::{Pool, Postgres};
    use std::str::FromStr;

    const COLUMNS: &str =
        "id, sender_name, recipient_name, body, is_printed, printed_at, created_at, status";

    /// Postgres backend over a shared connection pool. Each operation checks
    /// out a connection for the duration of one statement, so error paths
    /// cannot leak connections.
    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    /// Raw row shape; `status` is decoded to the enum when converting.
    #[derive(sqlx::FromRow)]
    struct MessageRow {
        id: Id,
        sender_name: String,
        recipient_name: String,
        body: String,
        is_printed: bool,
        printed_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        status: String,
    }

    #[derive(sqlx::FromRow)]
    struct SummaryRow {
        id: Id,
        sender_name: String,
        recipient_name: String,
        is_printed: bool,
        created_at: DateTime<Utc>,
    }

    fn to_message(row: MessageRow) -> RepoResult<Message> {
        let status = MessageStatus::from_str(&row.status).map_err(RepoError::Internal)?;
        Ok(Message {
            id: row.id,
            sender_name: row.sender_name,
            recipient_name: row.recipient_name,
            body: row.body,
            is_printed: row.is_printed,
            printed_at: row.printed_at,
            created_at: row.created_at,
            status,
        })
    }

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }

        /// Create the `messages` table if it is not there yet. Run once at
        /// startup, before the server starts accepting requests.
        pub async fn ensure_schema(&self) -> RepoResult<()> {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    id BIGSERIAL PRIMARY KEY,
                    sender_name TEXT NOT NULL,
                    recipient_name TEXT NOT NULL,
                    body TEXT NOT NULL,
                    is_printed BOOLEAN NOT NULL DEFAULT FALSE,
                    printed_at TIMESTAMPTZ,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    status TEXT NOT NULL DEFAULT 'active'
                )
                "#,
            )
            .execute(&self.pool)
            .await
            .map_err(internal)?;
            Ok(())
        }
    }

    #[async_trait]
    impl MessageRepo for PgRepo {
        async fn create(&self, new: NewMessage) -> RepoResult<Message> {
            let row = sqlx::query_as::<_, MessageRow>(&format!(
                "INSERT INTO messages (sender_name, recipient_name, body, status) \
                 VALUES ($1, $2, $3, $4) RETURNING {COLUMNS}"
            ))
            .bind(&new.sender_name)
            .bind(&new.recipient_name)
            .bind(&new.body)
            .bind(MessageStatus::Active.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            to_message(row)
        }

        async fn list_active(&self) -> RepoResult<Vec<Message>> {
            let rows = sqlx::query_as::<_, MessageRow>(&format!(
                "SELECT {COLUMNS} FROM messages WHERE status = 'active' \
                 ORDER BY created_at DESC"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            rows.into_iter().map(to_message).collect()
        }

        async fn get(&self, id: Id) -> RepoResult<Message> {
            let row = sqlx::query_as::<_, MessageRow>(&format!(
                "SELECT {COLUMNS} FROM messages WHERE id = $1 AND status = 'active'"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)?;
            to_message(row)
        }

        async fn soft_delete(&self, id: Id) -> RepoResult<Message> {
            let row = sqlx::query_as::<_, MessageRow>(&format!(
                "UPDATE messages SET status = 'deleted' \
                 WHERE id = $1 AND status = 'active' RETURNING {COLUMNS}"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)?;
            to_message(row)
        }

        async fn soft_delete_all(&self) -> RepoResult<Vec<Message>> {
            // Single statement: the affected-set read and the mutation are
            // atomic with respect to each other.
            let rows = sqlx::query_as::<_, MessageRow>(&format!(
                "UPDATE messages SET status = 'deleted' \
                 WHERE status = 'active' RETURNING {COLUMNS}"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            rows.into_iter().map(to_message).collect()
        }

        async fn mark_printed(&self, id: Id) -> RepoResult<Message> {
            let row = sqlx::query_as::<_, MessageRow>(&format!(
                "UPDATE messages SET is_printed = TRUE, printed_at = now() \
                 WHERE id = $1 RETURNING {COLUMNS}"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)?;
            to_message(row)
        }

        async fn list_ordered(&self) -> RepoResult<Vec<Message>> {
            let rows = sqlx::query_as::<_, MessageRow>(&format!(
                "SELECT {COLUMNS} FROM messages WHERE status = 'active' \
                 ORDER BY CASE WHEN is_printed THEN 1 ELSE 0 END, created_at DESC"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            rows.into_iter().map(to_message).collect()
        }

        async fn list_since(&self, since_id: Id, limit: i64) -> RepoResult<Vec<Message>> {
            let rows = sqlx::query_as::<_, MessageRow>(&format!(
                "SELECT {COLUMNS} FROM messages WHERE id > $1 \
                 ORDER BY id DESC LIMIT $2"
            ))
            .bind(since_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            rows.into_iter().map(to_message).collect()
        }

        async fn unprinted_count(&self) -> RepoResult<i64> {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM messages WHERE is_printed = FALSE",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn list_latest(&self, limit: i64) -> RepoResult<Vec<MessageSummary>> {
            let rows = sqlx::query_as::<_, SummaryRow>(
                "SELECT id, sender_name, recipient_name, is_printed, created_at \
                 FROM messages ORDER BY id DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            Ok(rows
                .into_iter()
                .map(|r| MessageSummary {
                    id: r.id,
                    sender_name: r.sender_name,
                    recipient_name: r.recipient_name,
                    is_printed: r.is_printed,
                    created_at: r.created_at,
                })
                .collect())
        }

        async fn update(&self, id: Id, upd: UpdateMessage) -> RepoResult<Message> {
            let row = sqlx::query_as::<_, MessageRow>(&format!(
                "UPDATE messages SET \
                     sender_name = COALESCE($2, sender_name), \
                     recipient_name = COALESCE($3, recipient_name), \
                     body = COALESCE($4, body) \
                 WHERE id = $1 AND status = 'active' RETURNING {COLUMNS}"
            ))
            .bind(id)
            .bind(upd.sender_name.as_ref())
            .bind(upd.recipient_name.as_ref())
            .bind(upd.body.as_ref())
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)?;
            to_message(row)
        }

        async fn stats(&self) -> RepoResult<MessageStats> {
            let total = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM messages WHERE status = 'active'",
            )
            .fetch_one(&self.pool);
            let printed = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM messages WHERE status = 'active' AND is_printed = TRUE",
            )
            .fetch_one(&self.pool);
            let recipients = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(DISTINCT recipient_name) FROM messages WHERE status = 'active'",
            )
            .fetch_one(&self.pool);
            let recent = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM messages WHERE status = 'active' \
                 AND created_at >= now() - INTERVAL '7 days'",
            )
            .fetch_one(&self.pool);

            // Four independent counts, no shared transaction. Slight skew
            // between them under concurrent writes is acceptable.
            let (total, printed, recipients, recent) =
                tokio::try_join!(total, printed, recipients, recent).map_err(internal)?;
            Ok(MessageStats {
                total,
                printed,
                unique_recipients: recipients,
                recent,
            })
        }

        async fn ping(&self) -> bool {
            sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
        }
    }
}
