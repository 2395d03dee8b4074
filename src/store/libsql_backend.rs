//! libSQL backend for tickets and round-robin counters.
//!
//! Supports local file and in-memory databases over a single connection.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{RoundRobinCounter, TicketStore};
use crate::tickets::model::{Category, Sentiment, Ticket, TicketFilter, TicketUpdate};

const TICKET_COLUMNS: &str = "id, created_at, full_name, phone_num, email, object_name, \
     device_type, device_num, original_message, summary, llm_response, sentiment, category, \
     is_important, manual_required, is_relevant, is_resolved";

/// libSQL database backend.
///
/// Holds one connection reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// In-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn write_mutable_columns(&self, ticket: &Ticket) -> Result<u64, DatabaseError> {
        self.conn()
            .execute(
                "UPDATE tickets SET full_name = ?1, phone_num = ?2, email = ?3, object_name = ?4, \
                 device_type = ?5, device_num = ?6, summary = ?7, llm_response = ?8, sentiment = ?9, \
                 category = ?10, is_important = ?11, manual_required = ?12, is_relevant = ?13, \
                 is_resolved = ?14 WHERE id = ?15",
                params![
                    opt_text(ticket.full_name.as_deref()),
                    opt_text(ticket.phone_num.as_deref()),
                    opt_text(ticket.email.as_deref()),
                    opt_text(ticket.object_name.as_deref()),
                    opt_text(ticket.device_type.as_deref()),
                    opt_text(ticket.device_num.as_deref()),
                    opt_text(ticket.summary.as_deref()),
                    opt_text(ticket.llm_response.as_deref()),
                    opt_text(ticket.sentiment.map(Sentiment::as_str)),
                    opt_text(ticket.category.map(Category::as_str)),
                    ticket.is_important as i64,
                    ticket.manual_required as i64,
                    ticket.is_relevant as i64,
                    ticket.is_resolved as i64,
                    ticket.id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_ticket: {e}")))
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a row selected with `TICKET_COLUMNS` to a Ticket.
fn row_to_ticket(row: &libsql::Row) -> Result<Ticket, DatabaseError> {
    let column = |e: libsql::Error| DatabaseError::Query(format!("ticket row parse: {e}"));
    let id_str: String = row.get(0).map_err(column)?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| DatabaseError::Serialization(format!("invalid ticket id '{id_str}': {e}")))?;
    let created_str: String = row.get(1).map_err(column)?;
    let sentiment: Option<String> = row.get(11).ok();
    let category: Option<String> = row.get(12).ok();

    Ok(Ticket {
        id,
        created_at: parse_datetime(&created_str),
        full_name: row.get(2).ok(),
        phone_num: row.get(3).ok(),
        email: row.get(4).ok(),
        object_name: row.get(5).ok(),
        device_type: row.get(6).ok(),
        device_num: row.get(7).ok(),
        original_message: row.get(8).map_err(column)?,
        summary: row.get(9).ok(),
        llm_response: row.get(10).ok(),
        sentiment: sentiment.and_then(|s| s.parse().ok()),
        category: category.and_then(|s| s.parse().ok()),
        is_important: row.get::<i64>(13).map_err(column)? != 0,
        manual_required: row.get::<i64>(14).map_err(column)? != 0,
        is_relevant: row.get::<i64>(15).map_err(column)? != 0,
        is_resolved: row.get::<i64>(16).map_err(column)? != 0,
    })
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl TicketStore for LibSqlBackend {
    async fn create(&self, ticket: &Ticket) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO tickets ({TICKET_COLUMNS}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                ),
                params![
                    ticket.id.to_string(),
                    format_datetime(&ticket.created_at),
                    opt_text(ticket.full_name.as_deref()),
                    opt_text(ticket.phone_num.as_deref()),
                    opt_text(ticket.email.as_deref()),
                    opt_text(ticket.object_name.as_deref()),
                    opt_text(ticket.device_type.as_deref()),
                    opt_text(ticket.device_num.as_deref()),
                    ticket.original_message.clone(),
                    opt_text(ticket.summary.as_deref()),
                    opt_text(ticket.llm_response.as_deref()),
                    opt_text(ticket.sentiment.map(Sentiment::as_str)),
                    opt_text(ticket.category.map(Category::as_str)),
                    ticket.is_important as i64,
                    ticket.manual_required as i64,
                    ticket.is_relevant as i64,
                    ticket.is_resolved as i64,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_ticket: {e}")))?;

        debug!(id = %ticket.id, "Ticket inserted into DB");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Ticket>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_ticket: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let ticket = row_to_ticket(&row)?;
                Ok(Some(ticket))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_ticket: {e}"))),
        }
    }

    async fn update(&self, id: Uuid, update: TicketUpdate) -> Result<bool, DatabaseError> {
        let Some(mut ticket) = self.get(id).await? else {
            return Ok(false);
        };
        update.apply(&mut ticket);
        let changed = self.write_mutable_columns(&ticket).await?;
        debug!(id = %id, "Ticket updated in DB");
        Ok(changed > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let deleted = self
            .conn()
            .execute("DELETE FROM tickets WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_ticket: {e}")))?;
        Ok(deleted > 0)
    }

    async fn list(&self, filter: TicketFilter) -> Result<Vec<Ticket>, DatabaseError> {
        let mut conditions = Vec::new();
        if !filter.show_resolved {
            conditions.push("is_resolved = 0");
        }
        if !filter.include_irrelevant {
            conditions.push("is_relevant = 1");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TICKET_COLUMNS} FROM tickets {where_clause} \
                     ORDER BY is_important DESC, manual_required DESC, created_at DESC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_tickets: {e}")))?;

        let mut tickets = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_ticket(&row) {
                Ok(ticket) => tickets.push(ticket),
                Err(e) => warn!("Skipping ticket row: {e}"),
            }
        }
        Ok(tickets)
    }
}

#[async_trait]
impl RoundRobinCounter for LibSqlBackend {
    async fn next_slot(&self, key: &str, len: usize) -> Result<usize, DatabaseError> {
        if len == 0 {
            return Err(DatabaseError::Query("next_slot: empty slot list".into()));
        }
        let len = len as i64;
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO counters (key, value) VALUES (?1, 1 % ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = (value + 1) % ?2 \
                 RETURNING value",
                params![key, len],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("next_slot: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("next_slot: {e}")))?
            .ok_or_else(|| DatabaseError::Query("next_slot: no row returned".into()))?;
        let advanced: i64 = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("next_slot row parse: {e}")))?;

        // The stored value already points at the next caller's slot.
        Ok(((advanced + len - 1) % len) as usize)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_ticket(message: &str) -> Ticket {
        let mut ticket = Ticket::new(message);
        ticket.full_name = Some("Иванов Иван".into());
        ticket.email = Some("ivanov@example.com".into());
        ticket.sentiment = Some(Sentiment::Negative);
        ticket.category = Some(Category::Malfunction);
        ticket
    }

    #[tokio::test]
    async fn insert_and_get_by_id() {
        let db = test_db().await;
        let ticket = make_ticket("Прибор не работает");
        db.create(&ticket).await.unwrap();

        let fetched = db.get(ticket.id).await.unwrap().unwrap();
        assert_eq!(fetched, ticket);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let db = test_db().await;
        assert!(db.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn processing_error_category_survives_storage() {
        let db = test_db().await;
        let mut ticket = make_ticket("x");
        ticket.category = Some(Category::ProcessingError);
        ticket.manual_required = true;
        db.create(&ticket).await.unwrap();
        let fetched = db.get(ticket.id).await.unwrap().unwrap();
        assert_eq!(fetched.category, Some(Category::ProcessingError));
        assert!(fetched.manual_required);
    }

    #[tokio::test]
    async fn update_keeps_id_and_created_at() {
        let db = test_db().await;
        let ticket = make_ticket("x");
        db.create(&ticket).await.unwrap();

        let update = TicketUpdate {
            summary: Some("Проверено".into()),
            is_resolved: Some(true),
            ..TicketUpdate::default()
        };
        assert!(db.update(ticket.id, update).await.unwrap());

        let fetched = db.get(ticket.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, ticket.id);
        assert_eq!(fetched.created_at, ticket.created_at);
        assert_eq!(fetched.summary.as_deref(), Some("Проверено"));
        assert!(fetched.is_resolved);
        assert_eq!(fetched.full_name, ticket.full_name);
    }

    #[tokio::test]
    async fn update_and_delete_missing_return_false() {
        let db = test_db().await;
        let id = Uuid::new_v4();
        assert!(!db.update(id, TicketUpdate::resolved()).await.unwrap());
        assert!(!db.delete(id).await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_ticket() {
        let db = test_db().await;
        let ticket = make_ticket("x");
        db.create(&ticket).await.unwrap();
        assert!(db.delete(ticket.id).await.unwrap());
        assert!(db.get(ticket.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_orders_by_priority_then_recency() {
        let db = test_db().await;
        let base = Utc::now();

        let mut old_plain = make_ticket("old plain");
        old_plain.created_at = base - Duration::hours(3);
        let mut new_plain = make_ticket("new plain");
        new_plain.created_at = base;
        let mut manual = make_ticket("manual");
        manual.created_at = base - Duration::hours(5);
        manual.manual_required = true;
        let mut important = make_ticket("important");
        important.created_at = base - Duration::hours(10);
        important.is_important = true;

        for t in [&old_plain, &new_plain, &manual, &important] {
            db.create(t).await.unwrap();
        }

        let messages: Vec<String> = db
            .list(TicketFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.original_message)
            .collect();
        assert_eq!(messages, vec!["important", "manual", "new plain", "old plain"]);
    }

    #[tokio::test]
    async fn row_with_malformed_id_is_skipped() {
        let db = test_db().await;
        let good = make_ticket("valid");
        db.create(&good).await.unwrap();
        db.conn()
            .execute(
                "INSERT INTO tickets (id, created_at, original_message) VALUES (?1, ?2, ?3)",
                params!["not-a-uuid", format_datetime(&Utc::now()), "broken"],
            )
            .await
            .unwrap();

        let listed = db.list(TicketFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, good.id);
        assert!(listed.iter().all(|t| !t.id.is_nil()));
    }

    #[tokio::test]
    async fn list_hides_resolved_and_irrelevant_by_default() {
        let db = test_db().await;
        let open = make_ticket("open");
        let mut resolved = make_ticket("resolved");
        resolved.is_resolved = true;
        let mut spam = make_ticket("spam");
        spam.is_relevant = false;
        spam.category = Some(Category::Spam);
        for t in [&open, &resolved, &spam] {
            db.create(t).await.unwrap();
        }

        let default = db.list(TicketFilter::default()).await.unwrap();
        assert_eq!(default.len(), 1);
        assert_eq!(default[0].id, open.id);

        let with_resolved = db
            .list(TicketFilter {
                show_resolved: true,
                include_irrelevant: false,
            })
            .await
            .unwrap();
        assert_eq!(with_resolved.len(), 2);

        let everything = db
            .list(TicketFilter {
                show_resolved: true,
                include_irrelevant: true,
            })
            .await
            .unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[tokio::test]
    async fn counter_cycles_through_slots() {
        let db = test_db().await;
        let mut slots = Vec::new();
        for _ in 0..7 {
            slots.push(db.next_slot("topics", 3).await.unwrap());
        }
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn counters_are_independent_per_key() {
        let db = test_db().await;
        assert_eq!(db.next_slot("a", 2).await.unwrap(), 0);
        assert_eq!(db.next_slot("a", 2).await.unwrap(), 1);
        assert_eq!(db.next_slot("b", 2).await.unwrap(), 0);
        assert!(db.next_slot("c", 0).await.is_err());
    }
}
