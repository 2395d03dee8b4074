//! Persistence traits.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::tickets::model::{Ticket, TicketFilter, TicketUpdate};

/// Ticket persistence.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn create(&self, ticket: &Ticket) -> Result<(), DatabaseError>;

    async fn get(&self, id: Uuid) -> Result<Option<Ticket>, DatabaseError>;

    /// Apply a partial edit. Returns `false` when the ticket does not exist.
    async fn update(&self, id: Uuid, update: TicketUpdate) -> Result<bool, DatabaseError>;

    /// Returns `false` when the ticket does not exist.
    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// Tickets ordered important first, then manual-review, then newest.
    async fn list(&self, filter: TicketFilter) -> Result<Vec<Ticket>, DatabaseError>;
}

/// Shared cyclic counter for distributing work over `len` slots.
///
/// `next_slot` must advance and read the counter as one atomic step so that
/// concurrent callers never receive the same slot twice in a row.
#[async_trait]
pub trait RoundRobinCounter: Send + Sync {
    async fn next_slot(&self, key: &str, len: usize) -> Result<usize, DatabaseError>;
}
