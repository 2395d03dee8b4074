//! Ticket records, the dashboard API and reply approval.

pub mod api;
pub mod approval;
pub mod model;

pub use api::{AppState, ticket_routes};
pub use approval::ApprovalService;
pub use model::{Category, NewTicket, Sentiment, Ticket, TicketFilter, TicketNotice, TicketUpdate};
