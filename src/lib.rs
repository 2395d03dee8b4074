//! Support Triage: turns support emails into reviewed tickets.
//!
//! Personal data is masked before drafting, restored afterwards, and every
//! outgoing reply waits for human approval.

pub mod channels;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod logging;
pub mod notify;
pub mod pii;
pub mod pipeline;
pub mod store;
pub mod tickets;
