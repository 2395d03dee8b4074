//! Inbound message pipeline.
//!
//! Every support email flows through:
//! 1. `EntityExtractor` for names, devices, phones, emails and organizations
//! 2. `RelevanceClassifier`, where irrelevant mail is stored and stops here
//! 3. `PiiMasker::mask`, so nothing personal reaches the generator
//! 4. `AiResponseOrchestrator` for classification and a draft reply
//! 5. `PiiMasker::unmask` and `TicketAssembler`
//! 6. Ticket store, then `NotificationRouter`
//!
//! Drafts are never sent automatically; a reply goes out only on approval.

pub mod assembler;
pub mod drafts;
pub mod orchestrator;
pub mod processor;
pub mod relevance;
pub mod types;

pub use assembler::TicketAssembler;
pub use drafts::{DraftJob, DraftQueue};
pub use orchestrator::{AiResponseOrchestrator, DraftBackend};
pub use processor::TicketPipeline;
pub use relevance::RelevanceClassifier;
pub use types::{AiOutcome, InboundMail};
