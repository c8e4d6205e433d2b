//! Mail responder: polls a mailbox, drafts replies with an LLM, sends them,
//! and pushes progress to a live UI.

pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod notify;
pub mod pipeline;
pub mod server;
pub mod store;
