//! These models represent the objects passed around by the agent
//!
//! There are a few related formats we need to interact with:
//! - the persisted transcript, a [`chat::Chat`] of [`message::Message`]s
//! - openai chat-completion messages and function definitions, sent to the LLM
//! - openapi operations, parsed into endpoint descriptors by [`crate::openapi`]
//!
//! We always immediately convert those data models into the internal structs
//! using to/from helpers, so the internal models are not an exact match to
//! any of these formats.
pub mod chat;
pub mod function;
pub mod message;
pub mod role;
