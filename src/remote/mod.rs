//! Remote mailbox access: transport, credentials, retry policy, and the
//! retrieval client that turns API responses into [`Message`]s.
//!
//! [`Message`]: crate::model::mail::Message

pub mod auth;
pub mod client;
pub mod retry;
pub mod transport;
