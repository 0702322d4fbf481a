//! Core data model types: fetched messages, attachments, and the remote part tree.

pub mod attachment;
pub mod mail;
pub mod part;
