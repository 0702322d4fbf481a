//! `mailpull`: download a Gmail mailbox into plain files.
//!
//! Each message becomes one folder named `{date}_{subject}` holding an
//! HTML body, the attachments, and a metadata text file. Re-running over
//! the same output directory skips messages that are already complete.

pub mod config;
pub mod download;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
pub mod remote;
