//! On-disk output: name planning and message materialization.

pub mod naming;
pub mod writer;
