//! Relay data models. Each value lives for the handling of a single message.

pub mod notification;
pub mod repo;
pub mod status;
