//! HTTP handlers for tidings-api.

pub mod health;
pub mod internal;
pub mod notifications;
pub mod stream;
pub mod topics;
