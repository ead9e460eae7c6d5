//! # tidings-core
//!
//! Core types, traits, and wire events for the tidings real-time change
//! propagation and notification subsystem.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the storage, realtime, and API crates depend on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod localized;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{encode_frame, RawEvent, StreamEvent, HEARTBEAT_FRAME};
pub use localized::{Lang, LocaleConfig, Localized};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{extract_timestamp, is_v7, new_v7};
