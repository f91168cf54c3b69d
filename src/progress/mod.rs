//! Durable migration progress
//!
//! One JSON file maps every channel and document to its migration record.
//! It is the only source of truth for "has this already been done".

mod models;
mod store;

pub use models::*;
pub use store::{PersistError, ProgressStore, STATE_FILE_NAME};
