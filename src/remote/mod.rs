//! Remote content system access
//!
//! The migration engine only talks to the remote through [`RemoteClient`];
//! [`ConfluenceClient`] is the production implementation.

mod config;
mod confluence;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scan::Visibility;

pub use config::{ConfluenceConfig, Credentials};
pub use confluence::ConfluenceClient;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Authentication failed")]
    AuthFailed,
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters for creating a space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceRequest {
    pub name: String,
    pub key: String,
    pub description: String,
    pub visibility: Visibility,
}

/// A space as the remote reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceHandle {
    pub id: String,
    pub key: String,
    pub url: String,
    /// Page the remote created as the space's landing page
    pub home_page_id: Option<String>,
}

/// Result of asking for a space
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceOutcome {
    Created(SpaceHandle),
    /// A space with the requested key already exists; resuming is safe
    AlreadyExists(SpaceHandle),
}

impl SpaceOutcome {
    pub fn into_handle(self) -> SpaceHandle {
        match self {
            Self::Created(handle) | Self::AlreadyExists(handle) => handle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageHandle {
    pub id: String,
    pub url: String,
}

/// An uploaded attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMedia {
    pub file_name: String,
    /// Link the page body should use for the attachment
    pub url: String,
}

/// Remote operations the migration needs.
///
/// Every call is blocking; a failure is never retried by the caller within
/// the same run.
pub trait RemoteClient {
    fn create_space(&self, request: &SpaceRequest) -> Result<SpaceOutcome, RemoteError>;

    fn create_page(
        &self,
        space_id: &str,
        title: &str,
        body: &str,
        parent_id: Option<&str>,
    ) -> Result<PageHandle, RemoteError>;

    fn upload_media(&self, page_id: &str, local_path: &Path) -> Result<RemoteMedia, RemoteError>;

    /// Replace the body of an existing page, keeping its title
    fn patch_page_body(&self, page_id: &str, body: &str) -> Result<(), RemoteError>;
}
