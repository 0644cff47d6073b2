//! Gateway configuration.

use crate::transfer::DEFAULT_CHUNK_SIZE;

/// Default cap on multipart upload bodies (1 GiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

/// Status reported when a container or item cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotFoundStatus {
    /// Report resolution failures as 500, like every other backend failure.
    #[default]
    Compatible,
    /// Report resolution failures caused by a missing entry as 404.
    Distinct,
}

/// Runtime settings shared by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Chunk size used when moving content between backends.
    pub chunk_size: usize,
    /// Largest accepted upload request body in bytes.
    pub max_upload_bytes: usize,
    /// Status for missing containers and items.
    pub not_found_status: NotFoundStatus,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            not_found_status: NotFoundStatus::default(),
        }
    }
}

impl GatewayConfig {
    /// Set the transfer chunk size. Zero is raised to one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the upload body limit.
    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    /// Set the not-found reporting mode.
    pub fn with_not_found_status(mut self, status: NotFoundStatus) -> Self {
        self.not_found_status = status;
        self
    }
}
