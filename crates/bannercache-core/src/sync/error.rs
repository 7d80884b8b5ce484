use thiserror::Error;

use crate::api::ApiError;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Invalid release time {0:?}, expected HH:MM")]
    InvalidReleaseTime(String),
}

impl SyncError {
    /// True if the remote store rejected the entry because its title is taken.
    pub fn is_duplicate_title(&self) -> bool {
        matches!(self, SyncError::Api(ApiError::DuplicateTitle(_)))
    }
}
