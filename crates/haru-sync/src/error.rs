use thiserror::Error;

/// Failure reported by a remote collaborator (document store, blob store).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The path holds no value, or no longer exists.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Network or backend unavailable.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend refused the write.
    #[error("Rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Sign-out failed: {0}")]
    SignOut(String),
}

/// Errors from starting or stopping a session.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No signed-in user")]
    NotSignedIn,

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Errors from the group lifecycle operations.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("No current user")]
    NotSignedIn,

    #[error("Group name must be at least {min} characters")]
    InvalidGroupName { min: usize },

    #[error("Could not draw an unused invite code after {attempts} attempts")]
    InviteCodeExhausted { attempts: u32 },

    #[error("Group not found")]
    GroupNotFound,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Errors from post, comment and profile mutations.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("No current user")]
    NotSignedIn,

    #[error("Current user has no group")]
    NoGroup,

    /// Blob upload failed; nothing was written to the document store.
    #[error("Upload failed: {0}")]
    Upload(#[source] RemoteError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}
