use thiserror::Error;

/// Failure taxonomy shared by every read and write path.
///
/// The platform does not let us tell a missing row from a denied one from an
/// unreachable host, so everything the transport reports collapses into
/// [`StoreError::Remote`]. The remaining variants are raised client-side
/// before any remote call is made.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    Precondition(String),
}

impl StoreError {
    /// The human-readable notice the UI shows for this failure.
    pub fn user_message(&self) -> String {
        match self {
            StoreError::NotAuthenticated => "You need to be signed in to do that.".to_string(),
            StoreError::Validation(msg) | StoreError::Precondition(msg) => msg.clone(),
            StoreError::Remote(_) => "Operation failed. Please try again.".to_string(),
        }
    }
}
