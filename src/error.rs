use crate::protocol::Target;
use thiserror::Error;

/// Failures of the host messaging substrate.
///
/// Delivery can fail independently of the receiver's logic: the target context may
/// never have existed, may have been destroyed mid-flight, or may simply not answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Could not establish connection to {0}: receiving end does not exist")]
    NoReceiver(Target),

    #[error("{0} was destroyed before it responded")]
    Disconnected(Target),

    #[error("{0} did not answer the message")]
    NoResponse(Target),
}

/// Errors that can occur across the picker, protocol and storage layers
#[derive(Debug, Error)]
pub enum SyringeError {
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Cannot operate on restricted page: {url}")]
    RestrictedPage { url: String },

    #[error("No active tab found")]
    NoActiveTab,

    #[error("Failed to inject page agent: {0}")]
    InjectionFailed(String),

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Nothing is highlighted")]
    NothingHighlighted,

    #[error("Picker is not active")]
    PickerInactive,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Tab operation failed: {0}")]
    TabOperationFailed(String),

    #[error("Failed to parse DOM: {0}")]
    DomParseFailed(String),
}

impl SyringeError {
    /// Short message suitable for a toast on the control surface
    pub fn user_message(&self) -> String {
        match self {
            SyringeError::RestrictedPage { .. } => "Cannot use picker on this page".to_string(),
            SyringeError::NoActiveTab => "No active tab found".to_string(),
            SyringeError::InjectionFailed(_) | SyringeError::Transport(_) => {
                "Could not start picker. Try refreshing the page.".to_string()
            }
            SyringeError::NothingHighlighted => "Hover an element before confirming".to_string(),
            SyringeError::Validation(reason) => reason.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the error came from the messaging substrate rather than our own logic
    pub fn is_transport(&self) -> bool {
        matches!(self, SyringeError::Transport(_))
    }
}

/// Result type alias for dom-syringe operations
pub type Result<T> = std::result::Result<T, SyringeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restricted_page_message() {
        let err = SyringeError::RestrictedPage {
            url: "chrome://settings".to_string(),
        };
        assert!(err.to_string().contains("chrome://settings"));
        assert_eq!(err.user_message(), "Cannot use picker on this page");
    }

    #[test]
    fn test_transport_errors_surface_as_soft_failure() {
        let err: SyringeError = TransportError::NoReceiver(Target::Tab(3)).into();
        assert!(err.is_transport());
        assert_eq!(
            err.user_message(),
            "Could not start picker. Try refreshing the page."
        );
        assert!(err.to_string().contains("tab 3"));
    }

    #[test]
    fn test_validation_message_passes_through() {
        let err = SyringeError::Validation("Please enter a name".to_string());
        assert_eq!(err.user_message(), "Please enter a name");
    }
}
