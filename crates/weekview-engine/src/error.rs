//! Engine error types.

use thiserror::Error;
use weekview_caldav::CalDavError;

/// Errors surfaced by the sync engine.
///
/// Everything below the whole-cycle level (per-event parse failures,
/// per-calendar fetch failures) is absorbed into snapshot data; only
/// setup-level outcomes reach callers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The server rejected the credentials. Fatal for this engine
    /// instance: no automatic retries, the account must be reconfigured.
    #[error("authentication failed; reconfiguration required")]
    AuthenticationRequired,

    /// Connection setup kept failing for non-auth reasons. Recoverable:
    /// the engine stays invokable and a later refresh retries setup.
    #[error("connection setup failed after {attempts} attempts: {source}")]
    SetupFailed {
        /// How many attempts were made.
        attempts: u32,
        /// The last attempt's error.
        #[source]
        source: CalDavError,
    },
}

impl EngineError {
    /// Returns true if the engine must not be invoked again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationRequired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_classification() {
        assert!(EngineError::AuthenticationRequired.is_fatal());

        let err = EngineError::SetupFailed {
            attempts: 3,
            source: CalDavError::network("unreachable"),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn setup_failed_display() {
        let err = EngineError::SetupFailed {
            attempts: 3,
            source: CalDavError::network("unreachable"),
        };
        let rendered = format!("{}", err);
        assert!(rendered.contains("3 attempts"));
        assert!(rendered.contains("unreachable"));
    }
}
