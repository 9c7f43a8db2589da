//! Error types for call-audio.
//!
//! Every intent resolves with a single `Result`; the variants below keep the
//! failure causes distinguishable in logs even though the downstream control
//! surface only forwards a boolean success.

/// Errors surfaced by routing intents and session setup.
///
/// Topology errors (`NoCard`, `NoSink`, `NoSource`) are synchronous: the
/// required object was absent when the intent arrived. The remaining
/// variants are produced while a request chain is in flight. The engine
/// never retries a failed mutation; only connection loss triggers local
/// recovery (an automatic reconnect).
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// No internal sound card has been discovered.
    #[error("no usable internal sound card")]
    NoCard,

    /// The tracked card currently has no usable sink.
    #[error("card has no usable sink")]
    NoSink,

    /// The tracked card currently has no usable source.
    #[error("card has no usable source")]
    NoSource,

    /// The port selector found no available candidate.
    #[error("no available {direction} port")]
    NoAvailablePort {
        /// Which direction the selection ran for (`output` or `input`).
        direction: &'static str,
    },

    /// The server answered a mutation with success = false.
    #[error("server request failed: {request}")]
    RequestFailed {
        /// Short description of the failed request.
        request: String,
    },

    /// The connection to the audio server was lost mid-chain.
    ///
    /// The session reconnects on its own; the interrupted intent is not
    /// resumed and must be reissued by the caller.
    #[error("connection to audio server lost")]
    Disconnected,

    /// The server completed an info request without a payload.
    #[error("server returned no {object} info")]
    EmptyInfo {
        /// The object kind that came back empty (`card`, `sink`, `source`).
        object: &'static str,
    },

    /// The routing engine is no longer running.
    #[error("routing engine stopped")]
    Stopped,

    /// The backend could not be brought up.
    #[error("audio backend error: {0}")]
    Backend(String),
}

impl RouteError {
    /// Creates a [`RouteError::RequestFailed`] with the given description.
    pub(crate) fn request_failed(request: impl Into<String>) -> Self {
        Self::RequestFailed {
            request: request.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_error_display() {
        assert_eq!(
            RouteError::NoCard.to_string(),
            "no usable internal sound card"
        );
        assert_eq!(
            RouteError::NoAvailablePort {
                direction: "output"
            }
            .to_string(),
            "no available output port"
        );
        assert_eq!(
            RouteError::EmptyInfo { object: "sink" }.to_string(),
            "server returned no sink info"
        );
    }

    #[test]
    fn test_request_failed_helper() {
        let err = RouteError::request_failed("set sink port 'earpiece'");
        assert_eq!(
            err.to_string(),
            "server request failed: set sink port 'earpiece'"
        );
    }
}
