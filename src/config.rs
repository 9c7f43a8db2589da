//! Session configuration.

use std::time::Duration;

/// Application name reported to the audio server.
pub const APPLICATION_NAME: &str = "CallAudio";

/// Application id reported to the audio server.
pub const APPLICATION_ID: &str = "org.mobian-project.CallAudio";

/// Configuration for a routing session.
///
/// Use [`SessionConfig::default()`] for the stock daemon identity, or
/// customize as needed.
///
/// # Example
///
/// ```
/// use call_audio::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig {
///     reconnect_delay: Duration::from_millis(500),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Application name placed in the server connection proplist.
    ///
    /// Default: `CallAudio`
    pub application_name: String,

    /// Application id placed in the server connection proplist.
    ///
    /// Default: `org.mobian-project.CallAudio`
    pub application_id: String,

    /// Explicit server address, or `None` for the default server.
    ///
    /// Default: `None`
    pub server: Option<String>,

    /// Delay before reconnecting after the context enters the failed state.
    ///
    /// The original daemon reconnects on the next loop iteration; a short
    /// delay avoids a tight spin when the server is down for longer.
    /// Default: 200ms
    pub reconnect_delay: Duration,

    /// Capacity of the intent command channel.
    ///
    /// Intents beyond this many queued commands apply backpressure on the
    /// caller. Default: 16
    pub intent_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            application_name: APPLICATION_NAME.to_string(),
            application_id: APPLICATION_ID.to_string(),
            server: None,
            reconnect_delay: Duration::from_millis(200),
            intent_queue: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.application_name, "CallAudio");
        assert_eq!(config.application_id, "org.mobian-project.CallAudio");
        assert_eq!(config.server, None);
        assert_eq!(config.reconnect_delay, Duration::from_millis(200));
        assert_eq!(config.intent_queue, 16);
    }
}
