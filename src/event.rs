//! Runtime events for monitoring routing decisions.
//!
//! Events are informational notifications about what the engine did. The
//! session continues running after events are emitted - they're for
//! logging/metrics, not error handling.

use std::sync::Arc;

use crate::topology::Mode;

/// Routing direction, used to label sink vs source activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sink side (playback).
    Output,
    /// Source side (capture).
    Input,
}

impl Direction {
    /// Lowercase label for logs and error messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Output => "output",
            Self::Input => "input",
        }
    }
}

/// Runtime events emitted by the routing engine.
///
/// These are informational, not errors. Register an [`EventCallback`] via
/// the builder's `on_event` hook to log them or update metrics.
#[derive(Debug, Clone)]
pub enum RouteEvent {
    /// The server connection became ready and discovery ran.
    Connected,

    /// The server connection was lost; a reconnect is pending.
    Disconnected,

    /// The internal card was discovered.
    CardDiscovered {
        /// Server-assigned card index.
        index: u32,
        /// Card name.
        name: String,
        /// Whether a voice-call profile was found on the card.
        has_voice_profile: bool,
    },

    /// A sink or source owned by the tracked card was discovered.
    EndpointDiscovered {
        /// Which side the endpoint is on.
        direction: Direction,
        /// Server-assigned index.
        index: u32,
        /// Endpoint name.
        name: String,
    },

    /// The tracked sink or source disappeared from the server.
    EndpointLost {
        /// Which side the endpoint was on.
        direction: Direction,
        /// Index the endpoint had.
        index: u32,
    },

    /// The active port of the tracked sink or source was switched.
    PortSwitched {
        /// Which side the port belongs to.
        direction: Direction,
        /// Name of the newly selected port.
        port: String,
    },

    /// The card profile was switched.
    ProfileSwitched {
        /// Name of the newly active profile.
        profile: String,
    },

    /// A `select_mode` intent completed successfully.
    ModeChanged {
        /// The mode that is now active.
        mode: Mode,
    },
}

/// Callback type for receiving [`RouteEvent`]s.
pub type EventCallback = Arc<dyn Fn(RouteEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use call_audio::{event_callback, RouteEvent};
///
/// let callback = event_callback(|event| {
///     tracing::debug!(?event, "routing event");
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(RouteEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_labels() {
        assert_eq!(Direction::Output.label(), "output");
        assert_eq!(Direction::Input.label(), "input");
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        callback(RouteEvent::Connected);
        assert!(called.load(Ordering::SeqCst));
    }
}
