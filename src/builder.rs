//! Builder pattern for `CallAudio`.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::engine::Engine;
use crate::event::EventCallback;
use crate::server::ServerApi;
use crate::session::{Session, SessionRunner};
#[cfg(feature = "pulse")]
use crate::RouteError;
use crate::{RouteEvent, SessionConfig};

/// Entry point for creating routing sessions.
///
/// # Example
///
/// ```ignore
/// use call_audio::{CallAudio, Mode};
///
/// let session = CallAudio::builder()
///     .on_event(|e| tracing::debug!(?e, "routing event"))
///     .connect()
///     .await?;
///
/// session.select_mode(Mode::Call).await?;
/// ```
pub struct CallAudio;

impl CallAudio {
    /// Creates a new builder with default settings.
    pub fn builder() -> CallAudioBuilder {
        CallAudioBuilder::new()
    }
}

/// Builder for configuring and starting a routing session.
#[must_use]
pub struct CallAudioBuilder {
    config: SessionConfig,
    event_callback: Option<EventCallback>,
}

impl Default for CallAudioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CallAudioBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            event_callback: None,
        }
    }

    /// Replaces the session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set a callback to receive [`RouteEvent`]s.
    ///
    /// Events include discovery results, port and profile switches, and
    /// connection state changes.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(RouteEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(Arc::new(callback));
        self
    }

    /// Connects to the default PulseAudio server and starts the engine.
    ///
    /// The backend reconnects on its own after connection failures;
    /// discovery re-runs on every reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Backend`] when the mainloop or context cannot
    /// be brought up at all.
    #[cfg(feature = "pulse")]
    pub async fn connect(self) -> Result<(Session, SessionRunner), RouteError> {
        let server = crate::server::PulseServer::spawn(self.config.clone())?;
        Ok(self.start(Arc::new(server)))
    }

    /// Starts the engine over an explicit [`ServerApi`] backend.
    ///
    /// This is the seam used by tests (with
    /// [`MockServer`](crate::server::MockServer)) and by embedders that
    /// bring their own server integration.
    pub fn connect_with(self, server: Arc<dyn ServerApi>) -> (Session, SessionRunner) {
        self.start(server)
    }

    fn start(self, server: Arc<dyn ServerApi>) -> (Session, SessionRunner) {
        let server_events = server.subscribe();
        let (command_tx, command_rx) = mpsc::channel(self.config.intent_queue);

        let engine = Engine::new(server, self.event_callback, command_rx, server_events);
        let handle = tokio::spawn(engine.run());

        (Session::new(command_tx), SessionRunner::new(handle))
    }
}
