//! Routing session management.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::engine::{Command, Intent};
use crate::topology::Mode;
use crate::RouteError;

/// Handle to a running routing session.
///
/// The `Session` is returned by [`CallAudioBuilder::connect`] and
/// represents a live connection to the audio server with the routing
/// engine running in a background task. All intent methods resolve exactly
/// once with the outcome of the full request chain.
///
/// The handle is cheap to clone; the engine stops once every handle is
/// dropped or [`stop`](Session::stop) is called.
///
/// # Example
///
/// ```ignore
/// use call_audio::{CallAudio, Mode};
///
/// let session = CallAudio::builder().connect().await?;
/// session.select_mode(Mode::Call).await?;
/// session.mute_mic(true).await?;
/// session.select_mode(Mode::Default).await?;
/// ```
///
/// [`CallAudioBuilder::connect`]: crate::CallAudioBuilder::connect
#[derive(Clone)]
pub struct Session {
    commands: mpsc::Sender<Command>,
}

impl Session {
    pub(crate) fn new(commands: mpsc::Sender<Command>) -> Self {
        Self { commands }
    }

    /// Switches between default and voice-call routing.
    ///
    /// Runs the full transition chain: implicit mic unmute when leaving a
    /// call, card profile switch when the card has a voice profile, the
    /// droid parking dance where required, and the final port selection.
    ///
    /// # Errors
    ///
    /// Fails with the topology errors when card or sink are absent, or
    /// with a chain error when a server request fails mid-transition. The
    /// reported mode only advances on success.
    pub async fn select_mode(&self, mode: Mode) -> Result<(), RouteError> {
        self.intent(Intent::SelectMode(mode)).await
    }

    /// Forces the loudspeaker on, or re-runs regular selection without it.
    ///
    /// # Errors
    ///
    /// Fails with [`RouteError::NoSink`] when no sink is tracked, or
    /// [`RouteError::NoAvailablePort`] when no candidate port remains.
    pub async fn enable_speaker(&self, enable: bool) -> Result<(), RouteError> {
        self.intent(Intent::EnableSpeaker(enable)).await
    }

    /// Mutes or unmutes the microphone.
    ///
    /// A no-op (still successful) when the source already has the
    /// requested state.
    ///
    /// # Errors
    ///
    /// Fails with [`RouteError::NoSource`] when no source is tracked.
    pub async fn mute_mic(&self, mute: bool) -> Result<(), RouteError> {
        self.intent(Intent::MuteMic(mute)).await
    }

    /// Returns the mode of the last successful [`select_mode`].
    ///
    /// [`select_mode`]: Session::select_mode
    ///
    /// # Errors
    ///
    /// Fails with [`RouteError::Stopped`] when the engine is gone.
    pub async fn current_mode(&self) -> Result<Mode, RouteError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::CurrentMode { reply })
            .await
            .map_err(|_| RouteError::Stopped)?;
        response.await.map_err(|_| RouteError::Stopped)
    }

    async fn intent(&self, intent: Intent) -> Result<(), RouteError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Intent { intent, reply })
            .await
            .map_err(|_| RouteError::Stopped)?;
        response.await.map_err(|_| RouteError::Stopped)?
    }
}

/// Owner of the engine task, produced next to the first [`Session`].
///
/// Dropping the runner detaches the engine; it keeps serving existing
/// session handles until they are dropped too. Use [`stop`] to tear the
/// engine down deterministically.
///
/// [`stop`]: SessionRunner::stop
pub struct SessionRunner {
    handle: JoinHandle<()>,
}

impl SessionRunner {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    /// Aborts the engine task.
    ///
    /// In-flight intents resolve with [`RouteError::Stopped`].
    pub fn stop(self) {
        self.handle.abort();
    }

    /// Waits for the engine to finish on its own, i.e. for every
    /// [`Session`] handle and the server event channel to be gone.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}
