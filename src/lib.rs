//! # call-audio
//!
//! Daemon-side audio routing for telephony on Linux handsets.
//!
//! `call-audio` translates high-level call intents - enter/leave call mode,
//! force the loudspeaker, mute the microphone - into the multi-step routing
//! changes a PulseAudio server needs: card profile switches, port selection
//! on the internal card's sink and source, and the parking indirection the
//! Android HAL back-end requires.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use call_audio::{CallAudio, Mode};
//!
//! let (session, _runner) = CallAudio::builder()
//!     .on_event(|e| tracing::debug!(?e, "routing event"))
//!     .connect()
//!     .await?;
//!
//! // Incoming call accepted:
//! session.select_mode(Mode::Call).await?;
//!
//! // User taps the speaker button:
//! session.enable_speaker(true).await?;
//!
//! // Call ended:
//! session.select_mode(Mode::Default).await?;
//! ```
//!
//! ## Architecture
//!
//! The crate is a single actor around an in-memory topology:
//!
//! - **Server backend**: owns the PulseAudio connection and reconnects on
//!   failure; everything above it only sees the [`server::ServerApi`] trait
//! - **Engine**: reacts to server events (discovery, availability changes)
//!   and executes intent chains, one suspension point per server request
//! - **Session**: the cloneable handle whose intent methods resolve exactly
//!   once with the outcome of the full chain
//!
//! Routing decisions never move audio samples; the crate only reshapes
//! which ports and profiles are active.

#![warn(missing_docs)]

mod builder;
mod config;
mod discovery;
mod engine;
mod error;
mod event;
mod select;
pub mod server;
mod session;
mod topology;
pub mod ucm;

pub use builder::{CallAudio, CallAudioBuilder};
pub use config::{SessionConfig, APPLICATION_ID, APPLICATION_NAME};
pub use error::RouteError;
pub use event::{event_callback, Direction, EventCallback, RouteEvent};
pub use select::{pick_input_port, pick_output_port};
pub use session::{Session, SessionRunner};
pub use topology::{BackendFlavor, Mode};
