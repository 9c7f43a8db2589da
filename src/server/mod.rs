//! Server abstraction: the seam between the routing engine and PulseAudio.
//!
//! A [`ServerApi`] is any audio server the engine can introspect and
//! mutate. The crate provides two implementations:
//!
//! - [`PulseServer`]: the real libpulse backend (feature `pulse`)
//! - [`MockServer`]: a scriptable in-memory server for tests
//!
//! The engine only ever sees this trait plus the info payloads below, so
//! the whole state machine is exercisable without a running server.

pub mod mock;
#[cfg(feature = "pulse")]
pub mod pulse;

pub use mock::{MockServer, Request};
#[cfg(feature = "pulse")]
pub use pulse::PulseServer;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::RouteError;

/// Availability tri-state of a port, as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortAvailable {
    /// The server does not know whether the port is usable.
    Unknown,
    /// The port is usable.
    Yes,
    /// The port is known to be unusable (nothing plugged in).
    No,
}

/// A routing endpoint on a sink or source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name, unique within its sink/source.
    pub name: String,
    /// Selection priority; higher is better.
    pub priority: u32,
    /// Availability tri-state.
    pub available: PortAvailable,
}

impl PortInfo {
    /// Convenience constructor for tests and backends.
    pub fn new(name: impl Into<String>, priority: u32, available: PortAvailable) -> Self {
        Self {
            name: name.into(),
            priority,
            available,
        }
    }
}

/// Device properties relevant to the card and endpoint filters.
///
/// A missing property never disqualifies an object: filters only reject
/// when the property is present and fails the test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceProps {
    /// `device.bus_path`
    pub bus_path: Option<String>,
    /// `device.form_factor`
    pub form_factor: Option<String>,
    /// `device.class`
    pub class: Option<String>,
    /// `device.api`
    pub api: Option<String>,
}

/// A sound card with its profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardInfo {
    /// Server-assigned index.
    pub index: u32,
    /// Opaque card name.
    pub name: String,
    /// Names of all profiles on the card.
    pub profiles: Vec<String>,
    /// Name of the active profile, if any.
    pub active_profile: Option<String>,
    /// Filter-relevant properties.
    pub props: DeviceProps,
}

/// A sink (output endpoint).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkInfo {
    /// Server-assigned index.
    pub index: u32,
    /// Sink name.
    pub name: String,
    /// Index of the owning card, if any.
    pub card: Option<u32>,
    /// All ports on the sink.
    pub ports: Vec<PortInfo>,
    /// Name of the active port, if any.
    pub active_port: Option<String>,
    /// Filter-relevant properties.
    pub props: DeviceProps,
}

/// A source (input endpoint).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// Server-assigned index.
    pub index: u32,
    /// Source name.
    pub name: String,
    /// Index of the owning card, if any.
    pub card: Option<u32>,
    /// All ports on the source.
    pub ports: Vec<PortInfo>,
    /// Name of the active port, if any.
    pub active_port: Option<String>,
    /// Whether the source is muted.
    pub mute: bool,
    /// Filter-relevant properties.
    pub props: DeviceProps,
}

/// A loaded server module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Server-assigned index.
    pub index: u32,
    /// Module name.
    pub name: String,
}

/// Object class a subscription event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facility {
    /// A sink changed.
    Sink,
    /// A source changed.
    Source,
    /// A card changed.
    Card,
}

/// What happened to the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The object appeared.
    New,
    /// The object changed.
    Change,
    /// The object disappeared.
    Remove,
}

/// Notification delivered on the event channel returned by
/// [`ServerApi::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The connection is ready; the engine runs full discovery.
    Connected,
    /// The connection was lost; the backend reconnects on its own.
    Disconnected,
    /// A subscribed object changed.
    Object {
        /// Object class.
        facility: Facility,
        /// Change kind.
        kind: EventKind,
        /// Index of the affected object.
        index: u32,
    },
}

/// An audio server the routing engine can drive.
///
/// All requests are serialized per connection: requests issued later
/// complete later. Mutations resolve `Ok(())` only when the server reported
/// success; a `false` success flag becomes [`RouteError::RequestFailed`]
/// and a reply lost to a teardown becomes [`RouteError::Disconnected`].
#[async_trait]
pub trait ServerApi: Send + Sync {
    /// Lists all cards.
    async fn list_cards(&self) -> Result<Vec<CardInfo>, RouteError>;

    /// Lists all loaded modules.
    async fn list_modules(&self) -> Result<Vec<ModuleInfo>, RouteError>;

    /// Lists all sinks.
    async fn list_sinks(&self) -> Result<Vec<SinkInfo>, RouteError>;

    /// Lists all sources.
    async fn list_sources(&self) -> Result<Vec<SourceInfo>, RouteError>;

    /// Fetches one card by index.
    async fn card_by_index(&self, index: u32) -> Result<CardInfo, RouteError>;

    /// Fetches one sink by index.
    async fn sink_by_index(&self, index: u32) -> Result<SinkInfo, RouteError>;

    /// Fetches one source by index.
    async fn source_by_index(&self, index: u32) -> Result<SourceInfo, RouteError>;

    /// Activates a card profile.
    async fn set_card_profile(&self, index: u32, profile: &str) -> Result<(), RouteError>;

    /// Activates a sink port.
    async fn set_sink_port(&self, index: u32, port: &str) -> Result<(), RouteError>;

    /// Activates a source port.
    async fn set_source_port(&self, index: u32, port: &str) -> Result<(), RouteError>;

    /// Mutes or unmutes a source.
    async fn set_source_mute(&self, index: u32, mute: bool) -> Result<(), RouteError>;

    /// Unloads a module.
    async fn unload_module(&self, index: u32) -> Result<(), RouteError>;

    /// Returns a channel of connection and object events.
    ///
    /// The session subscribes exactly once. Backends emit
    /// [`ServerEvent::Connected`] every time the connection becomes ready,
    /// including the first time, so subscribing before connecting never
    /// misses the initial discovery trigger.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ServerEvent>;
}
