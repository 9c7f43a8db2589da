//! Scriptable in-memory server for testing without PulseAudio.
//!
//! The mock keeps a mutable topology, applies every mutation to it so that
//! follow-up fetches observe the new state, and records all mutations in an
//! ordered request log. Tests script the topology up front, drive the
//! engine, then assert on the log.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    CardInfo, EventKind, Facility, ModuleInfo, ServerApi, ServerEvent, SinkInfo, SourceInfo,
};
use crate::RouteError;

/// A mutation recorded by the mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `set_card_profile(card, profile)`
    SetCardProfile(u32, String),
    /// `set_sink_port(sink, port)`
    SetSinkPort(u32, String),
    /// `set_source_port(source, port)`
    SetSourcePort(u32, String),
    /// `set_source_mute(source, mute)`
    SetSourceMute(u32, bool),
    /// `unload_module(index)`
    UnloadModule(u32),
}

#[derive(Default)]
struct MockState {
    cards: Vec<CardInfo>,
    sinks: Vec<SinkInfo>,
    sources: Vec<SourceInfo>,
    modules: Vec<ModuleInfo>,
    /// Mutations that should answer success = false, front first.
    fail_queue: VecDeque<Request>,
}

/// In-memory [`ServerApi`] implementation.
///
/// # Example
///
/// ```
/// use call_audio::server::{MockServer, PortAvailable, PortInfo};
///
/// let server = MockServer::new();
/// server.add_sink_ports(
///     3,
///     0,
///     &[PortInfo::new("earpiece", 50, PortAvailable::Yes)],
///     Some("earpiece"),
///     None,
/// );
/// assert!(server.requests().is_empty());
/// ```
#[derive(Default)]
pub struct MockServer {
    state: Mutex<MockState>,
    requests: Mutex<Vec<Request>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ServerEvent>>>,
}

impl MockServer {
    /// Creates an empty mock server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a card.
    pub fn add_card(&self, card: CardInfo) {
        self.lock_state().cards.push(card);
    }

    /// Installs a sink.
    pub fn add_sink(&self, sink: SinkInfo) {
        self.lock_state().sinks.push(sink);
    }

    /// Installs a sink with class `sound` and the given ports.
    ///
    /// Convenience for the common test shape; `api` tags the back-end
    /// flavor property.
    pub fn add_sink_ports(
        &self,
        index: u32,
        card: u32,
        ports: &[super::PortInfo],
        active: Option<&str>,
        api: Option<&str>,
    ) {
        self.add_sink(SinkInfo {
            index,
            name: format!("sink-{index}"),
            card: Some(card),
            ports: ports.to_vec(),
            active_port: active.map(str::to_string),
            props: sound_props(api),
        });
    }

    /// Installs a source.
    pub fn add_source(&self, source: SourceInfo) {
        self.lock_state().sources.push(source);
    }

    /// Installs a source with class `sound` and the given ports.
    pub fn add_source_ports(
        &self,
        index: u32,
        card: u32,
        ports: &[super::PortInfo],
        active: Option<&str>,
        api: Option<&str>,
    ) {
        self.add_source(SourceInfo {
            index,
            name: format!("source-{index}"),
            card: Some(card),
            ports: ports.to_vec(),
            active_port: active.map(str::to_string),
            mute: false,
            props: sound_props(api),
        });
    }

    /// Installs a module.
    pub fn add_module(&self, index: u32, name: &str) {
        self.lock_state().modules.push(ModuleInfo {
            index,
            name: name.to_string(),
        });
    }

    /// Removes a sink, as if it disappeared server-side.
    pub fn remove_sink(&self, index: u32) {
        self.lock_state().sinks.retain(|s| s.index != index);
    }

    /// Removes a source.
    pub fn remove_source(&self, index: u32) {
        self.lock_state().sources.retain(|s| s.index != index);
    }

    /// Overwrites the availability of a sink port.
    pub fn set_sink_port_available(&self, sink: u32, port: &str, available: super::PortAvailable) {
        let mut state = self.lock_state();
        if let Some(sink) = state.sinks.iter_mut().find(|s| s.index == sink) {
            if let Some(port) = sink.ports.iter_mut().find(|p| p.name == port) {
                port.available = available;
            }
        }
    }

    /// Overwrites the active port of a sink, bypassing the request log.
    pub fn set_sink_active_port(&self, sink: u32, port: &str) {
        let mut state = self.lock_state();
        if let Some(sink) = state.sinks.iter_mut().find(|s| s.index == sink) {
            sink.active_port = Some(port.to_string());
        }
    }

    /// Overwrites the mute flag of a source.
    pub fn set_source_muted(&self, source: u32, mute: bool) {
        let mut state = self.lock_state();
        if let Some(source) = state.sources.iter_mut().find(|s| s.index == source) {
            source.mute = mute;
        }
    }

    /// Scripts the next matching mutation to answer success = false.
    pub fn fail_request(&self, request: Request) {
        self.lock_state().fail_queue.push_back(request);
    }

    /// Emits `Connected`, triggering full discovery in the engine.
    pub fn emit_connected(&self) {
        self.push_event(ServerEvent::Connected);
    }

    /// Emits an object event.
    pub fn emit_object(&self, facility: Facility, kind: EventKind, index: u32) {
        self.push_event(ServerEvent::Object {
            facility,
            kind,
            index,
        });
    }

    /// Emits a raw server event to all subscribers.
    pub fn push_event(&self, event: ServerEvent) {
        let subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        for tx in subscribers.iter() {
            let _ = tx.send(event.clone());
        }
    }

    /// Returns the ordered mutation log.
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Clears the mutation log.
    pub fn clear_requests(&self) {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records the mutation; returns `Err(RequestFailed)` when scripted to.
    fn record(&self, request: Request) -> Result<(), RouteError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let mut state = self.lock_state();
        if let Some(pos) = state.fail_queue.iter().position(|r| *r == request) {
            state.fail_queue.remove(pos);
            return Err(RouteError::request_failed(format!("{request:?}")));
        }
        Ok(())
    }
}

fn sound_props(api: Option<&str>) -> super::DeviceProps {
    super::DeviceProps {
        class: Some("sound".to_string()),
        api: api.map(str::to_string),
        ..Default::default()
    }
}

#[async_trait]
impl ServerApi for MockServer {
    async fn list_cards(&self) -> Result<Vec<CardInfo>, RouteError> {
        Ok(self.lock_state().cards.clone())
    }

    async fn list_modules(&self) -> Result<Vec<ModuleInfo>, RouteError> {
        Ok(self.lock_state().modules.clone())
    }

    async fn list_sinks(&self) -> Result<Vec<SinkInfo>, RouteError> {
        Ok(self.lock_state().sinks.clone())
    }

    async fn list_sources(&self) -> Result<Vec<SourceInfo>, RouteError> {
        Ok(self.lock_state().sources.clone())
    }

    async fn card_by_index(&self, index: u32) -> Result<CardInfo, RouteError> {
        self.lock_state()
            .cards
            .iter()
            .find(|c| c.index == index)
            .cloned()
            .ok_or(RouteError::EmptyInfo { object: "card" })
    }

    async fn sink_by_index(&self, index: u32) -> Result<SinkInfo, RouteError> {
        self.lock_state()
            .sinks
            .iter()
            .find(|s| s.index == index)
            .cloned()
            .ok_or(RouteError::EmptyInfo { object: "sink" })
    }

    async fn source_by_index(&self, index: u32) -> Result<SourceInfo, RouteError> {
        self.lock_state()
            .sources
            .iter()
            .find(|s| s.index == index)
            .cloned()
            .ok_or(RouteError::EmptyInfo { object: "source" })
    }

    async fn set_card_profile(&self, index: u32, profile: &str) -> Result<(), RouteError> {
        self.record(Request::SetCardProfile(index, profile.to_string()))?;
        let mut state = self.lock_state();
        if let Some(card) = state.cards.iter_mut().find(|c| c.index == index) {
            card.active_profile = Some(profile.to_string());
        }
        Ok(())
    }

    async fn set_sink_port(&self, index: u32, port: &str) -> Result<(), RouteError> {
        self.record(Request::SetSinkPort(index, port.to_string()))?;
        let mut state = self.lock_state();
        if let Some(sink) = state.sinks.iter_mut().find(|s| s.index == index) {
            sink.active_port = Some(port.to_string());
        }
        Ok(())
    }

    async fn set_source_port(&self, index: u32, port: &str) -> Result<(), RouteError> {
        self.record(Request::SetSourcePort(index, port.to_string()))?;
        let mut state = self.lock_state();
        if let Some(source) = state.sources.iter_mut().find(|s| s.index == index) {
            source.active_port = Some(port.to_string());
        }
        Ok(())
    }

    async fn set_source_mute(&self, index: u32, mute: bool) -> Result<(), RouteError> {
        self.record(Request::SetSourceMute(index, mute))?;
        let mut state = self.lock_state();
        if let Some(source) = state.sources.iter_mut().find(|s| s.index == index) {
            source.mute = mute;
        }
        Ok(())
    }

    async fn unload_module(&self, index: u32) -> Result<(), RouteError> {
        self.record(Request::UnloadModule(index))?;
        self.lock_state().modules.retain(|m| m.index != index);
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }
}
