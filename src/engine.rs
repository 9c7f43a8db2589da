//! The routing engine: operation chains and the event reactor.
//!
//! One actor task owns the topology and the current mode. It is driven by
//! `tokio::select!` over two channels: intent commands from [`Session`]
//! handles and server events from the backend. Each intent runs as an
//! async chain whose suspension points are server requests, so steps are
//! serialized by construction and every intent resolves exactly once.
//!
//! [`Session`]: crate::Session

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::discovery;
use crate::event::{Direction, EventCallback, RouteEvent};
use crate::select;
use crate::server::{EventKind, Facility, ServerApi, ServerEvent, SinkInfo};
use crate::topology::{Mode, Topology};
use crate::ucm;
use crate::RouteError;

/// A user intent, as carried on the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Intent {
    SelectMode(Mode),
    EnableSpeaker(bool),
    MuteMic(bool),
}

/// Commands accepted by the engine actor.
pub(crate) enum Command {
    Intent {
        intent: Intent,
        reply: oneshot::Sender<Result<(), RouteError>>,
    },
    CurrentMode {
        reply: oneshot::Sender<Mode>,
    },
}

/// What an output-port step is trying to achieve. Entering a call excludes
/// the speaker so headphones win when present; forcing the speaker selects
/// it verbatim; releasing the speaker re-runs selection without it.
#[derive(Debug, Clone, Copy)]
enum OutputGoal {
    Mode(Mode),
    Speaker(bool),
}

pub(crate) struct Engine {
    server: Arc<dyn ServerApi>,
    topo: Topology,
    current_mode: Mode,
    events: Option<EventCallback>,
    commands: mpsc::Receiver<Command>,
    server_events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Engine {
    pub(crate) fn new(
        server: Arc<dyn ServerApi>,
        events: Option<EventCallback>,
        commands: mpsc::Receiver<Command>,
        server_events: mpsc::UnboundedReceiver<ServerEvent>,
    ) -> Self {
        Self {
            server,
            topo: Topology::default(),
            current_mode: Mode::Default,
            events,
            commands,
            server_events,
        }
    }

    /// Runs the actor until all session handles are dropped.
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                Some(command) = self.commands.recv() => {
                    self.handle_command(command).await;
                }
                Some(event) = self.server_events.recv() => {
                    self.handle_server_event(event).await;
                }
                else => break,
            }
        }
        debug!("routing engine stopped");
    }

    fn emit(&self, event: RouteEvent) {
        if let Some(ref callback) = self.events {
            callback(event);
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Intent { intent, reply } => {
                let result = self.execute(intent).await;
                if let Err(ref err) = result {
                    warn!(?intent, %err, "intent failed");
                }
                // The caller may have given up waiting; that must not
                // disturb the engine.
                let _ = reply.send(result);
            }
            Command::CurrentMode { reply } => {
                let _ = reply.send(self.current_mode);
            }
        }
    }

    async fn execute(&mut self, intent: Intent) -> Result<(), RouteError> {
        match intent {
            Intent::SelectMode(target) => {
                self.select_mode(target).await?;
                self.current_mode = target;
                self.emit(RouteEvent::ModeChanged { mode: target });
                Ok(())
            }
            Intent::EnableSpeaker(enable) => self.enable_speaker(enable).await,
            Intent::MuteMic(mute) => self.mute_mic(mute).await,
        }
    }

    // ---- Intent chains -------------------------------------------------

    async fn select_mode(&mut self, target: Mode) -> Result<(), RouteError> {
        if target != Mode::Call {
            // When ending a call the mic must not stay muted. This step is
            // auxiliary: its failures never gate the mode change.
            self.implicit_unmute().await;
        }

        let card = self.topo.card.as_ref().ok_or(RouteError::NoCard)?;
        let card_index = card.index;

        if card.has_voice_profile {
            debug!("card has voice profile, using it");
            let info = self.server.card_by_index(card_index).await?;
            if info.index != card_index {
                return Err(RouteError::NoCard);
            }
            self.profile_branch(info.index, info.active_profile.as_deref(), target)
                .await
        } else {
            debug!("card has no voice profile, switching output port");
            let sink_index = self.topo.sink.as_ref().ok_or(RouteError::NoSink)?.index;
            let info = self.server.sink_by_index(sink_index).await?;
            self.output_port_step(&info, OutputGoal::Mode(target)).await
        }
    }

    async fn enable_speaker(&mut self, enable: bool) -> Result<(), RouteError> {
        let sink_index = self.topo.sink.as_ref().ok_or(RouteError::NoSink)?.index;
        let info = self.server.sink_by_index(sink_index).await?;
        self.output_port_step(&info, OutputGoal::Speaker(enable))
            .await
    }

    async fn mute_mic(&mut self, mute: bool) -> Result<(), RouteError> {
        let source_index = self.topo.source.as_ref().ok_or(RouteError::NoSource)?.index;
        let info = self.server.source_by_index(source_index).await?;
        if info.index != source_index || info.card != self.topo.card.as_ref().map(|c| c.index) {
            return Err(RouteError::NoSource);
        }

        if info.mute != mute {
            debug!(mute, "switching mic mute");
            self.server.set_source_mute(source_index, mute).await
        } else {
            debug!("mic mute already matches, nothing to be done");
            Ok(())
        }
    }

    /// Auxiliary unmute preceding a return to default mode.
    async fn implicit_unmute(&mut self) {
        let Some(source) = self.topo.source.as_ref() else {
            debug!("no source tracked, skipping implicit unmute");
            return;
        };
        let source_index = source.index;

        match self.server.source_by_index(source_index).await {
            Ok(info) if info.mute => {
                debug!("mic is muted, unmuting");
                if let Err(err) = self.server.set_source_mute(source_index, false).await {
                    warn!(%err, "implicit unmute failed");
                }
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "implicit unmute fetch failed"),
        }
    }

    /// Switches the card profile when the active one does not match the
    /// target mode. On droid the profile switch must be followed by the
    /// parking dance before the real ports are applied.
    async fn profile_branch(
        &mut self,
        card_index: u32,
        active_profile: Option<&str>,
        target: Mode,
    ) -> Result<(), RouteError> {
        let droid = self.sink_is_droid();
        let (default_profile, voicecall_profile) = if droid {
            (ucm::DROID_PROFILE_HIFI, ucm::DROID_PROFILE_VOICECALL)
        } else {
            (ucm::UCM_VERB_HIFI, ucm::UCM_VERB_VOICECALL)
        };

        let profile = match (active_profile, target) {
            (Some(active), Mode::Default) if active == voicecall_profile => default_profile,
            (Some(active), Mode::Call) if active == default_profile => voicecall_profile,
            _ => {
                debug!("profile already matches, nothing to be done");
                return Ok(());
            }
        };

        debug!(profile, "switching card profile");
        self.server.set_card_profile(card_index, profile).await?;
        self.emit(RouteEvent::ProfileSwitched {
            profile: profile.to_string(),
        });

        if droid {
            self.droid_parking_dance(target).await?;
        }
        Ok(())
    }

    /// The Android HAL commits a mode switch on the next routing change, so
    /// sink and source are first parked on their sentinel ports and only
    /// then moved to the real targets.
    async fn droid_parking_dance(&mut self, target: Mode) -> Result<(), RouteError> {
        let sink_index = self.topo.sink.as_ref().ok_or(RouteError::NoSink)?.index;
        let source_index = self.topo.source.as_ref().ok_or(RouteError::NoSource)?.index;

        debug!("droid: parking output to trigger mode change");
        self.server
            .set_sink_port(sink_index, ucm::DROID_OUTPUT_PORT_PARKING)
            .await?;

        debug!("droid: parking input to trigger mode change");
        self.server
            .set_source_port(source_index, ucm::DROID_INPUT_PORT_PARKING)
            .await?;

        debug!("droid: parking succeeded, setting real output port");
        let info = self.server.sink_by_index(sink_index).await?;
        self.output_port_step(&info, OutputGoal::Mode(target)).await
    }

    /// Computes and applies the output port for `goal` on the fetched sink.
    /// On droid the chain continues with the input port.
    async fn output_port_step(
        &mut self,
        info: &SinkInfo,
        goal: OutputGoal,
    ) -> Result<(), RouteError> {
        let sink = self.topo.sink.as_ref().ok_or(RouteError::NoSink)?;
        if info.index != sink.index || info.card != self.topo.card.as_ref().map(|c| c.index) {
            return Err(RouteError::NoSink);
        }
        let flavor = sink.flavor;
        let speaker = self.topo.speaker_port.as_deref();

        let target = match goal {
            OutputGoal::Mode(Mode::Call) => {
                select::pick_output_port(&info.ports, flavor, speaker)
            }
            OutputGoal::Mode(Mode::Default) => select::pick_output_port(&info.ports, flavor, None),
            OutputGoal::Speaker(true) => speaker,
            OutputGoal::Speaker(false) => select::pick_output_port(&info.ports, flavor, speaker),
        }
        .map(str::to_string);

        let Some(target) = target else {
            return Err(RouteError::NoAvailablePort {
                direction: Direction::Output.label(),
            });
        };

        debug!(active = ?info.active_port, target_port = %target, "output port decision");
        if info.active_port.as_deref() != Some(target.as_str()) {
            debug!(port = %target, "switching to target port");
            self.server.set_sink_port(info.index, &target).await?;
            self.emit(RouteEvent::PortSwitched {
                direction: Direction::Output,
                port: target,
            });
        } else {
            debug!("active port already matches, nothing to be done");
        }

        if flavor.is_droid() {
            self.input_port_step().await?;
        }
        Ok(())
    }

    /// Fetches the source and applies the input selection, no exclusion.
    async fn input_port_step(&mut self) -> Result<(), RouteError> {
        let source = self.topo.source.as_ref().ok_or(RouteError::NoSource)?;
        let source_index = source.index;
        let flavor = source.flavor;

        let info = self.server.source_by_index(source_index).await?;
        if info.index != source_index || info.card != self.topo.card.as_ref().map(|c| c.index) {
            return Err(RouteError::NoSource);
        }

        let target = select::pick_input_port(&info.ports, flavor, None)
            .map(str::to_string)
            .ok_or(RouteError::NoAvailablePort {
                direction: Direction::Input.label(),
            })?;

        debug!(active = ?info.active_port, target_port = %target, "input port decision");
        if info.active_port.as_deref() != Some(target.as_str()) {
            debug!(port = %target, "switching to target source port");
            self.server.set_source_port(source_index, &target).await?;
            self.emit(RouteEvent::PortSwitched {
                direction: Direction::Input,
                port: target,
            });
        } else {
            debug!("active source port already matches, nothing to be done");
        }
        Ok(())
    }

    fn sink_is_droid(&self) -> bool {
        self.topo.sink.as_ref().is_some_and(|s| s.flavor.is_droid())
    }

    // ---- Event reactor -------------------------------------------------

    async fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected => {
                debug!("server ready, running discovery");
                match discovery::run(self.server.as_ref(), &mut self.topo, self.events.as_ref())
                    .await
                {
                    Ok(()) => self.emit(RouteEvent::Connected),
                    Err(err) => warn!(%err, "discovery failed"),
                }
            }
            ServerEvent::Disconnected => {
                warn!("connection to audio server lost");
                self.topo.reset();
                self.emit(RouteEvent::Disconnected);
            }
            ServerEvent::Object {
                facility,
                kind,
                index,
            } => match facility {
                Facility::Sink => self.on_sink_event(kind, index).await,
                Facility::Source => self.on_source_event(kind, index).await,
                Facility::Card => self.on_card_event(kind, index).await,
            },
        }
    }

    async fn on_sink_event(&mut self, kind: EventKind, index: u32) {
        match kind {
            EventKind::Remove if self.topo.sink.as_ref().is_some_and(|s| s.index == index) => {
                debug!(index, "sink removed");
                self.topo.drop_sink();
                self.emit(RouteEvent::EndpointLost {
                    direction: Direction::Output,
                    index,
                });
            }
            EventKind::New => {
                debug!(index, "new sink");
                match self.server.sink_by_index(index).await {
                    Ok(info) => {
                        discovery::adopt_sink(
                            self.server.as_ref(),
                            &mut self.topo,
                            &info,
                            self.events.as_ref(),
                        )
                        .await;
                    }
                    Err(err) => warn!(index, %err, "fetching new sink failed"),
                }
            }
            // Availability changes arrive as card-change events.
            _ => {}
        }
    }

    async fn on_source_event(&mut self, kind: EventKind, index: u32) {
        match kind {
            EventKind::Remove if self.topo.source.as_ref().is_some_and(|s| s.index == index) => {
                debug!(index, "source removed");
                self.topo.drop_source();
                self.emit(RouteEvent::EndpointLost {
                    direction: Direction::Input,
                    index,
                });
            }
            EventKind::New => {
                debug!(index, "new source");
                match self.server.source_by_index(index).await {
                    Ok(info) => {
                        discovery::adopt_source(
                            self.server.as_ref(),
                            &mut self.topo,
                            &info,
                            self.events.as_ref(),
                        )
                        .await;
                    }
                    Err(err) => warn!(index, %err, "fetching new source failed"),
                }
            }
            _ => {}
        }
    }

    /// A card change is how the server reports port availability updates.
    /// Only native endpoints are reconciled; the droid HAL demands that
    /// routing changes come exclusively from explicit mode transitions.
    async fn on_card_event(&mut self, kind: EventKind, index: u32) {
        if kind != EventKind::Change
            || self.topo.card.as_ref().map(|c| c.index) != Some(index)
        {
            return;
        }
        debug!(index, "card changed");

        if let Some(sink) = self.topo.sink.as_ref() {
            if !sink.flavor.is_droid() {
                let sink_index = sink.index;
                match self.server.sink_by_index(sink_index).await {
                    Ok(info) if info.index == sink_index => self.reconcile_sink(&info).await,
                    Ok(_) => {}
                    Err(err) => warn!(%err, "fetching changed sink failed"),
                }
            }
        }

        if let Some(source) = self.topo.source.as_ref() {
            if !source.flavor.is_droid() {
                let source_index = source.index;
                match self.server.source_by_index(source_index).await {
                    Ok(info) if info.index == source_index => self.reconcile_source(&info).await,
                    Ok(_) => {}
                    Err(err) => warn!(%err, "fetching changed source failed"),
                }
            }
        }
    }

    async fn reconcile_sink(&mut self, info: &SinkInfo) {
        if !self.topo.update_known_ports(Direction::Output, &info.ports) {
            return;
        }
        let Some(flavor) = self.topo.sink.as_ref().map(|s| s.flavor) else {
            return;
        };
        if let Some(target) = select::pick_output_port(&info.ports, flavor, None).map(str::to_string)
        {
            if let Err(err) = self.server.set_sink_port(info.index, &target).await {
                warn!(port = %target, %err, "sink port reselection failed");
            } else {
                self.emit(RouteEvent::PortSwitched {
                    direction: Direction::Output,
                    port: target,
                });
            }
        }
    }

    async fn reconcile_source(&mut self, info: &crate::server::SourceInfo) {
        if !self.topo.update_known_ports(Direction::Input, &info.ports) {
            return;
        }
        let Some(flavor) = self.topo.source.as_ref().map(|s| s.flavor) else {
            return;
        };
        if let Some(target) = select::pick_input_port(&info.ports, flavor, None).map(str::to_string)
        {
            if let Err(err) = self.server.set_source_port(info.index, &target).await {
                warn!(port = %target, %err, "source port reselection failed");
            } else {
                self.emit(RouteEvent::PortSwitched {
                    direction: Direction::Input,
                    port: target,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::MockServer;

    fn engine_over(server: Arc<MockServer>) -> Engine {
        let server_events = server.subscribe();
        let (_tx, commands) = mpsc::channel(1);
        Engine::new(server, None, commands, server_events)
    }

    #[tokio::test]
    async fn test_intents_without_card_fail() {
        let server = Arc::new(MockServer::new());
        let mut engine = engine_over(server);

        assert!(matches!(
            engine.select_mode(Mode::Call).await,
            Err(RouteError::NoCard)
        ));
        assert!(matches!(
            engine.enable_speaker(true).await,
            Err(RouteError::NoSink)
        ));
        assert!(matches!(
            engine.mute_mic(true).await,
            Err(RouteError::NoSource)
        ));
    }

    #[tokio::test]
    async fn test_mode_not_updated_on_failure() {
        let server = Arc::new(MockServer::new());
        let mut engine = engine_over(server);

        assert!(engine.execute(Intent::SelectMode(Mode::Call)).await.is_err());
        assert_eq!(engine.current_mode, Mode::Default);
    }
}
