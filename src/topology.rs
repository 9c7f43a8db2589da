//! In-memory view of the tracked card, sink and source.
//!
//! Pure data holder with no I/O. Discovery and the engine install and drop
//! objects here; the known-availability maps are what lets the reactor
//! detect availability transitions from card-change events.

use std::collections::HashMap;

use crate::event::Direction;
use crate::server::{PortAvailable, PortInfo, SinkInfo, SourceInfo};
use crate::ucm;

/// High-level audio mode mirroring the last successful mode selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Regular audio routing.
    #[default]
    Default,
    /// Voice-call routing.
    Call,
}

impl Mode {
    /// Integer value used on the wire by the downstream intent interface.
    pub fn value(self) -> u32 {
        match self {
            Self::Default => 0,
            Self::Call => 1,
        }
    }

    /// Parses the wire value; `0` is default mode, `1` is call mode.
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Default),
            1 => Some(Self::Call),
            _ => None,
        }
    }
}

/// Back-end flavor of a sink or source, derived from `device.api`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendFlavor {
    /// Regular ALSA/UCM back-end.
    #[default]
    Native,
    /// Android HAL via pulseaudio-modules-droid.
    Droid,
}

impl BackendFlavor {
    /// Derives the flavor from the reported `device.api` property.
    pub fn from_api(api: Option<&str>) -> Self {
        if api == Some(ucm::DROID_API_NAME) {
            Self::Droid
        } else {
            Self::Native
        }
    }

    /// Returns `true` for the droid flavor.
    pub fn is_droid(self) -> bool {
        self == Self::Droid
    }
}

/// The tracked internal card.
#[derive(Debug, Clone)]
pub(crate) struct TrackedCard {
    pub index: u32,
    pub name: String,
    pub has_voice_profile: bool,
}

/// A tracked sink or source.
#[derive(Debug, Clone)]
pub(crate) struct TrackedEndpoint {
    pub index: u32,
    pub name: String,
    pub flavor: BackendFlavor,
    /// Last-seen availability per port name; only `Yes`/`No` values are
    /// stored, never `Unknown`.
    pub known_ports: HashMap<String, bool>,
}

impl TrackedEndpoint {
    fn new(index: u32, name: &str, flavor: BackendFlavor, ports: &[PortInfo]) -> Self {
        Self {
            index,
            name: name.to_string(),
            flavor,
            known_ports: known_availability(ports),
        }
    }
}

fn known_availability(ports: &[PortInfo]) -> HashMap<String, bool> {
    ports
        .iter()
        .filter_map(|port| match port.available {
            PortAvailable::Yes => Some((port.name.clone(), true)),
            PortAvailable::No => Some((port.name.clone(), false)),
            PortAvailable::Unknown => None,
        })
        .collect()
}

/// In-memory topology of the routed objects.
#[derive(Debug, Default)]
pub(crate) struct Topology {
    pub card: Option<TrackedCard>,
    pub sink: Option<TrackedEndpoint>,
    pub source: Option<TrackedEndpoint>,
    /// Cached name of the loudspeaker port on the tracked sink.
    pub speaker_port: Option<String>,
}

impl Topology {
    /// Forgets everything; used on (re)connect before discovery.
    pub fn reset(&mut self) {
        self.card = None;
        self.sink = None;
        self.source = None;
        // speaker_port survives like in the original daemon; it is
        // re-derived as soon as the sink is rediscovered.
    }

    /// Installs or replaces the tracked card.
    pub fn install_card(&mut self, index: u32, name: &str, has_voice_profile: bool) {
        self.card = Some(TrackedCard {
            index,
            name: name.to_string(),
            has_voice_profile,
        });
    }

    /// Installs or replaces the tracked sink and refreshes the speaker port.
    pub fn install_sink(&mut self, info: &SinkInfo, flavor: BackendFlavor) {
        self.sink = Some(TrackedEndpoint::new(
            info.index,
            &info.name,
            flavor,
            &info.ports,
        ));
        if let Some(speaker) = detect_speaker_port(&info.ports, flavor) {
            if self.speaker_port.as_deref() != Some(speaker) {
                self.speaker_port = Some(speaker.to_string());
            }
        }
    }

    /// Installs or replaces the tracked source.
    pub fn install_source(&mut self, info: &SourceInfo, flavor: BackendFlavor) {
        self.source = Some(TrackedEndpoint::new(
            info.index,
            &info.name,
            flavor,
            &info.ports,
        ));
    }

    /// Drops the tracked sink and its ports map.
    pub fn drop_sink(&mut self) {
        self.sink = None;
    }

    /// Drops the tracked source and its ports map.
    pub fn drop_source(&mut self) {
        self.source = None;
    }

    /// Merges fresh port availability into the known map for `direction`.
    ///
    /// Returns `true` if any known value actually changed, which is the
    /// trigger for re-running port selection.
    pub fn update_known_ports(&mut self, direction: Direction, ports: &[PortInfo]) -> bool {
        let endpoint = match direction {
            Direction::Output => self.sink.as_mut(),
            Direction::Input => self.source.as_mut(),
        };
        let Some(endpoint) = endpoint else {
            return false;
        };

        let mut changed = false;
        for port in ports {
            let available = match port.available {
                PortAvailable::Yes => true,
                PortAvailable::No => false,
                PortAvailable::Unknown => continue,
            };
            if endpoint.known_ports.get(&port.name) != Some(&available) {
                endpoint.known_ports.insert(port.name.clone(), available);
                changed = true;
            }
        }
        changed
    }
}

/// Finds the loudspeaker port among `ports`.
///
/// Droid sinks name it literally; native sinks carry the UCM speaker device
/// token somewhere in the port name.
pub(crate) fn detect_speaker_port(ports: &[PortInfo], flavor: BackendFlavor) -> Option<&str> {
    ports
        .iter()
        .find(|port| match flavor {
            BackendFlavor::Droid => port.name == ucm::DROID_OUTPUT_PORT_SPEAKER,
            BackendFlavor::Native => port.name.contains(ucm::UCM_DEV_SPEAKER),
        })
        .map(|port| port.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::DeviceProps;

    fn sink_info(ports: Vec<PortInfo>) -> SinkInfo {
        SinkInfo {
            index: 3,
            name: "alsa_output.internal".to_string(),
            card: Some(0),
            ports,
            active_port: None,
            props: DeviceProps::default(),
        }
    }

    #[test]
    fn test_mode_wire_values() {
        assert_eq!(Mode::Default.value(), 0);
        assert_eq!(Mode::Call.value(), 1);
        assert_eq!(Mode::from_value(0), Some(Mode::Default));
        assert_eq!(Mode::from_value(1), Some(Mode::Call));
        assert_eq!(Mode::from_value(2), None);
    }

    #[test]
    fn test_flavor_from_api() {
        assert_eq!(BackendFlavor::from_api(Some("droid-hal")), BackendFlavor::Droid);
        assert_eq!(BackendFlavor::from_api(Some("alsa")), BackendFlavor::Native);
        assert_eq!(BackendFlavor::from_api(None), BackendFlavor::Native);
    }

    #[test]
    fn test_known_ports_skip_unknown() {
        let info = sink_info(vec![
            PortInfo::new("earpiece", 50, PortAvailable::Yes),
            PortInfo::new("headphones", 80, PortAvailable::No),
            PortInfo::new("hdmi", 10, PortAvailable::Unknown),
        ]);

        let mut topo = Topology::default();
        topo.install_sink(&info, BackendFlavor::Native);

        let known = &topo.sink.as_ref().unwrap().known_ports;
        assert_eq!(known.len(), 2);
        assert_eq!(known.get("earpiece"), Some(&true));
        assert_eq!(known.get("headphones"), Some(&false));
        assert!(!known.contains_key("hdmi"));
    }

    #[test]
    fn test_update_known_ports_detects_transition() {
        let info = sink_info(vec![
            PortInfo::new("earpiece", 50, PortAvailable::Yes),
            PortInfo::new("headphones", 80, PortAvailable::No),
        ]);

        let mut topo = Topology::default();
        topo.install_sink(&info, BackendFlavor::Native);

        // Same values: no change.
        assert!(!topo.update_known_ports(
            Direction::Output,
            &[PortInfo::new("headphones", 80, PortAvailable::No)]
        ));

        // Headphones plugged in: change detected and persisted.
        assert!(topo.update_known_ports(
            Direction::Output,
            &[PortInfo::new("headphones", 80, PortAvailable::Yes)]
        ));
        let known = &topo.sink.as_ref().unwrap().known_ports;
        assert_eq!(known.get("headphones"), Some(&true));

        // Unknown availability never enters the map.
        assert!(!topo.update_known_ports(
            Direction::Output,
            &[PortInfo::new("hdmi", 10, PortAvailable::Unknown)]
        ));
        assert!(!topo.sink.as_ref().unwrap().known_ports.contains_key("hdmi"));
    }

    #[test]
    fn test_speaker_port_native_contains_token() {
        let ports = vec![
            PortInfo::new("analog-output-earpiece", 50, PortAvailable::Yes),
            PortInfo::new("analog-output-Speaker1", 60, PortAvailable::Yes),
        ];
        assert_eq!(
            detect_speaker_port(&ports, BackendFlavor::Native),
            Some("analog-output-Speaker1")
        );
    }

    #[test]
    fn test_speaker_port_droid_exact_name() {
        let ports = vec![
            PortInfo::new("output-earpiece", 50, PortAvailable::Yes),
            PortInfo::new("output-speaker", 60, PortAvailable::Yes),
        ];
        assert_eq!(
            detect_speaker_port(&ports, BackendFlavor::Droid),
            Some("output-speaker")
        );
        // The native token match must not fire for droid names.
        let no_speaker = vec![PortInfo::new("output-Speakerphone", 10, PortAvailable::Yes)];
        assert_eq!(detect_speaker_port(&no_speaker, BackendFlavor::Droid), None);
    }

    #[test]
    fn test_drop_sink_forgets_ports() {
        let info = sink_info(vec![PortInfo::new("earpiece", 50, PortAvailable::Yes)]);
        let mut topo = Topology::default();
        topo.install_sink(&info, BackendFlavor::Native);
        topo.drop_sink();
        assert!(topo.sink.is_none());
        // A later availability update has nothing to apply to.
        assert!(!topo.update_known_ports(
            Direction::Output,
            &[PortInfo::new("earpiece", 50, PortAvailable::No)]
        ));
    }
}
