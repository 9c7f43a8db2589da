//! Pure port selection.
//!
//! Given the live port list of a sink or source, a back-end flavor and an
//! optional exclusion, pick the port to route to. No I/O, no state: the
//! caller decides whether to actually issue the switch.

use tracing::{debug, warn};

use crate::server::{PortAvailable, PortInfo};
use crate::topology::BackendFlavor;
use crate::ucm;

/// Selects the best output port.
///
/// Ports whose availability is `No` and the excluded name are skipped.
/// Droid prefers `output-wired_headset` above everything (short-circuit),
/// then `output-speaker`, then `output-earpiece`. Native picks the highest
/// priority. Ties go to the first port encountered.
///
/// Returns `None`, with a warning, when no candidate remains.
pub fn pick_output_port<'a>(
    ports: &'a [PortInfo],
    flavor: BackendFlavor,
    exclude: Option<&str>,
) -> Option<&'a str> {
    debug!(?exclude, "looking for available output");

    let mut best: Option<&PortInfo> = None;
    for port in ports {
        if is_skipped(port, exclude) {
            continue;
        }

        if flavor.is_droid() {
            if port.name == ucm::DROID_OUTPUT_PORT_WIRED_HEADSET {
                best = Some(port);
                break;
            } else if (port.name == ucm::DROID_OUTPUT_PORT_SPEAKER
                || port.name == ucm::DROID_OUTPUT_PORT_EARPIECE)
                && !matches!(best, Some(b) if droid_output_rank(&b.name) >= droid_output_rank(&port.name))
            {
                best = Some(port);
            }
        } else if !matches!(best, Some(b) if b.priority >= port.priority) {
            best = Some(port);
        }
    }

    match best {
        Some(port) => {
            debug!(port = %port.name, "found available output");
            Some(port.name.as_str())
        }
        None => {
            warn!("no available output found");
            None
        }
    }
}

/// Selects the best input port.
///
/// Same skipping rules as [`pick_output_port`]. Droid prefers
/// `input-wired_headset` (short-circuit), else `input-builtin_mic`.
/// Native picks the highest priority.
pub fn pick_input_port<'a>(
    ports: &'a [PortInfo],
    flavor: BackendFlavor,
    exclude: Option<&str>,
) -> Option<&'a str> {
    debug!(?exclude, "looking for available input");

    let mut best: Option<&PortInfo> = None;
    for port in ports {
        if is_skipped(port, exclude) {
            continue;
        }

        if flavor.is_droid() {
            if port.name == ucm::DROID_INPUT_PORT_WIRED_HEADSET {
                best = Some(port);
                break;
            } else if port.name == ucm::DROID_INPUT_PORT_BUILTIN_MIC {
                best = Some(port);
            }
        } else if !matches!(best, Some(b) if b.priority >= port.priority) {
            best = Some(port);
        }
    }

    match best {
        Some(port) => {
            debug!(port = %port.name, "found available input");
            Some(port.name.as_str())
        }
        None => {
            warn!("no available input found");
            None
        }
    }
}

fn is_skipped(port: &PortInfo, exclude: Option<&str>) -> bool {
    port.available == PortAvailable::No || exclude == Some(port.name.as_str())
}

/// Preference order among the droid fallback output ports. Only consulted
/// after the wired-headset short-circuit.
fn droid_output_rank(name: &str) -> u8 {
    match name {
        ucm::DROID_OUTPUT_PORT_SPEAKER => 2,
        ucm::DROID_OUTPUT_PORT_EARPIECE => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, priority: u32, available: PortAvailable) -> PortInfo {
        PortInfo::new(name, priority, available)
    }

    fn native_ports() -> Vec<PortInfo> {
        vec![
            port("analog-output-earpiece", 50, PortAvailable::Yes),
            port("analog-output-Speaker", 60, PortAvailable::Yes),
            port("analog-output-headphones", 80, PortAvailable::Yes),
        ]
    }

    #[test]
    fn test_native_output_picks_highest_priority() {
        let ports = native_ports();
        assert_eq!(
            pick_output_port(&ports, BackendFlavor::Native, None),
            Some("analog-output-headphones")
        );
    }

    #[test]
    fn test_native_output_honors_exclusion() {
        let ports = native_ports();
        assert_eq!(
            pick_output_port(&ports, BackendFlavor::Native, Some("analog-output-headphones")),
            Some("analog-output-Speaker")
        );
    }

    #[test]
    fn test_native_output_skips_unavailable() {
        let ports = vec![
            port("earpiece", 50, PortAvailable::Yes),
            port("headphones", 80, PortAvailable::No),
        ];
        assert_eq!(
            pick_output_port(&ports, BackendFlavor::Native, None),
            Some("earpiece")
        );
    }

    #[test]
    fn test_native_ties_go_to_first_encountered() {
        let ports = vec![
            port("a", 50, PortAvailable::Yes),
            port("b", 50, PortAvailable::Yes),
        ];
        assert_eq!(pick_output_port(&ports, BackendFlavor::Native, None), Some("a"));
        assert_eq!(pick_input_port(&ports, BackendFlavor::Native, None), Some("a"));
    }

    #[test]
    fn test_native_unknown_availability_is_candidate() {
        let ports = vec![port("hdmi", 90, PortAvailable::Unknown)];
        assert_eq!(pick_output_port(&ports, BackendFlavor::Native, None), Some("hdmi"));
    }

    #[test]
    fn test_droid_output_wired_headset_short_circuits() {
        let ports = vec![
            port("output-speaker", 100, PortAvailable::Yes),
            port("output-wired_headset", 1, PortAvailable::Yes),
            port("output-earpiece", 100, PortAvailable::Yes),
        ];
        assert_eq!(
            pick_output_port(&ports, BackendFlavor::Droid, None),
            Some("output-wired_headset")
        );
    }

    #[test]
    fn test_droid_output_prefers_speaker_over_earpiece() {
        let ports = vec![
            port("output-earpiece", 100, PortAvailable::Yes),
            port("output-speaker", 1, PortAvailable::Yes),
        ];
        assert_eq!(
            pick_output_port(&ports, BackendFlavor::Droid, None),
            Some("output-speaker")
        );
    }

    #[test]
    fn test_droid_output_ignores_foreign_names() {
        // Priorities never matter on droid; unknown port names are not
        // candidates at all.
        let ports = vec![
            port("output-hdmi", 200, PortAvailable::Yes),
            port("output-earpiece", 1, PortAvailable::Yes),
        ];
        assert_eq!(
            pick_output_port(&ports, BackendFlavor::Droid, None),
            Some("output-earpiece")
        );
    }

    #[test]
    fn test_droid_output_excluded_headset_falls_back() {
        let ports = vec![
            port("output-wired_headset", 1, PortAvailable::Yes),
            port("output-earpiece", 1, PortAvailable::Yes),
        ];
        assert_eq!(
            pick_output_port(&ports, BackendFlavor::Droid, Some("output-wired_headset")),
            Some("output-earpiece")
        );
    }

    #[test]
    fn test_droid_input_preference() {
        let ports = vec![
            port("input-builtin_mic", 100, PortAvailable::Yes),
            port("input-wired_headset", 1, PortAvailable::Yes),
        ];
        assert_eq!(
            pick_input_port(&ports, BackendFlavor::Droid, None),
            Some("input-wired_headset")
        );

        let no_headset = vec![
            port("input-wired_headset", 1, PortAvailable::No),
            port("input-builtin_mic", 1, PortAvailable::Yes),
        ];
        assert_eq!(
            pick_input_port(&no_headset, BackendFlavor::Droid, None),
            Some("input-builtin_mic")
        );
    }

    #[test]
    fn test_no_candidate_returns_none() {
        let ports = vec![port("earpiece", 50, PortAvailable::No)];
        assert_eq!(pick_output_port(&ports, BackendFlavor::Native, None), None);
        assert_eq!(pick_input_port(&ports, BackendFlavor::Native, None), None);

        let only_excluded = vec![port("speaker", 50, PortAvailable::Yes)];
        assert_eq!(
            pick_output_port(&only_excluded, BackendFlavor::Native, Some("speaker")),
            None
        );
    }

    #[test]
    fn test_selector_is_pure() {
        let ports = native_ports();
        let first = pick_output_port(&ports, BackendFlavor::Native, Some("analog-output-Speaker"));
        let second = pick_output_port(&ports, BackendFlavor::Native, Some("analog-output-Speaker"));
        assert_eq!(first, second);
    }
}
