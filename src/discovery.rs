//! Discovery: (re)connect enumeration and object adoption.
//!
//! On every `Connected` event the engine resets its topology and re-runs
//! [`run`], which enumerates cards, modules, sinks and sources in that
//! order and adopts the first objects passing the filters. The adoption
//! helpers are shared with the event reactor, which uses them for `New`
//! object notifications.

use tracing::{debug, warn};

use crate::event::{Direction, EventCallback, RouteEvent};
use crate::select;
use crate::server::{CardInfo, DeviceProps, ServerApi, SinkInfo, SourceInfo};
use crate::topology::{BackendFlavor, Topology};
use crate::ucm;
use crate::RouteError;

/// Card filter: internal platform card that is not a modem.
///
/// A missing property never disqualifies the card; only a present property
/// failing its test does.
pub(crate) fn card_matches(info: &CardInfo) -> bool {
    let props = &info.props;
    if props
        .bus_path
        .as_deref()
        .is_some_and(|p| !p.starts_with(ucm::CARD_BUS_PATH_PREFIX))
    {
        return false;
    }
    if props
        .form_factor
        .as_deref()
        .is_some_and(|f| f != ucm::CARD_FORM_FACTOR)
    {
        return false;
    }
    if props
        .class
        .as_deref()
        .is_some_and(|c| c == ucm::CARD_MODEM_CLASS)
    {
        return false;
    }
    true
}

/// Voice profile scan: the UCM voice-call verb or the droid literal.
pub(crate) fn has_voice_profile(profiles: &[String]) -> bool {
    profiles.iter().any(|name| {
        name.contains(ucm::UCM_VERB_VOICECALL) || name.contains(ucm::DROID_PROFILE_VOICECALL)
    })
}

/// Endpoint filter: a `sound`-class sink/source owned by the tracked card.
pub(crate) fn endpoint_matches(props: &DeviceProps, card: Option<u32>, tracked_card: u32) -> bool {
    if props.class.as_deref().is_some_and(|c| c != ucm::SINK_CLASS) {
        return false;
    }
    card == Some(tracked_card)
}

fn emit(events: Option<&EventCallback>, event: RouteEvent) {
    if let Some(callback) = events {
        callback(event);
    }
}

/// Full enumeration after (re)connect.
pub(crate) async fn run(
    server: &dyn ServerApi,
    topo: &mut Topology,
    events: Option<&EventCallback>,
) -> Result<(), RouteError> {
    topo.reset();

    for info in server.list_cards().await? {
        if topo.card.is_some() || !card_matches(&info) {
            continue;
        }
        let voice = has_voice_profile(&info.profiles);
        debug!(index = info.index, name = %info.name, has_voice_profile = voice, "CARD");
        topo.install_card(info.index, &info.name, voice);
        emit(
            events,
            RouteEvent::CardDiscovered {
                index: info.index,
                name: info.name.clone(),
                has_voice_profile: voice,
            },
        );
    }

    // Remember the auto-switch modules now; whether they get unloaded
    // depends on the back-end flavor, which is only known once the sink
    // and source have been adopted.
    let mut switch_modules = Vec::new();
    for info in server.list_modules().await? {
        debug!(index = info.index, name = %info.name, "MODULE");
        if info.name == ucm::MODULE_SWITCH_ON_PORT_AVAILABLE {
            switch_modules.push(info.index);
        }
    }

    for info in server.list_sinks().await? {
        adopt_sink(server, topo, &info, events).await;
    }
    for info in server.list_sources().await? {
        adopt_source(server, topo, &info, events).await;
    }

    // The engine must be the sole authority over port switching, so the
    // auto-switch module is unloaded on native back-ends. The droid HAL
    // routes only on explicit mode transitions and never competes.
    let droid = topo.sink.as_ref().is_some_and(|s| s.flavor.is_droid())
        || topo.source.as_ref().is_some_and(|s| s.flavor.is_droid());
    if !droid {
        for index in switch_modules {
            debug!(index, "unloading {}", ucm::MODULE_SWITCH_ON_PORT_AVAILABLE);
            if let Err(err) = server.unload_module(index).await {
                warn!(index, %err, "failed to unload auto-switch module");
            }
        }
    }

    Ok(())
}

/// Runs the sink filter and, on a match, installs the sink and applies an
/// initial port selection. Non-matching sinks are ignored.
pub(crate) async fn adopt_sink(
    server: &dyn ServerApi,
    topo: &mut Topology,
    info: &SinkInfo,
    events: Option<&EventCallback>,
) {
    let Some(card) = topo.card.as_ref() else {
        return;
    };
    if topo.sink.is_some() || !endpoint_matches(&info.props, info.card, card.index) {
        return;
    }

    let flavor = BackendFlavor::from_api(info.props.api.as_deref());
    debug!(index = info.index, name = %info.name, ?flavor, "SINK");
    topo.install_sink(info, flavor);
    debug!(speaker_port = ?topo.speaker_port, "SINK speaker port");
    emit(
        events,
        RouteEvent::EndpointDiscovered {
            direction: Direction::Output,
            index: info.index,
            name: info.name.clone(),
        },
    );

    if let Some(target) = select::pick_output_port(&info.ports, flavor, None) {
        debug!(port = target, "using initial sink port");
        if let Err(err) = server.set_sink_port(info.index, target).await {
            warn!(port = target, %err, "initial sink port switch failed");
        } else {
            emit(
                events,
                RouteEvent::PortSwitched {
                    direction: Direction::Output,
                    port: target.to_string(),
                },
            );
        }
    }
}

/// Source counterpart of [`adopt_sink`].
pub(crate) async fn adopt_source(
    server: &dyn ServerApi,
    topo: &mut Topology,
    info: &SourceInfo,
    events: Option<&EventCallback>,
) {
    let Some(card) = topo.card.as_ref() else {
        return;
    };
    if topo.source.is_some() || !endpoint_matches(&info.props, info.card, card.index) {
        return;
    }

    let flavor = BackendFlavor::from_api(info.props.api.as_deref());
    debug!(index = info.index, name = %info.name, ?flavor, "SOURCE");
    topo.install_source(info, flavor);
    emit(
        events,
        RouteEvent::EndpointDiscovered {
            direction: Direction::Input,
            index: info.index,
            name: info.name.clone(),
        },
    );

    if let Some(target) = select::pick_input_port(&info.ports, flavor, None) {
        debug!(port = target, "using initial source port");
        if let Err(err) = server.set_source_port(info.index, target).await {
            warn!(port = target, %err, "initial source port switch failed");
        } else {
            emit(
                events,
                RouteEvent::PortSwitched {
                    direction: Direction::Input,
                    port: target.to_string(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(bus_path: Option<&str>, form_factor: Option<&str>, class: Option<&str>) -> CardInfo {
        CardInfo {
            index: 0,
            name: "card".to_string(),
            profiles: vec![],
            active_profile: None,
            props: DeviceProps {
                bus_path: bus_path.map(str::to_string),
                form_factor: form_factor.map(str::to_string),
                class: class.map(str::to_string),
                api: None,
            },
        }
    }

    #[test]
    fn test_card_filter_accepts_internal_platform() {
        assert!(card_matches(&card(
            Some("platform-sound"),
            Some("internal"),
            Some("sound")
        )));
    }

    #[test]
    fn test_card_filter_rejects_usb_external_modem() {
        assert!(!card_matches(&card(
            Some("pci-0000:00:1f.3"),
            Some("internal"),
            None
        )));
        assert!(!card_matches(&card(
            Some("platform-sound"),
            Some("headset"),
            None
        )));
        assert!(!card_matches(&card(
            Some("platform-modem"),
            Some("internal"),
            Some("modem")
        )));
    }

    #[test]
    fn test_card_filter_tolerates_missing_properties() {
        // Properties the server did not report never disqualify.
        assert!(card_matches(&card(None, None, None)));
        assert!(card_matches(&card(Some("platform-sound"), None, None)));
    }

    #[test]
    fn test_voice_profile_scan() {
        let ucm = vec!["HiFi".to_string(), "Voice Call".to_string()];
        assert!(has_voice_profile(&ucm));

        let droid = vec!["default".to_string(), "voicecall".to_string()];
        assert!(has_voice_profile(&droid));

        let none = vec!["HiFi".to_string(), "Pro Audio".to_string()];
        assert!(!has_voice_profile(&none));
    }

    #[test]
    fn test_endpoint_filter() {
        let sound = DeviceProps {
            class: Some("sound".to_string()),
            ..Default::default()
        };
        assert!(endpoint_matches(&sound, Some(2), 2));
        assert!(!endpoint_matches(&sound, Some(3), 2));
        assert!(!endpoint_matches(&sound, None, 2));

        let filter = DeviceProps {
            class: Some("filter".to_string()),
            ..Default::default()
        };
        assert!(!endpoint_matches(&filter, Some(2), 2));

        // Missing class is tolerated, card ownership is not.
        assert!(endpoint_matches(&DeviceProps::default(), Some(2), 2));
    }
}
