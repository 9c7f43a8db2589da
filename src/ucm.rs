//! String tokens shared with ALSA UCM and the droid PulseAudio modules.
//!
//! UCM verb and device names are matched with `contains` rather than
//! equality: real cards report suffixed variants such as `Voice Call BT`
//! or `Speaker1`.

/// ALSA UCM verb for the regular high-fidelity use case.
pub const UCM_VERB_HIFI: &str = "HiFi";

/// ALSA UCM verb for the voice-call use case.
pub const UCM_VERB_VOICECALL: &str = "Voice Call";

/// ALSA UCM device token identifying loudspeaker ports.
pub const UCM_DEV_SPEAKER: &str = "Speaker";

/// `device.api` property value reported by pulseaudio-modules-droid.
pub const DROID_API_NAME: &str = "droid-hal";

/// Droid card profile equivalent to the HiFi verb.
pub const DROID_PROFILE_HIFI: &str = "default";

/// Droid card profile equivalent to the voice-call verb.
pub const DROID_PROFILE_VOICECALL: &str = "voicecall";

/// Droid sink parking port, used to flush the HAL before the real target.
pub const DROID_OUTPUT_PORT_PARKING: &str = "output-parking";

/// Droid loudspeaker sink port.
pub const DROID_OUTPUT_PORT_SPEAKER: &str = "output-speaker";

/// Droid earpiece sink port.
pub const DROID_OUTPUT_PORT_EARPIECE: &str = "output-earpiece";

/// Droid wired-headset sink port.
pub const DROID_OUTPUT_PORT_WIRED_HEADSET: &str = "output-wired_headset";

/// Droid source parking port.
pub const DROID_INPUT_PORT_PARKING: &str = "input-parking";

/// Droid built-in microphone source port.
pub const DROID_INPUT_PORT_BUILTIN_MIC: &str = "input-builtin_mic";

/// Droid wired-headset microphone source port.
pub const DROID_INPUT_PORT_WIRED_HEADSET: &str = "input-wired_headset";

/// `device.bus_path` prefix of SoC-internal cards.
pub const CARD_BUS_PATH_PREFIX: &str = "platform-";

/// `device.form_factor` of the internal card.
pub const CARD_FORM_FACTOR: &str = "internal";

/// `device.class` marking modem cards, which are never routed.
pub const CARD_MODEM_CLASS: &str = "modem";

/// `device.class` of regular sinks and sources.
pub const SINK_CLASS: &str = "sound";

/// PulseAudio module that auto-switches ports and must not compete with us.
pub const MODULE_SWITCH_ON_PORT_AVAILABLE: &str = "module-switch-on-port-available";
