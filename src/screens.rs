use thiserror::Error;

use crate::host::PluginInstance;

/// Entries per controller screen (one per physical knob row).
pub const SCREEN_SIZE: usize = 4;

/// Host parameters with `value > SWITCH_THRESHOLD` render as "on".
const SWITCH_THRESHOLD: f32 = 63.0;

/// How a bound parameter is displayed on the control surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlValue {
    /// On/off switch, rendered from a `:`-prefixed host parameter.
    Switch { on: bool },
    /// Continuous value rescaled to the 0-127 MIDI display range.
    Midi(u8),
}

/// One MIDI-CC-mapped parameter binding on a controller screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerEntry {
    pub label: String,
    pub midi_cc: u32,
    pub value: ControlValue,
}

/// A UI-facing group of up to [`SCREEN_SIZE`] parameter bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerScreen {
    /// `"{plugin name}#{n}"`, n counting screens within one plugin.
    pub title: String,
    pub entries: Vec<ControllerEntry>,
}

#[derive(Debug, Error)]
#[error("plugin '{plugin}': {reason}")]
struct ScreenError {
    plugin: String,
    reason: String,
}

/// Rebuild the full controller-screen list from the plugin registry.
///
/// Derivation only: the plugin model is never touched, and calling this
/// again on the same registry yields the same list. A plugin whose screen
/// set cannot be built is logged and dropped; the rest survive. An empty
/// result is replaced by the predefined default list.
pub fn regenerate(plugins: &[PluginInstance]) -> Vec<ControllerScreen> {
    let mut screens = Vec::new();
    for plugin in plugins {
        match plugin_screens(plugin) {
            Ok(set) => screens.extend(set),
            Err(e) => log::warn!("skipping controller screens: {e}"),
        }
    }
    if screens.is_empty() {
        log::info!("no controllable parameters, loading controller defaults");
        return default_screens();
    }
    screens
}

/// Group one plugin's CC-assigned parameters into screens of up to
/// [`SCREEN_SIZE`], preserving parameter order. The final partial screen is
/// kept if it has at least one entry.
fn plugin_screens(plugin: &PluginInstance) -> Result<Vec<ControllerScreen>, ScreenError> {
    let mut screens = Vec::new();
    let mut entries: Vec<ControllerEntry> = Vec::new();
    let mut screen_num = 1;

    for param in &plugin.parameters {
        let Some(midi_cc) = param.midi_cc else {
            continue;
        };
        if !(param.value.is_finite() && param.min.is_finite() && param.max.is_finite()) {
            return Err(ScreenError {
                plugin: plugin.name.clone(),
                reason: format!("non-finite value for parameter '{}'", param.name),
            });
        }

        let entry = if let Some(label) = param.name.strip_prefix(':') {
            ControllerEntry {
                label: label.to_string(),
                midi_cc,
                value: ControlValue::Switch {
                    on: param.value > SWITCH_THRESHOLD,
                },
            }
        } else {
            ControllerEntry {
                label: param.name.clone(),
                midi_cc,
                value: ControlValue::Midi(rescale(param.value, param.min, param.max)),
            }
        };
        entries.push(entry);

        if entries.len() >= SCREEN_SIZE {
            screens.push(ControllerScreen {
                title: format!("{}#{}", plugin.name, screen_num),
                entries: std::mem::take(&mut entries),
            });
            screen_num += 1;
        }
    }

    if !entries.is_empty() {
        screens.push(ControllerScreen {
            title: format!("{}#{}", plugin.name, screen_num),
            entries,
        });
    }
    Ok(screens)
}

/// Rescale to the 0-127 MIDI display range. A zero-width range displays 0
/// rather than dividing by zero.
fn rescale(value: f32, min: f32, max: f32) -> u8 {
    let range = max - min;
    if range == 0.0 {
        return 0;
    }
    (127.0 * (value - min) / range).round().clamp(0.0, 127.0) as u8
}

/// Fallback screens offered when pedalboard discovery yields nothing
/// controllable: the standard channel-voice controls.
pub fn default_screens() -> Vec<ControllerScreen> {
    vec![
        ControllerScreen {
            title: "main".to_string(),
            entries: vec![
                ControllerEntry {
                    label: "volume".to_string(),
                    midi_cc: 7,
                    value: ControlValue::Midi(96),
                },
                ControllerEntry {
                    label: "pan".to_string(),
                    midi_cc: 10,
                    value: ControlValue::Midi(64),
                },
                ControllerEntry {
                    label: "sustain on/off".to_string(),
                    midi_cc: 64,
                    value: ControlValue::Switch { on: false },
                },
                ControllerEntry {
                    label: "modulation".to_string(),
                    midi_cc: 1,
                    value: ControlValue::Midi(0),
                },
            ],
        },
        ControllerScreen {
            title: "portamento".to_string(),
            entries: vec![
                ControllerEntry {
                    label: "volume".to_string(),
                    midi_cc: 7,
                    value: ControlValue::Midi(96),
                },
                ControllerEntry {
                    label: "pan".to_string(),
                    midi_cc: 10,
                    value: ControlValue::Midi(64),
                },
                ControllerEntry {
                    label: "portamento on/off".to_string(),
                    midi_cc: 65,
                    value: ControlValue::Switch { on: false },
                },
                ControllerEntry {
                    label: "portamento".to_string(),
                    midi_cc: 5,
                    value: ControlValue::Midi(64),
                },
            ],
        },
    ]
}
