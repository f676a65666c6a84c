use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::PortError;

/// Node grid dimensions. Nodes in the same column run in parallel, columns
/// compose serially, so the topology itself cannot form a loop.
pub const GRID_ROWS: usize = 16;
pub const GRID_COLS: usize = 16;

/// Number of ZS3 (sub-snapshot) slots per chain.
pub const ZS3_SLOTS: usize = 128;

/// A processing stage placed on the node grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Node {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Note window and transpose settings for a chain's MIDI input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRange {
    pub note_low: u8,
    pub note_high: u8,
    pub octave_trans: i8,
    pub halftone_trans: i8,
}

impl Default for NoteRange {
    fn default() -> Self {
        NoteRange {
            note_low: 0,
            note_high: 127,
            octave_trans: 0,
            halftone_trans: 0,
        }
    }
}

/// Serializable capture of one chain's configuration. Round-trips through
/// `Chain::snapshot` / `Chain::restore`; also the payload of a ZS3 slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    pub nodes: Vec<Vec<Option<Node>>>,
    pub midi_chan: Option<u8>,
    pub midi_input_devs: Vec<String>,
    pub midi_input_chans: [Option<u8>; 16],
    pub note_range: NoteRange,
    pub audio_in: Vec<String>,
    pub audio_out: Vec<String>,
    pub midi_out: Vec<String>,
    pub title: Option<String>,
    pub bank_name: Option<String>,
    pub preset_name: Option<String>,
}

/// Routing state for one chain: the node grid, MIDI bindings and the audio
/// input/output port sets.
///
/// All mutators here are pure state operations with set semantics
/// (idempotent add, tolerant remove). Keeping the external connection graph
/// in sync — and the paired-output invariant across sibling chains — is the
/// rack's job; see [`crate::rack::Rack`].
#[derive(Debug, Clone)]
pub struct Chain {
    /// Port client name this chain registers in the connection graph.
    pub jackname: String,
    pub nodes: Vec<Vec<Option<Node>>>,
    pub midi_chan: Option<u8>,
    /// Device identifiers this chain listens to.
    pub midi_input_devs: Vec<String>,
    /// Per-source-channel remap: `Some(dst)` listens and remaps, `None`
    /// ignores events on that channel.
    pub midi_input_chans: [Option<u8>; 16],
    pub note_range: NoteRange,
    pub audio_in: Vec<String>,
    pub audio_out: Vec<String>,
    pub midi_out: Vec<String>,
    /// Explicit display title; when unset, [`Chain::title`] derives one.
    pub title: Option<String>,
    /// Engine-specific base path shown in the hierarchical display string.
    pub engine_path: String,
    pub bank_name: Option<String>,
    pub preset_name: Option<String>,
    zs3: Vec<Option<ChainState>>,
}

fn validate_port(name: &str) -> Result<(), PortError> {
    if name.trim().is_empty() {
        return Err(PortError::Invalid(name.to_string()));
    }
    Ok(())
}

/// Order-independent equality where duplicate counts matter.
fn multiset_eq(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for name in a {
        *counts.entry(name.as_str()).or_default() += 1;
    }
    for name in b {
        match counts.get_mut(name.as_str()) {
            Some(c) => *c -= 1,
            None => return false,
        }
    }
    counts.values().all(|&c| c == 0)
}

/// Idempotent insert preserving order.
fn set_add(set: &mut Vec<String>, name: &str) {
    if !set.iter().any(|p| p == name) {
        set.push(name.to_string());
    }
}

/// Tolerant removal: absent element is a no-op, not an error.
fn set_del(set: &mut Vec<String>, name: &str) {
    if let Some(pos) = set.iter().position(|p| p == name) {
        set.remove(pos);
    }
}

impl Chain {
    pub fn new(jackname: impl Into<String>) -> Self {
        Chain {
            jackname: jackname.into(),
            nodes: vec![vec![None; GRID_COLS]; GRID_ROWS],
            midi_chan: None,
            midi_input_devs: Vec::new(),
            midi_input_chans: [None; 16],
            note_range: NoteRange::default(),
            audio_in: Vec::new(),
            audio_out: Vec::new(),
            midi_out: Vec::new(),
            title: None,
            engine_path: String::new(),
            bank_name: None,
            preset_name: None,
            zs3: vec![None; ZS3_SLOTS],
        }
    }

    /// The name this chain's audio ports appear under in the connection graph.
    pub fn audio_jackname(&self) -> &str {
        &self.jackname
    }

    /// The name this chain's MIDI ports appear under in the connection graph.
    pub fn midi_jackname(&self) -> &str {
        &self.jackname
    }

    // -- node grid --

    pub fn node(&self, row: usize, col: usize) -> Option<&Node> {
        self.nodes.get(row)?.get(col)?.as_ref()
    }

    /// Place (or clear) a node. Out-of-grid coordinates are rejected.
    pub fn set_node(&mut self, row: usize, col: usize, node: Option<Node>) -> bool {
        match self.nodes.get_mut(row).and_then(|r| r.get_mut(col)) {
            Some(slot) => {
                *slot = node;
                true
            }
            None => false,
        }
    }

    /// First occupied slot in row-major order; the chain's primary node.
    pub fn root_node(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .flat_map(|row| row.iter())
            .find_map(|slot| slot.as_ref())
    }

    // -- MIDI input --

    pub fn set_midi_input_devs(&mut self, devs: Vec<String>) {
        self.midi_input_devs = devs;
    }

    pub fn set_midi_input_chans(&mut self, chans: [Option<u8>; 16]) {
        self.midi_input_chans = chans;
    }

    /// Normalizes a reversed window (low > high) instead of failing.
    pub fn set_note_range(&mut self, note_low: u8, note_high: u8) {
        let (low, high) = if note_low <= note_high {
            (note_low, note_high)
        } else {
            (note_high, note_low)
        };
        self.note_range.note_low = low.min(127);
        self.note_range.note_high = high.min(127);
    }

    pub fn set_transpose(&mut self, octave: i8, halftone: i8) {
        self.note_range.octave_trans = octave;
        self.note_range.halftone_trans = halftone;
    }

    // -- audio output routing (state only; pairing/resync live in the rack) --

    /// Replace the full output set. A bare `"system"` alias from old saved
    /// states expands to the concrete stereo playback pair before storage.
    pub fn set_audio_out(&mut self, ports: &[String]) -> Result<(), PortError> {
        for port in ports {
            validate_port(port)?;
        }
        let mut out = ports.to_vec();
        if let Some(pos) = out.iter().position(|p| p == "system") {
            out.remove(pos);
            out.push("system:playback_1".to_string());
            out.push("system:playback_2".to_string());
        }
        self.audio_out = out;
        Ok(())
    }

    pub fn add_audio_out(&mut self, port: &str) -> Result<(), PortError> {
        validate_port(port)?;
        log::debug!("connecting audio out {} => {}", self.audio_jackname(), port);
        set_add(&mut self.audio_out, port);
        Ok(())
    }

    pub fn del_audio_out(&mut self, port: &str) {
        log::debug!("disconnecting audio out {} => {}", self.audio_jackname(), port);
        set_del(&mut self.audio_out, port);
    }

    pub fn toggle_audio_out(&mut self, port: &str) -> Result<(), PortError> {
        validate_port(port)?;
        if self.audio_out.iter().any(|p| p == port) {
            set_del(&mut self.audio_out, port);
        } else {
            set_add(&mut self.audio_out, port);
        }
        Ok(())
    }

    /// Deterministic default: the mixer strip pair for the chain's MIDI
    /// channel, or the physical stereo playback pair when unassigned.
    pub fn reset_audio_out(&mut self) {
        self.audio_out = match self.midi_chan {
            Some(chan) => vec![
                format!("mixer:input_{:02}a", chan + 1),
                format!("mixer:input_{:02}b", chan + 1),
            ],
            None => vec![
                "system:playback_1".to_string(),
                "system:playback_2".to_string(),
            ],
        };
    }

    /// Silence the chain without destroying it.
    pub fn mute_audio_out(&mut self) {
        self.audio_out.clear();
    }

    // -- audio input routing --

    pub fn set_audio_in(&mut self, ports: &[String]) -> Result<(), PortError> {
        for port in ports {
            validate_port(port)?;
        }
        self.audio_in = ports.to_vec();
        Ok(())
    }

    pub fn add_audio_in(&mut self, port: &str) -> Result<(), PortError> {
        validate_port(port)?;
        log::debug!("connecting audio capture {} => {}", port, self.audio_jackname());
        set_add(&mut self.audio_in, port);
        Ok(())
    }

    pub fn del_audio_in(&mut self, port: &str) {
        log::debug!("disconnecting audio capture {} => {}", port, self.audio_jackname());
        set_del(&mut self.audio_in, port);
    }

    pub fn toggle_audio_in(&mut self, port: &str) -> Result<(), PortError> {
        validate_port(port)?;
        if self.audio_in.iter().any(|p| p == port) {
            set_del(&mut self.audio_in, port);
        } else {
            set_add(&mut self.audio_in, port);
        }
        Ok(())
    }

    pub fn reset_audio_in(&mut self) {
        self.audio_in = vec![
            "system:capture_1".to_string(),
            "system:capture_2".to_string(),
        ];
    }

    pub fn mute_audio_in(&mut self) {
        self.audio_in.clear();
    }

    // -- MIDI output routing --

    pub fn set_midi_out(&mut self, devs: &[String]) -> Result<(), PortError> {
        for dev in devs {
            validate_port(dev)?;
        }
        self.midi_out = devs.to_vec();
        Ok(())
    }

    pub fn add_midi_out(&mut self, dev: &str) -> Result<(), PortError> {
        validate_port(dev)?;
        log::debug!("connecting midi {} => {}", self.midi_jackname(), dev);
        set_add(&mut self.midi_out, dev);
        Ok(())
    }

    pub fn del_midi_out(&mut self, dev: &str) {
        log::debug!("disconnecting midi {} => {}", self.midi_jackname(), dev);
        set_del(&mut self.midi_out, dev);
    }

    pub fn toggle_midi_out(&mut self, dev: &str) -> Result<(), PortError> {
        validate_port(dev)?;
        if self.midi_out.iter().any(|p| p == dev) {
            set_del(&mut self.midi_out, dev);
        } else {
            set_add(&mut self.midi_out, dev);
        }
        Ok(())
    }

    pub fn mute_midi_out(&mut self) {
        self.midi_out.clear();
    }

    // -- parallel routing queries --

    /// True iff `other` is a distinct chain on the same MIDI channel whose
    /// audio output set equals ours as a multiset (order ignored, duplicate
    /// counts respected).
    pub fn is_parallel_audio_routed(&self, other: &Chain) -> bool {
        !std::ptr::eq(self, other)
            && self.midi_chan == other.midi_chan
            && multiset_eq(&self.audio_out, &other.audio_out)
    }

    pub fn is_parallel_midi_routed(&self, other: &Chain) -> bool {
        !std::ptr::eq(self, other)
            && self.midi_chan == other.midi_chan
            && multiset_eq(&self.midi_out, &other.midi_out)
    }

    // -- display paths --

    /// `bank/preset` (whichever parts are present).
    pub fn get_path(&self) -> String {
        let mut path = self.bank_name.clone().unwrap_or_default();
        if let Some(preset) = &self.preset_name {
            if path.is_empty() {
                path = preset.clone();
            } else {
                path = format!("{path}/{preset}");
            }
        }
        path
    }

    /// Engine base path, prefixed with the 1-indexed MIDI channel if assigned.
    pub fn get_basepath(&self) -> String {
        match self.midi_chan {
            Some(chan) => format!("{}#{}", chan + 1, self.engine_path),
            None => self.engine_path.clone(),
        }
    }

    /// Legacy saved states use the literal `"None"` as a bank absent-marker.
    fn bank_display_name(&self) -> Option<&str> {
        match self.bank_name.as_deref() {
            None | Some("None") | Some("") => None,
            Some(name) => Some(name),
        }
    }

    pub fn get_bankpath(&self) -> String {
        let mut path = self.get_basepath();
        if let Some(bank) = self.bank_display_name() {
            path.push_str(" > ");
            path.push_str(bank);
        }
        path
    }

    pub fn get_presetpath(&self) -> String {
        let mut path = self.get_basepath();
        let subpath = match (self.bank_display_name(), self.preset_name.as_deref()) {
            (Some(bank), Some(preset)) => Some(format!("{bank}/{preset}")),
            (Some(bank), None) => Some(bank.to_string()),
            (None, Some(preset)) => Some(preset.to_string()),
            (None, None) => None,
        };
        if let Some(sub) = subpath {
            path.push_str(" > ");
            path.push_str(&sub);
        }
        path
    }

    /// Display title: the explicit one if set, otherwise derived from the
    /// primary node and the active preset.
    pub fn title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        match (self.root_node(), self.preset_name.as_deref()) {
            (Some(node), Some(preset)) => format!("{} - {}", node.name, preset),
            (Some(node), None) => node.name.clone(),
            (None, Some(preset)) => preset.to_string(),
            (None, None) => String::new(),
        }
    }

    // -- snapshot --

    pub fn snapshot(&self) -> ChainState {
        ChainState {
            nodes: self.nodes.clone(),
            midi_chan: self.midi_chan,
            midi_input_devs: self.midi_input_devs.clone(),
            midi_input_chans: self.midi_input_chans,
            note_range: self.note_range,
            audio_in: self.audio_in.clone(),
            audio_out: self.audio_out.clone(),
            midi_out: self.midi_out.clone(),
            title: self.title.clone(),
            bank_name: self.bank_name.clone(),
            preset_name: self.preset_name.clone(),
        }
    }

    /// Restore a captured configuration. ZS3 slots and chain identity
    /// (`jackname`, `engine_path`) are not part of the capture.
    pub fn restore(&mut self, state: &ChainState) {
        self.nodes = state.nodes.clone();
        self.midi_chan = state.midi_chan;
        self.midi_input_devs = state.midi_input_devs.clone();
        self.midi_input_chans = state.midi_input_chans;
        self.note_range = state.note_range;
        self.audio_in = state.audio_in.clone();
        self.audio_out = state.audio_out.clone();
        self.midi_out = state.midi_out.clone();
        self.title = state.title.clone();
        self.bank_name = state.bank_name.clone();
        self.preset_name = state.preset_name.clone();
    }

    // -- ZS3 sub-snapshots --

    pub fn reset_zs3(&mut self) {
        self.zs3 = vec![None; ZS3_SLOTS];
    }

    pub fn get_zs3(&self, slot: usize) -> Option<&ChainState> {
        self.zs3.get(slot)?.as_ref()
    }

    pub fn delete_zs3(&mut self, slot: usize) {
        if let Some(entry) = self.zs3.get_mut(slot) {
            *entry = None;
        }
    }

    /// Capture the current configuration into a slot. Out-of-range slots are
    /// rejected.
    pub fn save_zs3(&mut self, slot: usize) -> bool {
        if slot >= ZS3_SLOTS {
            log::error!("ZS3 slot {slot} out of range");
            return false;
        }
        let state = self.snapshot();
        self.zs3[slot] = Some(state);
        true
    }

    /// Recall a slot. Returns false when the slot is empty or out of range.
    pub fn restore_zs3(&mut self, slot: usize) -> bool {
        match self.zs3.get(slot).cloned().flatten() {
            Some(state) => {
                self.restore(&state);
                true
            }
            None => false,
        }
    }
}
