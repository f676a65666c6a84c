use crate::chain::Chain;
use crate::error::PortError;

/// Re-establishes real audio connections from the racks's current routing
/// state. Must be idempotent; the rack calls it after every audio mutation.
pub trait AudioConnector {
    fn resync_audio(&self);
}

/// Analogous collaborator for the MIDI connection graph.
pub trait MidiConnector {
    fn resync_midi(&self);
}

/// Production connector used by the CLI: the real graph wiring lives outside
/// this process, so a resync request is only surfaced in the log.
pub struct LogConnector;

impl AudioConnector for LogConnector {
    fn resync_audio(&self) {
        log::debug!("audio graph resync requested");
    }
}

impl MidiConnector for LogConnector {
    fn resync_midi(&self) {
        log::debug!("midi graph resync requested");
    }
}

/// Addresses the port a routing mutator operates on: either a raw
/// `client:port` name, or another chain in the rack, resolved to that
/// chain's client name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortRef {
    Name(String),
    Chain(usize),
}

impl PortRef {
    pub fn name(name: impl Into<String>) -> Self {
        PortRef::Name(name.into())
    }

    pub fn chain(index: usize) -> Self {
        PortRef::Chain(index)
    }
}

impl From<&str> for PortRef {
    fn from(name: &str) -> Self {
        PortRef::Name(name.to_string())
    }
}

/// Owns the session's chains plus the injected connection-graph
/// collaborators.
///
/// Every routing mutator here follows the same contract: validate, mutate
/// the chain, enforce the paired-output invariant where it applies, then
/// signal the corresponding connector exactly once. Failed validation
/// aborts before any state is touched. Callers serialize mutations; the
/// rack provides no internal locking.
pub struct Rack {
    chains: Vec<Chain>,
    /// When on, chains sharing a MIDI channel are forced to identical audio
    /// output sets (the engine-level unified-output option).
    unified_output: bool,
    audio: Box<dyn AudioConnector>,
    midi: Box<dyn MidiConnector>,
}

impl Rack {
    pub fn new(audio: Box<dyn AudioConnector>, midi: Box<dyn MidiConnector>) -> Self {
        Rack {
            chains: Vec::new(),
            unified_output: false,
            audio,
            midi,
        }
    }

    pub fn set_unified_output(&mut self, on: bool) {
        self.unified_output = on;
    }

    pub fn add_chain(&mut self, chain: Chain) -> usize {
        self.chains.push(chain);
        self.chains.len() - 1
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn chain(&self, index: usize) -> Option<&Chain> {
        self.chains.get(index)
    }

    /// Direct state access for session setup (channel assignment, node
    /// placement). Routing changes must go through the rack's mutators so
    /// pairing and resync are not skipped.
    pub fn chain_mut(&mut self, index: usize) -> Option<&mut Chain> {
        self.chains.get_mut(index)
    }

    fn get(&mut self, index: usize) -> Result<&mut Chain, PortError> {
        self.chains.get_mut(index).ok_or(PortError::UnknownChain(index))
    }

    fn resolve_audio(&self, port: &PortRef) -> Result<String, PortError> {
        match port {
            PortRef::Name(name) => Ok(name.clone()),
            PortRef::Chain(i) => self
                .chains
                .get(*i)
                .map(|c| c.audio_jackname().to_string())
                .ok_or(PortError::UnknownChain(*i)),
        }
    }

    fn resolve_midi(&self, port: &PortRef) -> Result<String, PortError> {
        match port {
            PortRef::Name(name) => Ok(name.clone()),
            PortRef::Chain(i) => self
                .chains
                .get(*i)
                .map(|c| c.midi_jackname().to_string())
                .ok_or(PortError::UnknownChain(*i)),
        }
    }

    /// Copy chain `index`'s output set onto every other chain on the same
    /// MIDI channel. Runs synchronously as part of the triggering mutation.
    fn pair_audio_out(&mut self, index: usize) {
        if !self.unified_output {
            return;
        }
        let Some(chan) = self.chains[index].midi_chan else {
            return;
        };
        let out = self.chains[index].audio_out.clone();
        for (i, chain) in self.chains.iter_mut().enumerate() {
            if i != index && chain.midi_chan == Some(chan) {
                chain.audio_out = out.clone();
            }
        }
    }

    // -- audio output routing --

    pub fn set_audio_out(&mut self, index: usize, ports: &[String]) -> Result<(), PortError> {
        self.get(index)?.set_audio_out(ports)?;
        self.pair_audio_out(index);
        self.audio.resync_audio();
        Ok(())
    }

    pub fn add_audio_out(&mut self, index: usize, port: PortRef) -> Result<(), PortError> {
        let name = self.resolve_audio(&port)?;
        self.get(index)?.add_audio_out(&name)?;
        self.pair_audio_out(index);
        self.audio.resync_audio();
        Ok(())
    }

    pub fn del_audio_out(&mut self, index: usize, port: PortRef) -> Result<(), PortError> {
        let name = self.resolve_audio(&port)?;
        self.get(index)?.del_audio_out(&name);
        self.pair_audio_out(index);
        self.audio.resync_audio();
        Ok(())
    }

    pub fn toggle_audio_out(&mut self, index: usize, port: PortRef) -> Result<(), PortError> {
        let name = self.resolve_audio(&port)?;
        self.get(index)?.toggle_audio_out(&name)?;
        self.pair_audio_out(index);
        self.audio.resync_audio();
        Ok(())
    }

    pub fn reset_audio_out(&mut self, index: usize) -> Result<(), PortError> {
        self.get(index)?.reset_audio_out();
        self.audio.resync_audio();
        Ok(())
    }

    pub fn mute_audio_out(&mut self, index: usize) -> Result<(), PortError> {
        self.get(index)?.mute_audio_out();
        self.pair_audio_out(index);
        self.audio.resync_audio();
        Ok(())
    }

    // -- audio input routing (never paired across chains) --

    pub fn set_audio_in(&mut self, index: usize, ports: &[String]) -> Result<(), PortError> {
        self.get(index)?.set_audio_in(ports)?;
        self.audio.resync_audio();
        Ok(())
    }

    pub fn add_audio_in(&mut self, index: usize, port: PortRef) -> Result<(), PortError> {
        let name = self.resolve_audio(&port)?;
        self.get(index)?.add_audio_in(&name)?;
        self.audio.resync_audio();
        Ok(())
    }

    pub fn del_audio_in(&mut self, index: usize, port: PortRef) -> Result<(), PortError> {
        let name = self.resolve_audio(&port)?;
        self.get(index)?.del_audio_in(&name);
        self.audio.resync_audio();
        Ok(())
    }

    pub fn toggle_audio_in(&mut self, index: usize, port: PortRef) -> Result<(), PortError> {
        let name = self.resolve_audio(&port)?;
        self.get(index)?.toggle_audio_in(&name)?;
        self.audio.resync_audio();
        Ok(())
    }

    pub fn reset_audio_in(&mut self, index: usize) -> Result<(), PortError> {
        self.get(index)?.reset_audio_in();
        self.audio.resync_audio();
        Ok(())
    }

    pub fn mute_audio_in(&mut self, index: usize) -> Result<(), PortError> {
        self.get(index)?.mute_audio_in();
        self.audio.resync_audio();
        Ok(())
    }

    // -- MIDI output routing --

    pub fn set_midi_out(&mut self, index: usize, devs: &[String]) -> Result<(), PortError> {
        self.get(index)?.set_midi_out(devs)?;
        self.midi.resync_midi();
        Ok(())
    }

    pub fn add_midi_out(&mut self, index: usize, port: PortRef) -> Result<(), PortError> {
        let name = self.resolve_midi(&port)?;
        self.get(index)?.add_midi_out(&name)?;
        self.midi.resync_midi();
        Ok(())
    }

    pub fn del_midi_out(&mut self, index: usize, port: PortRef) -> Result<(), PortError> {
        let name = self.resolve_midi(&port)?;
        self.get(index)?.del_midi_out(&name);
        self.midi.resync_midi();
        Ok(())
    }

    pub fn toggle_midi_out(&mut self, index: usize, port: PortRef) -> Result<(), PortError> {
        let name = self.resolve_midi(&port)?;
        self.get(index)?.toggle_midi_out(&name)?;
        self.midi.resync_midi();
        Ok(())
    }

    pub fn mute_midi_out(&mut self, index: usize) -> Result<(), PortError> {
        self.get(index)?.mute_midi_out();
        self.midi.resync_midi();
        Ok(())
    }
}
