use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::error::{HostError, ParseError};
use crate::screens::{self, ControllerScreen};
use crate::translator::Translator;

/// A host parameter bound to a MIDI controller number.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Sanitized display name; `:`-prefixed names are on/off controls.
    pub name: String,
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub midi_cc: Option<u32>,
}

/// A plugin instantiated by the host, keyed by its host-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginInstance {
    pub id: String,
    pub name: String,
    pub parameters: Vec<Parameter>,
}

/// One effect extracted from a host response line. Per line, the first
/// matching pattern wins and produces at most one directive.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    AddPlugin { uri: String, id: String },
    /// A plugin wired to the serial-MIDI bridge; queues a one-time fixup
    /// connecting it to the physical MIDI capture port instead.
    MidiCaptureRewire { port: String },
    ParamSet { id: String, name: String, value: f32 },
}

fn is_numeric_id(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Scan one host response line.
///
/// Returns `Ok(None)` for free-text lines, `Err` for lines that start like
/// a known command but do not parse — callers log those and keep scanning.
pub fn parse_line(line: &str) -> Result<Option<Directive>, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.first().copied() {
        Some("add") => {
            let (Some(uri), Some(id)) = (tokens.get(1), tokens.get(2)) else {
                return Err(ParseError::new(line, "add needs <uri> <id>"));
            };
            if !is_numeric_id(id) {
                return Err(ParseError::new(line, "plugin id is not numeric"));
            }
            Ok(Some(Directive::AddPlugin {
                uri: uri.to_string(),
                id: id.to_string(),
            }))
        }
        Some("connect") => {
            // Only the serial-MIDI capture case is interesting; other
            // connect lines pass through untouched.
            match (tokens.get(1), tokens.get(2)) {
                (Some(port), Some(&"ttymidi:MIDI_in")) => Ok(Some(Directive::MidiCaptureRewire {
                    port: port.to_string(),
                })),
                _ => Ok(None),
            }
        }
        Some("param_set") => {
            let (Some(id), Some(name), Some(value)) =
                (tokens.get(1), tokens.get(2), tokens.get(3))
            else {
                return Err(ParseError::new(line, "param_set needs <id> <name> <value>"));
            };
            if !is_numeric_id(id) {
                return Err(ParseError::new(line, "plugin id is not numeric"));
            }
            let value: f32 = value
                .parse()
                .map_err(|_| ParseError::new(line, "value is not a number"))?;
            Ok(Some(Directive::ParamSet {
                id: id.to_string(),
                name: name.to_string(),
                value,
            }))
        }
        Some("bypass") => {
            let (Some(id), Some(value)) = (tokens.get(1), tokens.get(2)) else {
                return Err(ParseError::new(line, "bypass needs <id> <value>"));
            };
            if !is_numeric_id(id) {
                return Err(ParseError::new(line, "plugin id is not numeric"));
            }
            let value: f32 = value
                .parse()
                .map_err(|_| ParseError::new(line, "value is not a number"))?;
            Ok(Some(Directive::ParamSet {
                id: id.to_string(),
                name: ":bypass".to_string(),
                value,
            }))
        }
        _ => Ok(None),
    }
}

/// Display name for a plugin URI: the last `/` segment, truncated to the
/// part after `#` if present, underscores as spaces, trimmed.
fn display_name(uri: &str) -> String {
    let mut name = uri.rsplit('/').next().unwrap_or(uri);
    if let Some((_, fragment)) = name.split_once('#') {
        name = fragment;
    }
    name.replace('_', " ").trim().to_string()
}

/// Scratch registry built during one response scan; committed to the bridge
/// only when the whole load succeeds.
#[derive(Debug)]
struct Scan {
    plugins: Vec<PluginInstance>,
    followups: Vec<String>,
    next_cc: u32,
}

impl Scan {
    fn new() -> Self {
        Scan {
            plugins: Vec::new(),
            followups: Vec::new(),
            next_cc: 1,
        }
    }

    fn apply(&mut self, directive: Directive, midi_chan: u8) {
        match directive {
            Directive::AddPlugin { uri, id } => {
                let name = display_name(&uri);
                log::debug!("plugin {id}: {name}");
                let instance = PluginInstance {
                    id: id.clone(),
                    name,
                    parameters: Vec::new(),
                };
                match self.plugins.iter_mut().find(|p| p.id == id) {
                    Some(existing) => *existing = instance,
                    None => self.plugins.push(instance),
                }
            }
            Directive::MidiCaptureRewire { port } => {
                self.followups
                    .push(format!("connect {port} system:midi_capture_1"));
            }
            Directive::ParamSet { id, name, value } => {
                let Some(plugin) = self.plugins.iter_mut().find(|p| p.id == id) else {
                    log::warn!("parameter '{name}' for unknown plugin {id}, skipping");
                    return;
                };
                let midi_cc = self.next_cc;
                log::debug!("midi cc {midi_cc} => {} -> {name}", plugin.name);
                plugin.parameters.push(Parameter {
                    name: name.replace('_', " "),
                    value,
                    min: 0.0,
                    max: 127.0,
                    midi_cc: Some(midi_cc),
                });
                self.followups
                    .push(format!("midi_map {id} {name} {midi_chan} {midi_cc}"));
                self.next_cc += 1;
            }
        }
    }
}

/// Line-oriented command/response channel to the plugin host. A
/// request/response pair is correlated only by submission order.
pub trait HostTransport {
    /// Submit newline-terminated command text and collect the response
    /// lines that arrive before the quiescence window closes.
    fn send(&mut self, commands: &str) -> Result<Vec<String>, HostError>;
}

/// Transport over the host's stdin/stdout. A reader thread feeds response
/// lines into a channel; `send` drains it until no line has arrived for the
/// configured quiescence window.
pub struct ProcessTransport {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
    quiescence: Duration,
}

impl ProcessTransport {
    pub fn spawn(
        program: &Path,
        args: &[String],
        lv2_path: Option<&str>,
        quiescence: Duration,
    ) -> Result<Self, HostError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(path) = lv2_path {
            cmd.env("LV2_PATH", path);
        }
        let mut child = cmd.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HostError::HostGone("no stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HostError::HostGone("no stdout pipe".to_string()))?;

        let (tx, rx) = crossbeam_channel::unbounded();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        log::info!("plugin host started: {}", program.display());
        Ok(ProcessTransport {
            child,
            stdin,
            lines: rx,
            quiescence,
        })
    }
}

impl HostTransport for ProcessTransport {
    fn send(&mut self, commands: &str) -> Result<Vec<String>, HostError> {
        for line in commands.lines() {
            if line.is_empty() {
                continue;
            }
            writeln!(self.stdin, "{line}")?;
        }
        self.stdin.flush()?;

        let mut out = Vec::new();
        loop {
            match self.lines.recv_timeout(self.quiescence) {
                Ok(line) => out.push(line),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(HostError::HostGone("response stream closed".to_string()));
                }
            }
        }
        Ok(out)
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Translates host protocol output into the plugin/parameter model and the
/// UI controller-screen list.
pub struct HostBridge<T: HostTransport> {
    transport: T,
    /// MIDI channel written into midi_map follow-up commands.
    midi_chan: u8,
    /// A previously saved controller layout exists; regeneration is skipped
    /// so it is not clobbered.
    saved_controller_config: bool,
    plugins: Vec<PluginInstance>,
    screens: Vec<ControllerScreen>,
}

impl<T: HostTransport> HostBridge<T> {
    pub fn new(transport: T, midi_chan: u8) -> Self {
        HostBridge {
            transport,
            midi_chan,
            saved_controller_config: false,
            plugins: Vec::new(),
            screens: screens::default_screens(),
        }
    }

    pub fn set_saved_controller_config(&mut self, saved: bool) {
        self.saved_controller_config = saved;
    }

    pub fn plugins(&self) -> &[PluginInstance] {
        &self.plugins
    }

    pub fn screens(&self) -> &[ControllerScreen] {
        &self.screens
    }

    /// Translate a pedalboard description and load it into the host.
    ///
    /// On any structural failure the previously published plugin registry
    /// and screens stay untouched.
    pub fn load_pedalboard(
        &mut self,
        translator: &Translator,
        pedalboard: &Path,
    ) -> Result<(), HostError> {
        let commands = translator.translate(pedalboard)?;
        self.load_commands(&commands)
    }

    /// Submit host command text and rebuild the plugin registry from the
    /// response. Split out from [`HostBridge::load_pedalboard`] so the scan
    /// is exercisable without the translator process.
    pub fn load_commands(&mut self, commands: &str) -> Result<(), HostError> {
        let response = self.transport.send(commands)?;

        let mut scan = Scan::new();
        for line in &response {
            match parse_line(line) {
                Ok(Some(directive)) => scan.apply(directive, self.midi_chan),
                Ok(None) => {}
                Err(e) => log::warn!("{e}"),
            }
        }

        if !scan.followups.is_empty() {
            let batch = scan.followups.join("\n");
            self.transport.send(&batch)?;
        }

        self.plugins = scan.plugins;
        log::info!("loaded {} plugin(s)", self.plugins.len());

        if !self.saved_controller_config {
            self.screens = screens::regenerate(&self.plugins);
        }
        Ok(())
    }

    /// Regeneration is derivation-only: the plugin model is never modified.
    pub fn regenerate_screens(&mut self) {
        self.screens = screens::regenerate(&self.plugins);
    }

    /// Ask the host to shut down.
    pub fn stop(&mut self) -> Result<(), HostError> {
        self.transport.send("quit")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    // -- parsing --

    #[test]
    fn parses_add_line() {
        let d = parse_line("add http://example.org/plugins#Super_Amp 2").unwrap();
        assert_eq!(
            d,
            Some(Directive::AddPlugin {
                uri: "http://example.org/plugins#Super_Amp".to_string(),
                id: "2".to_string(),
            })
        );
    }

    #[test]
    fn add_with_non_numeric_id_is_parse_error() {
        assert!(parse_line("add http://x/amp abc").is_err());
        assert!(parse_line("add http://x/amp").is_err());
    }

    #[test]
    fn parses_midi_capture_rewire() {
        let d = parse_line("connect a2j:keyboard ttymidi:MIDI_in").unwrap();
        assert_eq!(
            d,
            Some(Directive::MidiCaptureRewire {
                port: "a2j:keyboard".to_string(),
            })
        );
    }

    #[test]
    fn ordinary_connect_is_ignored() {
        assert_eq!(parse_line("connect effect_1:out system:playback_1").unwrap(), None);
    }

    #[test]
    fn parses_param_set_with_negative_value() {
        let d = parse_line("param_set 3 gain -6.5").unwrap();
        assert_eq!(
            d,
            Some(Directive::ParamSet {
                id: "3".to_string(),
                name: "gain".to_string(),
                value: -6.5,
            })
        );
    }

    #[test]
    fn malformed_param_set_is_parse_error() {
        assert!(parse_line("param_set 3 gain not-a-number").is_err());
        assert!(parse_line("param_set 3 gain").is_err());
        assert!(parse_line("param_set x gain 1.0").is_err());
    }

    #[test]
    fn bypass_maps_to_synthetic_parameter() {
        let d = parse_line("bypass 1 127").unwrap();
        assert_eq!(
            d,
            Some(Directive::ParamSet {
                id: "1".to_string(),
                name: ":bypass".to_string(),
                value: 127.0,
            })
        );
    }

    #[test]
    fn free_text_lines_are_skipped() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("resp 0").unwrap(), None);
        assert_eq!(parse_line("mod-host ready").unwrap(), None);
    }

    #[test]
    fn display_name_sanitization() {
        assert_eq!(display_name("http://example.org/plugins#Super_Amp"), "Super Amp");
        assert_eq!(display_name("http://example.org/My_Verb"), "My Verb");
        assert_eq!(display_name("urn:plain"), "urn:plain");
    }

    // -- bridge --

    /// Transport scripted with canned responses; records everything sent.
    struct ScriptedTransport {
        sent: Rc<RefCell<Vec<String>>>,
        responses: VecDeque<Vec<String>>,
        fail_from_call: Option<usize>,
        calls: usize,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Vec<&str>>) -> (Self, Rc<RefCell<Vec<String>>>) {
            let sent = Rc::new(RefCell::new(Vec::new()));
            let t = ScriptedTransport {
                sent: sent.clone(),
                responses: responses
                    .into_iter()
                    .map(|lines| lines.into_iter().map(String::from).collect())
                    .collect(),
                fail_from_call: None,
                calls: 0,
            };
            (t, sent)
        }
    }

    impl HostTransport for ScriptedTransport {
        fn send(&mut self, commands: &str) -> Result<Vec<String>, HostError> {
            self.calls += 1;
            if let Some(n) = self.fail_from_call {
                if self.calls >= n {
                    return Err(HostError::HostGone("scripted failure".to_string()));
                }
            }
            self.sent.borrow_mut().push(commands.to_string());
            Ok(self.responses.pop_front().unwrap_or_default())
        }
    }

    const PEDALBOARD_RESPONSE: &[&str] = &[
        "add http://example.org/fx#Big_Reverb 1",
        "add http://example.org/Mono_Amp 2",
        "connect a2j:keyboard ttymidi:MIDI_in",
        "param_set 1 dry_wet 0.5",
        "param_set 2 gain 64",
        "bypass 1 0",
        "param_set 2 tone 100",
        "resp 0",
    ];

    fn loaded_bridge() -> (HostBridge<ScriptedTransport>, Rc<RefCell<Vec<String>>>) {
        let (transport, sent) = ScriptedTransport::new(vec![PEDALBOARD_RESPONSE.to_vec()]);
        let mut bridge = HostBridge::new(transport, 2);
        bridge.load_commands("add http://example.org/fx#Big_Reverb 1").unwrap();
        (bridge, sent)
    }

    #[test]
    fn cc_assignment_is_gapless_across_plugins() {
        let (bridge, _) = loaded_bridge();
        let ccs: Vec<u32> = bridge
            .plugins()
            .iter()
            .flat_map(|p| p.parameters.iter().filter_map(|param| param.midi_cc))
            .collect();
        let mut sorted = ccs.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3, 4]);

        // Interleaved assignment order: reverb got 1 and 3, amp got 2 and 4
        let reverb = &bridge.plugins()[0];
        assert_eq!(
            reverb.parameters.iter().filter_map(|p| p.midi_cc).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }

    #[test]
    fn plugin_names_are_sanitized() {
        let (bridge, _) = loaded_bridge();
        assert_eq!(bridge.plugins()[0].name, "Big Reverb");
        assert_eq!(bridge.plugins()[1].name, "Mono Amp");
    }

    #[test]
    fn parameter_names_lose_underscores_and_bypass_is_synthetic() {
        let (bridge, _) = loaded_bridge();
        let reverb = &bridge.plugins()[0];
        assert_eq!(reverb.parameters[0].name, "dry wet");
        assert_eq!(reverb.parameters[1].name, ":bypass");
    }

    #[test]
    fn followups_sent_as_one_batch() {
        let (_, sent) = loaded_bridge();
        let sent = sent.borrow();
        assert_eq!(sent.len(), 2);
        let batch: Vec<&str> = sent[1].lines().collect();
        assert_eq!(
            batch,
            vec![
                "connect a2j:keyboard system:midi_capture_1",
                "midi_map 1 dry_wet 2 1",
                "midi_map 2 gain 2 2",
                "midi_map 1 :bypass 2 3",
                "midi_map 2 tone 2 4",
            ]
        );
    }

    #[test]
    fn screens_regenerated_after_load() {
        let (bridge, _) = loaded_bridge();
        assert_eq!(bridge.screens().len(), 2);
        assert_eq!(bridge.screens()[0].title, "Big Reverb#1");
        assert_eq!(bridge.screens()[1].title, "Mono Amp#1");
    }

    #[test]
    fn saved_controller_config_suppresses_regeneration() {
        let (transport, _) = ScriptedTransport::new(vec![PEDALBOARD_RESPONSE.to_vec()]);
        let mut bridge = HostBridge::new(transport, 0);
        bridge.set_saved_controller_config(true);
        let before = bridge.screens().to_vec();

        bridge.load_commands("x").unwrap();
        assert_eq!(bridge.screens(), &before[..]);
        assert!(!bridge.plugins().is_empty());
    }

    #[test]
    fn unknown_plugin_parameter_does_not_consume_a_cc() {
        let (transport, _) = ScriptedTransport::new(vec![vec![
            "add http://x/Amp 1",
            "param_set 9 ghost 1.0",
            "param_set 1 gain 0.5",
        ]]);
        let mut bridge = HostBridge::new(transport, 0);
        bridge.load_commands("x").unwrap();

        assert_eq!(bridge.plugins().len(), 1);
        assert_eq!(bridge.plugins()[0].parameters.len(), 1);
        assert_eq!(bridge.plugins()[0].parameters[0].midi_cc, Some(1));
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let (transport, _) = ScriptedTransport::new(vec![vec![
            "add http://x/Amp 1",
            "param_set 1 broken not-a-number",
            "param_set 1 gain 0.5",
        ]]);
        let mut bridge = HostBridge::new(transport, 0);
        bridge.load_commands("x").unwrap();

        let amp = &bridge.plugins()[0];
        assert_eq!(amp.parameters.len(), 1);
        assert_eq!(amp.parameters[0].name, "gain");
        assert_eq!(amp.parameters[0].midi_cc, Some(1));
    }

    #[test]
    fn failed_load_keeps_previous_registry() {
        let (transport, _) = ScriptedTransport::new(vec![
            PEDALBOARD_RESPONSE.to_vec(),
            vec!["add http://x/Other 9", "param_set 9 a 1"],
        ]);
        let mut bridge = HostBridge::new(transport, 0);
        bridge.load_commands("first").unwrap();
        let before = bridge.plugins().to_vec();

        // Second load: the scan send works (call 3) but the follow-up batch
        // send (call 4) fails
        bridge.transport.fail_from_call = Some(4);
        assert!(bridge.load_commands("second").is_err());
        assert_eq!(bridge.plugins(), &before[..]);
    }

    #[test]
    fn empty_response_substitutes_default_screens() {
        let (transport, _) = ScriptedTransport::new(vec![vec!["resp 0"]]);
        let mut bridge = HostBridge::new(transport, 0);
        bridge.load_commands("x").unwrap();
        assert!(bridge.plugins().is_empty());
        assert_eq!(bridge.screens(), &screens::default_screens()[..]);
    }

    #[test]
    fn stop_sends_quit() {
        let (transport, sent) = ScriptedTransport::new(vec![]);
        let mut bridge = HostBridge::new(transport, 0);
        bridge.stop().unwrap();
        assert_eq!(sent.borrow().last().unwrap(), "quit");
    }

    #[test]
    fn duplicate_add_replaces_plugin() {
        let (transport, _) = ScriptedTransport::new(vec![vec![
            "add http://x/First 1",
            "param_set 1 a 1",
            "add http://x/Second 1",
        ]]);
        let mut bridge = HostBridge::new(transport, 0);
        bridge.load_commands("x").unwrap();
        assert_eq!(bridge.plugins().len(), 1);
        assert_eq!(bridge.plugins()[0].name, "Second");
        assert!(bridge.plugins()[0].parameters.is_empty());
    }

    #[test]
    fn process_transport_round_trip_with_cat() {
        // `cat` echoes commands back, standing in for a host that confirms
        // each command line.
        let mut transport = ProcessTransport::spawn(
            Path::new("cat"),
            &[],
            None,
            Duration::from_millis(200),
        )
        .unwrap();
        let lines = transport.send("add http://x/Amp 1\nparam_set 1 gain 0.5\n").unwrap();
        assert_eq!(lines, vec!["add http://x/Amp 1", "param_set 1 gain 0.5"]);
    }
}
