use std::path::Path;
use std::time::Duration;

use clap::Parser;

use strand::cli::{Cli, Command};
use strand::config::{self, Config};
use strand::host::{HostBridge, ProcessTransport};
use strand::screens::{ControlValue, ControllerScreen};
use strand::translator::Translator;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load(Path::new(path))?,
        None => Config::default(),
    };

    match cli.command {
        Command::Translate { pedalboard } => {
            let translator = make_translator(&config);
            let commands = translator.translate(Path::new(&pedalboard))?;
            print!("{commands}");
            Ok(())
        }
        Command::Load {
            pedalboard,
            midi_chan,
        } => load(&config, &pedalboard, midi_chan),
        Command::Banks => banks(&config),
    }
}

fn make_translator(config: &Config) -> Translator {
    Translator::new(&config.translator.program).with_args(config.translator.args.clone())
}

fn load(config: &Config, pedalboard: &str, midi_chan: Option<u8>) -> anyhow::Result<()> {
    let transport = ProcessTransport::spawn(
        &config.host.program,
        &config.host.args,
        config.host.lv2_path.as_deref(),
        Duration::from_millis(config.host.response_timeout_ms),
    )?;

    let chan = midi_chan.unwrap_or(config.host.midi_chan);
    let mut bridge = HostBridge::new(transport, chan);
    let translator = make_translator(config);

    bridge.load_pedalboard(&translator, Path::new(pedalboard))?;

    println!("Loaded {} plugin(s)", bridge.plugins().len());
    for plugin in bridge.plugins() {
        println!("  [{}] {} ({} parameters)", plugin.id, plugin.name, plugin.parameters.len());
    }
    println!();
    for screen in bridge.screens() {
        print_screen(screen);
    }

    if let Err(e) = bridge.stop() {
        log::warn!("host shutdown: {e}");
    }
    Ok(())
}

fn print_screen(screen: &ControllerScreen) {
    println!("{}", screen.title);
    for entry in &screen.entries {
        let value = match &entry.value {
            ControlValue::Switch { on: true } => "on (off|on)".to_string(),
            ControlValue::Switch { on: false } => "off (off|on)".to_string(),
            ControlValue::Midi(v) => format!("{v}/127"),
        };
        println!("  CC{:<3} {:<24} {}", entry.midi_cc, entry.label, value);
    }
}

/// List pedalboard banks: each subdirectory of a configured bank dir.
fn banks(config: &Config) -> anyhow::Result<()> {
    for dir in &config.banks.dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("cannot read bank dir {}: {e}", dir.display());
                continue;
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                entry.file_type().ok()?.is_dir().then(|| {
                    entry.file_name().to_string_lossy().into_owned()
                })
            })
            .collect();
        names.sort();
        for name in names {
            println!("{}", name);
        }
    }
    Ok(())
}
