use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "strand", about = "Chain router and pedalboard host bridge")]
pub struct Cli {
    /// Path to config file (.toml)
    #[arg(long)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the pedalboard translator and print the host command text
    Translate {
        /// Path to pedalboard description (.ttl)
        pedalboard: String,
    },
    /// Load a pedalboard into the plugin host and print controller screens
    Load {
        /// Path to pedalboard description (.ttl)
        pedalboard: String,
        /// MIDI channel for controller mappings (overrides config)
        #[arg(long)]
        midi_chan: Option<u8>,
    },
    /// List pedalboards found in the configured bank directories
    Banks,
}
