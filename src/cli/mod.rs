//! CLI Module
//!
//! Command-line interface for inspecting audio and exercising the editing
//! core offline.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::compose::FadeLaw;

/// Crossfade law selection on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum FadeLawArg {
    #[default]
    Linear,
    EqualPower,
}

impl From<FadeLawArg> for FadeLaw {
    fn from(arg: FadeLawArg) -> Self {
        match arg {
            FadeLawArg::Linear => FadeLaw::Linear,
            FadeLawArg::EqualPower => FadeLaw::EqualPower,
        }
    }
}

/// Retake - non-destructive range editing for voice conversion
#[derive(Parser, Debug)]
#[command(name = "retake")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print format, duration, and peak level of a WAV file
    #[command(name = "info")]
    Info {
        /// Input audio file
        input: PathBuf,
    },

    /// Print a min/max waveform envelope of a WAV file
    #[command(name = "envelope")]
    Envelope {
        /// Input audio file
        input: PathBuf,

        /// Number of output columns
        #[arg(short, long, default_value_t = 80)]
        width: usize,

        /// Start sample of the visible range
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// End sample of the visible range (defaults to the buffer end)
        #[arg(long)]
        end: Option<usize>,
    },

    /// Convert a sample range with the mock backend and save a project
    #[command(name = "convert")]
    Convert {
        /// Input audio file
        input: PathBuf,

        /// Project directory to create
        #[arg(short, long)]
        project: PathBuf,

        /// Start sample of the range to convert
        #[arg(long)]
        start: usize,

        /// End sample of the range to convert
        #[arg(long)]
        end: usize,

        /// Linear gain applied by the mock backend
        #[arg(long, default_value_t = 1.0)]
        gain: f32,

        /// Crossfade length against surrounding audio, in milliseconds
        #[arg(long, default_value_t = 10)]
        blend_ms: u32,

        /// Crossfade law at part boundaries
        #[arg(long, value_enum, default_value_t = FadeLawArg::Linear)]
        fade_law: FadeLawArg,
    },
}
