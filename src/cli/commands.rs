//! CLI command implementations

use std::path::Path;

use crate::audio::{self, linear_to_db, peak};
use crate::compose::FadeLaw;
use crate::convert::MockConverter;
use crate::error::Result;
use crate::mipmap::Mipmap;
use crate::part::ConvertParams;
use crate::session::{ApplyOptions, ConvertOptions, EditingSession};
use crate::store::DirStore;

/// Print format, duration, and peak level of a WAV file.
pub fn info(input: &Path) -> Result<()> {
    let (channels, sample_rate) = audio::read_wav(input)?;
    let mono = audio::downmix(&channels);
    let seconds = mono.len() as f64 / sample_rate as f64;

    println!("File:        {}", input.display());
    println!("Channels:    {}", channels.len());
    println!("Sample rate: {} Hz", sample_rate);
    println!("Samples:     {}", mono.len());
    println!("Duration:    {:.3} s", seconds);
    println!("Peak:        {:.2} dBFS", linear_to_db(peak(&mono)));
    Ok(())
}

/// Print a min/max waveform envelope, one column per line.
pub fn envelope(input: &Path, width: usize, start: usize, end: Option<usize>) -> Result<()> {
    let (channels, _) = audio::read_wav(input)?;
    let mono = audio::downmix(&channels);
    let end = end.unwrap_or(mono.len());

    let mipmap = Mipmap::build(&mono);
    for (px, (min, max)) in mipmap.query(&mono, start, end, width).iter().enumerate() {
        println!("{:6}  {:+.4} {:+.4}", px, min, max);
    }
    Ok(())
}

/// Convert one range through the mock backend and save the project.
pub fn convert(
    input: &Path,
    project: &Path,
    start: usize,
    end: usize,
    gain: f32,
    blend_ms: u32,
    fade_law: FadeLaw,
) -> Result<()> {
    let (channels, sample_rate) = audio::read_wav(input)?;
    let mono = audio::downmix(&channels);

    let store = DirStore::new(&project.join("parts"), sample_rate)?;
    let mut session = EditingSession::new(mono, sample_rate, Box::new(store));
    session.set_fade_law(fade_law);

    let params = ConvertParams::new().with_param("gain", gain);
    let options = ConvertOptions {
        apply: ApplyOptions {
            blend_ms,
            preserve_nested: true,
        },
        context_pad: 0,
    };
    let id = session.convert_range(&MockConverter::new(), start, end, params, options)?;
    session.save_project(project)?;

    println!("Converted [{}, {}) into part {}", start, end, id);
    println!("Project saved to {}", project.display());
    Ok(())
}
