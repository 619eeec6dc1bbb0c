// Reverie
// Copyright (C) 2021  Wesley Merkel
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use reverie::{
    blueprint::Library,
    channel::bar_channel,
    composer::{BarReady, BarSink, Composition, Report},
    routing::{self, Orchestrator, Router},
    settings::{self, Settings},
    synth::{control_channel, Synth},
};
use serde::Serialize;
use std::{path::PathBuf, process};
use thiserror::Error;

/// Frames rendered per call, like an audio callback would.
const BLOCK: usize = 512;

/// Seconds rendered after the last bar so the voices can ring out.
const TAIL: f64 = 4.0;

#[derive(Parser)]
#[command(
    name = "reverie",
    version,
    about = "Composes and renders generative ambient music offline"
)]
struct Cli {
    /// JSON settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Number of bars to compose
    #[arg(long, default_value = "16")]
    bars: u32,

    /// Render sample rate in Hz
    #[arg(long, default_value = "48000")]
    sample_rate: f32,

    /// Print one JSON object per bar
    #[arg(long)]
    json: bool,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Settings(#[from] settings::Error),
    #[error(transparent)]
    Routing(#[from] routing::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("sample rate must be a positive number, got {0}")]
    SampleRate(f32),
}

/// What the binary prints for every bar.
#[derive(Debug, Serialize)]
struct BarSummary {
    bar: u32,
    part: String,
    part_bar: u32,
    bpm: f64,
    tension: f64,
    events: usize,
    voices: usize,
    peak: f32,
    rms: f32,
}

/// Forwards bars to the orchestrator and keeps the last one for the summary.
struct Tee {
    sender: reverie::channel::BarSender,
    last: Option<BarReady>,
}

impl BarSink for Tee {
    fn bar(&mut self, bar: BarReady) {
        self.last = Some(bar.clone());
        self.sender.bar(bar);
    }

    fn report(&mut self, report: Report) {
        self.sender.report(report);
    }
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    if let Err(err) = run(&cli) {
        log::error!("{}", err);
        eprintln!("error: {}", err);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    if !(cli.sample_rate.is_finite() && cli.sample_rate > 0.0) {
        return Err(Error::SampleRate(cli.sample_rate));
    }
    let settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    let (control, receiver) = control_channel(4096);
    let mut synth = Synth::new(cli.sample_rate, receiver);
    let (sender, bars) = bar_channel();
    let router = Router::new(control, &settings, None);
    let mut orchestrator = Orchestrator::new(bars, router, synth.clock());
    let mut composition = Composition::new(settings, Library::builtin());
    let mut tee = Tee { sender, last: None };

    tee.report(Report::Started {
        seed: composition.seed(),
    });
    // Bars are anchored one bar ahead of the clock, so the audio rendered after composing a bar
    // belongs to the bar before it.
    let mut buffer = vec![0.0; BLOCK];
    let mut playing: Option<BarReady> = None;
    for index in 0..=cli.bars {
        let upcoming = if index < cli.bars {
            composition.tick(&mut tee);
            orchestrator.pump()?;
            tee.last.take()
        } else {
            None
        };

        let bar_duration = playing
            .as_ref()
            .or(upcoming.as_ref())
            .map_or_else(|| composition.bar_duration(), |bar| bar.bar_duration);
        let frames = (bar_duration * cli.sample_rate as f64).round() as usize;
        let (peak, rms) = render(&mut synth, &mut buffer, frames);
        if let Some(bar) = playing.take() {
            let summary = BarSummary {
                bar: bar.bar_count,
                part: bar.nav.part_id.clone(),
                part_bar: bar.nav.part_bar,
                bpm: bar.actual_bpm,
                tension: bar.tension,
                events: bar.events.len(),
                voices: synth.active_voices(),
                peak,
                rms,
            };
            print(&summary, cli.json)?;
        }
        playing = upcoming;
    }
    tee.report(Report::Stopped {
        bar_count: composition.bar_count(),
    });
    orchestrator.pump()?;

    let frames = (TAIL * cli.sample_rate as f64).round() as usize;
    render(&mut synth, &mut buffer, frames);
    log::info!(
        "rendered {:.1} seconds, {} voices still sounding",
        synth.clock().seconds(),
        synth.voice_count()
    );
    Ok(())
}

/// Renders `frames` frames in blocks and returns their peak and RMS level.
fn render(synth: &mut Synth, buffer: &mut [f32], frames: usize) -> (f32, f32) {
    let mut remaining = frames;
    let mut peak = 0.0f32;
    let mut sum = 0.0f64;
    while remaining > 0 {
        let block = &mut buffer[..remaining.min(BLOCK)];
        synth.render(block);
        for sample in block.iter() {
            peak = peak.max(sample.abs());
            sum += (*sample as f64) * (*sample as f64);
        }
        remaining -= block.len();
    }
    let rms = if frames == 0 {
        0.0
    } else {
        (sum / frames as f64).sqrt() as f32
    };
    (peak, rms)
}

fn print(summary: &BarSummary, json: bool) -> Result<(), Error> {
    if json {
        println!("{}", serde_json::to_string(summary)?);
    } else {
        println!(
            "bar {:>4}  {:<12} {:>3}  {:>5.1} bpm  tension {:.2}  {:>3} events  {:>2} voices  peak {:.3}  rms {:.3}",
            summary.bar,
            summary.part,
            summary.part_bar,
            summary.bpm,
            summary.tension,
            summary.events,
            summary.voices,
            summary.peak,
            summary.rms,
        );
    }
    Ok(())
}
