//! Offline stress probe for the DustPress engine.
//!
//! Streams a synthetic program through the engine at several sample rates
//! with jittered block sizes and swept controls, and writes per-sample
//! telemetry as CSV.
//!
//! ```text
//! dustpress-probe [--csv PATH] [--wav PATH] [--settings PATH] [--seconds N]
//! ```
use anyhow::{bail, Context, Result};
use dustpress::dsp::{DustPress, EngineSettings, TelemetrySample};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::f32::consts::PI;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

const SAMPLE_RATES: [f32; 3] = [44_100.0, 48_000.0, 96_000.0];
const WAV_RATE: f32 = 48_000.0;
const MIN_BLOCK: usize = 16;
const BLOCK_SPAN: u32 = 385;

struct Args {
    csv: PathBuf,
    wav: Option<PathBuf>,
    settings: Option<PathBuf>,
    seconds: f32,
}

fn parse_args() -> Result<Args> {
    let mut parsed = Args {
        csv: PathBuf::from("dustpress_probe.csv"),
        wav: None,
        settings: None,
        seconds: 3.0,
    };
    let mut args = std::env::args().skip(1);
    while let Some(flag) = args.next() {
        let mut value = || {
            args.next()
                .with_context(|| format!("missing value for '{}'", flag))
        };
        match flag.as_str() {
            "--csv" => parsed.csv = PathBuf::from(value()?),
            "--wav" => parsed.wav = Some(PathBuf::from(value()?)),
            "--settings" => parsed.settings = Some(PathBuf::from(value()?)),
            "--seconds" => {
                let raw = value()?;
                parsed.seconds = raw
                    .parse()
                    .with_context(|| format!("invalid --seconds value '{}'", raw))?;
            }
            other => bail!("unknown argument '{}'", other),
        }
    }
    if parsed.seconds <= 0.0 {
        bail!("--seconds must be positive");
    }
    Ok(parsed)
}

fn load_settings(path: Option<&PathBuf>) -> Result<EngineSettings> {
    let Some(path) = path else {
        return Ok(EngineSettings::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings '{}'", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse settings '{}'", path.display()))
}

/// Deterministic LCG shared by the stimulus noise and the block jitter.
struct Lcg(u32);

impl Lcg {
    fn next_u32(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.0
    }

    fn next_bipolar(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / 16_777_216.0 * 2.0 - 1.0
    }
}

/// 110 Hz + 880 Hz tones, noise, and a decaying 40 Hz thump every half second.
fn stimulus(frames: usize, sample_rate: f32, rng: &mut Lcg) -> (Vec<f32>, Vec<f32>) {
    let half_second = (sample_rate * 0.5) as usize;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for i in 0..frames {
        let t = i as f32 / sample_rate;
        let since_hit = (i % half_second) as f32 / sample_rate;
        let thump = (2.0 * PI * 40.0 * since_hit).sin() * (-since_hit * 25.0).exp() * 0.8;
        let tones = (2.0 * PI * 110.0 * t).sin() * 0.35 + (2.0 * PI * 880.0 * t).sin() * 0.15;
        let noise = rng.next_bipolar() * 0.05;
        left.push(tones + thump + noise);
        right.push(tones * 0.8 + thump - noise);
    }
    (left, right)
}

/// Slow control sweeps, evaluated once per block.
fn apply_sweeps(engine: &mut DustPress, position: f32) {
    let phase = 2.0 * PI * position;
    engine.set_drive_db(6.0 + 12.0 * (1.0 + phase.sin()));
    engine.set_bias(0.3 * (phase * 0.5).sin());
    engine.set_chaos(7.0 * (1.0 - (2.0 * position - 1.0).abs()));
    engine.set_env_to_drive_db(12.0 * (phase * 1.5).cos());
    engine.set_gate_comp(0.5 + 0.5 * (phase * 2.0).sin());
    engine.set_mix(0.5 + 0.5 * (phase * 0.75).cos());
    engine.set_curve_index(((position * 4.0) as u8).min(3));
}

struct RateSummary {
    sample_rate: f32,
    blocks: usize,
    peak: f32,
    lookahead: usize,
}

fn run_rate(
    sample_rate: f32,
    settings: &EngineSettings,
    seconds: f32,
    csv: &mut impl Write,
    mut wav: Option<&mut WavWriter<BufWriter<File>>>,
) -> Result<RateSummary> {
    let frames = (seconds * sample_rate) as usize;
    let mut rng = Lcg(0xD057_0001);
    let (in_l, in_r) = stimulus(frames, sample_rate, &mut rng);

    let mut engine = DustPress::with_settings(sample_rate, settings.clone());
    let max_block = MIN_BLOCK + BLOCK_SPAN as usize;
    let mut out_l = vec![0.0f32; max_block];
    let mut out_r = vec![0.0f32; max_block];
    let mut telemetry = vec![TelemetrySample::default(); max_block];

    let mut summary = RateSummary {
        sample_rate,
        blocks: 0,
        peak: 0.0,
        lookahead: engine.latency_samples(),
    };

    let mut start = 0;
    while start < frames {
        let block = (MIN_BLOCK + (rng.next_u32() >> 16) as usize % BLOCK_SPAN as usize)
            .min(frames - start);
        apply_sweeps(&mut engine, start as f32 / frames as f32);

        let end = start + block;
        engine.process_block_with_telemetry(
            &in_l[start..end],
            &in_r[start..end],
            &mut out_l[..block],
            &mut out_r[..block],
            &mut telemetry[..block],
        );

        for i in 0..block {
            let t = &telemetry[i];
            let out_peak = out_l[i].abs().max(out_r[i].abs());
            summary.peak = summary.peak.max(out_peak);
            writeln!(
                csv,
                "{},{},{},{:.4},{:.6},{:.6},{:.6},{:.6},{:.6}",
                sample_rate,
                start + i,
                summary.blocks,
                t.drive_db_applied,
                t.env,
                t.gate_gain,
                t.limiter_env,
                t.limiter_gain,
                out_peak
            )?;
            if let Some(writer) = wav.as_deref_mut() {
                writer.write_sample(out_l[i])?;
                writer.write_sample(out_r[i])?;
            }
        }

        if engine.latency_samples() != summary.lookahead {
            bail!("latency changed mid-stream at {} Hz", sample_rate);
        }
        summary.blocks += 1;
        start = end;
    }

    Ok(summary)
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let settings = load_settings(args.settings.as_ref())?;

    let file = File::create(&args.csv)
        .with_context(|| format!("failed to create '{}'", args.csv.display()))?;
    let mut csv = BufWriter::new(file);
    writeln!(
        csv,
        "sample_rate,sample,block,drive_db,env,gate_gain,limiter_env,limiter_gain,out_peak"
    )?;

    let mut wav = match &args.wav {
        Some(path) => {
            let spec = WavSpec {
                channels: 2,
                sample_rate: WAV_RATE as u32,
                bits_per_sample: 32,
                sample_format: SampleFormat::Float,
            };
            Some(
                WavWriter::create(path, spec)
                    .with_context(|| format!("failed to create '{}'", path.display()))?,
            )
        }
        None => None,
    };

    let mut summaries = Vec::with_capacity(SAMPLE_RATES.len());
    for &sample_rate in &SAMPLE_RATES {
        let writer = if sample_rate == WAV_RATE {
            wav.as_mut()
        } else {
            None
        };
        summaries.push(run_rate(sample_rate, &settings, args.seconds, &mut csv, writer)?);
    }
    csv.flush()?;
    if let Some(writer) = wav {
        writer.finalize().context("failed to finalize WAV")?;
    }

    println!("DustPress probe summary ('{}'):", args.csv.display());
    for s in &summaries {
        println!(
            "  {:>6} Hz : {:>5} blocks, peak {:.4}, lookahead {} samples",
            s.sample_rate, s.blocks, s.peak, s.lookahead
        );
    }
    Ok(())
}
