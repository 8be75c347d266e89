//! Offline capture pipeline: WAV file in, one outbound blob JSON per line out.
//!
//! Runs the same framing and encoding as live capture, which makes it handy
//! for replaying a recording into a session or inspecting wire payloads.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use lumi_core::{
    audio::downmix_into,
    buffering::{chunk::CHUNK_SIZE, framer::CaptureFramer},
    codec::wire::OUTBOUND_SAMPLE_RATE,
    engine::pipeline::encode_chunk,
};
use serde::Serialize;

#[derive(Debug)]
struct Args {
    input: PathBuf,
    chunk_size: usize,
    summary: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    input: String,
    source_sample_rate: u32,
    source_channels: u16,
    source_frames: usize,
    chunk_size: usize,
    blobs: usize,
    encoded_samples: usize,
    discarded_samples: usize,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("wav2blobs failed: {e}");
        std::process::exit(1);
    }
}

fn parse_args() -> Result<Args, String> {
    let mut input: Option<PathBuf> = None;
    let mut chunk_size = CHUNK_SIZE;
    let mut summary = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--input" | "-i" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --input".into());
                };
                input = Some(PathBuf::from(v));
            }
            "--chunk-size" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --chunk-size".into());
                };
                chunk_size = v
                    .parse::<usize>()
                    .map_err(|_| "invalid value for --chunk-size".to_string())?
                    .max(1);
            }
            "--summary" => summary = true,
            "--help" | "-h" => {
                println!(
                    "Usage: wav2blobs --input <file.wav> [--chunk-size <n>] [--summary]\n\n\
                     Prints one {{\"data\",\"mimeType\"}} JSON object per captured chunk.\n\
                     With --summary, prints a single JSON report instead."
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    let input = input.ok_or_else(|| "--input is required".to_string())?;
    Ok(Args {
        input,
        chunk_size,
        summary,
    })
}

/// Read a WAV file as interleaved f32 in [-1, 1].
fn read_wav_f32(path: &Path) -> Result<(Vec<f32>, hound::WavSpec), String> {
    let mut reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale).map_err(|e| e.to_string()))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok((samples, spec))
}

fn run() -> Result<(), String> {
    let args = parse_args()?;
    let (interleaved, spec) = read_wav_f32(&args.input)?;

    let channels = usize::from(spec.channels.max(1));
    let mut mono = Vec::with_capacity(interleaved.len() / channels);
    downmix_into(&interleaved, channels, |s| s, &mut mono);

    let mut framer = CaptureFramer::new(args.chunk_size, spec.sample_rate);
    let mut blobs = Vec::new();
    framer.push(&mono, |chunk| {
        blobs.push(encode_chunk(&chunk, OUTBOUND_SAMPLE_RATE));
    });
    let discarded_samples = framer.discard();

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if args.summary {
        let encoded_samples = blobs
            .iter()
            .map(|b| b.pcm_bytes().map(|p| p.len() / 2))
            .sum::<Result<usize, _>>()
            .map_err(|e| e.to_string())?;
        let summary = Summary {
            input: args.input.display().to_string(),
            source_sample_rate: spec.sample_rate,
            source_channels: spec.channels,
            source_frames: mono.len(),
            chunk_size: framer.chunk_size(),
            blobs: blobs.len(),
            encoded_samples,
            discarded_samples,
        };
        serde_json::to_writer_pretty(&mut out, &summary).map_err(|e| e.to_string())?;
        writeln!(out).map_err(|e| e.to_string())?;
    } else {
        for blob in &blobs {
            serde_json::to_writer(&mut out, blob).map_err(|e| e.to_string())?;
            writeln!(out).map_err(|e| e.to_string())?;
        }
    }

    out.flush().map_err(|e| e.to_string())
}
