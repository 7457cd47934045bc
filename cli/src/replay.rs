//! Replay a directory of PNG screenshots through the engine with a dry-run injector.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use argus_core::{
    Automation, CaptureRegion, DryRunInjector, Engine, EngineReport, Frame, FrameSource, load_config,
};
use async_trait::async_trait;
use png::{ColorType, Transformations};
use tracing::info;

use crate::error_chain;

/// Hands out a fixed set of frames round-robin, one per capture.
pub struct PngSequenceSource {
    frames: Arc<[Frame]>,
    cursor: AtomicUsize,
}

impl PngSequenceSource {
    pub fn new(frames: Arc<[Frame]>) -> Self {
        Self {
            frames,
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl FrameSource for PngSequenceSource {
    async fn capture(&self, _region: Option<CaptureRegion>) -> Option<Frame> {
        if self.frames.is_empty() {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.frames.len();
        Some(self.frames[i].clone())
    }
}

/// Decode one PNG into an RGBA frame.
pub fn decode_png(path: &Path) -> Result<Frame, String> {
    let file = File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let mut decoder = png::Decoder::new(BufReader::new(file));
    decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| format!("{}: {e}", path.display()))?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| format!("{}: {e}", path.display()))?;
    let data = &buf[..info.buffer_size()];

    let rgba: Vec<u8> = match info.color_type {
        ColorType::Rgba => data.to_vec(),
        ColorType::Rgb => data
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        ColorType::Grayscale => data.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        ColorType::GrayscaleAlpha => data
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        ColorType::Indexed => {
            return Err(format!("{}: palette was not expanded", path.display()));
        }
    };

    Frame::from_rgba(info.width, info.height, rgba).map_err(|e| format!("{}: {e}", path.display()))
}

/// Every `.png` in `dir`, decoded in file name order.
pub fn load_frames(dir: &Path) -> Result<Arc<[Frame]>, String> {
    let entries = std::fs::read_dir(dir).map_err(|e| format!("{}: {e}", dir.display()))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(format!("no .png frames in {}", dir.display()));
    }

    let frames = paths
        .iter()
        .map(|p| decode_png(p))
        .collect::<Result<Vec<_>, _>>()?;
    info!(frames = frames.len(), dir = %dir.display(), "loaded replay frames");
    Ok(frames.into())
}

pub async fn run(config_path: &Path, frames_dir: &Path, duration_secs: u64, json: bool) -> Result<(), String> {
    let config = load_config(config_path).map_err(|e| error_chain(&e))?;
    let frames = load_frames(frames_dir)?;

    let mut builder = Engine::builder(config.clone());
    for client in config.enabled_clients() {
        builder = builder.client(
            client.name.clone(),
            Arc::new(PngSequenceSource::new(Arc::clone(&frames))),
            Arc::new(DryRunInjector),
        );
    }
    let engine = builder.build();

    engine.start().await.map_err(|e| error_chain(&e))?;
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(duration_secs)) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
    let report = engine.shutdown().await.map_err(|e| error_chain(&e))?;

    if json {
        let out = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{out}");
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &EngineReport) {
    println!("queue: {}", report.queue);
    for client in &report.clients {
        let c = &client.counters;
        println!(
            "client {}: frames={} skipped={} missed_ticks={} triggered={} debounced={}",
            client.name, c.frames, c.frames_skipped, c.missed_ticks, c.probes_triggered, c.debounced
        );
        let e = &client.events;
        println!(
            "  events: executed={} failed={} throttled={} dropped={} evicted={}",
            e.executed, e.failed, e.throttled, e.dropped, e.evicted
        );
        if let Some(s) = &client.selector {
            println!(
                "  selector: sequences={} actions={} preemptions={} failures={}",
                s.sequences, s.actions, s.preemptions, s.failures
            );
        }
    }
}
