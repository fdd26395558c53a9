//! Poll a screen region on a fixed cadence
//!
//! Usage: poll_region [--mock] [x y width height] [ticks]
//!
//! Captures the region every 16ms, counting new frames, ticks without a new
//! frame and re-initializations after access loss. With `--mock` the
//! in-memory backend stands in for the display.

use dupcap::capture::mock::{AcquireOutcome, MockBackend};
use dupcap::{
    capabilities, CaptureBackend, CaptureRegion, CaptureSession, FailureKind, FrameView,
    PlatformBackend,
};
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_millis(16);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let use_mock = match args.iter().position(|a| a == "--mock") {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    };

    let numbers: Vec<i64> = args.iter().filter_map(|a| a.parse().ok()).collect();
    let region = match numbers.as_slice() {
        [x, y, w, h, ..] => CaptureRegion::new(*x as i32, *y as i32, *w as u32, *h as u32),
        _ => CaptureRegion::new(0, 0, 256, 256),
    };
    let ticks = numbers.get(4).copied().unwrap_or(120) as u32;

    println!("dupcap region poller");
    println!("====================\n");
    println!("Capabilities: {}", capabilities());

    if use_mock {
        let backend = MockBackend::new(1920, 1080);
        // Every fifth tick has no new frame; one access loss halfway through
        let handle = backend.handle();
        for tick in 0..ticks {
            let outcome = match tick {
                t if t == ticks / 2 => AcquireOutcome::AccessLost,
                t if t % 5 == 4 => AcquireOutcome::NoFrame,
                _ => AcquireOutcome::Frame,
            };
            handle.script_acquire(&[outcome]);
        }
        poll(CaptureSession::new(backend), region, ticks)
    } else {
        poll(CaptureSession::new(PlatformBackend::new()), region, ticks)
    }
}

fn poll<B: CaptureBackend>(
    mut session: CaptureSession<B>,
    region: CaptureRegion,
    ticks: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    session.init(0)?;
    println!(
        "Output 0 via {}: {}x{}",
        session.implementation_name(),
        session.width(),
        session.height()
    );
    println!("Polling {:?} for {} ticks\n", region, ticks);

    let mut buffer = vec![0u8; region.byte_len().ok_or("region too large")?];
    let mut reinits = 0;
    let start = Instant::now();

    for _ in 0..ticks {
        let tick_start = Instant::now();

        match session.capture(region, &mut buffer) {
            Ok(captured) => {
                let frame = FrameView::from_captured(&buffer, &captured)?;
                if let Some(center) = frame.rgb(captured.width / 2, captured.height / 2) {
                    log::debug!("center pixel {:?}", center);
                }
                if captured.is_partial() {
                    log::debug!("clamped to {}x{}", captured.width, captured.height);
                }
            }
            Err(e) => match e.kind() {
                FailureKind::Transient => {}
                FailureKind::Recoverable => println!("⚠️ Capture failed: {}", e),
                FailureKind::Fatal => {
                    println!("⚠️ {}, re-initializing", e);
                    session.init(0)?;
                    reinits += 1;
                }
            },
        }

        if let Some(rest) = TICK.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let elapsed = start.elapsed();
    let stats = session.stats();

    println!("\nPolling Statistics:");
    println!("  Duration: {:?}", elapsed);
    println!("  Captures: {}", stats.total_captures);
    println!("  New frames: {}", stats.successful_captures);
    println!("  No new frame: {}", stats.unavailable_frames);
    println!("  Failed: {}", stats.failed_captures);
    println!("  Re-initializations: {}", reinits);
    println!("  Staging allocations: {}", stats.staging_allocations);
    println!("  Bytes copied: {}", stats.total_bytes_copied);
    println!("  Success rate: {:.1}%", stats.success_rate());

    session.cleanup();
    Ok(())
}
