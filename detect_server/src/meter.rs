//! Request counters reported to the log.
//!
//! Handlers tick the global [`METER`], a background task logs and resets the counts every few
//! seconds.
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};

pub static METER: Meter = Meter::new();

/// Counters of handled requests since the last report.
#[derive(Default)]
pub struct Meter {
    uploads: AtomicU64,
    webcam_frames: AtomicU64,
    failures: AtomicU64,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            uploads: AtomicU64::new(0),
            webcam_frames: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn tick_upload(&self) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_webcam(&self) {
        self.webcam_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_reset_uploads(&self) -> u64 {
        self.uploads.swap(0, Ordering::Relaxed)
    }

    pub fn get_reset_webcam(&self) -> u64 {
        self.webcam_frames.swap(0, Ordering::Relaxed)
    }

    pub fn get_reset_failures(&self) -> u64 {
        self.failures.swap(0, Ordering::Relaxed)
    }
}

pub fn spawn_meter_logger() -> JoinHandle<()> {
    tokio::spawn(async {
        let mut log_interval = interval(Duration::from_secs(10));
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            log_interval.tick().await;

            let uploads = METER.get_reset_uploads();
            let webcam_frames = METER.get_reset_webcam();
            let failures = METER.get_reset_failures();
            let elapsed = start.elapsed().as_secs_f32();

            if uploads > 0 {
                log::info!("Uploads per second: {:.2}", uploads as f32 / elapsed)
            }
            if webcam_frames > 0 {
                log::info!("Webcam frames per second: {:.2}", webcam_frames as f32 / elapsed)
            }
            if failures > 0 {
                log::warn!("{failures} failed requests in the last {elapsed:.0}s")
            }
        }
    })
}
