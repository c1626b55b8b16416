//! The periodic pump (§4.C): one worker thread per playback endpoint that
//! polls a [`PlaybackSource`] once per ptime period and writes the result
//! into a named device. Mirrors the monotonic-deadline scheduling in
//! [`crate::mixer::Mixer::run_loop`] and the original's `mixer_auplay.c`
//! write thread: compute the next deadline from a fixed start instant and
//! a tick count, sleep toward it, and skip (never retime) a period that
//! was already missed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::device::DeviceHandle;
use crate::endpoint::{AudioEndpoint, PlaybackSource};

/// Owns the worker thread feeding one device from one [`PlaybackSource`].
/// Dropping it stops the thread and joins it.
pub struct Pump {
    run: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Pump {
    /// `endpoint` is polled for its current `playback_source()` on every
    /// tick rather than once at start-up, so a source swapped in later
    /// (e.g. `play_start`'s file source replacing a no-signaling leg's
    /// default silence) is picked up by the next period without
    /// restarting the pump.
    pub fn start(
        name: &str,
        endpoint: Arc<dyn AudioEndpoint>,
        device: DeviceHandle,
        frame_len: usize,
        ptime_ms: u32,
    ) -> Self {
        let run = Arc::new(AtomicBool::new(true));
        let run_thread = run.clone();
        let thread_name = format!("b2bua-pump-{name}");
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let ptime = Duration::from_millis(ptime_ms as u64);
                let start = Instant::now();
                let mut ticks: u32 = 0;
                while run_thread.load(Ordering::Acquire) {
                    let deadline = start + ptime * ticks;
                    let now = Instant::now();
                    if now < deadline {
                        thread::sleep((deadline - now).min(Duration::from_millis(2)));
                        continue;
                    }
                    let frame = endpoint
                        .playback_source()
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .write_samples(frame_len);
                    device.write(&frame);
                    ticks += 1;
                }
            })
            .expect("spawn pump thread");
        Self {
            run,
            thread: Mutex::new(Some(handle)),
        }
    }

    pub fn stop(&self) {
        self.run.store(false, Ordering::Release);
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Pump {
    fn drop(&mut self) {
        self.stop();
    }
}
