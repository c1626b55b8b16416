//! The central mixer: a process-wide context object (not a singleton —
//! see the design note in the crate root) that sums enabled slots once per
//! ptime period and hands each slot back everyone's contribution but its
//! own.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::config::MixerConfig;
use crate::error::{CoreError, CoreResult};
use crate::frame::Frame;

pub type TapFn = Arc<dyn Fn(&Frame) + Send + Sync>;

struct FilePlayback {
    samples: VecDeque<i16>,
}

struct Slot {
    id: u64,
    enabled: AtomicBool,
    producer: Mutex<rtrb::Producer<Frame>>,
    consumer: Mutex<rtrb::Consumer<Frame>>,
    tap: Mutex<Option<TapFn>>,
}

/// A lightweight reference to one input of the mixer. Adding a slot attaches
/// it to the mixer's slot list; dropping the handle does not remove it —
/// call [`Mixer::remove_slot`] explicitly, matching the explicit-ownership
/// design (slots are owned by whatever called `add_slot`, not ref-counted
/// into oblivion).
#[derive(Clone)]
pub struct SlotHandle(Arc<Slot>);

impl SlotHandle {
    fn id(&self) -> u64 {
        self.0.id
    }
}

struct MixerInner {
    config: MixerConfig,
    slots: RwLock<Vec<Arc<Slot>>>,
    next_id: AtomicU64,
    file: Mutex<Option<FilePlayback>>,
    run: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// The mix engine (§4.B). Cheap to clone — every clone shares the same
/// slot list, file-playback state, and periodic-tick thread.
#[derive(Clone)]
pub struct Mixer(Arc<MixerInner>);

impl Mixer {
    pub fn new(config: MixerConfig) -> Self {
        let run = Arc::new(AtomicBool::new(true));
        let inner = Arc::new(MixerInner {
            config,
            slots: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            file: Mutex::new(None),
            run: run.clone(),
            thread: Mutex::new(None),
        });
        let mixer = Mixer(inner);

        let worker = mixer.clone();
        let handle = thread::Builder::new()
            .name("b2bua-mixer".into())
            .spawn(move || worker.run_loop())
            .expect("spawn mixer thread");
        *mixer.0.thread.lock() = Some(handle);
        mixer
    }

    pub fn config(&self) -> &MixerConfig {
        &self.0.config
    }

    pub fn slot_count(&self) -> usize {
        self.0.slots.read().len()
    }

    pub fn add_slot(&self) -> SlotHandle {
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        let (producer, consumer) = rtrb::RingBuffer::<Frame>::new(1);
        let slot = Arc::new(Slot {
            id,
            enabled: AtomicBool::new(false),
            producer: Mutex::new(producer),
            consumer: Mutex::new(consumer),
            tap: Mutex::new(None),
        });
        self.0.slots.write().push(slot.clone());
        SlotHandle(slot)
    }

    pub fn remove_slot(&self, handle: &SlotHandle) {
        self.0.slots.write().retain(|s| s.id != handle.id());
    }

    pub fn set_slot_tap(&self, handle: &SlotHandle, tap: TapFn) {
        *handle.0.tap.lock() = Some(tap);
    }

    pub fn set_slot_enabled(&self, handle: &SlotHandle, on: bool) {
        handle.0.enabled.store(on, Ordering::Release);
    }

    pub fn slot_enabled(&self, handle: &SlotHandle) -> bool {
        handle.0.enabled.load(Ordering::Acquire)
    }

    /// Producer side: deposit one frame into the slot's shallow ring. A
    /// producer faster than ptime drops the previously buffered frame
    /// rather than blocking (§4.B: "the oldest is dropped").
    pub fn slot_put(&self, handle: &SlotHandle, frame: Frame) {
        let mut producer = handle.0.producer.lock();
        if producer.push(frame.clone()).is_err() {
            let mut consumer = handle.0.consumer.lock();
            let _ = consumer.pop();
            drop(consumer);
            let _ = producer.push(frame);
        }
    }

    /// Opens a file for the mixer to blend into every period's sum. Exactly
    /// one file plays at a time; a later call replaces the earlier one.
    pub fn play_file(&self, path: &Path) -> CoreResult<()> {
        let reader = hound::WavReader::open(path)
            .map_err(|e| CoreError::NotFound(format!("{}: {e}", path.display())))?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(CoreError::Unsupported(format!(
                "{}: expected 16-bit PCM, found {}-bit {:?}",
                path.display(),
                spec.bits_per_sample,
                spec.sample_format
            )));
        }
        let samples: VecDeque<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<_, _>>()
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        *self.0.file.lock() = Some(FilePlayback { samples });
        Ok(())
    }

    fn read_file_chunk(&self, len: usize) -> Option<Vec<i16>> {
        let mut guard = self.0.file.lock();
        let file = guard.as_mut()?;
        if file.samples.is_empty() {
            *guard = None;
            return None;
        }
        let mut chunk = vec![0i16; len];
        for slot in chunk.iter_mut() {
            *slot = file.samples.pop_front().unwrap_or(0);
        }
        Some(chunk)
    }

    fn run_loop(&self) {
        let ptime = Duration::from_millis(self.0.config.ptime_ms as u64);
        let start = Instant::now();
        let mut ticks: u32 = 0;
        while self.0.run.load(Ordering::Acquire) {
            let deadline = start + ptime * ticks;
            let now = Instant::now();
            if now < deadline {
                thread::sleep((deadline - now).min(Duration::from_millis(2)));
                continue;
            }
            self.tick();
            ticks += 1;
        }
    }

    /// One output period: compute the saturating sum of every enabled
    /// slot's current frame (plus the active file, if any) exactly once,
    /// then deliver `sum - own_contribution` to each enabled slot's tap.
    /// This is the mixer's fundamental self-echo-exclusion policy — the
    /// sum is never recomputed per tap.
    fn tick(&self) {
        let len = self.0.config.frame_len();
        let slots: Vec<Arc<Slot>> = self.0.slots.read().clone();

        let mut sum = vec![0i32; len];
        let mut contributions: Vec<Vec<i16>> = Vec::with_capacity(slots.len());

        for slot in &slots {
            let enabled = slot.enabled.load(Ordering::Acquire);
            let contribution = if enabled {
                let mut consumer = slot.consumer.lock();
                match consumer.pop() {
                    Ok(frame) => frame.samples,
                    Err(_) => vec![0i16; len],
                }
            } else {
                vec![0i16; len]
            };
            if enabled {
                for (acc, &s) in sum.iter_mut().zip(contribution.iter()) {
                    *acc += s as i32;
                }
            }
            contributions.push(contribution);
        }

        if let Some(file_chunk) = self.read_file_chunk(len) {
            for (acc, &s) in sum.iter_mut().zip(file_chunk.iter()) {
                *acc += s as i32;
            }
        }

        for (slot, contribution) in slots.iter().zip(contributions.into_iter()) {
            if !slot.enabled.load(Ordering::Acquire) {
                continue;
            }
            let tap_guard = slot.tap.lock();
            let Some(tap) = tap_guard.as_ref() else {
                continue;
            };
            let mut out = vec![0i16; len];
            for i in 0..len {
                let v = sum[i] - contribution[i] as i32;
                out[i] = v.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            }
            tap(&Frame::from_samples(out));
        }
    }
}

impl Drop for MixerInner {
    fn drop(&mut self) {
        self.run.store(false, Ordering::Release);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}
