//! Concrete [`PlaybackSource`] implementations: silence and file playback.

use std::collections::VecDeque;
use std::path::Path;

use crate::endpoint::PlaybackSource;
use crate::error::{CoreError, CoreResult};
use crate::frame::Frame;

/// Always produces silence; the default source for a freshly created NC
/// before any real decode path or test injection is wired in.
pub struct SilenceSource;

impl PlaybackSource for SilenceSource {
    fn write_samples(&mut self, count: usize) -> Frame {
        Frame::silence(count)
    }
}

/// How many times a file play should repeat. `play_start`'s public
/// contract takes a plain bool; this is the internal representation the
/// original source's `-1 / 1` play count maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayCount {
    Once,
    Infinite,
}

impl From<bool> for PlayCount {
    fn from(loop_forever: bool) -> Self {
        if loop_forever {
            PlayCount::Infinite
        } else {
            PlayCount::Once
        }
    }
}

/// Reads 16-bit PCM WAV at the mixer's sample rate and feeds it to a pump
/// one frame at a time, looping or stopping per [`PlayCount`]. Once
/// exhausted (and not looping) it produces silence forever rather than
/// erroring — a pump never fails on its own account.
pub struct WavFileSource {
    original: Vec<i16>,
    remaining: VecDeque<i16>,
    play_count: PlayCount,
    exhausted: bool,
}

impl WavFileSource {
    pub fn open(path: &Path, expected_rate: u32, play_count: PlayCount) -> CoreResult<Self> {
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
        if spec.sample_rate != expected_rate {
            tracing::warn!(
                file = %path.display(),
                file_rate = spec.sample_rate,
                mixer_rate = expected_rate,
                "playback file sample rate does not match the mixer; no resampling is performed"
            );
        }
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<_, _>>()
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        let remaining = VecDeque::from(samples.clone());
        Ok(Self {
            original: samples,
            remaining,
            play_count,
            exhausted: false,
        })
    }
}

impl PlaybackSource for WavFileSource {
    fn write_samples(&mut self, count: usize) -> Frame {
        let mut out = vec![0i16; count];
        for slot in out.iter_mut() {
            if let Some(sample) = self.remaining.pop_front() {
                *slot = sample;
            } else if self.play_count == PlayCount::Infinite && !self.original.is_empty() {
                self.remaining = VecDeque::from(self.original.clone());
                *slot = self.remaining.pop_front().unwrap_or(0);
            } else {
                self.exhausted = true;
            }
        }
        Frame::from_samples(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_source_produces_zeros() {
        let mut source = SilenceSource;
        let frame = source.write_samples(160);
        assert!(frame.samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn play_count_from_bool() {
        assert_eq!(PlayCount::from(true), PlayCount::Infinite);
        assert_eq!(PlayCount::from(false), PlayCount::Once);
    }

    fn write_test_wav(path: &Path, samples: &[i16], rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn wav_source_plays_once_then_silence() {
        let dir = std::env::temp_dir().join(format!("b2bua-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tone_once.wav");
        write_test_wav(&path, &[1, 2, 3, 4], 8_000);

        let mut source = WavFileSource::open(&path, 8_000, PlayCount::Once).unwrap();
        let first = source.write_samples(4);
        assert_eq!(first.samples, vec![1, 2, 3, 4]);
        let second = source.write_samples(4);
        assert_eq!(second.samples, vec![0, 0, 0, 0]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn wav_source_loops_when_infinite() {
        let dir = std::env::temp_dir().join(format!("b2bua-test-loop-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tone_loop.wav");
        write_test_wav(&path, &[10, 20], 8_000);

        let mut source = WavFileSource::open(&path, 8_000, PlayCount::Infinite).unwrap();
        let first = source.write_samples(2);
        let second = source.write_samples(2);
        assert_eq!(first.samples, vec![10, 20]);
        assert_eq!(second.samples, vec![10, 20]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn wav_source_rejects_non_16_bit() {
        let dir = std::env::temp_dir().join(format!("b2bua-test-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0.5f32).unwrap();
        writer.finalize().unwrap();

        let result = WavFileSource::open(&path, 8_000, PlayCount::Once);
        assert!(matches!(result, Err(CoreError::Unsupported(_))));

        std::fs::remove_file(&path).ok();
    }
}
