//! The boundary between this crate and the signaling/RTP stack.
//!
//! Nothing in this crate decodes RTP, negotiates codecs, or parses session
//! descriptions beyond the minimal shape `nosip_call::Sdp` needs for its own
//! bookkeeping. A real deployment's audio/RTP stack implements
//! [`AudioEndpoint`] and hands the core a trait object; the core only ever
//! talks to it through device names and the two callbacks below.

use std::sync::{Arc, Mutex};

use crate::frame::Frame;

/// Produces one frame of decoded PCM on demand. A periodic pump polls this
/// once per ptime period and forwards the result to a virtual device.
pub trait PlaybackSource: Send {
    fn write_samples(&mut self, count: usize) -> Frame;
}

/// The contract an audio/RTP endpoint exposes so legs can be patched
/// together by device name instead of by reference (see `device` module).
pub trait AudioEndpoint: Send + Sync {
    /// Binds this endpoint's decoder output to a named device. The core
    /// spawns a pump that polls `playback_source()` and writes the result
    /// into the named device on the ptime clock.
    fn set_playback(&self, module: &str, device_name: &str);

    /// Binds this endpoint's encoder input to a named device. The core
    /// installs a tap on that device that calls `deliver_capture` whenever
    /// the device's producer writes a frame.
    fn set_capture(&self, module: &str, device_name: &str);

    /// The producer side consumed by a pump started via `set_playback`.
    fn playback_source(&self) -> Arc<Mutex<dyn PlaybackSource>>;

    /// Invoked by the tap installed via `set_capture`.
    fn deliver_capture(&self, frame: &Frame);
}

/// A handle to an externally signaled call: the core only needs its id,
/// a display URI for status reporting, and its audio endpoint.
pub trait SignalingCall: Send + Sync {
    fn call_id(&self) -> &str;
    fn peer_uri(&self) -> &str;
    fn audio(&self) -> Arc<dyn AudioEndpoint>;
}
