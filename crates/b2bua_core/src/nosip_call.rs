//! The no-signaling (NC) call leg (§4.D): the internal half of a bridged
//! pair. Unlike the SIP leg, whose [`AudioEndpoint`](crate::endpoint::AudioEndpoint)
//! is supplied by an external signaling stack, an NC creates its own the
//! moment it is allocated — there is no external protocol machinery on
//! this side to hand one in.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::endpoint::{AudioEndpoint, PlaybackSource};
use crate::error::{CoreError, CoreResult};
use crate::frame::Frame;
use crate::sources::SilenceSource;

static NEXT_NC_ID: AtomicU64 = AtomicU64::new(1);

/// A minimal SDP body: just enough structure for NC's own offer/answer
/// bookkeeping. This is not a general session-description parser — codec
/// negotiation and the rest of the RTP stack live outside this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sdp(String);

impl Sdp {
    /// Builds a minimal, syntactically valid audio offer for `id` at
    /// `sample_rate`. Real payload-type/codec negotiation is out of scope;
    /// this exists so NC's own offer/answer contract (non-empty, contains
    /// an `m=audio` line) is satisfiable without a full SDP stack.
    pub fn audio_offer(id: &str, sample_rate: u32) -> Self {
        Sdp(format!(
            "v=0\r\n\
             o=b2bua-nc {id} 0 IN IP4 127.0.0.1\r\n\
             s=b2bua\r\n\
             c=IN IP4 127.0.0.1\r\n\
             t=0 0\r\n\
             m=audio 0 RTP/AVP 0\r\n\
             a=rtpmap:0 PCMU/{sample_rate}\r\n"
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_audio_offer(&self) -> bool {
        self.0.lines().any(|l| l.starts_with("m=audio"))
    }
}

impl std::fmt::Display for Sdp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an NC sits in its own lifecycle. A freshly created NC starts in
/// `Offered`; `accept` moves it to `Connected`. There is no `Answered`
/// state here — that vocabulary belongs to [`crate::session`], which
/// tracks the *pairing* of SIP and NC legs, not the NC leg itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NcState {
    Offered,
    Connected,
    Closed,
}

struct NcAudioEndpoint {
    source: Mutex<Arc<Mutex<dyn PlaybackSource>>>,
    last_capture: Mutex<Option<Frame>>,
}

impl AudioEndpoint for NcAudioEndpoint {
    fn set_playback(&self, _module: &str, _device_name: &str) {
        // NC's own playback source is swapped via `NosipCall::set_source`,
        // not by device name: there is no decoder to point at another
        // device, only whatever source the caller has installed.
    }

    fn set_capture(&self, _module: &str, _device_name: &str) {
        // Symmetric no-op: NC has no encoder; capture frames are recorded
        // for inspection via `deliver_capture` regardless of device name.
    }

    fn playback_source(&self) -> Arc<Mutex<dyn PlaybackSource>> {
        self.source.lock().unwrap().clone()
    }

    fn deliver_capture(&self, frame: &Frame) {
        *self.last_capture.lock().unwrap() = Some(frame.clone());
    }
}

/// A no-signaling call: allocated directly by the core (no SDP offer/answer
/// round trip with a remote peer), carrying its own audio endpoint.
pub struct NosipCall {
    id: String,
    state: Mutex<NcState>,
    offer: Sdp,
    endpoint: Arc<NcAudioEndpoint>,
}

impl NosipCall {
    /// Allocates a new NC with a fresh id and a silence-producing default
    /// source, returning its SDP offer. Mirrors `sync_nosip_call_alloc`'s
    /// immediate SDP generation on creation.
    pub fn new(sample_rate: u32) -> CoreResult<Self> {
        let seq = NEXT_NC_ID.fetch_add(1, Ordering::Relaxed);
        let id = format!("nc{seq}");
        let offer = Sdp::audio_offer(&id, sample_rate);
        let endpoint = Arc::new(NcAudioEndpoint {
            source: Mutex::new(Arc::new(Mutex::new(SilenceSource))),
            last_capture: Mutex::new(None),
        });
        Ok(Self {
            id,
            state: Mutex::new(NcState::Offered),
            offer,
            endpoint,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> NcState {
        *self.state.lock().unwrap()
    }

    pub fn sdp(&self) -> &Sdp {
        &self.offer
    }

    pub fn audio(&self) -> Arc<dyn AudioEndpoint> {
        self.endpoint.clone()
    }

    /// Replaces the playback source fed to any pump bound through
    /// `audio().playback_source()`.
    pub fn set_source(&self, source: Arc<Mutex<dyn PlaybackSource>>) {
        *self.endpoint.source.lock().unwrap() = source;
    }

    pub fn last_captured(&self) -> Option<Frame> {
        self.endpoint.last_capture.lock().unwrap().clone()
    }

    /// Moves the NC to `Connected`. Accepting an already-closed NC is a
    /// `Conflict`, matching the registry's rejection of transitions out of
    /// a terminal state.
    pub fn accept(&self) -> CoreResult<()> {
        let mut state = self.state.lock().unwrap();
        match *state {
            NcState::Offered => {
                *state = NcState::Connected;
                Ok(())
            }
            NcState::Connected => Ok(()),
            NcState::Closed => Err(CoreError::Conflict(format!(
                "nc {} is closed, cannot accept",
                self.id
            ))),
        }
    }

    pub fn close(&self) {
        *self.state.lock().unwrap() = NcState::Closed;
    }
}
