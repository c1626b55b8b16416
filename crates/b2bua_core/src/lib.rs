//! B2BUA audio core.
//!
//! Bridges real-time audio between an external telephony leg and an
//! internal no-signaling leg, and hosts a central mixer that lets many
//! no-signaling legs share a common mix. The signaling stack, the RTP/codec
//! stack, and command transport all live outside this crate; they are
//! consumed through the traits in [`endpoint`] and driven through the
//! typed entry points on [`Engine`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      main/event thread                        │
//! │  signaling events ──▶ Engine (§4.G) ◀── typed commands        │
//! │        │                  │                                   │
//! │        ▼                  ▼                                   │
//! │  SessionRegistry   MixerSourceSet                              │
//! │   (§4.E)                (§4.F)                                │
//! └────────┬───────────────────┬───────────────────────────────────┘
//!          │                   │
//!          ▼                   ▼
//!   DeviceRegistry (§4.A) ◀──────── Mixer (§4.B)
//!          ▲                              ▲
//!          │ device_write                 │ slot_put / tap
//!   Pump threads (§4.C, one per playback endpoint)
//! ```

mod config;
mod device;
mod endpoint;
mod engine;
mod error;
mod frame;
mod mixer;
mod mixer_source;
mod nosip_call;
mod pump;
mod rtp;
mod session;
mod sources;
mod status;

pub use config::{CoreConfig, MixerConfig};
pub use device::{DeviceHandle, DeviceRegistry};
pub use endpoint::{AudioEndpoint, PlaybackSource, SignalingCall};
pub use engine::Engine;
pub use error::{CoreError, CoreResult};
pub use frame::{Frame, Sample, CHANNELS, PTIME_MS, SAMPLE_RATE_DEFAULT, SAMPLE_RATE_LEGACY};
pub use mixer::{Mixer, SlotHandle, TapFn};
pub use mixer_source::MixerSourceSet;
pub use nosip_call::{NcState, NosipCall, Sdp};
pub use pump::Pump;
pub use rtp::{CodecCapability, HeaderExtension, RtcpInfo, RtpCapabilities};
pub use session::{Session, SessionRegistry, SessionState};
pub use sources::{PlayCount, SilenceSource, WavFileSource};
pub use status::{MixerSourceStatus, SessionStatus, StatusReport};
