//! The command surface (§4.G): one typed entry point per external command,
//! transport-independent. `Engine` is the context object the design notes
//! describe in place of the original source's process-wide singleton — it
//! owns the device registry, the mixer, the session registry, and the
//! mixer-source set, and is constructed once at startup and torn down once
//! at shutdown.
//!
//! Every method here runs on whatever thread the embedding application
//! calls it from; per §5 that is expected to be a single main/event thread,
//! but nothing in `Engine` itself assumes that — the registries it wraps
//! are already internally synchronized.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::device::DeviceRegistry;
use crate::endpoint::SignalingCall;
use crate::error::{CoreError, CoreResult};
use crate::mixer::Mixer;
use crate::mixer_source::MixerSourceSet;
use crate::nosip_call::{NosipCall, Sdp};
use crate::rtp::RtpCapabilities;
use crate::session::{SessionRegistry, SessionState};
use crate::status::{MixerSourceStatus, SessionStatus, StatusReport};

/// Owns every registry named in §2 and exposes the commands of §4.G.
pub struct Engine {
    config: CoreConfig,
    devices: DeviceRegistry,
    mixer: Mixer,
    sessions: SessionRegistry,
    mixer_sources: MixerSourceSet,
}

impl Engine {
    pub fn new(config: CoreConfig) -> CoreResult<Self> {
        config.validate().map_err(CoreError::Internal)?;
        Ok(Self {
            mixer: Mixer::new(config.mixer.clone()),
            devices: DeviceRegistry::new(),
            sessions: SessionRegistry::new(),
            mixer_sources: MixerSourceSet::new(),
            config,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Handles a signaling INCOMING event: auto-answers and opens an
    /// ANSWERED-state session for `call`.
    pub fn incoming_call(&self, call: Arc<dyn SignalingCall>) -> CoreResult<()> {
        let sip_callid = call.call_id().to_string();
        self.sessions.on_incoming(call)?;
        info!(sip_callid, "incoming call answered");
        Ok(())
    }

    pub fn nosip_call_create(&self, id: &str, sip_callid: &str) -> CoreResult<Sdp> {
        let sdp = self
            .sessions
            .create_no_signaling(sip_callid, id, self.config.mixer.sample_rate)?;
        info!(sip_callid, nosip_id = id, "no-signaling leg created");
        Ok(sdp)
    }

    pub fn nosip_call_connect(&self, id: &str, sip_callid: &str, remote_sdp: &str) -> CoreResult<()> {
        let session = self
            .sessions
            .find_by_sip(sip_callid)
            .ok_or_else(|| CoreError::NotFound(format!("sip call {sip_callid} not found")))?;
        if session.nosip_id().as_deref() != Some(id) {
            return Err(CoreError::NotFound(format!(
                "no-signaling leg {id} not found on sip call {sip_callid}"
            )));
        }
        self.sessions
            .connect(sip_callid, remote_sdp, &self.config.mixer, &self.devices)?;
        info!(sip_callid, nosip_id = id, "session connected");
        Ok(())
    }

    pub fn sip_call_hangup(&self, sip_callid: &str, reason: Option<&str>) -> CoreResult<()> {
        self.sessions.hangup(sip_callid, &self.devices)?;
        info!(sip_callid, reason = reason.unwrap_or("-"), "session torn down");
        Ok(())
    }

    pub fn play_start(&self, sip_callid: &str, file: &str, loop_forever: bool) -> CoreResult<()> {
        self.sessions.play_start(
            sip_callid,
            file,
            &self.config.audio_dir,
            self.config.mixer.sample_rate,
            loop_forever,
        )
    }

    pub fn play_stop(&self, sip_callid: &str) -> CoreResult<()> {
        self.sessions.play_stop(sip_callid)
    }

    pub fn play_list(&self) -> Vec<String> {
        self.sessions.play_list()
    }

    /// Allocates a throwaway probe NC, returns its SDP, then closes it —
    /// the command never leaves a live leg behind.
    pub fn rtp_capabilities(&self) -> CoreResult<Sdp> {
        let probe = NosipCall::new(self.config.mixer.sample_rate)?;
        probe.accept()?;
        let sdp = probe.sdp().clone();
        probe.close();
        Ok(sdp)
    }

    /// Structured sibling of [`Engine::rtp_capabilities`] (§11.1): the
    /// codec/header-extension/RTCP description this stack would negotiate
    /// for an NC with the given id, without allocating one.
    pub fn rtp_parameters(&self, nc_id: &str) -> RtpCapabilities {
        RtpCapabilities::for_nc(nc_id, &self.config)
    }

    pub fn mixer_source_add(
        &self,
        id: &str,
        sip_callid: Option<&str>,
        offer_sdp: &str,
    ) -> CoreResult<Sdp> {
        let sip_call = self.resolve_signaling_call(sip_callid)?;
        let answer = self.mixer_sources.add(
            id,
            sip_call,
            offer_sdp,
            &self.config.mixer,
            &self.devices,
            &self.mixer,
        )?;
        info!(id, "mixer source added");
        Ok(answer)
    }

    pub fn mixer_source_del(&self, id: &str) -> CoreResult<()> {
        self.mixer_sources.del(id, &self.devices)?;
        info!(id, "mixer source removed");
        Ok(())
    }

    pub fn mixer_source_enable(&self, id: &str, sip_callid: Option<&str>) -> CoreResult<()> {
        let sip_call = self.resolve_signaling_call(sip_callid)?;
        self.mixer_sources.enable(id, sip_call, &self.config.mixer)
    }

    pub fn mixer_source_disable(&self, id: &str) -> CoreResult<()> {
        self.mixer_sources.disable(id)
    }

    pub fn mixer_play(&self, filename: &str) -> CoreResult<()> {
        let path = self.config.audio_dir.join(filename);
        self.mixer.play_file(&path)
    }

    pub fn status(&self) -> StatusReport {
        let sessions = self
            .sessions
            .sessions()
            .into_iter()
            .map(|session| SessionStatus {
                sip_callid: session.sip_callid().to_string(),
                peer_uri: session.peer_uri().to_string(),
                nosip_id: session.nosip_id(),
                connected: session.state() == SessionState::Connected,
                playing: session.playing_file(),
            })
            .collect();

        let mixer_sources = self
            .mixer_sources
            .ids()
            .into_iter()
            .filter_map(|id| {
                let enabled = self.mixer_sources.enabled(&id).ok()?;
                let attached_sip_callid = self.mixer_sources.attached_sip_callid(&id).ok()?;
                Some(MixerSourceStatus {
                    id,
                    enabled,
                    attached_sip_callid,
                })
            })
            .collect();

        StatusReport {
            sessions,
            mixer_sources,
        }
    }

    fn resolve_signaling_call(
        &self,
        sip_callid: Option<&str>,
    ) -> CoreResult<Option<Arc<dyn SignalingCall>>> {
        match sip_callid {
            None => Ok(None),
            Some(id) => {
                let session = self.sessions.find_by_sip(id).ok_or_else(|| {
                    warn!(sip_callid = id, "mixer command referenced unknown sip call");
                    CoreError::NotFound(format!("sip call {id} not found"))
                })?;
                Ok(Some(session.signaling()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::test_support::RecordingEndpoint;
    use crate::endpoint::{AudioEndpoint, PlaybackSource};
    use crate::sources::SilenceSource;
    use std::sync::Mutex as StdMutex;

    struct FakeSignalingCall {
        id: String,
        peer: String,
        audio: Arc<RecordingEndpoint>,
    }

    impl SignalingCall for FakeSignalingCall {
        fn call_id(&self) -> &str {
            &self.id
        }
        fn peer_uri(&self) -> &str {
            &self.peer
        }
        fn audio(&self) -> Arc<dyn AudioEndpoint> {
            self.audio.clone()
        }
    }

    fn fake_call(id: &str) -> Arc<FakeSignalingCall> {
        let source: Arc<StdMutex<dyn PlaybackSource>> = Arc::new(StdMutex::new(SilenceSource));
        Arc::new(FakeSignalingCall {
            id: id.to_string(),
            peer: format!("sip:{id}@example.com"),
            audio: RecordingEndpoint::new(source),
        })
    }

    fn fast_engine() -> Engine {
        let mut config = CoreConfig::default();
        config.mixer.sample_rate = 500;
        config.mixer.ptime_ms = 4;
        Engine::new(config).unwrap()
    }

    #[test]
    fn s1_bridge_an_incoming_call() {
        let engine = fast_engine();
        engine.incoming_call(fake_call("A")).unwrap();

        let offer = engine.nosip_call_create("nc1", "A").unwrap();
        assert!(offer.is_audio_offer());

        engine
            .nosip_call_connect("nc1", "A", "v=0\r\nm=audio 0 RTP/AVP 0\r\n")
            .unwrap();

        let status = engine.status();
        assert_eq!(status.sessions.len(), 1);
        assert!(status.sessions[0].connected);
        assert!(engine.play_list().is_empty());
    }

    #[test]
    fn s6_duplicate_ids_are_conflicts() {
        let engine = fast_engine();
        engine.incoming_call(fake_call("A")).unwrap();
        engine.nosip_call_create("nc1", "A").unwrap();

        let result = engine.nosip_call_create("nc2", "A");
        assert!(matches!(result, Err(CoreError::Conflict(_))));

        engine
            .mixer_source_add("m1", None, "v=0\r\nm=audio 0 RTP/AVP 0\r\n")
            .unwrap();
        let result = engine.mixer_source_add("m1", None, "v=0\r\nm=audio 0 RTP/AVP 0\r\n");
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[test]
    fn s5_hangup_destroys_both_legs() {
        let engine = fast_engine();
        engine.incoming_call(fake_call("A")).unwrap();
        engine.nosip_call_create("nc1", "A").unwrap();
        engine
            .nosip_call_connect("nc1", "A", "v=0\r\nm=audio 0 RTP/AVP 0\r\n")
            .unwrap();

        engine.sip_call_hangup("A", Some("normal clearing")).unwrap();
        assert!(engine.status().sessions.is_empty());

        let result = engine.play_stop("A");
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn mixer_source_enable_with_unknown_sip_callid_is_not_found() {
        let engine = fast_engine();
        engine
            .mixer_source_add("m1", None, "v=0\r\nm=audio 0 RTP/AVP 0\r\n")
            .unwrap();
        let result = engine.mixer_source_enable("m1", Some("ghost"));
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn rtp_capabilities_returns_audio_sdp_without_leaking_a_leg() {
        let engine = fast_engine();
        let sdp = engine.rtp_capabilities().unwrap();
        assert!(sdp.is_audio_offer());

        let params = engine.rtp_parameters("probe1");
        assert_eq!(params.nc_id, "probe1");
        assert!(!params.codecs.is_empty());
    }

    #[test]
    fn nosip_call_connect_rejects_mismatched_nosip_id() {
        let engine = fast_engine();
        engine.incoming_call(fake_call("A")).unwrap();
        engine.nosip_call_create("nc1", "A").unwrap();

        let result = engine.nosip_call_connect("wrong-id", "A", "v=0\r\nm=audio 0 RTP/AVP 0\r\n");
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn mixer_play_delegates_to_mixer_file_playback() {
        let engine = fast_engine();
        let result = engine.mixer_play("does-not-exist.wav");
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
