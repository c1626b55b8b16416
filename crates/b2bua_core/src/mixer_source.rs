//! The mixer-source set (§4.F): no-signaling legs attached as mixer
//! inputs, each with its own enable/disable bit and an optional routing
//! of a paired signaling leg's audio into the same slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::config::MixerConfig;
use crate::device::{DeviceHandle, DeviceRegistry};
use crate::endpoint::SignalingCall;
use crate::error::{CoreError, CoreResult};
use crate::mixer::Mixer;
use crate::nosip_call::{NosipCall, Sdp};
use crate::pump::Pump;

struct MixerSource {
    id: String,
    nc: NosipCall,
    device: DeviceHandle,
    nc_pump: Pump,
    sip_pump: Mutex<Option<Pump>>,
    attached_sip_callid: Mutex<Option<String>>,
    enabled: AtomicBool,
}

/// Collection of mixer sources, keyed by caller-chosen id.
#[derive(Default)]
pub struct MixerSourceSet {
    sources: RwLock<HashMap<String, Arc<MixerSource>>>,
}

impl MixerSourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sources.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().unwrap().is_empty()
    }

    /// Creates an NC accepting `offer_sdp`, attaches it to a fresh mix
    /// slot named `id`, and wires both directions: the mix is delivered to
    /// the NC, and what the NC sends is mixed in — the slot is enabled the
    /// moment its pump is attached, so it contributes and hears the mix
    /// immediately, with no separate enable call required. If `sip_call`
    /// is given, its leg also receives the mix (its own audio is not yet
    /// routed in — that happens via [`MixerSourceSet::enable`]).
    pub fn add(
        &self,
        id: &str,
        sip_call: Option<Arc<dyn SignalingCall>>,
        offer_sdp: &str,
        config: &MixerConfig,
        devices: &DeviceRegistry,
        mixer: &Mixer,
    ) -> CoreResult<Sdp> {
        if self.sources.read().unwrap().contains_key(id) {
            return Err(CoreError::Conflict(format!("mixer source {id} already exists")));
        }
        if offer_sdp.trim().is_empty() {
            return Err(CoreError::InvalidSdp("offer SDP is empty".to_string()));
        }

        let nc = NosipCall::new(config.sample_rate)?;
        nc.accept()?;
        let answer = nc.sdp().clone();

        let device = devices.open_mix_slot(id, mixer)?;

        let nc_audio = nc.audio();
        let sip_audio = sip_call.as_ref().map(|c| c.audio());
        device.set_capture(Arc::new(move |frame| {
            nc_audio.deliver_capture(frame);
            if let Some(sip_audio) = &sip_audio {
                sip_audio.deliver_capture(frame);
            }
        }));

        let nc_pump = Pump::start(
            id,
            nc.audio(),
            device.clone(),
            config.frame_len(),
            config.ptime_ms,
        );
        // The nc pump is attached as part of `add`, so the slot is live
        // from the start — matching the original's
        // `mixer_auplay_alloc`, which enables the source the moment its
        // player is attached rather than waiting for a separate command.
        device.enable(true);

        let source = Arc::new(MixerSource {
            id: id.to_string(),
            nc,
            device,
            nc_pump,
            sip_pump: Mutex::new(None),
            attached_sip_callid: Mutex::new(sip_call.as_ref().map(|c| c.call_id().to_string())),
            enabled: AtomicBool::new(true),
        });
        self.sources.write().unwrap().insert(id.to_string(), source);
        Ok(answer)
    }

    /// Flips the slot's enable bit on. When `sip_call` is given, also
    /// starts a pump that routes that leg's own audio into the slot.
    pub fn enable(
        &self,
        id: &str,
        sip_call: Option<Arc<dyn SignalingCall>>,
        config: &MixerConfig,
    ) -> CoreResult<()> {
        let source = self.find(id)?;
        source.device.enable(true);
        source.enabled.store(true, Ordering::Release);
        if let Some(sip_call) = sip_call {
            let mut sip_pump = source.sip_pump.lock().unwrap();
            if sip_pump.is_none() {
                *sip_pump = Some(Pump::start(
                    &format!("{id}-sip"),
                    sip_call.audio(),
                    source.device.clone(),
                    config.frame_len(),
                    config.ptime_ms,
                ));
            }
            *source.attached_sip_callid.lock().unwrap() = Some(sip_call.call_id().to_string());
        }
        Ok(())
    }

    /// Clears the slot's enable bit. Audio keeps flowing through the
    /// device layer but contributes silence and the tap is suppressed.
    pub fn disable(&self, id: &str) -> CoreResult<()> {
        let source = self.find(id)?;
        source.device.enable(false);
        source.enabled.store(false, Ordering::Release);
        Ok(())
    }

    pub fn enabled(&self, id: &str) -> CoreResult<bool> {
        let source = self.find(id)?;
        Ok(source.enabled.load(Ordering::Acquire))
    }

    pub fn attached_sip_callid(&self, id: &str) -> CoreResult<Option<String>> {
        let source = self.find(id)?;
        Ok(source.attached_sip_callid.lock().unwrap().clone())
    }

    pub fn del(&self, id: &str, devices: &DeviceRegistry) -> CoreResult<()> {
        let source = self
            .sources
            .write()
            .unwrap()
            .remove(id)
            .ok_or_else(|| CoreError::NotFound(format!("mixer source {id} not found")))?;
        *source.sip_pump.lock().unwrap() = None;
        devices.close(&source.device);
        source.nc.close();
        Ok(())
    }

    pub fn ids(&self) -> Vec<String> {
        self.sources.read().unwrap().keys().cloned().collect()
    }

    fn find(&self, id: &str) -> CoreResult<Arc<MixerSource>> {
        self.sources
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("mixer source {id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::test_support::RecordingEndpoint;
    use crate::frame::Frame;
    use crate::sources::SilenceSource;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn fast_config() -> MixerConfig {
        MixerConfig {
            sample_rate: 500,
            channels: 1,
            ptime_ms: 4,
        }
    }

    #[test]
    fn add_creates_source_and_returns_answer_sdp() {
        let devices = DeviceRegistry::new();
        let mixer = Mixer::new(fast_config());
        let set = MixerSourceSet::new();

        let answer = set
            .add("m1", None, "v=0\r\nm=audio 0 RTP/AVP 0\r\n", &fast_config(), &devices, &mixer)
            .unwrap();
        assert!(answer.is_audio_offer());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn duplicate_id_is_conflict() {
        let devices = DeviceRegistry::new();
        let mixer = Mixer::new(fast_config());
        let set = MixerSourceSet::new();
        set.add("m1", None, "v=0\r\nm=audio 0 RTP/AVP 0\r\n", &fast_config(), &devices, &mixer)
            .unwrap();
        let result = set.add("m1", None, "v=0\r\nm=audio 0 RTP/AVP 0\r\n", &fast_config(), &devices, &mixer);
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[test]
    fn del_removes_source_and_frees_device() {
        let devices = DeviceRegistry::new();
        let mixer = Mixer::new(fast_config());
        let set = MixerSourceSet::new();
        set.add("m1", None, "v=0\r\nm=audio 0 RTP/AVP 0\r\n", &fast_config(), &devices, &mixer)
            .unwrap();
        set.del("m1", &devices).unwrap();
        assert_eq!(set.len(), 0);
        assert!(!devices.contains("m1"));
    }

    #[test]
    fn del_unknown_id_is_not_found() {
        let devices = DeviceRegistry::new();
        let set = MixerSourceSet::new();
        let result = set.del("ghost", &devices);
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn add_enables_the_slot_immediately() {
        let devices = DeviceRegistry::new();
        let mixer = Mixer::new(fast_config());
        let set = MixerSourceSet::new();
        set.add("m1", None, "v=0\r\nm=audio 0 RTP/AVP 0\r\n", &fast_config(), &devices, &mixer)
            .unwrap();

        assert!(set.enabled("m1").unwrap(), "add should attach the pump already enabled");
    }

    #[test]
    fn three_added_sources_hear_everyone_but_themselves_with_no_explicit_enable() {
        let devices = DeviceRegistry::new();
        let config = fast_config();
        let mixer = Mixer::new(config.clone());
        let set = MixerSourceSet::new();

        set.add("m1", None, "v=0\r\nm=audio 0 RTP/AVP 0\r\n", &config, &devices, &mixer)
            .unwrap();
        set.add("m2", None, "v=0\r\nm=audio 0 RTP/AVP 0\r\n", &config, &devices, &mixer)
            .unwrap();
        set.add("m3", None, "v=0\r\nm=audio 0 RTP/AVP 0\r\n", &config, &devices, &mixer)
            .unwrap();

        let len = config.frame_len();
        devices.find("m1").unwrap().write(&Frame::from_samples(vec![100; len]));
        devices.find("m2").unwrap().write(&Frame::from_samples(vec![200; len]));
        devices.find("m3").unwrap().write(&Frame::from_samples(vec![300; len]));

        thread_sleep_for_one_period();

        let sources = set.sources.read().unwrap();
        let m1 = sources.get("m1").unwrap();
        let frame = m1
            .nc
            .last_captured()
            .expect("m1's tap should fire without a separate mixer_source_enable call");
        assert!(frame.samples.iter().all(|&s| s == 500), "m1 should hear m2+m3 but not itself");
    }

    fn thread_sleep_for_one_period() {
        std::thread::sleep(Duration::from_millis(20));
    }

    #[test]
    fn disable_then_enable_toggle_reported_state() {
        let devices = DeviceRegistry::new();
        let mixer = Mixer::new(fast_config());
        let set = MixerSourceSet::new();
        set.add("m1", None, "v=0\r\nm=audio 0 RTP/AVP 0\r\n", &fast_config(), &devices, &mixer)
            .unwrap();

        assert!(set.enabled("m1").unwrap());
        set.disable("m1").unwrap();
        assert!(!set.enabled("m1").unwrap());
        set.enable("m1", None, &fast_config()).unwrap();
        assert!(set.enabled("m1").unwrap());
    }

    #[test]
    fn enable_with_sip_call_routes_its_audio_in() {
        let devices = DeviceRegistry::new();
        let mixer = Mixer::new(fast_config());
        let set = MixerSourceSet::new();
        set.add("m1", None, "v=0\r\nm=audio 0 RTP/AVP 0\r\n", &fast_config(), &devices, &mixer)
            .unwrap();

        struct FakeCall {
            audio: Arc<RecordingEndpoint>,
        }
        impl SignalingCall for FakeCall {
            fn call_id(&self) -> &str {
                "A"
            }
            fn peer_uri(&self) -> &str {
                "sip:a@example.com"
            }
            fn audio(&self) -> Arc<dyn crate::endpoint::AudioEndpoint> {
                self.audio.clone()
            }
        }
        let source: Arc<StdMutex<dyn crate::endpoint::PlaybackSource>> =
            Arc::new(StdMutex::new(SilenceSource));
        let call: Arc<dyn SignalingCall> = Arc::new(FakeCall {
            audio: RecordingEndpoint::new(source),
        });

        set.enable("m1", Some(call), &fast_config()).unwrap();
        assert_eq!(set.attached_sip_callid("m1").unwrap(), Some("A".to_string()));
    }
}
