//! The session registry (§4.E): pairs a signaled call with a no-signaling
//! call and drives both lifecycles in lockstep. Indexed by both the
//! signaling call id and the NC id so either side can look the pair up
//! directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::config::MixerConfig;
use crate::device::DeviceRegistry;
use crate::endpoint::{PlaybackSource, SignalingCall};
use crate::error::{CoreError, CoreResult};
use crate::nosip_call::{NcState, NosipCall, Sdp};
use crate::pump::Pump;
use crate::sources::{PlayCount, WavFileSource};

/// Computed from a session's own state, never stored redundantly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Answered,
    NcCreated,
    Connected,
}

struct PlayHandle {
    file_name: String,
    previous_source: Arc<Mutex<dyn PlaybackSource>>,
}

struct Wiring {
    forward_writer: crate::device::DeviceHandle,
    forward_reader: crate::device::DeviceHandle,
    reverse_writer: crate::device::DeviceHandle,
    reverse_reader: crate::device::DeviceHandle,
    forward_pump: Pump,
    reverse_pump: Pump,
}

/// A signaling call paired with (eventually) a no-signaling call.
pub struct Session {
    sip_callid: String,
    signaling: Arc<dyn SignalingCall>,
    nosip_id: RwLock<Option<String>>,
    nc: Mutex<Option<NosipCall>>,
    connected: AtomicBool,
    play: Mutex<Option<PlayHandle>>,
    wiring: Mutex<Option<Wiring>>,
}

impl Session {
    fn new(signaling: Arc<dyn SignalingCall>) -> Self {
        Self {
            sip_callid: signaling.call_id().to_string(),
            signaling,
            nosip_id: RwLock::new(None),
            nc: Mutex::new(None),
            connected: AtomicBool::new(false),
            play: Mutex::new(None),
            wiring: Mutex::new(None),
        }
    }

    pub fn sip_callid(&self) -> &str {
        &self.sip_callid
    }

    pub fn nosip_id(&self) -> Option<String> {
        self.nosip_id.read().unwrap().clone()
    }

    pub fn peer_uri(&self) -> &str {
        self.signaling.peer_uri()
    }

    pub fn signaling(&self) -> Arc<dyn SignalingCall> {
        self.signaling.clone()
    }

    pub fn state(&self) -> SessionState {
        if self.connected.load(Ordering::Acquire) {
            SessionState::Connected
        } else if self.nc.lock().unwrap().is_some() {
            SessionState::NcCreated
        } else {
            SessionState::Answered
        }
    }

    pub fn playing_file(&self) -> Option<String> {
        self.play.lock().unwrap().as_ref().map(|p| p.file_name.clone())
    }

    fn create_nc(&self, nosip_id: &str, sample_rate: u32) -> CoreResult<Sdp> {
        if self.nc.lock().unwrap().is_some() {
            return Err(CoreError::Conflict(format!(
                "session {} already has a no-signaling leg",
                self.sip_callid
            )));
        }
        let nc = NosipCall::new(sample_rate)?;
        let sdp = nc.sdp().clone();
        *self.nc.lock().unwrap() = Some(nc);
        *self.nosip_id.write().unwrap() = Some(nosip_id.to_string());
        Ok(sdp)
    }

    fn connect(
        &self,
        remote_sdp: &str,
        config: &MixerConfig,
        devices: &DeviceRegistry,
    ) -> CoreResult<()> {
        if self.connected.load(Ordering::Acquire) {
            return Err(CoreError::Conflict(format!(
                "session {} is already connected",
                self.sip_callid
            )));
        }
        if remote_sdp.trim().is_empty() {
            return Err(CoreError::InvalidSdp("remote SDP is empty".to_string()));
        }
        let nc_guard = self.nc.lock().unwrap();
        let nc = nc_guard
            .as_ref()
            .ok_or_else(|| CoreError::NotFound(format!("no NC on session {}", self.sip_callid)))?;
        nc.accept()?;

        // Cancel any file play in flight before rewiring devices; connect
        // restores the session to a clean bridged state.
        *self.play.lock().unwrap() = None;

        let forward_name = format!("sip_to_nosip-{}", self.sip_callid);
        let reverse_name = format!("nosip_to_sip-{}", self.sip_callid);

        let forward_writer = devices.open_bridge(&forward_name, true)?;
        let forward_reader = devices.open_bridge(&forward_name, false)?;
        let reverse_writer = devices.open_bridge(&reverse_name, true)?;
        let reverse_reader = devices.open_bridge(&reverse_name, false)?;

        self.signaling.audio().set_playback("bridge", &forward_name);
        nc.audio().set_capture("bridge", &forward_name);
        nc.audio().set_playback("bridge", &reverse_name);
        self.signaling.audio().set_capture("bridge", &reverse_name);

        let nc_audio = nc.audio();
        forward_reader.set_capture(Arc::new(move |frame| nc_audio.deliver_capture(frame)));
        let sip_audio = self.signaling.audio();
        reverse_reader.set_capture(Arc::new(move |frame| sip_audio.deliver_capture(frame)));

        let frame_len = config.frame_len();
        let forward_pump = Pump::start(
            &forward_name,
            self.signaling.audio(),
            forward_writer.clone(),
            frame_len,
            config.ptime_ms,
        );
        let reverse_pump = Pump::start(
            &reverse_name,
            nc.audio(),
            reverse_writer.clone(),
            frame_len,
            config.ptime_ms,
        );

        *self.wiring.lock().unwrap() = Some(Wiring {
            forward_writer,
            forward_reader,
            reverse_writer,
            reverse_reader,
            forward_pump,
            reverse_pump,
        });

        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn play_start(&self, file: &str, audio_dir: &std::path::Path, sample_rate: u32, loop_forever: bool) -> CoreResult<()> {
        let nc_guard = self.nc.lock().unwrap();
        let nc = nc_guard
            .as_ref()
            .ok_or_else(|| CoreError::NotFound(format!("no NC on session {}", self.sip_callid)))?;
        let path = audio_dir.join(file);
        let source = WavFileSource::open(&path, sample_rate, PlayCount::from(loop_forever))?;
        let previous = nc.audio().playback_source();
        nc.set_source(Arc::new(Mutex::new(source)));
        *self.play.lock().unwrap() = Some(PlayHandle {
            file_name: file.to_string(),
            previous_source: previous,
        });
        Ok(())
    }

    fn play_stop(&self) -> CoreResult<()> {
        let mut play = self.play.lock().unwrap();
        let handle = play
            .take()
            .ok_or_else(|| CoreError::NotFound(format!("no active play on session {}", self.sip_callid)))?;
        if let Some(nc) = self.nc.lock().unwrap().as_ref() {
            nc.set_source(handle.previous_source);
        }
        Ok(())
    }

    fn teardown(&self, devices: &DeviceRegistry) {
        *self.play.lock().unwrap() = None;
        if let Some(wiring) = self.wiring.lock().unwrap().take() {
            drop(wiring.forward_pump);
            drop(wiring.reverse_pump);
            devices.close(&wiring.forward_writer);
            devices.close(&wiring.forward_reader);
            devices.close(&wiring.reverse_writer);
            devices.close(&wiring.reverse_reader);
        }
        if let Some(nc) = self.nc.lock().unwrap().take() {
            nc.close();
        }
        self.connected.store(false, Ordering::Release);
    }
}

/// Dual-indexed by sip_callid and nosip_id, both pointing at the same
/// shared `Session`.
#[derive(Default)]
pub struct SessionRegistry {
    by_sip: RwLock<HashMap<String, Arc<Session>>>,
    by_nosip: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_sip.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_sip.read().unwrap().is_empty()
    }

    /// Handles an incoming signaling call: auto-answers and creates the
    /// ANSWERED-state session. Fails with `Conflict` if the id is already
    /// in use.
    pub fn on_incoming(&self, signaling: Arc<dyn SignalingCall>) -> CoreResult<Arc<Session>> {
        let mut by_sip = self.by_sip.write().unwrap();
        let callid = signaling.call_id().to_string();
        if by_sip.contains_key(&callid) {
            return Err(CoreError::Conflict(format!("sip call {callid} already has a session")));
        }
        let session = Arc::new(Session::new(signaling));
        by_sip.insert(callid, session.clone());
        Ok(session)
    }

    pub fn find_by_sip(&self, sip_callid: &str) -> Option<Arc<Session>> {
        self.by_sip.read().unwrap().get(sip_callid).cloned()
    }

    pub fn find_by_nosip(&self, nosip_id: &str) -> Option<Arc<Session>> {
        self.by_nosip.read().unwrap().get(nosip_id).cloned()
    }

    pub fn create_no_signaling(
        &self,
        sip_callid: &str,
        nosip_id: &str,
        sample_rate: u32,
    ) -> CoreResult<Sdp> {
        if self.by_nosip.read().unwrap().contains_key(nosip_id) {
            return Err(CoreError::Conflict(format!("nc id {nosip_id} already in use")));
        }
        let session = self
            .find_by_sip(sip_callid)
            .ok_or_else(|| CoreError::NotFound(format!("sip call {sip_callid} not found")))?;
        let sdp = session.create_nc(nosip_id, sample_rate)?;
        self.by_nosip
            .write()
            .unwrap()
            .insert(nosip_id.to_string(), session);
        Ok(sdp)
    }

    pub fn connect(
        &self,
        sip_callid: &str,
        remote_sdp: &str,
        config: &MixerConfig,
        devices: &DeviceRegistry,
    ) -> CoreResult<()> {
        let session = self
            .find_by_sip(sip_callid)
            .ok_or_else(|| CoreError::NotFound(format!("sip call {sip_callid} not found")))?;
        session.connect(remote_sdp, config, devices)
    }

    pub fn play_start(
        &self,
        sip_callid: &str,
        file: &str,
        audio_dir: &std::path::Path,
        sample_rate: u32,
        loop_forever: bool,
    ) -> CoreResult<()> {
        let session = self
            .find_by_sip(sip_callid)
            .ok_or_else(|| CoreError::NotFound(format!("sip call {sip_callid} not found")))?;
        session.play_start(file, audio_dir, sample_rate, loop_forever)
    }

    pub fn play_stop(&self, sip_callid: &str) -> CoreResult<()> {
        let session = self
            .find_by_sip(sip_callid)
            .ok_or_else(|| CoreError::NotFound(format!("sip call {sip_callid} not found")))?;
        session.play_stop()
    }

    pub fn play_list(&self) -> Vec<String> {
        self.by_sip
            .read()
            .unwrap()
            .values()
            .filter(|s| s.playing_file().is_some())
            .map(|s| s.sip_callid().to_string())
            .collect()
    }

    /// Tears the session down: stops its pumps, closes its devices, frees
    /// its NC and play handle, and erases both index entries.
    pub fn hangup(&self, sip_callid: &str, devices: &DeviceRegistry) -> CoreResult<()> {
        let session = {
            let mut by_sip = self.by_sip.write().unwrap();
            by_sip
                .remove(sip_callid)
                .ok_or_else(|| CoreError::NotFound(format!("sip call {sip_callid} not found")))?
        };
        if let Some(nosip_id) = session.nosip_id() {
            self.by_nosip.write().unwrap().remove(&nosip_id);
        }
        session.teardown(devices);
        Ok(())
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.by_sip.read().unwrap().values().cloned().collect()
    }
}
