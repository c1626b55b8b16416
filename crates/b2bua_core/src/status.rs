//! Structured `status()` reporting (§11.2). The distilled spec only
//! promises a textual report; this keeps that textual contract via
//! `Display` while giving callers a structured form underneath.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub sip_callid: String,
    pub peer_uri: String,
    pub nosip_id: Option<String>,
    pub connected: bool,
    pub playing: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerSourceStatus {
    pub id: String,
    pub enabled: bool,
    pub attached_sip_callid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub sessions: Vec<SessionStatus>,
    pub mixer_sources: Vec<MixerSourceStatus>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sessions: {}", self.sessions.len())?;
        for session in &self.sessions {
            writeln!(
                f,
                "  {} <-> {} peer={} connected={} playing={}",
                session.sip_callid,
                session.nosip_id.as_deref().unwrap_or("-"),
                session.peer_uri,
                session.connected,
                session.playing.as_deref().unwrap_or("-"),
            )?;
        }
        writeln!(f, "mixer sources: {}", self.mixer_sources.len())?;
        for source in &self.mixer_sources {
            writeln!(
                f,
                "  {} enabled={} sip_callid={}",
                source.id,
                source.enabled,
                source.attached_sip_callid.as_deref().unwrap_or("-"),
            )?;
        }
        Ok(())
    }
}
