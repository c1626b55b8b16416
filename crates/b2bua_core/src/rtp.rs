//! Structured RTP capability/parameter reporting (§11.1). `rtp_capabilities`
//! keeps its distilled-spec contract of returning raw SDP; this module adds
//! a parsed view alongside it for callers that want structure without
//! re-parsing SDP themselves.

use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecCapability {
    pub name: String,
    pub payload_type: u8,
    pub clock_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderExtension {
    pub uri: String,
    pub id: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcpInfo {
    pub cname: String,
    pub mux: bool,
    pub reduced_size: bool,
}

/// A parsed description of what this stack is willing to negotiate for one
/// no-signaling call, grounded in the original source's `rtp_parameters.c`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpCapabilities {
    pub nc_id: String,
    pub codecs: Vec<CodecCapability>,
    pub header_extensions: Vec<HeaderExtension>,
    pub rtcp: RtcpInfo,
}

impl RtpCapabilities {
    /// Builds the capability set this stack offers: PCMU/PCMA at the
    /// configured sample rate, the audio-level header extension gated on
    /// `config.rtp_audio_level`, and an RTCP profile with mux and
    /// reduced-size reports enabled.
    pub fn for_nc(nc_id: &str, config: &CoreConfig) -> Self {
        let rate = config.mixer.sample_rate;
        let mut codecs = vec![
            CodecCapability {
                name: "PCMU".to_string(),
                payload_type: 0,
                clock_rate: rate,
                channels: config.mixer.channels,
            },
            CodecCapability {
                name: "PCMA".to_string(),
                payload_type: 8,
                clock_rate: rate,
                channels: config.mixer.channels,
            },
        ];
        codecs.sort_by_key(|c| c.payload_type);

        let mut header_extensions = Vec::new();
        if config.rtp_audio_level {
            header_extensions.push(HeaderExtension {
                uri: "urn:ietf:params:rtp-hdrext:ssrc-audio-level".to_string(),
                id: 1,
            });
        }

        RtpCapabilities {
            nc_id: nc_id.to_string(),
            codecs,
            header_extensions,
            rtcp: RtcpInfo {
                cname: format!("b2bua-{nc_id}"),
                mux: true,
                reduced_size: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_level_extension_is_gated_on_config() {
        let mut config = CoreConfig::default();
        let off = RtpCapabilities::for_nc("probe1", &config);
        assert!(off.header_extensions.is_empty());

        config.rtp_audio_level = true;
        let on = RtpCapabilities::for_nc("probe1", &config);
        assert_eq!(on.header_extensions.len(), 1);
        assert_eq!(
            on.header_extensions[0].uri,
            "urn:ietf:params:rtp-hdrext:ssrc-audio-level"
        );
    }

    #[test]
    fn codecs_reflect_mixer_sample_rate() {
        let config = CoreConfig::default();
        let caps = RtpCapabilities::for_nc("probe1", &config);
        assert!(caps.codecs.iter().all(|c| c.clock_rate == config.mixer.sample_rate));
        assert_eq!(caps.codecs[0].payload_type, 0);
        assert_eq!(caps.codecs[1].payload_type, 8);
    }
}
