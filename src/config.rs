//! Mixer configuration
//!
//! Unlike the teacher crate this library has no files or database of its
//! own to load from (Non-goals exclude persistence); `MixerConfig` is a
//! plain, `serde`-deserializable value a host application can populate
//! however it likes (TOML file, CLI flags, hard-coded) and hand to
//! [`crate::manager::StemManager::with_config`].

use serde::Deserialize;

/// Audio output chunk size, in stereo frames, used by [`crate::manager::StemManager::render`].
pub const AUDIO_CHUNK_SAMPLES: usize = 1024;

/// Silence-detection and waveform-rendering parameters.
///
/// Field defaults match spec §4.1/§4.2 exactly.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Amplitude below which a sample counts as silent (spec §4.1).
    pub silence_threshold: i16,

    /// Minimum run length, in frames, for a silent region to be recorded (spec §4.1).
    pub silence_min_length: u32,

    /// Waveform image width in pixels (spec §4.2).
    pub waveform_width: u32,

    /// Waveform image height in pixels (spec §4.2).
    pub waveform_height: u32,

    /// Waveform stroke color (RGBA), default opaque white (spec §4.2).
    pub waveform_color: [u8; 4],

    /// Alpha applied by the silence overlay pass, default 128 (spec §4.2).
    pub silence_overlay_alpha: u8,

    /// Maximum fetch attempts before a stem is marked errored (spec §4.3.4).
    pub fetch_max_attempts: u32,

    /// Delay between fetch retries, in milliseconds (spec §4.3.4).
    pub fetch_retry_delay_ms: u64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 400,
            silence_min_length: 100_000,
            waveform_width: 4096,
            waveform_height: 128,
            waveform_color: [255, 255, 255, 255],
            silence_overlay_alpha: 128,
            fetch_max_attempts: 4,
            fetch_retry_delay_ms: 3_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = MixerConfig::default();
        assert_eq!(cfg.silence_threshold, 400);
        assert_eq!(cfg.silence_min_length, 100_000);
        assert_eq!(cfg.waveform_width, 4096);
        assert_eq!(cfg.waveform_height, 128);
        assert_eq!(cfg.waveform_color, [255, 255, 255, 255]);
        assert_eq!(cfg.silence_overlay_alpha, 128);
    }

    #[test]
    fn deserializes_partial_toml_with_defaults() {
        let cfg: MixerConfig = toml::from_str("silence_overlay_alpha = 200\n").unwrap();
        assert_eq!(cfg.silence_overlay_alpha, 200);
        assert_eq!(cfg.waveform_width, 4096);
    }
}
