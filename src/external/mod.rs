//! External collaborators (spec §6): narrow trait boundaries around the
//! network fetcher, Vorbis decoder, PNG encoder, and base64 encoder. The
//! core manager only ever depends on these traits; concrete adapters below
//! are reference implementations a host may swap out.

mod base64_adapter;
mod fetch_adapter;
mod vorbis_adapter;

pub use base64_adapter::StandardBase64Encoder;
pub use fetch_adapter::HttpFetcher;
pub use vorbis_adapter::SymphoniaVorbisDecoder;

/// Outcome of one synchronous fetch attempt (spec §6).
pub struct FetchResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
}

/// Synchronous GET with the retry policy living in the caller, not the
/// adapter (spec §4.3.4 drives the retry loop).
pub trait Fetcher: Send + Sync {
    fn fetch(&self, path: &str) -> Result<FetchResponse, String>;
}

/// Decodes a Vorbis payload into stereo interleaved 16-bit PCM, filling
/// `out` exactly or failing (spec §6).
pub trait VorbisDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], out: &mut [i16]) -> Result<usize, String>;
}

/// Encodes RGBA pixels as PNG bytes (spec §6).
pub trait PngEncoder: Send + Sync {
    fn encode_rgba(&self, image: &image::RgbaImage) -> Result<Vec<u8>, String>;
}

/// Encodes arbitrary bytes as a base64 string (spec §6).
pub trait Base64Encoder: Send + Sync {
    fn encode(&self, bytes: &[u8]) -> String;
}

/// Reference [`PngEncoder`] backed by the `image` crate.
pub struct ImagePngEncoder;

impl PngEncoder for ImagePngEncoder {
    fn encode_rgba(&self, image: &image::RgbaImage) -> Result<Vec<u8>, String> {
        crate::waveform::encode_png(image).map_err(|e| e.to_string())
    }
}
