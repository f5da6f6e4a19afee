//! Reference [`super::VorbisDecoder`] using `symphonia`'s Vorbis codec,
//! reshaped from `wkmp-ap::audio::decoder::SimpleDecoder`'s probe/decode
//! loop to the fill-exactly-`out.len()` contract spec §6 requires (in
//! place of the original C++'s `stb_vorbis`).

use super::VorbisDecoder;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::warn;

pub struct SymphoniaVorbisDecoder;

impl VorbisDecoder for SymphoniaVorbisDecoder {
    fn decode(&self, bytes: &[u8], out: &mut [i16]) -> Result<usize, String> {
        let cursor = std::io::Cursor::new(bytes.to_vec());
        let mss = MediaSourceStream::new(Box::new(ReadOnlySource::new(cursor)), Default::default());

        let mut hint = Hint::new();
        hint.with_extension("ogg");

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| format!("failed to probe vorbis stream: {e}"))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
            .ok_or_else(|| "no audio track in vorbis stream".to_string())?;
        let track_id = track.id;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| format!("failed to create vorbis decoder: {e}"))?;

        let mut written = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    warn!("vorbis stream ended early: {e}");
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    written += copy_interleaved_i16(&decoded, &mut out[written..]);
                    if written >= out.len() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("skipped undecodable vorbis packet: {e}");
                }
            }
        }

        Ok(written)
    }
}

/// Copy as many interleaved stereo i16 frames from `decoded` into `out` as
/// fit, converting from the decoder's native sample format.
fn copy_interleaved_i16(decoded: &AudioBufferRef, out: &mut [i16]) -> usize {
    match decoded {
        AudioBufferRef::S16(buf) => {
            let right = if buf.spec().channels.count() > 1 { Some(buf.chan(1)) } else { None };
            copy_planar(buf.chan(0), right, out, |s| s)
        }
        AudioBufferRef::F32(buf) => {
            let right = if buf.spec().channels.count() > 1 { Some(buf.chan(1)) } else { None };
            copy_planar(buf.chan(0), right, out, |s: f32| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        }
        AudioBufferRef::F64(buf) => {
            let right = if buf.spec().channels.count() > 1 { Some(buf.chan(1)) } else { None };
            copy_planar(buf.chan(0), right, out, |s: f64| (s.clamp(-1.0, 1.0) * i16::MAX as f64) as i16)
        }
        AudioBufferRef::S32(buf) => {
            let right = if buf.spec().channels.count() > 1 { Some(buf.chan(1)) } else { None };
            copy_planar(buf.chan(0), right, out, |s: i32| (s >> 16) as i16)
        }
        _ => 0,
    }
}

fn copy_planar<T: Copy, F: Fn(T) -> i16>(
    left: &[T],
    right: Option<&[T]>,
    out: &mut [i16],
    convert: F,
) -> usize {
    let frames_available = left.len();
    let frames_capacity = out.len() / 2;
    let frames = frames_available.min(frames_capacity);

    for i in 0..frames {
        out[2 * i] = convert(left[i]);
        out[2 * i + 1] = match right {
            Some(r) => convert(r[i]),
            None => convert(left[i]),
        };
    }

    frames * 2
}
