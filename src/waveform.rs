//! Waveform rasterization and PNG encoding (spec §4.2).
//!
//! Grounded on `waveform-renderer.cpp`'s column mapping and alpha
//! compositing, redrawn against the `image` crate's `RgbaImage` instead of
//! `lodepng`.

use crate::silence::SilenceInterval;
use image::{Rgba, RgbaImage};

/// Configuration for one waveform render (spec §4.2 "Operations: configure
/// output size, waveform RGBA color, silence overlay alpha").
#[derive(Debug, Clone, Copy)]
pub struct WaveformRenderer {
    width: u32,
    height: u32,
    waveform_color: [u8; 4],
    silence_alpha: u8,
}

impl Default for WaveformRenderer {
    fn default() -> Self {
        Self {
            width: 4096,
            height: 128,
            waveform_color: [255, 255, 255, 255],
            silence_alpha: 128,
        }
    }
}

impl WaveformRenderer {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_waveform_color(mut self, color: [u8; 4]) -> Self {
        self.waveform_color = color;
        self
    }

    pub fn with_silence_alpha(mut self, alpha: u8) -> Self {
        self.silence_alpha = alpha;
        self
    }

    /// End of the sample range covered by column `x`, per spec §4.2:
    /// `end_x = round(((x+1)/W) * track_length)`.
    fn column_end(&self, x: u32, track_length: u32) -> u32 {
        let fraction = (x + 1) as f64 / self.width as f64;
        (fraction * track_length as f64).round() as u32
    }

    /// Map a sample peak to a pixel row, per spec §4.2:
    /// `row(v) = min(H-1, round((32767 - v) / 65535 * H))`.
    fn peak_to_row(&self, peak: i32) -> u32 {
        let row = ((32767.0 - peak as f64) / 65535.0 * self.height as f64).round() as i64;
        row.clamp(0, self.height as i64 - 1) as u32
    }

    /// Render this stem's waveform + silence overlay against the full
    /// track timeline and return an RGBA image (spec §4.2).
    pub fn render(
        &self,
        pcm: &[i16],
        samples: u32,
        offset: i32,
        track_length: u32,
        silences: &[SilenceInterval],
    ) -> RgbaImage {
        let mut image = RgbaImage::from_pixel(self.width, self.height, Rgba([0, 0, 0, 0]));
        self.draw_waveform(&mut image, pcm, samples, offset, track_length);
        self.draw_silence_overlay(&mut image, samples, offset, track_length, silences);
        image
    }

    fn draw_waveform(
        &self,
        image: &mut RgbaImage,
        pcm: &[i16],
        samples: u32,
        offset: i32,
        track_length: u32,
    ) {
        let mut start = 0u32;
        let color = Rgba(self.waveform_color);

        for x in 0..self.width {
            let end = self.column_end(x, track_length);
            let (hi_peak, low_peak) = self.column_peaks(start, end, offset, pcm, samples);

            let hi_row = self.peak_to_row(hi_peak);
            let low_row = self.peak_to_row(low_peak);
            for y in hi_row..=low_row {
                image.put_pixel(x, y, color);
            }

            start = end;
        }
    }

    /// Compute `(hi_peak, low_peak)` across both channels for the local
    /// sample range `[start, end)` in timeline space (spec §4.2).
    fn column_peaks(
        &self,
        start: u32,
        end: u32,
        offset: i32,
        pcm: &[i16],
        samples: u32,
    ) -> (i32, i32) {
        if start >= end {
            return (0, 0);
        }

        let mut hi_peak = i32::MIN;
        let mut low_peak = i32::MAX;
        let mut touched = false;

        for sample in start..end {
            let stem_sample = sample as i64 - offset as i64;
            if stem_sample < 0 || stem_sample >= samples as i64 {
                continue;
            }
            let idx = stem_sample as usize;
            let left = pcm[2 * idx] as i32;
            let right = pcm[2 * idx + 1] as i32;

            hi_peak = hi_peak.max(left).max(right);
            low_peak = low_peak.min(left).min(right);
            touched = true;
        }

        if touched {
            (hi_peak, low_peak)
        } else {
            (0, 0)
        }
    }

    /// Compose the translucent silence overlay over every column fully
    /// contained in a silent region (spec §4.2).
    fn draw_silence_overlay(
        &self,
        image: &mut RgbaImage,
        samples: u32,
        offset: i32,
        track_length: u32,
        silences: &[SilenceInterval],
    ) {
        let mut column = 0u32;

        if offset >= 0 {
            self.draw_silence_region(image, track_length, &mut column, 0, offset as u32);
        }

        for interval in silences {
            let end = interval.end as i64 + offset as i64;
            if end >= 0 {
                let start = (interval.start as i64 + offset as i64).max(0) as u32;
                self.draw_silence_region(image, track_length, &mut column, start, end as u32);
            }
        }

        let post_stem_start = samples as i64 + offset as i64;
        if track_length as i64 > post_stem_start {
            let start = post_stem_start.max(0) as u32;
            self.draw_silence_region(image, track_length, &mut column, start, track_length);
        }
    }

    /// Walk the column cursor forward, painting every column fully
    /// contained in `[silence_start, silence_end)` (spec §4.2: "A column x
    /// is painted ... iff the silent region contains [start_x, end_x)
    /// entirely").
    fn draw_silence_region(
        &self,
        image: &mut RgbaImage,
        track_length: u32,
        column: &mut u32,
        silence_start: u32,
        silence_end: u32,
    ) {
        let over = Rgba([0, 0, 0, self.silence_alpha]);

        let mut column_start = if *column == 0 {
            0
        } else {
            self.column_end(*column - 1, track_length)
        };
        let mut column_end = self.column_end(*column, track_length);

        while column_end < silence_end {
            if *column >= self.width {
                break;
            }
            if silence_start <= column_start {
                for y in 0..self.height {
                    let blended = alpha_over(*image.get_pixel(*column, y), over);
                    image.put_pixel(*column, y, blended);
                }
            }

            *column += 1;
            column_start = column_end;
            column_end = self.column_end(*column, track_length);
        }
    }
}

/// Standard source-over alpha compositing, normalized-alpha math per spec
/// §4.2: `a = a_s + a_d*(1-a_s)`, `c = (c_s*a_s + c_d*a_d*(1-a_s)) / a`.
fn alpha_over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let src_a = src.0[3] as f64 / 255.0;
    let dst_a = dst.0[3] as f64 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);

    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let blended =
            (src.0[c] as f64 * src_a + dst.0[c] as f64 * dst_a * (1.0 - src_a)) / out_a;
        out[c] = blended as u8;
    }
    out[3] = (out_a * 255.0).round() as u8;
    Rgba(out)
}

/// Encode an RGBA image as PNG bytes (spec §6 PNG encoder).
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, crate::error::WaveformError> {
    let mut bytes = Vec::new();
    image
        .write_with_encoder(image::codecs::png::PngEncoder::new(&mut bytes))
        .map_err(|e| crate::error::WaveformError::Encode(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_to_row_maps_zero_to_half_height() {
        let renderer = WaveformRenderer::default();
        assert_eq!(renderer.peak_to_row(0), 64);
    }

    #[test]
    fn peak_to_row_max_positive_maps_to_row_zero() {
        let renderer = WaveformRenderer::default();
        assert_eq!(renderer.peak_to_row(32767), 0);
    }

    #[test]
    fn peak_to_row_max_negative_clamped_to_last_row() {
        let renderer = WaveformRenderer::default();
        assert_eq!(renderer.peak_to_row(-32768), 127);
    }

    #[test]
    fn column_peaks_empty_range_is_zero() {
        let renderer = WaveformRenderer::default();
        let (hi, lo) = renderer.column_peaks(5, 5, 0, &[], 0);
        assert_eq!((hi, lo), (0, 0));
    }

    #[test]
    fn column_peaks_out_of_stem_range_is_zero() {
        let renderer = WaveformRenderer::default();
        let pcm = vec![1000i16, -1000i16];
        // column covers timeline samples [0, 10) but offset shifts stem
        // entirely beyond the requested range.
        let (hi, lo) = renderer.column_peaks(0, 10, 100, &pcm, 1);
        assert_eq!((hi, lo), (0, 0));
    }

    #[test]
    fn column_peaks_picks_hi_and_lo_across_channels() {
        let renderer = WaveformRenderer::default();
        // two frames: (100, -200), (300, -50)
        let pcm = vec![100i16, -200, 300, -50];
        let (hi, lo) = renderer.column_peaks(0, 2, 0, &pcm, 2);
        assert_eq!((hi, lo), (300, -200));
    }

    #[test]
    fn alpha_over_opaque_destination() {
        let dst = Rgba([100, 100, 100, 255]);
        let over = Rgba([0, 0, 0, 128]);
        let blended = alpha_over(dst, over);
        // source-over on fully opaque dst: result alpha stays 255, channels
        // shift toward the overlay color proportionally to its alpha.
        assert_eq!(blended.0[3], 255);
        let expected = (0.0 * (128.0 / 255.0) + 100.0 * 1.0 * (1.0 - 128.0 / 255.0)) as u8;
        assert!((blended.0[0] as i32 - expected as i32).abs() <= 1);
    }

    #[test]
    fn alpha_over_transparent_destination_yields_overlay() {
        let dst = Rgba([0, 0, 0, 0]);
        let over = Rgba([10, 20, 30, 128]);
        let blended = alpha_over(dst, over);
        assert_eq!(blended.0[3], 128);
        assert_eq!(blended.0[0], 10);
        assert_eq!(blended.0[1], 20);
        assert_eq!(blended.0[2], 30);
    }

    #[test]
    fn render_produces_configured_dimensions() {
        let renderer = WaveformRenderer::default().with_size(64, 16);
        let pcm = vec![0i16; 2000];
        let img = renderer.render(&pcm, 1000, 0, 1000, &[]);
        assert_eq!(img.width(), 64);
        assert_eq!(img.height(), 16);
    }

    #[test]
    fn pre_stem_gap_is_overlaid_when_offset_positive() {
        let renderer = WaveformRenderer::default().with_size(10, 4).with_silence_alpha(255);
        let pcm = vec![0i16; 0];
        // stem has zero samples and starts at offset 5 on a 10-sample track:
        // everything should be painted as silence (pre-gap [0,5) + post-gap [5,10)).
        let img = renderer.render(&pcm, 0, 5, 10, &[]);
        let pixel = img.get_pixel(0, 0);
        assert_eq!(pixel.0[3], 255);
    }

    #[test]
    fn encode_png_round_trips_through_decoder() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 4]));
        let bytes = encode_png(&img).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0), img.get_pixel(0, 0));
    }
}
