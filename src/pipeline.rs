//! Background pipeline per stem (spec §4.3.4): fetch → decode → silence →
//! waveform, plus the waveform regeneration task. Grounded on
//! `stem-manager.cpp`'s `process_stem` / `process_stem_waveform` for
//! control flow and on `wkmp-ap::playback::decoder_pool`'s worker-loop
//! idiom for how a Rust port structures the same thing.

use crate::config::MixerConfig;
use crate::error::{DecodeError, FetchError, StemMixerError};
use crate::external::{Base64Encoder, Fetcher, PngEncoder, VorbisDecoder};
use crate::silence::detect_silence;
use crate::stem::StemEntry;
use crate::waveform::WaveformRenderer;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared collaborators every background task needs; cloned cheaply via
/// `Arc` into each spawned closure.
pub(crate) struct PipelineContext {
    pub fetcher: Arc<dyn Fetcher>,
    pub decoder: Arc<dyn VorbisDecoder>,
    pub png_encoder: Arc<dyn PngEncoder>,
    pub base64_encoder: Arc<dyn Base64Encoder>,
    pub config: MixerConfig,
    pub track_length: Arc<AtomicU32>,
    pub on_complete: Arc<dyn Fn() + Send + Sync>,
}

/// Run the full fetch → decode → silence → initial-waveform pipeline for
/// a newly created stem (spec §4.3.4 steps 1-7).
pub(crate) fn run_stem_pipeline(entry: Arc<StemEntry>, ctx: Arc<PipelineContext>) {
    let result = fetch_and_decode(&entry, &ctx);

    match result {
        Ok(pcm) => {
            if entry.is_deleted() {
                debug!(stem_id = entry.id, "stem deleted mid-decode, discarding result");
                (ctx.on_complete)();
                return;
            }

            let silences = detect_silence(
                &pcm,
                ctx.config.silence_threshold,
                ctx.config.silence_min_length,
            );
            let _ = entry.pcm.set(pcm);
            let _ = entry.silences.set(silences);
            entry.data_ready.store(true, Ordering::Release);
            info!(stem_id = entry.id, "stem decoded and ready");

            run_waveform_task(&entry, &ctx, 0);
        }
        Err(PipelineOutcome::Cancelled) => {
            debug!(stem_id = entry.id, "stem pipeline cancelled before publication");
        }
        Err(PipelineOutcome::Failed(err)) => {
            warn!(stem_id = entry.id, %err, "stem pipeline failed");
            entry.error.store(true, Ordering::Release);
        }
    }

    (ctx.on_complete)();
}

/// Terminal outcome of a fetch/decode attempt. `Cancelled` is not a
/// `StemMixerError` variant: spec §7 calls it out as "silent, not
/// reported" — it reflects a removed stem, not a failure.
enum PipelineOutcome {
    Cancelled,
    Failed(StemMixerError),
}

fn fetch_and_decode(entry: &StemEntry, ctx: &PipelineContext) -> Result<Vec<i16>, PipelineOutcome> {
    let path = entry.meta.lock().unwrap().path.clone();
    let bytes = fetch_with_retry(entry, ctx, &path)?;

    if entry.is_deleted() {
        return Err(PipelineOutcome::Cancelled);
    }

    let expected_samples = entry.meta.lock().unwrap().samples as usize;
    let mut buffer = vec![0i16; 2 * expected_samples];
    let written = ctx
        .decoder
        .decode(&bytes, &mut buffer)
        .map_err(|e| PipelineOutcome::Failed(DecodeError::Codec(e).into()))?;

    if written != buffer.len() {
        return Err(PipelineOutcome::Failed(
            DecodeError::ShortBuffer { produced: written, expected: buffer.len() }.into(),
        ));
    }

    Ok(buffer)
}

/// Synchronous GET with retry/backoff (spec §4.3.4 step 1): up to
/// `fetch_max_attempts` total attempts, sleeping `fetch_retry_delay_ms`
/// between failures, checking `deleted` between attempts.
fn fetch_with_retry(
    entry: &StemEntry,
    ctx: &PipelineContext,
    path: &str,
) -> Result<Vec<u8>, PipelineOutcome> {
    let mut last_status = 0u16;
    let mut last_transport_error: Option<String> = None;

    for attempt in 0..ctx.config.fetch_max_attempts {
        match ctx.fetcher.fetch(path) {
            Ok(response) if (200..300).contains(&response.status) => {
                return Ok(response.bytes);
            }
            Ok(response) => {
                last_status = response.status;
                last_transport_error = None;
            }
            Err(e) => {
                warn!(stem_id = entry.id, attempt, "fetch error: {e}");
                last_transport_error = Some(e);
            }
        }

        let is_last_attempt = attempt + 1 == ctx.config.fetch_max_attempts;
        if is_last_attempt {
            break;
        }

        std::thread::sleep(Duration::from_millis(ctx.config.fetch_retry_delay_ms));

        if entry.is_deleted() {
            return Err(PipelineOutcome::Cancelled);
        }
    }

    let reason = last_transport_error.unwrap_or_else(|| format!("HTTP status {last_status}"));
    Err(PipelineOutcome::Failed(
        FetchError::Exhausted { attempts: ctx.config.fetch_max_attempts, reason }.into(),
    ))
}

/// Schedule a waveform regeneration tagged with `prev_ordinal` (spec
/// §4.3.4 "Waveform regeneration task"). Called both for the initial
/// render (`prev_ordinal == 0`) and for later regenerations triggered by
/// `set_track_length`/`update_stem_info`.
pub(crate) fn run_waveform_task(entry: &Arc<StemEntry>, ctx: &Arc<PipelineContext>, prev_ordinal: u32) {
    let entry = Arc::clone(entry);
    let ctx = Arc::clone(ctx);

    render_and_publish_waveform(&entry, &ctx, prev_ordinal);
    (ctx.on_complete)();
}

fn render_and_publish_waveform(entry: &StemEntry, ctx: &PipelineContext, prev_ordinal: u32) {
    debug_assert!(entry.data_ready(), "waveform requested before data_ready");
    if !entry.data_ready() {
        return;
    }

    let offset = entry.meta.lock().unwrap().offset;
    let track_length = ctx.track_length.load(Ordering::Acquire);
    let samples = entry.meta.lock().unwrap().samples;
    let silences = entry
        .silences
        .get()
        .expect("data_ready implies silences are published")
        .clone();
    let pcm = entry.pcm.get().expect("data_ready implies pcm is published");

    let renderer = WaveformRenderer::default()
        .with_size(ctx.config.waveform_width, ctx.config.waveform_height)
        .with_waveform_color(ctx.config.waveform_color)
        .with_silence_alpha(ctx.config.silence_overlay_alpha);

    let image = renderer.render(pcm, samples, offset, track_length, &silences);

    let png_bytes = match ctx.png_encoder.encode_rgba(&image) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(stem_id = entry.id, "waveform PNG encode failed: {e}");
            return;
        }
    };
    let data_uri = format!(
        "data:image/png;base64,{}",
        ctx.base64_encoder.encode(&png_bytes)
    );

    let mut meta = entry.meta.lock().unwrap();
    if entry.waveform_ordinal.load(Ordering::Acquire) == prev_ordinal {
        meta.waveform_data_uri = data_uri;
        entry.waveform_ordinal.store(prev_ordinal + 1, Ordering::Release);
    } else {
        debug!(
            stem_id = entry.id,
            "discarding obsolete waveform regeneration (ordinal raced)"
        );
    }
}
