//! Stem data model (spec §3): the caller-supplied descriptor and the
//! manager-owned entry built from it.

use crate::silence::SilenceInterval;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

/// Caller-supplied descriptor for one stem (spec §3 `StemInfo`).
#[derive(Debug, Clone, PartialEq)]
pub struct StemInfo {
    /// Unique key identifying this stem across updates.
    pub id: u32,
    /// Opaque locator string handed to the [`crate::external::Fetcher`].
    pub path: String,
    /// Expected stereo frame count once decoded.
    pub samples: u32,
    /// Signed frame position on the track timeline; may be negative.
    pub offset: i32,
    /// Gain in decibels.
    pub gain_db: f64,
    /// Stereo balance in `[-1, 1]`; clamped on use, not on assignment.
    pub pan: f64,
}

/// Mutable fields of a [`StemEntry`] guarded by its own lock (spec §3).
#[derive(Debug, Clone)]
pub(crate) struct StemMeta {
    pub path: String,
    pub samples: u32,
    pub offset: i32,
    pub gain_db: f64,
    pub pan: f64,
    pub gain: f64,
    pub waveform_data_uri: String,
}

impl StemMeta {
    fn from_info(info: &StemInfo) -> Self {
        Self {
            path: info.path.clone(),
            samples: info.samples,
            offset: info.offset,
            gain_db: info.gain_db,
            pan: info.pan,
            gain: decibels_to_gain(info.gain_db),
            waveform_data_uri: String::new(),
        }
    }
}

/// Manager-owned entry for one stem, shared between the audio thread and
/// background pipeline workers (spec §3 `StemEntry`).
///
/// Fields are split between `id` (immutable), atomically-published
/// lifecycle flags, and metadata behind `meta` — matching the original
/// C++ `StemEntry`'s `std::atomic_bool` flags plus a `std::mutex`-guarded
/// metadata block. `offset`/`gain_db`/`pan` are additionally mirrored as
/// atomics so a metadata update can check "did anything change?" without
/// ever taking `meta` — the original's `update_or_add_stems` makes the
/// same tradeoff, reading the fields unlocked before deciding whether
/// it's worth blocking the audio thread for the write.
pub struct StemEntry {
    pub id: u32,
    pub(crate) meta: Mutex<StemMeta>,
    pub(crate) data_ready: AtomicBool,
    pub(crate) deleted: AtomicBool,
    pub(crate) error: AtomicBool,
    pub(crate) waveform_ordinal: AtomicU32,

    /// Cheap, lock-free snapshots of `meta.offset`/`gain_db`/`pan`, kept in
    /// sync by every writer. `gain_db`/`pan` are stored as their raw bit
    /// patterns since `f64` has no atomic type.
    pub(crate) offset_snapshot: AtomicI32,
    pub(crate) gain_db_bits: AtomicU64,
    pub(crate) pan_bits: AtomicU64,

    /// PCM buffer: `2 * samples` interleaved i16 frames. Written exactly
    /// once by the decode stage, then frozen. `OnceLock` publishes it
    /// without a lock on the read side: once `data_ready` is observed
    /// `true` (`Acquire`), the `Release` store that set it happens-after
    /// this was written, so `get()` is guaranteed `Some` and needs no
    /// synchronization of its own.
    pub(crate) pcm: OnceLock<Vec<i16>>,

    /// Silence intervals in the stem's local sample space, published
    /// alongside the PCM buffer under the same `data_ready` discipline.
    pub(crate) silences: OnceLock<Vec<SilenceInterval>>,
}

impl StemEntry {
    pub(crate) fn new(info: &StemInfo) -> Self {
        Self {
            id: info.id,
            meta: Mutex::new(StemMeta::from_info(info)),
            data_ready: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
            error: AtomicBool::new(false),
            waveform_ordinal: AtomicU32::new(0),
            offset_snapshot: AtomicI32::new(info.offset),
            gain_db_bits: AtomicU64::new(info.gain_db.to_bits()),
            pan_bits: AtomicU64::new(info.pan.to_bits()),
            pcm: OnceLock::new(),
            silences: OnceLock::new(),
        }
    }

    pub fn data_ready(&self) -> bool {
        self.data_ready.load(Ordering::Acquire)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub fn is_errored(&self) -> bool {
        self.error.load(Ordering::Acquire)
    }

    /// Lock-free snapshot of the current `offset`, for deciding whether a
    /// metadata update needs to touch `meta` at all.
    pub(crate) fn offset(&self) -> i32 {
        self.offset_snapshot.load(Ordering::Acquire)
    }

    pub(crate) fn gain_db(&self) -> f64 {
        f64::from_bits(self.gain_db_bits.load(Ordering::Acquire))
    }

    pub(crate) fn pan(&self) -> f64 {
        f64::from_bits(self.pan_bits.load(Ordering::Acquire))
    }
}

/// Convert a gain in decibels to a linear multiplier (spec §3: `gain_db`
/// → derived `gain`).
pub(crate) fn decibels_to_gain(gain_db: f64) -> f64 {
    10f64.powf(gain_db / 20.0)
}
