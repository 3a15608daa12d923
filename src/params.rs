use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};

use crate::analysis::framer::Overlap;
use crate::onset::OnsetMethod;

pub const THRESHOLD_RANGE: (f32, f32) = (0.0, 10.0);
pub const SILENCE_DB_RANGE: (f32, f32) = (-90.0, -20.0);
pub const MIN_INTERVAL_FLOOR_MS: f64 = 8.0;

/// User-facing detection settings, persisted across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParameters {
    /// Detection method name; checked when a run starts.
    pub method: String,
    pub threshold: f32,
    pub silence_db: f32,
    pub min_interval_ms: f64,
    /// Any integer is accepted; factors other than 2, 4 or 8 become 4.
    #[serde(deserialize_with = "deserialize_overlap")]
    pub overlap: Overlap,
}

impl Default for DetectionParameters {
    fn default() -> Self {
        Self {
            method: OnsetMethod::default().name().to_string(),
            threshold: 1.0,
            silence_db: -70.0,
            min_interval_ms: 14.3,
            overlap: Overlap::default(),
        }
    }
}

/// What a setter did with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Accepted,
    /// Out of range; the nearest valid value was stored.
    Corrected,
    /// Not a number; the previous value was kept.
    Ignored,
}

/// Thread-safe holder of [`DetectionParameters`]. Every write is validated
/// and corrected, never refused; runs read a snapshot.
#[derive(Debug, Default)]
pub struct ParameterStore {
    inner: RwLock<DetectionParameters>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store by pushing every field of `params` through its setter.
    pub fn from_parameters(params: DetectionParameters) -> Self {
        let store = Self::new();
        store.apply(params);
        store
    }

    pub fn snapshot(&self) -> DetectionParameters {
        self.inner.read().clone()
    }

    pub fn apply(&self, params: DetectionParameters) {
        self.set_method(&params.method);
        self.set_threshold(params.threshold);
        self.set_silence_db(params.silence_db);
        self.set_min_interval_ms(params.min_interval_ms);
        self.set_overlap(params.overlap.factor() as i64);
    }

    /// Unknown names are stored as given and fail when a run starts.
    pub fn set_method(&self, method: &str) -> Adjustment {
        if method.parse::<OnsetMethod>().is_err() {
            log::warn!(
                "unknown detection method '{}' (expected one of: {})",
                method,
                OnsetMethod::NAMES.join(", ")
            );
        }
        self.inner.write().method = method.to_string();
        Adjustment::Accepted
    }

    pub fn set_threshold(&self, threshold: f32) -> Adjustment {
        let (lo, hi) = THRESHOLD_RANGE;
        match clamp_f32("thresh", threshold, lo, hi) {
            Some((value, adjustment)) => {
                self.inner.write().threshold = value;
                adjustment
            }
            None => Adjustment::Ignored,
        }
    }

    pub fn set_silence_db(&self, silence_db: f32) -> Adjustment {
        let (lo, hi) = SILENCE_DB_RANGE;
        match clamp_f32("silence", silence_db, lo, hi) {
            Some((value, adjustment)) => {
                self.inner.write().silence_db = value;
                adjustment
            }
            None => Adjustment::Ignored,
        }
    }

    pub fn set_min_interval_ms(&self, min_interval_ms: f64) -> Adjustment {
        if !min_interval_ms.is_finite() {
            log::warn!("mininterval: ignoring non-finite value {}", min_interval_ms);
            return Adjustment::Ignored;
        }
        let (value, adjustment) = if min_interval_ms < MIN_INTERVAL_FLOOR_MS {
            log::warn!(
                "mininterval {} ms is below the minimum, using {} ms",
                min_interval_ms,
                MIN_INTERVAL_FLOOR_MS
            );
            (MIN_INTERVAL_FLOOR_MS, Adjustment::Corrected)
        } else {
            (min_interval_ms, Adjustment::Accepted)
        };
        self.inner.write().min_interval_ms = value;
        adjustment
    }

    pub fn set_overlap(&self, factor: i64) -> Adjustment {
        let (overlap, adjustment) = normalize_overlap(factor);
        self.inner.write().overlap = overlap;
        adjustment
    }

    pub fn method(&self) -> String {
        self.inner.read().method.clone()
    }

    pub fn threshold(&self) -> f32 {
        self.inner.read().threshold
    }

    pub fn silence_db(&self) -> f32 {
        self.inner.read().silence_db
    }

    pub fn min_interval_ms(&self) -> f64 {
        self.inner.read().min_interval_ms
    }

    pub fn overlap(&self) -> Overlap {
        self.inner.read().overlap
    }
}

fn normalize_overlap(factor: i64) -> (Overlap, Adjustment) {
    match Overlap::from_factor(factor) {
        Some(overlap) => (overlap, Adjustment::Accepted),
        None => {
            log::warn!("overlap must be either 2, 4, or 8 -- resetting to 4");
            (Overlap::Four, Adjustment::Corrected)
        }
    }
}

fn deserialize_overlap<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Overlap, D::Error> {
    let factor = i64::deserialize(deserializer)?;
    Ok(normalize_overlap(factor).0)
}

fn clamp_f32(name: &str, value: f32, lo: f32, hi: f32) -> Option<(f32, Adjustment)> {
    if !value.is_finite() {
        log::warn!("{}: ignoring non-finite value {}", name, value);
        return None;
    }
    let clamped = value.clamp(lo, hi);
    if clamped != value {
        log::warn!("{} {} out of range [{}, {}], using {}", name, value, lo, hi, clamped);
        Some((clamped, Adjustment::Corrected))
    } else {
        Some((value, Adjustment::Accepted))
    }
}
