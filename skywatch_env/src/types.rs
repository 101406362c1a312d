//! Wire types exchanged between SkyWatch and its collaborators.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// Flight identifier as assigned by the upstream feed (ICAO24 hex or callsign).
pub type FlightId = String;

/// Sentinel for an unknown altitude, velocity or average.
pub const UNKNOWN_SCALAR: f64 = -1.0;

/// Sentinel for an unknown duration.
pub const UNKNOWN_DURATION: f64 = 0.0;

/// Classification assumed when a snapshot carries none.
pub const DEFAULT_CLASSIFICATION: &str = "unknown";

// ============================================================================
// SAMPLES
// ============================================================================

/// A single position report.
///
/// On the wire this is `[lat, lon, timestamp, altitude|-1, velocity|-1]`.
/// Altitude and velocity may be omitted or `null` and decode to the -1
/// sentinel. A `null` latitude, longitude or timestamp decodes to NaN and
/// marks the sample as invalid. Fewer than three entries is an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Option<f64>>", into = "RawSample")]
pub struct Sample {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: f64,
    pub altitude: f64,
    pub velocity: f64,
}

impl Sample {
    pub fn new(lat: f64, lon: f64, timestamp: f64, altitude: f64, velocity: f64) -> Self {
        Self {
            lat,
            lon,
            timestamp,
            altitude,
            velocity,
        }
    }

    /// A sample with unknown altitude and velocity.
    pub fn position(lat: f64, lon: f64, timestamp: f64) -> Self {
        Self::new(lat, lon, timestamp, UNKNOWN_SCALAR, UNKNOWN_SCALAR)
    }

    /// True when both coordinates and the timestamp are present and numeric.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite() && self.timestamp.is_finite()
    }

    /// `(lat, lon)` pair.
    #[inline]
    pub fn coord(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }
}

#[derive(Serialize)]
struct RawSample(Option<f64>, Option<f64>, Option<f64>, f64, f64);

impl TryFrom<Vec<Option<f64>>> for Sample {
    type Error = String;

    fn try_from(raw: Vec<Option<f64>>) -> Result<Self, Self::Error> {
        if raw.len() < 3 {
            return Err(format!("point has {} entries, expected at least 3", raw.len()));
        }
        let at = |i: usize, missing: f64| raw.get(i).copied().flatten().unwrap_or(missing);
        Ok(Sample {
            lat: at(0, f64::NAN),
            lon: at(1, f64::NAN),
            timestamp: at(2, f64::NAN),
            altitude: at(3, UNKNOWN_SCALAR),
            velocity: at(4, UNKNOWN_SCALAR),
        })
    }
}

impl From<Sample> for RawSample {
    fn from(s: Sample) -> Self {
        let finite = |v: f64| if v.is_finite() { Some(v) } else { None };
        RawSample(
            finite(s.lat),
            finite(s.lon),
            finite(s.timestamp),
            s.altitude,
            s.velocity,
        )
    }
}

/// One entry of a `points` array; undecodable entries are kept as a count.
#[derive(Deserialize)]
#[serde(untagged)]
enum WirePoint {
    Sample(Sample),
    Malformed(IgnoredAny),
}

/// A `points` value that is not an array at all counts as one bad entry.
#[derive(Deserialize)]
#[serde(untagged)]
enum WirePoints {
    List(Vec<WirePoint>),
    Malformed(IgnoredAny),
}

impl Default for WirePoints {
    fn default() -> Self {
        WirePoints::List(Vec::new())
    }
}

impl WirePoints {
    /// Splits into decoded samples and the number of rejected entries.
    fn split(self) -> (Vec<Sample>, usize) {
        match self {
            WirePoints::List(entries) => {
                let mut samples = Vec::with_capacity(entries.len());
                let mut rejected = 0;
                for entry in entries {
                    match entry {
                        WirePoint::Sample(sample) => samples.push(sample),
                        WirePoint::Malformed(_) => rejected += 1,
                    }
                }
                (samples, rejected)
            }
            WirePoints::Malformed(_) => (Vec::new(), 1),
        }
    }
}

// ============================================================================
// FLIGHT SNAPSHOT
// ============================================================================

fn unknown_scalar() -> f64 {
    UNKNOWN_SCALAR
}

fn scalar_or_unknown<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(UNKNOWN_SCALAR))
}

fn duration_or_unknown<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(UNKNOWN_DURATION))
}

/// Per-flight state as pushed in a batch update or returned by a track query.
///
/// `flight_id` is optional and `points` are decoded one by one so a
/// malformed entry can be decoded and skipped instead of failing the
/// whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireSnapshot")]
pub struct FlightSnapshot {
    pub flight_id: Option<FlightId>,

    pub points: Vec<Sample>,

    /// Entries of `points` that could not be decoded
    #[serde(skip)]
    pub rejected_points: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_source: Option<String>,

    pub avg_altitude: f64,

    pub avg_velocity: f64,

    pub duration: f64,
}

#[derive(Deserialize)]
struct WireSnapshot {
    #[serde(default)]
    flight_id: Option<FlightId>,

    #[serde(default)]
    points: WirePoints,

    #[serde(default)]
    classification: Option<String>,

    #[serde(default)]
    classification_source: Option<String>,

    #[serde(default = "unknown_scalar", deserialize_with = "scalar_or_unknown")]
    avg_altitude: f64,

    #[serde(default = "unknown_scalar", deserialize_with = "scalar_or_unknown")]
    avg_velocity: f64,

    #[serde(default, deserialize_with = "duration_or_unknown")]
    duration: f64,
}

impl From<WireSnapshot> for FlightSnapshot {
    fn from(wire: WireSnapshot) -> Self {
        let (points, rejected_points) = wire.points.split();
        FlightSnapshot {
            flight_id: wire.flight_id,
            points,
            rejected_points,
            classification: wire.classification,
            classification_source: wire.classification_source,
            avg_altitude: wire.avg_altitude,
            avg_velocity: wire.avg_velocity,
            duration: wire.duration,
        }
    }
}

impl FlightSnapshot {
    /// Creates a snapshot with unknown classification and stats.
    pub fn new(flight_id: impl Into<FlightId>, points: Vec<Sample>) -> Self {
        Self {
            flight_id: Some(flight_id.into()),
            points,
            rejected_points: 0,
            classification: None,
            classification_source: None,
            avg_altitude: UNKNOWN_SCALAR,
            avg_velocity: UNKNOWN_SCALAR,
            duration: UNKNOWN_DURATION,
        }
    }

    pub fn with_classification(mut self, classification: impl Into<String>) -> Self {
        self.classification = Some(classification.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.classification_source = Some(source.into());
        self
    }

    pub fn with_stats(mut self, avg_altitude: f64, avg_velocity: f64, duration: f64) -> Self {
        self.avg_altitude = avg_altitude;
        self.avg_velocity = avg_velocity;
        self.duration = duration;
        self
    }

    /// Classification, or the default name when absent.
    pub fn classification_or_default(&self) -> &str {
        self.classification.as_deref().unwrap_or(DEFAULT_CLASSIFICATION)
    }
}

// ============================================================================
// CHANNEL PAYLOADS
// ============================================================================

/// Inbound `batch-update` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchUpdate {
    #[serde(default)]
    pub flights: Vec<FlightSnapshot>,
}

/// Inbound `cleanup` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cleanup {
    #[serde(default)]
    pub flight_ids: Vec<FlightId>,
}

/// Inbound `log` payload (server-side log line for the operator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub message: String,
}

/// Outbound filter-change notice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterChange {
    pub classifications: Vec<String>,
}

/// Everything the update channel can deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ChannelEvent {
    BatchUpdate(BatchUpdate),
    Cleanup(Cleanup),
    FlightUpdate(FlightSnapshot),
    Log(LogMessage),
}

impl ChannelEvent {
    /// Event name as used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelEvent::BatchUpdate(_) => "batch-update",
            ChannelEvent::Cleanup(_) => "cleanup",
            ChannelEvent::FlightUpdate(_) => "flight-update",
            ChannelEvent::Log(_) => "log",
        }
    }
}

// ============================================================================
// CLASSIFICATIONS
// ============================================================================

/// Registry entry: classification name and display color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationEntry {
    pub name: String,
    pub color: String,
}

impl ClassificationEntry {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

// ============================================================================
// AREAS OF INTEREST
// ============================================================================

/// Server-assigned identifier for an area of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaId(pub u64);

impl std::fmt::Display for AreaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "area-{}", self.0)
    }
}

/// Latitude/longitude box, stored normalized (`lamin <= lamax`, `lomin <= lomax`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lamin: f64,
    pub lamax: f64,
    pub lomin: f64,
    pub lomax: f64,
}

impl Bounds {
    /// Builds a box from two opposite corners in any order.
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Self {
        Self {
            lamin: a.0.min(b.0),
            lamax: a.0.max(b.0),
            lomin: a.1.min(b.1),
            lomax: a.1.max(b.1),
        }
    }

    /// Inclusive containment test.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.lamin && lat <= self.lamax && lon >= self.lomin && lon <= self.lomax
    }
}

/// Polling frequency of a monitored area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PollFrequency {
    ThirtySeconds,
    OneMinute,
    FiveMinutes,
}

impl PollFrequency {
    pub fn as_secs(&self) -> u64 {
        match self {
            PollFrequency::ThirtySeconds => 30,
            PollFrequency::OneMinute => 60,
            PollFrequency::FiveMinutes => 300,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PollFrequency::ThirtySeconds => "30s",
            PollFrequency::OneMinute => "1m",
            PollFrequency::FiveMinutes => "5m",
        }
    }
}

impl Default for PollFrequency {
    fn default() -> Self {
        PollFrequency::ThirtySeconds
    }
}

impl From<&str> for PollFrequency {
    /// Unknown labels fall back to 30 seconds.
    fn from(label: &str) -> Self {
        match label.trim() {
            "1m" => PollFrequency::OneMinute,
            "5m" => PollFrequency::FiveMinutes,
            _ => PollFrequency::ThirtySeconds,
        }
    }
}

impl From<String> for PollFrequency {
    fn from(label: String) -> Self {
        PollFrequency::from(label.as_str())
    }
}

impl From<PollFrequency> for String {
    fn from(freq: PollFrequency) -> Self {
        freq.label().to_string()
    }
}

/// Area of interest as listed by the area collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaRecord {
    pub id: AreaId,

    #[serde(flatten)]
    pub bounds: Bounds,

    #[serde(alias = "is_monitoring")]
    pub monitoring: bool,

    #[serde(default)]
    pub frequency: PollFrequency,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
