//! Tick to wall-clock conversion.

/// Default tempo until the first tempo meta event: 120 BPM.
pub const DEFAULT_TEMPO_US: u64 = 500_000;

/// Convert ticks to microseconds at a given tempo and division.
///
/// Truncates per call. No fractional remainder is carried between events,
/// so instances with different event deltas drift apart by a few frames.
pub const fn ticks_to_us(ticks: u64, us_per_qn: u64, division: u64) -> u64 {
    ticks * us_per_qn / division
}

/// Same as [`ticks_to_us`], scaled to nanoseconds after truncation.
pub const fn ticks_to_ns(ticks: u64, us_per_qn: u64, division: u64) -> u64 {
    1000 * ticks_to_us(ticks, us_per_qn, division)
}
