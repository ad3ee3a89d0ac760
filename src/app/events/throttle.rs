//! Decile progress throttling
//!
//! Hashing and downloading both report cumulative progress many thousands of
//! times per file. [`DecileThrottle`] lets through only the samples that cross
//! into a new 10%-wide band, bounding event volume to ten per file.

use crate::constants::progress::DECILE_STEP;

/// Remembers the last reported band for one hash or transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecileThrottle {
    last_reported: u8,
}

impl DecileThrottle {
    /// Start at 0%
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already-completed fraction, e.g. when resuming
    ///
    /// The starting band is not reported again.
    pub fn starting_at(current: u64, total: u64) -> Self {
        let mut throttle = Self::new();
        throttle.last_reported = Self::band(current, total);
        throttle
    }

    /// Record a progress sample
    ///
    /// Returns the new band (a multiple of 10 between 10 and 100) when the
    /// sample crosses into a band above the last reported one, `None`
    /// otherwise. A zero `total` never reports.
    pub fn observe(&mut self, current: u64, total: u64) -> Option<u8> {
        if total == 0 {
            return None;
        }

        let band = Self::band(current, total);
        if band > self.last_reported {
            self.last_reported = band;
            Some(band)
        } else {
            None
        }
    }

    /// Last band reported (0 before the first report)
    pub fn last_reported(&self) -> u8 {
        self.last_reported
    }

    fn band(current: u64, total: u64) -> u8 {
        if total == 0 {
            return 0;
        }
        let percent = (u128::from(current.min(total)) * 100 / u128::from(total)) as u8;
        percent - percent % DECILE_STEP
    }
}
