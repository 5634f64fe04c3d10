use std::collections::VecDeque;
use std::time::Duration;

/// Number of heartbeat round trips kept for [`LatencySamples::ping`].
pub const MAX_LATENCY_SAMPLES: usize = 5;

/// Most recent heartbeat round-trip times, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencySamples {
    samples: VecDeque<Duration>,
}

impl LatencySamples {
    /// Push a measurement to the front, dropping the oldest beyond [`MAX_LATENCY_SAMPLES`].
    pub fn record(&mut self, latency: Duration) {
        self.samples.push_front(latency);
        self.samples.truncate(MAX_LATENCY_SAMPLES);
    }

    /// Mean round-trip time, `None` until the first heartbeat completes.
    #[must_use]
    pub fn ping(&self) -> Option<Duration> {
        let count = u32::try_from(self.samples.len())
            .ok()
            .filter(|count| *count > 0)?;
        Some(self.samples.iter().sum::<Duration>() / count)
    }

    /// Samples, newest first.
    #[must_use]
    pub fn samples(&self) -> Vec<Duration> {
        self.samples.iter().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
