//! Processing statistics, published as deltas on a channel.
//!
//! The pipeline emits one [`StatsDelta`] per completed document; the
//! presentation layer drains the channel on its own schedule and owns the
//! cumulative display. Counters are never mutated from outside the worker.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Counter increments produced by one completed document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDelta {
    /// Documents processed (always 1 for a completed document).
    pub processed: u64,
    /// Successful sends from this document, possibly 0.
    pub sent: u64,
    /// Failed sends, plus 1 when the aggregate outcome was failure and at
    /// least one individual send failed; exactly 1 on the
    /// no-valid-recipient and short-circuit paths.
    pub errors: u64,
}

/// Monotonically increasing totals, accumulated by the consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsTotals {
    pub processed: u64,
    pub sent: u64,
    pub errors: u64,
}

impl StatsTotals {
    pub fn apply(&mut self, delta: StatsDelta) {
        self.processed += delta.processed;
        self.sent += delta.sent;
        self.errors += delta.errors;
    }
}

pub type StatsSender = mpsc::UnboundedSender<StatsDelta>;
pub type StatsReceiver = mpsc::UnboundedReceiver<StatsDelta>;

/// One-way notification channel from the worker to the presentation layer.
pub fn stats_channel() -> (StatsSender, StatsReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_accumulate_deltas() {
        let mut totals = StatsTotals::default();
        totals.apply(StatsDelta {
            processed: 1,
            sent: 2,
            errors: 0,
        });
        totals.apply(StatsDelta {
            processed: 1,
            sent: 0,
            errors: 1,
        });
        assert_eq!(
            totals,
            StatsTotals {
                processed: 2,
                sent: 2,
                errors: 1,
            }
        );
    }

    #[test]
    fn delta_serializes_for_embedders() {
        let delta = StatsDelta {
            processed: 1,
            sent: 1,
            errors: 0,
        };
        let json = serde_json::to_value(delta).unwrap();
        assert_eq!(json["processed"], 1);
        assert_eq!(json["sent"], 1);
        assert_eq!(json["errors"], 0);
    }
}
