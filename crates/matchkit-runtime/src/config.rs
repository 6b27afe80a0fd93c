//! Queue sizing for the match runtime.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-match queue capacities.
///
/// Each match handler owns three bounded queues; these capacities are the
/// backpressure knobs. What happens when a queue fills differs per queue
/// (drop data, stop the match, reject the admission) — see
/// [`MatchHandler`](crate::MatchHandler).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Capacity of the inbound data queue drained by the match loop.
    #[serde(default = "default_queue_size")]
    pub input_queue_size: usize,

    /// Capacity of the call queue (ticks, joins, leaves, terminates).
    #[serde(default = "default_queue_size")]
    pub call_queue_size: usize,

    /// Capacity of the join-attempt queue.
    #[serde(default = "default_queue_size")]
    pub join_attempt_queue_size: usize,
}

fn default_queue_size() -> usize {
    128
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            input_queue_size: default_queue_size(),
            call_queue_size: default_queue_size(),
            join_attempt_queue_size: default_queue_size(),
        }
    }
}

impl MatchConfig {
    /// Fixes any unusable values so the config is safe to use.
    ///
    /// The channel primitive has no zero-capacity mode; a configured zero
    /// becomes capacity 1, the closest available to "unbuffered".
    pub fn validated(mut self) -> Self {
        for (name, size) in [
            ("input_queue_size", &mut self.input_queue_size),
            ("call_queue_size", &mut self.call_queue_size),
            ("join_attempt_queue_size", &mut self.join_attempt_queue_size),
        ] {
            if *size == 0 {
                warn!(queue = name, "queue capacity 0 — clamping to 1");
                *size = 1;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_queue_sizes() {
        let config = MatchConfig::default();
        assert_eq!(config.input_queue_size, 128);
        assert_eq!(config.call_queue_size, 128);
        assert_eq!(config.join_attempt_queue_size, 128);
    }

    #[test]
    fn validated_clamps_zero_capacities() {
        let config = MatchConfig {
            input_queue_size: 0,
            call_queue_size: 0,
            join_attempt_queue_size: 0,
        }
        .validated();

        assert_eq!(config.input_queue_size, 1);
        assert_eq!(config.call_queue_size, 1);
        assert_eq!(config.join_attempt_queue_size, 1);
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: MatchConfig =
            serde_json::from_str(r#"{"input_queue_size": 16}"#).unwrap();
        assert_eq!(config.input_queue_size, 16);
        assert_eq!(config.call_queue_size, 128);
    }
}
