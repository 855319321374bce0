use serde::{Deserialize, Serialize};
use crate::core::stats::{AddressSpace, MemoryUsage};

/// Thresholds deciding when a store or dictionary is worth compacting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionStrategy {
    pub max_dead_bytes_ratio: f64,
    pub max_dead_address_space_ratio: f64,
    pub max_buffers: usize,
    pub dead_bytes_slack: usize,
    pub dead_address_space_slack: usize,
}

impl Default for CompactionStrategy {
    fn default() -> Self {
        CompactionStrategy {
            max_dead_bytes_ratio: 0.05,
            max_dead_address_space_ratio: 0.2,
            max_buffers: 1,
            dead_bytes_slack: 64 * 1024,
            dead_address_space_slack: 64 * 1024,
        }
    }
}

impl CompactionStrategy {
    /// No slack, so tiny test stores compact as soon as any ratio is exceeded.
    pub fn eager() -> Self {
        CompactionStrategy {
            dead_bytes_slack: 0,
            dead_address_space_slack: 0,
            max_buffers: 4,
            ..CompactionStrategy::default()
        }
    }

    pub fn should_compact_memory(&self, usage: &MemoryUsage) -> bool {
        let dead = usage.dead_bytes;
        dead >= self.dead_bytes_slack
            && dead > 0
            && (dead as f64) > (usage.used_bytes as f64) * self.max_dead_bytes_ratio
    }

    pub fn should_compact_address_space(&self, space: &AddressSpace) -> bool {
        let dead = space.dead;
        dead >= self.dead_address_space_slack
            && dead > 0
            && (dead as f64) > (space.used as f64) * self.max_dead_address_space_ratio
    }

    pub fn should_compact(&self, usage: &MemoryUsage, space: &AddressSpace) -> CompactionSpec {
        CompactionSpec::new(
            self.should_compact_memory(usage),
            self.should_compact_address_space(space),
        )
    }
}

/// Which resource a compaction pass is meant to recover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionSpec {
    pub memory: bool,
    pub address_space: bool,
}

impl CompactionSpec {
    pub fn new(memory: bool, address_space: bool) -> Self {
        CompactionSpec { memory, address_space }
    }

    pub fn compact(&self) -> bool {
        self.memory || self.address_space
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slack_suppresses_small_dead_amounts() {
        let strategy = CompactionStrategy::default();
        let usage = MemoryUsage::new(4096, 1000, 500, 0);
        assert!(!strategy.should_compact_memory(&usage));
        assert!(CompactionStrategy::eager().should_compact_memory(&usage));
    }

    #[test]
    fn address_space_ratio() {
        let strategy = CompactionStrategy::eager();
        assert!(!strategy.should_compact_address_space(&AddressSpace::new(100, 10, 1000)));
        assert!(strategy.should_compact_address_space(&AddressSpace::new(100, 30, 1000)));
    }
}
