use std::ops::AddAssign;
use serde::{Serialize, Deserialize};

/// Memory accounting for a store or dictionary, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub allocated_bytes: usize,
    pub used_bytes: usize,
    pub dead_bytes: usize,
    pub allocated_bytes_on_hold: usize,
}

impl MemoryUsage {
    pub fn new(allocated_bytes: usize, used_bytes: usize, dead_bytes: usize, on_hold: usize) -> Self {
        MemoryUsage {
            allocated_bytes,
            used_bytes,
            dead_bytes,
            allocated_bytes_on_hold: on_hold,
        }
    }

    pub fn utilization_percent(&self) -> f32 {
        if self.allocated_bytes == 0 {
            0.0
        } else {
            (self.used_bytes as f32 / self.allocated_bytes as f32) * 100.0
        }
    }
}

impl AddAssign for MemoryUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.allocated_bytes += rhs.allocated_bytes;
        self.used_bytes += rhs.used_bytes;
        self.dead_bytes += rhs.dead_bytes;
        self.allocated_bytes_on_hold += rhs.allocated_bytes_on_hold;
    }
}

/// How much of the entry-ref address space is in use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSpace {
    pub used: usize,
    pub dead: usize,
    pub limit: usize,
}

impl AddressSpace {
    pub fn new(used: usize, dead: usize, limit: usize) -> Self {
        AddressSpace { used, dead, limit }
    }

    pub fn usage(&self) -> f64 {
        if self.limit == 0 {
            0.0
        } else {
            (self.used - self.dead.min(self.used)) as f64 / self.limit as f64
        }
    }
}

/// Snapshot of one attribute column, reported after commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeStats {
    pub num_docs: u32,
    pub num_values: u64,
    pub unique_values: usize,
    pub enum_store: MemoryUsage,
    pub dictionary: MemoryUsage,
    pub multi_value: MemoryUsage,
    pub postings: MemoryUsage,
    pub enum_store_address_space: AddressSpace,
    pub generation: u64,
}

impl AttributeStats {
    pub fn total(&self) -> MemoryUsage {
        let mut total = self.enum_store;
        total += self.dictionary;
        total += self.multi_value;
        total += self.postings;
        total
    }
}
