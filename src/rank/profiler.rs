use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSample {
    pub name: String,
    pub count: u64,
    /// Includes time spent in inputs evaluated on demand.
    pub total: Duration,
}

/// Counts executions and time per executor of a rank program.
#[derive(Debug, Clone, Default)]
pub struct ExecutionProfiler {
    samples: Vec<ProfileSample>,
}

impl ExecutionProfiler {
    pub fn new() -> Self {
        ExecutionProfiler::default()
    }

    pub(crate) fn register(&mut self, executor: usize, name: &str) {
        if self.samples.len() <= executor {
            self.samples.resize_with(executor + 1, ProfileSample::default);
        }
        self.samples[executor].name = name.to_string();
    }

    pub(crate) fn record(&mut self, executor: usize, elapsed: Duration) {
        if let Some(sample) = self.samples.get_mut(executor) {
            sample.count += 1;
            sample.total += elapsed;
        }
    }

    pub fn samples(&self) -> &[ProfileSample] {
        &self.samples
    }

    pub fn sample(&self, name: &str) -> Option<&ProfileSample> {
        self.samples.iter().find(|s| s.name == name)
    }

    /// Samples that ran at least once, most expensive first.
    pub fn report(&self) -> Vec<ProfileSample> {
        let mut report: Vec<ProfileSample> = self.samples.iter().filter(|s| s.count > 0).cloned().collect();
        report.sort_by(|a, b| b.total.cmp(&a.total));
        report
    }
}
