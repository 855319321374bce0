use std::sync::Arc;
use std::time::Instant;
use crate::rank::blueprint::FeatureRef;
use crate::rank::environment::MatchData;
use crate::rank::feature_type::{NumberOrObject, ObjectValue};
use crate::rank::profiler::ExecutionProfiler;

/// Computes the outputs of one executor for a document.
pub trait FeatureExecutor: Send {
    /// Pure executors depend on nothing but their inputs. A pure executor whose inputs
    /// are all constant is evaluated once, when the program is set up.
    fn is_pure(&self) -> bool {
        false
    }

    fn execute(&mut self, doc_id: u32, inputs: &mut Inputs<'_>, outputs: &mut Outputs<'_>);
}

/// Executor with its wiring and output cells inside a rank program.
pub(crate) struct Slot {
    pub(crate) name: String,
    pub(crate) executor: Box<dyn FeatureExecutor>,
    pub(crate) inputs: Vec<FeatureRef>,
    pub(crate) outputs: Vec<NumberOrObject>,
    pub(crate) last_doc_id: Option<u32>,
    pub(crate) is_const: bool,
}

/// Run the executor at `idx` for `doc_id` unless it already ran for that document.
/// Inputs always sit at lower indexes, so the executor can pull them on demand while
/// holding the slots below it.
pub(crate) fn lazy_execute(
    slots: &mut [Slot],
    idx: usize,
    doc_id: u32,
    match_data: &MatchData,
    mut profiler: Option<&mut ExecutionProfiler>,
) {
    let (lower, rest) = slots.split_at_mut(idx);
    let slot = &mut rest[0];
    if slot.is_const || slot.last_doc_id == Some(doc_id) {
        return;
    }
    slot.last_doc_id = Some(doc_id);
    let start = profiler.is_some().then(Instant::now);
    {
        let mut inputs = Inputs {
            slots: lower,
            refs: &slot.inputs,
            doc_id,
            match_data,
            profiler: profiler.as_deref_mut(),
        };
        let mut outputs = Outputs {
            values: &mut slot.outputs,
        };
        slot.executor.execute(doc_id, &mut inputs, &mut outputs);
    }
    if let (Some(profiler), Some(start)) = (profiler, start) {
        profiler.record(idx, start.elapsed());
    }
}

/// Lazy access to an executor's inputs for the current document.
pub struct Inputs<'a> {
    slots: &'a mut [Slot],
    refs: &'a [FeatureRef],
    doc_id: u32,
    match_data: &'a MatchData,
    profiler: Option<&'a mut ExecutionProfiler>,
}

impl Inputs<'_> {
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    fn resolve(&mut self, idx: usize) -> &NumberOrObject {
        let input = self.refs[idx];
        lazy_execute(
            self.slots,
            input.executor,
            self.doc_id,
            self.match_data,
            self.profiler.as_deref_mut(),
        );
        &self.slots[input.executor].outputs[input.output]
    }

    pub fn get_number(&mut self, idx: usize) -> f64 {
        self.resolve(idx).as_number()
    }

    pub fn get_object(&mut self, idx: usize) -> Arc<ObjectValue> {
        Arc::clone(self.resolve(idx).as_object())
    }

    pub fn match_data(&self) -> &MatchData {
        self.match_data
    }
}

pub struct Outputs<'a> {
    values: &'a mut [NumberOrObject],
}

impl Outputs<'_> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set_number(&mut self, idx: usize, value: f64) {
        debug_assert!(matches!(self.values[idx], NumberOrObject::Number(_)));
        self.values[idx] = NumberOrObject::Number(value);
    }

    pub fn set_object(&mut self, idx: usize, value: Arc<ObjectValue>) {
        debug_assert!(matches!(self.values[idx], NumberOrObject::Object(_)));
        self.values[idx] = NumberOrObject::Object(value);
    }
}

/// Replaces some number outputs of the wrapped executor with fixed values.
pub(crate) struct OverrideExecutor {
    inner: Box<dyn FeatureExecutor>,
    overrides: Vec<(usize, f64)>,
}

impl OverrideExecutor {
    pub(crate) fn new(inner: Box<dyn FeatureExecutor>, overrides: Vec<(usize, f64)>) -> Self {
        OverrideExecutor { inner, overrides }
    }
}

impl FeatureExecutor for OverrideExecutor {
    fn is_pure(&self) -> bool {
        self.inner.is_pure()
    }

    fn execute(&mut self, doc_id: u32, inputs: &mut Inputs<'_>, outputs: &mut Outputs<'_>) {
        self.inner.execute(doc_id, inputs, outputs);
        for &(output, value) in &self.overrides {
            outputs.set_number(output, value);
        }
    }
}

/// Turns one object input into a number.
pub(crate) struct UnboxExecutor;

impl FeatureExecutor for UnboxExecutor {
    fn is_pure(&self) -> bool {
        true
    }

    fn execute(&mut self, _doc_id: u32, inputs: &mut Inputs<'_>, outputs: &mut Outputs<'_>) {
        let value = inputs.get_object(0).as_double();
        outputs.set_number(0, value);
    }
}

/// Writes fixed numbers to its outputs.
pub struct ConstantExecutor {
    values: Vec<f64>,
}

impl ConstantExecutor {
    pub fn new(values: Vec<f64>) -> Self {
        ConstantExecutor { values }
    }
}

impl FeatureExecutor for ConstantExecutor {
    fn is_pure(&self) -> bool {
        true
    }

    fn execute(&mut self, _doc_id: u32, _inputs: &mut Inputs<'_>, outputs: &mut Outputs<'_>) {
        for (i, v) in self.values.iter().enumerate() {
            outputs.set_number(i, *v);
        }
    }
}
