use smallvec::SmallVec;

use crate::{
    exception::{Exception, RunResult},
    heap::Heap,
    resource::ResourceTracker,
    value::Value,
};

/// Fixed-length heterogeneous sequence.
///
/// Most tuples built by scripts are pairs and triples, so up to three items stay inline.
#[derive(Debug, Default)]
pub(crate) struct Tuple(SmallVec<[Value; 3]>);

impl Tuple {
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        Self(SmallVec::from_vec(items))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new handle to the item at `index`.
    pub fn get(&self, index: usize, heap: &Heap<impl ResourceTracker>) -> RunResult<Value> {
        self.0
            .get(index)
            .map(|value| value.clone_with_heap(heap))
            .ok_or_else(|| Exception::out_of_bounds(index, self.len()))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    #[must_use]
    pub fn into_values(self) -> SmallVec<[Value; 3]> {
        self.0
    }
}
