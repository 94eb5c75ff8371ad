use std::{cell::Cell, collections::BTreeMap, mem};

use smallvec::SmallVec;
use strum::IntoStaticStr;

use crate::{
    resource::{ResourceError, ResourceTracker},
    types::{DynVec, Str, Tuple, VecIter},
    value::{Value, ValueKind},
};

/// Snapshot of heap state at a point in time.
///
/// The `objects_by_type` map uses `BTreeMap` for deterministic iteration order,
/// making snapshots suitable for display and comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Total number of live objects on the heap.
    pub live_objects: usize,
    /// Number of free (recycled) slots available for reuse.
    pub free_slots: usize,
    /// Total heap capacity (live + free).
    pub total_slots: usize,
    /// Breakdown of live objects by `HeapData` variant name ("Str", "Vec", "Tuple", "Iter").
    pub objects_by_type: BTreeMap<&'static str, usize>,
    /// Resource tracker allocation count, if the tracker records it.
    pub tracker_allocations: Option<usize>,
    /// Resource tracker memory usage in bytes, if the tracker records it.
    pub tracker_memory_bytes: Option<usize>,
}

/// Unique identifier for values stored inside the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HeapId(usize);

impl HeapId {
    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Payload of a heap slot.
#[derive(Debug, IntoStaticStr)]
pub(crate) enum HeapData {
    Str(Str),
    Vec(DynVec),
    Tuple(Tuple),
    Iter(VecIter),
}

impl HeapData {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Str(_) => ValueKind::String,
            Self::Vec(_) => ValueKind::Vec,
            Self::Tuple(_) => ValueKind::Tuple,
            Self::Iter(_) => ValueKind::Iterator,
        }
    }

    /// Approximate size in bytes, reported to the resource tracker.
    pub fn estimate_size(&self) -> usize {
        let payload = match self {
            Self::Str(s) => s.as_str().len(),
            Self::Vec(v) => v.len() * mem::size_of::<Value>(),
            Self::Tuple(t) => t.len() * mem::size_of::<Value>(),
            Self::Iter(_) => 0,
        };
        mem::size_of::<Self>() + payload
    }

    /// Moves out every heap reference held by a container payload so the caller can release them.
    fn collect_child_ids(self, work_list: &mut SmallVec<[HeapId; 8]>) {
        match self {
            Self::Str(_) | Self::Iter(_) => {}
            Self::Vec(v) => work_list.extend(v.into_values().into_iter().filter_map(|value| value.ref_id())),
            Self::Tuple(t) => work_list.extend(t.into_values().into_iter().filter_map(|value| value.ref_id())),
        }
    }
}

/// A single arena slot.
///
/// `data` is an `Option` to support temporary borrowing: `with_entry_mut` takes the
/// payload out, hands `&mut Heap` to the caller, then restores it. The refcount stays
/// in place so `inc_ref`/`dec_ref` keep working during the borrow.
#[derive(Debug)]
struct HeapValue {
    refcount: Cell<usize>,
    data: Option<HeapData>,
}

/// Reference-counted arena that backs all heap-only runtime values.
///
/// Uses a free list to reuse slots from freed values. Every reuse bumps the slot's
/// generation, so holders of a `(HeapId, generation)` pair can tell a live slot from
/// one that has been freed and handed to a different value.
///
/// Generic over `T: ResourceTracker`; with `NoLimitTracker` all resource checks
/// compile away.
#[derive(Debug)]
pub(crate) struct Heap<T: ResourceTracker> {
    entries: Vec<Option<HeapValue>>,
    generations: Vec<u32>,
    free_list: Vec<HeapId>,
    tracker: T,
}

impl<T: ResourceTracker> Heap<T> {
    pub fn new(tracker: T) -> Self {
        Self {
            entries: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            tracker,
        }
    }

    pub fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }

    /// Allocates a new heap entry with a refcount of one.
    ///
    /// Returns `Err(ResourceError)` if allocation would exceed configured limits.
    pub fn allocate(&mut self, data: HeapData) -> Result<HeapId, ResourceError> {
        self.tracker.on_allocate(|| data.estimate_size())?;

        let new_entry = HeapValue {
            refcount: Cell::new(1),
            data: Some(data),
        };

        let id = if let Some(id) = self.free_list.pop() {
            let index = id.index();
            self.generations[index] = self.generations[index].wrapping_add(1);
            self.entries[index] = Some(new_entry);
            id
        } else {
            let id = HeapId(self.entries.len());
            self.generations.push(0);
            self.entries.push(Some(new_entry));
            id
        };
        Ok(id)
    }

    /// Allocates a container built from `values`.
    ///
    /// The values' handles move into the container. If the tracker refuses the
    /// allocation they are released instead, so a failed build leaks nothing.
    pub fn allocate_container(
        &mut self,
        values: Vec<Value>,
        build: impl FnOnce(Vec<Value>) -> HeapData,
    ) -> Result<HeapId, ResourceError> {
        let child_ids: SmallVec<[HeapId; 8]> = values.iter().filter_map(Value::ref_id).collect();
        self.allocate(build(values)).inspect_err(|_| {
            for id in child_ids {
                self.dec_ref(id);
            }
        })
    }

    /// Increments the reference count for an existing heap entry.
    ///
    /// # Panics
    /// Panics if the value ID is invalid or the value has already been freed.
    pub fn inc_ref(&self, id: HeapId) {
        let entry = self
            .entries
            .get(id.index())
            .expect("Heap::inc_ref: slot missing")
            .as_ref()
            .expect("Heap::inc_ref: object already freed");
        entry.refcount.set(entry.refcount.get() + 1);
    }

    /// Decrements the reference count and frees the value (plus children) once it hits zero.
    ///
    /// Children are released through a work list rather than recursion, so deeply
    /// nested vectors cannot overflow the native stack.
    ///
    /// # Panics
    /// Panics if the value ID is invalid or the value has already been freed.
    pub fn dec_ref(&mut self, id: HeapId) {
        let mut work_list: SmallVec<[HeapId; 8]> = SmallVec::new();
        work_list.push(id);

        while let Some(id) = work_list.pop() {
            let slot = self.entries.get_mut(id.index()).expect("Heap::dec_ref: slot missing");
            let entry = slot.as_mut().expect("Heap::dec_ref: object already freed");
            let count = entry.refcount.get();
            if count > 1 {
                entry.refcount.set(count - 1);
                continue;
            }

            let Some(value) = slot.take() else { continue };
            self.free_list.push(id);
            if let Some(data) = value.data {
                self.tracker.on_free(|| data.estimate_size());
                match data {
                    // an iterator only owns its source while the source slot has not been recycled
                    HeapData::Iter(it) => {
                        if self.is_live(it.source(), it.generation()) {
                            work_list.push(it.source());
                        }
                    }
                    data => data.collect_child_ids(&mut work_list),
                }
            }
        }
    }

    /// Returns an immutable reference to the heap data stored at the given ID.
    ///
    /// # Panics
    /// Panics if the value ID is invalid, the value has already been freed,
    /// or the data is currently borrowed via `with_entry_mut`.
    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        self.entries
            .get(id.index())
            .expect("Heap::get: slot missing")
            .as_ref()
            .expect("Heap::get: object already freed")
            .data
            .as_ref()
            .expect("Heap::get: data currently borrowed")
    }

    /// Returns heap data if the slot is live, `None` when freed or temporarily borrowed.
    #[must_use]
    pub fn get_if_live(&self, id: HeapId) -> Option<&HeapData> {
        self.entries.get(id.index())?.as_ref()?.data.as_ref()
    }

    /// Returns a mutable reference to the heap data stored at the given ID.
    ///
    /// # Panics
    /// Panics under the same conditions as [`Self::get`].
    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        self.entries
            .get_mut(id.index())
            .expect("Heap::get_mut: slot missing")
            .as_mut()
            .expect("Heap::get_mut: object already freed")
            .data
            .as_mut()
            .expect("Heap::get_mut: data currently borrowed")
    }

    /// Current generation of a slot. Bumped every time the slot is reused.
    #[must_use]
    pub fn generation(&self, id: HeapId) -> u32 {
        self.generations.get(id.index()).copied().unwrap_or_default()
    }

    /// Whether `id` still refers to the allocation that was made in `generation`.
    #[must_use]
    pub fn is_live(&self, id: HeapId, generation: u32) -> bool {
        self.generation(id) == generation && matches!(self.entries.get(id.index()), Some(Some(_)))
    }

    /// Returns the current refcount for a heap value, or 0 when freed.
    #[must_use]
    pub fn refcount(&self, id: HeapId) -> usize {
        self.entries
            .get(id.index())
            .and_then(Option::as_ref)
            .map_or(0, |entry| entry.refcount.get())
    }

    /// Runs `f` with the payload of `id` moved out of the arena.
    ///
    /// While `f` runs, the slot's data reads as borrowed (`get` panics, `get_if_live`
    /// returns `None`), but `inc_ref`/`dec_ref` on the slot keep working.
    ///
    /// # Panics
    /// Panics if the slot is missing, freed, or already borrowed.
    pub fn with_entry_mut<R>(&mut self, id: HeapId, f: impl FnOnce(&mut Self, &mut HeapData) -> R) -> R {
        let mut data = self
            .entries
            .get_mut(id.index())
            .expect("Heap::with_entry_mut: slot missing")
            .as_mut()
            .expect("Heap::with_entry_mut: object already freed")
            .data
            .take()
            .expect("Heap::with_entry_mut: data currently borrowed");

        let result = f(self, &mut data);

        if let Some(Some(entry)) = self.entries.get_mut(id.index()) {
            entry.data = Some(data);
        }
        result
    }

    /// Collects a snapshot of heap occupancy.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut objects_by_type = BTreeMap::new();
        let mut live_objects = 0;
        for data in self.entries.iter().flatten().filter_map(|entry| entry.data.as_ref()) {
            live_objects += 1;
            *objects_by_type.entry(<&'static str>::from(data)).or_insert(0) += 1;
        }
        HeapStats {
            live_objects,
            free_slots: self.free_list.len(),
            total_slots: self.entries.len(),
            objects_by_type,
            tracker_allocations: self.tracker.allocation_count(),
            tracker_memory_bytes: self.tracker.current_memory_bytes(),
        }
    }
}

/// Releases heap references owned by a value or a collection of values.
pub(crate) trait DropWithHeap {
    fn drop_with_heap<T: ResourceTracker>(self, heap: &mut Heap<T>);
}

impl DropWithHeap for Value {
    #[inline]
    fn drop_with_heap<T: ResourceTracker>(self, heap: &mut Heap<T>) {
        if let Some(id) = self.ref_id() {
            heap.dec_ref(id);
        }
    }
}

impl DropWithHeap for Option<Value> {
    fn drop_with_heap<T: ResourceTracker>(self, heap: &mut Heap<T>) {
        if let Some(value) = self {
            value.drop_with_heap(heap);
        }
    }
}

impl DropWithHeap for Vec<Value> {
    fn drop_with_heap<T: ResourceTracker>(self, heap: &mut Heap<T>) {
        for value in self {
            value.drop_with_heap(heap);
        }
    }
}
