/// Heap-resident payloads behind `Value::Ref`.
///
/// Each type owns the values it holds and releases them through the heap;
/// none of them implement `Clone`.
pub mod iter;
pub mod str;
pub mod tuple;
pub mod vec;

pub use iter::Direction;
pub(crate) use iter::VecIter;
pub(crate) use str::Str;
pub(crate) use tuple::Tuple;
pub(crate) use vec::DynVec;
