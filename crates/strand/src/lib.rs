#![doc = include_str!("../../../README.md")]
#![expect(dead_code, reason = "container APIs beyond the instruction set are exercised by unit tests only")]
// first so every container module can name the arena
mod heap;

mod bytecode;
mod exception;
mod io;
mod marshal;
mod object;
mod resource;
mod run;
pub mod tracer;
mod types;
mod value;

pub use crate::{
    bytecode::{Code, CodeBuilder, CodeError, Inst, JumpLabel},
    exception::{ErrorKind, Exception},
    heap::HeapStats,
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    marshal::{
        FromObject, FromSlots, IntoArgs, IntoObject, IntoSlots, MarshalError, TypeMapping, TypeRegistry, ValueType,
        VecTuple,
    },
    object::{InvalidInputError, Object},
    resource::{
        LimitedTracker, MAX_DATA_RECURSION_DEPTH, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker,
    },
    run::{LoadError, Runner},
    tracer::{NoopTracer, ProfilingReport, ProfilingTracer, RecordingTracer, StderrTracer, TraceEvent, VmTracer},
    types::Direction,
    value::ValueKind,
};
