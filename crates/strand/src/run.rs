//! Public interface for running compiled code.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    bytecode::{Code, CodeError, VM},
    exception::{ErrorKind, Exception},
    heap::{DropWithHeap, Heap, HeapStats},
    io::{PrintWriter, StdPrint},
    marshal::{FromObject, IntoArgs},
    object::Object,
    resource::{NoLimitTracker, ResourceTracker},
    tracer::{NoopTracer, VmTracer},
    value::Value,
};

/// Primary interface for running code.
///
/// Every run gets a fresh heap; nothing survives between runs except what is
/// returned as an [`Object`].
///
/// # Example
/// ```
/// use strand::{CodeBuilder, Inst, Object, Runner};
///
/// let mut b = CodeBuilder::new("len");
/// let v = b.input();
/// b.emit(Inst::LoadLocal(v));
/// b.emit(Inst::Len);
/// b.emit(Inst::Return);
///
/// let runner = Runner::new(b.build().unwrap()).unwrap();
/// let result = runner.run_no_limits(vec![Object::Vec(vec![Object::Int(10)])]).unwrap();
/// assert_eq!(result, Object::Int(1));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runner {
    code: Code,
}

impl Runner {
    /// Wraps code for execution, validating it first.
    ///
    /// # Errors
    /// Returns `CodeError` if the code is malformed.
    pub fn new(code: Code) -> Result<Self, CodeError> {
        code.validate()?;
        Ok(Self { code })
    }

    #[must_use]
    pub fn code(&self) -> &Code {
        &self.code
    }

    /// Executes the code to completion.
    ///
    /// # Arguments
    /// * `inputs` - Values for the input slots, in declaration order
    /// * `resource_tracker` - Custom resource tracker implementation
    /// * `print` - Writer for `Print` output
    ///
    /// # Errors
    /// Returns `Exception` if the number of inputs is wrong, an input cannot enter
    /// the runtime (e.g. `Object::Repr`), or the run fails.
    pub fn run(
        &self,
        inputs: Vec<Object>,
        resource_tracker: impl ResourceTracker,
        print: &mut impl PrintWriter,
    ) -> Result<Object, Exception> {
        self.run_traced(inputs, resource_tracker, print, NoopTracer).0
    }

    /// Executes the code to completion with no resource limits, printing to stdout.
    pub fn run_no_limits(&self, inputs: Vec<Object>) -> Result<Object, Exception> {
        let mut print = StdPrint::new();
        self.run(inputs, NoLimitTracker, &mut print)
    }

    /// Executes the code with a tracer attached, handing the tracer back afterwards.
    ///
    /// The tracer is returned even when the run fails, so the events leading up to
    /// the error can be inspected.
    pub fn run_traced<Tr: VmTracer>(
        &self,
        inputs: Vec<Object>,
        resource_tracker: impl ResourceTracker,
        print: &mut impl PrintWriter,
        tracer: Tr,
    ) -> (Result<Object, Exception>, Tr) {
        let mut heap = Heap::new(resource_tracker);
        self.execute(inputs, &mut heap, print, tracer)
    }

    /// Executes the code and also reports heap occupancy once the run is over.
    ///
    /// After a run every handle has been released, so `live_objects` is zero
    /// unless the script built a reference cycle.
    pub fn run_with_stats(
        &self,
        inputs: Vec<Object>,
        resource_tracker: impl ResourceTracker,
        print: &mut impl PrintWriter,
    ) -> Result<(Object, HeapStats), Exception> {
        let mut heap = Heap::new(resource_tracker);
        let (result, _) = self.execute(inputs, &mut heap, print, NoopTracer);
        result.map(|object| (object, heap.stats()))
    }

    /// Calls the code like a host function: `args` fill the input slots and the
    /// returned value is converted to `R`.
    ///
    /// # Example
    /// ```
    /// use strand::{CodeBuilder, Inst, Runner};
    ///
    /// let mut b = CodeBuilder::new("echo");
    /// let v = b.input();
    /// b.emit(Inst::LoadLocal(v));
    /// b.emit(Inst::Return);
    ///
    /// let runner = Runner::new(b.build().unwrap()).unwrap();
    /// let out: Vec<i64> = runner.call((vec![10_i64],)).unwrap();
    /// assert_eq!(out, vec![10]);
    /// ```
    ///
    /// # Errors
    /// Returns `Exception` if the run fails or the result does not convert to `R`.
    pub fn call<A: IntoArgs, R: FromObject>(&self, args: A) -> Result<R, Exception> {
        let mut print = StdPrint::new();
        let object = self.run(args.into_args(), NoLimitTracker, &mut print)?;
        R::from_object(object).map_err(Exception::from)
    }

    /// Serializes the runner to a binary format.
    ///
    /// The serialized data can be stored and later restored with `load()`.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Deserializes a runner from binary format, validating the code it holds.
    ///
    /// # Errors
    /// Returns `LoadError::Decode` for bytes that are not a runner and
    /// `LoadError::Invalid` for code that fails validation.
    pub fn load(bytes: &[u8]) -> Result<Self, LoadError> {
        let runner: Self = postcard::from_bytes(bytes).map_err(LoadError::Decode)?;
        runner.code.validate().map_err(LoadError::Invalid)?;
        Ok(runner)
    }

    fn execute<T: ResourceTracker, Tr: VmTracer>(
        &self,
        inputs: Vec<Object>,
        heap: &mut Heap<T>,
        print: &mut impl PrintWriter,
        tracer: Tr,
    ) -> (Result<Object, Exception>, Tr) {
        let inputs = match self.prepare_inputs(inputs, heap) {
            Ok(inputs) => inputs,
            Err(err) => return (Err(err), tracer),
        };
        let mut vm = VM::new(&self.code, heap, print, tracer);
        let result = vm.run(inputs);
        let tracer = vm.into_tracer();
        (result.map(|value| Object::new(value, heap)), tracer)
    }

    /// Moves the host inputs onto the heap. On failure nothing stays allocated.
    fn prepare_inputs<T: ResourceTracker>(&self, inputs: Vec<Object>, heap: &mut Heap<T>) -> Result<Vec<Value>, Exception> {
        let expected = usize::from(self.code.num_inputs());
        if inputs.len() != expected {
            return Err(Exception::new(
                ErrorKind::InvalidInput,
                format!("{} expects {expected} inputs, got {}", self.code.name(), inputs.len()),
            ));
        }
        let mut values = Vec::with_capacity(inputs.len());
        for input in inputs {
            match input.to_value(heap) {
                Ok(value) => values.push(value),
                Err(err) => {
                    values.drop_with_heap(heap);
                    return Err(err.into());
                }
            }
        }
        Ok(values)
    }
}

/// Error returned by [`Runner::load`].
#[derive(Debug)]
pub enum LoadError {
    /// The bytes are not a serialized runner.
    Decode(postcard::Error),
    /// The runner decoded but its code is malformed.
    Invalid(CodeError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(err) => write!(f, "cannot decode runner: {err}"),
            Self::Invalid(err) => write!(f, "invalid code: {err}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(err) => Some(err),
            Self::Invalid(err) => Some(err),
        }
    }
}
