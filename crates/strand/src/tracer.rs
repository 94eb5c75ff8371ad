//! VM execution tracing.
//!
//! The VM is parameterized as `VM<'a, T: ResourceTracker, P: PrintWriter, Tr: VmTracer>`,
//! so with [`NoopTracer`] every hook is inlined to nothing, the same way
//! [`NoLimitTracker`](crate::resource::NoLimitTracker) removes resource checks.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (default) |
//! | [`StderrTracer`] | Human-readable execution log to stderr |
//! | [`ProfilingTracer`] | Instruction frequency counters and iterator statistics |
//! | [`RecordingTracer`] | Full event recording for tests and post-mortem analysis |
//!
//! Pick one with [`Runner::run_traced`](crate::Runner::run_traced), which hands the
//! tracer back after the run.

use std::{collections::HashMap, fmt};

use crate::{bytecode::Inst, types::Direction};

/// Trace event captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// An instruction was dispatched.
    Instruction {
        ip: usize,
        inst: Inst,
        /// Operand stack depth before the instruction ran.
        stack_depth: usize,
    },
    /// `Iter` or `IterRev` created a cursor over `len` elements.
    IterCreate { direction: Direction, len: usize },
    /// `ForIter` or `IterNext` at `ip` found its iterator exhausted.
    IterExhausted { ip: usize },
    /// The run returned from the instruction at `ip`.
    Return { ip: usize },
}

/// Trait for VM execution tracing.
///
/// All methods have default no-op implementations, so implementations only
/// override the hooks they care about.
pub trait VmTracer: fmt::Debug {
    /// Called before each instruction is dispatched.
    ///
    /// This is the hottest hook; keep implementations cheap.
    #[inline]
    fn on_instruction(&mut self, _ip: usize, _inst: Inst, _stack_depth: usize) {}

    /// Called after an iterator is created.
    #[inline]
    fn on_iter_create(&mut self, _direction: Direction, _len: usize) {}

    /// Called when a loop or cursor step finds its iterator exhausted.
    #[inline]
    fn on_iter_exhausted(&mut self, _ip: usize) {}

    /// Called when the run returns a value to the host.
    #[inline]
    fn on_return(&mut self, _ip: usize) {}
}

/// Zero-cost tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

// ============================================================================
// StderrTracer
// ============================================================================

/// Tracer that prints a human-readable execution log to stderr.
///
/// Output format:
/// ```text
/// [    0] LoadConst(0)        stack=0
/// [    1] Iter                stack=1
///   +++ ITER forward len=2
/// [    2] ForIter(5)          stack=1
///   --- EXHAUSTED at 2
///   <<< RETURN at 6
/// ```
#[derive(Debug, Default)]
pub struct StderrTracer {
    /// Instructions to trace before going quiet; `None` is unlimited.
    limit: Option<usize>,
    count: usize,
    stopped: bool,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracer that stops after `limit` instructions, so loops cannot flood stderr.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

impl VmTracer for StderrTracer {
    fn on_instruction(&mut self, ip: usize, inst: Inst, stack_depth: usize) {
        if self.stopped {
            return;
        }
        let inst = format!("{inst:?}");
        eprintln!("[{ip:>5}] {inst:<20}stack={stack_depth}");
        self.count += 1;
        if let Some(limit) = self.limit
            && self.count >= limit
        {
            eprintln!("--- trace limit reached ({limit} instructions) ---");
            self.stopped = true;
        }
    }

    fn on_iter_create(&mut self, direction: Direction, len: usize) {
        if !self.stopped {
            eprintln!("  +++ ITER {direction} len={len}");
        }
    }

    fn on_iter_exhausted(&mut self, ip: usize) {
        if !self.stopped {
            eprintln!("  --- EXHAUSTED at {ip}");
        }
    }

    fn on_return(&mut self, ip: usize) {
        if !self.stopped {
            eprintln!("  <<< RETURN at {ip}");
        }
    }
}

// ============================================================================
// ProfilingTracer
// ============================================================================

/// Tracer that counts executed instructions by name and iterator activity.
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    counts: HashMap<&'static str, u64>,
    total_instructions: u64,
    max_stack_depth: usize,
    iterators_created: u64,
    iterators_exhausted: u64,
}

/// Summary report from a profiling trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilingReport {
    /// Per-instruction counts, most frequent first; ties sorted by name.
    pub instruction_counts: Vec<(&'static str, u64)>,
    pub total_instructions: u64,
    pub max_stack_depth: usize,
    pub iterators_created: u64,
    pub iterators_exhausted: u64,
}

impl ProfilingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        let mut instruction_counts: Vec<_> = self.counts.iter().map(|(&k, &v)| (k, v)).collect();
        instruction_counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        ProfilingReport {
            instruction_counts,
            total_instructions: self.total_instructions,
            max_stack_depth: self.max_stack_depth,
            iterators_created: self.iterators_created,
            iterators_exhausted: self.iterators_exhausted,
        }
    }
}

impl VmTracer for ProfilingTracer {
    #[inline]
    fn on_instruction(&mut self, _ip: usize, inst: Inst, stack_depth: usize) {
        *self.counts.entry(inst.name()).or_insert(0) += 1;
        self.total_instructions += 1;
        self.max_stack_depth = self.max_stack_depth.max(stack_depth);
    }

    fn on_iter_create(&mut self, _direction: Direction, _len: usize) {
        self.iterators_created += 1;
    }

    fn on_iter_exhausted(&mut self, _ip: usize) {
        self.iterators_exhausted += 1;
    }
}

impl fmt::Display for ProfilingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== VM Profiling Report ===")?;
        writeln!(f, "Total instructions:  {}", self.total_instructions)?;
        writeln!(f, "Max stack depth:     {}", self.max_stack_depth)?;
        writeln!(f, "Iterators created:   {}", self.iterators_created)?;
        writeln!(f, "Iterators exhausted: {}", self.iterators_exhausted)?;
        writeln!(f)?;
        writeln!(f, "--- Instruction Frequency ---")?;
        for (name, count) in &self.instruction_counts {
            let pct = (*count as f64 / self.total_instructions as f64) * 100.0;
            writeln!(f, "  {name:<12} {count:>10}  ({pct:>5.1}%)")?;
        }
        Ok(())
    }
}

// ============================================================================
// RecordingTracer
// ============================================================================

/// Tracer that records every event.
///
/// Allocates per event, so use it for tests and short runs.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
    limit: Option<usize>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recording tracer that stops recording after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Vec::with_capacity(limit.min(1024)),
            limit: Some(limit),
        }
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    fn record(&mut self, event: TraceEvent) {
        if self.limit.is_none_or(|l| self.events.len() < l) {
            self.events.push(event);
        }
    }
}

impl VmTracer for RecordingTracer {
    fn on_instruction(&mut self, ip: usize, inst: Inst, stack_depth: usize) {
        self.record(TraceEvent::Instruction { ip, inst, stack_depth });
    }

    fn on_iter_create(&mut self, direction: Direction, len: usize) {
        self.record(TraceEvent::IterCreate { direction, len });
    }

    fn on_iter_exhausted(&mut self, ip: usize) {
        self.record(TraceEvent::IterExhausted { ip });
    }

    fn on_return(&mut self, ip: usize) {
        self.record(TraceEvent::Return { ip });
    }
}
