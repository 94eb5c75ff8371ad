//! Tests for the `VmTracer` implementations attached through `Runner::run_traced`.

use pretty_assertions::assert_eq;
use strand::{
    CodeBuilder, Direction, ErrorKind, Inst, NoLimitTracker, NoPrint, Object, ProfilingTracer, RecordingTracer,
    Runner, TraceEvent,
};

/// `for x in [1] { print(x) } return ()`
fn single_element_loop() -> Runner {
    let mut b = CodeBuilder::new("loop");
    b.emit_const(Object::Vec(vec![Object::Int(1)]));
    b.emit(Inst::Iter);
    let head = b.offset();
    let exit = b.emit_for_iter();
    b.emit(Inst::Print);
    b.emit_jump(head);
    b.patch_jump(exit);
    b.emit(Inst::LoadUnit);
    b.emit(Inst::Return);
    Runner::new(b.build().unwrap()).unwrap()
}

#[test]
fn recording_tracer_captures_loop() {
    let (result, tracer) =
        single_element_loop().run_traced(vec![], NoLimitTracker, &mut NoPrint, RecordingTracer::new());
    assert_eq!(result.unwrap(), Object::Unit);

    let instruction = |ip, inst, stack_depth| TraceEvent::Instruction { ip, inst, stack_depth };
    assert_eq!(
        tracer.into_events(),
        vec![
            instruction(0, Inst::LoadConst(0), 0),
            instruction(1, Inst::Iter, 1),
            TraceEvent::IterCreate {
                direction: Direction::Forward,
                len: 1,
            },
            instruction(2, Inst::ForIter(5), 1),
            instruction(3, Inst::Print, 2),
            instruction(4, Inst::Jump(2), 1),
            instruction(2, Inst::ForIter(5), 1),
            TraceEvent::IterExhausted { ip: 2 },
            instruction(5, Inst::LoadUnit, 0),
            instruction(6, Inst::Return, 1),
            TraceEvent::Return { ip: 6 },
        ]
    );
}

#[test]
fn recording_limit_caps_events() {
    let (_, tracer) =
        single_element_loop().run_traced(vec![], NoLimitTracker, &mut NoPrint, RecordingTracer::with_limit(3));
    assert_eq!(tracer.events().len(), 3);
}

#[test]
fn profiling_tracer_counts_instructions() {
    let (_, tracer) = single_element_loop().run_traced(vec![], NoLimitTracker, &mut NoPrint, ProfilingTracer::new());
    let report = tracer.report();
    assert_eq!(report.total_instructions, 8);
    assert_eq!(report.max_stack_depth, 2);
    assert_eq!(report.iterators_created, 1);
    assert_eq!(report.iterators_exhausted, 1);
    assert_eq!(report.instruction_counts[0], ("ForIter", 2));
    assert_eq!(report.instruction_counts.len(), 7);
    assert!(report.to_string().contains("ForIter"));
}

/// The tracer comes back from a failed run with the events up to the failure.
#[test]
fn tracer_survives_failed_run() {
    let mut b = CodeBuilder::new("fail");
    b.emit(Inst::LoadUnit);
    b.emit(Inst::Len);
    let runner = Runner::new(b.build().unwrap()).unwrap();

    let (result, tracer) = runner.run_traced(vec![], NoLimitTracker, &mut NoPrint, RecordingTracer::new());
    assert_eq!(result.unwrap_err().kind(), ErrorKind::TypeMismatch);
    assert_eq!(
        tracer.events().last(),
        Some(&TraceEvent::Instruction {
            ip: 1,
            inst: Inst::Len,
            stack_depth: 1,
        })
    );
}
