use std::{env, fs, process::ExitCode, time::Instant};

use strand::{CodeBuilder, FromObject, Inst, NoLimitTracker, Object, Runner, StdPrint, StderrTracer, VecTuple};

const USAGE: &str = "usage: strand <demo> [json-input | @file.json] [--trace]
demos: for-loop, cursor, reverse, calculate, tuple";

fn main() -> ExitCode {
    let mut trace = false;
    let mut positional = Vec::new();
    for arg in env::args().skip(1) {
        if arg == "--trace" {
            trace = true;
        } else {
            positional.push(arg);
        }
    }
    let Some(demo) = positional.first() else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let Some((runner, default_input)) = build_demo(demo) else {
        eprintln!("unknown demo: {demo}\n{USAGE}");
        return ExitCode::FAILURE;
    };
    let input = match positional.get(1).map(|arg| parse_input(arg)) {
        None => default_input,
        Some(Ok(input)) => input,
        Some(Err(err)) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!("{}", runner.code());
    let start = Instant::now();
    let mut print = StdPrint::new();
    let result = if trace {
        let tracer = StderrTracer::with_limit(10_000);
        runner.run_traced(vec![input], NoLimitTracker, &mut print, tracer).0
    } else {
        runner.run(vec![input], NoLimitTracker, &mut print)
    };
    print.flush();
    let elapsed = start.elapsed();

    let value = match result {
        Ok(value) => value,
        Err(err) => {
            eprintln!("error after: {elapsed:?}\n{err}");
            return ExitCode::FAILURE;
        }
    };
    eprintln!("success after: {elapsed:?}\n{}", value.repr());

    if demo == "tuple" {
        match VecTuple::<(i64, String)>::from_object(value) {
            Ok(VecTuple((count, text))) => eprintln!("as (i64, String): ({count}, {text:?})"),
            Err(err) => {
                eprintln!("cannot read result as (i64, String): {err}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

/// Returns the compiled demo and the input it runs on when none is given.
fn build_demo(name: &str) -> Option<(Runner, Object)> {
    let hello_42 = Object::Vec(vec![Object::from("Hello"), Object::Int(42)]);
    let mut b = CodeBuilder::new(name);
    let v = b.input();
    let input = match name {
        // for x in v { print(x) }; v
        "for-loop" | "reverse" => {
            b.emit(Inst::LoadLocal(v));
            b.emit(if name == "reverse" { Inst::IterRev } else { Inst::Iter });
            let head = b.offset();
            let exit = b.emit_for_iter();
            b.emit(Inst::Print);
            b.emit_jump(head);
            b.patch_jump(exit);
            b.emit(Inst::LoadLocal(v));
            hello_42
        }
        // it = v.iter(); while let Some(x) = it.next() { print(x) }; print("done")
        "cursor" => {
            let it = b.local();
            b.emit(Inst::LoadLocal(v));
            b.emit(Inst::Iter);
            b.emit(Inst::StoreLocal(it));
            let head = b.offset();
            b.emit(Inst::LoadLocal(it));
            let exit = b.emit_iter_next();
            b.emit(Inst::Print);
            b.emit_jump(head);
            b.patch_jump(exit);
            b.emit_const("done");
            b.emit(Inst::Print);
            b.emit(Inst::LoadUnit);
            hello_42
        }
        // total = 0; for x in v { total = total + x }; v.push(total); v
        "calculate" => {
            let total = b.local();
            b.emit_const(0_i64);
            b.emit(Inst::StoreLocal(total));
            b.emit(Inst::LoadLocal(v));
            b.emit(Inst::Iter);
            let head = b.offset();
            let exit = b.emit_for_iter();
            b.emit(Inst::LoadLocal(total));
            b.emit(Inst::Add);
            b.emit(Inst::StoreLocal(total));
            b.emit_jump(head);
            b.patch_jump(exit);
            b.emit(Inst::LoadLocal(v));
            b.emit(Inst::LoadLocal(total));
            b.emit(Inst::Push);
            b.emit(Inst::LoadLocal(v));
            Object::Vec(vec![Object::Int(1), Object::Int(2), Object::Int(3), Object::Int(4)])
        }
        // print(v[1]); v
        "tuple" => {
            b.emit(Inst::LoadLocal(v));
            b.emit_const(1_i64);
            b.emit(Inst::IndexGet);
            b.emit(Inst::Print);
            b.emit(Inst::LoadLocal(v));
            Object::Vec(vec![Object::Int(2), Object::from("Hello World")])
        }
        _ => return None,
    };
    b.emit(Inst::Return);
    match b.build().and_then(Runner::new) {
        Ok(runner) => Some((runner, input)),
        Err(err) => {
            eprintln!("error building {name}: {err}");
            None
        }
    }
}

/// Parses inline JSON, or the contents of a file when the argument starts with `@`.
fn parse_input(arg: &str) -> Result<Object, String> {
    let text = match arg.strip_prefix('@') {
        Some(path) => read_file(path)?,
        None => arg.to_owned(),
    };
    let json: serde_json::Value = serde_json::from_str(&text).map_err(|err| format!("invalid JSON input: {err}"))?;
    Object::from_json_value(json).map_err(|err| format!("unsupported input: {err}"))
}

fn read_file(file_path: &str) -> Result<String, String> {
    eprintln!("Reading file: {file_path}");
    match fs::metadata(file_path) {
        Ok(metadata) => {
            if !metadata.is_file() {
                return Err(format!("{file_path} is not a file"));
            }
        }
        Err(err) => {
            return Err(format!("cannot read {file_path}: {err}"));
        }
    }
    fs::read_to_string(file_path).map_err(|err| format!("cannot read {file_path}: {err}"))
}
