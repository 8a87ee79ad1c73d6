use super::*;

use crate::vm::CodeBuilder as B;

/// Handler prologue: if the raised type matches `pattern` (a builtin name),
/// drop the triple and return `result`; otherwise re-raise.
fn emit_handler(b: &mut B, pattern: &[&str], result: &str) {
    let reraise = b.new_label();
    b.emit(Opcode::DupTop);
    for name in pattern {
        b.load_name(name);
    }
    if pattern.len() > 1 {
        b.build_tuple(pattern.len());
    }
    b.compare(CompareOp::ExcMatch)
        .pop_jump_if_false(reraise)
        .emit(Opcode::PopTop)
        .emit(Opcode::PopTop)
        .emit(Opcode::PopTop)
        .load_str(result)
        .ret();
    b.bind(reraise).emit(Opcode::EndFinally);
}

/// try: 1 / 0 except <pattern>: return "handled"
fn divide_by_zero_guarded(pattern: &[&str]) -> CodeUnit {
    let mut b = B::new("<module>");
    let handler = b.new_label();
    b.setup_except(handler)
        .load_int(1)
        .load_int(0)
        .emit(Opcode::BinaryTrueDivide)
        .emit(Opcode::PopTop)
        .emit(Opcode::PopBlock)
        .load_str("not reached")
        .ret();
    b.bind(handler);
    emit_handler(&mut b, pattern, "handled");
    b.finish().unwrap()
}

#[test]
fn test_vm_zero_division_handled() {
    let out = exec_unit(divide_by_zero_guarded(&["ZeroDivisionError"])).unwrap();
    assert_eq!(out, Val::str("handled"));
}

#[test]
fn test_vm_handler_matches_parent_type() {
    let out = exec_unit(divide_by_zero_guarded(&["ArithmeticError"])).unwrap();
    assert_eq!(out, Val::str("handled"));
}

#[test]
fn test_vm_handler_matches_tuple_of_types() {
    let out = exec_unit(divide_by_zero_guarded(&["TypeError", "ZeroDivisionError"])).unwrap();
    assert_eq!(out, Val::str("handled"));
}

#[test]
fn test_vm_unmatched_handler_reraises() {
    let err = exec_unit(divide_by_zero_guarded(&["TypeError"])).unwrap_err();
    assert_eq!(err.kind(), FailureKind::GuestRaised);
    let exc = err.exception().unwrap();
    assert_eq!(exc.kind, ExcType::ZeroDivisionError);
    // Re-raising keeps the original raise site.
    let loc = err.location().unwrap();
    assert_eq!(loc.opcode, Some(Opcode::BinaryTrueDivide));
}

#[test]
fn test_vm_unhandled_name_error_is_structured() {
    let mut b = B::new("<module>");
    b.load_name("missing").ret();
    let err = exec_unit(b.finish().unwrap()).unwrap_err();
    assert_eq!(err.kind(), FailureKind::UndefinedName);
    assert!(err.kind().is_recoverable());
    assert_eq!(err.exception().unwrap().message(), "name 'missing' is not defined");
    let failure = err.failure().unwrap();
    assert_eq!(failure.traceback.len(), 1);
    assert_eq!(failure.traceback[0].offset, 0);
    assert_eq!(failure.traceback[0].opcode, Some(Opcode::LoadName));
    assert!(err.to_string().contains("NameError"));
}

#[test]
fn test_vm_name_error_can_be_caught() {
    let mut b = B::new("<module>");
    let handler = b.new_label();
    b.setup_except(handler).load_name("missing").ret();
    b.bind(handler);
    emit_handler(&mut b, &["NameError"], "recovered");
    assert_eq!(exec_unit(b.finish().unwrap()).unwrap(), Val::str("recovered"));
}

#[test]
fn test_vm_handler_truncates_to_block_depth() {
    let mut b = B::new("<module>");
    let handler = b.new_label();
    b.load_str("keep")
        .setup_except(handler)
        .load_int(1)
        .load_int(2)
        .load_name("ValueError")
        .raise(1);
    b.bind(handler)
        .emit(Opcode::PopTop)
        .emit(Opcode::PopTop)
        .emit(Opcode::PopTop)
        .ret();
    assert_eq!(exec_unit(b.finish().unwrap()).unwrap(), Val::str("keep"));
}

#[test]
fn test_vm_raise_in_for_body_drops_iterator() {
    // try: for i in range(3): raise ValueError except: return ("below",)
    let mut b = B::new("<module>");
    let (handler, top, exit, end) = (b.new_label(), b.new_label(), b.new_label(), b.new_label());
    b.setup_except(handler).setup_loop(end);
    b.load_name("range").load_int(3).call(1).emit(Opcode::GetIter);
    b.bind(top)
        .for_iter(exit)
        .store_name("i")
        .load_name("ValueError")
        .raise(1);
    b.bind(exit).emit(Opcode::PopBlock);
    b.bind(end).emit(Opcode::PopBlock).load_str("not reached").ret();
    b.bind(handler)
        .emit(Opcode::PopTop)
        .emit(Opcode::PopTop)
        .emit(Opcode::PopTop)
        .load_str("below")
        .build_tuple(1)
        .ret();
    let mut ctx = VmContext::new();
    let out = exec_in(b.finish().unwrap(), &mut ctx).unwrap();
    assert_eq!(out.repr(), "('below',)");
    assert_eq!(ctx.get_global("i"), Some(&Val::Int(0)));
}

#[test]
fn test_vm_handler_sees_type_value_traceback() {
    let mut b = B::new("<module>");
    let handler = b.new_label();
    b.setup_except(handler)
        .load_name("ValueError")
        .load_str("boom")
        .call(1)
        .raise(1);
    // [traceback, value, type]: keep the whole triple as a tuple.
    b.bind(handler).build_tuple(3).ret();
    let out = exec_unit(b.finish().unwrap()).unwrap();
    let Val::Tuple(items) = out else {
        panic!("expected a tuple, got {out:?}");
    };
    assert!(matches!(&items[0], Val::Traceback(tb) if tb.len() == 1));
    assert_eq!(items[1].repr(), "ValueError('boom')");
    assert_eq!(items[2], Val::ExcType(ExcType::ValueError));
}

#[test]
fn test_vm_finally_runs_on_return() {
    let mut b = B::new("<module>");
    let fin = b.new_label();
    b.setup_finally(fin)
        .load_str("body")
        .ret()
        .emit(Opcode::PopBlock)
        .load_none();
    b.bind(fin)
        .load_str("ran")
        .store_name("cleanup")
        .emit(Opcode::EndFinally)
        .load_str("after")
        .ret();
    let mut ctx = VmContext::new();
    let out = exec_in(b.finish().unwrap(), &mut ctx).unwrap();
    assert_eq!(out, Val::str("body"));
    assert_eq!(ctx.get_global("cleanup"), Some(&Val::str("ran")));
}

#[test]
fn test_vm_return_runs_nested_finally_innermost_first() {
    // x = ""; while True: try: try: return "rv" finally: x += "a" finally: x += "b"
    let mut b = B::new("<module>");
    let (outer, inner, end) = (b.new_label(), b.new_label(), b.new_label());
    b.load_str("").store_name("x").setup_loop(end);
    b.setup_finally(outer)
        .setup_finally(inner)
        .load_str("rv")
        .ret();
    b.bind(inner)
        .load_name("x")
        .load_str("a")
        .emit(Opcode::InplaceAdd)
        .store_name("x")
        .emit(Opcode::EndFinally);
    b.bind(outer)
        .load_name("x")
        .load_str("b")
        .emit(Opcode::InplaceAdd)
        .store_name("x")
        .emit(Opcode::EndFinally);
    b.bind(end).load_str("fell through").ret();
    let mut ctx = VmContext::new();
    let out = exec_in(b.finish().unwrap(), &mut ctx).unwrap();
    assert_eq!(out, Val::str("rv"));
    assert_eq!(ctx.get_global("x"), Some(&Val::str("ab")));
}

#[test]
fn test_vm_finally_runs_on_normal_exit() {
    let mut b = B::new("<module>");
    let fin = b.new_label();
    b.setup_finally(fin)
        .emit(Opcode::Nop)
        .emit(Opcode::PopBlock)
        .load_none();
    b.bind(fin)
        .load_str("ran")
        .store_name("cleanup")
        .emit(Opcode::EndFinally)
        .load_str("after")
        .ret();
    let mut ctx = VmContext::new();
    let out = exec_in(b.finish().unwrap(), &mut ctx).unwrap();
    assert_eq!(out, Val::str("after"));
    assert_eq!(ctx.get_global("cleanup"), Some(&Val::str("ran")));
}

#[test]
fn test_vm_finally_reraises_after_cleanup() {
    let mut b = B::new("<module>");
    let fin = b.new_label();
    b.setup_finally(fin)
        .load_name("ValueError")
        .load_str("boom")
        .call(1)
        .raise(1);
    b.bind(fin)
        .load_str("ran")
        .store_name("cleanup")
        .emit(Opcode::EndFinally)
        .load_str("after")
        .ret();
    let mut ctx = VmContext::new();
    let err = exec_in(b.finish().unwrap(), &mut ctx).unwrap_err();
    assert_eq!(err.exception().unwrap().kind, ExcType::ValueError);
    assert_eq!(err.exception().unwrap().message(), "boom");
    assert_eq!(ctx.get_global("cleanup"), Some(&Val::str("ran")));
}

#[test]
fn test_vm_except_inside_finally_both_run() {
    // try: try: raise KeyError except KeyError: x = "caught" finally: y = "ran"
    let mut b = B::new("<module>");
    let (fin, handler, after) = (b.new_label(), b.new_label(), b.new_label());
    b.setup_finally(fin).setup_except(handler);
    b.load_name("KeyError").raise(1);
    b.bind(handler)
        .emit(Opcode::PopTop)
        .emit(Opcode::PopTop)
        .emit(Opcode::PopTop)
        .load_str("caught")
        .store_name("x")
        .jump_forward(after);
    b.bind(after).emit(Opcode::PopBlock).load_none();
    b.bind(fin)
        .load_str("ran")
        .store_name("y")
        .emit(Opcode::EndFinally)
        .load_name("x")
        .load_name("y")
        .build_tuple(2)
        .ret();
    let out = exec_unit(b.finish().unwrap()).unwrap();
    assert_eq!(out.repr(), "('caught', 'ran')");
}

#[test]
fn test_vm_raise_with_cause() {
    let mut b = B::new("<module>");
    b.load_name("ValueError")
        .load_str("outer")
        .call(1)
        .load_name("KeyError")
        .raise(2);
    let err = exec_unit(b.finish().unwrap()).unwrap_err();
    let exc = err.exception().unwrap();
    assert_eq!(exc.kind, ExcType::ValueError);
    assert_eq!(exc.cause.as_ref().unwrap().kind, ExcType::KeyError);
    let source = std::error::Error::source(exc).unwrap();
    assert_eq!(source.to_string(), "KeyError");
}

#[test]
fn test_vm_raise_with_none_cause() {
    let mut b = B::new("<module>");
    b.load_name("ValueError").load_none().raise(2);
    let err = exec_unit(b.finish().unwrap()).unwrap_err();
    let exc = err.exception().unwrap();
    assert_eq!(exc.kind, ExcType::ValueError);
    assert!(exc.cause.is_none());
}

#[test]
fn test_vm_raise_type_instantiates_it() {
    let mut b = B::new("<module>");
    b.load_name("IndexError").raise(1);
    let err = exec_unit(b.finish().unwrap()).unwrap_err();
    let exc = err.exception().unwrap();
    assert_eq!(exc.kind, ExcType::IndexError);
    assert!(exc.message.is_none());
}

#[test]
fn test_vm_raise_non_exception_is_type_error() {
    let mut b = B::new("<module>");
    b.load_int(3).raise(1);
    let err = exec_unit(b.finish().unwrap()).unwrap_err();
    assert_eq!(err.exception().unwrap().kind, ExcType::TypeError);
}

#[test]
fn test_vm_raise_zero_args_is_malformed() {
    // The builder refuses RAISE_VARARGS 0, so hand-assemble it.
    let err = exec_unit(raw_unit(vec![Opcode::RaiseVarargs as u8, 0])).unwrap_err();
    assert_eq!(err.kind(), FailureKind::MalformedCode);
}

#[test]
fn test_vm_end_finally_with_garbage_is_malformed() {
    let mut b = B::new("<module>");
    b.load_int(1).emit(Opcode::EndFinally);
    let err = exec_unit(b.finish().unwrap()).unwrap_err();
    assert_eq!(err.kind(), FailureKind::MalformedCode);
}

fn fail_with_value_error(_args: &[Val], _ctx: &mut VmContext) -> anyhow::Result<Val> {
    Err(Exception::value_error("bad input").into())
}

fn fail_plainly(_args: &[Val], _ctx: &mut VmContext) -> anyhow::Result<Val> {
    Err(anyhow::anyhow!("disk on fire"))
}

#[test]
fn test_vm_native_exception_keeps_its_type() {
    let mut b = B::new("<module>");
    let handler = b.new_label();
    b.setup_except(handler).load_name("fail").call(0).ret();
    b.bind(handler);
    emit_handler(&mut b, &["ValueError"], "handled");
    let mut ctx = VmContext::new();
    ctx.define_builtin("fail", fail_with_value_error);
    assert_eq!(exec_in(b.finish().unwrap(), &mut ctx).unwrap(), Val::str("handled"));
}

#[test]
fn test_vm_native_plain_error_becomes_runtime_error() {
    let mut b = B::new("<module>");
    b.load_name("fail").call(0).ret();
    let mut ctx = VmContext::new();
    ctx.define_builtin("fail", fail_plainly);
    let err = exec_in(b.finish().unwrap(), &mut ctx).unwrap_err();
    let exc = err.exception().unwrap();
    assert_eq!(exc.kind, ExcType::RuntimeError);
    assert_eq!(exc.message(), "disk on fire");
}

#[test]
fn test_vm_native_arity_error_is_type_error() {
    let mut b = B::new("<module>");
    b.load_name("len").call(0).ret();
    let err = exec_unit(b.finish().unwrap()).unwrap_err();
    let exc = err.exception().unwrap();
    assert_eq!(exc.kind, ExcType::TypeError);
    assert_eq!(exc.message(), "len() takes exactly 1 argument (0 given)");
}

#[test]
fn test_vm_failure_report_lists_frames_outermost_first() {
    let mut inner = B::new("inner");
    inner.load_name("ValueError").load_str("deep").call(1).raise(1);
    let mut b = B::new("<module>");
    b.make_function(inner.finish().unwrap(), "inner")
        .call(0)
        .ret();
    let err = exec_unit(b.finish().unwrap()).unwrap_err();
    let report = err.failure().unwrap().report();
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines[0], "Traceback (most recent call last):");
    assert!(lines[1].contains("<module>@"), "{report}");
    assert!(lines[2].contains("inner@"), "{report}");
    assert_eq!(lines[3], "ValueError: deep");
}
