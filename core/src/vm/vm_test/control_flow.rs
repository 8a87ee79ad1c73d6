use super::*;

fn mark(_args: &[Val], ctx: &mut VmContext) -> anyhow::Result<Val> {
    ctx.set_global("touched", Val::Bool(true));
    Ok(Val::None)
}

#[test]
fn test_vm_false_branch_is_never_executed() {
    let mut b = CodeBuilder::new("<module>");
    let skip = b.new_label();
    b.load_const(crate::vm::Constant::Bool(false))
        .pop_jump_if_false(skip)
        .load_name("mark")
        .call(0)
        .emit(Opcode::PopTop)
        .bind(skip)
        .load_str("skipped")
        .ret();
    let mut ctx = VmContext::new();
    ctx.define_builtin("mark", mark);
    let out = exec_in(b.finish().unwrap(), &mut ctx).unwrap();
    assert_eq!(out, Val::str("skipped"));
    assert!(ctx.get_global("touched").is_none());
}

#[test]
fn test_vm_true_branch_runs_marker() {
    let mut b = CodeBuilder::new("<module>");
    let skip = b.new_label();
    b.load_int(1)
        .pop_jump_if_false(skip)
        .load_name("mark")
        .call(0)
        .emit(Opcode::PopTop)
        .bind(skip)
        .load_none()
        .ret();
    let mut ctx = VmContext::new();
    ctx.define_builtin("mark", mark);
    exec_in(b.finish().unwrap(), &mut ctx).unwrap();
    assert_eq!(ctx.get_global("touched"), Some(&Val::Bool(true)));
}

#[test]
fn test_vm_while_loop_counts_to_three() {
    // x = 0; while x < 3: x += 1; return x
    let mut b = CodeBuilder::new("<module>");
    let (top, exit, end) = (b.new_label(), b.new_label(), b.new_label());
    b.load_int(0).store_name("x").setup_loop(end);
    b.bind(top)
        .load_name("x")
        .load_int(3)
        .compare(CompareOp::Lt)
        .pop_jump_if_false(exit);
    b.load_name("x")
        .load_int(1)
        .emit(Opcode::InplaceAdd)
        .store_name("x")
        .jump(top);
    b.bind(exit).emit(Opcode::PopBlock);
    b.bind(end).load_name("x").ret();
    assert_eq!(exec_unit(b.finish().unwrap()).unwrap(), Val::Int(3));
}

#[test]
fn test_vm_for_range_sum() {
    // total = 0; for i in range(3): total += i; return total
    let mut b = CodeBuilder::new("<module>");
    let (top, exit, end) = (b.new_label(), b.new_label(), b.new_label());
    b.load_int(0).store_name("total").setup_loop(end);
    b.load_name("range").load_int(3).call(1).emit(Opcode::GetIter);
    b.bind(top).for_iter(exit).store_name("i");
    b.load_name("total")
        .load_name("i")
        .emit(Opcode::InplaceAdd)
        .store_name("total")
        .jump(top);
    b.bind(exit).emit(Opcode::PopBlock);
    b.bind(end).load_name("total").ret();
    assert_eq!(exec_unit(b.finish().unwrap()).unwrap(), Val::Int(3));
}

#[test]
fn test_vm_for_over_list_restores_depth_on_exhaustion() {
    let mut b = CodeBuilder::new("<module>");
    let (top, exit, end) = (b.new_label(), b.new_label(), b.new_label());
    b.load_str("below").setup_loop(end);
    b.load_int(1).load_int(2).build_list(2).emit(Opcode::GetIter);
    b.bind(top).for_iter(exit).emit(Opcode::PopTop).jump(top);
    b.bind(exit).emit(Opcode::PopBlock);
    b.bind(end).ret();
    assert_eq!(exec_unit(b.finish().unwrap()).unwrap(), Val::str("below"));
}

#[test]
fn test_vm_break_truncates_to_loop_depth() {
    let mut b = CodeBuilder::new("<module>");
    let end = b.new_label();
    b.load_str("below")
        .setup_loop(end)
        .load_int(1)
        .load_int(2)
        .emit(Opcode::BreakLoop)
        .emit(Opcode::PopBlock)
        .bind(end)
        .ret();
    assert_eq!(exec_unit(b.finish().unwrap()).unwrap(), Val::str("below"));
}

#[test]
fn test_vm_break_out_of_for_loop_drops_iterator() {
    // for i in range(10): if i == 4: break
    let mut b = CodeBuilder::new("<module>");
    let (top, exit, end, cont) = (b.new_label(), b.new_label(), b.new_label(), b.new_label());
    b.load_str("below").setup_loop(end);
    b.load_name("range").load_int(10).call(1).emit(Opcode::GetIter);
    b.bind(top).for_iter(exit).store_name("i");
    b.load_name("i")
        .load_int(4)
        .compare(CompareOp::Eq)
        .pop_jump_if_false(cont)
        .emit(Opcode::BreakLoop);
    b.bind(cont).jump(top);
    b.bind(exit).emit(Opcode::PopBlock);
    b.bind(end).load_name("i").build_tuple(2).ret();
    assert_eq!(exec_unit(b.finish().unwrap()).unwrap().repr(), "('below', 4)");
}

#[test]
fn test_vm_break_discards_except_block() {
    // while True: try: break except: return "handler"
    let mut b = CodeBuilder::new("<module>");
    let (handler, end) = (b.new_label(), b.new_label());
    b.load_str("below")
        .setup_loop(end)
        .load_int(1)
        .setup_except(handler)
        .load_int(2)
        .emit(Opcode::BreakLoop)
        .emit(Opcode::PopBlock)
        .emit(Opcode::PopBlock);
    b.bind(handler).load_str("handler").ret();
    b.bind(end).ret();
    assert_eq!(exec_unit(b.finish().unwrap()).unwrap(), Val::str("below"));
}

#[test]
fn test_vm_break_runs_enclosing_finally() {
    let mut b = CodeBuilder::new("<module>");
    let (fin, end) = (b.new_label(), b.new_label());
    b.setup_loop(end)
        .setup_finally(fin)
        .emit(Opcode::BreakLoop)
        .emit(Opcode::PopBlock)
        .load_none();
    b.bind(fin)
        .load_str("cleanup")
        .store_name("log")
        .emit(Opcode::EndFinally)
        .emit(Opcode::PopBlock);
    b.bind(end).load_name("log").ret();
    assert_eq!(exec_unit(b.finish().unwrap()).unwrap(), Val::str("cleanup"));
}

#[test]
fn test_vm_jump_to_offset_zero() {
    let mut ctx = VmContext::new().with_globals([("x", Val::Int(0))]);
    let mut b = CodeBuilder::new("<module>");
    let (top, done) = (b.new_label(), b.new_label());
    b.bind(top)
        .load_name("x")
        .load_int(1)
        .emit(Opcode::BinaryAdd)
        .emit(Opcode::DupTop)
        .store_name("x")
        .load_int(3)
        .compare(CompareOp::Lt)
        .pop_jump_if_false(done)
        .jump(top);
    b.bind(done).load_name("x").ret();
    let unit = b.finish().unwrap();
    assert_eq!(unit.code[..3], [Opcode::LoadName as u8, 0, 0]);
    assert_eq!(exec_in(unit, &mut ctx).unwrap(), Val::Int(3));
}

#[test]
fn test_vm_break_outside_loop_is_fatal() {
    let mut b = CodeBuilder::new("<module>");
    b.load_none().emit(Opcode::BreakLoop);
    let err = exec_unit(b.finish().unwrap()).unwrap_err();
    assert_eq!(err.kind(), FailureKind::BreakOutsideLoop);
    assert!(!err.kind().is_recoverable());
    let loc = err.location().unwrap();
    assert_eq!(loc.offset, 3);
    assert_eq!(loc.opcode, Some(Opcode::BreakLoop));
}

#[test]
fn test_vm_get_iter_on_int_raises_type_error() {
    let mut b = CodeBuilder::new("<module>");
    b.load_int(5).emit(Opcode::GetIter).ret();
    let err = exec_unit(b.finish().unwrap()).unwrap_err();
    assert_eq!(err.exception().unwrap().kind, ExcType::TypeError);
}

#[test]
fn test_vm_unknown_opcode_is_fatal() {
    let err = exec_unit(raw_unit(vec![Opcode::Nop as u8, 0xFF])).unwrap_err();
    assert_eq!(err.kind(), FailureKind::UnsupportedOpcode);
    assert!(matches!(err, VmError::UnsupportedOpcode { byte: 0xFF, .. }));
    assert_eq!(err.location().unwrap().offset, 1);
}

#[test]
fn test_vm_truncated_operand_is_malformed() {
    let err = exec_unit(raw_unit(vec![Opcode::LoadConst as u8, 0])).unwrap_err();
    assert_eq!(err.kind(), FailureKind::MalformedCode);
}

#[test]
fn test_vm_bad_const_index_is_malformed() {
    let err = exec_unit(raw_unit(vec![Opcode::LoadConst as u8, 7, 0])).unwrap_err();
    assert_eq!(err.kind(), FailureKind::MalformedCode);
}

#[test]
fn test_vm_jump_out_of_range_is_malformed() {
    let err = exec_unit(raw_unit(vec![Opcode::JumpAbsolute as u8, 100, 0])).unwrap_err();
    assert_eq!(err.kind(), FailureKind::MalformedCode);
}

#[test]
fn test_vm_pop_on_empty_stack_underflows() {
    let err = exec_unit(raw_unit(vec![Opcode::PopTop as u8])).unwrap_err();
    assert_eq!(err.kind(), FailureKind::StackUnderflow);
}

#[test]
fn test_vm_pop_block_on_empty_block_stack_underflows() {
    let err = exec_unit(raw_unit(vec![Opcode::PopBlock as u8])).unwrap_err();
    assert_eq!(err.kind(), FailureKind::StackUnderflow);
}

#[test]
fn test_vm_fatal_faults_bypass_handlers() {
    let mut b = CodeBuilder::new("<module>");
    let handler = b.new_label();
    b.setup_except(handler).emit(Opcode::PopTop);
    b.bind(handler).load_str("caught").ret();
    let err = exec_unit(b.finish().unwrap()).unwrap_err();
    assert_eq!(err.kind(), FailureKind::StackUnderflow);
}

#[test]
fn test_vm_reusable_after_fatal_fault() {
    let mut vm = Vm::new();
    let mut ctx = VmContext::new();
    let bad = Arc::new(raw_unit(vec![Opcode::PopTop as u8]));
    assert!(vm.execute(&bad, &mut ctx).is_err());
    assert_eq!(vm.frame_depth(), 0);

    let mut b = CodeBuilder::new("<module>");
    b.load_int(1).ret();
    let good = Arc::new(b.finish().unwrap());
    assert_eq!(vm.execute(&good, &mut ctx).unwrap(), Val::Int(1));
}
