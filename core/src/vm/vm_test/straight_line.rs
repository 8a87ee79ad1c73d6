use super::*;

#[test]
fn test_vm_store_load_add() {
    // x = 2; y = 3; return x + y
    let mut b = CodeBuilder::new("<module>");
    b.load_int(2)
        .store_name("x")
        .load_int(3)
        .store_name("y")
        .load_name("x")
        .load_name("y")
        .emit(Opcode::BinaryAdd)
        .ret();
    let mut ctx = VmContext::new();
    let out = exec_in(b.finish().unwrap(), &mut ctx).unwrap();
    assert_eq!(out, Val::Int(5));
    assert_eq!(ctx.get_global("x"), Some(&Val::Int(2)));
    assert_eq!(ctx.get_global("y"), Some(&Val::Int(3)));
}

#[test]
fn test_vm_empty_unit_returns_none() {
    let out = exec_unit(CodeBuilder::new("empty").finish().unwrap()).unwrap();
    assert!(matches!(out, Val::None));
}

#[test]
fn test_vm_falling_off_the_end_returns_none() {
    let mut b = CodeBuilder::new("<module>");
    b.load_int(1).store_name("x");
    let out = exec_unit(b.finish().unwrap()).unwrap();
    assert!(matches!(out, Val::None));
}

#[test]
fn test_vm_stack_shuffles() {
    let mut b = CodeBuilder::new("<module>");
    // [1, 2, 3] -> ROT_THREE -> [3, 1, 2]
    b.load_int(1)
        .load_int(2)
        .load_int(3)
        .emit(Opcode::RotThree)
        .build_tuple(3)
        // [t, "a", "b"] -> ROT_TWO -> [t, "b", "a"]
        .load_str("a")
        .load_str("b")
        .emit(Opcode::RotTwo)
        // duplicate "a", drop the copy
        .emit(Opcode::DupTop)
        .emit(Opcode::PopTop)
        .emit(Opcode::Nop)
        .build_tuple(3)
        .ret();
    let out = exec_unit(b.finish().unwrap()).unwrap();
    assert_eq!(out.repr(), "((3, 1, 2), 'b', 'a')");
}

#[test]
fn test_vm_arithmetic_mix() {
    // (7 // 2, 7 % -3, 7 / 2, -(4 * 5), 10 - 4)
    let mut b = CodeBuilder::new("<module>");
    b.load_int(7).load_int(2).emit(Opcode::BinaryFloorDivide);
    b.load_int(7).load_int(-3).emit(Opcode::BinaryModulo);
    b.load_int(7).load_int(2).emit(Opcode::BinaryTrueDivide);
    b.load_int(4)
        .load_int(5)
        .emit(Opcode::BinaryMultiply)
        .emit(Opcode::UnaryNegative);
    b.load_int(10).load_int(4).emit(Opcode::InplaceSubtract);
    b.build_tuple(5).ret();
    let out = exec_unit(b.finish().unwrap()).unwrap();
    assert_eq!(out.repr(), "(3, -2, 3.5, -20, 6)");
}

#[test]
fn test_vm_strings_lists_and_subscripts() {
    let mut b = CodeBuilder::new("<module>");
    b.load_str("ab").load_str("cd").emit(Opcode::InplaceAdd);
    b.load_int(1)
        .load_int(2)
        .load_int(3)
        .build_list(3)
        .load_int(-1)
        .emit(Opcode::BinarySubscr);
    b.load_str("xy").load_int(3).emit(Opcode::InplaceMultiply);
    b.build_list(3).ret();
    let out = exec_unit(b.finish().unwrap()).unwrap();
    assert_eq!(out, Val::list(vec![Val::str("abcd"), Val::Int(3), Val::str("xyxyxy")]));
}

#[test]
fn test_vm_compare_ops_push_bools() {
    let mut b = CodeBuilder::new("<module>");
    b.load_int(1).load_int(2).compare(CompareOp::Lt);
    b.load_int(2)
        .load_const(crate::vm::Constant::Float(2.0))
        .compare(CompareOp::Eq);
    b.load_str("b")
        .load_str("abc")
        .compare(CompareOp::In);
    b.load_none().load_none().compare(CompareOp::IsNot);
    b.load_int(3).emit(Opcode::UnaryNot);
    b.build_tuple(5).ret();
    let out = exec_unit(b.finish().unwrap()).unwrap();
    assert_eq!(out.repr(), "(True, True, True, False, False)");
}

#[test]
fn test_vm_integer_overflow_raises() {
    let mut b = CodeBuilder::new("<module>");
    b.load_int(i64::MAX).load_int(1).emit(Opcode::BinaryAdd).ret();
    let err = exec_unit(b.finish().unwrap()).unwrap_err();
    assert_eq!(err.kind(), FailureKind::GuestRaised);
    assert_eq!(err.exception().unwrap().kind, ExcType::OverflowError);
}

#[test]
fn test_vm_oversized_repeat_raises_before_allocating() {
    let mut b = CodeBuilder::new("<module>");
    b.load_int(1)
        .build_list(1)
        .load_int(10i64.pow(17))
        .emit(Opcode::BinaryMultiply)
        .ret();
    let err = exec_unit(b.finish().unwrap()).unwrap_err();
    assert_eq!(err.kind(), FailureKind::GuestRaised);
    assert_eq!(err.exception().unwrap().kind, ExcType::OverflowError);

    let mut b = CodeBuilder::new("<module>");
    b.load_str("ab").load_int(1 << 62).emit(Opcode::BinaryMultiply).ret();
    let err = exec_unit(b.finish().unwrap()).unwrap_err();
    assert_eq!(err.exception().unwrap().kind, ExcType::OverflowError);
}

#[test]
fn test_vm_type_mismatch_raises_type_error() {
    let mut b = CodeBuilder::new("<module>");
    b.load_str("a").load_int(1).emit(Opcode::BinaryAdd).ret();
    let err = exec_unit(b.finish().unwrap()).unwrap_err();
    assert_eq!(err.exception().unwrap().kind, ExcType::TypeError);
}

#[test]
fn test_vm_execute_with_locals_keeps_stores_local() {
    let mut b = CodeBuilder::new("<locals>");
    b.load_name("a")
        .load_int(2)
        .emit(Opcode::BinaryAdd)
        .store_name("z")
        .load_name("z")
        .ret();
    let unit = Arc::new(b.finish().unwrap());
    let mut ctx = VmContext::new();
    let mut vm = Vm::new();
    let out = vm
        .execute_with(&unit, &mut ctx, Some(&[("a", Val::Int(40))]))
        .unwrap();
    assert_eq!(out, Val::Int(42));
    assert!(ctx.get_global("z").is_none());
}

#[test]
fn test_vm_execute_with_binds_matching_varnames_into_slots() {
    let mut b = CodeBuilder::new("<slots>");
    b.load_fast("n").load_int(1).emit(Opcode::BinaryAdd).ret();
    let unit = Arc::new(b.finish().unwrap());
    let mut ctx = VmContext::new();
    let out = Vm::new()
        .execute_with(&unit, &mut ctx, Some(&[("n", Val::Int(9))]))
        .unwrap();
    assert_eq!(out, Val::Int(10));
}

#[test]
fn test_vm_globals_and_builtins_resolution() {
    let mut b = CodeBuilder::new("<module>");
    b.load_global("seed")
        .load_int(1)
        .emit(Opcode::BinaryAdd)
        .store_global("seed")
        .load_name("len")
        .load_str("four")
        .call(1)
        .load_global("seed")
        .build_tuple(2)
        .ret();
    let mut ctx = VmContext::new().with_globals([("seed", Val::Int(41))]);
    let out = exec_in(b.finish().unwrap(), &mut ctx).unwrap();
    assert_eq!(out.repr(), "(4, 42)");
    let names: Vec<_> = ctx.globals().map(|(name, val)| (name.to_string(), val.clone())).collect();
    assert_eq!(names, vec![("seed".to_string(), Val::Int(42))]);
}

#[test]
fn test_vm_delete_name_unbinds() {
    let mut b = CodeBuilder::new("<module>");
    b.load_int(1)
        .store_name("gone")
        .delete_name("gone")
        .load_name("gone")
        .ret();
    let mut ctx = VmContext::new();
    let err = exec_in(b.finish().unwrap(), &mut ctx).unwrap_err();
    assert_eq!(err.kind(), FailureKind::UndefinedName);
    assert!(ctx.get_global("gone").is_none());
    assert!(ctx.globals().all(|(name, _)| name.as_ref() != "gone"));
}

#[test]
fn test_vm_print_is_captured() {
    let mut b = CodeBuilder::new("<module>");
    b.load_name("print")
        .load_str("hi")
        .load_int(3)
        .call(2)
        .emit(Opcode::PopTop);
    let mut ctx = VmContext::new().capture_output();
    exec_in(b.finish().unwrap(), &mut ctx).unwrap();
    assert_eq!(ctx.take_output(), vec!["hi 3".to_string()]);
}
