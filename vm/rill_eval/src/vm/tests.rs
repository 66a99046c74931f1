use super::*;
use crate::print_handler::buffer_handler;
use pretty_assertions::assert_eq;
use rill_runtime::VmErrorKind;

fn op(o: Op) -> Slot {
    Slot::Op(o)
}

fn int(n: i64) -> Slot {
    Slot::Value(Value::int(n))
}

fn text(s: &str) -> Slot {
    Slot::Value(Value::string(s))
}

fn boolean(b: bool) -> Slot {
    Slot::Value(Value::bool(b))
}

fn run(slots: Vec<Slot>) -> VmResult {
    Vm::new().execute(&Code::from(slots))
}

fn error_kind(result: VmResult) -> VmErrorKind {
    match result {
        Ok(value) => panic!("expected error, got {value}"),
        Err(err) => err.kind,
    }
}

#[test]
fn empty_program_yields_null() {
    assert_eq!(run(vec![]), Ok(Value::Null));
}

#[test]
fn exhausted_stream_yields_top_of_stack() {
    assert_eq!(run(vec![op(Op::Push), int(4)]), Ok(Value::int(4)));
}

#[test]
fn add_program() {
    let result = run(vec![op(Op::Push), int(2), op(Op::Push), int(3), op(Op::Add), op(Op::Return)]);
    assert_eq!(result, Ok(Value::int(5)));
}

#[test]
fn sub_pops_rhs_first() {
    let result = run(vec![op(Op::Push), int(5), op(Op::Push), int(3), op(Op::Sub), op(Op::Return)]);
    assert_eq!(result, Ok(Value::int(2)));
}

#[test]
fn div_and_mod() {
    let result = run(vec![op(Op::Push), int(17), op(Op::Push), int(5), op(Op::Div), op(Op::Return)]);
    assert_eq!(result, Ok(Value::int(3)));
    let result = run(vec![op(Op::Push), int(17), op(Op::Push), int(5), op(Op::Mod), op(Op::Return)]);
    assert_eq!(result, Ok(Value::int(2)));
}

#[test]
fn division_by_zero_is_reported() {
    let result = run(vec![op(Op::Push), int(1), op(Op::Push), int(0), op(Op::Div)]);
    assert_eq!(error_kind(result), VmErrorKind::DivisionByZero);
}

#[test]
fn integer_overflow_is_reported() {
    let result = run(vec![op(Op::Push), int(i64::MAX), op(Op::Push), int(1), op(Op::Add)]);
    assert!(matches!(
        error_kind(result),
        VmErrorKind::IntegerOverflow { .. }
    ));
}

#[test]
fn arithmetic_requires_ints() {
    let result = run(vec![op(Op::Push), int(1), op(Op::Push), text("x"), op(Op::Add)]);
    assert!(matches!(error_kind(result), VmErrorKind::TypeMismatch { .. }));
}

#[test]
fn pop_on_empty_stack_underflows() {
    let result = run(vec![op(Op::Add)]);
    assert!(matches!(
        error_kind(result),
        VmErrorKind::StackUnderflow { .. }
    ));
}

#[test]
fn pop_discards_top() {
    let result = run(vec![op(Op::Push), int(1), op(Op::Push), int(2), op(Op::Pop), op(Op::Return)]);
    assert_eq!(result, Ok(Value::int(1)));
}

#[test]
fn and_program() {
    let result = run(vec![
        op(Op::Push),
        boolean(true),
        op(Op::Push),
        boolean(false),
        op(Op::And),
        op(Op::Return),
    ]);
    assert_eq!(result, Ok(Value::bool(false)));
}

#[test]
fn or_program() {
    let result = run(vec![
        op(Op::Push),
        boolean(false),
        op(Op::Push),
        boolean(true),
        op(Op::Or),
        op(Op::Return),
    ]);
    assert_eq!(result, Ok(Value::bool(true)));
}

#[test]
fn xor_is_unsupported() {
    let result = run(vec![op(Op::Push), boolean(true), op(Op::Push), boolean(true), op(Op::Xor)]);
    assert!(matches!(
        error_kind(result),
        VmErrorKind::UnsupportedOperation { .. }
    ));
}

#[test]
fn comparison_programs() {
    let cases = [
        (Op::Eq, 2, 2, true),
        (Op::Eq, 2, 3, false),
        (Op::NotEq, 2, 3, true),
        (Op::Lt, 2, 3, true),
        (Op::Lt, 3, 2, false),
        (Op::Lte, 2, 2, true),
        (Op::Gt, 3, 2, true),
        (Op::Gte, 2, 3, false),
    ];
    for (cmp, a, b, expected) in cases {
        let result = run(vec![op(Op::Push), int(a), op(Op::Push), int(b), op(cmp), op(Op::Return)]);
        assert_eq!(result, Ok(Value::bool(expected)), "{cmp} {a} {b}");
    }
}

#[test]
fn ordering_on_bools_is_unsupported() {
    let result = run(vec![op(Op::Push), boolean(true), op(Op::Push), boolean(false), op(Op::Lt)]);
    assert!(matches!(
        error_kind(result),
        VmErrorKind::UnsupportedOperation { .. }
    ));
}

#[test]
fn declare_binds_null() {
    let result = run(vec![
        op(Op::DeclareVar),
        text("x"),
        op(Op::GetVar),
        text("x"),
        op(Op::Return),
    ]);
    assert_eq!(result, Ok(Value::Null));
}

#[test]
fn declare_assign_then_get() {
    let result = run(vec![
        op(Op::Push),
        int(123),
        op(Op::DeclareAssign),
        text("a"),
        op(Op::GetVar),
        text("a"),
        op(Op::Return),
    ]);
    assert_eq!(result, Ok(Value::int(123)));
}

#[test]
fn get_unbound_variable_fails() {
    let result = run(vec![op(Op::GetVar), text("ghost")]);
    assert_eq!(
        error_kind(result),
        VmErrorKind::UnboundVariable {
            name: "ghost".to_owned()
        }
    );
}

#[test]
fn set_var_pop_overwrites() {
    let result = run(vec![
        op(Op::Push),
        int(1),
        op(Op::DeclareAssign),
        text("x"),
        op(Op::Push),
        int(2),
        op(Op::SetVarPop),
        text("x"),
        op(Op::GetVar),
        text("x"),
        op(Op::Return),
    ]);
    assert_eq!(result, Ok(Value::int(2)));
}

#[test]
fn make_array_then_index() {
    let result = run(vec![
        op(Op::Push),
        int(1),
        op(Op::Push),
        int(2),
        op(Op::Push),
        int(3),
        op(Op::MakeArray),
        int(3),
        op(Op::DeclareAssign),
        text("a"),
        op(Op::Push),
        int(1),
        op(Op::GetArrayElem),
        text("a"),
        op(Op::Return),
    ]);
    assert_eq!(result, Ok(Value::int(2)));
}

#[test]
fn set_array_element_in_place() {
    let result = run(vec![
        op(Op::Push),
        int(1),
        op(Op::Push),
        int(2),
        op(Op::MakeArray),
        int(2),
        op(Op::DeclareAssign),
        text("a"),
        // a[0] = 9 (value pushed first, index on top)
        op(Op::Push),
        int(9),
        op(Op::Push),
        int(0),
        op(Op::SetArrayElem),
        text("a"),
        op(Op::Push),
        int(0),
        op(Op::GetArrayElem),
        text("a"),
        op(Op::Return),
    ]);
    assert_eq!(result, Ok(Value::int(9)));
}

#[test]
fn array_index_out_of_range() {
    let result = run(vec![
        op(Op::Push),
        int(1),
        op(Op::MakeArray),
        int(1),
        op(Op::DeclareAssign),
        text("a"),
        op(Op::Push),
        int(5),
        op(Op::GetArrayElem),
        text("a"),
    ]);
    assert_eq!(
        error_kind(result),
        VmErrorKind::IndexOutOfRange { index: 5, len: 1 }
    );
}

#[test]
fn if_skips_block_when_falsy() {
    // Block is [push 2, ret]: 3 slots.
    let program = |cond: Slot| {
        vec![
            op(Op::Push),
            cond,
            op(Op::If),
            int(3),
            op(Op::Push),
            int(2),
            op(Op::Return),
            op(Op::Push),
            int(1),
            op(Op::Return),
        ]
    };
    assert_eq!(run(program(int(0))), Ok(Value::int(1)));
    assert_eq!(run(program(int(7))), Ok(Value::int(2)));
    assert_eq!(run(program(boolean(false))), Ok(Value::int(1)));
    assert_eq!(run(program(boolean(true))), Ok(Value::int(2)));
    assert_eq!(run(program(Slot::Value(Value::Null))), Ok(Value::int(1)));
}

#[test]
fn if_rejects_string_condition() {
    let result = run(vec![op(Op::Push), text("s"), op(Op::If), int(0)]);
    assert!(matches!(error_kind(result), VmErrorKind::TypeMismatch { .. }));
}

#[test]
fn jump_rel_skips_forward() {
    let result = run(vec![
        op(Op::JumpRel),
        int(3),
        op(Op::Push),
        int(9),
        op(Op::Return),
        op(Op::Push),
        int(7),
        op(Op::Return),
    ]);
    assert_eq!(result, Ok(Value::int(7)));
}

#[test]
fn jump_abs_lands_on_target_slot() {
    let result = run(vec![
        op(Op::JumpAbs),
        int(5),
        op(Op::Push),
        int(9),
        op(Op::Return),
        op(Op::Push),
        int(7),
        op(Op::Return),
    ]);
    assert_eq!(result, Ok(Value::int(7)));
}

#[test]
fn jump_to_negative_slot_is_malformed() {
    let result = run(vec![op(Op::JumpRel), int(-100)]);
    assert!(matches!(
        error_kind(result),
        VmErrorKind::MalformedInstruction { .. }
    ));
}

#[test]
fn nop_skips_stray_immediate() {
    let result = run(vec![op(Op::Nop), int(99), op(Op::Push), int(1), op(Op::Return)]);
    assert_eq!(result, Ok(Value::int(1)));
}

#[test]
fn value_in_opcode_position_is_malformed() {
    let result = run(vec![int(1)]);
    assert!(matches!(
        error_kind(result),
        VmErrorKind::MalformedInstruction { .. }
    ));
}

#[test]
fn failed_assert_carries_its_message() {
    let result = run(vec![
        op(Op::Push),
        boolean(false),
        op(Op::Push),
        text("boom"),
        op(Op::Assert),
    ]);
    assert_eq!(
        error_kind(result),
        VmErrorKind::AssertionFailed {
            message: "boom".to_owned()
        }
    );
}

#[test]
fn passing_assert_continues() {
    let result = run(vec![
        op(Op::Push),
        boolean(true),
        op(Op::Push),
        text("unseen"),
        op(Op::Assert),
        op(Op::Push),
        int(1),
        op(Op::Return),
    ]);
    assert_eq!(result, Ok(Value::int(1)));
}

#[test]
fn function_result_arrives_on_the_shared_stack() {
    // fn five() { push 5; ret }  — body is 3 slots.
    let result = run(vec![
        op(Op::DeclareFn),
        text("five"),
        int(3),
        op(Op::Push),
        int(5),
        op(Op::Return),
        op(Op::Call),
        text("five"),
        op(Op::Return),
    ]);
    assert_eq!(result, Ok(Value::int(5)));
}

#[test]
fn closure_shares_mutable_state_with_defining_scope() {
    // counter = 0; fn bump() { counter = counter + 1 (via set) }; bump(); bump()
    let result = run(vec![
        op(Op::Push),
        int(0),
        op(Op::DeclareAssign),
        text("counter"),
        op(Op::DeclareFn),
        text("bump"),
        int(7),
        // body: get_var counter, push 1, add, set_var_pop counter
        op(Op::GetVar),
        text("counter"),
        op(Op::Push),
        int(1),
        op(Op::Add),
        op(Op::SetVarPop),
        text("counter"),
        op(Op::Call),
        text("bump"),
        op(Op::Call),
        text("bump"),
        op(Op::GetVar),
        text("counter"),
        op(Op::Return),
    ]);
    assert_eq!(result, Ok(Value::int(2)));
}

#[test]
fn assign_in_function_shadows_outer_binding() {
    // assign re-declares: the callee's write must not leak out.
    let result = run(vec![
        op(Op::Push),
        int(1),
        op(Op::DeclareAssign),
        text("x"),
        op(Op::DeclareFn),
        text("f"),
        int(4),
        op(Op::Push),
        int(2),
        op(Op::Assign),
        text("x"),
        op(Op::Call),
        text("f"),
        op(Op::GetVar),
        text("x"),
        op(Op::Return),
    ]);
    assert_eq!(result, Ok(Value::int(1)));
}

#[test]
fn set_var_in_function_mutates_outer_binding() {
    let result = run(vec![
        op(Op::Push),
        int(1),
        op(Op::DeclareAssign),
        text("x"),
        op(Op::DeclareFn),
        text("f"),
        int(4),
        op(Op::Push),
        int(2),
        op(Op::SetVarPop),
        text("x"),
        op(Op::Call),
        text("f"),
        op(Op::GetVar),
        text("x"),
        op(Op::Return),
    ]);
    assert_eq!(result, Ok(Value::int(2)));
}

#[test]
fn calling_a_non_function_is_a_type_mismatch() {
    let result = run(vec![
        op(Op::Push),
        int(1),
        op(Op::DeclareAssign),
        text("x"),
        op(Op::Call),
        text("x"),
    ]);
    assert!(matches!(error_kind(result), VmErrorKind::TypeMismatch { .. }));
}

#[test]
fn calling_an_unbound_name_fails() {
    let result = run(vec![op(Op::Call), text("missing")]);
    assert!(matches!(
        error_kind(result),
        VmErrorKind::UnboundVariable { .. }
    ));
}

#[test]
fn runaway_recursion_exhausts_the_depth_limit() {
    let mut vm = VmBuilder::new().call_depth_limit(16).build();
    let result = vm.execute(&Code::from(vec![
        op(Op::DeclareFn),
        text("spin"),
        int(2),
        op(Op::Call),
        text("spin"),
        op(Op::Call),
        text("spin"),
    ]));
    assert_eq!(
        error_kind(result),
        VmErrorKind::ResourceExhausted { depth: 16 }
    );
}

#[test]
fn caller_environment_survives_a_failing_call() {
    let mut vm = Vm::new();
    let result = vm.execute(&Code::from(vec![
        op(Op::Push),
        int(7),
        op(Op::DeclareAssign),
        text("kept"),
        op(Op::DeclareFn),
        text("bad"),
        int(2),
        op(Op::GetVar),
        text("ghost"),
        op(Op::Call),
        text("bad"),
    ]));
    assert!(result.is_err());
    assert_eq!(vm.env().get("kept"), Some(Value::int(7)));
}

#[test]
fn println_builtin_writes_through_the_handler() {
    let handler = buffer_handler();
    let mut vm = VmBuilder::new().print_handler(handler.clone()).build();
    let result = vm.execute(&Code::from(vec![
        op(Op::Push),
        text("hi"),
        op(Op::Call),
        text("println"),
        op(Op::Push),
        int(42),
        op(Op::Call),
        text("print"),
    ]));
    assert!(result.is_ok());
    assert_eq!(handler.output(), "hi\n42");
}

#[test]
fn print_opcode_renders_arrays() {
    let handler = buffer_handler();
    let mut vm = VmBuilder::new().print_handler(handler.clone()).build();
    let result = vm.execute(&Code::from(vec![
        op(Op::Push),
        int(1),
        op(Op::Push),
        int(2),
        op(Op::MakeArray),
        int(2),
        op(Op::Println),
    ]));
    assert!(result.is_ok());
    assert_eq!(handler.output(), "[1, 2]\n");
}

#[test]
fn declared_function_prints_via_display() {
    let handler = buffer_handler();
    let mut vm = VmBuilder::new().print_handler(handler.clone()).build();
    let result = vm.execute(&Code::from(vec![
        op(Op::DeclareFn),
        text("f"),
        int(0),
        op(Op::GetVar),
        text("f"),
        op(Op::Println),
    ]));
    assert!(result.is_ok());
    assert_eq!(handler.output(), "<function f>\n");
}
