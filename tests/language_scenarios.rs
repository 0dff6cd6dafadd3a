//! Builds the AST for spec.md §8's scenarios 1-4 by hand (no parser is in
//! scope) and runs each through `execute_script`, checking the returned
//! `Value`. Every test starts from a fresh `prepare_world` so scenarios
//! cannot influence each other through shared heap state.

use selfvm::ast::{Expression, Message, NumberLiteral, Script, Slot, SourceRange};
use selfvm::config::Config;
use selfvm::value::Value;
use std::rc::Rc;
use std::sync::Arc;

fn range() -> SourceRange {
    SourceRange::synthetic()
}

fn data_slot(name: &str, is_mutable: bool, value: Expression) -> Slot {
    Slot { name: Arc::from(name), is_mutable, is_parent: false, is_argument: false, arguments: Vec::new(), value, range: range() }
}

fn int_lit(v: i64) -> Expression {
    Expression::Number(NumberLiteral::Integer(v), range())
}

fn ident(name: &str) -> Expression {
    Expression::Identifier(Arc::from(name), range())
}

fn send(receiver: Option<Expression>, selector: &str, arguments: Vec<Expression>) -> Expression {
    Expression::Message(Rc::new(Message { receiver, selector: Arc::from(selector), arguments, range: range() }))
}

fn method_slot(name: &str, arg_names: &[&str], body: Expression) -> Slot {
    Slot {
        name: Arc::from(name),
        is_mutable: false,
        is_parent: false,
        is_argument: false,
        arguments: arg_names.iter().map(|n| Arc::from(*n)).collect(),
        value: Expression::ObjectLiteral { slots: Vec::new(), statements: vec![selfvm::ast::Statement::Expression(body)], range: range() },
        range: range(),
    }
}

fn script_of(expr: Expression) -> Rc<Script> {
    Rc::new(Script { name: Arc::from("<test>"), statements: vec![selfvm::ast::Statement::Expression(expr)] })
}

fn run(expr: Expression) -> Value {
    let mut vm = selfvm::prepare_world(Config::default());
    let lobby = vm.state.lobby;
    let script = script_of(expr);
    selfvm::execute_script(&mut vm, &script, lobby).expect("script should evaluate without error")
}

/// `(| x = 3. y = 4 |) x` evaluates to `3`.
#[test]
fn scenario_1_constant_slot_read() {
    let object = Expression::ObjectLiteral {
        slots: vec![data_slot("x", false, int_lit(3)), data_slot("y", false, int_lit(4))],
        statements: Vec::new(),
        range: range(),
    };
    let expr = send(Some(object), "x", Vec::new());
    let result = run(expr);
    assert!(result.is_int());
    assert_eq!(result.as_int(), 3);
}

/// `(| add:with: a b = (a + b) |) add:with: 2 3` evaluates to `5` via
/// method activation and the integer `+` primitive.
#[test]
fn scenario_2_method_activation() {
    let body = send(Some(ident("a")), "+", vec![ident("b")]);
    let object = Expression::ObjectLiteral {
        slots: vec![method_slot("add:with:", &["a", "b"], body)],
        statements: Vec::new(),
        range: range(),
    };
    let expr = send(Some(object), "add:with:", vec![int_lit(2), int_lit(3)]);
    let result = run(expr);
    assert!(result.is_int());
    assert_eq!(result.as_int(), 5);
}

/// `(| x <- 1. set: v = (x: v) |) set: 42` evaluates to `42`, and the
/// receiver's `x` slot now holds `42` (observed by a follow-up send on
/// the very same object).
#[test]
fn scenario_3_assignment_through_own_method() {
    let mut vm = selfvm::prepare_world(Config::default());
    let lobby = vm.state.lobby;

    let set_body = send(None, "x:", vec![ident("v")]);
    let object_literal = Expression::ObjectLiteral {
        slots: vec![data_slot("x", true, int_lit(1)), method_slot("set:", &["v"], set_body)],
        statements: Vec::new(),
        range: range(),
    };
    let object = selfvm::interpreter::eval_expression(&mut vm, &object_literal, lobby)
        .into_result()
        .ok()
        .expect("object literal should construct cleanly");

    let set_result = selfvm::dispatch::send(&mut vm, object, "set:", &[Value::int(42)], range())
        .into_result()
        .ok()
        .expect("set: should succeed");
    assert_eq!(set_result.as_int(), 42);

    let read_result = selfvm::dispatch::send(&mut vm, object, "x", &[], range())
        .into_result()
        .ok()
        .expect("x should still resolve");
    assert_eq!(read_result.as_int(), 42);
}

/// `(| foo = ([ ^ 7 ] value + 1000) |) foo` evaluates to `7`: the block's
/// `^` unwinds to `foo`'s activation and the `+ 1000` never runs.
#[test]
fn scenario_4_non_local_return_short_circuits() {
    let block = Expression::BlockLiteral {
        slots: Vec::new(),
        statements: vec![selfvm::ast::Statement::Expression(Expression::Return(Box::new(int_lit(7)), range()))],
        range: range(),
    };
    let block_value = send(Some(block), "value", Vec::new());
    let body = send(Some(block_value), "+", vec![int_lit(1000)]);
    let object = Expression::ObjectLiteral { slots: vec![method_slot("foo", &[], body)], statements: Vec::new(), range: range() };
    let expr = send(Some(object), "foo", Vec::new());
    let result = run(expr);
    assert!(result.is_int());
    assert_eq!(result.as_int(), 7);
}

/// Activation objects are transparent receivers (spec.md §4.3): any
/// selector sent to a reified activation delegates straight to the
/// activation's bound `self`, never consulting the activation's own
/// argument/local bindings — those are exposed only to code that reads
/// `ObjectData::Activation` directly, not through ordinary lookup.
#[test]
fn current_activation_delegates_to_its_receiver() {
    let body = send(Some(send(None, "_CurrentActivation", Vec::new())), "tag", Vec::new());
    let object = Expression::ObjectLiteral {
        slots: vec![data_slot("tag", false, int_lit(55)), method_slot("probe", &[], body)],
        statements: Vec::new(),
        range: range(),
    };
    let expr = send(Some(object), "probe", Vec::new());
    let result = run(expr);
    assert!(result.is_int());
    assert_eq!(result.as_int(), 55);
}
