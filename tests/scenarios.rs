//! End-to-end scenarios driving the public `Parser<SimpleLexer,
//! ThreeAddressEvaluator, ArenaCfgAllocator>` stack against small C snippets,
//! mirroring `messense-llvm-bitcode-rs`'s `tests/test_bitcode_reader.rs`
//! convention of one black-box integration file alongside the crate's own
//! `#[cfg(test)]` unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use ccfront::config::Options;
use ccfront::ir::{ArenaCfgAllocator, Op, ThreeAddressEvaluator, VarKind};
use ccfront::lexer::SimpleLexer;
use ccfront::namespace::{Linkage, SymType};
use ccfront::parse::Parser;
use ccfront::symbol::Interner;

type P<'a> = Parser<SimpleLexer<'a>, ThreeAddressEvaluator, ArenaCfgAllocator>;

fn parser(src: &str) -> P<'_> {
  let interner = Rc::new(RefCell::new(Interner::new()));
  let lexer = SimpleLexer::new(src, interner.clone());
  Parser::new(lexer, interner, Options::default(), ThreeAddressEvaluator::new(), ArenaCfgAllocator::new())
}

/// S1: `int x = 3;` at file scope.
#[test]
fn file_scope_scalar_definition() {
  let mut p = parser("int x = 3;");
  let decl = p.parse().expect("parses").expect("one external declaration");

  let name = { let mut i = p.interner.borrow_mut(); i.intern("x") };
  let sym = p.scopes.ident.lookup(name).expect("x declared");
  assert_eq!(sym.symtype(), SymType::Definition);
  assert_eq!(sym.linkage, Linkage::External);
  assert_eq!(sym.ty.size(), 4);

  let ops = decl.cfg.block(decl.head).ops.clone();
  assert_eq!(ops.len(), 1);
  match &ops[0] {
    Op::Assign { dest, src } => {
      assert_eq!(dest.symbol.as_ref().expect("direct var has a symbol").name, name);
      assert!(src.is_immediate());
      assert_eq!(src.value, 3);
    }
    other => panic!("expected a single Assign, found {other:?}"),
  }
}

/// S2 / property 4: a file-scope tentative definition is zero-filled exactly
/// once, on the terminal `parse()` call, not before.
#[test]
fn tentative_definition_resolved_on_terminal_call() {
  let mut p = parser("static int y;");
  let first = p.parse().expect("parses").expect("one external declaration");
  assert!(first.cfg.block(first.head).ops.is_empty(), "nothing is emitted for a bare tentative declaration");
  assert!(first.cfg.block(first.body).ops.is_empty());

  let name = { let mut i = p.interner.borrow_mut(); i.intern("y") };
  assert_eq!(p.scopes.ident.lookup(name).expect("y declared").symtype(), SymType::Tentative);

  let terminal = p.parse().expect("parses").expect("terminal resolution decl");
  let ops = terminal.cfg.block(terminal.head).ops.clone();
  assert_eq!(ops.len(), 1);
  match &ops[0] {
    Op::Assign { dest, src } => {
      assert_eq!(dest.symbol.as_ref().unwrap().name, name);
      assert!(src.is_immediate() && src.value == 0);
    }
    other => panic!("expected y = 0, found {other:?}"),
  }
  assert_eq!(p.scopes.ident.lookup(name).unwrap().symtype(), SymType::Definition);

  // A parser is exhausted after the terminal call: nothing left to resolve.
  assert!(p.parse().expect("parses").is_none());
}

/// S3: a two-parameter function definition, its `__func__` local, and the
/// return expression's IR.
#[test]
fn function_definition_lowers_params_and_return() {
  let mut p = parser("int f(int a, int b){ return a+b; }");
  let decl = p.parse().expect("parses").expect("one external declaration");

  let fname = { let mut i = p.interner.borrow_mut(); i.intern("f") };
  let fsym = decl.fun.as_ref().expect("function definition records decl.fun");
  assert_eq!(fsym.name, fname);
  assert!(fsym.ty.is_function());
  assert_eq!(fsym.ty.n_members(), 2);
  assert!(fsym.ty.next().unwrap().is_integer());

  let ret_var = decl.cfg.expr(decl.body);
  let body_ops = decl.cfg.block(decl.body).ops.clone();
  match body_ops.as_slice() {
    [Op::Binary { opcode, .. }] => assert_eq!(*opcode, ccfront::ir::Opcode::Add),
    other => panic!("expected one Add, found {other:?}"),
  }
  assert!(ret_var.ty.is_integer());

  let func_name = { let mut i = p.interner.borrow_mut(); i.intern("__func__") };
  let local = decl.locals.iter().find(|s| s.name == func_name).expect("__func__ is a local");
  assert!(local.ty.is_array());
  assert_eq!(local.ty.size(), 2); // "f" + NUL
  let head_ops = decl.cfg.block(decl.head).ops.clone();
  assert_eq!(head_ops.len(), 1);
  assert!(matches!(head_ops[0], Op::Assign { .. }));
}

/// S4: struct layout and tag sharing across two declarations.
#[test]
fn struct_layout_and_tag_sharing() {
  let mut p = parser("struct S { int a; char b; }; struct S s;");
  let _first = p.parse().expect("parses").expect("struct declaration");
  let _second = p.parse().expect("parses").expect("variable declaration");

  let tag_name = { let mut i = p.interner.borrow_mut(); i.intern("S") };
  let tag = p.scopes.tag.lookup(tag_name).expect("S registered in ns_tag");
  assert_eq!(tag.ty.size(), 8);
  let members = tag.ty.members();
  assert_eq!(members[0].offset, 0);
  assert_eq!(members[1].offset, 4);
  drop(members);

  let s_name = { let mut i = p.interner.borrow_mut(); i.intern("s") };
  let s = p.scopes.ident.lookup(s_name).expect("s declared");
  assert!(s.ty.is_object());
  assert_eq!(s.ty, tag.ty); // same tag node, not a structural copy
}

/// S5 / property 3: an unsized array completes from its initializer length.
#[test]
fn incomplete_array_completes_from_initializer() {
  let mut p = parser("int a[] = {1,2,3,4};");
  let _decl = p.parse().expect("parses").expect("array definition");

  let name = { let mut i = p.interner.borrow_mut(); i.intern("a") };
  let sym = p.scopes.ident.lookup(name).expect("a declared");
  assert!(sym.ty.is_array());
  assert_eq!(sym.ty.size(), 16);
}

/// S6 / property 6: the five-block `for` topology, and `continue` targeting
/// the step block rather than the condition check directly.
#[test]
fn for_loop_topology_and_continue_target() {
  let mut p = parser("int f(){ int i; for (i = 0; i < 10; i = i + 1) { continue; } return i; }");
  let decl = p.parse().expect("parses").expect("one external declaration");

  let entry = decl.body;
  let cond = decl.cfg.jump(entry, 0).expect("entry falls through to the condition check");
  let body = decl.cfg.jump(cond, 1).expect("condition true edge enters the loop body");
  let exit = decl.cfg.jump(cond, 0).expect("condition false edge reaches the return block");
  let step = decl.cfg.jump(body, 0).expect("continue inside the body targets the step block");
  assert_eq!(decl.cfg.jump(step, 0), Some(cond), "step loops back to the condition check");

  let ret = decl.cfg.expr(exit);
  assert!(ret.kind == VarKind::Direct && ret.ty.is_integer());
}

/// Property 1: scope discipline — nesting depth returns to its entry value
/// once a function body with inner blocks has been fully parsed.
#[test]
fn scope_discipline_restored_after_function_body() {
  let mut p = parser("int g(){ { int x; { int y; } } return 0; }");
  assert_eq!(p.scopes.ident.depth(), 0);
  let _decl = p.parse().expect("parses").expect("one external declaration");
  assert_eq!(p.scopes.ident.depth(), 0);
  assert_eq!(p.scopes.tag.depth(), 0);
}

/// Property 2: inside-out declarator composition for a pointer-to-array and
/// an array-of-pointers sharing the same element type.
#[test]
fn declarator_inside_out_composition() {
  let mut p = parser("int (*px)[5]; int *ax[5];");
  let _first = p.parse().expect("parses").expect("pointer-to-array declaration");
  let _second = p.parse().expect("parses").expect("array-of-pointers declaration");

  let px_name = { let mut i = p.interner.borrow_mut(); i.intern("px") };
  let px = p.scopes.ident.lookup(px_name).unwrap();
  assert!(px.ty.is_pointer());
  assert!(px.ty.next().unwrap().is_array());
  assert!(px.ty.next().unwrap().next().unwrap().is_integer());

  let ax_name = { let mut i = p.interner.borrow_mut(); i.intern("ax") };
  let ax = p.scopes.ident.lookup(ax_name).unwrap();
  assert!(ax.ty.is_array());
  assert!(ax.ty.next().unwrap().is_pointer());
}
