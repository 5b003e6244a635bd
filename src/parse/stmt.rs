//! Statement parser & CFG builder (component D, spec §4.D): lowers
//! compound statements and the `if`/`while`/`do`/`for`/`break`/`continue`/
//! `return` control-flow constructs into the basic-block graph the table in
//! spec §4.D describes.
//!
//! Every function here takes the `BlockId` currently accumulating ops
//! (`parent`) and returns the block execution continues in afterward — the
//! same threading convention `parse/decl.rs` and `parse/expr.rs` use, which
//! is what lets a compound statement interleave declarations and
//! expression statements freely (spec §4.D: "declarations and statements
//! interleave freely inside a block").

use crate::diag::PResult;
use crate::ir::{BlockId, CfgAllocator, Decl, Evaluator};
use crate::lexer::{Lexer, TokenKind};
use crate::namespace::SymType;
use crate::parse::{decl, expr, Parser};

/// Whether the upcoming tokens start a declaration rather than a statement,
/// spec §4.F/§4.D's ambiguity rule: a leading type keyword always does; a
/// leading `IDENTIFIER` does only if it resolves in `ns_ident` to a
/// `TYPEDEF` (shadowing the name with an ordinary variable in an inner
/// scope is exactly what makes this a runtime lookup, not a fixed keyword
/// set).
fn starts_declaration<L: Lexer, E: Evaluator, A: CfgAllocator>(p: &mut Parser<L, E, A>) -> bool {
  match p.lexer.peek().kind {
    TokenKind::Const | TokenKind::Volatile | TokenKind::Auto | TokenKind::Register | TokenKind::Static
      | TokenKind::Extern | TokenKind::Typedef | TokenKind::Char | TokenKind::Short | TokenKind::Int
      | TokenKind::Long | TokenKind::Signed | TokenKind::Unsigned | TokenKind::Float | TokenKind::Double
      | TokenKind::Void | TokenKind::Struct | TokenKind::Union | TokenKind::Enum => true,
    TokenKind::Identifier => {
      let name = p.lexer.peek().strval.expect("identifier token carries strval");
      p.scopes.ident.lookup(name).is_some_and(|s| s.symtype() == SymType::Typedef)
    }
    _ => false,
  }
}

/// One declaration-or-statement inside a compound statement's item list.
fn block_item<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, d: &mut Decl, cur: BlockId,
) -> PResult<BlockId> {
  if starts_declaration(p) {
    decl::declaration(p, d, cur)
  } else {
    statement(p, d, cur)
  }
}

/// `{ declaration-or-statement* }`, spec §4.D. Consumes both braces itself;
/// does *not* push/pop a scope — the function-definition call site
/// (`parse/decl.rs`'s `declaration`) already owns the function body's
/// scope, while a nested compound *statement* pushes/pops its own scope
/// around calling this (see the `Punct(b'{')` arm of [`statement`]), so
/// the scope discipline lives at exactly one place per caller rather than
/// being duplicated here.
pub(crate) fn block<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, d: &mut Decl, parent: BlockId,
) -> PResult<BlockId> {
  p.expect(TokenKind::Punct(b'{'))?;
  let mut cur = parent;
  while !matches!(p.lexer.peek().kind, TokenKind::Punct(b'}')) {
    cur = block_item(p, d, cur)?;
  }
  p.lexer.next();
  Ok(cur)
}

/// `statement`, spec §4.D: dispatches on the leading token to one of the
/// constructs in the spec's table, or (the default) an expression
/// statement.
pub(crate) fn statement<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, d: &mut Decl, parent: BlockId,
) -> PResult<BlockId> {
  match p.lexer.peek().kind {
    TokenKind::Punct(b'{') => {
      p.scopes.push_scope();
      let tail = block(p, d, parent);
      p.scopes.pop_scope();
      tail
    }
    TokenKind::Punct(b';') => { p.lexer.next(); Ok(parent) }
    TokenKind::If => if_statement(p, d, parent),
    TokenKind::While => while_statement(p, d, parent),
    TokenKind::Do => do_statement(p, d, parent),
    TokenKind::For => for_statement(p, d, parent),
    TokenKind::Break => break_statement(p, d, parent),
    TokenKind::Continue => continue_statement(p, d, parent),
    TokenKind::Return => return_statement(p, d, parent),
    TokenKind::Goto => goto_statement(p, d, parent),
    TokenKind::Switch => switch_statement(p, d, parent),
    TokenKind::Case => case_statement(p, d, parent),
    TokenKind::Default => default_statement(p, d, parent),
    TokenKind::Identifier if p.lexer.peekn(2).kind == TokenKind::Punct(b':') => label_statement(p, d, parent),
    _ => {
      let tail = expr::expression(p, d, parent)?;
      p.expect(TokenKind::Punct(b';'))?;
      Ok(tail)
    }
  }
}

/// `if (e) s [else s']`, spec §4.D table. `right`/`left`/`next` are
/// allocated and wired exactly as the table specifies; when there is no
/// `else`, `right` falls straight through to `next` and `parent`'s false
/// edge goes directly to `next` too.
fn if_statement<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, d: &mut Decl, parent: BlockId,
) -> PResult<BlockId> {
  p.lexer.next(); // `if`
  p.expect(TokenKind::Punct(b'('))?;
  let cond_tail = expr::expression(p, d, parent)?;
  p.expect(TokenKind::Punct(b')'))?;

  let right = p.alloc.cfg_block_init(d);
  d.cfg.set_jump(cond_tail, 1, right);
  let right_tail = statement(p, d, right)?;

  if matches!(p.lexer.peek().kind, TokenKind::Else) {
    p.lexer.next();
    let left = p.alloc.cfg_block_init(d);
    d.cfg.set_jump(cond_tail, 0, left);
    let left_tail = statement(p, d, left)?;
    let next = p.alloc.cfg_block_init(d);
    d.cfg.set_jump(right_tail, 0, next);
    d.cfg.set_jump(left_tail, 0, next);
    Ok(next)
  } else {
    let next = p.alloc.cfg_block_init(d);
    d.cfg.set_jump(cond_tail, 0, next);
    d.cfg.set_jump(right_tail, 0, next);
    Ok(next)
  }
}

/// `while (e) s`, spec §4.D table: `top`/`body`/`next`; `parent->top`;
/// `top->{false:next,true:body}`; `body->top`. `continue` targets `top`
/// (the condition re-check), `break` targets `next`.
fn while_statement<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, d: &mut Decl, parent: BlockId,
) -> PResult<BlockId> {
  p.lexer.next(); // `while`
  let top = p.alloc.cfg_block_init(d);
  d.cfg.set_jump(parent, 0, top);
  p.expect(TokenKind::Punct(b'('))?;
  let cond_tail = expr::expression(p, d, top)?;
  p.expect(TokenKind::Punct(b')'))?;

  let body = p.alloc.cfg_block_init(d);
  let next = p.alloc.cfg_block_init(d);
  d.cfg.set_jump(cond_tail, 1, body);
  d.cfg.set_jump(cond_tail, 0, next);

  p.push_loop_targets(next, top);
  let body_tail = statement(p, d, body)?;
  p.pop_loop_targets();
  d.cfg.set_jump(body_tail, 0, top);
  Ok(next)
}

/// `do s while (e);`, spec §4.D table: `top`/`next`, plus a dedicated `cond`
/// block this crate allocates so `continue` has a fixed jump target that
/// exists *before* the body is parsed (the table's own wording only names
/// `top`/`next`, leaving the condition re-check folded into `body`'s tail —
/// not workable here since `continue` must resolve to a `BlockId` known in
/// advance of parsing the body that might contain it). `body->{false:next,
/// true:top}` becomes `cond->{false:next,true:top}` with `body`'s actual
/// tail falling through to `cond`.
fn do_statement<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, d: &mut Decl, parent: BlockId,
) -> PResult<BlockId> {
  p.lexer.next(); // `do`
  let top = p.alloc.cfg_block_init(d);
  d.cfg.set_jump(parent, 0, top);
  let cond = p.alloc.cfg_block_init(d);
  let next = p.alloc.cfg_block_init(d);

  p.push_loop_targets(next, cond);
  let body_tail = statement(p, d, top)?;
  p.pop_loop_targets();
  d.cfg.set_jump(body_tail, 0, cond);

  p.expect(TokenKind::While)?;
  p.expect(TokenKind::Punct(b'('))?;
  let cond_tail = expr::expression(p, d, cond)?;
  p.expect(TokenKind::Punct(b')'))?;
  p.expect(TokenKind::Punct(b';'))?;
  d.cfg.set_jump(cond_tail, 1, top);
  d.cfg.set_jump(cond_tail, 0, next);

  Ok(next)
}

/// `for (init; cond; step) s`, spec §4.D table. `init` is parsed into
/// `parent` (it may be a declaration, which consumes its own terminating
/// `;`, or an expression statement, spec §4.D's interleaving rule applied
/// to the loop header itself); `cond`'s absence collapses `top` out of the
/// graph entirely — `parent` jumps straight to `body`, and `step` loops
/// back to `body` instead of `top` — matching the table's "If cond absent:
/// parent→body and body loops to step" (there is no condition block left
/// to loop back to).
fn for_statement<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, d: &mut Decl, parent: BlockId,
) -> PResult<BlockId> {
  p.lexer.next(); // `for`
  p.expect(TokenKind::Punct(b'('))?;

  let init_tail = if matches!(p.lexer.peek().kind, TokenKind::Punct(b';')) {
    p.lexer.next();
    parent
  } else if starts_declaration(p) {
    decl::declaration(p, d, parent)? // consumes its own `;`
  } else {
    let tail = expr::expression(p, d, parent)?;
    p.expect(TokenKind::Punct(b';'))?;
    tail
  };

  let has_cond = !matches!(p.lexer.peek().kind, TokenKind::Punct(b';'));
  let body = p.alloc.cfg_block_init(d);
  let step = p.alloc.cfg_block_init(d);
  let next = p.alloc.cfg_block_init(d);

  let loop_entry = if has_cond {
    let top = p.alloc.cfg_block_init(d);
    d.cfg.set_jump(init_tail, 0, top);
    let cond_tail = expr::expression(p, d, top)?;
    d.cfg.set_jump(cond_tail, 1, body);
    d.cfg.set_jump(cond_tail, 0, next);
    top
  } else {
    d.cfg.set_jump(init_tail, 0, body);
    body
  };
  p.expect(TokenKind::Punct(b';'))?;

  let step_tail = if matches!(p.lexer.peek().kind, TokenKind::Punct(b')')) {
    step
  } else {
    expr::expression(p, d, step)?
  };
  d.cfg.set_jump(step_tail, 0, loop_entry);
  p.expect(TokenKind::Punct(b')'))?;

  p.push_loop_targets(next, step);
  let body_tail = statement(p, d, body)?;
  p.pop_loop_targets();
  d.cfg.set_jump(body_tail, 0, step);

  Ok(next)
}

/// `break;`, spec §4.D table: jumps to the innermost loop's `break_target`
/// and returns a fresh, source-unreachable orphan block (no statement ever
/// continues into it; it exists only so the caller has a `BlockId` to keep
/// threading).
fn break_statement<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, d: &mut Decl, parent: BlockId,
) -> PResult<BlockId> {
  p.lexer.next();
  p.expect(TokenKind::Punct(b';'))?;
  let Some((break_target, _)) = p.loop_targets() else {
    return Err(p.diags.error(None, "break statement not within a loop"));
  };
  d.cfg.set_jump(parent, 0, break_target);
  Ok(p.alloc.cfg_block_init(d))
}

/// `continue;`, spec §4.D table: jumps to the innermost loop's
/// `continue_target`.
fn continue_statement<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, d: &mut Decl, parent: BlockId,
) -> PResult<BlockId> {
  p.lexer.next();
  p.expect(TokenKind::Punct(b';'))?;
  let Some((_, continue_target)) = p.loop_targets() else {
    return Err(p.diags.error(None, "continue statement not within a loop"));
  };
  d.cfg.set_jump(parent, 0, continue_target);
  Ok(p.alloc.cfg_block_init(d))
}

/// `return [expression];`, spec §4.D table: evaluates the operand (if any)
/// into `parent`, leaving it as that block's `.expr` for a back end to pick
/// up — there is no dedicated `Return` op in the thirteen-opcode contract
/// (spec §6), so the returning block's final `.expr` *is* the return value
/// — and returns a fresh orphan, matching `break`/`continue`.
fn return_statement<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, d: &mut Decl, parent: BlockId,
) -> PResult<BlockId> {
  p.lexer.next();
  if !matches!(p.lexer.peek().kind, TokenKind::Punct(b';')) {
    expr::expression(p, d, parent)?;
  }
  p.expect(TokenKind::Punct(b';'))?;
  Ok(p.alloc.cfg_block_init(d))
}

/// `goto IDENTIFIER;`, spec §9 deferred feature: labels/`goto` resolution is
/// not lowered (`DESIGN.md`), but the statement is still syntactically
/// recognized and consumed rather than falling through to a confusing
/// "unexpected token" error, and a warning records that no jump was
/// installed.
fn goto_statement<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, d: &mut Decl, parent: BlockId,
) -> PResult<BlockId> {
  p.lexer.next();
  let tok = p.expect(TokenKind::Identifier)?;
  p.expect(TokenKind::Punct(b';'))?;
  p.diags.warn(Some(tok.span),
    "goto is not lowered to a jump in this crate (label/goto resolution is deferred)",
    p.options.warnings_as_errors);
  let _ = d;
  Ok(parent)
}

/// `IDENTIFIER : statement`, spec §9 deferred feature: the label name is
/// still declared in `ns_label` (component A) so duplicate-label detection
/// works, but the labeled statement is lowered in sequence with no
/// predecessor edge installed for any `goto` that might target it.
fn label_statement<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, d: &mut Decl, parent: BlockId,
) -> PResult<BlockId> {
  let tok = p.lexer.next();
  p.lexer.next(); // `:`
  let name = tok.strval.expect("identifier token carries strval");
  if !p.scopes.declare_label(name) {
    return Err(p.diags.error(Some(tok.span), format!(
      "redefinition of label '{}'", p.interner.borrow().resolve(name))));
  }
  p.diags.warn(Some(tok.span),
    "label declared but goto resolution is deferred; no jump target is installed for it",
    p.options.warnings_as_errors);
  statement(p, d, parent)
}

/// `switch (e) statement`, spec §9 deferred feature: the controlling
/// expression and the body are parsed (so braces/statements inside a
/// `switch` still balance correctly), but no branch on `e`'s value is
/// installed — the body's `case`/`default` labels are consumed as inert
/// markers by [`case_statement`]/[`default_statement`].
fn switch_statement<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, d: &mut Decl, parent: BlockId,
) -> PResult<BlockId> {
  p.lexer.next();
  p.expect(TokenKind::Punct(b'('))?;
  let tail = expr::expression(p, d, parent)?;
  p.expect(TokenKind::Punct(b')'))?;
  p.diags.warn(None,
    "switch/case/default lowering is deferred; the body is parsed but not branched on the switch value",
    p.options.warnings_as_errors);
  statement(p, d, tail)
}

/// `case constant-expression : statement`, spec §9 deferred feature.
fn case_statement<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, d: &mut Decl, parent: BlockId,
) -> PResult<BlockId> {
  p.lexer.next();
  expr::constant_expression(p, d)?;
  p.expect(TokenKind::Punct(b':'))?;
  statement(p, d, parent)
}

/// `default : statement`, spec §9 deferred feature.
fn default_statement<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, d: &mut Decl, parent: BlockId,
) -> PResult<BlockId> {
  p.lexer.next();
  p.expect(TokenKind::Punct(b':'))?;
  statement(p, d, parent)
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::rc::Rc;
  use crate::config::Options;
  use crate::ir::{ArenaCfgAllocator, ThreeAddressEvaluator};
  use crate::lexer::SimpleLexer;
  use crate::parse::Parser;
  use crate::symbol::Interner;

  fn parser(src: &str) -> Parser<SimpleLexer<'_>, ThreeAddressEvaluator, ArenaCfgAllocator> {
    crate::test_log::init();
    let interner = Rc::new(RefCell::new(Interner::new()));
    let lexer = SimpleLexer::new(src, interner.clone());
    Parser::new(lexer, interner, Options::default(), ThreeAddressEvaluator::new(), ArenaCfgAllocator::new())
  }

  #[test]
  fn if_else_merges_through_a_shared_next_block() {
    let mut p = parser("int f(){ if (1) { 1; } else { 2; } return 0; }");
    let decl = p.parse().expect("parses").expect("one external declaration");

    let entry = decl.body;
    let right = decl.cfg.jump(entry, 1).expect("true edge enters the `then` block");
    let left = decl.cfg.jump(entry, 0).expect("false edge enters the `else` block");
    assert_ne!(right, left, "then/else are distinct blocks");

    let right_next = decl.cfg.jump(right, 0).expect("`then` falls through to the merge block");
    let left_next = decl.cfg.jump(left, 0).expect("`else` falls through to the merge block");
    assert_eq!(right_next, left_next, "both arms rejoin the same next block");
  }

  #[test]
  fn if_without_else_falls_straight_through_on_both_edges() {
    let mut p = parser("int f(){ if (1) { 1; } return 0; }");
    let decl = p.parse().expect("parses").expect("one external declaration");

    let entry = decl.body;
    let right = decl.cfg.jump(entry, 1).expect("true edge enters the `then` block");
    let next_via_false = decl.cfg.jump(entry, 0).expect("false edge reaches next directly");
    let next_via_right = decl.cfg.jump(right, 0).expect("`then` falls through to next");
    assert_eq!(next_via_false, next_via_right);
  }

  #[test]
  fn while_loop_break_targets_the_post_loop_block() {
    let mut p = parser("int f(){ while (1) { break; } return 0; }");
    let decl = p.parse().expect("parses").expect("one external declaration");

    let entry = decl.body;
    let top = decl.cfg.jump(entry, 0).expect("entry falls through to the condition check");
    let body = decl.cfg.jump(top, 1).expect("true edge enters the loop body");
    let next = decl.cfg.jump(top, 0).expect("false edge reaches the post-loop block");

    // `break` inside the body jumps straight to `next`, not back through `top`.
    assert_eq!(decl.cfg.jump(body, 0), Some(next));
  }

  #[test]
  fn do_while_loop_rechecks_condition_before_looping_back() {
    let mut p = parser("int f(){ do { 1; } while (1); return 0; }");
    let decl = p.parse().expect("parses").expect("one external declaration");

    let entry = decl.body;
    let top = decl.cfg.jump(entry, 0).expect("entry falls through to the loop body");
    let cond = decl.cfg.jump(top, 0).expect("body falls through to the condition re-check");
    assert_eq!(decl.cfg.jump(cond, 1), Some(top), "true edge loops back into the body");
    assert!(decl.cfg.jump(cond, 0).is_some(), "false edge reaches the post-loop block");
    assert_ne!(decl.cfg.jump(cond, 0), Some(top));
  }

  #[test]
  fn break_outside_a_loop_is_a_diagnostic_not_a_panic() {
    let mut p = parser("int f(){ break; return 0; }");
    assert!(p.parse().is_err());
  }

  #[test]
  fn goto_and_label_are_consumed_without_crashing() {
    let mut p = parser("int f(){ goto done; done: return 0; }");
    assert!(p.parse().is_ok());
  }
}
