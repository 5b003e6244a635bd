//! The expression grammar and IR emitter (component E, spec §4.E): the
//! full precedence ladder from comma down to primary, short-circuit
//! `&&`/`||` lowered as CFG branches, and `constant_expression` for the
//! contexts (array dimensions, enumerator values, `case` labels) that
//! require an immediate result.
//!
//! Every level in the ladder shares the shape the spec describes: "reads
//! its higher-precedence operand into `block.expr`, then while the
//! lookahead is a recognized operator at this level ... replaces
//! `block.expr`". Concretely, every function here takes the `BlockId` whose
//! `.expr` the operand should be read from and returns the (possibly
//! different, if short-circuit or a ternary allocated new blocks) `BlockId`
//! whose `.expr` now holds the result — the same block-threading convention
//! `parse/decl.rs`'s `initializer`/`declaration` already use.

use std::rc::Rc;
use crate::diag::PResult;
use crate::ir::{BlockId, CfgAllocator, Decl, Evaluator, Opcode, Var};
use crate::lexer::{Lexer, TokenKind};
use crate::namespace::SymType;
use crate::parse::Parser;
use crate::types::{self, Type, TypeKind};

/// `expression`, spec §4.E top of the ladder: comma-separated
/// assignment-expressions, left-associative, each discarding the previous
/// one's value (the block's final `.expr` is whatever the last one left).
pub(crate) fn expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  let mut block = assignment_expression(p, decl, block)?;
  while matches!(p.lexer.peek().kind, TokenKind::Punct(b',')) {
    p.lexer.next();
    block = assignment_expression(p, decl, block)?;
  }
  Ok(block)
}

/// `assignment-expression`, spec §4.E: right-associative. The left-hand
/// side is parsed as a `conditional-expression`; on a bare `=` it is
/// captured, the right-hand side is parsed recursively (so `a = b = c`
/// groups as `a = (b = c)`), and `eval_assign` is emitted. Compound
/// assignment operators (`+=` etc.) are a deferred feature (spec §9,
/// `DESIGN.md`) — the lexer has no token for them, so `x += 1` simply fails
/// to parse as an assignment and falls through to a syntax error at the
/// additive level, which is the intended (if unhelpful) diagnostic.
pub(crate) fn assignment_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  let mut block = conditional_expression(p, decl, block)?;
  if matches!(p.lexer.peek().kind, TokenKind::Punct(b'=')) {
    let lhs = decl.cfg.expr(block);
    if !lhs.lvalue {
      return Err(p.diags.error(None, "left-hand side of assignment is not an lvalue"));
    }
    p.lexer.next();
    block = assignment_expression(p, decl, block)?;
    let rhs = decl.cfg.expr(block);
    let result = p.eval.eval_assign(&decl.cfg, block, lhs, rhs);
    decl.cfg.set_expr(block, result);
  }
  Ok(block)
}

/// `constant-expression`, spec §4.E: parses a conditional expression in an
/// isolated, unlinked block and accepts it only if evaluation never
/// branched and the result is `IMMEDIATE`. Used wherever the grammar
/// demands a compile-time constant: array dimensions, enumerator values,
/// `case` labels (consumed but not lowered, per the deferred-`switch`
/// decision in `DESIGN.md`).
pub(crate) fn constant_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl,
) -> PResult<Var> {
  let block = p.alloc.cfg_block_init(decl);
  let block = conditional_expression(p, decl, block)?;
  let branched = decl.cfg.jump(block, 0).is_some() || decl.cfg.jump(block, 1).is_some();
  let value = decl.cfg.expr(block);
  if branched || !value.is_immediate() {
    return Err(p.diags.error(None, "expression is not a constant expression"));
  }
  Ok(value)
}

/// `conditional-expression`, spec §4.E: `logical-or-expression ('?'
/// expression ':' conditional-expression)?`. Not spelled out in the spec's
/// CFG table (which only covers statement-level `if`/`else`), but the
/// natural extension of the same branch-and-merge shape: the condition's
/// block branches to a `then` and an `else` block, each evaluates its arm
/// and assigns the result into a shared temporary (spec §4.A `temp`,
/// generalized from its `&&`/`||` use), and a `next` block merges with that
/// temporary as its `.expr`.
fn conditional_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  let block = logical_or_expression(p, decl, block)?;
  if !matches!(p.lexer.peek().kind, TokenKind::Punct(b'?')) { return Ok(block) }
  p.lexer.next();

  let then_block = p.alloc.cfg_block_init(decl);
  let else_block = p.alloc.cfg_block_init(decl);
  let next = p.alloc.cfg_block_init(decl);
  decl.cfg.set_jump(block, 1, then_block);
  decl.cfg.set_jump(block, 0, else_block);

  let then_tail = expression(p, decl, then_block)?;
  let then_val = decl.cfg.expr(then_tail);
  p.expect(TokenKind::Punct(b':'))?;
  let else_tail = conditional_expression(p, decl, else_block)?;
  let else_val = decl.cfg.expr(else_tail);

  let ty = then_val.ty.clone();
  let temp = p.temp(decl, ty.clone());
  let dest = Var::direct_symbol(Rc::clone(&temp), ty.clone());
  p.eval.eval_assign(&decl.cfg, then_tail, dest.clone(), then_val);
  p.eval.eval_assign(&decl.cfg, else_tail, dest.clone(), else_val);
  decl.cfg.set_jump(then_tail, 0, next);
  decl.cfg.set_jump(else_tail, 0, next);
  decl.cfg.set_expr(next, dest);
  Ok(next)
}

/// One short-circuit link of `||`/`&&`, spec §4.E: allocate the temp and
/// merge block on the *first* operator seen (a chain of several `||`/`&&`
/// shares one temp and one merge block, not one per link), then loop,
/// installing a branch at each link that skips straight to the merge block
/// on the short-circuiting outcome. `true_slot`/`false_slot` are `1`/`0`
/// for `||` (a true left operand short-circuits) and `0`/`1` for `&&` (a
/// false left operand short-circuits) — spec §4.E: "`&&` inverts the
/// roles".
fn short_circuit_chain<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, mut block: BlockId,
  op_token: TokenKind, opcode: Opcode, short_circuit_slot: usize,
  mut higher: impl FnMut(&mut Parser<L, E, A>, &mut Decl, BlockId) -> PResult<BlockId>,
) -> PResult<BlockId> {
  if p.lexer.peek().kind != op_token { return Ok(block) }
  let continue_slot = 1 - short_circuit_slot;
  let ty = types::init_integer(p.options.int_size);
  let temp = p.temp(decl, ty.clone());
  let last = p.alloc.cfg_block_init(decl);

  while p.lexer.peek().kind == op_token {
    p.lexer.next();
    let lhs = decl.cfg.expr(block);
    // Normalizes the running value to a clean 0/1 int and stashes it in
    // `temp`, which doubles as the value `last` sees if this link is the
    // one that short-circuits (spec: "the op only ever fires on the
    // already-short-circuited left side").
    let normalized = p.eval.eval_expr(&decl.cfg, block, opcode, lhs.clone(), lhs);
    let dest = Var::direct_symbol(Rc::clone(&temp), ty.clone());
    p.eval.eval_assign(&decl.cfg, block, dest, normalized);
    let next = p.alloc.cfg_block_init(decl);
    decl.cfg.set_jump(block, short_circuit_slot, last);
    decl.cfg.set_jump(block, continue_slot, next);
    block = next;
    block = higher(p, decl, block)?;
  }

  let rhs = decl.cfg.expr(block);
  let dest = Var::direct_symbol(Rc::clone(&temp), ty.clone());
  p.eval.eval_assign(&decl.cfg, block, dest.clone(), rhs);
  decl.cfg.set_jump(block, continue_slot, last);
  decl.cfg.set_expr(last, dest);
  Ok(last)
}

/// `logical-or-expression`, spec §4.E / §8 property 5.
fn logical_or_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  let block = logical_and_expression(p, decl, block)?;
  short_circuit_chain(p, decl, block, TokenKind::LogicalOr, Opcode::LogicalOr, 1, logical_and_expression)
}

/// `logical-and-expression`, spec §4.E.
fn logical_and_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  let block = inclusive_or_expression(p, decl, block)?;
  short_circuit_chain(p, decl, block, TokenKind::LogicalAnd, Opcode::LogicalAnd, 0, inclusive_or_expression)
}

/// Shared left-associative binary precedence level (every level from
/// `inclusive-or` down to `multiplicative` except `equality`/`relational`,
/// which canonicalize their operators before emitting): parse the
/// higher-precedence operand, then while the lookahead maps to an opcode at
/// this level, capture it, parse the right-hand operand, and replace
/// `block.expr` with `eval_expr(op, lhs, rhs)` (spec §4.E's shared
/// paragraph, applied once instead of once per level).
fn binary_level<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
  mut higher: impl FnMut(&mut Parser<L, E, A>, &mut Decl, BlockId) -> PResult<BlockId>,
  op_for: impl Fn(TokenKind) -> Option<Opcode>,
) -> PResult<BlockId> {
  let mut block = higher(p, decl, block)?;
  loop {
    let Some(op) = op_for(p.lexer.peek().kind) else { break };
    p.lexer.next();
    let lhs = decl.cfg.expr(block);
    block = higher(p, decl, block)?;
    let rhs = decl.cfg.expr(block);
    let result = p.eval.eval_expr(&decl.cfg, block, op, lhs, rhs);
    decl.cfg.set_expr(block, result);
  }
  Ok(block)
}

fn inclusive_or_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  binary_level(p, decl, block, exclusive_or_expression, |k| match k {
    TokenKind::Punct(b'|') => Some(Opcode::BitwiseOr),
    _ => None,
  })
}

fn exclusive_or_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  binary_level(p, decl, block, and_expression, |k| match k {
    TokenKind::Punct(b'^') => Some(Opcode::BitwiseXor),
    _ => None,
  })
}

fn and_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  binary_level(p, decl, block, equality_expression, |k| match k {
    TokenKind::Punct(b'&') => Some(Opcode::BitwiseAnd),
    _ => None,
  })
}

/// `equality-expression`, spec §4.E: `==` emits `Eq` directly; `!=` is
/// lowered as `eval_expr(==, 0, eval_expr(==, lhs, rhs))` per spec, since
/// there is no dedicated not-equal opcode in the thirteen-op contract.
fn equality_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  let mut block = relational_expression(p, decl, block)?;
  loop {
    let negate = match p.lexer.peek().kind {
      TokenKind::Eq => false,
      TokenKind::Neq => true,
      _ => break,
    };
    p.lexer.next();
    let lhs = decl.cfg.expr(block);
    block = relational_expression(p, decl, block)?;
    let rhs = decl.cfg.expr(block);
    let eq = p.eval.eval_expr(&decl.cfg, block, Opcode::Eq, lhs, rhs);
    let result = if negate {
      let zero = Var::immediate(eq.ty.clone(), 0);
      p.eval.eval_expr(&decl.cfg, block, Opcode::Eq, zero, eq)
    } else {
      eq
    };
    decl.cfg.set_expr(block, result);
  }
  Ok(block)
}

/// `relational-expression`, spec §4.E: `<`/`<=`/`>`/`>=` all canonicalize to
/// `GT`/`GE` by swapping operands when the source operator is `<`/`<=`
/// (`a < b` becomes `GT(b, a)`), so the evaluator only ever sees two of the
/// four comparison opcodes.
fn relational_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  let mut block = shift_expression(p, decl, block)?;
  loop {
    let (opcode, swap) = match p.lexer.peek().kind {
      TokenKind::Punct(b'<') => (Opcode::Gt, true),
      TokenKind::Punct(b'>') => (Opcode::Gt, false),
      TokenKind::Leq => (Opcode::Ge, true),
      TokenKind::Geq => (Opcode::Ge, false),
      _ => break,
    };
    p.lexer.next();
    let lhs = decl.cfg.expr(block);
    block = shift_expression(p, decl, block)?;
    let rhs = decl.cfg.expr(block);
    let result = if swap {
      p.eval.eval_expr(&decl.cfg, block, opcode, rhs, lhs)
    } else {
      p.eval.eval_expr(&decl.cfg, block, opcode, lhs, rhs)
    };
    decl.cfg.set_expr(block, result);
  }
  Ok(block)
}

/// `shift-expression`, spec §4.E precedence ladder. The lexer/evaluator
/// contracts of spec §6 name no `<<`/`>>` token or opcode at all (only the
/// thirteen ops listed there), so this level has nothing to match and is a
/// pure pass-through to `additive-expression` — kept as its own function,
/// rather than folded away, so the ladder's shape still mirrors spec §4.E
/// one-to-one and a later extension has an obvious place to add the
/// tokens/opcode together.
fn shift_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  additive_expression(p, decl, block)
}

fn additive_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  binary_level(p, decl, block, multiplicative_expression, |k| match k {
    TokenKind::Punct(b'+') => Some(Opcode::Add),
    TokenKind::Punct(b'-') => Some(Opcode::Sub),
    _ => None,
  })
}

fn multiplicative_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  binary_level(p, decl, block, cast_expression, |k| match k {
    TokenKind::Punct(b'*') => Some(Opcode::Mul),
    TokenKind::Punct(b'/') => Some(Opcode::Div),
    TokenKind::Punct(b'%') => Some(Opcode::Mod),
    _ => None,
  })
}

/// Whether `kind` can start a `type-name` by itself (used for both the
/// cast-vs-paren and `sizeof(type-name)` two-token lookaheads, spec §4.E).
/// A leading `IDENTIFIER` also qualifies, but only if it resolves to a
/// `TYPEDEF` — that check needs the namespace, so it lives in
/// `is_cast_lookahead` rather than here.
fn starts_type_name(kind: TokenKind) -> bool {
  matches!(kind,
    TokenKind::Const | TokenKind::Volatile
      | TokenKind::Char | TokenKind::Short | TokenKind::Int | TokenKind::Long
      | TokenKind::Signed | TokenKind::Unsigned | TokenKind::Float | TokenKind::Double | TokenKind::Void
      | TokenKind::Struct | TokenKind::Union | TokenKind::Enum)
}

/// Parses a `type-name` (`declaration_specifiers` plus an abstract
/// `declarator` with no identifier), reusing `decl.rs`'s declarator builder
/// rather than duplicating it — the same grammar, just with `name` always
/// discarded.
fn type_name<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl,
) -> PResult<Type> {
  let Some(specs) = super::decl::declaration_specifiers(p, decl, true)? else {
    return Err(p.diags.error(None, "expected a type name"));
  };
  let (ty, _name) = super::decl::declarator(p, decl, specs.ty)?;
  Ok(ty)
}

/// `cast-expression`, spec §4.E: `( type-name ) cast-expression`, recognized
/// by a type keyword or typedef-name identifier two tokens after `(`
/// (`peekn(2)`), falling through to `unary-expression` otherwise — the same
/// two-token lookahead distinguishes this from a parenthesized
/// sub-expression at the primary-expression level.
fn cast_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  if matches!(p.lexer.peek().kind, TokenKind::Punct(b'(')) && is_cast_lookahead(p) {
    p.lexer.next();
    let ty = type_name(p, decl)?;
    p.expect(TokenKind::Punct(b')'))?;
    let block = cast_expression(p, decl, block)?;
    let src = decl.cfg.expr(block);
    let result = p.eval.eval_cast(&decl.cfg, block, src, ty);
    decl.cfg.set_expr(block, result);
    return Ok(block);
  }
  unary_expression(p, decl, block)
}

/// The `peekn(2)` disambiguation shared by `cast_expression` and `sizeof`:
/// a type keyword, or an identifier that resolves in `ns_ident` to a
/// `TYPEDEF`.
fn is_cast_lookahead<L: Lexer, E: Evaluator, A: CfgAllocator>(p: &mut Parser<L, E, A>) -> bool {
  let second = p.lexer.peekn(2);
  if starts_type_name(second.kind) { return true }
  if second.kind == TokenKind::Identifier {
    let name = second.strval.expect("identifier token carries strval");
    return p.scopes.ident.lookup(name).is_some_and(|s| s.symtype() == SymType::Typedef);
  }
  false
}

/// `unary-expression`, spec §4.E: `&`, `*`, `!`, unary `+`/`-`, prefix
/// `++`/`--`, `sizeof`, falling through to `postfix-expression`.
fn unary_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  match p.lexer.peek().kind {
    TokenKind::Punct(b'&') => {
      p.lexer.next();
      let block = cast_expression(p, decl, block)?;
      let src = decl.cfg.expr(block);
      let result = p.eval.eval_addr(&decl.cfg, block, src, p.options.pointer_size);
      decl.cfg.set_expr(block, result);
      Ok(block)
    }
    TokenKind::Punct(b'*') => {
      p.lexer.next();
      let block = cast_expression(p, decl, block)?;
      let src = decl.cfg.expr(block);
      if !src.ty.is_pointer() {
        return Err(p.diags.error(None, "indirection requires a pointer operand"));
      }
      let pointee = src.ty.next().expect("pointer has a pointee type").clone();
      let result = p.eval.eval_deref(src, 0, pointee);
      decl.cfg.set_expr(block, result);
      Ok(block)
    }
    TokenKind::Punct(b'!') => {
      p.lexer.next();
      let block = cast_expression(p, decl, block)?;
      let src = decl.cfg.expr(block);
      let zero = Var::immediate(src.ty.clone(), 0);
      let result = p.eval.eval_expr(&decl.cfg, block, Opcode::Eq, src, zero);
      decl.cfg.set_expr(block, result);
      Ok(block)
    }
    TokenKind::Punct(b'+') => {
      p.lexer.next();
      cast_expression(p, decl, block)
    }
    TokenKind::Punct(b'-') => {
      p.lexer.next();
      let block = cast_expression(p, decl, block)?;
      let src = decl.cfg.expr(block);
      let zero = Var::immediate(src.ty.clone(), 0);
      let result = p.eval.eval_expr(&decl.cfg, block, Opcode::Sub, zero, src);
      decl.cfg.set_expr(block, result);
      Ok(block)
    }
    TokenKind::Increment | TokenKind::Decrement => {
      let incr = p.lexer.next().kind == TokenKind::Increment;
      let block = unary_expression(p, decl, block)?;
      let target = decl.cfg.expr(block);
      if !target.lvalue {
        return Err(p.diags.error(None, "increment/decrement requires an lvalue operand"));
      }
      let one = Var::immediate(target.ty.clone(), 1);
      let op = if incr { Opcode::Add } else { Opcode::Sub };
      let updated = p.eval.eval_expr(&decl.cfg, block, op, target.clone(), one);
      let result = p.eval.eval_assign(&decl.cfg, block, target, updated);
      decl.cfg.set_expr(block, result);
      Ok(block)
    }
    TokenKind::Sizeof => sizeof_expression(p, decl, block),
    _ => postfix_expression(p, decl, block),
  }
}

/// `sizeof unary-expression` or `sizeof ( type-name )`, spec §4.E:
/// `sizeof(type-name)` needs the same two-token lookahead as a cast;
/// otherwise the operand is parsed purely to learn its type, in a
/// throwaway block whose ops (and any CFG branching it triggers) are never
/// linked into the real control-flow graph — `sizeof` never evaluates its
/// operand.
fn sizeof_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  p.lexer.next(); // `sizeof`
  let ty = if matches!(p.lexer.peek().kind, TokenKind::Punct(b'(')) && is_cast_lookahead(p) {
    p.lexer.next();
    let ty = type_name(p, decl)?;
    p.expect(TokenKind::Punct(b')'))?;
    ty
  } else {
    let throwaway = p.alloc.cfg_block_init(decl);
    let throwaway = unary_expression(p, decl, throwaway)?;
    decl.cfg.expr(throwaway).ty
  };
  if ty.kind() == TypeKind::Function {
    return Err(p.diags.error(None, "sizeof of a function type"));
  }
  if !ty.is_complete() {
    return Err(p.diags.error(None, "sizeof of an incomplete type"));
  }
  let result_ty = types::init_integer(p.options.int_size);
  result_ty.set_unsigned();
  let result = Var::immediate(result_ty, i64::from(ty.size()));
  decl.cfg.set_expr(block, result);
  Ok(block)
}

/// `postfix-expression`, spec §4.E: subscript, call, `.`/`->` field access,
/// postfix `++`/`--`, left-associative and chainable (`a[i].f(x)++` parses
/// as written).
fn postfix_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  let mut block = primary_expression(p, decl, block)?;
  loop {
    match p.lexer.peek().kind {
      TokenKind::Punct(b'[') => {
        p.lexer.next();
        let base = decl.cfg.expr(block);
        block = expression(p, decl, block)?;
        let index = decl.cfg.expr(block);
        p.expect(TokenKind::Punct(b']'))?;
        // `a[b]` lowers to `*(a + b)`; pointer-arithmetic scaling (by the
        // element size) is the evaluator's responsibility, per spec §4.E.
        let elem_ty = base.ty.next().expect("subscript of a non-pointer, non-array type").clone();
        let base_value = if base.ty.is_array() {
          p.eval.eval_addr(&decl.cfg, block, base, p.options.pointer_size)
        } else {
          base
        };
        let sum = p.eval.eval_expr(&decl.cfg, block, Opcode::Add, base_value, index);
        let result = p.eval.eval_deref(sum, 0, elem_ty);
        decl.cfg.set_expr(block, result);
      }
      TokenKind::Punct(b'(') => {
        p.lexer.next();
        block = call_arguments(p, decl, block)?;
      }
      TokenKind::Punct(b'.') => {
        p.lexer.next();
        let tok = p.expect(TokenKind::Identifier)?;
        let name = tok.strval.expect("identifier token carries strval");
        let base = decl.cfg.expr(block);
        // `a.f` takes the address first and shares code with `a->f`,
        // spec §4.E.
        let addr = p.eval.eval_addr(&decl.cfg, block, base, p.options.pointer_size);
        let result = field_access(p, addr, name)?;
        decl.cfg.set_expr(block, result);
      }
      TokenKind::Arrow => {
        p.lexer.next();
        let tok = p.expect(TokenKind::Identifier)?;
        let name = tok.strval.expect("identifier token carries strval");
        let base = decl.cfg.expr(block);
        let result = field_access(p, base, name)?;
        decl.cfg.set_expr(block, result);
      }
      TokenKind::Increment | TokenKind::Decrement => {
        let incr = p.lexer.next().kind == TokenKind::Increment;
        let target = decl.cfg.expr(block);
        if !target.lvalue {
          return Err(p.diags.error(None, "increment/decrement requires an lvalue operand"));
        }
        let saved = p.eval.eval_copy(&decl.cfg, block, target.clone());
        let one = Var::immediate(target.ty.clone(), 1);
        let op = if incr { Opcode::Add } else { Opcode::Sub };
        let updated = p.eval.eval_expr(&decl.cfg, block, op, target.clone(), one);
        p.eval.eval_assign(&decl.cfg, block, target, updated);
        decl.cfg.set_expr(block, saved);
      }
      _ => break,
    }
  }
  Ok(block)
}

/// Shared tail of `a.f`/`a->f`, spec §4.E: `ptr` is a pointer-valued `Var`
/// pointing at the object; the result is a `DEREF` var with the member's
/// type and offset added.
fn field_access<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, ptr: Var, name: crate::symbol::Symbol,
) -> PResult<Var> {
  let Some(obj_ty) = ptr.ty.next() else {
    return Err(p.diags.error(None, "field access on a non-object type"));
  };
  if !obj_ty.is_object() {
    return Err(p.diags.error(None, "field access on a non-object type"));
  }
  let Some(member) = obj_ty.members().iter().find(|m| m.name == Some(name)).cloned() else {
    return Err(p.diags.error(None, format!("no member named '{}'", p.interner.borrow().resolve(name))));
  };
  Ok(p.eval.eval_deref(ptr, member.offset, member.ty))
}

/// Call arguments and the `Call` emission, spec §4.E: `f` is already in
/// `block.expr` (read by the caller before dispatching here); reads at
/// least `f.type.n` arguments (`param` for each, in order), accepting
/// extras only if `is_vararg`.
fn call_arguments<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, mut block: BlockId,
) -> PResult<BlockId> {
  let func = decl.cfg.expr(block);
  if !func.ty.is_function() {
    return Err(p.diags.error(None, "called object is not a function"));
  }
  let required = u32::try_from(func.ty.n_members()).expect("parameter count fits u32");
  let mut nargs = 0u32;
  if !matches!(p.lexer.peek().kind, TokenKind::Punct(b')')) {
    loop {
      block = assignment_expression(p, decl, block)?;
      let arg = decl.cfg.expr(block);
      p.eval.param(&decl.cfg, block, arg);
      nargs += 1;
      if !matches!(p.lexer.peek().kind, TokenKind::Punct(b',')) { break }
      p.lexer.next();
    }
  }
  p.expect(TokenKind::Punct(b')'))?;
  if nargs < required {
    return Err(p.diags.error(None, "too few arguments in function call"));
  }
  if nargs > required && !func.ty.is_vararg() {
    return Err(p.diags.error(None, "too many arguments in function call"));
  }
  let result = p.eval.eval_call(&decl.cfg, block, func, nargs);
  decl.cfg.set_expr(block, result);
  Ok(block)
}

/// `primary-expression`, spec §4.E: identifier, integer constant, string
/// literal, or a parenthesized expression.
fn primary_expression<L: Lexer, E: Evaluator, A: CfgAllocator>(
  p: &mut Parser<L, E, A>, decl: &mut Decl, block: BlockId,
) -> PResult<BlockId> {
  let tok = p.lexer.peek();
  match tok.kind {
    TokenKind::Identifier => {
      p.lexer.next();
      let name = tok.strval.expect("identifier token carries strval");
      let Some(sym) = p.scopes.ident.lookup(name) else {
        return Err(p.diags.error(Some(tok.span), format!(
          "use of undefined identifier '{}'", p.interner.borrow().resolve(name))));
      };
      let value = if sym.symtype() == SymType::Enum {
        Var::immediate(sym.ty.clone(), sym.enum_value)
      } else {
        let ty = sym.ty.clone();
        Var::direct_symbol(sym, ty)
      };
      decl.cfg.set_expr(block, value);
      Ok(block)
    }
    TokenKind::IntegerConstant => {
      p.lexer.next();
      let ty = types::init_integer(p.options.int_size);
      decl.cfg.set_expr(block, Var::immediate(ty, tok.intval));
      Ok(block)
    }
    TokenKind::String => {
      p.lexer.next();
      let name = tok.strval.expect("string token carries strval");
      let text = p.interner.borrow().resolve(name).to_string();
      let len = u32::try_from(text.len() + 1).expect("string literal length fits u32");
      let ty = types::init_array(types::init_integer(1), len);
      let label = p.interner.borrow().strlabel(&text);
      decl.cfg.set_expr(block, Var::string_literal(label, ty));
      Ok(block)
    }
    TokenKind::Punct(b'(') => {
      p.lexer.next();
      let block = expression(p, decl, block)?;
      p.expect(TokenKind::Punct(b')'))?;
      Ok(block)
    }
    _ => Err(p.diags.error(Some(tok.span), format!("unexpected token {:?} in expression", tok.kind))),
  }
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

  /// Short-circuit `||` lowers to exactly the three-block diamond spec §8
  /// property 5 describes: the left operand's block branches straight to
  /// the merge block on `true`, falls through to the right operand's block
  /// on `false`, which itself falls through to the same merge block, whose
  /// `.expr` is an int-typed temporary.
  #[test]
  fn logical_or_short_circuit_shape() {
    let mut p = parser("int f(int a, int b){ return a || b; }");
    let decl = p.parse().unwrap().unwrap();

    let b_a = decl.body;
    let l = decl.cfg.jump(b_a, 1).expect("true edge short-circuits straight to the merge block");
    let b_b = decl.cfg.jump(b_a, 0).expect("false edge falls through to the right operand");
    assert_eq!(decl.cfg.jump(b_b, 0), Some(l));
    let merged = decl.cfg.expr(l);
    assert!(merged.ty.is_integer());
  }

  /// A chain of `||` shares one merge block and one temporary rather than
  /// allocating one per link.
  #[test]
  fn logical_or_chain_shares_one_merge_block() {
    let mut p = parser("int f(int a, int b, int c){ return a || b || c; }");
    let decl = p.parse().unwrap().unwrap();

    let first = decl.body;
    let merge = decl.cfg.jump(first, 1).expect("first link's true edge reaches the shared merge block");
    let second = decl.cfg.jump(first, 0).expect("first link's false edge continues the chain");
    assert_eq!(decl.cfg.jump(second, 1), Some(merge), "second link short-circuits to the same merge block");
  }

  #[test]
  fn relational_operators_canonicalize_to_gt_and_ge() {
    let mut p = parser("int f(int a, int b){ return a < b; }");
    let decl = p.parse().unwrap().unwrap();
    let ops = decl.cfg.block(decl.body).ops.clone();
    match ops.as_slice() {
      [crate::ir::Op::Binary { opcode, .. }] => assert_eq!(*opcode, crate::ir::Opcode::Gt),
      other => panic!("expected a single canonicalized Gt, found {other:?}"),
    }
  }

  #[test]
  fn ternary_conditional_merges_through_a_shared_temporary() {
    let mut p = parser("int f(int a){ return a ? 1 : 2; }");
    let decl = p.parse().unwrap().unwrap();
    let cond = decl.body;
    let then_block = decl.cfg.jump(cond, 1).expect("condition true edge");
    let else_block = decl.cfg.jump(cond, 0).expect("condition false edge");
    let next = decl.cfg.jump(then_block, 0).expect("then arm merges");
    assert_eq!(decl.cfg.jump(else_block, 0), Some(next), "else arm merges into the same block");
    assert!(decl.cfg.expr(next).ty.is_integer());
  }

  /// A storage-class keyword inside a cast's type-name has nowhere to
  /// attach (`original_source/src/parse.c` passes `stc_out == NULL` here)
  /// and must be a hard parse error, not silently dropped.
  #[test]
  fn storage_class_in_cast_type_name_is_rejected() {
    let mut p = parser("int f(int a){ return (static int)a; }");
    assert!(p.parse().is_err());
  }
}
