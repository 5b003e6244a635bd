//! IR lowering: three-address operations over a CFG of basic blocks
//! (component D/E's target, spec §3 "Block"/"Variable" and §6 "Evaluator
//! contract"/"CFG allocator contract").
//!
//! `Cfg` keeps every `BasicBlock` of one declaration in a single
//! index-addressed `Vec`; callers hold a small `Copy` `BlockId` rather than
//! a live reference, which is what lets `parse/stmt.rs` and `parse/expr.rs`
//! install a jump edge into a block built earlier without fighting the
//! borrow checker the way a direct-pointer CFG (as in the original C) would
//! force. This is the one place the teacher's `BlockId`/`cur_block: BlockId`
//! idiom (`build_mir.rs`'s `BuildMir`) is kept verbatim while the actual
//! payload changes completely.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use smallvec::SmallVec;
use crate::namespace::Sym;
use crate::symbol::{LabelId, Symbol};
use crate::types::Type;

/// How a [`Var`] refers to its storage.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VarKind {
  /// Names a symbol (or an evaluator-synthesized register) directly.
  Direct,
  /// Names a symbol that holds an *address*; `offset` is a byte offset
  /// applied after the dereference (used for `.`/`->` field access and
  /// `*p`).
  Deref,
  /// A compile-time constant; `value` is authoritative.
  Immediate,
  /// A reference to an interned string-literal payload; `label` is
  /// authoritative (spec §4.E `var_string`, e.g. a bare `"text"` primary
  /// expression or the `__func__` initializer).
  StringLiteral,
}

/// The lowering-level reference to storage, spec §3 "Variable (`var`)".
/// Produced by expression lowering, consumed by the [`Evaluator`].
#[derive(Clone, Debug)]
pub struct Var {
  pub kind: VarKind,
  /// The declared symbol this var reads/writes, if any (absent for
  /// evaluator-synthesized registers, which are identified by `reg` alone).
  pub symbol: Option<Rc<Sym>>,
  /// An evaluator-private register number, used for intermediate results
  /// that never get a source-level name.
  pub reg: Option<u32>,
  pub ty: Type,
  pub offset: u32,
  pub lvalue: bool,
  /// Meaningful only when `kind == Immediate`.
  pub value: i64,
  /// Meaningful only when `kind == StringLiteral`.
  pub label: Option<LabelId>,
}

impl Var {
  #[must_use] pub fn direct_symbol(symbol: Rc<Sym>, ty: Type) -> Self {
    Self { kind: VarKind::Direct, symbol: Some(symbol), reg: None, ty, offset: 0, lvalue: true, value: 0, label: None }
  }

  #[must_use] pub fn direct_reg(reg: u32, ty: Type) -> Self {
    Self { kind: VarKind::Direct, symbol: None, reg: Some(reg), ty, offset: 0, lvalue: false, value: 0, label: None }
  }

  #[must_use] pub fn immediate(ty: Type, value: i64) -> Self {
    Self { kind: VarKind::Immediate, symbol: None, reg: None, ty, offset: 0, lvalue: false, value, label: None }
  }

  #[must_use] pub fn deref(base: &Var, extra_offset: u32, ty: Type) -> Self {
    Self {
      kind: VarKind::Deref, symbol: base.symbol.clone(), reg: base.reg, ty,
      offset: base.offset + extra_offset, lvalue: true, value: 0, label: base.label,
    }
  }

  /// A reference to an interned string literal's payload (spec §4.E
  /// `var_string`). `ty` is the array-of-char type matching the literal's
  /// length including the trailing NUL.
  #[must_use] pub fn string_literal(label: LabelId, ty: Type) -> Self {
    Self { kind: VarKind::StringLiteral, symbol: None, reg: None, ty, offset: 0, lvalue: false, value: 0, label: Some(label) }
  }

  #[must_use] pub fn is_immediate(&self) -> bool { self.kind == VarKind::Immediate }
}

/// The thirteen three-address opcodes named in spec §6. `LogicalAnd`/
/// `LogicalOr` are real evaluator ops, not just CFG shape: each `&&`/`||`
/// link combines the chain's running value with the newly evaluated operand
/// through one of these (spec §4.E "short-circuit"), *in addition to* the
/// branch that skips evaluating the right operand altogether — the merge
/// block's final value still comes from the temporary `eval_assign` writes,
/// so this op only ever fires on the already-short-circuited left side.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
  Add, Sub, Mul, Div, Mod,
  Eq, Gt, Ge,
  BitwiseAnd, BitwiseOr, BitwiseXor,
  LogicalAnd, LogicalOr,
}

/// One three-address instruction. `dest` is always an evaluator-synthesized
/// [`Var`] (register or, for `Assign`, the caller-supplied lvalue).
#[derive(Clone, Debug)]
pub enum Op {
  Binary { dest: Var, opcode: Opcode, lhs: Var, rhs: Var },
  Assign { dest: Var, src: Var },
  Addr { dest: Var, src: Var },
  Cast { dest: Var, src: Var },
  Copy { dest: Var, src: Var },
  Call { dest: Var, func: Var, nargs: u32 },
  Param { src: Var },
}

/// A stable, `Copy` handle to one block within a [`Cfg`]. Indices into
/// `Cfg::blocks`; never dangles for the lifetime of the owning `Decl`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockId(u32);

/// A basic block, spec §3 "Block". `jump[0]` is the fall-through/false
/// edge, `jump[1]` the true edge (only set for a two-way branch).
#[derive(Default)]
pub struct BasicBlock {
  pub ops: SmallVec<[Op; 4]>,
  pub expr: Option<Var>,
  pub jump: [Option<BlockId>; 2],
}

/// The CFG for one declaration: every `BasicBlock` allocated during one
/// `parse()` call, addressed by `BlockId`.
#[derive(Default)]
pub struct Cfg {
  blocks: Vec<RefCell<BasicBlock>>,
}

impl Cfg {
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Allocate a fresh, empty block and return its handle.
  pub fn new_block(&mut self) -> BlockId {
    self.blocks.push(RefCell::new(BasicBlock::default()));
    BlockId(u32::try_from(self.blocks.len() - 1).expect("too many blocks"))
  }

  fn get(&self, id: BlockId) -> &RefCell<BasicBlock> { &self.blocks[id.0 as usize] }

  pub fn push_op(&self, id: BlockId, op: Op) { self.get(id).borrow_mut().ops.push(op) }

  pub fn set_expr(&self, id: BlockId, expr: Var) { self.get(id).borrow_mut().expr = Some(expr) }

  #[must_use] pub fn expr(&self, id: BlockId) -> Var {
    self.get(id).borrow().expr.clone().expect("block has no expr yet")
  }

  /// Install an edge. `slot` is `0` for fall-through/false, `1` for true.
  pub fn set_jump(&self, id: BlockId, slot: usize, target: BlockId) {
    self.get(id).borrow_mut().jump[slot] = Some(target);
  }

  #[must_use] pub fn jump(&self, id: BlockId, slot: usize) -> Option<BlockId> {
    self.get(id).borrow().jump[slot]
  }

  #[must_use] pub fn block(&self, id: BlockId) -> Ref<'_, BasicBlock> { self.get(id).borrow() }

  #[must_use] pub fn len(&self) -> usize { self.blocks.len() }
  #[must_use] pub fn is_empty(&self) -> bool { self.blocks.is_empty() }
}

/// The per-external-declaration unit, spec §3 "Declaration (`decl`)".
pub struct Decl {
  pub cfg: Cfg,
  /// Accumulates initializer code for static storage (file-scope
  /// assignments, tentative-definition zero-fills).
  pub head: BlockId,
  /// Entry block of the function CFG, or the host block for a file-scope
  /// initializer with no function body.
  pub body: BlockId,
  pub fun: Option<Rc<Sym>>,
  pub locals: Vec<Rc<Sym>>,
  pub params: Vec<Rc<Sym>>,
}

/// `fn cfg_create(&mut self) -> Decl`, `fn cfg_block_init(&mut self, decl:
/// &mut Decl) -> BlockId`, `fn cfg_finalize(&mut self, decl: Decl)` of
/// spec §6. Kept as a trait (rather than inlining `Cfg::new_block` calls
/// directly into the parser) so a real driver can swap in its own
/// allocation/bookkeeping policy — e.g. one that interns blocks into a
/// shared backend-facing arena — without touching parser code.
pub trait CfgAllocator {
  fn cfg_create(&mut self) -> Decl;
  fn cfg_block_init(&mut self, decl: &mut Decl) -> BlockId;
  fn cfg_finalize(&mut self, decl: Decl);
}

/// Straightforward reference allocator: every `Decl` gets its own `Cfg`,
/// `head` and `body` are its first two blocks, and `cfg_finalize` just logs
/// and drops — there is no separate back end in this crate for it to hand
/// the `Decl` off to.
#[derive(Default)]
pub struct ArenaCfgAllocator {
  decls_created: u32,
}

impl ArenaCfgAllocator {
  #[must_use] pub fn new() -> Self { Self::default() }
}

impl CfgAllocator for ArenaCfgAllocator {
  fn cfg_create(&mut self) -> Decl {
    self.decls_created += 1;
    let mut cfg = Cfg::new();
    let head = cfg.new_block();
    let body = cfg.new_block();
    log::debug!("cfg_create: decl #{}", self.decls_created);
    Decl { cfg, head, body, fun: None, locals: Vec::new(), params: Vec::new() }
  }

  fn cfg_block_init(&mut self, decl: &mut Decl) -> BlockId { decl.cfg.new_block() }

  fn cfg_finalize(&mut self, decl: Decl) {
    log::debug!("cfg_finalize: {} blocks, {} locals", decl.cfg.len(), decl.locals.len());
  }
}

/// `eval_expr`, `eval_assign`, `eval_addr`, `eval_deref`, `eval_cast`,
/// `eval_copy`, `eval_call`, `param` of spec §6, generalized to take a
/// `(&Cfg, BlockId)` pair rather than `&mut BasicBlock` directly — the same
/// adaptation `Cfg`/`BlockId` make to the rest of this module, so the
/// contract composes with index-addressed blocks instead of live borrows.
pub trait Evaluator {
  fn eval_expr(&mut self, cfg: &Cfg, block: BlockId, op: Opcode, lhs: Var, rhs: Var) -> Var;
  fn eval_assign(&mut self, cfg: &Cfg, block: BlockId, dest: Var, src: Var) -> Var;
  fn eval_addr(&mut self, cfg: &Cfg, block: BlockId, src: Var, pointer_size: u32) -> Var;
  fn eval_deref(&mut self, src: Var, extra_offset: u32, result_ty: Type) -> Var;
  fn eval_cast(&mut self, cfg: &Cfg, block: BlockId, src: Var, target: Type) -> Var;
  fn eval_copy(&mut self, cfg: &Cfg, block: BlockId, src: Var) -> Var;
  fn eval_call(&mut self, cfg: &Cfg, block: BlockId, func: Var, nargs: u32) -> Var;
  fn param(&mut self, cfg: &Cfg, block: BlockId, arg: Var);
}

/// Reference evaluator: emits exactly one `Op` per call (`eval_deref`
/// excepted, which is pure var reinterpretation per spec §4.E's "result is
/// a DEREF var with field type and offset added") and folds
/// `IMMEDIATE op IMMEDIATE` rather than emitting a redundant op, which is
/// what `constant_expression` (spec §4.E) and file-scope initializer
/// legality (spec §4.C) both require.
#[derive(Default)]
pub struct ThreeAddressEvaluator {
  next_reg: u32,
}

impl ThreeAddressEvaluator {
  #[must_use] pub fn new() -> Self { Self::default() }

  fn fresh(&mut self, ty: Type) -> Var {
    let reg = self.next_reg;
    self.next_reg += 1;
    Var::direct_reg(reg, ty)
  }

  fn fold(op: Opcode, lhs: i64, rhs: i64) -> i64 {
    match op {
      Opcode::Add => lhs.wrapping_add(rhs),
      Opcode::Sub => lhs.wrapping_sub(rhs),
      Opcode::Mul => lhs.wrapping_mul(rhs),
      Opcode::Div => if rhs == 0 { 0 } else { lhs.wrapping_div(rhs) },
      Opcode::Mod => if rhs == 0 { 0 } else { lhs.wrapping_rem(rhs) },
      Opcode::Eq => i64::from(lhs == rhs),
      Opcode::Gt => i64::from(lhs > rhs),
      Opcode::Ge => i64::from(lhs >= rhs),
      Opcode::BitwiseAnd => lhs & rhs,
      Opcode::BitwiseOr => lhs | rhs,
      Opcode::BitwiseXor => lhs ^ rhs,
      Opcode::LogicalAnd => i64::from(lhs != 0 && rhs != 0),
      Opcode::LogicalOr => i64::from(lhs != 0 || rhs != 0),
    }
  }
}

impl Evaluator for ThreeAddressEvaluator {
  fn eval_expr(&mut self, cfg: &Cfg, block: BlockId, op: Opcode, lhs: Var, rhs: Var) -> Var {
    if lhs.is_immediate() && rhs.is_immediate() {
      return Var::immediate(lhs.ty.clone(), Self::fold(op, lhs.value, rhs.value));
    }
    let dest = self.fresh(lhs.ty.clone());
    cfg.push_op(block, Op::Binary { dest: dest.clone(), opcode: op, lhs, rhs });
    dest
  }

  fn eval_assign(&mut self, cfg: &Cfg, block: BlockId, dest: Var, src: Var) -> Var {
    cfg.push_op(block, Op::Assign { dest: dest.clone(), src });
    dest
  }

  fn eval_addr(&mut self, cfg: &Cfg, block: BlockId, src: Var, pointer_size: u32) -> Var {
    let dest = self.fresh(crate::types::init_pointer(src.ty.clone(), pointer_size));
    cfg.push_op(block, Op::Addr { dest: dest.clone(), src });
    dest
  }

  fn eval_deref(&mut self, src: Var, extra_offset: u32, result_ty: Type) -> Var {
    Var::deref(&src, extra_offset, result_ty)
  }

  fn eval_cast(&mut self, cfg: &Cfg, block: BlockId, src: Var, target: Type) -> Var {
    if src.is_immediate() { return Var::immediate(target, src.value) }
    let dest = self.fresh(target);
    cfg.push_op(block, Op::Cast { dest: dest.clone(), src });
    dest
  }

  fn eval_copy(&mut self, cfg: &Cfg, block: BlockId, src: Var) -> Var {
    let dest = self.fresh(src.ty.clone());
    cfg.push_op(block, Op::Copy { dest: dest.clone(), src });
    dest
  }

  fn eval_call(&mut self, cfg: &Cfg, block: BlockId, func: Var, nargs: u32) -> Var {
    let ret = func.ty.next().expect("function type has a return type").clone();
    let dest = self.fresh(ret);
    cfg.push_op(block, Op::Call { dest: dest.clone(), func, nargs });
    dest
  }

  fn param(&mut self, cfg: &Cfg, block: BlockId, arg: Var) {
    cfg.push_op(block, Op::Param { src: arg });
  }
}

/// Synthesize a fresh interned `%sc<n>`-style name for a short-circuit
/// merge-block temporary, mirroring [`crate::symbol::Interner::fresh`] but
/// exposed here since `&&`/`||` lowering (spec §4.E) is the one place
/// `parse/expr.rs` needs to mint a *named* (not just registered) temporary
/// int symbol, installed into `ns_ident` so later code can read it.
pub fn short_circuit_temp_name(interner: &crate::symbol::SharedInterner) -> Symbol {
  interner.borrow_mut().fresh("sc")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::init_integer;

  #[test]
  fn constant_folding_avoids_emitting_an_op() {
    let cfg = Cfg::new();
    let mut ev = ThreeAddressEvaluator::new();
    let block = BlockId(0); // unused: folded path never touches the cfg
    let a = Var::immediate(init_integer(4), 2);
    let b = Var::immediate(init_integer(4), 3);
    let sum = ev.eval_expr(&cfg, block, Opcode::Add, a, b);
    assert!(sum.is_immediate());
    assert_eq!(sum.value, 5);
  }

  #[test]
  fn non_immediate_binary_emits_one_op_and_a_fresh_register() {
    let mut cfg = Cfg::new();
    let block = cfg.new_block();
    let mut ev = ThreeAddressEvaluator::new();
    let a = Var::direct_reg(0, init_integer(4));
    let b = Var::immediate(init_integer(4), 1);
    let dest = ev.eval_expr(&cfg, block, Opcode::Add, a, b);
    assert!(!dest.is_immediate());
    assert_eq!(cfg.block(block).ops.len(), 1);
  }

  #[test]
  fn jump_edges_are_installed_by_block_id() {
    let mut cfg = Cfg::new();
    let parent = cfg.new_block();
    let next = cfg.new_block();
    cfg.set_jump(parent, 0, next);
    assert_eq!(cfg.jump(parent, 0), Some(next));
    assert_eq!(cfg.jump(parent, 1), None);
  }

  #[test]
  fn division_by_zero_folds_to_zero_rather_than_panicking() {
    let cfg = Cfg::new();
    let mut ev = ThreeAddressEvaluator::new();
    let block = BlockId(0);
    let a = Var::immediate(init_integer(4), 10);
    let b = Var::immediate(init_integer(4), 0);
    let r = ev.eval_expr(&cfg, block, Opcode::Div, a, b);
    assert_eq!(r.value, 0);
  }
}
