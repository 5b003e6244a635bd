//! Top-level driver (component F) and the `Parser` context value every
//! parser entry point is written against. The parser is generic over the
//! three external contracts (spec §1) so it is never hard-wired to the
//! reference [`crate::lexer::SimpleLexer`] / [`crate::ir::ThreeAddressEvaluator`]
//! / [`crate::ir::ArenaCfgAllocator`] — a real driver supplies its own.

pub mod decl;
pub mod expr;
pub mod stmt;

use std::rc::Rc;
use crate::config::Options;
use crate::diag::{DiagnosticSink, PResult};
use crate::ir::{CfgAllocator, Decl, Evaluator, Var};
use crate::lexer::Lexer;
use crate::namespace::{Linkage, Scopes, Sym, SymType};
use crate::symbol::SharedInterner;
use crate::types::Type;

/// The one context value threaded through every parser entry point (spec §9,
/// "Global namespaces" redesign). Owns the token source, the three
/// namespaces, the diagnostic sink, target configuration, and the
/// IR-producing collaborators.
pub struct Parser<L, E, A> {
  pub lexer: L,
  pub interner: SharedInterner,
  pub scopes: Scopes,
  pub diags: DiagnosticSink,
  pub options: Options,
  pub eval: E,
  pub alloc: A,
  /// Every `Tentative` file-scope symbol seen so far, in declaration order,
  /// a candidate for end-of-translation-unit resolution (spec §4.F step 3).
  tentative: Vec<Rc<Sym>>,
  tentative_resolved: bool,
  /// `(break_target, continue_target)` of the loop currently being parsed,
  /// one entry per nesting level (spec §4.D); `break`/`continue` consult the
  /// top of this stack, pushed on loop entry and popped on exit by
  /// `stmt.rs`'s `while_statement`/`do_statement`/`for_statement`.
  loop_targets: Vec<(crate::ir::BlockId, crate::ir::BlockId)>,
}

impl<L: Lexer, E: Evaluator, A: CfgAllocator> Parser<L, E, A> {
  pub fn new(lexer: L, interner: SharedInterner, options: Options, eval: E, alloc: A) -> Self {
    Self {
      lexer, interner, scopes: Scopes::new(), diags: DiagnosticSink::new(), options, eval, alloc,
      tentative: Vec::new(), tentative_resolved: false, loop_targets: Vec::new(),
    }
  }

  /// Record a file-scope `Tentative` symbol as a candidate for
  /// end-of-translation-unit resolution. Called by `declaration` (decl.rs)
  /// whenever it registers one.
  pub(crate) fn note_tentative(&mut self, sym: Rc<Sym>) { self.tentative.push(sym); }

  /// Consume the next token if it has kind `kind`, else record a diagnostic
  /// and return `Err(Fatal)`. Used wherever the grammar requires a specific
  /// punctuator/keyword at a fixed position (closing `)`/`}`/`;` and
  /// similar) that hasn't already been `peek`ed and confirmed — contrast
  /// `Lexer::consume`, which panics and is only ever called on a tag the
  /// caller just peeked.
  pub(crate) fn expect(&mut self, kind: crate::lexer::TokenKind) -> PResult<crate::lexer::Token> {
    let tok = self.lexer.peek();
    if tok.kind == kind {
      return Ok(self.lexer.next());
    }
    Err(self.diags.error(Some(tok.span), format!("expected {kind:?}, found {:?}", tok.kind)))
  }

  /// `temp(ns, type) -> Symbol` of spec §4.A: mint a fresh, source-unreachable
  /// local temporary of `ty`, installed into `ns_ident` and recorded as a
  /// local of the current declaration. Used by `expr.rs` for both
  /// short-circuit `&&`/`||` merge results and the ternary conditional's
  /// merge result — every use synthesizes a value that outlives the block
  /// that produced it, so it needs a real (if compiler-generated) symbol
  /// rather than an evaluator register.
  pub(crate) fn temp(&mut self, decl: &mut Decl, ty: Type) -> Rc<Sym> {
    let name = crate::ir::short_circuit_temp_name(&self.interner);
    let sym = self.scopes.add_ident(name, ty, SymType::Definition, Linkage::None, 0);
    decl.locals.push(Rc::clone(&sym));
    sym
  }

  /// Push `(break_target, continue_target)` for a newly entered loop, spec
  /// §5 "break_target and continue_target are maintained as a ...
  /// scoped pair saved on entry and restored on exit of each loop."
  pub(crate) fn push_loop_targets(&mut self, break_target: crate::ir::BlockId, continue_target: crate::ir::BlockId) {
    self.loop_targets.push((break_target, continue_target));
  }

  /// Restore the enclosing loop's targets on exit.
  pub(crate) fn pop_loop_targets(&mut self) { self.loop_targets.pop(); }

  /// The innermost enclosing loop's `(break_target, continue_target)`, or
  /// `None` outside of any loop.
  pub(crate) fn loop_targets(&self) -> Option<(crate::ir::BlockId, crate::ir::BlockId)> {
    self.loop_targets.last().copied()
  }

  /// One call per external declaration, spec §4.F.
  ///
  /// This crate resolves the ambiguity in the original wording ("while not
  /// at end-of-input, invoke declaration... if any ops were emitted... return
  /// decl") by having each call process *at most one* external declaration:
  /// scenario S2 requires `static int y;` (which emits nothing) to be
  /// returned from one call and the terminal `y = 0` fill from a distinct,
  /// later call, which only holds if a content-free declaration still ends
  /// its own `parse()` call rather than being silently skipped.
  pub fn parse(&mut self) -> PResult<Option<Decl>> {
    if self.lexer.peek().kind == crate::lexer::TokenKind::Eof {
      return Ok(self.resolve_tentative_definitions());
    }
    let mut decl = self.alloc.cfg_create();
    let body = decl.body;
    decl::declaration(self, &mut decl, body)?;
    Ok(Some(decl))
  }

  /// Step 3 of spec §4.F, performed exactly once across this parser's
  /// lifetime. Every call after the first terminal call returns `None`.
  fn resolve_tentative_definitions(&mut self) -> Option<Decl> {
    if self.tentative_resolved { return None }
    self.tentative_resolved = true;
    let mut decl = self.alloc.cfg_create();
    for sym in std::mem::take(&mut self.tentative) {
      if sym.symtype() == SymType::Tentative && sym.linkage == Linkage::Internal {
        log::info!("tentative definition resolution: {} = 0", self.interner.borrow().resolve(sym.name));
        let dest = Var::direct_symbol(Rc::clone(&sym), sym.ty.clone());
        let zero = Var::immediate(sym.ty.clone(), 0);
        self.eval.eval_assign(&decl.cfg, decl.head, dest, zero);
        sym.promote_to_definition();
      }
    }
    Some(decl)
  }
}
