//! The three namespaces spec §5 requires: ordinary identifiers, labels and
//! tags, each with independent lexical scoping. [`Scopes`] bundles all
//! three and is the one context value threaded through every parser entry
//! point — there is no global symbol table (spec §9, "Global namespaces").

use std::rc::Rc;
use std::cell::Cell;
use im::HashMap;
use crate::symbol::Symbol;
use crate::types::Type;

/// What kind of thing a declaration introduced, spec §5.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymType {
  /// An `extern` declaration with no definition (yet).
  Declaration,
  /// A file-scope object declaration with no initializer; resolved to
  /// `Definition` at end-of-translation-unit if never otherwise defined.
  Tentative,
  /// A function with a body, or an object with an initializer.
  Definition,
  Typedef,
  /// An enumerator constant; `enum_value` holds its value.
  Enum,
}

/// Linkage of an identifier, spec §5.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Linkage {
  External,
  Internal,
  /// Block-scope automatic variables and parameters: no linkage at all.
  None,
}

/// Which grammar production introduced a tag, so `struct S` and `union S`
/// (or either one and `enum S`) can be rejected as a kind mismatch even
/// though they'd otherwise share a name in `ns_tag` (spec §7, "tag-kind
/// mismatch").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TagKind { Struct, Union, Enum }

/// One entry in the tag namespace. For `Struct`/`Union` the underlying
/// `Type`'s own `size == 0` already says "forward"; `complete` exists
/// separately because an enum tag has no type-level incompleteness marker
/// of its own (spec §3 invariant (iii) ties enum completeness to the *tag
/// symbol*, not the type).
pub struct TagEntry {
  pub kind: TagKind,
  pub ty: Type,
  complete: Cell<bool>,
}

impl TagEntry {
  #[must_use] pub fn new(kind: TagKind, ty: Type) -> Self {
    Self { kind, ty, complete: Cell::new(false) }
  }

  /// Struct/union completeness is read straight off the shared `Type` (its
  /// `size` goes from `0` to nonzero exactly once, when
  /// `align_struct_members` runs) rather than the cached `complete` flag,
  /// which only `Enum` needs since an enum's `Type` has no incompleteness
  /// marker of its own (spec §3 invariant (iii)).
  #[must_use] pub fn is_complete(&self) -> bool {
    match self.kind {
      TagKind::Struct | TagKind::Union => self.ty.is_complete(),
      TagKind::Enum => self.complete.get(),
    }
  }
  pub fn mark_complete(&self) { self.complete.set(true) }
}

/// One entry in the identifier namespace.
#[derive(Debug)]
pub struct Sym {
  pub name: Symbol,
  pub ty: Type,
  symtype: Cell<SymType>,
  pub linkage: Linkage,
  /// Scope nesting depth at the point of declaration; `0` is file scope.
  pub depth: u32,
  /// Valid only when `symtype() == SymType::Enum`.
  pub enum_value: i64,
  /// Ordinal assigned at `add` time, stable for this symbol's lifetime;
  /// a back end can use it to number locals without re-deriving order.
  pub n: u32,
}

impl Sym {
  #[must_use] pub fn symtype(&self) -> SymType { self.symtype.get() }
  /// Upgrade a `Tentative` object to `Definition` once an initializer (or,
  /// at end-of-translation-unit, the fallback rule) supplies one. Spec §5,
  /// §8 scenario S6.
  pub fn promote_to_definition(&self) { self.symtype.set(SymType::Definition) }
  /// Overwrite the symbol's kind outright, used by `parse::decl`'s
  /// redeclaration merge to widen a re-declared symbol (`Declaration` ->
  /// `Tentative` -> `Definition`) in place rather than allocating a second
  /// `Sym`.
  pub(crate) fn set_symtype(&self, symtype: SymType) { self.symtype.set(symtype) }
}

/// A generic scope stack: each scope is a name → value map, and a lookup
/// walks from the innermost scope outward. Values are reference-counted so
/// a lookup result can outlive the scope it was found in (e.g. a `Type`
/// handle for a struct tag declared in an enclosing block).
pub struct Namespace<T> {
  scopes: Vec<HashMap<Symbol, Rc<T>>>,
}

impl<T> Default for Namespace<T> {
  fn default() -> Self { Self { scopes: vec![HashMap::new()] } }
}

impl<T> Namespace<T> {
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Current nesting depth; `0` is file scope.
  #[must_use] pub fn depth(&self) -> u32 { u32::try_from(self.scopes.len() - 1).expect("scope depth") }

  pub fn push_scope(&mut self) { self.scopes.push(HashMap::new()) }

  /// Discard the innermost scope. Panics if called at file scope — a logic
  /// error in the caller, since file scope is never popped.
  pub fn pop_scope(&mut self) {
    assert!(self.scopes.len() > 1, "cannot pop file scope");
    self.scopes.pop();
  }

  /// Declare `name` in the *innermost* scope, shadowing any outer binding.
  /// Does not check for a pre-existing binding in the same scope (a
  /// redeclaration/redefinition error, which callers check for via
  /// [`Namespace::lookup_current_scope`] before calling `add`).
  pub fn add(&mut self, name: Symbol, value: T) -> Rc<T> {
    let rc = Rc::new(value);
    self.scopes.last_mut().expect("always at least file scope").insert(name, Rc::clone(&rc));
    rc
  }

  /// Look up `name`, searching from the innermost scope outward.
  #[must_use] pub fn lookup(&self, name: Symbol) -> Option<Rc<T>> {
    self.scopes.iter().rev().find_map(|s| s.get(&name).cloned())
  }

  /// Look up `name` only in the innermost scope, for redeclaration checks.
  #[must_use] pub fn lookup_current_scope(&self, name: Symbol) -> Option<Rc<T>> {
    self.scopes.last().expect("always at least file scope").get(&name).cloned()
  }
}

/// The three namespaces plus the symbol-ordinal counter, bundled into the
/// one context value every parser entry point takes. Labels are
/// function-scoped in C (not block-scoped, unlike ordinary identifiers and
/// tags), so they get their own `enter_function`/`exit_function` pair
/// instead of following `push_scope`/`pop_scope`.
#[derive(Default)]
pub struct Scopes {
  pub ident: Namespace<Sym>,
  pub tag: Namespace<TagEntry>,
  label: Namespace<()>,
  next_ordinal: u32,
}

impl Scopes {
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Enter a block: push a fresh scope onto both the identifier and tag
  /// namespaces together, matching C's block-scope rules.
  pub fn push_scope(&mut self) { self.ident.push_scope(); self.tag.push_scope(); }

  /// Leave a block, per [`Scopes::push_scope`].
  pub fn pop_scope(&mut self) { self.ident.pop_scope(); self.tag.pop_scope(); }

  /// Declare an identifier in the current scope, stamping it with a fresh
  /// ordinal. See [`Namespace::add`] for shadowing semantics.
  pub fn add_ident(&mut self, name: Symbol, ty: Type, symtype: SymType, linkage: Linkage, enum_value: i64) -> Rc<Sym> {
    let n = self.next_ordinal;
    self.next_ordinal += 1;
    let depth = self.ident.depth();
    self.ident.add(name, Sym { name, ty, symtype: Cell::new(symtype), linkage, depth, enum_value, n })
  }

  /// Reset the label namespace for a new function body.
  pub fn enter_function(&mut self) { self.label = Namespace::new(); }
  /// Leave the function body; labels from the previous function are no
  /// longer reachable.
  pub fn exit_function(&mut self) { self.label = Namespace::new(); }

  /// Declare a label in the current function, returning `false` if it was
  /// already declared (a duplicate-label error at the call site).
  pub fn declare_label(&mut self, name: Symbol) -> bool {
    if self.label.lookup(name).is_some() { return false }
    self.label.add(name, ());
    true
  }

  /// Whether a label with this name has been declared in the current function.
  #[must_use] pub fn label_declared(&self, name: Symbol) -> bool { self.label.lookup(name).is_some() }

  /// A throwaway namespace with no relation to any enclosing scope, used by
  /// `struct_declaration_list` to detect duplicate member names within one
  /// struct/union body without polluting the real identifier namespace
  /// (`original_source/src/parse.c`'s `struct_declaration_list` scans a
  /// local `members` list for the same purpose).
  #[must_use] pub fn temp<T>() -> Namespace<T> { Namespace::new() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbol::Interner;
  use crate::types::init_integer;

  #[test]
  fn inner_scope_shadows_outer() {
    let mut i = Interner::new();
    let x = i.intern("x");
    let mut scopes = Scopes::new();
    scopes.add_ident(x, init_integer(4), SymType::Definition, Linkage::External, 0);
    scopes.push_scope();
    scopes.add_ident(x, init_integer(2), SymType::Definition, Linkage::None, 0);
    assert_eq!(scopes.ident.lookup(x).unwrap().ty.size(), 2);
    scopes.pop_scope();
    assert_eq!(scopes.ident.lookup(x).unwrap().ty.size(), 4);
  }

  #[test]
  fn tentative_promotes_to_definition() {
    let mut i = Interner::new();
    let x = i.intern("x");
    let mut scopes = Scopes::new();
    let sym = scopes.add_ident(x, init_integer(4), SymType::Tentative, Linkage::External, 0);
    assert_eq!(sym.symtype(), SymType::Tentative);
    sym.promote_to_definition();
    assert_eq!(sym.symtype(), SymType::Definition);
  }

  #[test]
  fn labels_are_function_scoped_not_block_scoped() {
    let mut i = Interner::new();
    let l = i.intern("done");
    let mut scopes = Scopes::new();
    scopes.enter_function();
    scopes.push_scope();
    assert!(scopes.declare_label(l));
    scopes.pop_scope();
    // still visible: labels ignore block scope entirely.
    assert!(scopes.label_declared(l));
    scopes.exit_function();
    assert!(!scopes.label_declared(l));
  }

  #[test]
  fn duplicate_label_rejected() {
    let mut i = Interner::new();
    let l = i.intern("top");
    let mut scopes = Scopes::new();
    scopes.enter_function();
    assert!(scopes.declare_label(l));
    assert!(!scopes.declare_label(l));
  }

  #[test]
  fn throwaway_namespace_detects_duplicate_member_names() {
    let mut i = Interner::new();
    let a = i.intern("a");
    let mut members: Namespace<()> = Scopes::temp();
    assert!(members.lookup_current_scope(a).is_none());
    members.add(a, ());
    assert!(members.lookup_current_scope(a).is_some());
  }
}
