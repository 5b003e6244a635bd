//! Process-wide string interning.
//!
//! Identifiers, tag names and string-literal payloads all flow through here
//! so that equality and hashing downstream (namespace lookup, type-tree
//! member names) are a single integer compare instead of a string compare.

use std::cell::RefCell;
use std::fmt;
use std::num::NonZeroU32;
use hashbrown::HashMap;

/// An interned string. Cheap to copy, compare and hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(NonZeroU32);

impl fmt::Debug for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Symbol({})", self.0)
  }
}

/// Label for an interned string-literal payload, distinct from [`Symbol`]
/// because two textually-identical literals must still map to the same
/// label only when `strlabel` dedups them (see `Interner::strlabel`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct LabelId(u32);

impl LabelId {
  /// The numeric index of this label, for use by a back end's symbol table.
  #[must_use] pub fn index(self) -> u32 { self.0 }
}

/// One interner, shared (via `Rc<RefCell<_>>`) between a [`crate::lexer::SimpleLexer`]
/// and the parser reading its tokens, so both sides agree on one `Symbol` space.
pub type SharedInterner = std::rc::Rc<RefCell<Interner>>;

/// The interner. One instance is expected per compilation, shared as a
/// [`SharedInterner`] between the lexer and the parser.
#[derive(Default)]
pub struct Interner {
  map: HashMap<Box<str>, Symbol>,
  strings: Vec<Box<str>>,
  literals: RefCell<HashMap<Box<str>, LabelId>>,
  literal_strings: RefCell<Vec<Box<str>>>,
  temp_counter: u32,
}

impl Interner {
  /// Create an empty interner.
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Intern `s`, returning the existing [`Symbol`] if already seen.
  pub fn intern(&mut self, s: &str) -> Symbol {
    if let Some(&sym) = self.map.get(s) { return sym }
    let idx = u32::try_from(self.strings.len() + 1).expect("too many identifiers");
    let sym = Symbol(NonZeroU32::new(idx).expect("nonzero"));
    self.strings.push(s.into());
    self.map.insert(s.into(), sym);
    sym
  }

  /// Resolve a [`Symbol`] back to its text.
  #[must_use] pub fn resolve(&self, sym: Symbol) -> &str {
    &self.strings[(sym.0.get() - 1) as usize]
  }

  /// Synthesize a fresh identifier not colliding with any source name
  /// (source identifiers cannot contain `%`), used for short-circuit and
  /// other compiler-generated temporaries.
  pub fn fresh(&mut self, prefix: &str) -> Symbol {
    let name = format!("%{prefix}{}", self.temp_counter);
    self.temp_counter += 1;
    self.intern(&name)
  }

  /// Intern a string literal's payload (NUL-exclusive contents), returning a
  /// stable [`LabelId`] that dedups identical literals. Separate storage
  /// from identifier interning because literal bytes may contain characters
  /// (e.g. `\0`, non-ASCII) that would be nonsensical as identifiers.
  pub fn strlabel(&self, s: &str) -> LabelId {
    let mut lits = self.literals.borrow_mut();
    if let Some(&id) = lits.get(s) { return id }
    let mut strs = self.literal_strings.borrow_mut();
    let id = LabelId(u32::try_from(strs.len()).expect("too many string literals"));
    strs.push(s.into());
    lits.insert(s.into(), id);
    id
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interning_dedups() {
    let mut i = Interner::new();
    let a = i.intern("foo");
    let b = i.intern("foo");
    let c = i.intern("bar");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(i.resolve(a), "foo");
  }

  #[test]
  fn fresh_names_are_unique_and_unreachable_from_source() {
    let mut i = Interner::new();
    let t0 = i.fresh("t");
    let t1 = i.fresh("t");
    assert_ne!(t0, t1);
    assert!(i.resolve(t0).starts_with('%'));
  }

  #[test]
  fn strlabel_dedups_identical_literals() {
    let i = Interner::new();
    let a = i.strlabel("hello");
    let b = i.strlabel("hello");
    let c = i.strlabel("world");
    assert_eq!(a, b);
    assert_ne!(a, c);
  }
}
