//! The type tree (component B). A `Type` is a cheap handle (`Rc`) onto a
//! node that is immutable except for two narrowly-scoped mutations: a root
//! array's `size` may be backfilled once by [`complete`], and an `OBJECT`
//! node's `members`/`size` are filled in once by [`add_member`] and
//! [`align_struct_members`]. Both mutations go through `Cell`/`RefCell`
//! rather than casting away constness (contrast `original_source/src/parse.c`,
//! which does `((struct typetree *) target.symbol->type)->size = ...`).

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use crate::symbol::Symbol;

bitflags::bitflags! {
  /// Qualifiers and modifiers that decorate a type node. Grouped into one
  /// flags value the way `mmcc`'s `ArgAttr` groups `NONDEP`/`GHOST`.
  #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
  pub struct TypeFlags: u8 {
    const CONST    = 0b0001;
    const VOLATILE = 0b0010;
    /// Only meaningful on `Integer` nodes.
    const UNSIGNED = 0b0100;
    /// Only meaningful on `Function` nodes: a trailing `...` was parsed.
    const VARARG   = 0b1000;
  }
}

/// The kind of a type node, spec §3.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TypeKind {
  /// `void`, or the sentinel used before a type is known.
  None,
  Integer,
  Real,
  Pointer,
  Array,
  Function,
  /// `struct`/`union` (the distinction is not tracked at this layer; both
  /// lower to an ordered member list, matching the original's single
  /// `OBJECT` kind).
  Object,
}

/// One offset member of an `Object` type, or one parameter of a `Function`
/// type. `name` is `None` for an unnamed prototype parameter (`int f(int);`
/// is legal C — the parameter has a type but no identifier to declare).
#[derive(Clone, Debug)]
pub struct Member {
  pub name: Option<Symbol>,
  pub ty: Type,
  pub offset: u32,
}

impl PartialEq for Member {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name && self.ty == other.ty && self.offset == other.offset
  }
}

struct TypeNode {
  kind: TypeKind,
  /// `0` denotes incomplete: legal only for a root `Array` (pending
  /// [`complete`]) or a forward `Object` (pending member completion).
  size: Cell<u32>,
  flags: Cell<TypeFlags>,
  /// Element type (`Array`), pointee (`Pointer`), or return type (`Function`).
  /// `None` for `Integer`/`Real`/`Object`/the `None` kind.
  next: Option<Type>,
  /// Ordered members: struct/union fields for `Object`, parameters for
  /// `Function`. Empty and unused for the other kinds.
  members: RefCell<Vec<Member>>,
}

impl PartialEq for TypeNode {
  fn eq(&self, other: &Self) -> bool {
    self.kind == other.kind
      && self.size.get() == other.size.get()
      && self.flags.get() == other.flags.get()
      && self.next == other.next
      && *self.members.borrow() == *other.members.borrow()
  }
}

/// A handle onto a type node. `Clone` is an `Rc` bump, so sharing a forward
/// struct tag's type between its declaration and every later reference is
/// free and keeps later completion visible everywhere (spec §3 invariant ii).
#[derive(Clone)]
pub struct Type(Rc<TypeNode>);

impl PartialEq for Type {
  fn eq(&self, other: &Self) -> bool {
    Rc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
  }
}

impl std::fmt::Debug for Type {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Type")
      .field("kind", &self.0.kind)
      .field("size", &self.0.size.get())
      .field("flags", &self.0.flags.get())
      .field("next", &self.0.next)
      .finish()
  }
}

impl Type {
  fn new(kind: TypeKind, size: u32, next: Option<Type>) -> Self {
    Type(Rc::new(TypeNode {
      kind, size: Cell::new(size), flags: Cell::new(TypeFlags::empty()), next,
      members: RefCell::new(Vec::new()),
    }))
  }

  #[must_use] pub fn kind(&self) -> TypeKind { self.0.kind }
  #[must_use] pub fn size(&self) -> u32 { self.0.size.get() }
  #[must_use] pub fn is_complete(&self) -> bool {
    !matches!(self.0.kind, TypeKind::Array | TypeKind::Object) || self.0.size.get() != 0
  }
  #[must_use] pub fn flags(&self) -> TypeFlags { self.0.flags.get() }
  #[must_use] pub fn is_const(&self) -> bool { self.flags().contains(TypeFlags::CONST) }
  #[must_use] pub fn is_volatile(&self) -> bool { self.flags().contains(TypeFlags::VOLATILE) }
  #[must_use] pub fn is_unsigned(&self) -> bool { self.flags().contains(TypeFlags::UNSIGNED) }
  #[must_use] pub fn is_vararg(&self) -> bool { self.flags().contains(TypeFlags::VARARG) }
  #[must_use] pub fn next(&self) -> Option<&Type> { self.0.next.as_ref() }
  #[must_use] pub fn members(&self) -> std::cell::Ref<'_, [Member]> {
    std::cell::Ref::map(self.0.members.borrow(), Vec::as_slice)
  }
  #[must_use] pub fn n_members(&self) -> usize { self.0.members.borrow().len() }

  #[must_use] pub fn is_integer(&self) -> bool { self.0.kind == TypeKind::Integer }
  #[must_use] pub fn is_pointer(&self) -> bool { self.0.kind == TypeKind::Pointer }
  #[must_use] pub fn is_array(&self) -> bool { self.0.kind == TypeKind::Array }
  #[must_use] pub fn is_function(&self) -> bool { self.0.kind == TypeKind::Function }
  #[must_use] pub fn is_object(&self) -> bool { self.0.kind == TypeKind::Object }
  #[must_use] pub fn is_scalar(&self) -> bool {
    matches!(self.0.kind, TypeKind::Integer | TypeKind::Real | TypeKind::Pointer)
  }

  /// Natural alignment of this type under C ABI rules: own size for scalars
  /// and pointers, element alignment for arrays, max member alignment for
  /// objects.
  #[must_use] pub fn align(&self) -> u32 {
    match self.0.kind {
      TypeKind::Array => self.0.next.as_ref().map_or(1, Type::align),
      TypeKind::Object => self.0.members.borrow().iter().map(|m| m.ty.align()).max().unwrap_or(1),
      _ => self.0.size.get().max(1),
    }
  }

  pub fn set_const(&self) { self.0.flags.set(self.flags() | TypeFlags::CONST); }
  pub fn set_volatile(&self) { self.0.flags.set(self.flags() | TypeFlags::VOLATILE); }
  /// Only meaningful on `Integer` nodes; set by `declaration_specifiers`
  /// when `unsigned` was parsed.
  pub fn set_unsigned(&self) { self.0.flags.set(self.flags() | TypeFlags::UNSIGNED); }

  /// Produce a copy of this type with volatile/const flags OR'd in from
  /// `extra`, used when a typedef name is referenced with additional local
  /// qualifiers (e.g. `const MyTypedef x;`).
  #[must_use] pub fn with_extra_qualifiers(&self, extra: TypeFlags) -> Type {
    let t = Type::new(self.0.kind, self.0.size.get(), self.0.next.clone());
    t.0.flags.set(self.flags() | (extra & (TypeFlags::CONST | TypeFlags::VOLATILE)));
    *t.0.members.borrow_mut() = self.0.members.borrow().clone();
    t
  }
}

/// `int`/`short`/`long`/`char`-family scalar of the given byte size.
#[must_use] pub fn init_integer(size: u32) -> Type { Type::new(TypeKind::Integer, size, None) }

/// `float`/`double`.
#[must_use] pub fn init_real(size: u32) -> Type { Type::new(TypeKind::Real, size, None) }

/// `void`.
#[must_use] pub fn init_none() -> Type { Type::new(TypeKind::None, 0, None) }

/// Pointer to `base`. Always complete (pointers are fixed-size regardless
/// of whether their pointee is complete).
#[must_use] pub fn init_pointer(base: Type, pointer_size: u32) -> Type {
  Type::new(TypeKind::Pointer, pointer_size, Some(base))
}

/// Array of `len` elements of `elem`. `len == 0` (or the outermost
/// unspecified-length `[]`) yields an incomplete array (`size == 0`),
/// legal only at the root of a declarator per spec §3 invariant (i).
#[must_use] pub fn init_array(elem: Type, len: u32) -> Type {
  let size = if len == 0 { 0 } else { elem.size() * len };
  Type::new(TypeKind::Array, size, Some(elem))
}

/// A fresh, empty function type; parameters are appended with [`add_member`]
/// and `next` (the return type) is set by the caller since it is supplied
/// out-of-band by `parameter_list`'s caller in the original grammar.
#[must_use] pub fn init_function(ret: Type) -> Type { Type::new(TypeKind::Function, 0, Some(ret)) }

/// A fresh, incomplete struct/union (`size == 0` until [`align_struct_members`]).
#[must_use] pub fn init_object() -> Type { Type::new(TypeKind::Object, 0, None) }

/// Mark a function type as variadic (trailing `...` was parsed).
pub fn set_vararg(f: &Type) { f.0.flags.set(f.flags() | TypeFlags::VARARG); }

/// Append a member (struct/union field, or function parameter) to `obj`.
/// `name` is `None` for an unnamed prototype parameter. Offset is left at
/// `0`; real offsets for `Object` members are assigned by
/// [`align_struct_members`]. Panics if `obj` is not `Object` or `Function`
/// shaped — a logic error in the caller, not a user-facing parse error.
pub fn add_member(obj: &Type, ty: Type, name: Option<Symbol>) {
  assert!(matches!(obj.kind(), TypeKind::Object | TypeKind::Function),
    "add_member on non-aggregate type");
  obj.0.members.borrow_mut().push(Member { name, ty, offset: 0 });
}

/// Assign natural-alignment offsets to every member of `obj` and set the
/// struct's final, padded size (spec §4.B). Must be called exactly once,
/// after every member has been appended.
pub fn align_struct_members(obj: &Type) {
  let mut members = obj.0.members.borrow_mut();
  let mut offset = 0u32;
  let mut max_align = 1u32;
  for m in members.iter_mut() {
    let align = m.ty.align();
    max_align = max_align.max(align);
    offset = align_to(offset, align);
    m.offset = offset;
    offset += m.ty.size();
  }
  let size = align_to(offset, max_align);
  obj.0.size.set(size);
}

fn align_to(offset: u32, align: u32) -> u32 {
  if align <= 1 { offset } else { offset.div_ceil(align) * align }
}

/// Backfill an incomplete root array's size from the number of bytes an
/// initializer actually consumed (spec §4.B, §8 property 3). `incomplete`
/// must be an `Array` whose size is currently `0`.
pub fn complete(incomplete: &Type, observed_size: u32) -> Type {
  debug_assert!(incomplete.is_array() && incomplete.size() == 0,
    "complete() called on a type that is not an incomplete root array");
  incomplete.0.size.set(observed_size);
  incomplete.clone()
}

/// If `ty` is an array, decay it to a pointer to its element type (function
/// parameters declared as arrays are pointers, spec §4.C `parameter_list`).
#[must_use] pub fn decay_if_array(ty: &Type, pointer_size: u32) -> Type {
  match ty.kind() {
    TypeKind::Array => init_pointer(ty.next().expect("array has element type").clone(), pointer_size),
    _ => ty.clone(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbol::Interner;

  #[test]
  fn struct_members_are_naturally_aligned_and_padded() {
    // struct S { int a; char b; }; -> offsets 0, 4; size padded to 8 (S4 in spec §8).
    let mut i = Interner::new();
    let obj = init_object();
    add_member(&obj, init_integer(4), Some(i.intern("a")));
    add_member(&obj, init_integer(1), Some(i.intern("b")));
    align_struct_members(&obj);
    let members = obj.members();
    assert_eq!(members[0].offset, 0);
    assert_eq!(members[1].offset, 4);
    drop(members);
    assert_eq!(obj.size(), 8);
  }

  #[test]
  fn incomplete_array_is_completed_from_initializer_length() {
    // int a[] = {1,2,3,4}; -> size 16 (S5 in spec §8).
    let elem = init_integer(4);
    let arr = init_array(elem, 0);
    assert_eq!(arr.size(), 0);
    let completed = complete(&arr, 16);
    assert_eq!(completed.size(), 16);
    assert_eq!(arr.size(), 16); // same Rc node, visible through the shared handle
  }

  #[test]
  fn pointer_to_forward_struct_shares_completion() {
    let tag = init_object();
    let ptr = init_pointer(tag.clone(), 8);
    assert_eq!(tag.size(), 0);
    let mut i = Interner::new();
    add_member(&tag, init_integer(4), Some(i.intern("x")));
    align_struct_members(&tag);
    assert_eq!(tag.size(), 4);
    // the pointee seen through `ptr` reflects the completion without re-resolving anything.
    assert_eq!(ptr.next().unwrap().size(), 4);
  }

  #[test]
  fn array_parameter_decays_to_pointer() {
    let arr = init_array(init_integer(4), 10);
    let decayed = decay_if_array(&arr, 8);
    assert!(decayed.is_pointer());
    assert_eq!(decayed.size(), 8);
    assert!(decayed.next().unwrap().is_integer());
  }

  #[test]
  fn inside_out_composition_pointer_to_array() {
    // T (*x)[N] is pointer to array-of-N-T (spec §8 property 2).
    let t = init_integer(4);
    let array_of_t = init_array(t, 4);
    let ptr_to_array = init_pointer(array_of_t, 8);
    assert!(ptr_to_array.is_pointer());
    assert!(ptr_to_array.next().unwrap().is_array());
    assert!(ptr_to_array.next().unwrap().next().unwrap().is_integer());
  }

  #[test]
  fn inside_out_composition_array_of_pointers() {
    // T *x[N] is array-of-N pointer-to-T.
    let t = init_integer(4);
    let ptr_to_t = init_pointer(t, 8);
    let array_of_ptr = init_array(ptr_to_t, 4);
    assert!(array_of_ptr.is_array());
    assert!(array_of_ptr.next().unwrap().is_pointer());
  }
}
