//! Compiler-wide configuration, threaded explicitly rather than baked in as
//! constants (the target's pointer width and integer sizing are properties
//! of the target, not of this crate).

/// Target-dependent sizing and diagnostic policy.
#[derive(Clone, Copy, Debug)]
pub struct Options {
  /// Size in bytes of a pointer on the target (also the size of `long` on
  /// LP64 targets, but kept separate since ILP32/LLP64 differ).
  pub pointer_size: u32,
  /// Size in bytes of plain `int`.
  pub int_size: u32,
  /// Size in bytes of `long`.
  pub long_size: u32,
  /// Size in bytes of `short`.
  pub short_size: u32,
  /// Size in bytes of `long long` / a second `long`.
  pub long_long_size: u32,
  /// Promote every pushed warning to an error.
  pub warnings_as_errors: bool,
}

impl Default for Options {
  /// LP64 (x86-64 System V) defaults, matching the sizes `declaration_specifiers`
  /// uses when backtracked to plain `int`/`short`/`long`.
  fn default() -> Self {
    Self {
      pointer_size: 8,
      int_size: 4,
      short_size: 2,
      long_size: 8,
      long_long_size: 8,
      warnings_as_errors: false,
    }
  }
}
