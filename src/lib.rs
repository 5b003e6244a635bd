//! Front-end core of a C compiler: a recursive-descent parser for a
//! substantial C89/C99 subset, a mutable type tree, and lowering of
//! declarations/statements/expressions into a three-address IR over a
//! control-flow graph.
//!
//! This crate owns three concerns only — parsing, the type tree, and IR
//! lowering — and consumes everything else (the preprocessed token stream,
//! IR evaluation, CFG allocation, string interning, diagnostics rendering)
//! through the narrow contracts in [`lexer`], [`ir`] and [`diag`]. Reference
//! implementations of each contract ([`lexer::SimpleLexer`],
//! [`ir::ThreeAddressEvaluator`], [`ir::ArenaCfgAllocator`]) exist so this
//! crate is buildable and testable on its own; a real driver is expected to
//! supply its own lexer and back end instead.

pub mod config;
pub mod diag;
pub mod ir;
pub mod lexer;
pub mod namespace;
pub mod parse;
pub mod symbol;
pub mod types;

/// Installs a `simplelog` subscriber the first time any test calls it, so
/// the `log` facade calls scattered through parsing/lowering are actually
/// observable when running `cargo test -- --nocapture`. A real driver binary
/// makes this same choice for itself at `main()`; the library never installs
/// a logger on its own.
#[cfg(test)]
pub(crate) mod test_log {
  use std::sync::Once;
  static INIT: Once = Once::new();

  pub fn init() {
    INIT.call_once(|| {
      let _ = simplelog::SimpleLogger::init(log::LevelFilter::Trace, simplelog::Config::default());
    });
  }
}
