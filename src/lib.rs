//! Compiles relational command trees to Access/Jet SQL text.
//!
//! Build a [`tree::Command`] and hand it to [`generate::generate`]; the
//! result carries the statement text, an out-of-band row offset, and the
//! parameters a mutation bound.

pub mod dialect;
pub mod fragment;
pub mod generate;
pub mod select;
pub mod symbol;
pub mod tree;
