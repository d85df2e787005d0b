//! Foundation types for the yangkit library.
//!
//! This module provides fundamental types used throughout the crate:
//! - [`Interner`], [`IStr`] - String interning (the module dictionary)
//! - [`Position`], [`Span`] - Line/column positions for diagnostics
//!
//! This module has NO dependencies on other yangkit modules.

mod interner;
mod position;

pub use interner::{IStr, Interner};
pub use position::{Position, Span};
