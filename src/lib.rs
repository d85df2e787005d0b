//! # yangkit
//!
//! Core library for YANG schema compilation, typed data trees, and XML/JSON
//! instance validation.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! data      → instance trees: XML/JSON parse, validate, diff, print
//!   ↓
//! xpath     → YANG XPath 1.0 subset (when/must/leafref/unique)
//!   ↓
//! schema    → compiled schema: compiler, types, value engine, printer
//!   ↓
//! context   → owner of the dictionary, loaded modules, compiled set
//!   ↓
//! parser    → YANG statement parser (logos) + YIN front-end (quick-xml)
//!   ↓
//! base      → primitives (string interner, Position/Span)
//! ```
//!
//! ## A full pipeline
//!
//! ```no_run
//! use yangkit::context::{Context, ContextOptions, SchemaFormat};
//! use yangkit::data::{DataFormat, DataTree, ParseOptions, ValidationOptions};
//!
//! # fn main() -> yangkit::error::Result<()> {
//! let mut ctx = Context::new(ContextOptions::default())?;
//! ctx.parse_module_str(
//!     "module a { namespace \"urn:a\"; prefix a; leaf foo { type string; } }",
//!     SchemaFormat::Yang,
//!     true,
//! )?;
//! let mut tree = DataTree::parse_str(
//!     &ctx,
//!     "<foo xmlns=\"urn:a\">value</foo>",
//!     DataFormat::Xml,
//!     ParseOptions::default(),
//! )?;
//! tree.validate(&ctx, ValidationOptions::default())?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// MODULES (dependency order: base → parser → context → schema → xpath → data)
// ============================================================================

/// Foundation types: string interner, Position/Span
pub mod base;

/// Structured errors and the collect-all diagnostics buffer
pub mod error;

/// Parser: YANG lexer + recursive descent, YIN event mapping
pub mod parser;

/// Context: dictionary, search dirs, loaded modules, compiled schema
pub mod context;

/// Compiled schema: compiler, compiled types, value engine, YANG/YIN printer
pub mod schema;

/// XPath subset: lexer, parser, dual-mode evaluator
pub mod xpath;

/// Instance data: trees, XML/JSON parse and print, validation, diff
pub mod data;

// Re-export commonly needed items
pub use base::{IStr, Interner, Position, Span};
pub use context::{Context, ContextOptions, SchemaFormat};
pub use error::{Error, Result};
