//! Front-ends for YANG module source.
//!
//! Two parsers produce the same parsed-module structure:
//! - **YANG** (RFC 7950 concrete syntax): logos lexer + recursive descent
//! - **YIN** (RFC 7950 §13, the XML encoding): quick-xml event mapping
//!
//! ## Architecture
//!
//! ```text
//! YANG text ─ lexer (logos) ─ statement parser ─┐
//!                                               ├─ Statement tree + ParsedModule
//! YIN text ── quick-xml events ─ YIN mapping ───┘
//! ```
//!
//! The parsed module is near-syntactic: statements keep their source
//! positions, arguments are unescaped/concatenated, and the statement
//! grammar (permitted substatements, cardinality, fixed ordering) has been
//! enforced. Cross-module resolution happens later, in the schema compiler.

pub mod keywords;
mod lexer;
pub mod stmt;
mod yang;
mod yin;

pub use keywords::{Cardinality, Keyword};
pub use lexer::{Lexer, Token, TokenKind};
pub use stmt::{ImportView, IncludeView, ParsedModule, Statement, YangVersion};
pub use yang::{parse_yang, parse_yang_in};
pub use yin::{YIN_NAMESPACE, parse_yin, parse_yin_in};

pub(crate) use yin::NsScope;
