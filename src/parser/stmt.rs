//! Parsed statement tree shared by the YANG and YIN front-ends.
//!
//! Both parsers produce the same structure: a uniform [`Statement`] tree
//! plus [`ParsedModule`], a typed accessor layer over that tree. The schema
//! compiler consumes statements through these accessors instead of
//! re-walking raw text.

use crate::base::{IStr, Position};
use crate::error::{Error, Result};
use crate::parser::keywords::{Cardinality, Keyword};

/// One parsed YANG statement: keyword, optional argument, substatements.
#[derive(Debug, Clone)]
pub struct Statement {
    pub keyword: Keyword,
    pub arg: Option<IStr>,
    pub children: Vec<Statement>,
    pub pos: Position,
}

/// Structural equality; source positions are not part of a statement's
/// identity (round-trip comparisons rely on this).
impl PartialEq for Statement {
    fn eq(&self, other: &Self) -> bool {
        self.keyword == other.keyword
            && self.arg == other.arg
            && self.children == other.children
    }
}

impl Eq for Statement {}

impl Statement {
    pub fn new(keyword: Keyword, arg: Option<IStr>, pos: Position) -> Self {
        Self { keyword, arg, children: Vec::new(), pos }
    }

    /// The argument, or `""` for argument-less statements.
    pub fn arg(&self) -> &str {
        self.arg.as_deref().unwrap_or("")
    }

    /// First substatement with the given keyword.
    pub fn find(&self, kw: Keyword) -> Option<&Statement> {
        self.children.iter().find(|c| c.keyword == kw)
    }

    /// All substatements with the given keyword, in declaration order.
    pub fn find_all(&self, kw: Keyword) -> impl Iterator<Item = &Statement> {
        self.children.iter().filter(move |c| c.keyword == kw)
    }

    /// Argument of the first substatement with the given keyword.
    pub fn arg_of(&self, kw: Keyword) -> Option<&str> {
        self.find(kw).map(|s| s.arg())
    }

    pub fn has(&self, kw: Keyword) -> bool {
        self.find(kw).is_some()
    }

    /// Substatements that define data nodes (the data-def-stmt production).
    pub fn data_defs(&self) -> impl Iterator<Item = &Statement> {
        self.children.iter().filter(|c| {
            matches!(
                c.keyword,
                Keyword::Container
                    | Keyword::Leaf
                    | Keyword::LeafList
                    | Keyword::List
                    | Keyword::Choice
                    | Keyword::Case
                    | Keyword::Anydata
                    | Keyword::Anyxml
                    | Keyword::Uses
            )
        })
    }

    /// Enforce the statement grammar: permitted substatements, cardinality,
    /// argument presence. Recurses through the whole tree.
    pub fn validate_grammar(&self) -> Result<()> {
        if self.keyword.has_argument() && !matches!(self.keyword, Keyword::Unknown { .. }) {
            if self.arg.is_none() {
                return Err(Error::syntax_at(
                    format!("statement \"{}\" is missing its argument", self.keyword),
                    self.pos,
                ));
            }
        } else if !self.keyword.has_argument() && self.arg.is_some() {
            return Err(Error::syntax_at(
                format!("statement \"{}\" takes no argument", self.keyword),
                self.pos,
            ));
        }

        for child in &self.children {
            let Some(card) = self.keyword.substmt_cardinality(&child.keyword) else {
                return Err(Error::syntax_at(
                    format!(
                        "statement \"{}\" is not allowed under \"{}\"",
                        child.keyword, self.keyword
                    ),
                    child.pos,
                ));
            };
            if matches!(card, Cardinality::Opt | Cardinality::One) {
                let count = self.find_all(child.keyword.clone()).count();
                if count > 1 {
                    return Err(Error::syntax_at(
                        format!(
                            "statement \"{}\" may appear at most once under \"{}\"",
                            child.keyword, self.keyword
                        ),
                        child.pos,
                    ));
                }
            }
        }

        // Mandatory substatements.
        for (parent, required) in MANDATORY_SUBSTMTS {
            if &self.keyword == parent {
                for kw in *required {
                    if !self.has(kw.clone()) {
                        return Err(Error::syntax_at(
                            format!("statement \"{}\" requires \"{}\"", self.keyword, kw),
                            self.pos,
                        ));
                    }
                }
            }
        }

        self.validate_ordering()?;

        for child in &self.children {
            child.validate_grammar()?;
        }
        Ok(())
    }

    /// Section ordering where RFC 7950 fixes it: module header before
    /// linkage before meta before revisions before body, and `input`
    /// before `output`.
    fn validate_ordering(&self) -> Result<()> {
        let rank = |kw: &Keyword| -> Option<u8> {
            match self.keyword {
                Keyword::Module | Keyword::Submodule => Some(match kw {
                    Keyword::YangVersion | Keyword::Namespace | Keyword::Prefix
                    | Keyword::BelongsTo => 0,
                    Keyword::Import | Keyword::Include => 1,
                    Keyword::Organization | Keyword::Contact | Keyword::Description
                    | Keyword::Reference => 2,
                    Keyword::Revision => 3,
                    Keyword::Unknown { .. } => return None,
                    _ => 4,
                }),
                Keyword::Rpc | Keyword::Action => Some(match kw {
                    Keyword::Input => 1,
                    Keyword::Output => 2,
                    _ => 0,
                }),
                _ => None,
            }
        };
        let mut last = 0u8;
        for child in &self.children {
            let Some(r) = rank(&child.keyword) else { continue };
            if r < last {
                return Err(Error::syntax_at(
                    format!(
                        "statement \"{}\" is out of order under \"{}\"",
                        child.keyword, self.keyword
                    ),
                    child.pos,
                ));
            }
            last = r;
        }
        Ok(())
    }
}

/// Substatements that must be present (cardinality `1` or `1..n`).
static MANDATORY_SUBSTMTS: &[(Keyword, &[Keyword])] = &[
    (Keyword::Module, &[Keyword::Namespace, Keyword::Prefix]),
    (Keyword::Submodule, &[Keyword::BelongsTo]),
    (Keyword::Import, &[Keyword::Prefix]),
    (Keyword::BelongsTo, &[Keyword::Prefix]),
    (Keyword::Typedef, &[Keyword::Type]),
    (Keyword::Leaf, &[Keyword::Type]),
    (Keyword::LeafList, &[Keyword::Type]),
    (Keyword::Deviation, &[Keyword::Deviate]),
];

/// The YANG language version of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YangVersion {
    #[default]
    V1_0,
    V1_1,
}

impl YangVersion {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "1" => Ok(YangVersion::V1_0),
            "1.1" => Ok(YangVersion::V1_1),
            _ => Err(Error::syntax(format!("invalid yang-version \"{s}\""))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            YangVersion::V1_0 => "1",
            YangVersion::V1_1 => "1.1",
        }
    }
}

/// A parsed module or submodule: the root statement plus typed views.
///
/// Near-syntactic; cross-module references are still unresolved. Owned by
/// the context once registered and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ParsedModule {
    root: Statement,
}

impl ParsedModule {
    /// Wrap a validated `module`/`submodule` statement.
    pub fn new(root: Statement) -> Result<Self> {
        match root.keyword {
            Keyword::Module | Keyword::Submodule => {}
            _ => {
                return Err(Error::syntax_at(
                    format!("expected module or submodule, found \"{}\"", root.keyword),
                    root.pos,
                ));
            }
        }
        root.validate_grammar()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Statement {
        &self.root
    }

    pub fn name(&self) -> &str {
        self.root.arg()
    }

    pub fn is_submodule(&self) -> bool {
        self.root.keyword == Keyword::Submodule
    }

    pub fn yang_version(&self) -> YangVersion {
        self.root
            .arg_of(Keyword::YangVersion)
            .and_then(|v| YangVersion::parse(v).ok())
            .unwrap_or_default()
    }

    /// Namespace URI (modules only).
    pub fn namespace(&self) -> Option<&str> {
        self.root.arg_of(Keyword::Namespace)
    }

    /// The module's own prefix (modules only).
    pub fn prefix(&self) -> Option<&str> {
        self.root.arg_of(Keyword::Prefix)
    }

    /// `(main-module, prefix)` for submodules.
    pub fn belongs_to(&self) -> Option<(&str, &str)> {
        let bt = self.root.find(Keyword::BelongsTo)?;
        Some((bt.arg(), bt.arg_of(Keyword::Prefix)?))
    }

    pub fn imports(&self) -> impl Iterator<Item = ImportView<'_>> {
        self.root.find_all(Keyword::Import).map(|s| ImportView {
            module: s.arg(),
            prefix: s.arg_of(Keyword::Prefix).unwrap_or(""),
            revision: s.arg_of(Keyword::RevisionDate),
        })
    }

    pub fn includes(&self) -> impl Iterator<Item = IncludeView<'_>> {
        self.root.find_all(Keyword::Include).map(|s| IncludeView {
            submodule: s.arg(),
            revision: s.arg_of(Keyword::RevisionDate),
        })
    }

    /// Revision dates in declaration order (newest first by convention).
    pub fn revisions(&self) -> impl Iterator<Item = &str> {
        self.root.find_all(Keyword::Revision).map(|s| s.arg())
    }

    /// The most recent revision date, if any revision is declared.
    pub fn latest_revision(&self) -> Option<&str> {
        self.revisions().max()
    }

    pub fn features(&self) -> impl Iterator<Item = &Statement> {
        self.root.find_all(Keyword::Feature)
    }

    pub fn identities(&self) -> impl Iterator<Item = &Statement> {
        self.root.find_all(Keyword::Identity)
    }

    pub fn typedefs(&self) -> impl Iterator<Item = &Statement> {
        self.root.find_all(Keyword::Typedef)
    }

    pub fn groupings(&self) -> impl Iterator<Item = &Statement> {
        self.root.find_all(Keyword::Grouping)
    }

    pub fn extensions(&self) -> impl Iterator<Item = &Statement> {
        self.root.find_all(Keyword::Extension)
    }

    /// Top-level data definition statements, in declaration order.
    pub fn data_defs(&self) -> impl Iterator<Item = &Statement> {
        self.root.data_defs()
    }

    pub fn rpcs(&self) -> impl Iterator<Item = &Statement> {
        self.root.find_all(Keyword::Rpc)
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Statement> {
        self.root.find_all(Keyword::Notification)
    }

    pub fn augments(&self) -> impl Iterator<Item = &Statement> {
        self.root.find_all(Keyword::Augment)
    }

    pub fn deviations(&self) -> impl Iterator<Item = &Statement> {
        self.root.find_all(Keyword::Deviation)
    }

    /// Resolve an import prefix to the imported module name. The module's
    /// own prefix resolves to itself.
    pub fn module_for_prefix(&self, prefix: &str) -> Option<&str> {
        if self.prefix() == Some(prefix) {
            return Some(self.name());
        }
        if let Some((module, own)) = self.belongs_to() {
            if own == prefix {
                return Some(module);
            }
        }
        self.imports()
            .find(|i| i.prefix == prefix)
            .map(|i| i.module)
    }
}

/// View of one `import` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportView<'a> {
    pub module: &'a str,
    pub prefix: &'a str,
    pub revision: Option<&'a str>,
}

/// View of one `include` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludeView<'a> {
    pub submodule: &'a str,
    pub revision: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::yang::parse_yang;

    #[test]
    fn test_module_views() {
        let m = parse_yang(
            r#"
            module example {
              yang-version 1.1;
              namespace "urn:example";
              prefix ex;
              import other { prefix ot; revision-date 2020-01-01; }
              revision 2024-02-02;
              revision 2020-01-01;
              leaf foo { type string; }
            }
            "#,
        )
        .unwrap();
        assert_eq!(m.name(), "example");
        assert_eq!(m.namespace(), Some("urn:example"));
        assert_eq!(m.prefix(), Some("ex"));
        assert_eq!(m.yang_version(), YangVersion::V1_1);
        let imports: Vec<_> = m.imports().collect();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].module, "other");
        assert_eq!(imports[0].prefix, "ot");
        assert_eq!(imports[0].revision, Some("2020-01-01"));
        assert_eq!(m.latest_revision(), Some("2024-02-02"));
        assert_eq!(m.module_for_prefix("ot"), Some("other"));
        assert_eq!(m.module_for_prefix("ex"), Some("example"));
        assert_eq!(m.data_defs().count(), 1);
    }

    #[test]
    fn test_cardinality_enforced() {
        let err = parse_yang(
            r#"
            module m {
              namespace "urn:m";
              prefix m;
              leaf l { type string; type int8; }
            }
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("at most once"));
    }

    #[test]
    fn test_missing_mandatory_substmt() {
        let err = parse_yang("module m { namespace \"urn:m\"; }").unwrap_err();
        assert!(err.to_string().contains("requires \"prefix\""));
    }

    #[test]
    fn test_misplaced_statement() {
        let err = parse_yang(
            r#"
            module m {
              namespace "urn:m";
              prefix m;
              leaf l { type string; key x; }
            }
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not allowed under"));
    }
}
