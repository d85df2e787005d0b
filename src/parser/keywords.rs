//! YANG statement keywords and the statement grammar table.
//!
//! Both front-ends (YANG and YIN) map statement names through [`Keyword`].
//! The grammar table drives substatement cardinality checks and the YIN
//! argument mapping (attribute vs child element).

use crate::base::IStr;

/// A YANG statement keyword.
///
/// Closed set per RFC 7950, plus `Extension` for vendor statements
/// (`prefix:name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Keyword {
    Action,
    Anydata,
    Anyxml,
    Argument,
    Augment,
    Base,
    BelongsTo,
    Bit,
    Case,
    Choice,
    Config,
    Contact,
    Container,
    Default,
    Description,
    Deviate,
    Deviation,
    Enum,
    ErrorAppTag,
    ErrorMessage,
    Extension,
    Feature,
    FractionDigits,
    Grouping,
    Identity,
    IfFeature,
    Import,
    Include,
    Input,
    Key,
    Leaf,
    LeafList,
    Length,
    List,
    Mandatory,
    MaxElements,
    MinElements,
    Modifier,
    Module,
    Must,
    Namespace,
    Notification,
    OrderedBy,
    Organization,
    Output,
    Path,
    Pattern,
    Position,
    Prefix,
    Presence,
    Range,
    Reference,
    Refine,
    RequireInstance,
    Revision,
    RevisionDate,
    Rpc,
    Status,
    Submodule,
    Type,
    Typedef,
    Unique,
    Units,
    Uses,
    Value,
    When,
    YangVersion,
    YinElement,
    /// An extension statement instance: `prefix:identifier`.
    Unknown { prefix: IStr, name: IStr },
}

/// How many times a substatement may appear under its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// `0..1`
    Opt,
    /// exactly `1`
    One,
    /// `0..n`
    Any,
    /// `1..n`
    Many,
}

impl Keyword {
    /// Map statement text to a keyword. Extension statements (`p:n`) are
    /// handled by the parsers, not here.
    pub fn from_str(s: &str) -> Option<Keyword> {
        use Keyword::*;
        Some(match s {
            "action" => Action,
            "anydata" => Anydata,
            "anyxml" => Anyxml,
            "argument" => Argument,
            "augment" => Augment,
            "base" => Base,
            "belongs-to" => BelongsTo,
            "bit" => Bit,
            "case" => Case,
            "choice" => Choice,
            "config" => Config,
            "contact" => Contact,
            "container" => Container,
            "default" => Default,
            "description" => Description,
            "deviate" => Deviate,
            "deviation" => Deviation,
            "enum" => Enum,
            "error-app-tag" => ErrorAppTag,
            "error-message" => ErrorMessage,
            "extension" => Extension,
            "feature" => Feature,
            "fraction-digits" => FractionDigits,
            "grouping" => Grouping,
            "identity" => Identity,
            "if-feature" => IfFeature,
            "import" => Import,
            "include" => Include,
            "input" => Input,
            "key" => Key,
            "leaf" => Leaf,
            "leaf-list" => LeafList,
            "length" => Length,
            "list" => List,
            "mandatory" => Mandatory,
            "max-elements" => MaxElements,
            "min-elements" => MinElements,
            "modifier" => Modifier,
            "module" => Module,
            "must" => Must,
            "namespace" => Namespace,
            "notification" => Notification,
            "ordered-by" => OrderedBy,
            "organization" => Organization,
            "output" => Output,
            "path" => Path,
            "pattern" => Pattern,
            "position" => Position,
            "prefix" => Prefix,
            "presence" => Presence,
            "range" => Range,
            "reference" => Reference,
            "refine" => Refine,
            "require-instance" => RequireInstance,
            "revision" => Revision,
            "revision-date" => RevisionDate,
            "rpc" => Rpc,
            "status" => Status,
            "submodule" => Submodule,
            "type" => Type,
            "typedef" => Typedef,
            "unique" => Unique,
            "units" => Units,
            "uses" => Uses,
            "value" => Value,
            "when" => When,
            "yang-version" => YangVersion,
            "yin-element" => YinElement,
            _ => return None,
        })
    }

    /// The keyword's statement text.
    pub fn as_str(&self) -> &str {
        use Keyword::*;
        match self {
            Action => "action",
            Anydata => "anydata",
            Anyxml => "anyxml",
            Argument => "argument",
            Augment => "augment",
            Base => "base",
            BelongsTo => "belongs-to",
            Bit => "bit",
            Case => "case",
            Choice => "choice",
            Config => "config",
            Contact => "contact",
            Container => "container",
            Default => "default",
            Description => "description",
            Deviate => "deviate",
            Deviation => "deviation",
            Enum => "enum",
            ErrorAppTag => "error-app-tag",
            ErrorMessage => "error-message",
            Extension => "extension",
            Feature => "feature",
            FractionDigits => "fraction-digits",
            Grouping => "grouping",
            Identity => "identity",
            IfFeature => "if-feature",
            Import => "import",
            Include => "include",
            Input => "input",
            Key => "key",
            Leaf => "leaf",
            LeafList => "leaf-list",
            Length => "length",
            List => "list",
            Mandatory => "mandatory",
            MaxElements => "max-elements",
            MinElements => "min-elements",
            Modifier => "modifier",
            Module => "module",
            Must => "must",
            Namespace => "namespace",
            Notification => "notification",
            OrderedBy => "ordered-by",
            Organization => "organization",
            Output => "output",
            Path => "path",
            Pattern => "pattern",
            Position => "position",
            Prefix => "prefix",
            Presence => "presence",
            Range => "range",
            Reference => "reference",
            Refine => "refine",
            RequireInstance => "require-instance",
            Revision => "revision",
            RevisionDate => "revision-date",
            Rpc => "rpc",
            Status => "status",
            Submodule => "submodule",
            Type => "type",
            Typedef => "typedef",
            Unique => "unique",
            Units => "units",
            Uses => "uses",
            Value => "value",
            When => "when",
            YangVersion => "yang-version",
            YinElement => "yin-element",
            Unknown { .. } => "(extension)",
        }
    }

    /// YIN argument mapping: `(argument-name, is-element)`.
    ///
    /// `is-element` statements carry their argument as a child element
    /// (e.g. `<description><text>..</text></description>`), the rest as an
    /// attribute. `None` means the statement takes no argument.
    pub fn yin_argument(&self) -> Option<(&'static str, bool)> {
        use Keyword::*;
        Some(match self {
            Action | Anydata | Anyxml | Argument | Base | Bit | Case | Choice | Container
            | Enum | Extension | Feature | Grouping | Identity | Leaf | LeafList | List
            | Module | Notification | Rpc | Submodule | Typedef | Units | Uses => ("name", false),
            IfFeature => ("name", false),
            Type => ("name", false),
            Augment | Deviation => ("target-node", false),
            Refine => ("target-node", false),
            BelongsTo | Import | Include => ("module", false),
            Config | Default | Deviate | ErrorAppTag | FractionDigits | Length | Mandatory
            | MaxElements | MinElements | Modifier | OrderedBy | Path | Pattern | Position
            | Presence | Range | RequireInstance | Status | Value | YangVersion => {
                ("value", false)
            }
            Key => ("value", false),
            Prefix => ("value", false),
            YinElement => ("value", false),
            Must | When => ("condition", false),
            Namespace => ("uri", false),
            Revision | RevisionDate => ("date", false),
            Unique => ("tag", false),
            Contact | Description | Organization | Reference => ("text", true),
            ErrorMessage => ("value", true),
            Input | Output => return None,
            Unknown { .. } => return None,
        })
    }

    /// Whether the statement takes an argument at all.
    pub fn has_argument(&self) -> bool {
        !matches!(self, Keyword::Input | Keyword::Output)
    }

    /// Substatement cardinality under this keyword, or `None` when the
    /// substatement is not permitted here.
    ///
    /// Extension substatements are always permitted and never listed.
    pub fn substmt_cardinality(&self, child: &Keyword) -> Option<Cardinality> {
        use Cardinality::*;
        use Keyword::*;
        if matches!(child, Unknown { .. }) {
            return Some(Any);
        }
        let card = match self {
            Module => match child {
                YangVersion | Namespace | Prefix => One,
                Import | Include | Revision | Extension | Feature | Identity | Typedef
                | Grouping | Container | Leaf | LeafList | List | Choice | Anydata | Anyxml
                | Uses | Augment | Rpc | Notification | Deviation => Any,
                Organization | Contact | Description | Reference => Opt,
                _ => return None,
            },
            Submodule => match child {
                YangVersion | BelongsTo => One,
                Import | Include | Revision | Extension | Feature | Identity | Typedef
                | Grouping | Container | Leaf | LeafList | List | Choice | Anydata | Anyxml
                | Uses | Augment | Rpc | Notification | Deviation => Any,
                Organization | Contact | Description | Reference => Opt,
                _ => return None,
            },
            Import => match child {
                Prefix => One,
                RevisionDate | Description | Reference => Opt,
                _ => return None,
            },
            Include => match child {
                RevisionDate | Description | Reference => Opt,
                _ => return None,
            },
            BelongsTo => match child {
                Prefix => One,
                _ => return None,
            },
            Revision => match child {
                Description | Reference => Opt,
                _ => return None,
            },
            Extension => match child {
                Argument => Opt,
                Status | Description | Reference => Opt,
                _ => return None,
            },
            Argument => match child {
                YinElement => Opt,
                _ => return None,
            },
            Feature => match child {
                IfFeature => Any,
                Status | Description | Reference => Opt,
                _ => return None,
            },
            Identity => match child {
                Base | IfFeature => Any,
                Status | Description | Reference => Opt,
                _ => return None,
            },
            Typedef => match child {
                Type => One,
                Units | Default | Status | Description | Reference => Opt,
                _ => return None,
            },
            Type => match child {
                Range | Length | FractionDigits | Path | RequireInstance | Modifier => Opt,
                Pattern | Enum | Bit | Base | Type => Any,
                _ => return None,
            },
            Range | Length => match child {
                ErrorMessage | ErrorAppTag | Description | Reference => Opt,
                _ => return None,
            },
            Pattern => match child {
                Modifier | ErrorMessage | ErrorAppTag | Description | Reference => Opt,
                _ => return None,
            },
            Enum => match child {
                Value => Opt,
                IfFeature => Any,
                Status | Description | Reference => Opt,
                _ => return None,
            },
            Bit => match child {
                Position => Opt,
                IfFeature => Any,
                Status | Description | Reference => Opt,
                _ => return None,
            },
            Must => match child {
                ErrorMessage | ErrorAppTag | Description | Reference => Opt,
                _ => return None,
            },
            When => match child {
                Description | Reference => Opt,
                _ => return None,
            },
            Grouping => match child {
                Typedef | Grouping | Container | Leaf | LeafList | List | Choice | Anydata
                | Anyxml | Uses | Action | Notification => Any,
                Status | Description | Reference => Opt,
                _ => return None,
            },
            Container => match child {
                Must | Typedef | Grouping | Container | Leaf | LeafList | List | Choice
                | Anydata | Anyxml | Uses | Action | Notification | IfFeature => Any,
                When | Presence | Config | Status | Description | Reference => Opt,
                _ => return None,
            },
            Leaf => match child {
                Type => One,
                Must | IfFeature => Any,
                When | Units | Default | Config | Mandatory | Status | Description
                | Reference => Opt,
                _ => return None,
            },
            LeafList => match child {
                Type => One,
                Must | Default | IfFeature => Any,
                When | Units | Config | MinElements | MaxElements | OrderedBy | Status
                | Description | Reference => Opt,
                _ => return None,
            },
            List => match child {
                Must | Typedef | Grouping | Container | Leaf | LeafList | List | Choice
                | Anydata | Anyxml | Uses | Action | Notification | Unique | IfFeature => Any,
                When | Key | Config | MinElements | MaxElements | OrderedBy | Status
                | Description | Reference => Opt,
                _ => return None,
            },
            Choice => match child {
                Case | Container | Leaf | LeafList | List | Anydata | Anyxml | IfFeature => Any,
                When | Default | Config | Mandatory | Status | Description | Reference => Opt,
                _ => return None,
            },
            Case => match child {
                Container | Leaf | LeafList | List | Choice | Anydata | Anyxml | Uses
                | IfFeature => Any,
                When | Status | Description | Reference => Opt,
                _ => return None,
            },
            Anydata | Anyxml => match child {
                Must | IfFeature => Any,
                When | Config | Mandatory | Status | Description | Reference => Opt,
                _ => return None,
            },
            Uses => match child {
                Refine | Augment | IfFeature => Any,
                When | Status | Description | Reference => Opt,
                _ => return None,
            },
            Refine => match child {
                Must | Default | IfFeature => Any,
                Description | Reference | Presence | Config | Mandatory | MinElements
                | MaxElements => Opt,
                _ => return None,
            },
            Augment => match child {
                Container | Leaf | LeafList | List | Choice | Case | Anydata | Anyxml | Uses
                | Action | Notification | IfFeature => Any,
                When | Status | Description | Reference => Opt,
                _ => return None,
            },
            Rpc | Action => match child {
                Typedef | Grouping | IfFeature => Any,
                Input | Output | Status | Description | Reference => Opt,
                _ => return None,
            },
            Input | Output => match child {
                Must | Typedef | Grouping | Container | Leaf | LeafList | List | Choice
                | Anydata | Anyxml | Uses => Any,
                _ => return None,
            },
            Notification => match child {
                Must | Typedef | Grouping | Container | Leaf | LeafList | List | Choice
                | Anydata | Anyxml | Uses | IfFeature => Any,
                Status | Description | Reference => Opt,
                _ => return None,
            },
            Deviation => match child {
                Deviate => Many,
                Description | Reference => Opt,
                _ => return None,
            },
            Deviate => match child {
                Must | Unique | Default => Any,
                Type | Units | Config | Mandatory | MinElements | MaxElements => Opt,
                _ => return None,
            },
            // Leaf statements: no substatements besides extensions.
            Config | Contact | Default | Description | ErrorAppTag | ErrorMessage
            | FractionDigits | IfFeature | Key | Mandatory | MaxElements | MinElements
            | Modifier | Namespace | OrderedBy | Organization | Path | Position | Prefix
            | Presence | Reference | RequireInstance | RevisionDate | Status | Unique
            | Units | Value | YangVersion | YinElement | Base => return None,
            Unknown { .. } => Any,
        };
        Some(card)
    }
}

impl std::fmt::Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Keyword::Unknown { prefix, name } => write!(f, "{prefix}:{name}"),
            kw => f.write_str(kw.as_str()),
        }
    }
}

/// Check a YANG identifier: `[A-Za-z_][A-Za-z0-9_.-]*`.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Module and extension names must additionally not start with "xml"
/// (case-insensitive).
pub fn is_module_identifier(s: &str) -> bool {
    is_identifier(s) && !s.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("xml"))
}

/// Check a revision date: `YYYY-MM-DD` with plausible month/day parts.
pub fn is_revision_date(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
        return false;
    }
    if !b.iter().enumerate().all(|(i, c)| matches!(i, 4 | 7) || c.is_ascii_digit()) {
        return false;
    }
    let month: u32 = s[5..7].parse().unwrap_or(0);
    let day: u32 = s[8..10].parse().unwrap_or(0);
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_roundtrip() {
        for text in ["leaf-list", "belongs-to", "yang-version", "module", "must"] {
            let kw = Keyword::from_str(text).unwrap();
            assert_eq!(kw.as_str(), text);
        }
        assert!(Keyword::from_str("not-a-keyword").is_none());
    }

    #[test]
    fn test_substmt_rules() {
        assert_eq!(
            Keyword::Leaf.substmt_cardinality(&Keyword::Type),
            Some(Cardinality::One)
        );
        assert_eq!(
            Keyword::Leaf.substmt_cardinality(&Keyword::Must),
            Some(Cardinality::Any)
        );
        assert!(Keyword::Leaf.substmt_cardinality(&Keyword::Key).is_none());
        assert!(Keyword::Config.substmt_cardinality(&Keyword::Leaf).is_none());
    }

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("interface_0.v2-x"));
        assert!(!is_identifier("0leading"));
        assert!(!is_identifier("has space"));
        assert!(is_identifier("xml-ish"));
        assert!(!is_module_identifier("XMLmod"));
    }

    #[test]
    fn test_revision_dates() {
        assert!(is_revision_date("2024-01-31"));
        assert!(!is_revision_date("2024-13-01"));
        assert!(!is_revision_date("2024-1-1"));
        assert!(!is_revision_date("20240101"));
    }
}
