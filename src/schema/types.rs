//! Compiled type descriptors.
//!
//! A [`CompiledType`] is the end product of walking a `type` statement and
//! its typedef chain down to a YANG built-in: restrictions merged, patterns
//! compiled, enum/bit values assigned. Range and length lists are kept
//! normalized (sorted, disjoint, within the base domain) so the value
//! engine can binary-search them.

use std::sync::Arc;

use regex::Regex;

use crate::base::IStr;
use crate::error::{Error, Result};
use crate::schema::{IdentityId, PrefixMap, SnodeId};
use crate::xpath::XPathExpr;

/// An inclusive range over the scaled integer domain.
///
/// Used for integer ranges (the value itself), decimal64 ranges (value ×
/// 10^fraction-digits) and string/binary lengths (code points / octets).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub lo: i128,
    pub hi: i128,
}

impl Range {
    pub fn new(lo: i128, hi: i128) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, v: i128) -> bool {
        self.lo <= v && v <= self.hi
    }
}

/// Does any range in the normalized list contain `v`?
pub fn ranges_contain(ranges: &[Range], v: i128) -> bool {
    ranges.iter().any(|r| r.contains(v))
}

/// The eight integer built-ins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntKind {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
}

impl IntKind {
    pub fn from_name(name: &str) -> Option<IntKind> {
        Some(match name {
            "int8" => IntKind::Int8,
            "int16" => IntKind::Int16,
            "int32" => IntKind::Int32,
            "int64" => IntKind::Int64,
            "uint8" => IntKind::Uint8,
            "uint16" => IntKind::Uint16,
            "uint32" => IntKind::Uint32,
            "uint64" => IntKind::Uint64,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            IntKind::Int8 => "int8",
            IntKind::Int16 => "int16",
            IntKind::Int32 => "int32",
            IntKind::Int64 => "int64",
            IntKind::Uint8 => "uint8",
            IntKind::Uint16 => "uint16",
            IntKind::Uint32 => "uint32",
            IntKind::Uint64 => "uint64",
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, IntKind::Int8 | IntKind::Int16 | IntKind::Int32 | IntKind::Int64)
    }

    /// The full domain of this integer type.
    pub fn domain(&self) -> Range {
        match self {
            IntKind::Int8 => Range::new(i8::MIN as i128, i8::MAX as i128),
            IntKind::Int16 => Range::new(i16::MIN as i128, i16::MAX as i128),
            IntKind::Int32 => Range::new(i32::MIN as i128, i32::MAX as i128),
            IntKind::Int64 => Range::new(i64::MIN as i128, i64::MAX as i128),
            IntKind::Uint8 => Range::new(0, u8::MAX as i128),
            IntKind::Uint16 => Range::new(0, u16::MAX as i128),
            IntKind::Uint32 => Range::new(0, u32::MAX as i128),
            IntKind::Uint64 => Range::new(0, u64::MAX as i128),
        }
    }
}

/// The length domain for strings and binary.
pub fn length_domain() -> Range {
    Range::new(0, u64::MAX as i128)
}

/// The decimal64 domain for a given number of fraction digits (the scaled
/// i64 domain).
pub fn decimal64_domain() -> Range {
    Range::new(i64::MIN as i128, i64::MAX as i128)
}

/// A compiled `pattern` restriction.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub regex: Regex,
    pub text: IStr,
    /// `modifier invert-match`.
    pub invert: bool,
    pub error_message: Option<IStr>,
    pub error_app_tag: Option<IStr>,
}

impl Pattern {
    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value) != self.invert
    }
}

/// One `enum` assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumSpec {
    pub name: IStr,
    pub value: i32,
}

/// One `bit` assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitSpec {
    pub name: IStr,
    pub position: u32,
}

/// A fully resolved type descriptor.
#[derive(Debug, Clone)]
pub struct CompiledType {
    /// The outermost typedef name this type was reached through, if any.
    pub typedef: Option<IStr>,
    pub kind: TypeKind,
}

impl CompiledType {
    pub fn base_name(&self) -> &'static str {
        self.kind.base_name()
    }
}

/// Tagged variant over the 20 YANG built-in bases.
#[derive(Debug, Clone)]
pub enum TypeKind {
    Int {
        int: IntKind,
        ranges: Vec<Range>,
    },
    Decimal64 {
        fraction_digits: u8,
        /// Scaled by 10^fraction-digits.
        ranges: Vec<Range>,
    },
    String {
        /// Length in Unicode code points.
        length: Vec<Range>,
        patterns: Vec<Pattern>,
    },
    Boolean,
    Enumeration {
        enums: Vec<EnumSpec>,
    },
    Bits {
        bits: Vec<BitSpec>,
    },
    Binary {
        /// Length in octets of the decoded payload.
        length: Vec<Range>,
    },
    Empty,
    IdentityRef {
        bases: Vec<IdentityId>,
    },
    InstanceIdentifier {
        require_instance: bool,
    },
    LeafRef {
        path: XPathExpr,
        prefixes: Arc<PrefixMap>,
        require_instance: bool,
        /// Resolved in the final compiler pass.
        target: Option<SnodeId>,
        /// The target's resolved type.
        realtype: Option<Box<CompiledType>>,
    },
    Union {
        members: Vec<CompiledType>,
    },
}

impl TypeKind {
    pub fn base_name(&self) -> &'static str {
        match self {
            TypeKind::Int { int, .. } => int.name(),
            TypeKind::Decimal64 { .. } => "decimal64",
            TypeKind::String { .. } => "string",
            TypeKind::Boolean => "boolean",
            TypeKind::Enumeration { .. } => "enumeration",
            TypeKind::Bits { .. } => "bits",
            TypeKind::Binary { .. } => "binary",
            TypeKind::Empty => "empty",
            TypeKind::IdentityRef { .. } => "identityref",
            TypeKind::InstanceIdentifier { .. } => "instance-identifier",
            TypeKind::LeafRef { .. } => "leafref",
            TypeKind::Union { .. } => "union",
        }
    }
}

/// Parse a `range`/`length` argument against the ranges allowed so far.
///
/// `parent` is the currently-allowed range list (the base domain for the
/// first restriction). Each part must lie within `parent`, the parts must
/// be ascending and disjoint, and `min`/`max` resolve to the parent's
/// extremes. `fraction_digits` switches bound parsing to scaled decimals.
pub fn restrict_ranges(
    parent: &[Range],
    arg: &str,
    fraction_digits: Option<u8>,
) -> Result<Vec<Range>> {
    let min = parent.first().map(|r| r.lo).unwrap_or(i128::MIN);
    let max = parent.last().map(|r| r.hi).unwrap_or(i128::MAX);

    let mut out = Vec::new();
    for part in arg.split('|') {
        let part = part.trim();
        if part.is_empty() {
            return Err(Error::syntax(format!("empty part in range \"{arg}\"")));
        }
        let (lo, hi) = match part.split_once("..") {
            Some((a, b)) => (
                parse_bound(a.trim(), min, max, fraction_digits)?,
                parse_bound(b.trim(), min, max, fraction_digits)?,
            ),
            None => {
                let v = parse_bound(part, min, max, fraction_digits)?;
                (v, v)
            }
        };
        if lo > hi {
            return Err(Error::semantic(format!("descending range \"{part}\"")));
        }
        if let Some(prev) = out.last() {
            let prev: &Range = prev;
            if lo <= prev.hi {
                return Err(Error::semantic(format!(
                    "range parts not ascending and disjoint in \"{arg}\""
                )));
            }
        }
        // Subset of what the parent allows: both endpoints inside parent
        // parts, and no parent gap inside [lo, hi].
        let lo_part = parent.iter().position(|r| r.contains(lo));
        let hi_part = parent.iter().position(|r| r.contains(hi));
        match (lo_part, hi_part) {
            (Some(a), Some(b)) if a == b => {}
            _ => {
                return Err(Error::semantic(format!(
                    "range \"{part}\" is not a subset of the base type range"
                )));
            }
        }
        out.push(Range::new(lo, hi));
    }
    Ok(out)
}

fn parse_bound(s: &str, min: i128, max: i128, fraction_digits: Option<u8>) -> Result<i128> {
    match s {
        "min" => Ok(min),
        "max" => Ok(max),
        _ => match fraction_digits {
            Some(fd) => parse_scaled_decimal(s, fd),
            None => s
                .parse::<i128>()
                .map_err(|_| Error::syntax(format!("invalid range bound \"{s}\""))),
        },
    }
}

/// Parse a decimal literal into its scaled-integer form (value × 10^fd).
pub fn parse_scaled_decimal(s: &str, fraction_digits: u8) -> Result<i128> {
    let bad = || Error::syntax(format!("invalid decimal value \"{s}\""));
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(bad());
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(bad());
    }
    if frac_part.len() > fraction_digits as usize {
        return Err(Error::value(format!(
            "value \"{s}\" has more than {fraction_digits} fraction digits"
        )));
    }
    let mut scaled: i128 = 0;
    for c in int_part.chars() {
        scaled = scaled
            .checked_mul(10)
            .and_then(|v| v.checked_add((c as u8 - b'0') as i128))
            .ok_or_else(bad)?;
    }
    let mut frac: i128 = 0;
    for c in frac_part.chars() {
        frac = frac * 10 + (c as u8 - b'0') as i128;
    }
    for _ in frac_part.len()..fraction_digits as usize {
        frac *= 10;
    }
    let mut total = scaled
        .checked_mul(10i128.pow(fraction_digits as u32))
        .and_then(|v| v.checked_add(frac))
        .ok_or_else(bad)?;
    if negative {
        total = -total;
    }
    Ok(total)
}

/// Render a scaled decimal64 back to its canonical lexical form: at least
/// one integer and one fraction digit, trailing zeros trimmed.
pub fn format_scaled_decimal(scaled: i64, fraction_digits: u8) -> String {
    let divisor = 10i128.pow(fraction_digits as u32);
    let v = scaled as i128;
    let sign = if v < 0 { "-" } else { "" };
    let int_part = (v / divisor).abs();
    let frac = (v % divisor).abs();
    let mut frac_str = format!("{frac:0width$}", width = fraction_digits as usize);
    while frac_str.len() > 1 && frac_str.ends_with('0') {
        frac_str.pop();
    }
    format!("{sign}{int_part}.{frac_str}")
}

/// Compile an XSD-flavor pattern into an anchored [`Regex`].
///
/// XSD regexes match the whole value and have no `^`/`$` anchors; the XSD
/// multi-character escapes `\i`, `\I`, `\c`, `\C` are translated to their
/// character-class equivalents.
pub fn compile_pattern(text: &str) -> Result<Regex> {
    let mut translated = String::with_capacity(text.len() + 8);
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            translated.push(c);
            continue;
        }
        match chars.next() {
            Some('i') => translated.push_str("[A-Za-z_:]"),
            Some('I') => translated.push_str("[^A-Za-z_:]"),
            Some('c') => translated.push_str(r"[-.0-9:A-Z_a-z]"),
            Some('C') => translated.push_str(r"[^-.0-9:A-Z_a-z]"),
            Some(other) => {
                translated.push('\\');
                translated.push(other);
            }
            None => return Err(Error::syntax(format!("dangling \"\\\" in pattern \"{text}\""))),
        }
    }
    Regex::new(&format!("^(?:{translated})$"))
        .map_err(|e| Error::syntax(format!("invalid pattern \"{text}\": {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restrict_within_domain() {
        let domain = vec![IntKind::Int8.domain()];
        let ranges = restrict_ranges(&domain, "min..0 | 10 | 20..max", None).unwrap();
        assert_eq!(
            ranges,
            vec![Range::new(-128, 0), Range::new(10, 10), Range::new(20, 127)]
        );
    }

    #[test]
    fn test_restrict_chain_subset() {
        let domain = vec![IntKind::Uint8.domain()];
        let first = restrict_ranges(&domain, "10..100", None).unwrap();
        // Child must be a subset of the parent restriction.
        assert!(restrict_ranges(&first, "5..50", None).is_err());
        let second = restrict_ranges(&first, "20..30 | 40", None).unwrap();
        assert_eq!(second, vec![Range::new(20, 30), Range::new(40, 40)]);
    }

    #[test]
    fn test_restrict_rejects_overlap() {
        let domain = vec![IntKind::Int32.domain()];
        assert!(restrict_ranges(&domain, "1..10 | 5..20", None).is_err());
        assert!(restrict_ranges(&domain, "10..1", None).is_err());
    }

    #[test]
    fn test_range_spanning_parent_gap() {
        let parent = vec![Range::new(0, 10), Range::new(20, 30)];
        // 5..25 crosses the gap 11..19, so it is not a subset.
        assert!(restrict_ranges(&parent, "5..25", None).is_err());
        assert!(restrict_ranges(&parent, "5..9 | 21..25", None).is_ok());
    }

    #[test]
    fn test_scaled_decimal_parse() {
        assert_eq!(parse_scaled_decimal("8.0", 1).unwrap(), 80);
        assert_eq!(parse_scaled_decimal("-2.50", 2).unwrap(), -250);
        assert_eq!(parse_scaled_decimal("3", 2).unwrap(), 300);
        assert!(parse_scaled_decimal("1.234", 2).is_err());
        assert!(parse_scaled_decimal("abc", 2).is_err());
    }

    #[test]
    fn test_scaled_decimal_format() {
        assert_eq!(format_scaled_decimal(80, 1), "8.0");
        assert_eq!(format_scaled_decimal(-250, 2), "-2.5");
        assert_eq!(format_scaled_decimal(300, 2), "3.0");
        assert_eq!(format_scaled_decimal(0, 3), "0.0");
    }

    #[test]
    fn test_pattern_anchored() {
        let p = compile_pattern("[a-z]+").unwrap();
        assert!(p.is_match("abc"));
        assert!(!p.is_match("abc1"));
    }

    #[test]
    fn test_pattern_xsd_escapes() {
        let p = compile_pattern(r"\i\c*").unwrap();
        assert!(p.is_match("_name-1.x"));
        assert!(!p.is_match("1name"));
    }
}
