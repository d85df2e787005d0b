//! The value engine: storing, comparing and printing typed leaf values.
//!
//! `store` turns a lexical value into its canonical stored form, applying
//! the type's restrictions; `print` is the inverse. Stored values compare
//! structurally, so canonical equality is `==`.

use std::cmp::Ordering;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::base::{IStr, Interner};
use crate::error::{Error, Result};
use crate::schema::types::{
    CompiledType, IntKind, Pattern, Range, TypeKind, format_scaled_decimal, parse_scaled_decimal,
    ranges_contain,
};
use crate::schema::{IdentityId, PrefixMap, SchemaSet};

/// Encoding the lexical value came from / is printed to. Identityref values
/// are module-qualified differently in XML and JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFmt {
    Xml,
    Json,
}

/// A canonical stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Decimal64 { scaled: i64, fraction_digits: u8 },
    String(IStr),
    Boolean(bool),
    Empty,
    Enum { name: IStr, value: i32 },
    /// Set bit names in type-declaration order.
    Bits { names: Vec<IStr> },
    /// The base64 text, kept verbatim.
    Binary { b64: IStr },
    IdentityRef { identity: IdentityId, module: IStr, name: IStr },
    /// The path text; the resolved node is kept on the data node.
    InstanceId { path: IStr },
    /// A union value: whichever member stored first.
    Union(Box<Value>),
}

impl Value {
    /// Canonical lexical form.
    pub fn to_lexical(&self, set: &SchemaSet, fmt: ValueFmt) -> String {
        match self {
            Value::Int8(v) => v.to_string(),
            Value::Int16(v) => v.to_string(),
            Value::Int32(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Uint8(v) => v.to_string(),
            Value::Uint16(v) => v.to_string(),
            Value::Uint32(v) => v.to_string(),
            Value::Uint64(v) => v.to_string(),
            Value::Decimal64 { scaled, fraction_digits } => {
                format_scaled_decimal(*scaled, *fraction_digits)
            }
            Value::String(s) => s.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Empty => String::new(),
            Value::Enum { name, .. } => name.to_string(),
            Value::Bits { names } => {
                names.iter().map(|n| n.as_ref()).collect::<Vec<_>>().join(" ")
            }
            Value::Binary { b64 } => b64.to_string(),
            Value::IdentityRef { identity, module, name } => match fmt {
                ValueFmt::Json => format!("{module}:{name}"),
                ValueFmt::Xml => {
                    let prefix = &set.module(set.identity(*identity).module).prefix;
                    format!("{prefix}:{name}")
                }
            },
            Value::InstanceId { path } => path.to_string(),
            Value::Union(inner) => inner.to_lexical(set, fmt),
        }
    }

    /// Total order where one is defined (numerics, strings); equality
    /// otherwise.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Union(a), b) => a.compare(b),
            (a, Value::Union(b)) => a.compare(b),
            (a, b) => match (a.as_i128(), b.as_i128()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => match (a, b) {
                    (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
                    (Value::Decimal64 { .. }, _) | (_, Value::Decimal64 { .. }) => None,
                    _ => (a == b).then_some(Ordering::Equal),
                },
            },
        }
    }

    fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int8(v) => Some(*v as i128),
            Value::Int16(v) => Some(*v as i128),
            Value::Int32(v) => Some(*v as i128),
            Value::Int64(v) => Some(*v as i128),
            Value::Uint8(v) => Some(*v as i128),
            Value::Uint16(v) => Some(*v as i128),
            Value::Uint32(v) => Some(*v as i128),
            Value::Uint64(v) => Some(*v as i128),
            _ => None,
        }
    }

    /// Numeric interpretation for XPath arithmetic.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Decimal64 { scaled, fraction_digits } => {
                Some(*scaled as f64 / 10f64.powi(*fraction_digits as i32))
            }
            Value::Union(inner) => inner.as_number(),
            other => other.as_i128().map(|v| v as f64),
        }
    }
}

/// Store a lexical value against a compiled type.
///
/// `prefixes` is the defining module's prefix resolver, used for
/// identityref values.
pub fn store(
    set: &SchemaSet,
    prefixes: &PrefixMap,
    typ: &CompiledType,
    input: &str,
    fmt: ValueFmt,
) -> Result<Value> {
    match &typ.kind {
        TypeKind::Int { int, ranges } => store_int(*int, ranges, input),
        TypeKind::Decimal64 { fraction_digits, ranges } => {
            let scaled = parse_scaled_decimal(input.trim(), *fraction_digits)?;
            if !ranges_contain(ranges, scaled as i128) {
                return Err(out_of_range(input));
            }
            Ok(Value::Decimal64 { scaled: scaled as i64, fraction_digits: *fraction_digits })
        }
        TypeKind::String { length, patterns } => {
            check_length(length, input.chars().count() as i128, input)?;
            check_patterns(patterns, input)?;
            Ok(Value::String(intern(input)))
        }
        TypeKind::Boolean => match input.trim() {
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            _ => Err(Error::value(format!("invalid boolean value \"{input}\""))),
        },
        TypeKind::Empty => {
            if input.trim().is_empty() {
                Ok(Value::Empty)
            } else {
                Err(Error::value(format!("invalid empty value \"{input}\"")))
            }
        }
        TypeKind::Enumeration { enums } => {
            let name = input.trim();
            match enums.iter().find(|e| &*e.name == name) {
                Some(e) => Ok(Value::Enum { name: e.name.clone(), value: e.value }),
                None => Err(Error::value(format!("invalid enumeration value \"{name}\""))),
            }
        }
        TypeKind::Bits { bits } => store_bits(bits, input),
        TypeKind::Binary { length } => store_binary(length, input),
        TypeKind::IdentityRef { bases } => store_identityref(set, prefixes, bases, input, fmt),
        TypeKind::InstanceIdentifier { .. } => {
            // Syntax check now; instance resolution happens in validation.
            let mut scratch = Interner::new();
            crate::xpath::parse_xpath(&mut scratch, input.trim())
                .map_err(|e| Error::value(format!("invalid instance-identifier: {e}")))?;
            Ok(Value::InstanceId { path: intern(input.trim()) })
        }
        TypeKind::LeafRef { realtype, .. } => match realtype {
            Some(real) => store(set, prefixes, real, input, fmt),
            None => Err(Error::Internal("leafref type not resolved".into())),
        },
        TypeKind::Union { members } => {
            let mut causes = Vec::new();
            for member in members {
                match store(set, prefixes, member, input, fmt) {
                    Ok(v) => return Ok(Value::Union(Box::new(v))),
                    Err(e) => causes.push(e),
                }
            }
            Err(Error::UnionNoMatch {
                message: format!("no union member type accepted \"{input}\""),
                path: None,
                causes,
            })
        }
    }
}

fn store_int(int: IntKind, ranges: &[Range], input: &str) -> Result<Value> {
    let text = input.trim();
    let digits = text.strip_prefix('+').unwrap_or(text);
    let parsed: i128 = digits
        .parse()
        .map_err(|_| Error::value(format!("invalid {} value \"{input}\"", int.name())))?;
    if !int.domain().contains(parsed) || !ranges_contain(ranges, parsed) {
        return Err(out_of_range(text));
    }
    Ok(match int {
        IntKind::Int8 => Value::Int8(parsed as i8),
        IntKind::Int16 => Value::Int16(parsed as i16),
        IntKind::Int32 => Value::Int32(parsed as i32),
        IntKind::Int64 => Value::Int64(parsed as i64),
        IntKind::Uint8 => Value::Uint8(parsed as u8),
        IntKind::Uint16 => Value::Uint16(parsed as u16),
        IntKind::Uint32 => Value::Uint32(parsed as u32),
        IntKind::Uint64 => Value::Uint64(parsed as u64),
    })
}

fn store_bits(bits: &[crate::schema::types::BitSpec], input: &str) -> Result<Value> {
    let mut seen = vec![false; bits.len()];
    for word in input.split_whitespace() {
        let idx = bits
            .iter()
            .position(|b| &*b.name == word)
            .ok_or_else(|| Error::value(format!("invalid bit name \"{word}\"")))?;
        if seen[idx] {
            return Err(Error::duplicate(format!("bit \"{word}\" set twice")));
        }
        seen[idx] = true;
    }
    // Canonical order is the type's declaration order.
    let names = bits
        .iter()
        .zip(&seen)
        .filter(|(_, set)| **set)
        .map(|(b, _)| b.name.clone())
        .collect();
    Ok(Value::Bits { names })
}

fn store_binary(length: &[Range], input: &str) -> Result<Value> {
    let compact: String = input.split_whitespace().collect();
    let decoded = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| Error::value(format!("invalid base64 value: {e}")))?;
    check_length(length, decoded.len() as i128, input)?;
    Ok(Value::Binary { b64: intern(input) })
}

fn store_identityref(
    set: &SchemaSet,
    prefixes: &PrefixMap,
    bases: &[IdentityId],
    input: &str,
    fmt: ValueFmt,
) -> Result<Value> {
    let text = input.trim();
    let (qualifier, name) = match text.split_once(':') {
        Some((q, n)) => (Some(q), n),
        None => (None, text),
    };
    let module_name = match (qualifier, fmt) {
        // JSON qualifies by module name; XML by prefix in the defining
        // module's import map.
        (Some(q), ValueFmt::Json) => q.to_string(),
        (Some(q), ValueFmt::Xml) => match prefixes.get(q) {
            Some(m) => m.to_string(),
            None => return Err(Error::value(format!("unknown prefix \"{q}\" in \"{text}\""))),
        },
        (None, _) => {
            return Err(Error::value(format!(
                "identityref value \"{text}\" is not module-qualified"
            )));
        }
    };
    let module = set
        .find_module(&module_name)
        .ok_or_else(|| Error::value(format!("unknown module \"{module_name}\" in \"{text}\"")))?;
    let identity = set
        .find_identity(module, name)
        .ok_or_else(|| Error::value(format!("unknown identity \"{text}\"")))?;
    // The value must be derived from (not equal to) one of the bases.
    let derived = bases.iter().any(|&b| set.identity(b).derived.contains(&identity));
    if !derived {
        return Err(Error::value(format!(
            "identity \"{text}\" is not derived from the required base"
        )));
    }
    let m = set.module(module);
    Ok(Value::IdentityRef {
        identity,
        module: m.name.clone(),
        name: set.identity(identity).name.clone(),
    })
}

fn check_length(length: &[Range], actual: i128, input: &str) -> Result<()> {
    if !ranges_contain(length, actual) {
        return Err(Error::value(format!(
            "length {actual} of \"{input}\" is outside the allowed length"
        )));
    }
    Ok(())
}

fn check_patterns(patterns: &[Pattern], input: &str) -> Result<()> {
    for p in patterns {
        if !p.matches(input) {
            let message = match &p.error_message {
                Some(m) => m.to_string(),
                None => format!("value \"{input}\" does not match pattern \"{}\"", p.text),
            };
            return Err(Error::InvalidValue { message, path: None });
        }
    }
    Ok(())
}

fn out_of_range(input: &str) -> Error {
    Error::value(format!("value \"{input}\" is out of range"))
}

fn intern(s: &str) -> IStr {
    IStr::from(s)
}
