//! Schema output: render a parsed module back to YANG or YIN text.
//!
//! Both renderings are parse-stable: feeding the output back through the
//! matching front-end yields a structurally equal module, and a module
//! converted YIN→YANG prints identically to its direct YANG print.

use crate::context::SchemaFormat;
use crate::parser::YIN_NAMESPACE;
use crate::parser::keywords::Keyword;
use crate::parser::stmt::{ParsedModule, Statement};

/// Render a parsed module in the requested syntax.
pub fn print_module(module: &ParsedModule, format: SchemaFormat) -> String {
    match format {
        SchemaFormat::Yang => print_yang(module),
        SchemaFormat::Yin => print_yin(module),
    }
}

/// Render as YANG source.
pub fn print_yang(module: &ParsedModule) -> String {
    let mut out = String::new();
    print_yang_stmt(module.root(), 0, &mut out);
    out
}

fn print_yang_stmt(stmt: &Statement, depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    match &stmt.keyword {
        Keyword::Unknown { prefix, name } => {
            out.push_str(prefix);
            out.push(':');
            out.push_str(name);
        }
        kw => out.push_str(kw.as_str()),
    }
    if let Some(arg) = &stmt.arg {
        out.push(' ');
        out.push_str(&quote_argument(arg));
    }
    if stmt.children.is_empty() {
        out.push_str(";\n");
    } else {
        out.push_str(" {\n");
        for child in &stmt.children {
            print_yang_stmt(child, depth + 1, out);
        }
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str("}\n");
    }
}

/// Quote an argument when it cannot stand unquoted. Control characters are
/// escaped so the output re-parses to the identical value.
fn quote_argument(arg: &str) -> String {
    let needs_quoting = arg.is_empty()
        || arg.contains(|c: char| c.is_whitespace() || matches!(c, ';' | '{' | '}' | '"' | '\''))
        || arg.contains("//")
        || arg.contains("/*")
        || arg.contains("*/")
        || arg == "+";
    if !needs_quoting {
        return arg.to_string();
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Render as YIN (RFC 7950 §13).
pub fn print_yin(module: &ParsedModule) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let root = module.root();
    let keyword = root.keyword.as_str();
    out.push_str(&format!(
        "<{keyword} name=\"{}\"\n    xmlns=\"{YIN_NAMESPACE}\"",
        escape_attr(root.arg())
    ));
    if let (Some(prefix), Some(namespace)) = (module.prefix(), module.namespace()) {
        out.push_str(&format!("\n    xmlns:{prefix}=\"{}\"", escape_attr(namespace)));
    }
    out.push_str(">\n");
    for child in &root.children {
        print_yin_stmt(child, 1, &mut out);
    }
    out.push_str(&format!("</{keyword}>\n"));
    out
}

fn print_yin_stmt(stmt: &Statement, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match &stmt.keyword {
        Keyword::Unknown { prefix, name } => {
            // Extension instance: element in the extension's namespace.
            out.push_str(&format!(
                "{indent}<{prefix}:{name} xmlns:{prefix}=\"urn:yin:ext:{prefix}\""
            ));
            if let Some(arg) = &stmt.arg {
                out.push_str(&format!(" value=\"{}\"", escape_attr(arg)));
            }
            if stmt.children.is_empty() {
                out.push_str("/>\n");
            } else {
                out.push_str(">\n");
                for child in &stmt.children {
                    print_yin_stmt(child, depth + 1, out);
                }
                out.push_str(&format!("{indent}</{prefix}:{name}>\n"));
            }
        }
        kw => {
            let name = kw.as_str();
            out.push_str(&format!("{indent}<{name}"));
            let arg_elem = match kw.yin_argument() {
                Some((arg_name, true)) => Some(arg_name),
                Some((arg_name, false)) => {
                    if let Some(arg) = &stmt.arg {
                        out.push_str(&format!(" {arg_name}=\"{}\"", escape_attr(arg)));
                    }
                    None
                }
                None => None,
            };
            let has_body = arg_elem.is_some() || !stmt.children.is_empty();
            if !has_body {
                out.push_str("/>\n");
                return;
            }
            out.push_str(">\n");
            if let (Some(arg_name), Some(arg)) = (arg_elem, &stmt.arg) {
                out.push_str(&format!(
                    "{indent}  <{arg_name}>{}</{arg_name}>\n",
                    escape_text(arg)
                ));
            }
            for child in &stmt.children {
                print_yin_stmt(child, depth + 1, out);
            }
            out.push_str(&format!("{indent}</{name}>\n"));
        }
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s)
        .replace('"', "&quot;")
        .replace('\n', "&#10;")
        .replace('\t', "&#9;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_yang, parse_yin};

    const MODULE: &str = r#"module m {
  yang-version 1.1;
  namespace "urn:tests:m";
  prefix m;
  description "two words";
  leaf l {
    type string {
      pattern "[a-z]+";
    }
  }
  leaf-list ll {
    type uint8;
    max-elements 5;
  }
}
"#;

    #[test]
    fn test_yang_round_trip() {
        let parsed = parse_yang(MODULE).unwrap();
        let printed = print_yang(&parsed);
        let reparsed = parse_yang(&printed).unwrap();
        assert_eq!(parsed.root(), reparsed.root());
    }

    #[test]
    fn test_yin_round_trip() {
        let parsed = parse_yang(MODULE).unwrap();
        let yin = print_yin(&parsed);
        let reparsed = parse_yin(&yin).unwrap();
        assert_eq!(parsed.root(), reparsed.root());
    }

    #[test]
    fn test_cross_format_print_equivalence() {
        let parsed = parse_yang(MODULE).unwrap();
        let via_yin = parse_yin(&print_yin(&parsed)).unwrap();
        assert_eq!(print_yang(&parsed), print_yang(&via_yin));
    }

    #[test]
    fn test_multiline_argument_round_trip() {
        let src = "module m { namespace \"urn:m\"; prefix m; description \"line one\nline two\"; }";
        let parsed = parse_yang(src).unwrap();
        let reparsed = parse_yang(&print_yang(&parsed)).unwrap();
        assert_eq!(parsed.root(), reparsed.root());
    }

    #[test]
    fn test_quote_argument() {
        assert_eq!(quote_argument("plain"), "plain");
        assert_eq!(quote_argument("two words"), "\"two words\"");
        assert_eq!(quote_argument("a\"b"), "\"a\\\"b\"");
        assert_eq!(quote_argument(""), "\"\"");
    }
}
