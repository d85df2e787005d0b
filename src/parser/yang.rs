//! Recursive-descent parser for YANG module text.
//!
//! Consumes the token stream from [`crate::parser::lexer`] and builds the
//! uniform [`Statement`] tree. Handles quoted-string unescaping, `+`
//! concatenation and the RFC 7950 indentation-trimming rule for
//! double-quoted strings.

use crate::base::{Interner, Position};
use crate::error::{Error, Result};
use crate::parser::keywords::{Keyword, is_identifier};
use crate::parser::lexer::{Token, TokenKind, tokenize};
use crate::parser::stmt::{ParsedModule, Statement};

/// Parse YANG source into a module, using a throwaway interner.
pub fn parse_yang(input: &str) -> Result<ParsedModule> {
    let mut interner = Interner::new();
    parse_yang_in(&mut interner, input)
}

/// Parse YANG source into a module, interning strings into `interner`
/// (normally the context dictionary).
pub fn parse_yang_in(interner: &mut Interner, input: &str) -> Result<ParsedModule> {
    let tokens = tokenize(input);
    let mut parser = YangParser { tokens, at: 0, interner };
    let root = parser.parse_statement()?;
    if let Some(tok) = parser.peek() {
        return Err(Error::syntax_at(
            format!("trailing content \"{}\" after module", tok.text),
            tok.pos,
        ));
    }
    ParsedModule::new(root)
}

struct YangParser<'a, 'i> {
    tokens: Vec<Token<'a>>,
    at: usize,
    interner: &'i mut Interner,
}

impl<'a> YangParser<'a, '_> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.at)
    }

    fn bump(&mut self) -> Option<Token<'a>> {
        let tok = self.tokens.get(self.at).cloned();
        if tok.is_some() {
            self.at += 1;
        }
        tok
    }

    fn eof_err(&self) -> Error {
        let pos = self.tokens.last().map(|t| t.pos);
        Error::InputExhausted { message: "unterminated statement".into(), pos }
    }

    /// `statement := keyword [argument] (";" | "{" statement* "}")`
    fn parse_statement(&mut self) -> Result<Statement> {
        let kw_tok = self.bump().ok_or_else(|| self.eof_err())?;
        if kw_tok.kind != TokenKind::Word {
            return Err(Error::syntax_at(
                format!("expected a statement keyword, found \"{}\"", kw_tok.text),
                kw_tok.pos,
            ));
        }
        let keyword = self.keyword_for(kw_tok.text, kw_tok.pos)?;

        let arg = self.parse_argument(&kw_tok)?;
        let mut stmt = Statement::new(keyword, arg, kw_tok.pos);

        match self.bump() {
            Some(tok) if tok.kind == TokenKind::Semicolon => {}
            Some(tok) if tok.kind == TokenKind::LBrace => loop {
                match self.peek() {
                    Some(t) if t.kind == TokenKind::RBrace => {
                        self.bump();
                        break;
                    }
                    Some(_) => stmt.children.push(self.parse_statement()?),
                    None => return Err(self.eof_err()),
                }
            },
            Some(tok) => {
                return Err(Error::syntax_at(
                    format!("expected \";\" or \"{{\", found \"{}\"", tok.text),
                    tok.pos,
                ));
            }
            None => return Err(self.eof_err()),
        }
        Ok(stmt)
    }

    fn keyword_for(&mut self, word: &str, pos: Position) -> Result<Keyword> {
        if let Some(kw) = Keyword::from_str(word) {
            return Ok(kw);
        }
        // Extension statement: prefix:identifier.
        if let Some((prefix, name)) = word.split_once(':') {
            if is_identifier(prefix) && is_identifier(name) {
                return Ok(Keyword::Unknown {
                    prefix: self.interner.intern(prefix),
                    name: self.interner.intern(name),
                });
            }
        }
        Err(Error::syntax_at(format!("invalid keyword \"{word}\""), pos))
    }

    /// An argument is absent, a single word, or a `+`-joined sequence of
    /// quoted strings.
    fn parse_argument(&mut self, kw_tok: &Token<'a>) -> Result<Option<crate::base::IStr>> {
        let Some(tok) = self.peek().cloned() else {
            return Err(self.eof_err());
        };
        let mut value = match tok.kind {
            TokenKind::Word => {
                self.bump();
                check_unquoted(tok.text, tok.pos)?;
                tok.text.to_string()
            }
            TokenKind::DoubleQuoted => {
                self.bump();
                process_double_quoted(tok.text, tok.pos.column)?
            }
            TokenKind::SingleQuoted => {
                self.bump();
                tok.text[1..tok.text.len() - 1].to_string()
            }
            // A lone "+" used as an argument (legal, if unusual).
            TokenKind::Plus => {
                self.bump();
                "+".to_string()
            }
            TokenKind::Semicolon | TokenKind::LBrace => return Ok(None),
            TokenKind::Error => {
                return Err(Error::syntax_at(
                    format!("unexpected character \"{}\"", tok.text),
                    tok.pos,
                ));
            }
            _ => {
                return Err(Error::syntax_at(
                    format!("unexpected token \"{}\" after \"{}\"", tok.text, kw_tok.text),
                    tok.pos,
                ));
            }
        };

        // Quoted strings may be concatenated with "+".
        if matches!(tok.kind, TokenKind::DoubleQuoted | TokenKind::SingleQuoted) {
            while self.peek().is_some_and(|t| t.kind == TokenKind::Plus) {
                self.bump();
                let part = self.bump().ok_or_else(|| self.eof_err())?;
                match part.kind {
                    TokenKind::DoubleQuoted => {
                        value.push_str(&process_double_quoted(part.text, part.pos.column)?);
                    }
                    TokenKind::SingleQuoted => {
                        value.push_str(&part.text[1..part.text.len() - 1]);
                    }
                    _ => {
                        return Err(Error::syntax_at(
                            "expected a quoted string after \"+\"",
                            part.pos,
                        ));
                    }
                }
            }
        }

        Ok(Some(self.interner.intern_string(value)))
    }
}

/// Unquoted strings must not contain comment sequences (RFC 7950 §6.1.3).
fn check_unquoted(text: &str, pos: Position) -> Result<()> {
    for seq in ["//", "/*", "*/"] {
        if text.contains(seq) {
            return Err(Error::syntax_at(
                format!("unquoted string contains \"{seq}\""),
                pos,
            ));
        }
    }
    Ok(())
}

/// Strip quotes, trim indentation, resolve escapes.
///
/// `quote_col` is the 1-based column of the opening `"`. Each line after the
/// first is stripped of leading whitespace up to that column (tabs advance
/// to the next multiple of 8), and of trailing whitespace before the break.
fn process_double_quoted(raw: &str, quote_col: usize) -> Result<String> {
    let inner = &raw[1..raw.len() - 1];
    let mut trimmed = String::with_capacity(inner.len());
    for (i, line) in inner.split('\n').enumerate() {
        if i > 0 {
            // Trailing whitespace of the previous line, then the break.
            while trimmed.ends_with(' ') || trimmed.ends_with('\t') || trimmed.ends_with('\r') {
                trimmed.pop();
            }
            trimmed.push('\n');
            let mut col = 0usize;
            let mut start = line.len();
            for (idx, ch) in line.char_indices() {
                if col >= quote_col || !matches!(ch, ' ' | '\t') {
                    start = idx;
                    break;
                }
                col = if ch == '\t' { (col / 8 + 1) * 8 } else { col + 1 };
            }
            trimmed.push_str(&line[start..]);
        } else {
            trimmed.push_str(line);
        }
    }

    unescape(&trimmed)
}

/// Resolve the four double-quote escapes: `\n`, `\t`, `\"`, `\\`.
fn unescape(s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                return Err(Error::syntax(format!(
                    "illegal escape sequence \"\\{other}\" in double-quoted string"
                )));
            }
            None => return Err(Error::syntax("dangling \"\\\" in double-quoted string")),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::keywords::Keyword;

    #[test]
    fn test_minimal_module() {
        let m = parse_yang("module m { namespace \"urn:m\"; prefix m; }").unwrap();
        assert_eq!(m.name(), "m");
        assert_eq!(m.namespace(), Some("urn:m"));
    }

    #[test]
    fn test_string_concatenation() {
        let m = parse_yang(
            "module m { namespace \"urn:\" + 'm'; prefix m; description \"a\" + \"b\"; }",
        )
        .unwrap();
        assert_eq!(m.namespace(), Some("urn:m"));
        assert_eq!(m.root().arg_of(Keyword::Description), Some("ab"));
    }

    #[test]
    fn test_escapes() {
        let m = parse_yang(
            r#"module m { namespace "urn:m"; prefix m; description "tab\there\nnew \"line\""; }"#,
        )
        .unwrap();
        assert_eq!(
            m.root().arg_of(Keyword::Description),
            Some("tab\there\nnew \"line\"")
        );
    }

    #[test]
    fn test_illegal_escape() {
        let err = parse_yang(r#"module m { namespace "urn\qm"; prefix m; }"#).unwrap_err();
        assert!(err.to_string().contains("escape"));
    }

    #[test]
    fn test_indent_trimming() {
        let src = "module m {\n  namespace \"urn:m\";\n  prefix m;\n  description\n    \"line one\n     line two\";\n}";
        let m = parse_yang(src).unwrap();
        assert_eq!(
            m.root().arg_of(Keyword::Description),
            Some("line one\nline two")
        );
    }

    #[test]
    fn test_single_quotes_are_verbatim() {
        let m = parse_yang(
            "module m { namespace \"urn:m\"; prefix m; description 'no \\n escapes'; }",
        )
        .unwrap();
        assert_eq!(
            m.root().arg_of(Keyword::Description),
            Some("no \\n escapes")
        );
    }

    #[test]
    fn test_extension_statement() {
        let m = parse_yang(
            "module m { namespace \"urn:m\"; prefix m; ex:meta \"v\" { ex:sub; } }",
        )
        .unwrap();
        let ext = m
            .root()
            .children
            .iter()
            .find(|s| matches!(s.keyword, Keyword::Unknown { .. }))
            .unwrap();
        assert_eq!(ext.arg(), "v");
        assert_eq!(ext.children.len(), 1);
    }

    #[test]
    fn test_unquoted_comment_sequence_rejected() {
        let err = parse_yang("module m { namespace urn://m; prefix m; }").unwrap_err();
        assert!(err.to_string().contains("//"));
    }

    #[test]
    fn test_unterminated_module() {
        let err = parse_yang("module m { namespace \"urn:m\";").unwrap_err();
        assert!(matches!(err, Error::InputExhausted { .. }));
    }

    #[test]
    fn test_trailing_content() {
        let err =
            parse_yang("module m { namespace \"urn:m\"; prefix m; } extra").unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }
}
