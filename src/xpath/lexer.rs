//! Logos-based lexer for XPath expressions.

use logos::Logos;

use crate::error::{Error, Result};

/// XPath token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XpTokenKind {
    Number,
    Literal,
    /// NCName (may be an axis, function or operator name depending on
    /// context; the parser decides).
    Ident,
    SlashSlash,
    Slash,
    DotDot,
    Dot,
    At,
    ColonColon,
    Colon,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Pipe,
    Plus,
    Minus,
    Star,
    Eq,
    Ne,
    Le,
    Lt,
    Ge,
    Gt,
}

/// A token with its kind and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XpToken<'a> {
    pub kind: XpTokenKind,
    pub text: &'a str,
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum LogosXp {
    #[regex(r"[0-9]+(\.[0-9]+)?|\.[0-9]+")]
    Number,

    #[regex(r#""[^"]*"|'[^']*'"#)]
    Literal,

    #[regex(r"[A-Za-z_][A-Za-z0-9_.\-]*")]
    Ident,

    #[token("//")]
    SlashSlash,
    #[token("/")]
    Slash,
    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,
    #[token("@")]
    At,
    #[token("::")]
    ColonColon,
    #[token(":")]
    Colon,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token("|")]
    Pipe,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("=")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token("<")]
    Lt,
    #[token(">=")]
    Ge,
    #[token(">")]
    Gt,
}

impl From<LogosXp> for XpTokenKind {
    fn from(t: LogosXp) -> Self {
        match t {
            LogosXp::Number => XpTokenKind::Number,
            LogosXp::Literal => XpTokenKind::Literal,
            LogosXp::Ident => XpTokenKind::Ident,
            LogosXp::SlashSlash => XpTokenKind::SlashSlash,
            LogosXp::Slash => XpTokenKind::Slash,
            LogosXp::DotDot => XpTokenKind::DotDot,
            LogosXp::Dot => XpTokenKind::Dot,
            LogosXp::At => XpTokenKind::At,
            LogosXp::ColonColon => XpTokenKind::ColonColon,
            LogosXp::Colon => XpTokenKind::Colon,
            LogosXp::LBracket => XpTokenKind::LBracket,
            LogosXp::RBracket => XpTokenKind::RBracket,
            LogosXp::LParen => XpTokenKind::LParen,
            LogosXp::RParen => XpTokenKind::RParen,
            LogosXp::Comma => XpTokenKind::Comma,
            LogosXp::Pipe => XpTokenKind::Pipe,
            LogosXp::Plus => XpTokenKind::Plus,
            LogosXp::Minus => XpTokenKind::Minus,
            LogosXp::Star => XpTokenKind::Star,
            LogosXp::Eq => XpTokenKind::Eq,
            LogosXp::Ne => XpTokenKind::Ne,
            LogosXp::Le => XpTokenKind::Le,
            LogosXp::Lt => XpTokenKind::Lt,
            LogosXp::Ge => XpTokenKind::Ge,
            LogosXp::Gt => XpTokenKind::Gt,
        }
    }
}

/// Tokenize an XPath expression.
pub fn tokenize_xpath(input: &str) -> Result<Vec<XpToken<'_>>> {
    let mut lexer = LogosXp::lexer(input);
    let mut tokens = Vec::new();
    while let Some(tok) = lexer.next() {
        match tok {
            Ok(t) => tokens.push(XpToken { kind: t.into(), text: lexer.slice() }),
            Err(()) => {
                return Err(Error::syntax(format!(
                    "invalid character in XPath expression at \"{}\"",
                    &input[lexer.span().start..]
                )));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_tokens() {
        let tokens = tokenize_xpath("../if:interface/name").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                XpTokenKind::DotDot,
                XpTokenKind::Slash,
                XpTokenKind::Ident,
                XpTokenKind::Colon,
                XpTokenKind::Ident,
                XpTokenKind::Slash,
                XpTokenKind::Ident,
            ]
        );
    }

    #[test]
    fn test_expression_tokens() {
        let tokens = tokenize_xpath("count(/a) >= 2.5 and not(b != 'x')").unwrap();
        assert!(tokens.iter().any(|t| t.kind == XpTokenKind::Ge));
        assert!(tokens.iter().any(|t| t.kind == XpTokenKind::Literal && t.text == "'x'"));
        assert!(tokens.iter().any(|t| t.kind == XpTokenKind::Number && t.text == "2.5"));
    }

    #[test]
    fn test_invalid_character() {
        assert!(tokenize_xpath("a # b").is_err());
    }
}
