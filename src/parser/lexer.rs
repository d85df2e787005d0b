//! Logos-based lexer for YANG module text.
//!
//! Tokenizes statement keywords/arguments, quoted strings, comments and the
//! three structural characters `{`, `}`, `;`. String unescaping and quoted
//! string concatenation (`+`) are handled by the parser, which also knows
//! the column of the opening quote for indentation trimming.

use logos::Logos;

use crate::base::Position;

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    LineComment,
    BlockComment,
    /// `"..."` including the quotes; escapes unresolved.
    DoubleQuoted,
    /// `'...'` including the quotes; no escapes exist in single quotes.
    SingleQuoted,
    /// An unquoted argument or keyword word.
    Word,
    Plus,
    LBrace,
    RBrace,
    Semicolon,
    Error,
}

/// A token with its kind, raw text, and source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub pos: Position,
}

/// Lexer wrapping the logos-generated tokenizer, tracking line/column.
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, LogosToken>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            inner: LogosToken::lexer(input),
            line: 1,
            column: 1,
        }
    }

    fn advance_position(&mut self, text: &str) {
        for c in text.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let logos_token = self.inner.next()?;
        let text = self.inner.slice();
        let pos = Position::new(self.line, self.column);
        self.advance_position(text);

        let kind = match logos_token {
            Ok(t) => t.into(),
            Err(()) => TokenKind::Error,
        };

        Some(Token { kind, text, pos })
    }
}

/// Tokenize an entire string into a Vec, dropping trivia.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input)
        .filter(|t| {
            !matches!(
                t.kind,
                TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment
            )
        })
        .collect()
}

/// Logos token enum - maps to TokenKind
// No skip patterns: whitespace and comments are real tokens here, the
// parser decides what to drop.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
enum LogosToken {
    #[regex(r"[ \t\r\n]+")]
    Whitespace,

    #[regex(r"//[^\n]*")]
    LineComment,

    #[regex(r"/\*([^*]|\*+[^*/])*\*+/")]
    BlockComment,

    #[regex(r#""([^"\\]|\\.)*""#)]
    DoubleQuoted,

    #[regex(r"'[^']*'")]
    SingleQuoted,

    // Any run of characters that cannot terminate an unquoted string.
    // Comment sequences inside such a run are rejected by the parser, as
    // RFC 7950 requires.
    #[regex(r#"[^ \t\r\n;{}"']+"#, priority = 1)]
    Word,

    #[token("+", priority = 3)]
    Plus,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(";")]
    Semicolon,
}

impl From<LogosToken> for TokenKind {
    fn from(t: LogosToken) -> TokenKind {
        match t {
            LogosToken::Whitespace => TokenKind::Whitespace,
            LogosToken::LineComment => TokenKind::LineComment,
            LogosToken::BlockComment => TokenKind::BlockComment,
            LogosToken::DoubleQuoted => TokenKind::DoubleQuoted,
            LogosToken::SingleQuoted => TokenKind::SingleQuoted,
            LogosToken::Word => TokenKind::Word,
            LogosToken::Plus => TokenKind::Plus,
            LogosToken::LBrace => TokenKind::LBrace,
            LogosToken::RBrace => TokenKind::RBrace,
            LogosToken::Semicolon => TokenKind::Semicolon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_statement_tokens() {
        assert_eq!(
            kinds("leaf foo { type string; }"),
            vec![
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::LBrace,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Semicolon,
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn test_quoted_strings() {
        let tokens = tokenize(r#"description "a \"quoted\" word";"#);
        assert_eq!(tokens[1].kind, TokenKind::DoubleQuoted);
        assert_eq!(tokens[1].text, r#""a \"quoted\" word""#);

        let tokens = tokenize("pattern '[a-z]+';");
        assert_eq!(tokens[1].kind, TokenKind::SingleQuoted);
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = tokenize("// line\nmodule /* block */ m;");
        assert_eq!(
            tokens.iter().map(|t| t.text).collect::<Vec<_>>(),
            vec!["module", "m", ";"]
        );
    }

    #[test]
    fn test_position_tracking() {
        let tokens = tokenize("module m {\n  namespace \"urn:m\";\n}");
        let ns = tokens.iter().find(|t| t.text == "namespace").unwrap();
        assert_eq!(ns.pos, Position::new(2, 3));
    }

    #[test]
    fn test_plus_between_strings() {
        let tokens = tokenize(r#""abc" + "def""#);
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![TokenKind::DoubleQuoted, TokenKind::Plus, TokenKind::DoubleQuoted]
        );
    }

    #[test]
    fn test_unquoted_path_argument() {
        let tokens = tokenize("path ../ref/value;");
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, "../ref/value");
    }
}
