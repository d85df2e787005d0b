//! Recursive-descent parser for the XPath subset.
//!
//! Precedence levels follow XPath 1.0: `or` < `and` < equality <
//! relational < additive < multiplicative < unary minus < union < path.

use crate::base::Interner;
use crate::error::{Error, Result};
use crate::xpath::lexer::{XpToken, XpTokenKind, tokenize_xpath};
use crate::xpath::{
    ArithOp, Axis, EqOp, Expr, Func, NodeTest, PathExpr, PathStart, RelOp, Step, XPathExpr,
};

/// Compile an XPath expression, interning names into `interner`.
pub fn parse_xpath(interner: &mut Interner, text: &str) -> Result<XPathExpr> {
    let tokens = tokenize_xpath(text)?;
    if tokens.is_empty() {
        return Err(Error::syntax("empty XPath expression"));
    }
    let mut parser = XpParser { tokens, at: 0, interner: &mut *interner };
    let root = parser.parse_or()?;
    if let Some(tok) = parser.peek() {
        return Err(Error::syntax(format!(
            "trailing content \"{}\" in XPath expression \"{text}\"",
            tok.text
        )));
    }
    Ok(XPathExpr { text: interner.intern(text), root })
}

struct XpParser<'a, 'i> {
    tokens: Vec<XpToken<'a>>,
    at: usize,
    interner: &'i mut Interner,
}

impl<'a> XpParser<'a, '_> {
    fn peek(&self) -> Option<&XpToken<'a>> {
        self.tokens.get(self.at)
    }

    fn peek_kind(&self) -> Option<XpTokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn peek2_kind(&self) -> Option<XpTokenKind> {
        self.tokens.get(self.at + 1).map(|t| t.kind)
    }

    fn bump(&mut self) -> Option<XpToken<'a>> {
        let tok = self.tokens.get(self.at).cloned();
        if tok.is_some() {
            self.at += 1;
        }
        tok
    }

    fn expect(&mut self, kind: XpTokenKind, what: &str) -> Result<XpToken<'a>> {
        match self.bump() {
            Some(tok) if tok.kind == kind => Ok(tok),
            Some(tok) => Err(Error::syntax(format!(
                "expected {what}, found \"{}\"",
                tok.text
            ))),
            None => Err(Error::syntax(format!("expected {what}, found end of expression"))),
        }
    }

    /// Is the current token the named operator (`and`, `or`, `div`, `mod`)?
    fn at_op_ident(&self, name: &str) -> bool {
        self.peek()
            .is_some_and(|t| t.kind == XpTokenKind::Ident && t.text == name)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.at_op_ident("or") {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.at_op_ident("and") {
            self.bump();
            let rhs = self.parse_equality()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek_kind() {
                Some(XpTokenKind::Eq) => EqOp::Eq,
                Some(XpTokenKind::Ne) => EqOp::Ne,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_relational()?;
            lhs = Expr::Equality(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                Some(XpTokenKind::Lt) => RelOp::Lt,
                Some(XpTokenKind::Le) => RelOp::Le,
                Some(XpTokenKind::Gt) => RelOp::Gt,
                Some(XpTokenKind::Ge) => RelOp::Ge,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_additive()?;
            lhs = Expr::Relational(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                Some(XpTokenKind::Plus) => ArithOp::Add,
                Some(XpTokenKind::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.peek_kind() == Some(XpTokenKind::Star) {
                ArithOp::Mul
            } else if self.at_op_ident("div") {
                ArithOp::Div
            } else if self.at_op_ident("mod") {
                ArithOp::Mod
            } else {
                break;
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek_kind() == Some(XpTokenKind::Minus) {
            self.bump();
            let operand = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(operand)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_path()?;
        while self.peek_kind() == Some(XpTokenKind::Pipe) {
            self.bump();
            let rhs = self.parse_path()?;
            lhs = Expr::Union(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// `PathExpr := LocationPath | FilterExpr (('/'|'//') RelPath)?`
    fn parse_path(&mut self) -> Result<Expr> {
        match self.peek_kind() {
            Some(XpTokenKind::Slash) => {
                self.bump();
                let mut steps = Vec::new();
                if self.at_step_start() {
                    self.parse_relative_path(&mut steps)?;
                }
                Ok(Expr::Path(PathExpr { start: PathStart::Root, steps }))
            }
            Some(XpTokenKind::SlashSlash) => {
                self.bump();
                let mut steps = vec![descendant_or_self_step()];
                self.parse_relative_path(&mut steps)?;
                Ok(Expr::Path(PathExpr { start: PathStart::Root, steps }))
            }
            Some(XpTokenKind::Literal) => {
                let tok = self.bump().unwrap();
                let inner = &tok.text[1..tok.text.len() - 1];
                Ok(Expr::Literal(self.interner.intern(inner)))
            }
            Some(XpTokenKind::Number) => {
                let tok = self.bump().unwrap();
                let n: f64 = tok.text.parse().map_err(|_| {
                    Error::syntax(format!("invalid number \"{}\"", tok.text))
                })?;
                Ok(Expr::Number(n))
            }
            Some(XpTokenKind::LParen) => {
                self.bump();
                let inner = self.parse_or()?;
                self.expect(XpTokenKind::RParen, "\")\"")?;
                self.maybe_trailing_path(inner)
            }
            Some(XpTokenKind::Ident)
                if self.peek2_kind() == Some(XpTokenKind::LParen)
                    && !matches!(self.peek().unwrap().text, "node" | "text") =>
            {
                let call = self.parse_function_call()?;
                self.maybe_trailing_path(call)
            }
            Some(_) => {
                let mut steps = Vec::new();
                self.parse_relative_path(&mut steps)?;
                Ok(Expr::Path(PathExpr { start: PathStart::Current, steps }))
            }
            None => Err(Error::syntax("unexpected end of XPath expression")),
        }
    }

    /// After a primary expression, `/` or `//` continues as a path.
    fn maybe_trailing_path(&mut self, primary: Expr) -> Result<Expr> {
        let mut steps = Vec::new();
        match self.peek_kind() {
            Some(XpTokenKind::Slash) => {
                self.bump();
                self.parse_relative_path(&mut steps)?;
            }
            Some(XpTokenKind::SlashSlash) => {
                self.bump();
                steps.push(descendant_or_self_step());
                self.parse_relative_path(&mut steps)?;
            }
            _ => return Ok(primary),
        }
        Ok(Expr::Path(PathExpr { start: PathStart::Expr(Box::new(primary)), steps }))
    }

    fn at_step_start(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(
                XpTokenKind::Ident
                    | XpTokenKind::Star
                    | XpTokenKind::Dot
                    | XpTokenKind::DotDot
                    | XpTokenKind::At
            )
        )
    }

    fn parse_relative_path(&mut self, steps: &mut Vec<Step>) -> Result<()> {
        steps.push(self.parse_step()?);
        loop {
            match self.peek_kind() {
                Some(XpTokenKind::Slash) => {
                    self.bump();
                    steps.push(self.parse_step()?);
                }
                Some(XpTokenKind::SlashSlash) => {
                    self.bump();
                    steps.push(descendant_or_self_step());
                    steps.push(self.parse_step()?);
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_step(&mut self) -> Result<Step> {
        match self.peek_kind() {
            Some(XpTokenKind::Dot) => {
                self.bump();
                return Ok(Step { axis: Axis::SelfAxis, test: NodeTest::AnyNode, predicates: vec![] });
            }
            Some(XpTokenKind::DotDot) => {
                self.bump();
                return Ok(Step { axis: Axis::Parent, test: NodeTest::AnyNode, predicates: vec![] });
            }
            Some(XpTokenKind::At) => {
                return Err(Error::Unsupported(
                    "the attribute axis is not used in YANG XPath".into(),
                ));
            }
            _ => {}
        }

        // Optional named axis.
        let axis = if self.peek_kind() == Some(XpTokenKind::Ident)
            && self.peek2_kind() == Some(XpTokenKind::ColonColon)
        {
            let name = self.bump().unwrap();
            self.bump();
            match name.text {
                "child" => Axis::Child,
                "parent" => Axis::Parent,
                "self" => Axis::SelfAxis,
                "descendant" => Axis::Descendant,
                "descendant-or-self" => Axis::DescendantOrSelf,
                other => {
                    return Err(Error::Unsupported(format!(
                        "axis \"{other}\" is not used in YANG XPath"
                    )));
                }
            }
        } else {
            Axis::Child
        };

        let test = self.parse_node_test()?;
        let mut predicates = Vec::new();
        while self.peek_kind() == Some(XpTokenKind::LBracket) {
            self.bump();
            predicates.push(self.parse_or()?);
            self.expect(XpTokenKind::RBracket, "\"]\"")?;
        }
        Ok(Step { axis, test, predicates })
    }

    fn parse_node_test(&mut self) -> Result<NodeTest> {
        match self.peek_kind() {
            Some(XpTokenKind::Star) => {
                self.bump();
                Ok(NodeTest::Any)
            }
            Some(XpTokenKind::Ident) => {
                let first = self.bump().unwrap();
                // node() / text()
                if self.peek_kind() == Some(XpTokenKind::LParen)
                    && matches!(first.text, "node" | "text")
                {
                    self.bump();
                    self.expect(XpTokenKind::RParen, "\")\"")?;
                    return Ok(if first.text == "node" {
                        NodeTest::AnyNode
                    } else {
                        NodeTest::Text
                    });
                }
                if self.peek_kind() == Some(XpTokenKind::Colon) {
                    self.bump();
                    let prefix = self.interner.intern(first.text);
                    if self.peek_kind() == Some(XpTokenKind::Star) {
                        self.bump();
                        // prefix:* narrows to a module; model as Any with prefix.
                        return Ok(NodeTest::Name {
                            prefix: Some(prefix),
                            name: self.interner.intern("*"),
                        });
                    }
                    let name = self.expect(XpTokenKind::Ident, "a node name")?;
                    return Ok(NodeTest::Name {
                        prefix: Some(prefix),
                        name: self.interner.intern(name.text),
                    });
                }
                Ok(NodeTest::Name { prefix: None, name: self.interner.intern(first.text) })
            }
            _ => {
                let found = self.peek().map(|t| t.text.to_string());
                Err(Error::syntax(match found {
                    Some(text) => format!("expected a node test, found \"{text}\""),
                    None => "expected a node test, found end of expression".into(),
                }))
            }
        }
    }

    fn parse_function_call(&mut self) -> Result<Expr> {
        let name = self.bump().unwrap();
        let func = Func::from_name(name.text).ok_or_else(|| {
            Error::Unsupported(format!("unknown XPath function \"{}\"", name.text))
        })?;
        self.expect(XpTokenKind::LParen, "\"(\"")?;
        let mut args = Vec::new();
        if self.peek_kind() != Some(XpTokenKind::RParen) {
            args.push(self.parse_or()?);
            while self.peek_kind() == Some(XpTokenKind::Comma) {
                self.bump();
                args.push(self.parse_or()?);
            }
        }
        self.expect(XpTokenKind::RParen, "\")\"")?;
        let (min, max) = func.arity();
        if args.len() < min || args.len() > max {
            return Err(Error::syntax(format!(
                "function \"{}\" called with {} argument(s)",
                name.text,
                args.len()
            )));
        }
        Ok(Expr::Call(func, args))
    }
}

fn descendant_or_self_step() -> Step {
    Step { axis: Axis::DescendantOrSelf, test: NodeTest::AnyNode, predicates: vec![] }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<XPathExpr> {
        let mut interner = Interner::new();
        parse_xpath(&mut interner, text)
    }

    #[test]
    fn test_absolute_path() {
        let expr = parse("/a:top/child").unwrap();
        match expr.root {
            Expr::Path(p) => {
                assert_eq!(p.start, PathStart::Root);
                assert_eq!(p.steps.len(), 2);
                match &p.steps[0].test {
                    NodeTest::Name { prefix, name } => {
                        assert_eq!(prefix.as_deref(), Some("a"));
                        assert_eq!(&**name, "top");
                    }
                    other => panic!("unexpected test {other:?}"),
                }
            }
            other => panic!("unexpected expr {other:?}"),
        }
    }

    #[test]
    fn test_relative_path_with_parent() {
        let expr = parse("../l = 'right'").unwrap();
        match expr.root {
            Expr::Equality(EqOp::Eq, lhs, rhs) => {
                assert!(matches!(*lhs, Expr::Path(_)));
                assert!(matches!(*rhs, Expr::Literal(_)));
            }
            other => panic!("unexpected expr {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        // or is the loosest binder
        let expr = parse("a = 1 or b = 2 and c = 3").unwrap();
        assert!(matches!(expr.root, Expr::Or(..)));

        let expr = parse("1 + 2 * 3").unwrap();
        match expr.root {
            Expr::Arith(ArithOp::Add, _, rhs) => {
                assert!(matches!(*rhs, Expr::Arith(ArithOp::Mul, ..)));
            }
            other => panic!("unexpected expr {other:?}"),
        }
    }

    #[test]
    fn test_function_call() {
        let expr = parse("derived-from-or-self(type, 'ex:base')").unwrap();
        match expr.root {
            Expr::Call(Func::DerivedFromOrSelf, args) => assert_eq!(args.len(), 2),
            other => panic!("unexpected expr {other:?}"),
        }
    }

    #[test]
    fn test_deref_with_trailing_path() {
        let expr = parse("deref(../ref)/../name").unwrap();
        match expr.root {
            Expr::Path(p) => {
                assert!(matches!(p.start, PathStart::Expr(_)));
                assert_eq!(p.steps.len(), 2);
            }
            other => panic!("unexpected expr {other:?}"),
        }
    }

    #[test]
    fn test_predicates() {
        let expr = parse("/l[k='a'][position() < 3]").unwrap();
        match expr.root {
            Expr::Path(p) => assert_eq!(p.steps[0].predicates.len(), 2),
            other => panic!("unexpected expr {other:?}"),
        }
    }

    #[test]
    fn test_arity_checked() {
        assert!(parse("count()").is_err());
        assert!(parse("true(1)").is_err());
        assert!(parse("unknown-fn(1)").is_err());
    }

    #[test]
    fn test_trailing_garbage() {
        assert!(parse("a b").is_err());
    }

    #[test]
    fn test_double_slash_desugars() {
        let expr = parse("//name").unwrap();
        match expr.root {
            Expr::Path(p) => {
                assert_eq!(p.steps.len(), 2);
                assert_eq!(p.steps[0].axis, Axis::DescendantOrSelf);
            }
            other => panic!("unexpected expr {other:?}"),
        }
    }
}
