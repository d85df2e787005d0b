//! XPath evaluation over a pluggable node model.
//!
//! The same evaluator runs over schema nodes (compile-time checks) and data
//! nodes (`when`/`must`/`leafref`/`unique`): the tree shape comes in through
//! [`XpNode`], identity and module information through the schema set.

use std::cmp::Ordering;

use crate::base::IStr;
use crate::error::{Error, Result};
use crate::schema::value::Value;
use crate::schema::{PrefixMap, SchemaSet};
use crate::xpath::{ArithOp, Axis, EqOp, Expr, Func, NodeTest, PathExpr, PathStart, RelOp, Step, XPathExpr};

/// Node-model adapter: the minimum the evaluator needs from a tree.
pub trait XpNode: Clone {
    /// Node identity (not value equality).
    fn same(&self, other: &Self) -> bool;
    fn parent(&self) -> Option<Self>;
    fn children(&self) -> Vec<Self>;
    /// `None` for the virtual document root.
    fn name(&self) -> Option<IStr>;
    /// Owning module name.
    fn module_name(&self) -> Option<IStr>;
    /// XPath string-value (canonical leaf value; "" where undefined).
    fn string_value(&self) -> String;
    /// The stored typed value, for term nodes.
    fn typed_value(&self) -> Option<Value>;
    /// Leafref / instance-identifier resolution target, if known.
    fn deref_target(&self) -> Option<Self>;
    /// Is this a term (leaf-like) node? Used by `text()`.
    fn is_term(&self) -> bool;
}

/// One of the four XPath value types.
#[derive(Debug, Clone)]
pub enum XpValue<N> {
    NodeSet(Vec<N>),
    Bool(bool),
    Num(f64),
    Str(String),
}

impl<N: XpNode> XpValue<N> {
    pub fn into_bool(self) -> bool {
        match self {
            XpValue::NodeSet(ns) => !ns.is_empty(),
            XpValue::Bool(b) => b,
            XpValue::Num(n) => n != 0.0 && !n.is_nan(),
            XpValue::Str(s) => !s.is_empty(),
        }
    }

    pub fn into_number(self) -> f64 {
        match self {
            XpValue::NodeSet(_) => str_to_number(&self.into_string()),
            XpValue::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            XpValue::Num(n) => n,
            XpValue::Str(s) => str_to_number(&s),
        }
    }

    pub fn into_string(self) -> String {
        match self {
            XpValue::NodeSet(ns) => ns.first().map(|n| n.string_value()).unwrap_or_default(),
            XpValue::Bool(b) => b.to_string(),
            XpValue::Num(n) => format_number(n),
            XpValue::Str(s) => s,
        }
    }
}

fn str_to_number(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// XPath number-to-string: integers without a decimal point.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Evaluation environment: schema tables, prefix resolver, anchors.
pub struct Eval<'a, N> {
    pub set: &'a SchemaSet,
    /// Prefix → module name, captured from the expression's defining module.
    pub prefixes: &'a PrefixMap,
    /// The virtual document root.
    pub root: N,
    /// The initial context node (`current()`).
    pub current: N,
}

struct Ctx<N> {
    node: N,
    position: usize,
    size: usize,
}

impl<'a, N: XpNode> Eval<'a, N> {
    /// Evaluate a compiled expression with the initial context node.
    pub fn eval(&self, expr: &XPathExpr) -> Result<XpValue<N>> {
        let ctx = Ctx { node: self.current.clone(), position: 1, size: 1 };
        self.eval_expr(&expr.root, &ctx)
    }

    /// Evaluate and coerce to boolean.
    pub fn eval_bool(&self, expr: &XPathExpr) -> Result<bool> {
        Ok(self.eval(expr)?.into_bool())
    }

    fn eval_expr(&self, expr: &Expr, ctx: &Ctx<N>) -> Result<XpValue<N>> {
        match expr {
            Expr::Or(a, b) => {
                let lhs = self.eval_expr(a, ctx)?.into_bool();
                Ok(XpValue::Bool(lhs || self.eval_expr(b, ctx)?.into_bool()))
            }
            Expr::And(a, b) => {
                let lhs = self.eval_expr(a, ctx)?.into_bool();
                Ok(XpValue::Bool(lhs && self.eval_expr(b, ctx)?.into_bool()))
            }
            Expr::Equality(op, a, b) => {
                let lhs = self.eval_expr(a, ctx)?;
                let rhs = self.eval_expr(b, ctx)?;
                Ok(XpValue::Bool(self.compare_eq(*op, lhs, rhs)))
            }
            Expr::Relational(op, a, b) => {
                let lhs = self.eval_expr(a, ctx)?;
                let rhs = self.eval_expr(b, ctx)?;
                Ok(XpValue::Bool(self.compare_rel(*op, lhs, rhs)))
            }
            Expr::Arith(op, a, b) => {
                let lhs = self.eval_expr(a, ctx)?.into_number();
                let rhs = self.eval_expr(b, ctx)?.into_number();
                Ok(XpValue::Num(match op {
                    ArithOp::Add => lhs + rhs,
                    ArithOp::Sub => lhs - rhs,
                    ArithOp::Mul => lhs * rhs,
                    ArithOp::Div => lhs / rhs,
                    ArithOp::Mod => lhs % rhs,
                }))
            }
            Expr::Neg(a) => Ok(XpValue::Num(-self.eval_expr(a, ctx)?.into_number())),
            Expr::Union(a, b) => {
                let mut lhs = self.node_set(self.eval_expr(a, ctx)?)?;
                let rhs = self.node_set(self.eval_expr(b, ctx)?)?;
                for node in rhs {
                    if !lhs.iter().any(|n| n.same(&node)) {
                        lhs.push(node);
                    }
                }
                Ok(XpValue::NodeSet(lhs))
            }
            Expr::Literal(s) => Ok(XpValue::Str(s.to_string())),
            Expr::Number(n) => Ok(XpValue::Num(*n)),
            Expr::Call(func, args) => self.eval_call(*func, args, ctx),
            Expr::Path(path) => Ok(XpValue::NodeSet(self.eval_path(path, ctx)?)),
        }
    }

    fn node_set(&self, v: XpValue<N>) -> Result<Vec<N>> {
        match v {
            XpValue::NodeSet(ns) => Ok(ns),
            _ => Err(Error::semantic("expression is not a node set")),
        }
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    fn eval_path(&self, path: &PathExpr, ctx: &Ctx<N>) -> Result<Vec<N>> {
        let mut nodes: Vec<N> = match &path.start {
            PathStart::Root => vec![self.root.clone()],
            PathStart::Current => vec![ctx.node.clone()],
            PathStart::Expr(primary) => self.node_set(self.eval_expr(primary, ctx)?)?,
        };
        for step in &path.steps {
            nodes = self.eval_step(&nodes, step)?;
        }
        Ok(nodes)
    }

    fn eval_step(&self, input: &[N], step: &Step) -> Result<Vec<N>> {
        let mut out: Vec<N> = Vec::new();
        for node in input {
            for candidate in self.apply_axis(node, step.axis) {
                if self.test_matches(&candidate, &step.test)
                    && !out.iter().any(|n| n.same(&candidate))
                {
                    out.push(candidate);
                }
            }
        }
        for predicate in &step.predicates {
            out = self.filter_predicate(out, predicate)?;
        }
        Ok(out)
    }

    fn apply_axis(&self, node: &N, axis: Axis) -> Vec<N> {
        match axis {
            Axis::Child => node.children(),
            Axis::Parent => node.parent().into_iter().collect(),
            Axis::SelfAxis => vec![node.clone()],
            Axis::Descendant => {
                let mut out = Vec::new();
                collect_descendants(node, &mut out);
                out
            }
            Axis::DescendantOrSelf => {
                let mut out = vec![node.clone()];
                collect_descendants(node, &mut out);
                out
            }
        }
    }

    fn test_matches(&self, node: &N, test: &NodeTest) -> bool {
        match test {
            NodeTest::AnyNode => true,
            NodeTest::Text => node.is_term(),
            NodeTest::Any => node.name().is_some(),
            NodeTest::Name { prefix, name } => {
                let Some(node_name) = node.name() else { return false };
                if let Some(prefix) = prefix {
                    let Some(module) = self.prefixes.get(prefix) else { return false };
                    if node.module_name().as_deref() != Some(&**module) {
                        return false;
                    }
                    if &**name == "*" {
                        return true;
                    }
                }
                node_name == *name
            }
        }
    }

    fn filter_predicate(&self, nodes: Vec<N>, predicate: &Expr) -> Result<Vec<N>> {
        let size = nodes.len();
        let mut out = Vec::new();
        for (i, node) in nodes.into_iter().enumerate() {
            let ctx = Ctx { node: node.clone(), position: i + 1, size };
            let keep = match self.eval_expr(predicate, &ctx)? {
                // A numeric predicate selects by position.
                XpValue::Num(n) => (i + 1) as f64 == n,
                other => other.into_bool(),
            };
            if keep {
                out.push(node);
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Comparisons
    // ------------------------------------------------------------------

    fn compare_eq(&self, op: EqOp, lhs: XpValue<N>, rhs: XpValue<N>) -> bool {
        let invert = op == EqOp::Ne;
        match (lhs, rhs) {
            (XpValue::NodeSet(a), XpValue::NodeSet(b)) => {
                let bs: Vec<String> = b.iter().map(|n| n.string_value()).collect();
                a.iter()
                    .any(|n| bs.iter().any(|s| (n.string_value() == *s) != invert))
            }
            (XpValue::NodeSet(ns), other) | (other, XpValue::NodeSet(ns)) => match other {
                XpValue::Num(v) => ns
                    .iter()
                    .any(|n| (str_to_number(&n.string_value()) == v) != invert),
                XpValue::Bool(v) => (!ns.is_empty() == v) != invert,
                _ => {
                    let s = other.into_string();
                    ns.iter().any(|n| (n.string_value() == s) != invert)
                }
            },
            (XpValue::Bool(a), b) => (a == b.into_bool()) != invert,
            (a, XpValue::Bool(b)) => (a.into_bool() == b) != invert,
            (XpValue::Num(a), b) => (a == b.into_number()) != invert,
            (a, XpValue::Num(b)) => (a.into_number() == b) != invert,
            (XpValue::Str(a), XpValue::Str(b)) => (a == b) != invert,
        }
    }

    fn compare_rel(&self, op: RelOp, lhs: XpValue<N>, rhs: XpValue<N>) -> bool {
        let cmp_ok = |o: Ordering| match op {
            RelOp::Lt => o == Ordering::Less,
            RelOp::Le => o != Ordering::Greater,
            RelOp::Gt => o == Ordering::Greater,
            RelOp::Ge => o != Ordering::Less,
        };
        let num_cmp = |a: f64, b: f64| a.partial_cmp(&b).is_some_and(cmp_ok);
        match (lhs, rhs) {
            (XpValue::NodeSet(a), XpValue::NodeSet(b)) => a.iter().any(|x| {
                b.iter().any(|y| {
                    num_cmp(
                        str_to_number(&x.string_value()),
                        str_to_number(&y.string_value()),
                    )
                })
            }),
            (XpValue::NodeSet(ns), other) => {
                let v = other.into_number();
                ns.iter().any(|n| num_cmp(str_to_number(&n.string_value()), v))
            }
            (other, XpValue::NodeSet(ns)) => {
                let v = other.into_number();
                ns.iter().any(|n| num_cmp(v, str_to_number(&n.string_value())))
            }
            (a, b) => num_cmp(a.into_number(), b.into_number()),
        }
    }

    // ------------------------------------------------------------------
    // Function library
    // ------------------------------------------------------------------

    fn eval_call(&self, func: Func, args: &[Expr], ctx: &Ctx<N>) -> Result<XpValue<N>> {
        let arg = |i: usize| -> Result<XpValue<N>> { self.eval_expr(&args[i], ctx) };
        let arg_or_ctx_string = |i: usize| -> Result<String> {
            if args.len() > i { Ok(arg(i)?.into_string()) } else { Ok(ctx.node.string_value()) }
        };

        Ok(match func {
            Func::Position => XpValue::Num(ctx.position as f64),
            Func::Last => XpValue::Num(ctx.size as f64),
            Func::Count => XpValue::Num(self.node_set(arg(0)?)?.len() as f64),
            Func::Current => XpValue::NodeSet(vec![self.current.clone()]),
            Func::Deref => {
                let ns = self.node_set(arg(0)?)?;
                let target = ns.first().and_then(|n| n.deref_target());
                XpValue::NodeSet(target.into_iter().collect())
            }
            Func::DerivedFrom => self.derived_from(args, ctx, false)?,
            Func::DerivedFromOrSelf => self.derived_from(args, ctx, true)?,
            Func::EnumValue => {
                let ns = self.node_set(arg(0)?)?;
                let num = ns
                    .first()
                    .and_then(|n| n.typed_value())
                    .and_then(|v| match unwrap_union(v) {
                        Value::Enum { value, .. } => Some(value as f64),
                        _ => None,
                    })
                    .unwrap_or(f64::NAN);
                XpValue::Num(num)
            }
            Func::BitIsSet => {
                let ns = self.node_set(arg(0)?)?;
                let bit = arg(1)?.into_string();
                let set = ns
                    .first()
                    .and_then(|n| n.typed_value())
                    .is_some_and(|v| match unwrap_union(v) {
                        Value::Bits { names } => names.iter().any(|n| &**n == bit),
                        _ => false,
                    });
                XpValue::Bool(set)
            }
            Func::ReMatch => {
                let subject = arg(0)?.into_string();
                let pattern = arg(1)?.into_string();
                let regex = crate::schema::types::compile_pattern(&pattern)?;
                XpValue::Bool(regex.is_match(&subject))
            }
            Func::String => XpValue::Str(arg_or_ctx_string(0)?),
            Func::Number => {
                if args.is_empty() {
                    XpValue::Num(str_to_number(&ctx.node.string_value()))
                } else {
                    XpValue::Num(arg(0)?.into_number())
                }
            }
            Func::Boolean => XpValue::Bool(arg(0)?.into_bool()),
            Func::Not => XpValue::Bool(!arg(0)?.into_bool()),
            Func::True => XpValue::Bool(true),
            Func::False => XpValue::Bool(false),
            Func::StartsWith => {
                XpValue::Bool(arg(0)?.into_string().starts_with(&arg(1)?.into_string()))
            }
            Func::Contains => {
                XpValue::Bool(arg(0)?.into_string().contains(&arg(1)?.into_string()))
            }
            Func::Substring => self.substring(args, ctx)?,
            Func::SubstringBefore => {
                let s = arg(0)?.into_string();
                let sep = arg(1)?.into_string();
                XpValue::Str(s.split_once(&sep).map(|(a, _)| a.to_string()).unwrap_or_default())
            }
            Func::SubstringAfter => {
                let s = arg(0)?.into_string();
                let sep = arg(1)?.into_string();
                XpValue::Str(s.split_once(&sep).map(|(_, b)| b.to_string()).unwrap_or_default())
            }
            Func::StringLength => {
                XpValue::Num(arg_or_ctx_string(0)?.chars().count() as f64)
            }
            Func::NormalizeSpace => {
                let s = arg_or_ctx_string(0)?;
                XpValue::Str(s.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            Func::Translate => {
                let s = arg(0)?.into_string();
                let from: Vec<char> = arg(1)?.into_string().chars().collect();
                let to: Vec<char> = arg(2)?.into_string().chars().collect();
                let translated: String = s
                    .chars()
                    .filter_map(|c| match from.iter().position(|&f| f == c) {
                        Some(i) => to.get(i).copied(),
                        None => Some(c),
                    })
                    .collect();
                XpValue::Str(translated)
            }
            Func::Concat => {
                let mut out = String::new();
                for (i, _) in args.iter().enumerate() {
                    out.push_str(&arg(i)?.into_string());
                }
                XpValue::Str(out)
            }
            Func::Name | Func::LocalName => {
                let node = if args.is_empty() {
                    Some(ctx.node.clone())
                } else {
                    self.node_set(arg(0)?)?.into_iter().next()
                };
                let s = node
                    .and_then(|n| {
                        let name = n.name()?;
                        Some(match (func, n.module_name()) {
                            (Func::Name, Some(module)) => format!("{module}:{name}"),
                            _ => name.to_string(),
                        })
                    })
                    .unwrap_or_default();
                XpValue::Str(s)
            }
            Func::NamespaceUri => {
                let node = if args.is_empty() {
                    Some(ctx.node.clone())
                } else {
                    self.node_set(arg(0)?)?.into_iter().next()
                };
                let uri = node
                    .and_then(|n| n.module_name())
                    .and_then(|m| self.set.find_module(&m))
                    .map(|id| self.set.module(id).namespace.to_string())
                    .unwrap_or_default();
                XpValue::Str(uri)
            }
        })
    }

    fn substring(&self, args: &[Expr], ctx: &Ctx<N>) -> Result<XpValue<N>> {
        let s = self.eval_expr(&args[0], ctx)?.into_string();
        let chars: Vec<char> = s.chars().collect();
        let start = self.eval_expr(&args[1], ctx)?.into_number();
        let len = if args.len() > 2 {
            self.eval_expr(&args[2], ctx)?.into_number()
        } else {
            f64::INFINITY
        };
        if start.is_nan() || len.is_nan() {
            return Ok(XpValue::Str(String::new()));
        }
        let start = start.round();
        let end = if len.is_infinite() { f64::INFINITY } else { start + len.round() };
        let out: String = chars
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let pos = (*i + 1) as f64;
                pos >= start && pos < end
            })
            .map(|(_, c)| c)
            .collect();
        Ok(XpValue::Str(out))
    }

    fn derived_from(&self, args: &[Expr], ctx: &Ctx<N>, or_self: bool) -> Result<XpValue<N>> {
        let ns = self.node_set(self.eval_expr(&args[0], ctx)?)?;
        let name = self.eval_expr(&args[1], ctx)?.into_string();
        let (qualifier, ident_name) = match name.split_once(':') {
            Some((q, n)) => (Some(q.to_string()), n.to_string()),
            None => (None, name),
        };
        let module_name = match qualifier {
            Some(q) => match self.prefixes.get(q.as_str()) {
                Some(m) => m.clone(),
                // JSON-form module name.
                None => IStr::from(q.as_str()),
            },
            None => return Ok(XpValue::Bool(false)),
        };
        let Some(module) = self.set.find_module(&module_name) else {
            return Ok(XpValue::Bool(false));
        };
        let Some(base) = self.set.find_identity(module, &ident_name) else {
            return Ok(XpValue::Bool(false));
        };
        let result = ns.iter().any(|n| {
            n.typed_value().is_some_and(|v| match unwrap_union(v) {
                Value::IdentityRef { identity, .. } => {
                    (or_self && identity == base)
                        || self.set.identity(base).derived.contains(&identity)
                }
                _ => false,
            })
        });
        Ok(XpValue::Bool(result))
    }
}

fn unwrap_union(v: Value) -> Value {
    match v {
        Value::Union(inner) => unwrap_union(*inner),
        other => other,
    }
}

fn collect_descendants<N: XpNode>(node: &N, out: &mut Vec<N>) {
    for child in node.children() {
        out.push(child.clone());
        collect_descendants(&child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn test_str_to_number() {
        assert_eq!(str_to_number(" 12 "), 12.0);
        assert!(str_to_number("x").is_nan());
    }
}
