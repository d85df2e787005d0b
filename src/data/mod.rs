//! Instance data trees.
//!
//! A [`DataTree`] is an arena of typed nodes built by the XML/JSON parsers
//! or programmatically, validated against the compiled schema, and printed
//! back out. Node order follows the schema for containers/leaves and
//! insertion order within list and leaf-list instances.

mod diff;
mod json;
mod validate;
mod xml;

pub use diff::{DataDiff, DiffOp};

use bitflags::bitflags;

use crate::base::IStr;
use crate::context::Context;
use crate::error::{Diagnostics, Error, Result};
use crate::schema::value::{Value, ValueFmt};
use crate::schema::{SchemaSet, SnodeId, SnodeKind};
use crate::xpath::XpNode;

/// Index of a node within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataNodeId(pub u32);

/// Input/output encodings for instance data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Xml,
    Json,
}

bitflags! {
    /// Data parser options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParseOptions: u8 {
        /// Reject anything unknown; enforce key-before-other-children in XML.
        const STRICT = 0x01;
        /// Keep unknown or badly typed content as opaque nodes.
        const OPAQUE = 0x02;
        /// Reject `config false` nodes (config-only parsing).
        const NO_STATE = 0x04;
        /// Skip finalization/validation; parse only.
        const PARSE_ONLY = 0x08;
    }
}

bitflags! {
    /// Data validation options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ValidationOptions: u8 {
        /// Fail on `config false` nodes.
        const NO_STATE = 0x01;
        /// Collect every violation instead of stopping at the first.
        const COLLECT_ALL = 0x02;
    }
}

bitflags! {
    /// Data printer options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PrintOptions: u8 {
        /// No whitespace.
        const SHRINK = 0x01;
        /// Print the whole sibling set of the root, not just the first tree.
        const WITH_SIBLINGS = 0x02;
    }
}

/// With-defaults handling when printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WithDefaults {
    /// Print default-flagged nodes as ordinary nodes.
    #[default]
    Explicit,
    /// Omit default-flagged nodes.
    Trim,
    /// Print all defaults.
    All,
    /// Print all defaults, tagged with the defaults metadata attribute.
    AllTag,
    /// Tag only nodes that were defaulted implicitly.
    ImplicitTag,
}

/// Operation parse modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Rpc,
    Action,
    /// A reply is parsed as the output children of the given operation.
    Reply { request: SnodeId },
    Notification,
}

bitflags! {
    /// Per-node state flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DataFlags: u8 {
        /// Created by default insertion.
        const DEFAULT = 0x01;
        /// The node's when conditions evaluated true.
        const WHEN_TRUE = 0x02;
        /// Added since the last validation.
        const NEW = 0x04;
    }
}

/// Metadata attached to a data node (XML attribute / JSON `@` member),
/// namespaced by module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub module: IStr,
    pub name: IStr,
    pub value: IStr,
}

/// Opaque value of an anydata/anyxml node.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyValue {
    Xml(IStr),
    Json(IStr),
}

/// The physical node kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum DataNodeKind {
    /// Container, list entry or operation root.
    Inner,
    /// Leaf or leaf-list entry.
    Term { value: Value },
    /// anydata/anyxml payload.
    Any { value: AnyValue },
    /// Schema could not be resolved (opaque-allowed parsing).
    Opaq { name: IStr, module: Option<IStr>, value: IStr },
}

/// One node of a data tree.
#[derive(Debug, Clone)]
pub struct DataNode {
    /// `None` only for opaque nodes.
    pub schema: Option<SnodeId>,
    pub parent: Option<DataNodeId>,
    pub children: Vec<DataNodeId>,
    pub kind: DataNodeKind,
    pub flags: DataFlags,
    pub meta: Vec<Meta>,
    /// Resolved leafref / instance-identifier target.
    pub target: Option<DataNodeId>,
}

impl DataNode {
    pub fn value(&self) -> Option<&Value> {
        match &self.kind {
            DataNodeKind::Term { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_default(&self) -> bool {
        self.flags.contains(DataFlags::DEFAULT)
    }
}

/// An instance data tree (or forest: multiple top-level siblings).
#[derive(Debug, Clone, Default)]
pub struct DataTree {
    pub(crate) nodes: Vec<DataNode>,
    pub(crate) roots: Vec<DataNodeId>,
}

impl DataTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: DataNodeId) -> &DataNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: DataNodeId) -> &mut DataNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn roots(&self) -> &[DataNodeId] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Allocate a node without linking it anywhere yet.
    pub(crate) fn alloc(&mut self, node: DataNode) -> DataNodeId {
        let id = DataNodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Link a node under its parent (or as a root), keeping schema order
    /// across sibling groups and insertion order within a group.
    pub(crate) fn link(&mut self, parent: Option<DataNodeId>, id: DataNodeId) {
        self.nodes[id.0 as usize].parent = parent;
        let rank = self.schema_rank(id);
        let siblings: &Vec<DataNodeId> = match parent {
            Some(p) => &self.nodes[p.0 as usize].children,
            None => &self.roots,
        };
        // Insert after the last sibling whose rank is <= ours.
        let mut at = siblings.len();
        for (i, &sib) in siblings.iter().enumerate() {
            if self.schema_rank(sib) > rank {
                at = i;
                break;
            }
        }
        match parent {
            Some(p) => self.nodes[p.0 as usize].children.insert(at, id),
            None => self.roots.insert(at, id),
        }
    }

    /// Position of a node's schema among its schema siblings. Schema nodes
    /// are allocated in declaration order, so the arena index doubles as
    /// the sibling rank; opaque nodes sort last.
    fn schema_rank(&self, id: DataNodeId) -> u32 {
        match self.nodes[id.0 as usize].schema {
            Some(snode) => snode.0,
            None => u32::MAX,
        }
    }

    /// Detach a subtree from its parent and drop it from iteration. The
    /// arena slots are retained; identity of other nodes is unaffected.
    pub(crate) fn unlink(&mut self, id: DataNodeId) {
        match self.nodes[id.0 as usize].parent {
            Some(p) => self.nodes[p.0 as usize].children.retain(|&c| c != id),
            None => self.roots.retain(|&c| c != id),
        }
        self.nodes[id.0 as usize].parent = None;
    }

    /// All linked nodes, depth-first.
    pub fn traverse(&self) -> Vec<DataNodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<DataNodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            for &c in self.node(id).children.iter().rev() {
                stack.push(c);
            }
        }
        out
    }

    /// Children of a node (or the roots) with the given schema node.
    pub fn children_by_schema(
        &self,
        parent: Option<DataNodeId>,
        schema: SnodeId,
    ) -> Vec<DataNodeId> {
        let children = match parent {
            Some(p) => &self.node(p).children,
            None => &self.roots,
        };
        children
            .iter()
            .copied()
            .filter(|&c| self.node(c).schema == Some(schema))
            .collect()
    }

    /// The data path of a node: `/mod:name[key='v']/...`.
    pub fn path(&self, set: &SchemaSet, id: DataNodeId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            let node = self.node(n);
            let part = match node.schema {
                Some(snode) => {
                    let sn = set.node(snode);
                    let needs_module = match self.parent_schema(n) {
                        Some(ps) => set.node(ps).module != sn.module,
                        None => true,
                    };
                    let mut text = if needs_module {
                        format!("{}:{}", set.module(sn.module).name, sn.name)
                    } else {
                        sn.name.to_string()
                    };
                    if let SnodeKind::List { keys, .. } = &sn.kind {
                        for &key in keys {
                            if let Some(kv) = self.child_term(n, key) {
                                text.push_str(&format!(
                                    "[{}='{}']",
                                    set.node(key).name,
                                    kv.to_lexical(set, ValueFmt::Json)
                                ));
                            }
                        }
                    }
                    text
                }
                None => match &node.kind {
                    DataNodeKind::Opaq { name, .. } => name.to_string(),
                    _ => "?".to_string(),
                },
            };
            parts.push(part);
            cur = node.parent;
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    fn parent_schema(&self, id: DataNodeId) -> Option<SnodeId> {
        self.node(id).parent.and_then(|p| self.node(p).schema)
    }

    /// The stored value of a direct child term with the given schema.
    pub fn child_term(&self, parent: DataNodeId, schema: SnodeId) -> Option<&Value> {
        self.node(parent)
            .children
            .iter()
            .find(|&&c| self.node(c).schema == Some(schema))
            .and_then(|&c| self.node(c).value())
    }

    // ------------------------------------------------------------------
    // Entry points (parse / print / validate / diff)
    // ------------------------------------------------------------------

    /// Parse a complete instance document.
    pub fn parse_str(
        ctx: &Context,
        text: &str,
        format: DataFormat,
        options: ParseOptions,
    ) -> Result<DataTree> {
        let mut tree = match format {
            DataFormat::Xml => xml::parse_xml(ctx, text, options, None)?,
            DataFormat::Json => json::parse_json(ctx, text, options, None)?,
        };
        if !options.contains(ParseOptions::PARSE_ONLY) {
            tree.finalize(ctx, options)?;
        }
        Ok(tree)
    }

    /// Parse an operation (rpc/action/notification/reply) subtree.
    pub fn parse_op_str(
        ctx: &Context,
        text: &str,
        format: DataFormat,
        op: OpKind,
    ) -> Result<DataTree> {
        let options = ParseOptions::default();
        let mut tree = match format {
            DataFormat::Xml => xml::parse_xml(ctx, text, options, Some(op))?,
            DataFormat::Json => json::parse_json(ctx, text, options, Some(op))?,
        };
        tree.finalize(ctx, options)?;
        Ok(tree)
    }

    /// Print to text.
    pub fn print_str(
        &self,
        ctx: &Context,
        format: DataFormat,
        options: PrintOptions,
        with_defaults: WithDefaults,
    ) -> Result<String> {
        match format {
            DataFormat::Xml => xml::print_xml(ctx, self, options, with_defaults),
            DataFormat::Json => json::print_json(ctx, self, options, with_defaults),
        }
    }

    /// Validate against the schema; strict mode returns the first error.
    pub fn validate(&mut self, ctx: &Context, options: ValidationOptions) -> Result<()> {
        let mut diag = Diagnostics::new();
        validate::validate_tree(self, ctx, options, &mut diag)?;
        diag.into_result()
    }

    /// Validate in collect-all mode, returning every violation.
    pub fn validate_collect(&mut self, ctx: &Context) -> Result<Diagnostics> {
        let mut diag = Diagnostics::new();
        validate::validate_tree(
            self,
            ctx,
            ValidationOptions::COLLECT_ALL,
            &mut diag,
        )?;
        Ok(diag)
    }

    /// Compare two trees, producing an ordered change list.
    pub fn diff(&self, ctx: &Context, other: &DataTree) -> DataDiff {
        diff::diff_trees(ctx, self, other)
    }

    /// Merge another tree into this one, transferring ownership of its
    /// subtrees. Matching containers/list entries merge recursively; terms
    /// are replaced.
    pub fn merge(&mut self, ctx: &Context, source: DataTree) -> Result<()> {
        let set = ctx.schema();
        let roots = source.roots.clone();
        for root in roots {
            self.merge_subtree(set, None, &source, root)?;
        }
        Ok(())
    }

    fn merge_subtree(
        &mut self,
        set: &SchemaSet,
        parent: Option<DataNodeId>,
        source: &DataTree,
        src: DataNodeId,
    ) -> Result<()> {
        let src_node = source.node(src);
        let existing = match src_node.schema {
            Some(snode) => {
                let candidates = self.children_by_schema(parent, snode);
                match &set.node(snode).kind {
                    SnodeKind::List { keys, .. } => candidates
                        .into_iter()
                        .find(|&c| keys.iter().all(|&k| {
                            self.child_term(c, k) == source.child_term(src, k)
                        })),
                    SnodeKind::LeafList { .. } => candidates
                        .into_iter()
                        .find(|&c| self.node(c).value() == src_node.value()),
                    _ => candidates.into_iter().next(),
                }
            }
            None => None,
        };
        match existing {
            Some(dst) => match &src_node.kind {
                DataNodeKind::Term { value } => {
                    let value = value.clone();
                    let flags = src_node.flags;
                    let dst_node = self.node_mut(dst);
                    dst_node.kind = DataNodeKind::Term { value };
                    dst_node.flags = flags;
                    Ok(())
                }
                _ => {
                    for &c in &src_node.children {
                        self.merge_subtree(set, Some(dst), source, c)?;
                    }
                    Ok(())
                }
            },
            None => {
                self.copy_subtree(parent, source, src);
                Ok(())
            }
        }
    }

    fn copy_subtree(
        &mut self,
        parent: Option<DataNodeId>,
        source: &DataTree,
        src: DataNodeId,
    ) -> DataNodeId {
        let src_node = source.node(src).clone();
        let id = self.alloc(DataNode {
            schema: src_node.schema,
            parent: None,
            children: Vec::new(),
            kind: src_node.kind,
            flags: src_node.flags,
            meta: src_node.meta,
            target: None,
        });
        self.link(parent, id);
        for &c in &source.node(src).children {
            self.copy_subtree(Some(id), source, c);
        }
        id
    }

    /// Post-parse finalization: store resolved already during parse; here
    /// we resolve leafref/instance-identifier targets.
    pub(crate) fn finalize(&mut self, ctx: &Context, options: ParseOptions) -> Result<()> {
        validate::resolve_references(self, ctx, options)
    }
}

/// XPath adapter over data trees. `id == None` is the virtual root.
#[derive(Clone)]
pub struct DataRef<'a> {
    pub tree: &'a DataTree,
    pub set: &'a SchemaSet,
    pub id: Option<DataNodeId>,
}

impl<'a> DataRef<'a> {
    pub fn root(tree: &'a DataTree, set: &'a SchemaSet) -> Self {
        Self { tree, set, id: None }
    }

    pub fn at(tree: &'a DataTree, set: &'a SchemaSet, id: DataNodeId) -> Self {
        Self { tree, set, id: Some(id) }
    }
}

impl XpNode for DataRef<'_> {
    fn same(&self, other: &Self) -> bool {
        self.id == other.id
    }

    fn parent(&self) -> Option<Self> {
        let id = self.id?;
        Some(DataRef { tree: self.tree, set: self.set, id: self.tree.node(id).parent })
    }

    fn children(&self) -> Vec<Self> {
        let children = match self.id {
            Some(id) => &self.tree.node(id).children,
            None => &self.tree.roots,
        };
        children
            .iter()
            .map(|&c| DataRef { tree: self.tree, set: self.set, id: Some(c) })
            .collect()
    }

    fn name(&self) -> Option<IStr> {
        let node = self.tree.node(self.id?);
        match node.schema {
            Some(snode) => Some(self.set.node(snode).name.clone()),
            None => match &node.kind {
                DataNodeKind::Opaq { name, .. } => Some(name.clone()),
                _ => None,
            },
        }
    }

    fn module_name(&self) -> Option<IStr> {
        let node = self.tree.node(self.id?);
        let snode = node.schema?;
        Some(self.set.module(self.set.node(snode).module).name.clone())
    }

    fn string_value(&self) -> String {
        let Some(id) = self.id else { return String::new() };
        match &self.tree.node(id).kind {
            DataNodeKind::Term { value } => value.to_lexical(self.set, ValueFmt::Json),
            DataNodeKind::Opaq { value, .. } => value.to_string(),
            _ => {
                // Inner node: concatenation of term descendants.
                let mut out = String::new();
                let mut stack: Vec<DataNodeId> =
                    self.tree.node(id).children.iter().rev().copied().collect();
                while let Some(c) = stack.pop() {
                    if let DataNodeKind::Term { value } = &self.tree.node(c).kind {
                        out.push_str(&value.to_lexical(self.set, ValueFmt::Json));
                    }
                    stack.extend(self.tree.node(c).children.iter().rev().copied());
                }
                out
            }
        }
    }

    fn typed_value(&self) -> Option<Value> {
        self.tree.node(self.id?).value().cloned()
    }

    fn deref_target(&self) -> Option<Self> {
        let target = self.tree.node(self.id?).target?;
        Some(DataRef { tree: self.tree, set: self.set, id: Some(target) })
    }

    fn is_term(&self) -> bool {
        self.id
            .is_some_and(|id| matches!(self.tree.node(id).kind, DataNodeKind::Term { .. }))
    }
}

/// The validator reports constraint failures with this shape.
pub(crate) fn constraint_error(message: String, path: String) -> Error {
    Error::Constraint { message, path: Some(path), app_tag: None }
}

/// Should a node be omitted from output under this with-defaults mode?
pub(crate) fn skip_for_defaults(
    set: &SchemaSet,
    tree: &DataTree,
    id: DataNodeId,
    wd: WithDefaults,
) -> bool {
    match wd {
        WithDefaults::Explicit => tree.node(id).is_default(),
        WithDefaults::Trim => is_default_equivalent(set, tree, id),
        _ => false,
    }
}

/// Should a node be tagged as defaulted under this with-defaults mode?
pub(crate) fn tag_for_defaults(
    set: &SchemaSet,
    tree: &DataTree,
    id: DataNodeId,
    wd: WithDefaults,
) -> bool {
    match wd {
        WithDefaults::AllTag => is_default_equivalent(set, tree, id),
        WithDefaults::ImplicitTag => tree.node(id).is_default(),
        _ => false,
    }
}

/// Default-flagged, or a leaf whose value equals its schema default.
fn is_default_equivalent(set: &SchemaSet, tree: &DataTree, id: DataNodeId) -> bool {
    let node = tree.node(id);
    if node.is_default() {
        return true;
    }
    let Some(snode) = node.schema else { return false };
    match (&set.node(snode).kind, node.value()) {
        (SnodeKind::Leaf { default: Some(d), .. }, Some(v)) => d == v,
        _ => false,
    }
}
