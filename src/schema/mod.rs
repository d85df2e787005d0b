//! Compiled YANG schema.
//!
//! The compiler resolves a parsed module (plus its import closure) into the
//! structures here: every reference linked, types fully specified, `uses`
//! expanded, augments and deviations applied. Nodes live in an arena owned
//! by the context and refer to each other by index, so the whole set can be
//! cloned cheaply into a staging copy and committed atomically.

pub mod compile;
pub mod printer;
pub mod types;
pub mod value;

use std::sync::Arc;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::base::IStr;
use crate::parser::YangVersion;
use crate::schema::types::CompiledType;
use crate::schema::value::Value;
use crate::xpath::XPathExpr;

/// Index of a compiled module in the schema set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u32);

/// Index of a schema node in the schema set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnodeId(pub u32);

/// Index of an identity in the schema set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityId(pub u32);

/// Prefix resolver: prefix → module name, captured from the defining
/// module's imports at compile time.
pub type PrefixMap = FxHashMap<IStr, IStr>;

bitflags! {
    /// Per-node boolean properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SchemaFlags: u16 {
        /// `config true` (inherited).
        const CONFIG = 0x01;
        /// `mandatory true`.
        const MANDATORY = 0x02;
        /// Presence container.
        const PRESENCE = 0x04;
        /// `ordered-by user`.
        const USER_ORDERED = 0x08;
        /// This leaf is a list key.
        const KEY = 0x10;
    }
}

/// `status` of a schema node or identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Status {
    #[default]
    Current,
    Deprecated,
    Obsolete,
}

impl Status {
    pub fn parse(s: &str) -> Option<Status> {
        match s {
            "current" => Some(Status::Current),
            "deprecated" => Some(Status::Deprecated),
            "obsolete" => Some(Status::Obsolete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Current => "current",
            Status::Deprecated => "deprecated",
            Status::Obsolete => "obsolete",
        }
    }
}

/// A compiled `when` condition.
#[derive(Debug, Clone)]
pub struct WhenCond {
    pub expr: XPathExpr,
    pub prefixes: Arc<PrefixMap>,
}

/// A compiled `must` constraint.
#[derive(Debug, Clone)]
pub struct MustCond {
    pub expr: XPathExpr,
    pub prefixes: Arc<PrefixMap>,
    pub error_message: Option<IStr>,
    pub error_app_tag: Option<IStr>,
}

/// One `unique` constraint: the tuple of referenced descendant leaves.
#[derive(Debug, Clone)]
pub struct Unique {
    pub leaves: Vec<SnodeId>,
    /// Original argument text, for error messages.
    pub text: IStr,
}

/// The nine schema node kinds plus operation input/output.
#[derive(Debug, Clone)]
pub enum SnodeKind {
    Container {
        presence: bool,
    },
    Leaf {
        typ: CompiledType,
        default: Option<Value>,
        units: Option<IStr>,
    },
    LeafList {
        typ: CompiledType,
        defaults: Vec<Value>,
        units: Option<IStr>,
        min_elements: u32,
        max_elements: Option<u32>,
    },
    List {
        keys: Vec<SnodeId>,
        uniques: Vec<Unique>,
        min_elements: u32,
        max_elements: Option<u32>,
    },
    Choice {
        default_case: Option<SnodeId>,
    },
    Case,
    AnyData,
    AnyXml,
    Rpc,
    Action,
    Input,
    Output,
    Notification,
}

impl SnodeKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            SnodeKind::Container { .. } => "container",
            SnodeKind::Leaf { .. } => "leaf",
            SnodeKind::LeafList { .. } => "leaf-list",
            SnodeKind::List { .. } => "list",
            SnodeKind::Choice { .. } => "choice",
            SnodeKind::Case => "case",
            SnodeKind::AnyData => "anydata",
            SnodeKind::AnyXml => "anyxml",
            SnodeKind::Rpc => "rpc",
            SnodeKind::Action => "action",
            SnodeKind::Input => "input",
            SnodeKind::Output => "output",
            SnodeKind::Notification => "notification",
        }
    }
}

/// A compiled schema node.
///
/// The base fields are shared by all kinds; kind-specific payload lives in
/// [`SnodeKind`].
#[derive(Debug, Clone)]
pub struct SchemaNode {
    /// Module whose namespace qualifies this node (for `uses` expansions,
    /// the using module; for augments, the augmenting module).
    pub module: ModuleId,
    pub parent: Option<SnodeId>,
    pub name: IStr,
    pub kind: SnodeKind,
    pub flags: SchemaFlags,
    pub status: Status,
    pub description: Option<IStr>,
    pub reference: Option<IStr>,
    pub when: Option<WhenCond>,
    pub musts: Vec<MustCond>,
    pub children: Vec<SnodeId>,
}

impl SchemaNode {
    pub fn is_config(&self) -> bool {
        self.flags.contains(SchemaFlags::CONFIG)
    }

    pub fn is_mandatory(&self) -> bool {
        self.flags.contains(SchemaFlags::MANDATORY)
    }

    pub fn is_key(&self) -> bool {
        self.flags.contains(SchemaFlags::KEY)
    }

    pub fn is_user_ordered(&self) -> bool {
        self.flags.contains(SchemaFlags::USER_ORDERED)
    }

    /// Leaf or leaf-list type, if this node has one.
    pub fn typ(&self) -> Option<&CompiledType> {
        match &self.kind {
            SnodeKind::Leaf { typ, .. } | SnodeKind::LeafList { typ, .. } => Some(typ),
            _ => None,
        }
    }

    /// Does this node create a level in the data tree? Choice and case are
    /// schema-only.
    pub fn is_data_node(&self) -> bool {
        !matches!(self.kind, SnodeKind::Choice { .. } | SnodeKind::Case)
    }
}

/// An identity with its resolved bases and transitive derived set.
#[derive(Debug, Clone)]
pub struct Identity {
    pub module: ModuleId,
    pub name: IStr,
    pub bases: Vec<IdentityId>,
    /// All identities transitively derived from this one.
    pub derived: Vec<IdentityId>,
    pub status: Status,
}

/// A compiled module.
#[derive(Debug, Clone)]
pub struct SchemaModule {
    pub name: IStr,
    pub revision: Option<IStr>,
    pub namespace: IStr,
    pub prefix: IStr,
    pub yang_version: YangVersion,
    pub implemented: bool,
    /// Import prefix → imported module.
    pub imports: Vec<(IStr, ModuleId)>,
    /// Prefix resolver for XPath compiled in this module's context.
    pub prefixes: Arc<PrefixMap>,
    /// Features defined by this module (with submodules merged in).
    pub features: Vec<IStr>,
    pub identities: Vec<IdentityId>,
    /// Top-level data nodes in schema order.
    pub children: Vec<SnodeId>,
    pub rpcs: Vec<SnodeId>,
    pub notifications: Vec<SnodeId>,
}

/// The compiled tables: modules, nodes and identities.
///
/// Cloneable so compilation can stage changes and commit all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    pub modules: Vec<SchemaModule>,
    pub snodes: Vec<SchemaNode>,
    pub identities: Vec<Identity>,
}

impl SchemaSet {
    pub fn node(&self, id: SnodeId) -> &SchemaNode {
        &self.snodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: SnodeId) -> &mut SchemaNode {
        &mut self.snodes[id.0 as usize]
    }

    pub fn module(&self, id: ModuleId) -> &SchemaModule {
        &self.modules[id.0 as usize]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut SchemaModule {
        &mut self.modules[id.0 as usize]
    }

    pub fn identity(&self, id: IdentityId) -> &Identity {
        &self.identities[id.0 as usize]
    }

    pub fn push_node(&mut self, node: SchemaNode) -> SnodeId {
        let id = SnodeId(self.snodes.len() as u32);
        self.snodes.push(node);
        id
    }

    /// Find a compiled module by name (any revision; there is at most one).
    pub fn find_module(&self, name: &str) -> Option<ModuleId> {
        self.modules
            .iter()
            .position(|m| &*m.name == name)
            .map(|i| ModuleId(i as u32))
    }

    /// Find a compiled module by namespace URI.
    pub fn find_module_by_namespace(&self, ns: &str) -> Option<ModuleId> {
        self.modules
            .iter()
            .position(|m| &*m.namespace == ns)
            .map(|i| ModuleId(i as u32))
    }

    /// Top-level schema nodes of a module, including rpcs and notifications.
    pub fn top_level(&self, module: ModuleId) -> impl Iterator<Item = SnodeId> + '_ {
        let m = self.module(module);
        m.children
            .iter()
            .chain(m.rpcs.iter())
            .chain(m.notifications.iter())
            .copied()
    }

    /// Find a child by name among `parent`'s children (or a module's
    /// top-level nodes when `parent` is `None`), looking through choice and
    /// case levels the way data lookup does.
    pub fn find_data_child(
        &self,
        module: ModuleId,
        parent: Option<SnodeId>,
        child_module: ModuleId,
        name: &str,
    ) -> Option<SnodeId> {
        let children: Vec<SnodeId> = match parent {
            Some(p) => self.node(p).children.clone(),
            None => self.top_level(module).collect(),
        };
        self.find_in(&children, child_module, name)
    }

    /// Find a child by name within an explicit children list, looking
    /// through choice and case levels.
    pub fn find_in_children(
        &self,
        children: &[SnodeId],
        child_module: ModuleId,
        name: &str,
    ) -> Option<SnodeId> {
        self.find_in(children, child_module, name)
    }

    fn find_in(&self, children: &[SnodeId], child_module: ModuleId, name: &str) -> Option<SnodeId> {
        for &id in children {
            let node = self.node(id);
            match node.kind {
                SnodeKind::Choice { .. } | SnodeKind::Case => {
                    if let Some(found) = self.find_in(&node.children, child_module, name) {
                        return Some(found);
                    }
                }
                _ => {
                    if node.module == child_module && &*node.name == name {
                        return Some(id);
                    }
                }
            }
        }
        None
    }

    /// Schema path of a node: `/mod:name/name2`, with the module prefix
    /// repeated at module boundaries.
    pub fn schema_path(&self, id: SnodeId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            let node = self.node(n);
            let needs_module = match node.parent {
                Some(p) => self.node(p).module != node.module,
                None => true,
            };
            if needs_module {
                parts.push(format!("{}:{}", self.module(node.module).name, node.name));
            } else {
                parts.push(node.name.to_string());
            }
            cur = node.parent;
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Depth-first traversal of the subtree rooted at `id` (inclusive).
    pub fn traverse(&self, id: SnodeId) -> Vec<SnodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            for &c in self.node(n).children.iter().rev() {
                stack.push(c);
            }
        }
        out
    }

    /// Find an identity by defining module and name.
    pub fn find_identity(&self, module: ModuleId, name: &str) -> Option<IdentityId> {
        self.module(module)
            .identities
            .iter()
            .copied()
            .find(|&i| &*self.identity(i).name == name)
    }

    /// Is `id` the same as, or transitively derived from, `base`?
    pub fn identity_derived_or_self(&self, base: IdentityId, id: IdentityId) -> bool {
        base == id || self.identity(base).derived.contains(&id)
    }

    /// The ancestor chain of a node, nearest first, excluding the node.
    pub fn ancestors(&self, id: SnodeId) -> Vec<SnodeId> {
        let mut out = Vec::new();
        let mut cur = self.node(id).parent;
        while let Some(n) = cur {
            out.push(n);
            cur = self.node(n).parent;
        }
        out
    }
}
