//! JSON instance data per RFC 7951, with RFC 7952 `@` metadata members.

use serde_json::{Map, Value as Json};

use crate::base::IStr;
use crate::context::Context;
use crate::data::{
    AnyValue, DataFlags, DataNode, DataNodeId, DataNodeKind, DataTree, Meta, OpKind,
    ParseOptions, PrintOptions, WithDefaults,
};
use crate::error::{Error, Result};
use crate::schema::value::{Value, ValueFmt, store};
use crate::schema::{ModuleId, SchemaSet, SnodeId, SnodeKind};

pub(crate) fn parse_json(
    ctx: &Context,
    text: &str,
    options: ParseOptions,
    op: Option<OpKind>,
) -> Result<DataTree> {
    let root: Json = serde_json::from_str(text)?;
    let Json::Object(members) = root else {
        return Err(Error::syntax("JSON instance data must be an object"));
    };
    let mut parser = JsonParser { ctx, options, op, tree: DataTree::new() };
    parser.parse_members(&members, None, None)?;
    Ok(parser.tree)
}

struct JsonParser<'a> {
    ctx: &'a Context,
    options: ParseOptions,
    op: Option<OpKind>,
    tree: DataTree,
}

impl<'a> JsonParser<'a> {
    fn set(&self) -> &'a SchemaSet {
        self.ctx.schema()
    }

    /// Parse one object level: data members plus their `@` metadata.
    fn parse_members(
        &mut self,
        members: &Map<String, Json>,
        parent: Option<DataNodeId>,
        parent_lookup: Option<SnodeId>,
    ) -> Result<()> {
        // Metadata members pair with data members by name.
        let mut meta_members: Vec<(&str, &Json)> = Vec::new();
        for (key, value) in members {
            if let Some(rest) = key.strip_prefix('@') {
                if rest.is_empty() {
                    // Metadata of the enclosing node.
                    if let (Some(p), Json::Object(meta)) = (parent, value) {
                        let metas = self.parse_meta_object(meta)?;
                        self.tree.node_mut(p).meta.extend(metas);
                    }
                } else {
                    meta_members.push((rest, value));
                }
            }
        }

        for (key, value) in members {
            if key.starts_with('@') {
                continue;
            }
            let created = self.parse_member(key, value, parent, parent_lookup)?;
            if let Some((_, meta_value)) =
                meta_members.iter().find(|(name, _)| *name == key.as_str())
            {
                self.attach_meta(&created, meta_value)?;
            }
            // The metadata member may be module-qualified while the data
            // member is not (or vice versa); match the suffix too.
            else if let Some((_, meta_value)) = meta_members.iter().find(|(name, _)| {
                name.rsplit(':').next() == key.rsplit(':').next()
            }) {
                self.attach_meta(&created, meta_value)?;
            }
        }
        Ok(())
    }

    /// Resolve a member name to a schema node.
    fn resolve_member(
        &self,
        key: &str,
        parent: Option<DataNodeId>,
        parent_lookup: Option<SnodeId>,
    ) -> Result<Option<SnodeId>> {
        let set = self.set();
        let (module_name, name) = match key.split_once(':') {
            Some((m, n)) => (Some(m), n),
            None => (None, key),
        };
        let module = match module_name {
            Some(m) => Some(set.find_module(m).ok_or_else(|| {
                Error::not_found(format!("unknown module \"{m}\" in member \"{key}\""))
            })?),
            None => None,
        };
        match (parent, parent_lookup) {
            (_, Some(lookup)) => {
                let module = module.unwrap_or(set.node(lookup).module);
                Ok(set.find_data_child(module, Some(lookup), module, name))
            }
            (Some(p), None) => {
                let parent_snode = self.tree.node(p).schema.ok_or_else(|| {
                    Error::Internal("opaque parent in schema lookup".into())
                })?;
                let module = module.unwrap_or(set.node(parent_snode).module);
                Ok(set.find_data_child(module, Some(parent_snode), module, name))
            }
            (None, None) => {
                let Some(module) = module else {
                    return Err(Error::syntax(format!(
                        "top-level member \"{key}\" must be module-qualified"
                    )));
                };
                let m = set.module(module);
                Ok(match self.op {
                    None => set.find_in_children(&m.children, module, name),
                    Some(OpKind::Rpc) => set.find_in_children(&m.rpcs, module, name),
                    Some(OpKind::Action) => set.find_in_children(&m.children, module, name),
                    Some(OpKind::Notification) => {
                        set.find_in_children(&m.notifications, module, name)
                    }
                    Some(OpKind::Reply { request }) => {
                        let output = set.node(request).children.iter().copied().find(|&c| {
                            matches!(set.node(c).kind, SnodeKind::Output)
                        });
                        output.and_then(|o| set.find_data_child(module, Some(o), module, name))
                    }
                })
            }
        }
    }

    fn parse_member(
        &mut self,
        key: &str,
        value: &Json,
        parent: Option<DataNodeId>,
        parent_lookup: Option<SnodeId>,
    ) -> Result<Vec<DataNodeId>> {
        let set = self.set();
        let snode = self.resolve_member(key, parent, parent_lookup)?;
        let Some(snode) = snode else {
            if self.options.contains(ParseOptions::OPAQUE) {
                let id = self.alloc_opaque(key, value, parent);
                return Ok(vec![id]);
            }
            return Err(Error::not_found(format!(
                "member \"{key}\" does not match any schema node"
            )));
        };
        let sn = set.node(snode);
        if self.options.contains(ParseOptions::NO_STATE)
            && !sn.is_config()
            && !matches!(
                sn.kind,
                SnodeKind::Rpc | SnodeKind::Action | SnodeKind::Notification
            )
        {
            return Err(Error::value(format!(
                "state data node \"{key}\" in config-only parse"
            )));
        }

        let mut created = Vec::new();
        match &sn.kind {
            SnodeKind::Leaf { .. } => {
                created.push(self.alloc_term(snode, value, parent, key)?);
            }
            SnodeKind::LeafList { .. } => {
                let Json::Array(items) = value else {
                    return Err(Error::syntax(format!(
                        "leaf-list \"{key}\" expects an array"
                    )));
                };
                for item in items {
                    created.push(self.alloc_term(snode, item, parent, key)?);
                }
            }
            SnodeKind::List { .. } => {
                let Json::Array(items) = value else {
                    return Err(Error::syntax(format!("list \"{key}\" expects an array")));
                };
                for item in items {
                    let Json::Object(obj) = item else {
                        return Err(Error::syntax(format!(
                            "list \"{key}\" entries must be objects"
                        )));
                    };
                    let id = self.alloc_inner(snode, parent);
                    created.push(id);
                    self.parse_members(obj, Some(id), None)?;
                }
            }
            SnodeKind::AnyData | SnodeKind::AnyXml => {
                let id = self.tree.alloc(DataNode {
                    schema: Some(snode),
                    parent: None,
                    children: Vec::new(),
                    kind: DataNodeKind::Any {
                        value: AnyValue::Json(IStr::from(value.to_string().as_str())),
                    },
                    flags: DataFlags::NEW,
                    meta: Vec::new(),
                    target: None,
                });
                self.tree.link(parent, id);
                created.push(id);
            }
            SnodeKind::Rpc | SnodeKind::Action | SnodeKind::Notification => {
                let Json::Object(obj) = value else {
                    return Err(Error::syntax(format!(
                        "operation \"{key}\" expects an object"
                    )));
                };
                let id = self.alloc_inner(snode, parent);
                created.push(id);
                let lookup = match (&sn.kind, self.op) {
                    (SnodeKind::Notification, _) => Some(snode),
                    (_, Some(OpKind::Reply { .. })) => set
                        .node(snode)
                        .children
                        .iter()
                        .copied()
                        .find(|&c| matches!(set.node(c).kind, SnodeKind::Output)),
                    _ => set
                        .node(snode)
                        .children
                        .iter()
                        .copied()
                        .find(|&c| matches!(set.node(c).kind, SnodeKind::Input)),
                };
                self.parse_members(obj, Some(id), lookup)?;
            }
            _ => {
                // Container (or case-transparent inner node).
                let Json::Object(obj) = value else {
                    return Err(Error::syntax(format!(
                        "container \"{key}\" expects an object"
                    )));
                };
                let id = self.alloc_inner(snode, parent);
                created.push(id);
                self.parse_members(obj, Some(id), None)?;
            }
        }
        Ok(created)
    }

    fn alloc_inner(&mut self, snode: SnodeId, parent: Option<DataNodeId>) -> DataNodeId {
        let id = self.tree.alloc(DataNode {
            schema: Some(snode),
            parent: None,
            children: Vec::new(),
            kind: DataNodeKind::Inner,
            flags: DataFlags::NEW,
            meta: Vec::new(),
            target: None,
        });
        self.tree.link(parent, id);
        id
    }

    fn alloc_term(
        &mut self,
        snode: SnodeId,
        value: &Json,
        parent: Option<DataNodeId>,
        key: &str,
    ) -> Result<DataNodeId> {
        let set = self.set();
        let text = json_scalar_text(value)
            .ok_or_else(|| Error::syntax(format!("invalid value for \"{key}\"")))?;
        let sn = set.node(snode);
        let typ = sn.typ().expect("term node has a type").clone();
        let prefixes = set.module(sn.module).prefixes.clone();
        match store(set, &prefixes, &typ, &text, ValueFmt::Json) {
            Ok(stored) => {
                let id = self.tree.alloc(DataNode {
                    schema: Some(snode),
                    parent: None,
                    children: Vec::new(),
                    kind: DataNodeKind::Term { value: stored },
                    flags: DataFlags::NEW,
                    meta: Vec::new(),
                    target: None,
                });
                self.tree.link(parent, id);
                Ok(id)
            }
            Err(_) if self.options.contains(ParseOptions::OPAQUE) => {
                Ok(self.alloc_opaque(key, value, parent))
            }
            Err(e) => Err(e.with_path(format!("/{key}"))),
        }
    }

    fn alloc_opaque(&mut self, key: &str, value: &Json, parent: Option<DataNodeId>) -> DataNodeId {
        let (module, name) = match key.split_once(':') {
            Some((m, n)) => (Some(IStr::from(m)), n),
            None => (None, key),
        };
        let id = self.tree.alloc(DataNode {
            schema: None,
            parent: None,
            children: Vec::new(),
            kind: DataNodeKind::Opaq {
                name: IStr::from(name),
                module,
                value: IStr::from(value.to_string().as_str()),
            },
            flags: DataFlags::NEW,
            meta: Vec::new(),
            target: None,
        });
        self.tree.link(parent, id);
        id
    }

    fn parse_meta_object(&self, obj: &Map<String, Json>) -> Result<Vec<Meta>> {
        let mut out = Vec::new();
        for (key, value) in obj {
            let (module, name) = key.split_once(':').ok_or_else(|| {
                Error::syntax(format!("metadata member \"{key}\" must be module-qualified"))
            })?;
            let text = json_scalar_text(value)
                .ok_or_else(|| Error::syntax(format!("invalid metadata value for \"{key}\"")))?;
            out.push(Meta {
                module: IStr::from(module),
                name: IStr::from(name),
                value: IStr::from(text.as_str()),
            });
        }
        Ok(out)
    }

    /// Attach an `@` member to the nodes it describes. For arrays the i-th
    /// entry (possibly null) goes with the i-th instance.
    fn attach_meta(&mut self, created: &[DataNodeId], meta_value: &Json) -> Result<()> {
        match meta_value {
            Json::Array(entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    let Some(&id) = created.get(i) else { break };
                    match entry {
                        Json::Null => {}
                        Json::Object(obj) => {
                            let metas = self.parse_meta_object(obj)?;
                            self.tree.node_mut(id).meta.extend(metas);
                        }
                        _ => return Err(Error::syntax("invalid metadata array entry")),
                    }
                }
                Ok(())
            }
            Json::Object(obj) => {
                if let Some(&id) = created.first() {
                    let metas = self.parse_meta_object(obj)?;
                    self.tree.node_mut(id).meta.extend(metas);
                }
                Ok(())
            }
            _ => Err(Error::syntax("invalid metadata member")),
        }
    }
}

/// A JSON scalar as the lexical text the value engine expects.
fn json_scalar_text(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        // empty type: null, or [null]
        Json::Null => Some(String::new()),
        Json::Array(items) if items.len() == 1 && items[0].is_null() => Some(String::new()),
        _ => None,
    }
}

// ======================================================================
// Printing
// ======================================================================

pub(crate) fn print_json(
    ctx: &Context,
    tree: &DataTree,
    options: PrintOptions,
    with_defaults: WithDefaults,
) -> Result<String> {
    let printer = JsonPrinter { set: ctx.schema(), tree, with_defaults };
    let mut members = Map::new();
    let roots: Vec<DataNodeId> = if options.contains(PrintOptions::WITH_SIBLINGS) {
        tree.roots().to_vec()
    } else {
        tree.roots().first().copied().into_iter().collect()
    };
    printer.print_children(&roots, None, &mut members)?;
    let value = Json::Object(members);
    Ok(if options.contains(PrintOptions::SHRINK) {
        serde_json::to_string(&value)?
    } else {
        serde_json::to_string_pretty(&value)?
    })
}

struct JsonPrinter<'a> {
    set: &'a SchemaSet,
    tree: &'a DataTree,
    with_defaults: WithDefaults,
}

impl JsonPrinter<'_> {
    fn member_name(&self, snode: SnodeId, parent_module: Option<ModuleId>) -> String {
        let sn = self.set.node(snode);
        if parent_module == Some(sn.module) {
            sn.name.to_string()
        } else {
            format!("{}:{}", self.set.module(sn.module).name, sn.name)
        }
    }

    fn print_children(
        &self,
        children: &[DataNodeId],
        parent_module: Option<ModuleId>,
        out: &mut Map<String, Json>,
    ) -> Result<()> {
        let mut done: Vec<SnodeId> = Vec::new();
        for &child in children {
            if crate::data::skip_for_defaults(self.set, self.tree, child, self.with_defaults) {
                continue;
            }
            let node = self.tree.node(child);
            let Some(snode) = node.schema else {
                if let DataNodeKind::Opaq { name, module, value } = &node.kind {
                    let key = match module {
                        Some(m) => format!("{m}:{name}"),
                        None => name.to_string(),
                    };
                    out.insert(
                        key,
                        serde_json::from_str(value).unwrap_or(Json::String(value.to_string())),
                    );
                }
                continue;
            };
            if done.contains(&snode) {
                continue;
            }
            done.push(snode);

            let instances: Vec<DataNodeId> = children
                .iter()
                .copied()
                .filter(|&c| {
                    self.tree.node(c).schema == Some(snode)
                        && !crate::data::skip_for_defaults(
                            self.set,
                            self.tree,
                            c,
                            self.with_defaults,
                        )
                })
                .collect();
            let name = self.member_name(snode, parent_module);
            let sn = self.set.node(snode);

            match &sn.kind {
                SnodeKind::Leaf { .. } => {
                    let value = self.term_json(instances[0]);
                    out.insert(name.clone(), value);
                    if let Some(meta) = self.meta_json(instances[0]) {
                        out.insert(format!("@{name}"), meta);
                    }
                }
                SnodeKind::LeafList { .. } => {
                    let values: Vec<Json> =
                        instances.iter().map(|&i| self.term_json(i)).collect();
                    out.insert(name.clone(), Json::Array(values));
                    if instances.iter().any(|&i| self.meta_json(i).is_some()) {
                        let metas: Vec<Json> = instances
                            .iter()
                            .map(|&i| self.meta_json(i).unwrap_or(Json::Null))
                            .collect();
                        out.insert(format!("@{name}"), Json::Array(metas));
                    }
                }
                SnodeKind::List { .. } => {
                    let mut entries = Vec::new();
                    for &i in &instances {
                        let mut obj = Map::new();
                        if let Some(meta) = self.meta_json(i) {
                            obj.insert("@".to_string(), meta);
                        }
                        self.print_children(&self.tree.node(i).children, Some(sn.module), &mut obj)?;
                        entries.push(Json::Object(obj));
                    }
                    out.insert(name, Json::Array(entries));
                }
                SnodeKind::AnyData | SnodeKind::AnyXml => {
                    let value = match &self.tree.node(instances[0]).kind {
                        DataNodeKind::Any { value: AnyValue::Json(j) } => {
                            serde_json::from_str(j).unwrap_or(Json::String(j.to_string()))
                        }
                        DataNodeKind::Any { value: AnyValue::Xml(x) } => {
                            Json::String(x.to_string())
                        }
                        _ => Json::Null,
                    };
                    out.insert(name, value);
                }
                _ => {
                    // Container / operation root.
                    let mut obj = Map::new();
                    if let Some(meta) = self.meta_json(instances[0]) {
                        obj.insert("@".to_string(), meta);
                    }
                    self.print_children(
                        &self.tree.node(instances[0]).children,
                        Some(sn.module),
                        &mut obj,
                    )?;
                    out.insert(name, Json::Object(obj));
                }
            }
        }
        Ok(())
    }

    fn term_json(&self, id: DataNodeId) -> Json {
        let Some(value) = self.tree.node(id).value() else { return Json::Null };
        value_to_json(self.set, value)
    }

    fn meta_json(&self, id: DataNodeId) -> Option<Json> {
        let node = self.tree.node(id);
        let tagged =
            crate::data::tag_for_defaults(self.set, self.tree, id, self.with_defaults);
        if node.meta.is_empty() && !tagged {
            return None;
        }
        let mut obj = Map::new();
        for meta in &node.meta {
            obj.insert(
                format!("{}:{}", meta.module, meta.name),
                Json::String(meta.value.to_string()),
            );
        }
        if tagged {
            obj.insert(
                "ietf-netconf-with-defaults:default".to_string(),
                Json::Bool(true),
            );
        }
        Some(Json::Object(obj))
    }
}

/// RFC 7951 value mapping: 64-bit integers and decimal64 are strings,
/// smaller integers and booleans are native, empty is `[null]`.
fn value_to_json(set: &SchemaSet, value: &Value) -> Json {
    match value {
        Value::Int8(v) => Json::from(*v),
        Value::Int16(v) => Json::from(*v),
        Value::Int32(v) => Json::from(*v),
        Value::Uint8(v) => Json::from(*v),
        Value::Uint16(v) => Json::from(*v),
        Value::Uint32(v) => Json::from(*v),
        Value::Int64(v) => Json::String(v.to_string()),
        Value::Uint64(v) => Json::String(v.to_string()),
        Value::Decimal64 { .. } => Json::String(value.to_lexical(set, ValueFmt::Json)),
        Value::Boolean(b) => Json::Bool(*b),
        Value::Empty => Json::Array(vec![Json::Null]),
        Value::Union(inner) => value_to_json(set, inner),
        other => Json::String(other.to_lexical(set, ValueFmt::Json)),
    }
}
