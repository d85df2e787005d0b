//! Data tree validation.
//!
//! Applies the schema's structural and cross-node constraints to a tree
//! built by parsing, merging or programmatic construction: opaque/state
//! rejection, default insertion, when-removal to fixpoint, choice
//! exclusivity, mandatory/cardinality checks, key and unique enforcement,
//! must evaluation, and leafref/instance-identifier resolution.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::context::Context;
use crate::data::{
    DataFlags, DataNode, DataNodeId, DataNodeKind, DataRef, DataTree, ParseOptions,
    ValidationOptions, constraint_error,
};
use crate::error::{Diagnostics, Error, Result};
use crate::schema::types::TypeKind;
use crate::schema::value::{Value, ValueFmt};
use crate::schema::{SchemaSet, SnodeId, SnodeKind};
use crate::xpath::{Eval, XpNode, parse_xpath};

pub(crate) fn validate_tree(
    tree: &mut DataTree,
    ctx: &Context,
    options: ValidationOptions,
    diag: &mut Diagnostics,
) -> Result<()> {
    let collect = options.contains(ValidationOptions::COLLECT_ALL);
    let set = ctx.schema();

    let mut v = Validator { tree, set, collect, diag };

    v.check_opaque()?;
    if options.contains(ValidationOptions::NO_STATE) {
        v.check_state()?;
    }
    v.insert_defaults()?;
    v.when_fixpoint()?;
    v.check_structure()?;
    v.check_musts()?;
    v.resolve_refs(true)?;

    // Validation settles the NEW flag.
    for id in v.tree.traverse() {
        v.tree.node_mut(id).flags -= DataFlags::NEW;
    }
    Ok(())
}

/// Resolve leafref and instance-identifier targets (parse finalization).
pub(crate) fn resolve_references(
    tree: &mut DataTree,
    ctx: &Context,
    options: ParseOptions,
) -> Result<()> {
    let mut diag = Diagnostics::new();
    let mut v = Validator {
        tree,
        set: ctx.schema(),
        collect: options.contains(ParseOptions::OPAQUE),
        diag: &mut diag,
    };
    v.resolve_refs(false)?;
    Ok(())
}

struct Validator<'a> {
    tree: &'a mut DataTree,
    set: &'a SchemaSet,
    collect: bool,
    diag: &'a mut Diagnostics,
}

impl Validator<'_> {
    fn report(&mut self, err: Error) -> Result<()> {
        if self.collect {
            self.diag.push(err);
            Ok(())
        } else {
            Err(err)
        }
    }

    // --------------------------------------------------------------
    // 1. Opaque rejection, 2. state-data rule
    // --------------------------------------------------------------

    fn check_opaque(&mut self) -> Result<()> {
        for id in self.tree.traverse() {
            if self.tree.node(id).schema.is_none() {
                let path = self.tree.path(self.set, id);
                self.report(
                    Error::not_found("node has no matching schema definition".to_string())
                        .with_path(path),
                )?;
            }
        }
        Ok(())
    }

    fn check_state(&mut self) -> Result<()> {
        for id in self.tree.traverse() {
            let Some(snode) = self.tree.node(id).schema else { continue };
            if !self.set.node(snode).is_config() {
                let path = self.tree.path(self.set, id);
                self.report(
                    Error::value("state data is not allowed here".to_string()).with_path(path),
                )?;
            }
        }
        Ok(())
    }

    // --------------------------------------------------------------
    // 3. Default insertion
    // --------------------------------------------------------------

    fn insert_defaults(&mut self) -> Result<()> {
        // Top level: implemented modules' children.
        let mut parents: Vec<(Option<DataNodeId>, Vec<SnodeId>)> = Vec::new();
        let mut top_schemas = Vec::new();
        for module in &self.set.modules {
            if module.implemented {
                top_schemas.extend(module.children.iter().copied());
            }
        }
        parents.push((None, top_schemas));
        for id in self.tree.traverse() {
            let node = self.tree.node(id);
            if matches!(node.kind, DataNodeKind::Inner) {
                if let Some(snode) = node.schema {
                    parents.push((Some(id), self.set.node(snode).children.clone()));
                }
            }
        }

        for (parent, schema_children) in parents {
            self.insert_defaults_under(parent, &schema_children)?;
        }
        Ok(())
    }

    fn insert_defaults_under(
        &mut self,
        parent: Option<DataNodeId>,
        schema_children: &[SnodeId],
    ) -> Result<()> {
        for &snode in schema_children {
            let sn = self.set.node(snode);
            match &sn.kind {
                SnodeKind::Leaf { default: Some(value), .. } => {
                    if sn.is_config() && self.tree.children_by_schema(parent, snode).is_empty() {
                        self.insert_default_term(parent, snode, value.clone());
                    }
                }
                SnodeKind::LeafList { defaults, .. } if !defaults.is_empty() => {
                    if sn.is_config() && self.tree.children_by_schema(parent, snode).is_empty() {
                        for value in defaults.clone() {
                            self.insert_default_term(parent, snode, value);
                        }
                    }
                }
                SnodeKind::Choice { default_case } => {
                    let active = self.active_case(parent, snode);
                    match active {
                        Some(case) => {
                            // Defaults inside an active case apply.
                            let case_children = self.set.node(case).children.clone();
                            self.insert_defaults_under(parent, &case_children)?;
                        }
                        None => {
                            if let Some(case) = default_case {
                                let case_children = self.set.node(*case).children.clone();
                                self.insert_defaults_under(parent, &case_children)?;
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn insert_default_term(&mut self, parent: Option<DataNodeId>, snode: SnodeId, value: Value) {
        trace!(node = %self.set.schema_path(snode), "inserting default");
        let id = self.tree.alloc(DataNode {
            schema: Some(snode),
            parent: None,
            children: Vec::new(),
            kind: DataNodeKind::Term { value },
            flags: DataFlags::DEFAULT | DataFlags::NEW,
            meta: Vec::new(),
            target: None,
        });
        self.tree.link(parent, id);
    }

    /// The case (direct child of `choice`) with instantiated data under
    /// `parent`, if any.
    fn active_case(&self, parent: Option<DataNodeId>, choice: SnodeId) -> Option<SnodeId> {
        let children: Vec<DataNodeId> = match parent {
            Some(p) => self.tree.node(p).children.clone(),
            None => self.tree.roots.clone(),
        };
        for case in &self.set.node(choice).children {
            let members = self.set.traverse(*case);
            for &c in &children {
                if let Some(s) = self.tree.node(c).schema {
                    if members.contains(&s) && s != *case {
                        return Some(*case);
                    }
                }
            }
        }
        None
    }

    // --------------------------------------------------------------
    // 11. when (run early so later checks see the effective tree)
    // --------------------------------------------------------------

    fn when_fixpoint(&mut self) -> Result<()> {
        loop {
            let mut to_remove = Vec::new();
            for id in self.tree.traverse() {
                let Some(snode) = self.tree.node(id).schema else { continue };
                if self.tree.node(id).flags.contains(DataFlags::WHEN_TRUE) {
                    continue;
                }
                // when on the node itself plus any choice/case levels
                // between it and its data parent.
                let mut conds = Vec::new();
                let mut cursor = Some(snode);
                while let Some(s) = cursor {
                    let sn = self.set.node(s);
                    if let Some(w) = &sn.when {
                        conds.push(w.clone());
                    }
                    cursor = match sn.parent {
                        Some(p) if !self.set.node(p).is_data_node() => Some(p),
                        _ => None,
                    };
                }
                if conds.is_empty() {
                    continue;
                }
                let mut all_true = true;
                for cond in conds {
                    let eval = Eval {
                        set: self.set,
                        prefixes: &*cond.prefixes,
                        root: DataRef::root(self.tree, self.set),
                        current: DataRef::at(self.tree, self.set, id),
                    };
                    if !eval.eval_bool(&cond.expr)? {
                        all_true = false;
                        break;
                    }
                }
                if all_true {
                    self.tree.node_mut(id).flags |= DataFlags::WHEN_TRUE;
                } else {
                    // A false when removes the subtree from consideration.
                    trace!(path = %self.tree.path(self.set, id), "when false, removing");
                    to_remove.push(id);
                }
            }
            if to_remove.is_empty() {
                return Ok(());
            }
            for id in to_remove {
                self.tree.unlink(id);
            }
            // Removal can flip other when results; clear and re-run.
            for id in self.tree.traverse() {
                self.tree.node_mut(id).flags -= DataFlags::WHEN_TRUE;
            }
        }
    }

    // --------------------------------------------------------------
    // 4-10. Structural checks
    // --------------------------------------------------------------

    fn check_structure(&mut self) -> Result<()> {
        // Top level of implemented modules.
        let mut top_schemas = Vec::new();
        for module in &self.set.modules {
            if module.implemented {
                top_schemas.extend(module.children.iter().copied());
            }
        }
        self.check_level(None, &top_schemas)?;

        for id in self.tree.traverse() {
            let node = self.tree.node(id);
            if !matches!(node.kind, DataNodeKind::Inner) {
                continue;
            }
            let Some(snode) = node.schema else { continue };
            let schema_children = self.set.node(snode).children.clone();
            self.check_level(Some(id), &schema_children)?;
            if let SnodeKind::List { keys, uniques, .. } = &self.set.node(snode).kind {
                let keys = keys.clone();
                let uniques = uniques.clone();
                self.check_list_entry_keys(id, &keys)?;
                // Key and unique checks run once per list, on the first
                // entry's parent; guarded below by first-instance test.
                let parent = self.tree.node(id).parent;
                let entries = self.tree.children_by_schema(parent, snode);
                if entries.first() == Some(&id) {
                    self.check_key_uniqueness(&entries, &keys)?;
                    for unique in &uniques {
                        self.check_unique(&entries, &unique.leaves, &unique.text)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_level(
        &mut self,
        parent: Option<DataNodeId>,
        schema_children: &[SnodeId],
    ) -> Result<()> {
        for &snode in schema_children {
            let sn = self.set.node(snode);
            let instances = self.tree.children_by_schema(parent, snode);
            match &sn.kind {
                SnodeKind::Choice { .. } => {
                    self.check_choice(parent, snode)?;
                    // Only the active case's members are constrained.
                    if let Some(case) = self.active_case(parent, snode) {
                        let case_children = self.set.node(case).children.clone();
                        self.check_level(parent, &case_children)?;
                    }
                }
                SnodeKind::Leaf { .. } | SnodeKind::AnyData | SnodeKind::AnyXml => {
                    if sn.is_mandatory() && instances.is_empty() && self.when_allows(parent, snode)
                    {
                        self.report(constraint_error(
                            format!("mandatory node \"{}\" is missing", sn.name),
                            self.set.schema_path(snode),
                        ))?;
                    }
                    if instances.len() > 1 {
                        self.report(
                            Error::duplicate(format!("duplicate node \"{}\"", sn.name))
                                .with_path(self.tree.path(self.set, instances[1])),
                        )?;
                    }
                }
                SnodeKind::Container { .. } => {
                    if instances.len() > 1 {
                        self.report(
                            Error::duplicate(format!("duplicate container \"{}\"", sn.name))
                                .with_path(self.tree.path(self.set, instances[1])),
                        )?;
                    }
                }
                SnodeKind::LeafList { min_elements, max_elements, .. } => {
                    self.check_cardinality(
                        &instances,
                        *min_elements,
                        *max_elements,
                        snode,
                        parent,
                    )?;
                    if sn.is_config() && !sn.is_user_ordered() {
                        self.check_leaf_list_duplicates(&instances)?;
                    }
                }
                SnodeKind::List { min_elements, max_elements, .. } => {
                    self.check_cardinality(
                        &instances,
                        *min_elements,
                        *max_elements,
                        snode,
                        parent,
                    )?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Skip a mandatory complaint when an ancestor when-condition removed
    /// the whole region (the schema node or a choice above it is
    /// conditional and currently unsatisfied).
    fn when_allows(&self, _parent: Option<DataNodeId>, snode: SnodeId) -> bool {
        // A node guarded by when is only mandatory while the condition
        // holds; with no instance to anchor the evaluation, skip the check.
        self.set.node(snode).when.is_none()
    }

    fn check_choice(&mut self, parent: Option<DataNodeId>, choice: SnodeId) -> Result<()> {
        let sn = self.set.node(choice);
        let children: Vec<DataNodeId> = match parent {
            Some(p) => self.tree.node(p).children.clone(),
            None => self.tree.roots.clone(),
        };
        let mut active: Vec<SnodeId> = Vec::new();
        for case in &sn.children {
            let members = self.set.traverse(*case);
            let hit = children.iter().any(|&c| {
                self.tree
                    .node(c)
                    .schema
                    .is_some_and(|s| s != *case && members.contains(&s))
            });
            if hit {
                active.push(*case);
            }
        }
        if active.len() > 1 {
            let names: Vec<&str> = active.iter().map(|&c| &*self.set.node(c).name).collect();
            self.report(constraint_error(
                format!(
                    "choice \"{}\" has data from multiple cases ({})",
                    sn.name,
                    names.join(", ")
                ),
                self.set.schema_path(choice),
            ))?;
        }
        if sn.is_mandatory() && active.is_empty() {
            self.report(constraint_error(
                format!("mandatory choice \"{}\" has no case", sn.name),
                self.set.schema_path(choice),
            ))?;
        }
        Ok(())
    }

    fn check_cardinality(
        &mut self,
        instances: &[DataNodeId],
        min: u32,
        max: Option<u32>,
        snode: SnodeId,
        _parent: Option<DataNodeId>,
    ) -> Result<()> {
        let n = instances.len() as u32;
        if n < min && n > 0 || (n == 0 && min > 0 && self.set.node(snode).when.is_none()) {
            self.report(constraint_error(
                format!(
                    "\"{}\" has {n} instance(s), fewer than min-elements {min}",
                    self.set.node(snode).name
                ),
                self.set.schema_path(snode),
            ))?;
        }
        if let Some(max) = max {
            if n > max {
                self.report(constraint_error(
                    format!(
                        "\"{}\" has {n} instance(s), more than max-elements {max}",
                        self.set.node(snode).name
                    ),
                    self.tree.path(self.set, instances[max as usize]),
                ))?;
            }
        }
        Ok(())
    }

    fn check_leaf_list_duplicates(&mut self, instances: &[DataNodeId]) -> Result<()> {
        let mut seen: FxHashSet<String> = FxHashSet::default();
        for &i in instances {
            if let Some(v) = self.tree.node(i).value() {
                let canon = v.to_lexical(self.set, ValueFmt::Json);
                if !seen.insert(canon.clone()) {
                    let path = self.tree.path(self.set, i);
                    self.report(
                        Error::duplicate(format!("duplicate leaf-list value \"{canon}\""))
                            .with_path(path),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Every key leaf must be present in the entry.
    fn check_list_entry_keys(&mut self, entry: DataNodeId, keys: &[SnodeId]) -> Result<()> {
        for &key in keys {
            if self.tree.children_by_schema(Some(entry), key).is_empty() {
                let path = self.tree.path(self.set, entry);
                self.report(constraint_error(
                    format!("list key \"{}\" is missing", self.set.node(key).name),
                    path,
                ))?;
            }
        }
        Ok(())
    }

    /// O(n) duplicate detection over the canonical key tuple.
    fn check_key_uniqueness(&mut self, entries: &[DataNodeId], keys: &[SnodeId]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut seen: FxHashMap<String, DataNodeId> = FxHashMap::default();
        for &entry in entries {
            let tuple: Vec<String> = keys
                .iter()
                .filter_map(|&k| {
                    self.tree
                        .child_term(entry, k)
                        .map(|v| v.to_lexical(self.set, ValueFmt::Json))
                })
                .collect();
            if tuple.len() != keys.len() {
                continue; // missing keys reported separately
            }
            let hash_key = tuple.join("\u{0}");
            if seen.contains_key(&hash_key) {
                let path = self.tree.path(self.set, entry);
                self.report(
                    Error::duplicate(format!(
                        "duplicate list entry with keys ({})",
                        tuple.join(", ")
                    ))
                    .with_path(path),
                )?;
            } else {
                seen.insert(hash_key, entry);
            }
        }
        Ok(())
    }

    /// A tuple with a missing component never conflicts.
    fn check_unique(
        &mut self,
        entries: &[DataNodeId],
        leaves: &[SnodeId],
        text: &str,
    ) -> Result<()> {
        let mut seen: FxHashMap<String, DataNodeId> = FxHashMap::default();
        for &entry in entries {
            let mut tuple = Vec::with_capacity(leaves.len());
            let mut complete = true;
            for &leaf in leaves {
                match self.find_descendant_term(entry, leaf) {
                    Some(v) => tuple.push(v.to_lexical(self.set, ValueFmt::Json)),
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }
            let hash_key = tuple.join("\u{0}");
            if let Some(&first) = seen.get(&hash_key) {
                let path_a = self.tree.path(self.set, first);
                let path_b = self.tree.path(self.set, entry);
                self.report(constraint_error(
                    format!("unique constraint \"{text}\" violated by {path_a} and {path_b}"),
                    path_b,
                ))?;
            } else {
                seen.insert(hash_key, entry);
            }
        }
        Ok(())
    }

    fn find_descendant_term(&self, under: DataNodeId, schema: SnodeId) -> Option<&Value> {
        let mut stack = vec![under];
        while let Some(id) = stack.pop() {
            for &c in &self.tree.node(id).children {
                if self.tree.node(c).schema == Some(schema) {
                    return self.tree.node(c).value();
                }
                stack.push(c);
            }
        }
        None
    }

    // --------------------------------------------------------------
    // 12. must
    // --------------------------------------------------------------

    fn check_musts(&mut self) -> Result<()> {
        for id in self.tree.traverse() {
            let Some(snode) = self.tree.node(id).schema else { continue };
            let musts = self.set.node(snode).musts.clone();
            for must in musts {
                let eval = Eval {
                    set: self.set,
                    prefixes: &*must.prefixes,
                    root: DataRef::root(self.tree, self.set),
                    current: DataRef::at(self.tree, self.set, id),
                };
                if !eval.eval_bool(&must.expr)? {
                    let path = self.tree.path(self.set, id);
                    let message = match &must.error_message {
                        Some(m) => m.to_string(),
                        None => format!("must condition \"{}\" is false", must.expr.text),
                    };
                    let err = Error::Constraint {
                        message,
                        path: Some(path),
                        app_tag: must.error_app_tag.as_ref().map(|t| t.to_string()),
                    };
                    self.report(err)?;
                }
            }
        }
        Ok(())
    }

    // --------------------------------------------------------------
    // 13-14. leafref / instance-identifier resolution
    // --------------------------------------------------------------

    fn resolve_refs(&mut self, enforce: bool) -> Result<()> {
        for id in self.tree.traverse() {
            let Some(snode) = self.tree.node(id).schema else { continue };
            let Some(typ) = self.set.node(snode).typ() else { continue };
            match &typ.kind {
                TypeKind::LeafRef { path, prefixes, require_instance, .. } => {
                    let path = path.clone();
                    let prefixes = prefixes.clone();
                    let require = *require_instance;
                    let own_value = self.tree.node(id).value().cloned();
                    let eval = Eval {
                        set: self.set,
                        prefixes: &*prefixes,
                        root: DataRef::root(self.tree, self.set),
                        current: DataRef::at(self.tree, self.set, id),
                    };
                    let target = match eval.eval(&path) {
                        Ok(crate::xpath::XpValue::NodeSet(nodes)) => nodes
                            .into_iter()
                            .find(|n| {
                                n.typed_value()
                                    .zip(own_value.clone())
                                    .is_some_and(|(a, b)| values_equal(&a, &b))
                            })
                            .and_then(|n| n.id),
                        _ => None,
                    };
                    match target {
                        Some(t) => self.tree.node_mut(id).target = Some(t),
                        None if require && enforce => {
                            let path_str = self.tree.path(self.set, id);
                            let shown = own_value
                                .map(|v| v.to_lexical(self.set, ValueFmt::Json))
                                .unwrap_or_default();
                            self.report(
                                Error::not_found(format!(
                                    "leafref \"{}\" points at no existing instance (value \"{shown}\")",
                                    path.text
                                ))
                                .with_path(path_str),
                            )?;
                        }
                        None => {}
                    }
                }
                TypeKind::InstanceIdentifier { require_instance } => {
                    let require = *require_instance;
                    let Some(Value::InstanceId { path }) = self.tree.node(id).value().cloned()
                    else {
                        continue;
                    };
                    let target = self.resolve_instance_id(&path);
                    match target {
                        Some(t) => self.tree.node_mut(id).target = Some(t),
                        None if require && enforce => {
                            let path_str = self.tree.path(self.set, id);
                            self.report(
                                Error::not_found(format!(
                                    "instance-identifier \"{path}\" points at no existing node"
                                ))
                                .with_path(path_str),
                            )?;
                        }
                        None => {}
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Instance-identifiers qualify nodes by module name, so evaluate them
    /// with an identity prefix map.
    fn resolve_instance_id(&self, path: &str) -> Option<DataNodeId> {
        let mut scratch = crate::base::Interner::new();
        let expr = parse_xpath(&mut scratch, path).ok()?;
        let mut prefixes = crate::schema::PrefixMap::default();
        for module in &self.set.modules {
            prefixes.insert(module.name.clone(), module.name.clone());
            prefixes.insert(module.prefix.clone(), module.name.clone());
        }
        let eval = Eval {
            set: self.set,
            prefixes: &prefixes,
            root: DataRef::root(self.tree, self.set),
            current: DataRef::root(self.tree, self.set),
        };
        match eval.eval(&expr) {
            Ok(crate::xpath::XpValue::NodeSet(nodes)) => nodes.into_iter().next().and_then(|n| n.id),
            _ => None,
        }
    }
}

/// Canonical equality, unwrapping unions.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Union(x), y) => values_equal(x, y),
        (x, Value::Union(y)) => values_equal(x, y),
        (x, y) => x == y,
    }
}
