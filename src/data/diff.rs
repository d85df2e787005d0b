//! Data tree comparison.
//!
//! Produces an ordered change list between two trees; callers use it to
//! persist or broadcast edits. List entries match on their key tuple,
//! leaf-list entries on their value, everything else on its schema node.

use crate::context::Context;
use crate::data::{DataNodeId, DataNodeKind, DataTree};
use crate::error::{Error, Result};
use crate::schema::value::ValueFmt;
use crate::schema::{SchemaSet, SnodeKind};

/// What happened to a node between the two trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    Create,
    Delete,
    Replace,
    /// Unchanged; kept for parents whose descendants changed.
    None,
}

/// One change, annotated with the old and new canonical values.
#[derive(Debug, Clone)]
pub struct DiffEntry {
    pub op: DiffOp,
    /// Data path in the tree the node exists in (the new tree for
    /// create/replace, the old tree for delete).
    pub path: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// An ordered list of changes from an old tree to a new tree.
#[derive(Debug, Clone, Default)]
pub struct DataDiff {
    pub entries: Vec<DiffEntry>,
}

impl DataDiff {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries.iter()
    }
}

pub(crate) fn diff_trees(ctx: &Context, old: &DataTree, new: &DataTree) -> DataDiff {
    let set = ctx.schema();
    let mut diff = DataDiff::default();
    diff_children(set, old, &old.roots, new, &new.roots, &mut diff);
    diff
}

fn diff_children(
    set: &SchemaSet,
    old: &DataTree,
    old_children: &[DataNodeId],
    new: &DataTree,
    new_children: &[DataNodeId],
    diff: &mut DataDiff,
) {
    let mut matched_new: Vec<DataNodeId> = Vec::new();

    for &o in old_children {
        match find_match(set, old, o, new, new_children) {
            Some(n) => {
                matched_new.push(n);
                diff_node(set, old, o, new, n, diff);
            }
            None => {
                diff.entries.push(DiffEntry {
                    op: DiffOp::Delete,
                    path: old.path(set, o),
                    old: node_value(set, old, o),
                    new: None,
                });
            }
        }
    }
    for &n in new_children {
        if !matched_new.contains(&n) {
            diff.entries.push(DiffEntry {
                op: DiffOp::Create,
                path: new.path(set, n),
                old: None,
                new: node_value(set, new, n),
            });
        }
    }
}

fn diff_node(
    set: &SchemaSet,
    old: &DataTree,
    o: DataNodeId,
    new: &DataTree,
    n: DataNodeId,
    diff: &mut DataDiff,
) {
    let before = diff.entries.len();
    match (&old.node(o).kind, &new.node(n).kind) {
        (DataNodeKind::Term { value: ov }, DataNodeKind::Term { value: nv }) => {
            if ov != nv {
                diff.entries.push(DiffEntry {
                    op: DiffOp::Replace,
                    path: new.path(set, n),
                    old: Some(ov.to_lexical(set, ValueFmt::Json)),
                    new: Some(nv.to_lexical(set, ValueFmt::Json)),
                });
            }
        }
        (DataNodeKind::Any { value: ov }, DataNodeKind::Any { value: nv }) => {
            if ov != nv {
                diff.entries.push(DiffEntry {
                    op: DiffOp::Replace,
                    path: new.path(set, n),
                    old: None,
                    new: None,
                });
            }
        }
        _ => {
            diff_children(set, old, &old.node(o).children, new, &new.node(n).children, diff);
            if diff.entries.len() > before {
                diff.entries.insert(
                    before,
                    DiffEntry {
                        op: DiffOp::None,
                        path: new.path(set, n),
                        old: None,
                        new: None,
                    },
                );
            }
        }
    }
}

/// The counterpart of an old node among the new children.
fn find_match(
    set: &SchemaSet,
    old: &DataTree,
    o: DataNodeId,
    new: &DataTree,
    new_children: &[DataNodeId],
) -> Option<DataNodeId> {
    let o_node = old.node(o);
    let snode = o_node.schema?;
    let candidates: Vec<DataNodeId> = new_children
        .iter()
        .copied()
        .filter(|&c| new.node(c).schema == Some(snode))
        .collect();
    match &set.node(snode).kind {
        SnodeKind::List { keys, .. } => candidates.into_iter().find(|&c| {
            keys.iter()
                .all(|&k| new.child_term(c, k) == old.child_term(o, k))
        }),
        SnodeKind::LeafList { .. } => candidates
            .into_iter()
            .find(|&c| new.node(c).value() == o_node.value()),
        _ => candidates.into_iter().next(),
    }
}

fn node_value(set: &SchemaSet, tree: &DataTree, id: DataNodeId) -> Option<String> {
    tree.node(id).value().map(|v| v.to_lexical(set, ValueFmt::Json))
}

impl DataTree {
    /// Look a node up by data path (`/mod:name[key='v']/...`).
    pub fn find_path(&self, ctx: &Context, path: &str) -> Result<DataNodeId> {
        let set = ctx.schema();
        let rest = path
            .strip_prefix('/')
            .ok_or_else(|| Error::syntax(format!("data path \"{path}\" is not absolute")))?;
        let mut current: Option<DataNodeId> = None;
        for segment in split_segments(rest) {
            let (name_part, predicates) = split_predicates(&segment)?;
            let name = name_part.rsplit_once(':').map(|(_, n)| n).unwrap_or(&name_part);
            let children: Vec<DataNodeId> = match current {
                Some(p) => self.node(p).children.clone(),
                None => self.roots.clone(),
            };
            let found = children.into_iter().find(|&c| {
                let node = self.node(c);
                let Some(snode) = node.schema else { return false };
                if &*set.node(snode).name != name {
                    return false;
                }
                predicates.iter().all(|(key, value)| {
                    set.node(snode)
                        .children
                        .iter()
                        .find(|&&k| &*set.node(k).name == key.as_str())
                        .and_then(|&k| self.child_term(c, k))
                        .map(|v| v.to_lexical(set, ValueFmt::Json) == *value)
                        .unwrap_or(false)
                })
            });
            current = Some(found.ok_or_else(|| {
                Error::not_found(format!("data path \"{path}\": \"{segment}\" not found"))
            })?);
        }
        current.ok_or_else(|| Error::syntax(format!("empty data path \"{path}\"")))
    }
}

/// Split a path on `/`, but not inside `[...]` predicates.
fn split_segments(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in path.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '/' if depth == 0 => {
                out.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// `name[key='v'][key2='v2']` → (`name`, [(key, v), ...]).
fn split_predicates(segment: &str) -> Result<(String, Vec<(String, String)>)> {
    let Some(open) = segment.find('[') else {
        return Ok((segment.to_string(), Vec::new()));
    };
    let name = segment[..open].to_string();
    let mut predicates = Vec::new();
    let mut rest = &segment[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let close = stripped
            .find(']')
            .ok_or_else(|| Error::syntax(format!("unterminated predicate in \"{segment}\"")))?;
        let inner = &stripped[..close];
        let (key, value) = inner
            .split_once('=')
            .ok_or_else(|| Error::syntax(format!("invalid predicate \"{inner}\"")))?;
        let value = value.trim().trim_matches('\'').trim_matches('"');
        predicates.push((key.trim().to_string(), value.to_string()));
        rest = &stripped[close + 1..];
    }
    Ok((name, predicates))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_segments_with_predicates() {
        let segments = split_segments("a:l1[k='x/y']/leaf");
        assert_eq!(segments, vec!["a:l1[k='x/y']".to_string(), "leaf".to_string()]);
    }

    #[test]
    fn test_split_predicates() {
        let (name, preds) = split_predicates("l1[a='1'][b='two']").unwrap();
        assert_eq!(name, "l1");
        assert_eq!(
            preds,
            vec![("a".into(), "1".into()), ("b".into(), "two".into())]
        );
    }
}
