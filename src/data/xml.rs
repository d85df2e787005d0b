//! XML instance data: NETCONF-encoding parse and print.
//!
//! Element names are schema-node names; module membership comes from the
//! element's namespace URI, tracked through an explicit namespace scope.
//! Attributes in the namespace of a loaded module become metadata on the
//! data node.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rustc_hash::FxHashMap;

use crate::base::IStr;
use crate::context::Context;
use crate::data::{
    AnyValue, DataFlags, DataNode, DataNodeId, DataNodeKind, DataTree, Meta, OpKind,
    ParseOptions, PrintOptions, WithDefaults,
};
use crate::error::{Error, Result};
use crate::parser::NsScope;
use crate::schema::value::{ValueFmt, store};
use crate::schema::{ModuleId, SchemaSet, SnodeId, SnodeKind};

/// The ietf-netconf-with-defaults annotation namespace.
const WD_NAMESPACE: &str = "urn:ietf:params:xml:ns:yang:ietf-netconf-with-defaults";

pub(crate) fn parse_xml(
    ctx: &Context,
    text: &str,
    options: ParseOptions,
    op: Option<OpKind>,
) -> Result<DataTree> {
    let mut parser = XmlParser {
        reader: Reader::from_str(text),
        input: text,
        ctx,
        options,
        op,
        tree: DataTree::new(),
        ns: NsScope::default(),
        lookup_override: FxHashMap::default(),
    };
    parser.parse_document()?;
    Ok(parser.tree)
}

struct XmlParser<'a> {
    reader: Reader<&'a [u8]>,
    input: &'a str,
    ctx: &'a Context,
    options: ParseOptions,
    op: Option<OpKind>,
    tree: DataTree,
    ns: NsScope,
    /// Operation roots resolve their children against input/output instead
    /// of their own children list.
    lookup_override: FxHashMap<DataNodeId, SnodeId>,
}

impl<'a> XmlParser<'a> {
    fn set(&self) -> &'a SchemaSet {
        self.ctx.schema()
    }

    fn parse_document(&mut self) -> Result<()> {
        loop {
            match self.reader.read_event()? {
                Event::Start(start) => {
                    self.ns.push_frame(&start)?;
                    self.parse_element(&start, false, None)?;
                    self.ns.pop_frame();
                }
                Event::Empty(start) => {
                    self.ns.push_frame(&start)?;
                    self.parse_element(&start, true, None)?;
                    self.ns.pop_frame();
                }
                Event::Text(t) => {
                    if !t.unescape()?.trim().is_empty() {
                        return Err(Error::syntax("text content at the document root"));
                    }
                }
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => return Ok(()),
                Event::End(_) => return Err(Error::syntax("unbalanced element close")),
                _ => return Err(Error::syntax("unexpected XML content")),
            }
        }
    }

    /// Resolve the schema node for an element under `parent`.
    fn resolve_schema(
        &self,
        parent: Option<DataNodeId>,
        module: Option<ModuleId>,
        name: &str,
    ) -> Option<SnodeId> {
        let set = self.set();
        match parent {
            Some(p) => {
                let parent_snode = self
                    .lookup_override
                    .get(&p)
                    .copied()
                    .or_else(|| self.tree.node(p).schema)?;
                let module = module.unwrap_or(set.node(parent_snode).module);
                set.find_data_child(module, Some(parent_snode), module, name)
            }
            None => {
                let module = module?;
                match self.op {
                    None => {
                        let m = set.module(module);
                        set.find_in_children(&m.children, module, name)
                    }
                    Some(OpKind::Rpc) => {
                        let m = set.module(module);
                        set.find_in_children(&m.rpcs, module, name)
                    }
                    Some(OpKind::Action) => {
                        let m = set.module(module);
                        set.find_in_children(&m.children, module, name)
                    }
                    Some(OpKind::Notification) => {
                        let m = set.module(module);
                        set.find_in_children(&m.notifications, module, name)
                    }
                    Some(OpKind::Reply { request }) => {
                        let output = self.io_child(request, false)?;
                        set.find_data_child(module, Some(output), module, name)
                    }
                }
            }
        }
    }

    fn io_child(&self, op: SnodeId, input: bool) -> Option<SnodeId> {
        let set = self.set();
        set.node(op).children.iter().copied().find(|&c| {
            matches!(set.node(c).kind, SnodeKind::Input if input)
                || matches!(set.node(c).kind, SnodeKind::Output if !input)
        })
    }

    /// Parse one element. Its namespace frame must already be pushed.
    fn parse_element(
        &mut self,
        start: &BytesStart<'a>,
        empty: bool,
        parent: Option<DataNodeId>,
    ) -> Result<()> {
        let set = self.set();
        let local = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let ns = self.ns.element_ns(start);
        let module = ns.as_deref().and_then(|u| set.find_module_by_namespace(u));
        if module.is_none() && ns.is_some() && !self.options.contains(ParseOptions::OPAQUE) {
            return Err(Error::not_found(format!(
                "no module found for namespace \"{}\"",
                ns.as_deref().unwrap_or("")
            )));
        }

        let snode = self.resolve_schema(parent, module, &local);
        let Some(snode) = snode else {
            if self.options.contains(ParseOptions::OPAQUE) {
                return self.parse_opaque(&local, ns, start, empty, parent);
            }
            return Err(Error::not_found(format!(
                "element \"{local}\" does not match any schema node"
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
                "state data node \"{local}\" in config-only parse"
            )));
        }

        let meta = self.parse_attributes(start)?;

        match &sn.kind {
            SnodeKind::Leaf { .. } | SnodeKind::LeafList { .. } => {
                let text = if empty { String::new() } else { self.read_text_content(start)? };
                let typ = sn.typ().expect("term node has a type").clone();
                let prefixes = set.module(sn.module).prefixes.clone();
                match store(set, &prefixes, &typ, &text, ValueFmt::Xml) {
                    Ok(value) => {
                        let id = self.tree.alloc(DataNode {
                            schema: Some(snode),
                            parent: None,
                            children: Vec::new(),
                            kind: DataNodeKind::Term { value },
                            flags: DataFlags::NEW,
                            meta,
                            target: None,
                        });
                        self.tree.link(parent, id);
                    }
                    Err(_) if self.options.contains(ParseOptions::OPAQUE) => {
                        let id = self.tree.alloc(DataNode {
                            schema: None,
                            parent: None,
                            children: Vec::new(),
                            kind: DataNodeKind::Opaq {
                                name: IStr::from(local.as_str()),
                                module: ns.map(|n| IStr::from(n.as_str())),
                                value: IStr::from(text.as_str()),
                            },
                            flags: DataFlags::NEW,
                            meta,
                            target: None,
                        });
                        self.tree.link(parent, id);
                    }
                    Err(e) => {
                        return Err(e.with_path(format!("/{local}")));
                    }
                }
            }
            SnodeKind::AnyData | SnodeKind::AnyXml => {
                let raw = if empty {
                    String::new()
                } else {
                    let span = self.reader.read_to_end(start.name())?;
                    self.input[span.start as usize..span.end as usize].to_string()
                };
                let id = self.tree.alloc(DataNode {
                    schema: Some(snode),
                    parent: None,
                    children: Vec::new(),
                    kind: DataNodeKind::Any { value: AnyValue::Xml(IStr::from(raw.as_str())) },
                    flags: DataFlags::NEW,
                    meta,
                    target: None,
                });
                self.tree.link(parent, id);
            }
            _ => {
                // Inner node: container, list entry, operation root.
                let id = self.tree.alloc(DataNode {
                    schema: Some(snode),
                    parent: None,
                    children: Vec::new(),
                    kind: DataNodeKind::Inner,
                    flags: DataFlags::NEW,
                    meta,
                    target: None,
                });
                self.tree.link(parent, id);
                if matches!(sn.kind, SnodeKind::Rpc | SnodeKind::Action) {
                    let want_input = !matches!(self.op, Some(OpKind::Reply { .. }));
                    if let Some(io) = self.io_child(snode, want_input) {
                        self.lookup_override.insert(id, io);
                    }
                }
                if !empty {
                    self.parse_children(id, &local)?;
                }
                if self.options.contains(ParseOptions::STRICT) {
                    self.check_keys_first(id)?;
                }
            }
        }
        Ok(())
    }

    fn parse_children(&mut self, parent: DataNodeId, parent_name: &str) -> Result<()> {
        loop {
            match self.reader.read_event()? {
                Event::Start(child) => {
                    self.ns.push_frame(&child)?;
                    self.parse_element(&child, false, Some(parent))?;
                    self.ns.pop_frame();
                }
                Event::Empty(child) => {
                    self.ns.push_frame(&child)?;
                    self.parse_element(&child, true, Some(parent))?;
                    self.ns.pop_frame();
                }
                Event::Text(t) => {
                    if !t.unescape()?.trim().is_empty() {
                        return Err(Error::syntax(format!(
                            "mixed content inside \"{parent_name}\""
                        )));
                    }
                }
                Event::Comment(_) | Event::PI(_) => {}
                Event::End(_) => return Ok(()),
                Event::Eof => {
                    return Err(Error::InputExhausted {
                        message: format!("unterminated element \"{parent_name}\""),
                        pos: None,
                    });
                }
                _ => return Err(Error::syntax("unexpected XML content")),
            }
        }
    }

    /// Leaf text: concatenated character data until the end tag.
    fn read_text_content(&mut self, start: &BytesStart<'a>) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.reader.read_event()? {
                Event::Text(t) => text.push_str(&t.unescape()?),
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
                Event::Comment(_) => {}
                Event::End(_) => return Ok(text),
                Event::Start(_) | Event::Empty(_) => {
                    return Err(Error::syntax(format!(
                        "element content inside leaf \"{}\"",
                        String::from_utf8_lossy(start.local_name().as_ref())
                    )));
                }
                Event::Eof => {
                    return Err(Error::InputExhausted {
                        message: "unterminated leaf element".into(),
                        pos: None,
                    });
                }
                _ => return Err(Error::syntax("unexpected XML content")),
            }
        }
    }

    /// Attributes in a loaded module's namespace become metadata.
    fn parse_attributes(&mut self, start: &BytesStart<'a>) -> Result<Vec<Meta>> {
        let mut meta = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| Error::syntax(format!("bad attribute: {e}")))?;
            if attr.key.as_ref().starts_with(b"xmlns") {
                continue;
            }
            let name = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| Error::syntax(format!("bad attribute value: {e}")))?;
            // Unprefixed attributes carry no namespace.
            let prefix = attr
                .key
                .prefix()
                .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
            let module_name = prefix.as_deref().and_then(|p| {
                let uri = self.ns.resolve(Some(p))?;
                if uri == WD_NAMESPACE {
                    Some(IStr::from("ietf-netconf-with-defaults"))
                } else {
                    self.set()
                        .find_module_by_namespace(uri)
                        .map(|m| self.set().module(m).name.clone())
                }
            });
            match module_name {
                Some(module) => meta.push(Meta {
                    module,
                    name: IStr::from(name.as_str()),
                    value: IStr::from(&*value),
                }),
                None if prefix.is_some() && self.options.contains(ParseOptions::STRICT) => {
                    return Err(Error::not_found(format!(
                        "attribute \"{name}\" is not from a known annotation module"
                    )));
                }
                None => {}
            }
        }
        Ok(meta)
    }

    fn parse_opaque(
        &mut self,
        local: &str,
        ns: Option<String>,
        start: &BytesStart<'a>,
        empty: bool,
        parent: Option<DataNodeId>,
    ) -> Result<()> {
        let raw = if empty {
            String::new()
        } else {
            let span = self.reader.read_to_end(start.name())?;
            self.input[span.start as usize..span.end as usize].to_string()
        };
        let id = self.tree.alloc(DataNode {
            schema: None,
            parent: None,
            children: Vec::new(),
            kind: DataNodeKind::Opaq {
                name: IStr::from(local),
                module: ns.map(|n| IStr::from(n.as_str())),
                value: IStr::from(raw.as_str()),
            },
            flags: DataFlags::NEW,
            meta: Vec::new(),
            target: None,
        });
        self.tree.link(parent, id);
        Ok(())
    }

    /// In strict mode list keys must precede other children.
    fn check_keys_first(&self, id: DataNodeId) -> Result<()> {
        let set = self.set();
        let Some(snode) = self.tree.node(id).schema else { return Ok(()) };
        let SnodeKind::List { keys, .. } = &set.node(snode).kind else { return Ok(()) };
        let mut seen_non_key = false;
        for &c in &self.tree.node(id).children {
            let is_key = self
                .tree
                .node(c)
                .schema
                .is_some_and(|s| keys.contains(&s));
            if is_key && seen_non_key {
                return Err(Error::syntax(format!(
                    "list key after non-key children in \"{}\"",
                    set.node(snode).name
                )));
            }
            if !is_key {
                seen_non_key = true;
            }
        }
        Ok(())
    }
}

// ======================================================================
// Printing
// ======================================================================

pub(crate) fn print_xml(
    ctx: &Context,
    tree: &DataTree,
    options: PrintOptions,
    with_defaults: WithDefaults,
) -> Result<String> {
    let mut printer = XmlPrinter {
        set: ctx.schema(),
        tree,
        shrink: options.contains(PrintOptions::SHRINK),
        with_defaults,
        out: String::new(),
    };
    for &root in tree.roots() {
        printer.print_node(root, None, 0)?;
        if !options.contains(PrintOptions::WITH_SIBLINGS) {
            break;
        }
    }
    Ok(printer.out)
}

struct XmlPrinter<'a> {
    set: &'a SchemaSet,
    tree: &'a DataTree,
    shrink: bool,
    with_defaults: WithDefaults,
    out: String,
}

impl XmlPrinter<'_> {
    fn newline_indent(&mut self, depth: usize) {
        if !self.shrink {
            if !self.out.is_empty() {
                self.out.push('\n');
            }
            for _ in 0..depth {
                self.out.push_str("  ");
            }
        }
    }

    fn skip_node(&self, id: DataNodeId) -> bool {
        crate::data::skip_for_defaults(self.set, self.tree, id, self.with_defaults)
    }

    fn tag_default(&self, id: DataNodeId) -> bool {
        crate::data::tag_for_defaults(self.set, self.tree, id, self.with_defaults)
    }

    fn print_node(
        &mut self,
        id: DataNodeId,
        parent_module: Option<ModuleId>,
        depth: usize,
    ) -> Result<()> {
        if self.skip_node(id) {
            return Ok(());
        }
        let node = self.tree.node(id);
        let (name, ns_decl, module) = match node.schema {
            Some(snode) => {
                let sn = self.set.node(snode);
                let module = sn.module;
                let ns = (parent_module != Some(module))
                    .then(|| self.set.module(module).namespace.to_string());
                (sn.name.to_string(), ns, Some(module))
            }
            None => match &node.kind {
                DataNodeKind::Opaq { name, module, .. } => {
                    (name.to_string(), module.as_ref().map(|m| m.to_string()), parent_module)
                }
                _ => return Err(Error::Internal("unschematized non-opaque node".into())),
            },
        };

        self.newline_indent(depth);
        self.out.push('<');
        self.out.push_str(&name);
        if let Some(uri) = ns_decl {
            self.out.push_str(&format!(" xmlns=\"{}\"", escape_attr(&uri)));
        }
        for meta in &node.meta {
            // Qualify each metadata attribute with its module's namespace.
            let prefix = sanitize_prefix(&meta.module);
            let uri = self
                .set
                .find_module(&meta.module)
                .map(|m| self.set.module(m).namespace.to_string())
                .unwrap_or_else(|| WD_NAMESPACE.to_string());
            self.out.push_str(&format!(
                " xmlns:{prefix}=\"{}\" {prefix}:{}=\"{}\"",
                escape_attr(&uri),
                meta.name,
                escape_attr(&meta.value)
            ));
        }
        if self.tag_default(id) {
            self.out.push_str(&format!(
                " xmlns:wd=\"{WD_NAMESPACE}\" wd:default=\"true\""
            ));
        }

        match &node.kind {
            DataNodeKind::Term { value } => {
                let text = value.to_lexical(self.set, ValueFmt::Xml);
                if text.is_empty() {
                    self.out.push_str("/>");
                } else {
                    self.out.push('>');
                    self.out.push_str(&escape_text(&text));
                    self.out.push_str(&format!("</{name}>"));
                }
            }
            DataNodeKind::Any { value } => {
                let raw = match value {
                    AnyValue::Xml(x) => x.to_string(),
                    AnyValue::Json(j) => escape_text(j),
                };
                if raw.is_empty() {
                    self.out.push_str("/>");
                } else {
                    self.out.push('>');
                    self.out.push_str(&raw);
                    self.out.push_str(&format!("</{name}>"));
                }
            }
            DataNodeKind::Opaq { value, .. } => {
                if value.is_empty() {
                    self.out.push_str("/>");
                } else {
                    self.out.push('>');
                    self.out.push_str(value);
                    self.out.push_str(&format!("</{name}>"));
                }
            }
            DataNodeKind::Inner => {
                let printable: Vec<DataNodeId> = node
                    .children
                    .iter()
                    .copied()
                    .filter(|&c| !self.skip_node(c))
                    .collect();
                if printable.is_empty() {
                    self.out.push_str("/>");
                } else {
                    self.out.push('>');
                    for c in printable {
                        self.print_node(c, module, depth + 1)?;
                    }
                    self.newline_indent(depth);
                    self.out.push_str(&format!("</{name}>"));
                }
            }
        }
        Ok(())
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

/// Metadata modules become XML prefixes; keep them NCName-safe.
fn sanitize_prefix(module: &str) -> String {
    let p: String = module
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if p.is_empty() { "m".to_string() } else { p }
}
