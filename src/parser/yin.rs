//! YIN front-end: the XML encoding of YANG (RFC 7950 §13).
//!
//! Maps a quick-xml event stream onto the same [`Statement`] tree the YANG
//! parser produces. Element names map to keywords; a statement's argument
//! arrives either as an attribute or as a child element, per keyword.
//! Namespace scoping is tracked explicitly from `xmlns` attributes.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::base::{Interner, Position};
use crate::error::{Error, Result};
use crate::parser::keywords::Keyword;
use crate::parser::stmt::{ParsedModule, Statement};

/// The YIN namespace URI.
pub const YIN_NAMESPACE: &str = "urn:ietf:params:xml:ns:yang:yin:1";

/// Parse YIN text into a module, using a throwaway interner.
pub fn parse_yin(input: &str) -> Result<ParsedModule> {
    let mut interner = Interner::new();
    parse_yin_in(&mut interner, input)
}

/// Parse YIN text into a module, interning strings into `interner`.
pub fn parse_yin_in(interner: &mut Interner, input: &str) -> Result<ParsedModule> {
    let reader = Reader::from_str(input);
    let mut parser = YinParser {
        reader,
        input,
        interner,
        ns: NsScope::default(),
    };
    let root = parser.parse_document()?;
    ParsedModule::new(root)
}

/// Scoped prefix → namespace-URI bindings collected from `xmlns`
/// attributes; one frame per open element.
#[derive(Debug, Default)]
pub(crate) struct NsScope {
    frames: Vec<Vec<(String, String)>>,
}

impl NsScope {
    /// Open a frame for an element, recording its xmlns declarations.
    pub(crate) fn push_frame(&mut self, start: &BytesStart<'_>) -> Result<()> {
        let mut frame = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| Error::syntax(format!("bad attribute: {e}")))?;
            let key = attr.key.as_ref();
            let prefix = if key == b"xmlns" {
                String::new()
            } else if let Some(rest) = key.strip_prefix(b"xmlns:") {
                String::from_utf8_lossy(rest).into_owned()
            } else {
                continue;
            };
            let uri = attr
                .unescape_value()
                .map_err(|e| Error::syntax(format!("bad namespace value: {e}")))?
                .into_owned();
            frame.push((prefix, uri));
        }
        self.frames.push(frame);
        Ok(())
    }

    pub(crate) fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// The binding visible at the current element; `None` prefix means the
    /// default namespace.
    pub(crate) fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        let wanted = prefix.unwrap_or("");
        for frame in self.frames.iter().rev() {
            for (p, uri) in frame.iter().rev() {
                if p == wanted {
                    return (!uri.is_empty()).then_some(uri.as_str());
                }
            }
        }
        None
    }

    /// Namespace of an element, from its qualified name.
    pub(crate) fn element_ns(&self, start: &BytesStart<'_>) -> Option<String> {
        let prefix = start
            .name()
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
        self.resolve(prefix.as_deref()).map(|s| s.to_string())
    }
}

struct YinParser<'a, 'i> {
    reader: Reader<&'a [u8]>,
    input: &'a str,
    interner: &'i mut Interner,
    ns: NsScope,
}

impl<'a> YinParser<'a, '_> {
    fn position(&self) -> Position {
        let offset = (self.reader.buffer_position() as usize).min(self.input.len());
        let before = &self.input[..offset];
        let line = before.matches('\n').count() + 1;
        let column = before.rfind('\n').map_or(offset + 1, |nl| offset - nl);
        Position::new(line, column)
    }

    fn syntax(&self, message: impl Into<String>) -> Error {
        Error::syntax_at(message, self.position())
    }

    /// Skip the prolog, read the single root element.
    fn parse_document(&mut self) -> Result<Statement> {
        loop {
            match self.reader.read_event()? {
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Text(t) => {
                    if !t.unescape()?.trim().is_empty() {
                        return Err(self.syntax("text content outside the root element"));
                    }
                }
                Event::Start(start) => {
                    self.ns.push_frame(&start)?;
                    let root = self.parse_statement(&start, false)?;
                    self.ns.pop_frame();
                    return Ok(root);
                }
                Event::Empty(start) => {
                    self.ns.push_frame(&start)?;
                    let root = self.parse_statement(&start, true)?;
                    self.ns.pop_frame();
                    return Ok(root);
                }
                Event::Eof => {
                    return Err(Error::InputExhausted {
                        message: "empty YIN document".into(),
                        pos: None,
                    });
                }
                _ => return Err(self.syntax("unexpected content before the root element")),
            }
        }
    }

    /// Read one statement element (and its subtree). The element's
    /// namespace frame must already be pushed.
    fn parse_statement(&mut self, start: &BytesStart<'a>, empty: bool) -> Result<Statement> {
        let pos = self.position();
        let local = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let ns = self.ns.element_ns(start);

        let keyword = if ns.as_deref() == Some(YIN_NAMESPACE) {
            Keyword::from_str(&local)
                .ok_or_else(|| self.syntax(format!("unknown YIN element \"{local}\"")))?
        } else {
            // Extension instance: element in the extension module's namespace.
            let prefix = start
                .name()
                .prefix()
                .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
                .unwrap_or_default();
            Keyword::Unknown {
                prefix: self.interner.intern(&prefix),
                name: self.interner.intern(&local),
            }
        };

        // Argument from attribute, unless this keyword carries it in a
        // child element (handled below) or takes none.
        let arg_spec = keyword.yin_argument();
        let mut arg: Option<String> = None;
        for attr in start.attributes() {
            let attr = attr.map_err(|e| self.syntax(format!("bad attribute: {e}")))?;
            if attr.key.as_ref().starts_with(b"xmlns") {
                continue;
            }
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| self.syntax(format!("bad attribute value: {e}")))?;
            match (&keyword, arg_spec) {
                (Keyword::Unknown { .. }, _) => {
                    // Extension arguments are not declared here; keep the
                    // first attribute as the argument.
                    if arg.is_none() {
                        arg = Some(value.into_owned());
                    }
                }
                (_, Some((name, false))) if key == name => arg = Some(value.into_owned()),
                _ => {
                    return Err(
                        self.syntax(format!("unexpected attribute \"{key}\" on \"{local}\""))
                    );
                }
            }
        }

        let mut stmt = Statement::new(keyword.clone(), None, pos);

        if !empty {
            self.parse_children(&mut stmt, &local, &mut arg)?;
        }

        if let Some((name, _)) = arg_spec {
            if arg.is_none() && !matches!(keyword, Keyword::Unknown { .. }) {
                return Err(self.syntax(format!(
                    "element \"{local}\" is missing its \"{name}\" argument"
                )));
            }
        }
        stmt.arg = arg.map(|a| self.interner.intern_string(a));
        Ok(stmt)
    }

    /// Children: substatement elements, or the argument-carrying child
    /// element for keywords like `description`.
    fn parse_children(
        &mut self,
        stmt: &mut Statement,
        parent_local: &str,
        arg: &mut Option<String>,
    ) -> Result<()> {
        let arg_element = match stmt.keyword.yin_argument() {
            Some((name, true)) => Some(name),
            _ => None,
        };
        loop {
            match self.reader.read_event()? {
                Event::Start(child) => {
                    self.ns.push_frame(&child)?;
                    let child_local =
                        String::from_utf8_lossy(child.local_name().as_ref()).into_owned();
                    if arg_element == Some(child_local.as_str())
                        && self.ns.element_ns(&child).as_deref() == Some(YIN_NAMESPACE)
                    {
                        *arg = Some(self.read_text(&child_local)?);
                    } else {
                        let parsed = self.parse_statement(&child, false)?;
                        stmt.children.push(parsed);
                    }
                    self.ns.pop_frame();
                }
                Event::Empty(child) => {
                    self.ns.push_frame(&child)?;
                    let parsed = self.parse_statement(&child, true)?;
                    stmt.children.push(parsed);
                    self.ns.pop_frame();
                }
                Event::Text(t) => {
                    if !t.unescape()?.trim().is_empty() {
                        return Err(
                            self.syntax(format!("mixed content inside \"{parent_local}\""))
                        );
                    }
                }
                Event::CData(c) => {
                    if !String::from_utf8_lossy(&c).trim().is_empty() {
                        return Err(
                            self.syntax(format!("mixed content inside \"{parent_local}\""))
                        );
                    }
                }
                Event::Comment(_) | Event::PI(_) => {}
                Event::End(_) => return Ok(()),
                Event::Eof => {
                    return Err(Error::InputExhausted {
                        message: format!("unterminated element \"{parent_local}\""),
                        pos: Some(self.position()),
                    });
                }
                _ => return Err(self.syntax("unexpected XML content")),
            }
        }
    }

    /// Text content of an argument element (`<text>`, `<value>`).
    fn read_text(&mut self, elem_local: &str) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.reader.read_event()? {
                Event::Text(t) => text.push_str(&t.unescape()?),
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
                Event::Comment(_) => {}
                Event::End(_) => return Ok(text),
                Event::Start(_) | Event::Empty(_) => {
                    return Err(self.syntax(format!(
                        "argument element \"{elem_local}\" must contain only text"
                    )));
                }
                Event::Eof => {
                    return Err(Error::InputExhausted {
                        message: format!("unterminated argument element \"{elem_local}\""),
                        pos: Some(self.position()),
                    });
                }
                _ => return Err(self.syntax("unexpected XML content")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::keywords::Keyword;

    const YIN_HEADER: &str = r#"<module name="m"
        xmlns="urn:ietf:params:xml:ns:yang:yin:1"
        xmlns:m="urn:m">
        <namespace uri="urn:m"/>
        <prefix value="m"/>"#;

    #[test]
    fn test_minimal_yin_module() {
        let text = format!("{YIN_HEADER}</module>");
        let m = parse_yin(&text).unwrap();
        assert_eq!(m.name(), "m");
        assert_eq!(m.namespace(), Some("urn:m"));
        assert_eq!(m.prefix(), Some("m"));
    }

    #[test]
    fn test_argument_as_child_element() {
        let text = format!(
            "{YIN_HEADER}<description><text>first line</text></description></module>"
        );
        let m = parse_yin(&text).unwrap();
        assert_eq!(m.root().arg_of(Keyword::Description), Some("first line"));
    }

    #[test]
    fn test_leaf_with_type() {
        let text = format!(
            "{YIN_HEADER}<leaf name=\"foo\"><type name=\"string\"/></leaf></module>"
        );
        let m = parse_yin(&text).unwrap();
        let leaf = m.root().find(Keyword::Leaf).unwrap();
        assert_eq!(leaf.arg(), "foo");
        assert_eq!(leaf.arg_of(Keyword::Type), Some("string"));
    }

    #[test]
    fn test_entity_resolution() {
        let text = format!(
            "{YIN_HEADER}<description><text>a &lt;b&gt; &amp; &#x63;</text></description></module>"
        );
        let m = parse_yin(&text).unwrap();
        assert_eq!(m.root().arg_of(Keyword::Description), Some("a <b> & c"));
    }

    #[test]
    fn test_mixed_content_rejected() {
        let text = format!("{YIN_HEADER}stray text</module>");
        assert!(parse_yin(&text).is_err());
    }

    #[test]
    fn test_unknown_element_rejected() {
        let text = format!("{YIN_HEADER}<not-a-keyword name=\"x\"/></module>");
        assert!(parse_yin(&text).is_err());
    }

    #[test]
    fn test_missing_argument_attribute() {
        let text = format!("{YIN_HEADER}<leaf><type name=\"string\"/></leaf></module>");
        let err = parse_yin(&text).unwrap_err();
        assert!(err.to_string().contains("argument"));
    }

    #[test]
    fn test_extension_element() {
        let text = format!(
            "{YIN_HEADER}<x:note xmlns:x=\"urn:x\" value=\"hi\"/></module>"
        );
        let m = parse_yin(&text).unwrap();
        let ext = m
            .root()
            .children
            .iter()
            .find(|s| matches!(s.keyword, Keyword::Unknown { .. }))
            .unwrap();
        assert_eq!(ext.arg(), "hi");
    }

    #[test]
    fn test_namespace_scoping() {
        // A nested default namespace override hides the YIN namespace.
        let text = format!(
            "{YIN_HEADER}<other xmlns=\"urn:elsewhere\" value=\"v\"/></module>"
        );
        let m = parse_yin(&text).unwrap();
        // Treated as an extension instance, not a YIN keyword.
        assert!(
            m.root()
                .children
                .iter()
                .any(|s| matches!(s.keyword, Keyword::Unknown { .. }))
        );
    }
}
