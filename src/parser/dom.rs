use anyhow::{bail, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// HTML elements that never carry children.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

#[derive(Debug)]
pub enum NodeKind {
    Element(Element),
    Text(String),
}

#[derive(Debug)]
pub struct Element {
    pub name: String,
    pub classes: Vec<String>,
    pub id: Option<String>,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<NodeId>,
}

impl Element {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug)]
struct NodeData {
    parent: Option<NodeId>,
    kind: NodeKind,
}

/// A parsed markup document: an arena of nodes under a synthetic root.
/// Traversal order everywhere is document (pre-order) order.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    /// Parse raw markup into a node tree. The page fragments Bible Gateway
    /// serves are not strict XML, so end-tag name checking is off and void
    /// elements close immediately.
    pub fn parse(raw: &str) -> Result<Document> {
        let mut reader = Reader::from_str(raw);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        let mut doc = Document {
            nodes: vec![NodeData {
                parent: None,
                kind: NodeKind::Element(Element {
                    name: String::new(),
                    classes: Vec::new(),
                    id: None,
                    attrs: Vec::new(),
                    children: Vec::new(),
                }),
            }],
        };
        let root = NodeId(0);
        let mut stack = vec![root];

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let parent = *stack.last().unwrap();
                    let element = build_element(&e)?;
                    let is_void = VOID_ELEMENTS.contains(&element.name.as_str());
                    let id = doc.push(parent, NodeKind::Element(element));
                    if !is_void {
                        stack.push(id);
                    }
                }
                Ok(Event::Empty(e)) => {
                    let parent = *stack.last().unwrap();
                    let element = build_element(&e)?;
                    doc.push(parent, NodeKind::Element(element));
                }
                Ok(Event::End(_)) => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e.decode()?.into_owned();
                    if !text.is_empty() {
                        let parent = *stack.last().unwrap();
                        doc.push(parent, NodeKind::Text(text));
                    }
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    let parent = *stack.last().unwrap();
                    doc.push(parent, NodeKind::Text(text));
                }
                Ok(Event::GeneralRef(e)) => {
                    // Entity references, most commonly &nbsp; in poetry
                    // continuation lines.
                    let parent = *stack.last().unwrap();
                    let name = String::from_utf8_lossy(&e).into_owned();
                    doc.push(parent, NodeKind::Text(decode_entity(&name)));
                }
                Ok(Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => bail!("unparsable markup at byte {}: {}", reader.buffer_position(), e),
            }
        }

        Ok(doc)
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            parent: Some(parent),
            kind,
        });
        if let NodeKind::Element(el) = &mut self.nodes[parent.0].kind {
            el.children.push(id);
        }
        id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(el) => Some(el),
            NodeKind::Text(_) => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.nodes[id.0].parent?;
        // The synthetic root is not an ancestor callers care about.
        if parent.0 == 0 {
            None
        } else {
            Some(parent)
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id.0].kind {
            NodeKind::Element(el) => &el.children,
            NodeKind::Text(_) => &[],
        }
    }

    /// Previous sibling, skipping whitespace-only text nodes.
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.nodes[id.0].parent?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&s| s == id)?;
        siblings[..pos]
            .iter()
            .rev()
            .copied()
            .find(|&s| match &self.nodes[s.0].kind {
                NodeKind::Text(t) => !t.trim().is_empty(),
                NodeKind::Element(_) => true,
            })
    }

    /// Ancestor chain, nearest first, excluding the synthetic root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&n| self.parent(n))
    }

    /// All elements matching the predicate, in document order.
    pub fn find_all(&self, pred: impl Fn(&Element) -> bool) -> Vec<NodeId> {
        self.find_all_in(self.root(), pred)
    }

    /// All matching elements in the subtree under `root` (exclusive), in
    /// document order.
    pub fn find_all_in(&self, root: NodeId, pred: impl Fn(&Element) -> bool) -> Vec<NodeId> {
        let mut found = Vec::new();
        for &child in self.children(root) {
            self.walk(child, &pred, &mut found);
        }
        found
    }

    pub fn find_first(&self, pred: impl Fn(&Element) -> bool) -> Option<NodeId> {
        self.find_all(pred).into_iter().next()
    }

    pub fn find_first_in(&self, root: NodeId, pred: impl Fn(&Element) -> bool) -> Option<NodeId> {
        self.find_all_in(root, pred).into_iter().next()
    }

    fn walk(&self, id: NodeId, pred: &impl Fn(&Element) -> bool, found: &mut Vec<NodeId>) {
        if let Some(el) = self.element(id) {
            if !el.name.is_empty() && pred(el) {
                found.push(id);
            }
        }
        for &child in self.children(id) {
            self.walk(child, pred, found);
        }
    }

    /// Concatenated text of the node and all its descendants.
    pub fn text_of(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            NodeKind::Text(t) => out.push_str(t),
            NodeKind::Element(el) => {
                for &child in &el.children {
                    self.collect_text(child, out);
                }
            }
        }
    }
}

fn build_element(e: &BytesStart) -> Result<Element> {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
    let mut classes = Vec::new();
    let mut id = None;
    let mut attrs = Vec::new();

    for attr in e.attributes().with_checks(false).flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value()?.into_owned();
        match key.as_str() {
            "class" => classes = value.split_whitespace().map(str::to_string).collect(),
            "id" => id = Some(value.clone()),
            _ => {}
        }
        attrs.push((key, value));
    }

    Ok(Element {
        name,
        classes,
        id,
        attrs,
        children: Vec::new(),
    })
}

fn decode_entity(name: &str) -> String {
    match name {
        "nbsp" => return "\u{a0}".to_string(),
        "amp" => return "&".to_string(),
        "lt" => return "<".to_string(),
        "gt" => return ">".to_string(),
        "quot" => return "\"".to_string(),
        "apos" => return "'".to_string(),
        _ => {}
    }
    // Numeric character references: &#182; or &#xB6;
    let code = name
        .strip_prefix("#x")
        .or_else(|| name.strip_prefix("#X"))
        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
        .or_else(|| name.strip_prefix('#').and_then(|dec| dec.parse().ok()));
    match code.and_then(char::from_u32) {
        Some(c) => c.to_string(),
        None => format!("&{};", name),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_and_ids() {
        let doc = Document::parse(r#"<div class="a b" id="x"><span class="b">hi</span></div>"#)
            .unwrap();
        let div = doc.find_first(|el| el.name == "div").unwrap();
        let el = doc.element(div).unwrap();
        assert!(el.has_class("a"));
        assert!(el.has_class("b"));
        assert!(!el.has_class("c"));
        assert_eq!(el.id.as_deref(), Some("x"));
    }

    #[test]
    fn document_order() {
        let doc = Document::parse("<p><b>1</b><i>2</i></p><p><b>3</b></p>").unwrap();
        let texts: Vec<String> = doc
            .find_all(|el| el.name == "b" || el.name == "i")
            .into_iter()
            .map(|id| doc.text_of(id))
            .collect();
        assert_eq!(texts, ["1", "2", "3"]);
    }

    #[test]
    fn prev_sibling_skips_whitespace() {
        let doc = Document::parse("<p><b>1</b>\n  <i>2</i></p>").unwrap();
        let i = doc.find_first(|el| el.name == "i").unwrap();
        let prev = doc.prev_sibling(i).unwrap();
        assert_eq!(doc.element(prev).unwrap().name, "b");

        let b = doc.find_first(|el| el.name == "b").unwrap();
        assert!(doc.prev_sibling(b).is_none());
    }

    #[test]
    fn prev_sibling_returns_text() {
        let doc = Document::parse("<p>before<i>2</i></p>").unwrap();
        let i = doc.find_first(|el| el.name == "i").unwrap();
        let prev = doc.prev_sibling(i).unwrap();
        assert!(matches!(doc.kind(prev), NodeKind::Text(t) if t == "before"));
    }

    #[test]
    fn ancestors_nearest_first() {
        let doc = Document::parse(r#"<div class="outer"><p><span>x</span></p></div>"#).unwrap();
        let span = doc.find_first(|el| el.name == "span").unwrap();
        let names: Vec<String> = doc
            .ancestors(span)
            .map(|id| doc.element(id).unwrap().name.clone())
            .collect();
        assert_eq!(names, ["p", "div"]);
    }

    #[test]
    fn text_of_descends() {
        let doc = Document::parse("<p>a<b>b<i>c</i></b>d</p>").unwrap();
        let p = doc.find_first(|el| el.name == "p").unwrap();
        assert_eq!(doc.text_of(p), "abcd");
    }

    #[test]
    fn void_elements_do_not_nest() {
        let doc = Document::parse("<p>one<br>two</p>").unwrap();
        let p = doc.find_first(|el| el.name == "p").unwrap();
        assert_eq!(doc.text_of(p), "onetwo");
        let br = doc.find_first(|el| el.name == "br").unwrap();
        assert!(doc.children(br).is_empty());
    }

    #[test]
    fn nbsp_entity_preserved() {
        let doc = Document::parse("<span>&nbsp;&nbsp;lead</span>").unwrap();
        let span = doc.find_first(|el| el.name == "span").unwrap();
        assert_eq!(doc.text_of(span), "\u{a0}\u{a0}lead");
    }

    #[test]
    fn unparsable_is_fatal() {
        // Markup truncated inside a tag cannot produce a tree.
        assert!(Document::parse("<p>text<di").is_err());
    }
}
