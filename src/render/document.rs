//! Mutable view over a chart's pre-rendered markup.
//!
//! The source markup is parsed once with `scraper` and never changes. Every
//! edit a chart makes (attributes, inline styles, classes, text, created
//! elements, removals) lives in an overlay keyed by [`NodeHandle`], and
//! [`ChartDocument::render`] serializes the source tree with the overlay
//! applied. Selectors always run against the source tree.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ego_tree::{NodeId, NodeRef};
use scraper::{ElementRef, Html, Node, Selector};

use crate::error::ChartError;

/// Handle to an element of a [`ChartDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeHandle {
    /// Element present in the parsed markup.
    Source(NodeId),
    /// Element created by a chart.
    Created(usize),
}

/// Pending edits for one element.
#[derive(Debug, Clone, Default)]
struct Overlay {
    /// Replaced or added attributes, keyed by local name.
    attrs: BTreeMap<String, String>,
    /// Inline style properties; an empty value removes the property.
    styles: Vec<(String, String)>,
    classes_added: BTreeSet<String>,
    classes_removed: BTreeSet<String>,
    content: Option<Content>,
    removed: bool,
    appended: Vec<usize>,
}

#[derive(Debug, Clone)]
enum Content {
    Text(String),
    Markup(String),
}

#[derive(Debug, Clone)]
struct CreatedElement {
    tag: String,
    attrs: Vec<(String, String)>,
    parent: Option<NodeHandle>,
}

/// Parsed chart markup plus the edits applied to it.
pub struct ChartDocument {
    html: Html,
    overlays: HashMap<NodeHandle, Overlay>,
    created: Vec<CreatedElement>,
}

impl std::fmt::Debug for ChartDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartDocument")
            .field("overlays", &self.overlays.len())
            .field("created", &self.created.len())
            .finish()
    }
}

/// Compile a CSS selector.
pub fn selector(source: &str) -> Result<Selector, ChartError> {
    Selector::parse(source).map_err(|_| ChartError::InvalidSelector(source.to_string()))
}

impl ChartDocument {
    /// Parse a markup fragment (typically one `<svg>` element and its wrapper).
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_fragment(markup),
            overlays: HashMap::new(),
            created: Vec::new(),
        }
    }

    fn element(&self, node: NodeHandle) -> Option<ElementRef<'_>> {
        match node {
            NodeHandle::Source(id) => self.html.tree.get(id).and_then(ElementRef::wrap),
            NodeHandle::Created(_) => None,
        }
    }

    fn overlay_mut(&mut self, node: NodeHandle) -> &mut Overlay {
        self.overlays.entry(node).or_default()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// All elements matching `css`, in document order.
    pub fn select(&self, css: &str) -> Result<Vec<NodeHandle>, ChartError> {
        let sel = selector(css)?;
        Ok(self
            .html
            .select(&sel)
            .map(|el| NodeHandle::Source(el.id()))
            .collect())
    }

    /// First element matching `css`.
    pub fn select_first(&self, css: &str) -> Result<Option<NodeHandle>, ChartError> {
        let sel = selector(css)?;
        Ok(self.html.select(&sel).next().map(|el| NodeHandle::Source(el.id())))
    }

    /// Descendants of `scope` matching `css`. Created elements have none.
    pub fn select_within(
        &self,
        scope: NodeHandle,
        css: &str,
    ) -> Result<Vec<NodeHandle>, ChartError> {
        let sel = selector(css)?;
        Ok(self
            .element(scope)
            .map(|el| {
                el.select(&sel)
                    .map(|child| NodeHandle::Source(child.id()))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Nearest element, starting with `node` itself, that matches `css`.
    pub fn closest(&self, node: NodeHandle, css: &str) -> Result<Option<NodeHandle>, ChartError> {
        let sel = selector(css)?;
        let Some(start) = self.element(node) else {
            return Ok(None);
        };
        if sel.matches(&start) {
            return Ok(Some(node));
        }
        Ok(start
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| sel.matches(el))
            .map(|el| NodeHandle::Source(el.id())))
    }

    /// Parent element. Created elements report the element they were
    /// appended to.
    pub fn parent(&self, node: NodeHandle) -> Option<NodeHandle> {
        if let NodeHandle::Created(index) = node {
            return self.created.get(index)?.parent;
        }
        self.element(node)?
            .parent()
            .and_then(ElementRef::wrap)
            .map(|el| NodeHandle::Source(el.id()))
    }

    /// Tag name (local name for namespaced elements).
    pub fn tag_name(&self, node: NodeHandle) -> Option<String> {
        match node {
            NodeHandle::Source(_) => self.element(node).map(|el| el.value().name().to_string()),
            NodeHandle::Created(index) => self.created.get(index).map(|c| c.tag.clone()),
        }
    }

    fn source_attr(&self, node: NodeHandle, name: &str) -> Option<String> {
        match node {
            NodeHandle::Source(_) => {
                let el = self.element(node)?;
                // Match on local name so `xlink:href` is found as `href`.
                el.value()
                    .attrs()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| value.to_string())
            }
            NodeHandle::Created(index) => self
                .created
                .get(index)?
                .attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone()),
        }
    }

    /// Current value of an attribute, edits included.
    pub fn attr(&self, node: NodeHandle, name: &str) -> Option<String> {
        if let Some(value) = self.overlays.get(&node).and_then(|o| o.attrs.get(name)) {
            return Some(value.clone());
        }
        self.source_attr(node, name)
    }

    /// Current value of an inline style property, edits included.
    pub fn style(&self, node: NodeHandle, property: &str) -> Option<String> {
        if let Some(overlay) = self.overlays.get(&node) {
            if let Some((_, value)) = overlay.styles.iter().find(|(p, _)| p == property) {
                return (!value.is_empty()).then(|| value.clone());
            }
        }
        parse_style(&self.attr(node, "style").unwrap_or_default())
            .into_iter()
            .find(|(p, _)| p == property)
            .map(|(_, v)| v)
    }

    /// Classes currently on `node`.
    pub fn classes(&self, node: NodeHandle) -> Vec<String> {
        let mut classes: Vec<String> = self
            .attr(node, "class")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if let Some(overlay) = self.overlays.get(&node) {
            classes.retain(|c| !overlay.classes_removed.contains(c));
            for added in &overlay.classes_added {
                if !classes.contains(added) {
                    classes.push(added.clone());
                }
            }
        }
        classes
    }

    pub fn has_class(&self, node: NodeHandle, class: &str) -> bool {
        self.classes(node).iter().any(|c| c == class)
    }

    /// Concatenated text content.
    pub fn text(&self, node: NodeHandle) -> String {
        if let Some(content) = self.overlays.get(&node).and_then(|o| o.content.as_ref()) {
            return match content {
                Content::Text(text) => text.clone(),
                Content::Markup(markup) => Html::parse_fragment(markup)
                    .root_element()
                    .text()
                    .collect(),
            };
        }
        self.element(node)
            .map(|el| el.text().collect())
            .unwrap_or_default()
    }

    /// Serialized children of `node`, edits included.
    pub fn inner_html(&self, node: NodeHandle) -> String {
        let mut out = String::new();
        self.write_children(node, &mut out);
        out
    }

    // =========================================================================
    // Edits
    // =========================================================================

    pub fn set_attr(&mut self, node: NodeHandle, name: &str, value: impl Into<String>) {
        self.overlay_mut(node)
            .attrs
            .insert(name.to_string(), value.into());
    }

    /// Set an inline style property. An empty value removes it.
    pub fn set_style(&mut self, node: NodeHandle, property: &str, value: impl Into<String>) {
        let value = value.into();
        let styles = &mut self.overlay_mut(node).styles;
        match styles.iter_mut().find(|(p, _)| p == property) {
            Some(entry) => entry.1 = value,
            None => styles.push((property.to_string(), value)),
        }
    }

    /// Add or remove a class.
    pub fn toggle_class(&mut self, node: NodeHandle, class: &str, on: bool) {
        let overlay = self.overlay_mut(node);
        if on {
            overlay.classes_removed.remove(class);
            overlay.classes_added.insert(class.to_string());
        } else {
            overlay.classes_added.remove(class);
            overlay.classes_removed.insert(class.to_string());
        }
    }

    /// Replace the children of `node` with a text node.
    pub fn set_text(&mut self, node: NodeHandle, text: impl Into<String>) {
        self.overlay_mut(node).content = Some(Content::Text(text.into()));
    }

    /// Replace the children of `node` with raw markup.
    pub fn set_inner_html(&mut self, node: NodeHandle, markup: impl Into<String>) {
        self.overlay_mut(node).content = Some(Content::Markup(markup.into()));
    }

    /// Drop `node` (and its subtree) from the rendered output.
    pub fn remove(&mut self, node: NodeHandle) {
        self.overlay_mut(node).removed = true;
    }

    /// Create a detached element. Attach it with [`Self::append`].
    pub fn create(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeHandle {
        self.created.push(CreatedElement {
            tag: tag.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            parent: None,
        });
        NodeHandle::Created(self.created.len() - 1)
    }

    /// Append a created element as the last child of `parent`.
    pub fn append(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<(), ChartError> {
        let NodeHandle::Created(index) = child else {
            return Err(ChartError::StructuralMismatch(
                "only created elements can be appended".to_string(),
            ));
        };
        if let Some(created) = self.created.get_mut(index) {
            created.parent = Some(parent);
        }
        self.overlay_mut(parent).appended.push(index);
        Ok(())
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serialize the whole fragment with all edits applied.
    pub fn render(&self) -> String {
        let root = self.html.root_element();
        let mut out = String::new();
        for child in root.children() {
            self.write_node(child, false, &mut out);
        }
        out
    }

    /// Serialize one element with edits applied.
    pub fn render_node(&self, node: NodeHandle) -> String {
        let mut out = String::new();
        match node {
            NodeHandle::Source(id) => {
                if let Some(source) = self.html.tree.get(id) {
                    let in_svg = source
                        .ancestors()
                        .filter_map(ElementRef::wrap)
                        .any(|el| el.value().name() == "svg");
                    self.write_node(source, in_svg, &mut out);
                }
            }
            NodeHandle::Created(index) => self.write_created(index, &mut out),
        }
        out
    }

    fn write_node(&self, node: NodeRef<'_, Node>, in_svg: bool, out: &mut String) {
        match node.value() {
            Node::Text(text) => {
                let text: &str = text;
                out.push_str(&escape_text(text));
            }
            Node::Comment(comment) => {
                let comment: &str = comment;
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            Node::Element(element) => {
                let handle = NodeHandle::Source(node.id());
                if self.overlays.get(&handle).is_some_and(|o| o.removed) {
                    return;
                }
                let tag = element.name();
                let in_svg = in_svg || tag == "svg";
                // Written as in the source, e.g. `xlink:href` or plain `href`.
                let base: Vec<(String, String)> = element
                    .attrs
                    .iter()
                    .map(|(name, value)| {
                        let key = match &name.prefix {
                            Some(prefix) => format!("{}:{}", prefix, name.local),
                            None => name.local.to_string(),
                        };
                        (key, value.to_string())
                    })
                    .collect();

                self.write_open_tag(handle, tag, &base, out);
                if is_void(tag) && !in_svg {
                    return;
                }
                self.write_children_of(handle, Some(node), in_svg, out);
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            _ => {}
        }
    }

    fn write_created(&self, index: usize, out: &mut String) {
        let Some(created) = self.created.get(index) else {
            return;
        };
        let handle = NodeHandle::Created(index);
        if self.overlays.get(&handle).is_some_and(|o| o.removed) {
            return;
        }
        self.write_open_tag(handle, &created.tag, &created.attrs, out);
        self.write_children_of(handle, None, true, out);
        out.push_str("</");
        out.push_str(&created.tag);
        out.push('>');
    }

    fn write_children(&self, node: NodeHandle, out: &mut String) {
        match node {
            NodeHandle::Source(id) => {
                if let Some(source) = self.html.tree.get(id) {
                    let in_svg = source
                        .ancestors()
                        .chain(std::iter::once(source))
                        .filter_map(ElementRef::wrap)
                        .any(|el| el.value().name() == "svg");
                    self.write_children_of(node, Some(source), in_svg, out);
                }
            }
            NodeHandle::Created(_) => self.write_children_of(node, None, true, out),
        }
    }

    fn write_children_of(
        &self,
        handle: NodeHandle,
        source: Option<NodeRef<'_, Node>>,
        in_svg: bool,
        out: &mut String,
    ) {
        let overlay = self.overlays.get(&handle);
        match overlay.and_then(|o| o.content.as_ref()) {
            Some(Content::Text(text)) => out.push_str(&escape_text(text)),
            Some(Content::Markup(markup)) => out.push_str(markup),
            None => {
                if let Some(source) = source {
                    for child in source.children() {
                        self.write_node(child, in_svg, out);
                    }
                }
            }
        }
        if let Some(overlay) = overlay {
            for index in &overlay.appended {
                self.write_created(*index, out);
            }
        }
    }

    fn write_open_tag(
        &self,
        handle: NodeHandle,
        tag: &str,
        base: &[(String, String)],
        out: &mut String,
    ) {
        let overlay = self.overlays.get(&handle);
        let mut attrs: Vec<(String, String)> = Vec::with_capacity(base.len() + 2);
        for (key, value) in base {
            let value = overlay
                .and_then(|o| o.attrs.get(local_name(key)))
                .unwrap_or(value);
            attrs.push((key.clone(), value.clone()));
        }
        if let Some(overlay) = overlay {
            for (key, value) in &overlay.attrs {
                if !base.iter().any(|(k, _)| local_name(k) == key) {
                    attrs.push((key.clone(), value.clone()));
                }
            }
            if !overlay.classes_added.is_empty() || !overlay.classes_removed.is_empty() {
                let classes = self.classes(handle).join(" ");
                upsert(&mut attrs, "class", classes);
            }
            if !overlay.styles.is_empty() {
                let current = attrs
                    .iter()
                    .find(|(k, _)| k == "style")
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default();
                let mut styles = parse_style(&current);
                for (property, value) in &overlay.styles {
                    styles.retain(|(p, _)| p != property);
                    if !value.is_empty() {
                        styles.push((property.clone(), value.clone()));
                    }
                }
                upsert(&mut attrs, "style", format_style(&styles));
            }
        }

        out.push('<');
        out.push_str(tag);
        for (key, value) in &attrs {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
        out.push('>');
    }
}

fn upsert(attrs: &mut Vec<(String, String)>, key: &str, value: String) {
    match attrs.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = value,
        None => attrs.push((key.to_string(), value)),
    }
}

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta" | "source" | "wbr"
    )
}

/// Split an inline style attribute into `(property, value)` pairs.
pub fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (property, value) = decl.split_once(':')?;
            let property = property.trim();
            (!property.is_empty()).then(|| (property.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn format_style(styles: &[(String, String)]) -> String {
    styles
        .iter()
        .map(|(p, v)| format!("{}: {};", p, v))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub(crate) fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}
