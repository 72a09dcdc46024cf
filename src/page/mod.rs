//! Mutable HTML document standing in for the live forum page.
//!
//! The engine only ever talks to the page through this type: reads go through
//! `scraper` selectors, writes edit the underlying `ego_tree` in place and are
//! counted so callers can assert that a pass left the DOM untouched.

mod style;

use ego_tree::NodeId;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use scraper::{
    node::{Element, Text},
    ElementRef, Html, Node, Selector, StrTendril,
};
use thiserror::Error;
use url::Url;

pub use style::InlineStyle;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

#[derive(Debug, Error)]
pub enum PageError {
    #[error("invalid selector `{0}`")]
    InvalidSelector(String),
    #[error("no element matches `{0}`")]
    NoMatch(String),
}

pub fn compile(selector: &str) -> Result<Selector, PageError> {
    Selector::parse(selector).map_err(|_| PageError::InvalidSelector(selector.to_string()))
}

pub struct PageDocument {
    html: Html,
    location: Url,
    mutations: u64,
}

impl PageDocument {
    pub fn parse(source: &str, location: Url) -> Self {
        Self {
            html: Html::parse_document(source),
            location,
            mutations: 0,
        }
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn navigate(&mut self, location: Url) {
        self.location = location;
    }

    /// Number of DOM writes performed since the document was parsed.
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    pub fn to_html(&self) -> String {
        self.html.html()
    }

    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.html.tree.get(id).and_then(ElementRef::wrap)
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        let root = self.html.tree.root().id();
        match self.html.tree.get(id) {
            Some(node) => node.id() == root || node.ancestors().any(|a| a.id() == root),
            None => false,
        }
    }

    /// Attached elements matching `selector`, in document order. Detached
    /// subtrees stay in the arena but are never returned.
    pub fn select<'a>(&'a self, selector: &'a Selector) -> impl Iterator<Item = NodeId> + 'a {
        self.html
            .tree
            .root()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(move |element| selector.matches(element))
            .map(|element| element.id())
    }

    pub fn select_first(&self, selector: &str) -> Result<NodeId, PageError> {
        let compiled = compile(selector)?;
        let found = self.select(&compiled).next();
        found.ok_or_else(|| PageError::NoMatch(selector.to_string()))
    }

    /// Descendants of `root` matching `selector`, excluding `root` itself.
    pub fn select_within<'a>(
        &'a self,
        root: NodeId,
        selector: &'a Selector,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.element(root)
            .into_iter()
            .flat_map(move |element| element.select(selector).map(|found| found.id()))
    }

    /// Direct element children of `id`, in order.
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.html
            .tree
            .get(id)
            .into_iter()
            .flat_map(|node| node.children())
            .filter(|child| child.value().is_element())
            .map(|child| child.id())
    }

    pub fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        self.element(id)
            .map(|element| selector.matches(&element))
            .unwrap_or(false)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    pub fn text(&self, id: NodeId) -> String {
        self.element(id)
            .map(|element| element.text().collect::<String>())
            .unwrap_or_default()
    }

    pub fn style(&self, id: NodeId) -> InlineStyle {
        self.attr(id, "style")
            .map(InlineStyle::parse)
            .unwrap_or_default()
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> bool {
        let qualified = attribute_name(name);
        let changed = self
            .with_element_mut(id, |element| {
                match element
                    .attrs
                    .binary_search_by(|(existing, _)| existing.cmp(&qualified))
                {
                    Ok(pos) if &*element.attrs[pos].1 == value => false,
                    Ok(pos) => {
                        element.attrs[pos].1 = StrTendril::from_slice(value);
                        true
                    }
                    Err(pos) => {
                        element
                            .attrs
                            .insert(pos, (qualified, StrTendril::from_slice(value)));
                        true
                    }
                }
            })
            .unwrap_or(false);
        self.record(changed)
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> bool {
        let qualified = attribute_name(name);
        let changed = self
            .with_element_mut(id, |element| {
                match element
                    .attrs
                    .binary_search_by(|(existing, _)| existing.cmp(&qualified))
                {
                    Ok(pos) => {
                        element.attrs.remove(pos);
                        true
                    }
                    Err(_) => false,
                }
            })
            .unwrap_or(false);
        self.record(changed)
    }

    pub fn set_style_property(&mut self, id: NodeId, property: &str, value: &str) -> bool {
        let mut style = self.style(id);
        if !style.set(property, value) {
            return false;
        }
        self.set_attr(id, "style", &style.to_string())
    }

    pub fn remove_style_properties(&mut self, id: NodeId, properties: &[&str]) -> bool {
        let mut style = self.style(id);
        let mut changed = false;
        for property in properties {
            changed |= style.remove(property);
        }
        if !changed {
            return false;
        }
        if style.is_empty() {
            self.remove_attr(id, "style")
        } else {
            self.set_attr(id, "style", &style.to_string())
        }
    }

    /// Appends a new element (with optional text) as the last child of `parent`.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        attrs: &[(&str, &str)],
        text: Option<&str>,
    ) -> Option<NodeId> {
        let element = Element::new(
            QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag)),
            attrs
                .iter()
                .map(|(name, value)| Attribute {
                    name: attribute_name(name),
                    value: StrTendril::from_slice(value),
                })
                .collect(),
        );
        let mut parent_node = self.html.tree.get_mut(parent)?;
        let mut child = parent_node.append(Node::Element(element));
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            child.append(Node::Text(Text {
                text: StrTendril::from_slice(text),
            }));
        }
        let id = child.id();
        self.mutations += 1;
        Some(id)
    }

    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(mut node) = self.html.tree.get_mut(id) else {
            return false;
        };
        node.detach();
        self.mutations += 1;
        true
    }

    /// Parses `source` as a fragment and appends its top-level nodes to
    /// `parent`. Returns the ids of the inserted element nodes in order.
    pub fn insert_html(&mut self, parent: NodeId, source: &str) -> Vec<NodeId> {
        if self.html.tree.get(parent).is_none() {
            return Vec::new();
        }
        let fragment = Html::parse_fragment(source);
        let fragment_root = self.html.tree.extend_tree(fragment.tree).id();
        let top_level: Vec<NodeId> = self
            .html
            .tree
            .get(fragment_root)
            .and_then(|root| root.first_child())
            .map(|wrapper| wrapper.children().map(|child| child.id()).collect())
            .unwrap_or_default();

        let mut inserted = Vec::with_capacity(top_level.len());
        for child in top_level {
            if let Some(mut parent_node) = self.html.tree.get_mut(parent) {
                parent_node.append_id(child);
                self.mutations += 1;
            }
            if self.element(child).is_some() {
                inserted.push(child);
            }
        }
        inserted
    }

    /// Replaces every child of `parent` with the nodes parsed from `source`.
    pub fn replace_children(&mut self, parent: NodeId, source: &str) -> Vec<NodeId> {
        let children: Vec<NodeId> = self
            .html
            .tree
            .get(parent)
            .map(|node| node.children().map(|child| child.id()).collect())
            .unwrap_or_default();
        for child in children {
            self.detach(child);
        }
        self.insert_html(parent, source)
    }

    fn with_element_mut<R>(&mut self, id: NodeId, f: impl FnOnce(&mut Element) -> R) -> Option<R> {
        let mut node = self.html.tree.get_mut(id)?;
        match node.value() {
            Node::Element(element) => Some(f(element)),
            _ => None,
        }
    }

    fn record(&mut self, changed: bool) -> bool {
        if changed {
            self.mutations += 1;
        }
        changed
    }
}

fn attribute_name(name: &str) -> QualName {
    QualName::new(None, Namespace::from(""), LocalName::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> PageDocument {
        PageDocument::parse(
            &format!("<html><body>{body}</body></html>"),
            Url::parse("https://forum.test/en/forum").unwrap(),
        )
    }

    #[test]
    fn attribute_writes_are_counted_only_when_they_change_something() {
        let mut doc = page(r#"<div id="post" class="forum-post">hi</div>"#);
        let post = doc.select_first("#post").unwrap();

        assert!(doc.set_attr(post, "data-blacklist-hidden", "true"));
        assert!(!doc.set_attr(post, "data-blacklist-hidden", "true"));
        assert_eq!(doc.attr(post, "data-blacklist-hidden"), Some("true"));
        assert_eq!(doc.attr(post, "class"), Some("forum-post"));
        assert_eq!(doc.mutation_count(), 1);

        assert!(doc.remove_attr(post, "data-blacklist-hidden"));
        assert!(!doc.remove_attr(post, "data-blacklist-hidden"));
        assert_eq!(doc.attr(post, "data-blacklist-hidden"), None);
        assert_eq!(doc.mutation_count(), 2);
    }

    #[test]
    fn style_properties_are_merged_and_removed() {
        let mut doc = page(r#"<div id="post" style="color: red">hi</div>"#);
        let post = doc.select_first("#post").unwrap();

        doc.set_style_property(post, "display", "none");
        assert_eq!(doc.attr(post, "style"), Some("color: red; display: none;"));

        doc.remove_style_properties(post, &["display", "opacity"]);
        assert_eq!(doc.attr(post, "style"), Some("color: red;"));

        doc.remove_style_properties(post, &["color"]);
        assert_eq!(doc.attr(post, "style"), None);
    }

    #[test]
    fn appended_elements_are_selectable_and_detachable() {
        let mut doc = page(r#"<div id="post">hi</div>"#);
        let post = doc.select_first("#post").unwrap();
        let child = doc
            .append_element(post, "div", &[("class", "note")], Some("hello"))
            .unwrap();

        let note = compile(".note").unwrap();
        assert_eq!(doc.select_within(post, &note).collect::<Vec<_>>(), vec![child]);
        assert_eq!(doc.text(child), "hello");

        assert!(doc.detach(child));
        assert_eq!(doc.select(&note).count(), 0);
        assert!(!doc.is_attached(child));
        assert!(doc.is_attached(post));
    }

    #[test]
    fn inserted_fragments_report_top_level_elements() {
        let mut doc = page(r#"<main id="feed"></main>"#);
        let feed = doc.select_first("#feed").unwrap();
        let inserted = doc.insert_html(
            feed,
            r#"<div class="forum-post">a</div> text <div class="forum-post">b</div>"#,
        );
        assert_eq!(inserted.len(), 2);
        assert_eq!(doc.text(inserted[1]), "b");
        assert!(doc.is_attached(inserted[0]));

        let replaced = doc.replace_children(feed, r#"<p class="forum-post">c</p>"#);
        assert_eq!(replaced.len(), 1);
        let posts = compile(".forum-post").unwrap();
        assert_eq!(doc.select(&posts).count(), 1);
        assert!(!doc.is_attached(inserted[0]));
    }

    #[test]
    fn detached_subtrees_are_invisible_to_queries() {
        let mut doc = page(
            r#"<section id="old"><div class="forum-post"><span class="username">a</span></div></section>"#,
        );
        let body = doc.select_first("body").unwrap();
        doc.replace_children(body, r#"<div class="forum-post" id="new"></div>"#);

        let posts = compile(".forum-post").unwrap();
        let found: Vec<_> = doc.select(&posts).collect();
        assert_eq!(found, vec![doc.select_first("#new").unwrap()]);
        assert!(doc.select_first(".username").is_err());
    }

    #[test]
    fn unknown_selectors_are_reported() {
        let doc = page("<div></div>");
        assert!(matches!(
            doc.select_first("div[[["),
            Err(PageError::InvalidSelector(_))
        ));
        assert!(matches!(doc.select_first(".missing"), Err(PageError::NoMatch(_))));
    }
}
