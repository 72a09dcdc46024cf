use ego_tree::NodeId;
use scraper::Selector;

use crate::{domain::Identity, page::PageDocument};

use super::{
    extractor::{author_element, extract},
    selectors::TABLE,
};

/// A post element paired with the author identity found inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub element: NodeId,
    pub identity: Identity,
    pub author_element: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRoot {
    Document,
    /// A freshly inserted node: the node itself is tested before its descendants.
    Subtree(NodeId),
}

/// Lazily yields every post under `root` whose author could be resolved.
///
/// Selectors are evaluated in table order without deduplication, so an element
/// matching two container selectors is yielded twice.
pub fn locate(page: &PageDocument, root: ScanRoot) -> impl Iterator<Item = PostRecord> + '_ {
    TABLE
        .posts
        .iter()
        .flat_map(move |selector| candidates(page, root, selector))
        .filter_map(move |element| {
            let identity = extract(page, element)?;
            Some(PostRecord {
                element,
                identity,
                author_element: author_element(page, element),
            })
        })
}

fn candidates<'a>(
    page: &'a PageDocument,
    root: ScanRoot,
    selector: &'a Selector,
) -> Box<dyn Iterator<Item = NodeId> + 'a> {
    match root {
        ScanRoot::Document => Box::new(page.select(selector)),
        ScanRoot::Subtree(node) => Box::new(
            page.matches(node, selector)
                .then_some(node)
                .into_iter()
                .chain(page.select_within(node, selector)),
        ),
    }
}
