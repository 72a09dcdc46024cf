//! Per-element visibility state machine. The marker attribute on the post
//! element is the only record of whether a post is hidden.

use ego_tree::NodeId;
use once_cell::sync::Lazy;
use scraper::Selector;
use tracing::debug;

use crate::{domain::Settings, page::PageDocument};

use super::locator::PostRecord;

pub const HIDDEN_MARKER: &str = "data-blacklist-hidden";
pub const INDICATOR_CLASS: &str = "blacklist-indicator";
pub const INDICATOR_TEXT: &str = "Post from blacklisted user";
const INDICATOR_STYLE: &str = "background: rgba(255, 165, 0, 0.1); border: 1px dashed #ffa500; \
     padding: 8px; margin: 8px 0; border-radius: 4px; font-size: 12px; color: #666; \
     text-align: center;";

const SUPPRESSION: &[&str] = &["display", "opacity", "pointer-events"];

static MARKED: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[data-blacklist-hidden="true"]"#).expect("valid marker selector")
});
static INDICATOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".blacklist-indicator").expect("valid indicator selector"));

/// Number of posts currently hidden by this context. Never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HiddenCount(u64);

impl HiddenCount {
    pub fn get(self) -> u64 {
        self.0
    }

    fn increment(&mut self) {
        self.0 += 1;
    }

    fn decrement(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    /// Count matching the markers already present in `page`.
    pub fn from_markers(page: &PageDocument) -> Self {
        Self(hidden_elements(page) as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Hidden,
    Shown,
    Unchanged,
}

impl Transition {
    pub fn changed(self) -> bool {
        self != Transition::Unchanged
    }
}

pub fn is_hidden(page: &PageDocument, element: NodeId) -> bool {
    page.attr(element, HIDDEN_MARKER) == Some("true")
}

/// Drives `record` towards the state implied by `blacklisted`.
pub fn reconcile(
    page: &mut PageDocument,
    record: &PostRecord,
    blacklisted: bool,
    settings: &Settings,
    count: &mut HiddenCount,
) -> Transition {
    match (blacklisted, is_hidden(page, record.element)) {
        (true, false) => {
            hide(page, record.element, settings);
            count.increment();
            debug!(
                target: "content",
                author = record.identity.label(),
                hidden = count.get(),
                "post hidden"
            );
            Transition::Hidden
        }
        (false, true) => {
            show(page, record.element);
            count.decrement();
            debug!(
                target: "content",
                author = record.identity.label(),
                hidden = count.get(),
                "post shown"
            );
            Transition::Shown
        }
        _ => Transition::Unchanged,
    }
}

fn hide(page: &mut PageDocument, element: NodeId, settings: &Settings) {
    page.set_attr(element, HIDDEN_MARKER, "true");
    if settings.hide_completely {
        page.set_style_property(element, "display", "none");
    } else {
        page.set_style_property(element, "opacity", "0.1");
        page.set_style_property(element, "pointer-events", "none");
    }
    if settings.show_indicator {
        attach_indicator(page, element);
    }
}

fn show(page: &mut PageDocument, element: NodeId) {
    page.remove_attr(element, HIDDEN_MARKER);
    page.remove_style_properties(element, SUPPRESSION);
    remove_indicator(page, element);
}

/// The indicator belonging to `element`. Only direct children count, so a
/// nested post's indicator is never mistaken for the outer post's.
fn own_indicator(page: &PageDocument, element: NodeId) -> Option<NodeId> {
    page.child_elements(element)
        .find(|child| page.matches(*child, &INDICATOR))
}

/// Appends the indicator unless `element` already carries one.
pub fn attach_indicator(page: &mut PageDocument, element: NodeId) -> Option<NodeId> {
    if own_indicator(page, element).is_some() {
        return None;
    }
    page.append_element(
        element,
        "div",
        &[("class", INDICATOR_CLASS), ("style", INDICATOR_STYLE)],
        Some(INDICATOR_TEXT),
    )
}

pub fn remove_indicator(page: &mut PageDocument, element: NodeId) -> bool {
    match own_indicator(page, element) {
        Some(indicator) => page.detach(indicator),
        None => false,
    }
}

/// Makes every marked element visible and zeroes the counter, whatever the
/// blacklist says. Returns the number of elements restored.
pub fn show_all(page: &mut PageDocument, count: &mut HiddenCount) -> usize {
    let marked: Vec<NodeId> = page.select(&MARKED).collect();
    for element in &marked {
        show(page, *element);
    }
    count.reset();
    marked.len()
}

pub fn hidden_elements(page: &PageDocument) -> usize {
    page.select(&MARKED).count()
}

pub fn indicator_count(page: &PageDocument) -> usize {
    page.select(&INDICATOR).count()
}
