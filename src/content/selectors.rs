//! Markup heuristics as data. Adding support for a new forum layout means
//! adding a row here, never touching the extraction control flow.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;

/// Where a name candidate's value is read from, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Text,
    Attr(&'static str),
}

const NAME_SOURCES: &[ValueSource] = &[
    ValueSource::Text,
    ValueSource::Attr("data-user-name"),
    ValueSource::Attr("title"),
];

pub const POST_CONTAINERS: &[&str] = &[
    ".forum-message",
    ".forum-post",
    ".message-item",
    ".post-item",
    "[data-message-id]",
    ".user-message",
];

/// `(selector, is_author_element)`. The trailing profile-link row yields a name
/// but is not treated as the author element itself.
const NAME_PROBES: &[(&str, bool)] = &[
    (".forum-user-name", true),
    (".user-name", true),
    (".author-name", true),
    (".message-author", true),
    (".post-author", true),
    ("[data-user-name]", true),
    (".username", true),
    ("a[href*=\"/users/\"]", false),
];

const LOGIN_PROBES: &[(&str, &str)] = &[
    (".forum-user-avatar[data-login]", "data-login"),
    (".user-avatar[data-login]", "data-login"),
    (".avatar[data-login]", "data-login"),
    ("img[data-login]", "data-login"),
    ("[data-user-login]", "data-user-login"),
];

const PROFILE_LINKS: &[&str] = &[
    ".forum-user-name a[href*=\"/users/\"]",
    ".author-name a[href*=\"/users/\"]",
    "a.user-link[href*=\"/users/\"]",
    "a[href*=\"/users/\"]",
];

const PROFILE_FALLBACK: &str = "a[href*=\"/users/\"]";

/// `/users/<segment>` with an optional `<digits>-` prefix on the segment.
pub static PROFILE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/users/(?:\d+-)?([^/?#]+)").expect("valid profile path regex")
});

/// Strict `/users/<digits>-<slug>` pattern used by the last-resort scan.
pub static PROFILE_ID_SLUG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/users/(\d+)-([^/?#]+)").expect("valid profile id regex")
});

pub struct NameProbe {
    pub selector: Selector,
    pub sources: &'static [ValueSource],
    pub author_element: bool,
}

pub struct LoginProbe {
    pub selector: Selector,
    pub attr: &'static str,
}

pub struct SelectorTable {
    pub posts: Vec<Selector>,
    pub names: Vec<NameProbe>,
    pub logins: Vec<LoginProbe>,
    pub profile_links: Vec<Selector>,
    pub profile_fallback: Selector,
}

pub static TABLE: Lazy<SelectorTable> = Lazy::new(SelectorTable::compile);

impl SelectorTable {
    fn compile() -> Self {
        Self {
            posts: POST_CONTAINERS.iter().map(|s| built_in(s)).collect(),
            names: NAME_PROBES
                .iter()
                .map(|&(selector, author_element)| NameProbe {
                    selector: built_in(selector),
                    sources: NAME_SOURCES,
                    author_element,
                })
                .collect(),
            logins: LOGIN_PROBES
                .iter()
                .map(|&(selector, attr)| LoginProbe {
                    selector: built_in(selector),
                    attr,
                })
                .collect(),
            profile_links: PROFILE_LINKS.iter().map(|s| built_in(s)).collect(),
            profile_fallback: built_in(PROFILE_FALLBACK),
        }
    }
}

fn built_in(selector: &str) -> Selector {
    Selector::parse(selector).expect("built-in selector is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_built_in_selector_compiles() {
        let table = &*TABLE;
        assert_eq!(table.posts.len(), POST_CONTAINERS.len());
        assert_eq!(table.names.len(), NAME_PROBES.len());
        assert!(!table.names.last().unwrap().author_element);
        assert_eq!(table.logins.len(), LOGIN_PROBES.len());
    }

    #[test]
    fn profile_patterns() {
        let caps = PROFILE_PATH.captures("/en/users/123-john_doe/news").unwrap();
        assert_eq!(&caps[1], "john_doe");
        let caps = PROFILE_PATH.captures("https://www.mql5.com/en/users/trader?x=1").unwrap();
        assert_eq!(&caps[1], "trader");
        assert!(PROFILE_ID_SLUG.captures("/users/trader").is_none());
        assert_eq!(&PROFILE_ID_SLUG.captures("/users/7-x%20y").unwrap()[2], "x%20y");
    }
}
