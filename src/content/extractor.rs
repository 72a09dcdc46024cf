use ego_tree::NodeId;
use percent_encoding::percent_decode_str;

use crate::{domain::Identity, page::PageDocument};

use super::selectors::{SelectorTable, ValueSource, PROFILE_ID_SLUG, PROFILE_PATH, TABLE};

/// Resolves the author of `post`. Returns `None` when no field could be read,
/// in which case the post must not take part in matching.
pub fn extract(page: &PageDocument, post: NodeId) -> Option<Identity> {
    let table = &*TABLE;
    let mut identity = Identity {
        name: probe_name(page, post, table),
        login: probe_login(page, post, table),
        ..Identity::default()
    };
    if let Some((slug, href)) = probe_profile_link(page, post, table) {
        identity.slug = Some(slug);
        identity.href = Some(href);
    }

    if identity.is_empty() {
        identity = fallback_slug(page, post, table).map(Identity::from_slug)?;
    }
    (!identity.is_empty()).then_some(identity)
}

/// First element of the name table that exists inside `post`.
pub fn author_element(page: &PageDocument, post: NodeId) -> Option<NodeId> {
    TABLE
        .names
        .iter()
        .filter(|probe| probe.author_element)
        .find_map(|probe| page.select_within(post, &probe.selector).next())
}

fn probe_name(page: &PageDocument, post: NodeId, table: &SelectorTable) -> Option<String> {
    table.names.iter().find_map(|probe| {
        let candidate = page.select_within(post, &probe.selector).next()?;
        probe
            .sources
            .iter()
            .find_map(|source| read_source(page, candidate, *source))
    })
}

fn probe_login(page: &PageDocument, post: NodeId, table: &SelectorTable) -> Option<String> {
    table.logins.iter().find_map(|probe| {
        page.select_within(post, &probe.selector)
            .find_map(|avatar| page.attr(avatar, probe.attr).and_then(clean))
    })
}

fn probe_profile_link(
    page: &PageDocument,
    post: NodeId,
    table: &SelectorTable,
) -> Option<(String, String)> {
    table.profile_links.iter().find_map(|selector| {
        let link = page.select_within(post, selector).next()?;
        let href = page.attr(link, "href").and_then(clean)?;
        let slug = PROFILE_PATH
            .captures(&href)
            .and_then(|caps| caps.get(1))
            .and_then(|segment| decode(segment.as_str()))?;
        Some((slug, href))
    })
}

fn fallback_slug(page: &PageDocument, post: NodeId, table: &SelectorTable) -> Option<String> {
    page.select_within(post, &table.profile_fallback)
        .filter_map(|link| page.attr(link, "href"))
        .find_map(|href| {
            PROFILE_ID_SLUG
                .captures(href)
                .and_then(|caps| caps.get(2))
                .and_then(|slug| decode(slug.as_str()))
        })
}

fn read_source(page: &PageDocument, element: NodeId, source: ValueSource) -> Option<String> {
    match source {
        ValueSource::Text => clean(&page.text(element)),
        ValueSource::Attr(name) => page.attr(element, name).and_then(clean),
    }
}

fn decode(segment: &str) -> Option<String> {
    clean(&percent_decode_str(segment).decode_utf8_lossy())
}

fn clean(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::page::compile;

    fn first_post(body: &str) -> (PageDocument, NodeId) {
        let doc = PageDocument::parse(
            &format!("<html><body>{body}</body></html>"),
            Url::parse("https://www.mql5.com/en/forum/1").unwrap(),
        );
        let selector = compile(".forum-post").unwrap();
        let post = doc.select(&selector).next().expect("fixture has a post");
        (doc, post)
    }

    #[test]
    fn profile_link_alone_yields_decoded_slug() {
        let (doc, post) = first_post(
            r#"<div class="forum-post"><a href="/users/123-john_doe"></a><p>text</p></div>"#,
        );
        let identity = extract(&doc, post).unwrap();
        assert_eq!(identity.slug.as_deref(), Some("john_doe"));
        assert_eq!(identity.name, None);
        assert_eq!(identity.href.as_deref(), Some("/users/123-john_doe"));
    }

    #[test]
    fn name_falls_back_to_data_attribute_then_title() {
        let (doc, post) = first_post(
            r#"<div class="forum-post">
                 <span class="forum-user-name" data-user-name="  "></span>
                 <span class="user-name" title="TitleOnly"></span>
               </div>"#,
        );
        assert_eq!(extract(&doc, post).unwrap().name.as_deref(), Some("TitleOnly"));

        let (doc, post) = first_post(
            r#"<div class="forum-post"><b class="author-name" data-user-name="FromData"> </b></div>"#,
        );
        assert_eq!(extract(&doc, post).unwrap().name.as_deref(), Some("FromData"));
    }

    #[test]
    fn fields_are_collected_independently() {
        let (doc, post) = first_post(
            r#"<div class="forum-post">
                 <img class="avatar" data-login="spammer1">
                 <span class="forum-user-name"> SpammerOne </span>
                 <a class="user-link" href="https://www.mql5.com/en/users/sp%C3%A4mmer">profile</a>
               </div>"#,
        );
        let identity = extract(&doc, post).unwrap();
        assert_eq!(identity.name.as_deref(), Some("SpammerOne"));
        assert_eq!(identity.login.as_deref(), Some("spammer1"));
        assert_eq!(identity.slug.as_deref(), Some("spämmer"));
        assert_eq!(
            identity.candidates(),
            vec![
                "spammerone".to_string(),
                "spammer1".to_string(),
                "spämmer".to_string(),
                "https://www.mql5.com/en/users/sp%c3%a4mmer".to_string(),
            ]
        );
    }

    #[test]
    fn fallback_scans_every_profile_link() {
        let (doc, post) = first_post(
            r#"<div class="forum-post">
                 <a href="/users/"></a>
                 <a href="/users/77-late%20comer"></a>
               </div>"#,
        );
        assert_eq!(extract(&doc, post).unwrap(), Identity::from_slug("late comer"));
    }

    #[test]
    fn posts_without_author_markup_are_skipped() {
        let (doc, post) = first_post(r#"<div class="forum-post"><p>anonymous</p></div>"#);
        assert_eq!(extract(&doc, post), None);
        assert_eq!(author_element(&doc, post), None);
    }

    #[test]
    fn author_element_ignores_bare_profile_links() {
        let (doc, post) = first_post(
            r#"<div class="forum-post"><a href="/users/1-a">a</a><span class="username">b</span></div>"#,
        );
        let expected = doc.select_first(".username").unwrap();
        assert_eq!(author_element(&doc, post), Some(expected));
    }
}
