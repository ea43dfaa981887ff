//! Internal and external links added to paragraph text after generation.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::config::{ExternalLink, InternalLink, LinkConfig};

static RE_PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)(<p\b[^>]*>)(.*?)(</p>)").unwrap());
static RE_ANCHOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<a\b[^>]*>.*?</a>").unwrap());
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static RE_HREF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?i)href="([^"]*)""#).unwrap());

/// Links found in a piece of HTML, split by whether they leave the site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkCounts {
    pub internal: usize,
    pub external: usize,
}

pub fn count_links(html: &str) -> LinkCounts {
    let mut counts = LinkCounts::default();
    for caps in RE_HREF.captures_iter(html) {
        if caps[1].starts_with("http") {
            counts.external += 1;
        } else {
            counts.internal += 1;
        }
    }
    counts
}

/// Byte ranges of `body` that are plain text: outside tags and outside
/// existing anchors.
fn linkable_ranges(body: &str) -> Vec<Range<usize>> {
    let mut blocked: Vec<Range<usize>> = RE_ANCHOR
        .find_iter(body)
        .chain(RE_TAG.find_iter(body))
        .map(|m| m.range())
        .collect();
    blocked.sort_by_key(|r| r.start);

    let mut ranges = Vec::new();
    let mut cursor = 0;
    for range in blocked {
        if range.start > cursor {
            ranges.push(cursor..range.start);
        }
        cursor = cursor.max(range.end);
    }
    if cursor < body.len() {
        ranges.push(cursor..body.len());
    }
    ranges
}

/// First match of `regex` in the linkable text of `body`.
fn first_linkable(body: &str, regex: &Regex) -> Option<Range<usize>> {
    linkable_ranges(body).into_iter().find_map(|range| {
        regex
            .find(&body[range.clone()])
            .map(|m| range.start + m.start()..range.start + m.end())
    })
}

fn wrap(body: &mut String, at: Range<usize>, open: &str) {
    let linked = format!("{}{}</a>", open, &body[at.clone()]);
    body.replace_range(at, &linked);
}

pub struct LinkEnhancer {
    enabled: bool,
    max_internal: usize,
    max_external: usize,
    internal: Vec<(Regex, InternalLink)>,
    external: Vec<(Regex, ExternalLink)>,
}

impl LinkEnhancer {
    pub fn new(config: &LinkConfig) -> Self {
        let internal = config
            .internal
            .iter()
            .filter(|link| !link.term.trim().is_empty())
            .filter_map(|link| {
                Regex::new(&format!("(?i){}", regex::escape(link.term.trim())))
                    .ok()
                    .map(|re| (re, link.clone()))
            })
            .collect();
        let external = config
            .external
            .iter()
            .filter_map(|link| match Regex::new(&link.pattern) {
                Ok(re) => Some((re, link.clone())),
                Err(e) => {
                    log::warn!("Skipping external link pattern '{}': {}", link.pattern, e);
                    None
                }
            })
            .collect();
        Self {
            enabled: config.enabled,
            max_internal: config.max_internal,
            max_external: config.max_external,
            internal,
            external,
        }
    }

    /// Links the first mention of each configured target inside `<p>`
    /// bodies, up to the per-kind caps. Targets already linked in `html`
    /// are skipped, so running twice adds nothing.
    pub fn enhance(&self, html: &str, focus_keyword: &str) -> String {
        if !self.enabled || (self.max_internal == 0 && self.max_external == 0) {
            return html.to_string();
        }

        let mut linked: HashSet<String> = RE_HREF
            .captures_iter(html)
            .map(|caps| caps[1].to_string())
            .collect();
        let focus = focus_keyword.trim().to_lowercase();
        let mut internal_added = 0;
        let mut external_added = 0;

        let out = RE_PARAGRAPH.replace_all(html, |caps: &Captures<'_>| {
            let mut body = caps[2].to_string();

            for (regex, link) in &self.internal {
                if internal_added >= self.max_internal {
                    break;
                }
                if linked.contains(&link.path)
                    || (!focus.is_empty() && focus.contains(&link.term.trim().to_lowercase()))
                {
                    continue;
                }
                if let Some(at) = first_linkable(&body, regex) {
                    wrap(&mut body, at, &format!("<a href=\"{}\">", link.path));
                    linked.insert(link.path.clone());
                    internal_added += 1;
                }
            }

            for (regex, link) in &self.external {
                if external_added >= self.max_external {
                    break;
                }
                if linked.contains(&link.url) {
                    continue;
                }
                if let Some(at) = first_linkable(&body, regex) {
                    let open = format!(
                        "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\" title=\"{}\">",
                        link.url, link.title
                    );
                    wrap(&mut body, at, &open);
                    linked.insert(link.url.clone());
                    external_added += 1;
                }
            }

            format!("{}{}{}", &caps[1], body, &caps[3])
        });

        if internal_added + external_added > 0 {
            log::debug!(
                "Added {} internal and {} external links",
                internal_added,
                external_added
            );
        }
        out.into_owned()
    }
}
