//! Rule construction entry points

use wf_core::rules::{AttributeFilter, ContentFilter, DomainRestriction, FilterId, FilterRule, RuleBody};

use crate::{cosmetic, network};

/// Marker of a content (response-rewrite) rule.
const CONTENT_MARKER: &str = "$$";
/// Content-rule exceptions exist in the wild but are not supported.
const CONTENT_EXCEPTION_MARKER: &str = "$@$";

/// Knobs controlling which rule classes may be built. Callers embedding the
/// engine in contexts where script injection or response rewriting is off
/// the table disable them here; affected lines then parse to `None`.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Permit `#%#` script rules and scriptlet calls.
    pub allow_advanced_rules: bool,
    /// Permit `$replace=` and `$$` content rules.
    pub allow_content_rewrite: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            allow_advanced_rules: true,
            allow_content_rewrite: true,
        }
    }
}

/// Parse one filter-list line with default options.
pub fn create_rule(line: &str, filter_id: FilterId) -> Option<FilterRule> {
    create_rule_with(line, filter_id, &BuildOptions::default())
}

/// Parse one filter-list line. Comments, empty lines, and anything
/// unsupported or malformed yield `None`.
pub fn create_rule_with(
    line: &str,
    filter_id: FilterId,
    options: &BuildOptions,
) -> Option<FilterRule> {
    let line = line.trim();
    if line.is_empty() || is_comment(line) {
        return None;
    }

    // A detected cosmetic marker claims the line; it never falls through to
    // the network parser.
    if let Some((pos, marker, marker_len)) = cosmetic::find_marker(line) {
        return cosmetic::parse(line, pos, marker, marker_len, filter_id, options);
    }

    if line.contains(CONTENT_EXCEPTION_MARKER) {
        return None;
    }
    if let Some(pos) = line.find(CONTENT_MARKER) {
        return parse_content(line, pos, filter_id, options);
    }

    network::parse(line, filter_id, options)
}

/// Parse a whole filter list. Unsupported lines are skipped, not fatal.
pub fn load_filter_list(text: &str, filter_id: FilterId, options: &BuildOptions) -> Vec<FilterRule> {
    let mut rules = Vec::new();
    let mut skipped = 0usize;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || is_comment(trimmed) {
            continue;
        }
        match create_rule_with(trimmed, filter_id, options) {
            Some(rule) => rules.push(rule),
            None => {
                skipped += 1;
                log::debug!("filter {filter_id}: skipping unsupported rule {trimmed:?}");
            }
        }
    }

    log::info!(
        "filter {filter_id}: loaded {} rules, skipped {skipped}",
        rules.len()
    );
    rules
}

fn is_comment(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[') || line == "#" || line.starts_with("# ")
}

/// `domains$$tag[attr="value"]...` response-rewrite rules.
fn parse_content(
    line: &str,
    pos: usize,
    filter_id: FilterId,
    options: &BuildOptions,
) -> Option<FilterRule> {
    if !options.allow_content_rewrite {
        return None;
    }

    let body = &line[pos + CONTENT_MARKER.len()..];
    let tag_end = body.find('[').unwrap_or(body.len());
    let tag_name = body[..tag_end].trim();
    if tag_name.is_empty() || !tag_name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    let mut attributes = Vec::new();
    let mut rest = &body[tag_end..];
    while let Some(inner) = rest.strip_prefix('[') {
        let end = inner.find(']')?;
        let attr = &inner[..end];
        let (name, value) = match attr.split_once('=') {
            Some((n, v)) => (n.trim(), v.trim().trim_matches('"')),
            None => (attr.trim(), ""),
        };
        if name.is_empty() {
            return None;
        }
        attributes.push(AttributeFilter {
            name: name.to_string(),
            value: value.to_string(),
        });
        rest = &inner[end + 1..];
    }
    if !rest.trim().is_empty() {
        return None;
    }

    let domains_part = line[..pos].trim();
    let domains = if domains_part.is_empty() {
        None
    } else {
        Some(DomainRestriction::parse(domains_part)?)
    };

    Some(FilterRule::new(
        line,
        filter_id,
        domains,
        RuleBody::Content(ContentFilter {
            tag_name: tag_name.to_string(),
            attributes,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_core::rules::RuleKind;

    #[test]
    fn comments_and_headers_are_skipped() {
        assert!(create_rule("! AdGuard Base filter", 1).is_none());
        assert!(create_rule("[Adblock Plus 2.0]", 1).is_none());
        assert!(create_rule("# a hosts-file style comment", 1).is_none());
        assert!(create_rule("", 1).is_none());
        assert!(create_rule("   ", 1).is_none());
    }

    #[test]
    fn dispatches_by_shape() {
        assert_eq!(create_rule("||ads.example^", 1).unwrap().kind(), RuleKind::Url);
        assert_eq!(create_rule("example.com##.ad", 1).unwrap().kind(), RuleKind::Css);
        assert_eq!(
            create_rule("example.com#%#window.x=1", 1).unwrap().kind(),
            RuleKind::Script
        );
        assert_eq!(
            create_rule("example.com$$div[class=\"ad\"]", 1).unwrap().kind(),
            RuleKind::Content
        );
    }

    #[test]
    fn content_rule_attributes() {
        let rule = create_rule("example.com$$script[data-src=\"ads\"][async]", 1).unwrap();
        let RuleBody::Content(f) = rule.body() else { panic!() };
        assert_eq!(f.tag_name, "script");
        assert_eq!(f.attributes.len(), 2);
        assert_eq!(f.attributes[0].name, "data-src");
        assert_eq!(f.attributes[0].value, "ads");
        assert_eq!(f.attributes[1].name, "async");
        assert!(f.attributes[1].value.is_empty());
    }

    #[test]
    fn content_rule_rejections() {
        // Exception form is unsupported.
        assert!(create_rule("example.com$@$script[data-src=\"ads\"]", 1).is_none());
        // Malformed attribute group.
        assert!(create_rule("example.com$$script[unclosed", 1).is_none());
        assert!(create_rule("example.com$$", 1).is_none());
    }

    #[test]
    fn content_rule_gated_on_rewrite_option() {
        let no_rewrite = BuildOptions {
            allow_content_rewrite: false,
            ..BuildOptions::default()
        };
        assert!(create_rule_with("example.com$$div[class=\"ad\"]", 1, &no_rewrite).is_none());
    }

    #[test]
    fn load_filter_list_skips_bad_lines() {
        let text = "\
! Title: test list
||ads.example^
example.com##.banner
||broken.example^$unknownoption
@@||cdn.example^$important
";
        let rules = load_filter_list(text, 7, &BuildOptions::default());
        assert_eq!(rules.len(), 3);
        assert!(rules.iter().all(|r| r.filter_id() == 7));
    }

    #[test]
    fn same_line_parses_identically_every_time() {
        for line in [
            "||ads.example^$script,domain=news.site",
            "example.com#$#.a { margin: 0 } .b { padding: 0 }",
            "@@||cdn.example^$important",
        ] {
            let a = create_rule(line, 1).unwrap();
            let b = create_rule(line, 1).unwrap();
            assert_eq!(a.kind(), b.kind());
            assert_eq!(a.rule_text(), b.rule_text());
            assert_eq!(a.is_whitelist(), b.is_whitelist());
            assert_eq!(a.is_important(), b.is_important());
        }
    }
}
