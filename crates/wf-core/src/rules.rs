//! Filter rule data model
//!
//! Rules are created once at filter-list load time and are read-only
//! thereafter; re-matching never mutates a rule. The kinds are a sum type over
//! a shared record (rule text, originating list, optional domain restriction),
//! with capabilities exposed through small per-kind traits instead of an
//! inheritance chain.

use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::hash::SHORTCUT_LENGTH;
use crate::types::ResourceType;
use crate::url;

/// Identifies which subscribed filter list produced a rule.
pub type FilterId = i32;

// =============================================================================
// Capability Traits
// =============================================================================

/// Network rules that can match a request URL.
pub trait Matchable {
    fn matches_url(&self, url: &str) -> bool;
    fn resource_types(&self) -> ResourceType;
}

/// Cosmetic rules that hide elements.
pub trait Hideable {
    fn selector(&self) -> &str;
}

/// Rules that inject script into the page context.
pub trait Injectable {
    fn source(&self) -> &str;
}

/// Rules that substitute a local resource for the response.
pub trait Redirectable {
    fn resource_key(&self) -> &str;
}

/// Rules that transform a response body.
pub trait ContentRewritable {
    /// Apply the transformation. Returns `None` when the body is unchanged.
    fn rewrite(&self, body: &str) -> Option<String>;
}

// =============================================================================
// Domain Restriction
// =============================================================================

/// Allow/deny lists of applicable domains, subdomain-aware.
///
/// Deny takes precedence: a rule applies to a domain if the domain (or a
/// parent) is permitted and not restricted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainRestriction {
    permitted: Vec<String>,
    restricted: Vec<String>,
}

impl DomainRestriction {
    /// Parse a `$domain=` style list: entries separated by `|` or `,`,
    /// `~`-prefixed entries are restricted. Returns `None` when nothing
    /// usable remains.
    pub fn parse(domains: &str) -> Option<Self> {
        let mut permitted = Vec::new();
        let mut restricted = Vec::new();

        for raw in domains.split(|c| c == '|' || c == ',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match raw.strip_prefix('~') {
                Some(rest) if !rest.trim().is_empty() => {
                    restricted.push(rest.trim().to_ascii_lowercase());
                }
                Some(_) => {}
                None => permitted.push(raw.to_ascii_lowercase()),
            }
        }

        if permitted.is_empty() && restricted.is_empty() {
            return None;
        }
        Some(Self { permitted, restricted })
    }

    /// Check if the restriction permits the given domain.
    pub fn permits(&self, domain: &str) -> bool {
        if domain.is_empty() {
            return false;
        }
        if self
            .restricted
            .iter()
            .any(|d| url::is_domain_or_subdomain(domain, d))
        {
            return false;
        }
        if self.permitted.is_empty() {
            return true;
        }
        self.permitted
            .iter()
            .any(|d| url::is_domain_or_subdomain(domain, d))
    }

    /// True when the restriction names permitted domains (a "specific" rule).
    pub fn has_permitted(&self) -> bool {
        !self.permitted.is_empty()
    }
}

// =============================================================================
// URL Patterns
// =============================================================================

/// A network rule pattern: either the plain wildcard grammar (`||`, `|`, `*`,
/// `^`) or a `/.../` regular expression.
#[derive(Debug, Clone)]
pub enum UrlPattern {
    Plain {
        /// Pattern body with anchors stripped; lowercased unless `match_case`.
        pattern: String,
        hostname_anchor: bool,
        left_anchor: bool,
        right_anchor: bool,
        match_case: bool,
        /// Longest literal run, lowercased, when long enough to index.
        shortcut: Option<String>,
    },
    Regex(Regex),
}

impl UrlPattern {
    /// Parse a pattern string. Returns `None` for empty or uncompilable input.
    pub fn parse(text: &str, match_case: bool) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if text.len() > 2 && text.starts_with('/') && text.ends_with('/') {
            let re = RegexBuilder::new(&text[1..text.len() - 1])
                .case_insensitive(!match_case)
                .build()
                .ok()?;
            return Some(UrlPattern::Regex(re));
        }

        let (hostname_anchor, rest) = match text.strip_prefix("||") {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (left_anchor, rest) = if hostname_anchor {
            (false, rest)
        } else {
            match rest.strip_prefix('|') {
                Some(rest) => (true, rest),
                None => (false, rest),
            }
        };
        let (right_anchor, rest) = match rest.strip_suffix('|') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };

        if rest.is_empty() {
            return None;
        }

        let pattern = if match_case {
            rest.to_string()
        } else {
            rest.to_ascii_lowercase()
        };
        let shortcut = extract_shortcut(&pattern);

        Some(UrlPattern::Plain {
            pattern,
            hostname_anchor,
            left_anchor,
            right_anchor,
            match_case,
            shortcut,
        })
    }

    /// The index shortcut, when the pattern has a usable one.
    pub fn shortcut(&self) -> Option<&str> {
        match self {
            UrlPattern::Plain { shortcut, .. } => shortcut.as_deref(),
            UrlPattern::Regex(_) => None,
        }
    }

    /// Match against a URL. Convenience wrapper that lowercases internally;
    /// the matcher hot path uses [`UrlPattern::matches_lower`] instead.
    pub fn matches(&self, url: &str) -> bool {
        self.matches_lower(url, &url.to_ascii_lowercase())
    }

    /// Match against a URL given its pre-lowercased form.
    pub fn matches_lower(&self, url: &str, url_lower: &str) -> bool {
        match self {
            UrlPattern::Regex(re) => re.is_match(url),
            UrlPattern::Plain {
                pattern,
                hostname_anchor,
                left_anchor,
                right_anchor,
                match_case,
                ..
            } => {
                let hay = if *match_case { url } else { url_lower };
                let pat = pattern.as_bytes();
                let hay_bytes = hay.as_bytes();

                if *hostname_anchor {
                    let (host_start, host_end) = match url::get_host_position(hay) {
                        Some(pos) => pos,
                        None => return false,
                    };
                    let mut start = host_start;
                    loop {
                        if match_wildcards(pat, &hay_bytes[start..], *right_anchor) {
                            return true;
                        }
                        // Next subdomain boundary within the host.
                        match hay_bytes[start..host_end].iter().position(|&b| b == b'.') {
                            Some(dot) => start += dot + 1,
                            None => return false,
                        }
                    }
                }

                if *left_anchor {
                    return match_wildcards(pat, hay_bytes, *right_anchor);
                }

                (0..hay_bytes.len())
                    .any(|start| match_wildcards(pat, &hay_bytes[start..], *right_anchor))
            }
        }
    }
}

/// Match a wildcard pattern against the head of `hay`.
///
/// `*` matches any run, `^` matches one separator character or the end of the
/// URL. When `to_end` is set, the pattern must consume all of `hay`.
fn match_wildcards(pat: &[u8], hay: &[u8], to_end: bool) -> bool {
    let Some((&first, rest)) = pat.split_first() else {
        return !to_end || hay.is_empty();
    };

    match first {
        b'*' => (0..=hay.len()).any(|skip| match_wildcards(rest, &hay[skip..], to_end)),
        b'^' => {
            if !hay.is_empty()
                && url::is_separator_char(hay[0])
                && match_wildcards(rest, &hay[1..], to_end)
            {
                return true;
            }
            // '^' also matches the end of the URL.
            hay.is_empty() && rest.iter().all(|&b| b == b'*')
        }
        b => !hay.is_empty() && hay[0] == b && match_wildcards(rest, &hay[1..], to_end),
    }
}

/// Longest literal run without pattern metacharacters, lowercased, when long
/// enough to serve as an index shortcut.
fn extract_shortcut(pattern: &str) -> Option<String> {
    let bytes = pattern.as_bytes();
    let mut best: Option<(usize, usize)> = None;
    let mut run_start = None;

    for i in 0..=bytes.len() {
        let is_literal = i < bytes.len() && !matches!(bytes[i], b'*' | b'^' | b'|');
        if is_literal {
            if run_start.is_none() {
                run_start = Some(i);
            }
        } else if let Some(start) = run_start.take() {
            if best.map_or(true, |(s, e)| i - start > e - s) {
                best = Some((start, i));
            }
        }
    }

    let (start, end) = best?;
    if end - start < SHORTCUT_LENGTH {
        return None;
    }
    Some(pattern[start..end].to_ascii_lowercase())
}

// =============================================================================
// Replace Directives
// =============================================================================

/// A `replace=/pattern/replacement/flags` content-rewrite directive.
#[derive(Debug, Clone)]
pub struct ReplaceDirective {
    regex: Regex,
    replacement: String,
    global: bool,
}

impl ReplaceDirective {
    /// Parse the `/pattern/replacement/flags` form. Escaped slashes (`\/`)
    /// are honored inside the pattern and replacement.
    pub fn parse(value: &str) -> Option<Self> {
        let parts = split_unescaped(value, '/');
        if parts.len() != 4 || !parts[0].is_empty() {
            return None;
        }

        let mut case_insensitive = false;
        let mut global = false;
        for flag in parts[3].chars() {
            match flag {
                'i' => case_insensitive = true,
                'g' => global = true,
                's' | 'm' => {}
                _ => return None,
            }
        }

        let regex = RegexBuilder::new(&parts[1])
            .case_insensitive(case_insensitive)
            .build()
            .ok()?;

        Some(Self {
            regex,
            replacement: parts[2].clone(),
            global,
        })
    }

    /// Apply to a body. Returns `None` when nothing matched.
    pub fn apply(&self, body: &str) -> Option<String> {
        let result = if self.global {
            self.regex.replace_all(body, self.replacement.as_str())
        } else {
            self.regex.replace(body, self.replacement.as_str())
        };
        match result {
            std::borrow::Cow::Borrowed(_) => None,
            std::borrow::Cow::Owned(s) => Some(s),
        }
    }
}

fn split_unescaped(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            // Unescape the separator itself; keep the backslash for anything
            // else so regex escapes like `\d` survive.
            if c != sep {
                current.push('\\');
            }
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    if escaped {
        current.push('\\');
    }
    parts.push(current);
    parts
}

// =============================================================================
// Rule Kinds
// =============================================================================

/// Network allow/block rule.
#[derive(Debug, Clone)]
pub struct UrlFilter {
    pub pattern: UrlPattern,
    /// Exception (`@@`) rule.
    pub whitelist: bool,
    /// `$important`: wins over exception rules.
    pub important: bool,
    /// Applicable resource types; empty means all.
    pub resource_types: ResourceType,
    /// `$third-party` / `$~third-party` restriction.
    pub third_party: Option<bool>,
    /// `$replace=` response-rewrite directive.
    pub replace: Option<ReplaceDirective>,
}

impl Matchable for UrlFilter {
    fn matches_url(&self, url: &str) -> bool {
        self.pattern.matches(url)
    }

    fn resource_types(&self) -> ResourceType {
        self.resource_types
    }
}

impl ContentRewritable for UrlFilter {
    fn rewrite(&self, body: &str) -> Option<String> {
        self.replace.as_ref().and_then(|r| r.apply(body))
    }
}

/// Element-hiding or CSS-injection rule.
#[derive(Debug, Clone)]
pub struct CssFilter {
    pub selector: String,
    /// Injected declarations for `#$#` rules.
    pub style: Option<String>,
    /// Exception (`#@#`) rule: cancels a matching selector.
    pub exception: bool,
}

impl Hideable for CssFilter {
    fn selector(&self) -> &str {
        &self.selector
    }
}

/// A named, parameterized scriptlet call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptletCall {
    pub name: String,
    pub args: Vec<String>,
}

/// Script-injection rule.
#[derive(Debug, Clone)]
pub struct ScriptFilter {
    pub source: String,
    /// Present when the source is a `//scriptlet(...)` call.
    pub scriptlet: Option<ScriptletCall>,
}

impl Injectable for ScriptFilter {
    fn source(&self) -> &str {
        &self.source
    }
}

/// One attribute constraint of a content rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeFilter {
    pub name: String,
    pub value: String,
}

/// Response-body transformation rule (`$$tag[attr="v"]`).
#[derive(Debug, Clone)]
pub struct ContentFilter {
    pub tag_name: String,
    pub attributes: Vec<AttributeFilter>,
}

impl ContentFilter {
    fn attributes_match(&self, open_tag: &str) -> bool {
        self.attributes.iter().all(|attr| {
            if attr.value.is_empty() {
                return open_tag.contains(&attr.name);
            }
            let double = format!("{}=\"{}\"", attr.name, attr.value);
            let single = format!("{}='{}'", attr.name, attr.value);
            open_tag.contains(&double) || open_tag.contains(&single)
        })
    }
}

impl ContentRewritable for ContentFilter {
    /// Remove matching elements from an HTML body.
    ///
    /// Non-nesting scan: an element containing another element of the same
    /// tag name is cut at the first closing tag.
    fn rewrite(&self, body: &str) -> Option<String> {
        let lower = body.to_ascii_lowercase();
        let tag = self.tag_name.to_ascii_lowercase();
        let open_needle = format!("<{tag}");
        let close_needle = format!("</{tag}>");

        let mut out = String::with_capacity(body.len());
        let mut pos = 0;
        let mut changed = false;

        while let Some(rel) = lower[pos..].find(&open_needle) {
            let start = pos + rel;
            let after_name = start + open_needle.len();
            let name_ends = matches!(
                lower.as_bytes().get(after_name),
                None | Some(b' ' | b'\t' | b'\n' | b'>' | b'/')
            );
            let tag_close = match lower[start..].find('>') {
                Some(rel_close) => start + rel_close,
                None => break,
            };
            let open_tag = &body[start..=tag_close];

            if !name_ends || !self.attributes_match(open_tag) {
                out.push_str(&body[pos..after_name]);
                pos = after_name;
                continue;
            }

            changed = true;
            out.push_str(&body[pos..start]);
            if open_tag.ends_with("/>") {
                pos = tag_close + 1;
                continue;
            }
            pos = match lower[tag_close..].find(&close_needle) {
                Some(rel_close) => tag_close + rel_close + close_needle.len(),
                // Unterminated element: drop the open tag only.
                None => tag_close + 1,
            };
        }

        if !changed {
            return None;
        }
        out.push_str(&body[pos..]);
        Some(out)
    }
}

/// Redirect rule: maps to a named local resource instead of blocking.
#[derive(Debug, Clone)]
pub struct RedirectFilter {
    pub pattern: UrlPattern,
    pub resource_key: String,
    /// Applicable resource types; empty means all.
    pub resource_types: ResourceType,
}

impl Matchable for RedirectFilter {
    fn matches_url(&self, url: &str) -> bool {
        self.pattern.matches(url)
    }

    fn resource_types(&self) -> ResourceType {
        self.resource_types
    }
}

impl Redirectable for RedirectFilter {
    fn resource_key(&self) -> &str {
        &self.resource_key
    }
}

// =============================================================================
// FilterRule
// =============================================================================

/// The rule kind payload.
#[derive(Debug, Clone)]
pub enum RuleBody {
    Url(UrlFilter),
    Css(CssFilter),
    Script(ScriptFilter),
    Content(ContentFilter),
    Redirect(RedirectFilter),
    /// Ordered sub-rules generated from one source line. Sub-rules are
    /// immutable once constructed and share the originating rule text.
    Composite(Vec<FilterRule>),
}

/// Discriminant for reporting and corpus statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Url,
    Css,
    Script,
    Content,
    Redirect,
    Composite,
}

impl RuleKind {
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::Url => "network",
            RuleKind::Css => "cosmetic",
            RuleKind::Script => "script",
            RuleKind::Content => "content",
            RuleKind::Redirect => "redirect",
            RuleKind::Composite => "composite",
        }
    }
}

/// A filter rule: shared provenance fields plus the kind payload.
#[derive(Debug, Clone)]
pub struct FilterRule {
    rule_text: Arc<str>,
    filter_id: FilterId,
    domains: Option<DomainRestriction>,
    body: RuleBody,
}

impl FilterRule {
    pub fn new(
        rule_text: impl Into<Arc<str>>,
        filter_id: FilterId,
        domains: Option<DomainRestriction>,
        body: RuleBody,
    ) -> Self {
        Self {
            rule_text: rule_text.into(),
            filter_id,
            domains,
            body,
        }
    }

    /// Original source line, kept for provenance and logging.
    pub fn rule_text(&self) -> &str {
        &self.rule_text
    }

    /// Shared handle to the source line, for composite sub-rules.
    pub fn rule_text_arc(&self) -> Arc<str> {
        Arc::clone(&self.rule_text)
    }

    pub fn filter_id(&self) -> FilterId {
        self.filter_id
    }

    pub fn domains(&self) -> Option<&DomainRestriction> {
        self.domains.as_ref()
    }

    pub fn body(&self) -> &RuleBody {
        &self.body
    }

    pub fn kind(&self) -> RuleKind {
        match self.body {
            RuleBody::Url(_) => RuleKind::Url,
            RuleBody::Css(_) => RuleKind::Css,
            RuleBody::Script(_) => RuleKind::Script,
            RuleBody::Content(_) => RuleKind::Content,
            RuleBody::Redirect(_) => RuleKind::Redirect,
            RuleBody::Composite(_) => RuleKind::Composite,
        }
    }

    /// True for exception rules (`@@` network, `#@#` cosmetic).
    pub fn is_whitelist(&self) -> bool {
        match &self.body {
            RuleBody::Url(f) => f.whitelist,
            RuleBody::Css(f) => f.exception,
            _ => false,
        }
    }

    /// True for `$important` network rules.
    pub fn is_important(&self) -> bool {
        matches!(&self.body, RuleBody::Url(f) if f.important)
    }

    /// Check the rule's resource-type mask against a request type.
    pub fn applies_to_resource_type(&self, t: ResourceType) -> bool {
        let mask = match &self.body {
            RuleBody::Url(f) => f.resource_types,
            RuleBody::Redirect(f) => f.resource_types,
            _ => ResourceType::empty(),
        };
        mask.is_empty() || mask.intersects(t)
    }

    /// Check the rule's domain restriction against a source domain.
    pub fn applies_to_domain(&self, domain: &str) -> bool {
        match &self.domains {
            Some(restriction) => restriction.permits(domain),
            None => true,
        }
    }

    /// True when the rule has no permitted-domain restriction.
    pub fn is_generic(&self) -> bool {
        !self
            .domains
            .as_ref()
            .map_or(false, DomainRestriction::has_permitted)
    }

    /// Network-rule view, when the rule has one.
    pub fn as_matchable(&self) -> Option<&dyn Matchable> {
        match &self.body {
            RuleBody::Url(f) => Some(f),
            RuleBody::Redirect(f) => Some(f),
            _ => None,
        }
    }

    /// Content-rewrite view, when the rule has one.
    pub fn as_content_rewritable(&self) -> Option<&dyn ContentRewritable> {
        match &self.body {
            RuleBody::Url(f) if f.replace.is_some() => Some(f),
            RuleBody::Content(f) => Some(f),
            _ => None,
        }
    }
}
