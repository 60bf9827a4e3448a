//! Request matching engine
//!
//! Network rules are indexed by shortcut: the longest literal run of a
//! pattern is hashed over its first six bytes and bucketed, and a request URL
//! is scanned with a sliding six-byte window so only a handful of buckets is
//! ever consulted per request. Rules without a usable shortcut (short
//! patterns, regexes) live in a residual list that is always checked.
//!
//! Cosmetic, script and content rules are not URL-indexed; they are filtered
//! by document domain on demand.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::hash::{hash_chunk, hash_shortcut, SHORTCUT_LENGTH};
use crate::rules::{ContentFilter, CssFilter, FilterRule, RuleBody, RuleKind, ScriptFilter};
use crate::types::{Decision, Request};
use crate::url;

// =============================================================================
// Redirect Resolution
// =============================================================================

/// Resolves redirect resource keys to replacement URLs.
pub trait RedirectRegistry {
    fn resolve(&self, resource_key: &str) -> Option<String>;
}

/// Registry with no resources; every redirect degrades to a block.
pub struct EmptyRedirectRegistry;

impl RedirectRegistry for EmptyRedirectRegistry {
    fn resolve(&self, _resource_key: &str) -> Option<String> {
        None
    }
}

impl RedirectRegistry for HashMap<String, String> {
    fn resolve(&self, resource_key: &str) -> Option<String> {
        self.get(resource_key).cloned()
    }
}

// =============================================================================
// Shortcut Index
// =============================================================================

struct IndexedRule {
    /// Insertion order; later rules win precedence ties.
    order: u64,
    rule: Arc<FilterRule>,
}

#[derive(Default)]
struct ShortcutIndex {
    buckets: HashMap<u64, Vec<IndexedRule>>,
    /// Rules with no usable shortcut, checked on every request.
    residual: Vec<IndexedRule>,
}

impl ShortcutIndex {
    fn add(&mut self, rule: Arc<FilterRule>, order: u64) {
        // Hash the bucket key before `rule` moves into the entry.
        let bucket = match rule.body() {
            RuleBody::Url(f) => f.pattern.shortcut().map(hash_shortcut),
            RuleBody::Redirect(f) => f.pattern.shortcut().map(hash_shortcut),
            _ => None,
        };
        let entry = IndexedRule { order, rule };
        match bucket {
            Some(key) => self.buckets.entry(key).or_default().push(entry),
            None => self.residual.push(entry),
        }
    }

    /// All rules whose bucket is hit by some six-byte window of the URL,
    /// plus the residual list. Callers deduplicate by order.
    fn candidates<'a>(&'a self, url_lower: &str) -> Vec<&'a IndexedRule> {
        let mut out: Vec<&IndexedRule> = self.residual.iter().collect();
        if self.buckets.is_empty() {
            return out;
        }

        let bytes = url_lower.as_bytes();
        if bytes.len() >= SHORTCUT_LENGTH {
            for window in bytes.windows(SHORTCUT_LENGTH) {
                if let Some(bucket) = self.buckets.get(&hash_chunk(window)) {
                    out.extend(bucket.iter());
                }
            }
        }
        out
    }

    fn len(&self) -> usize {
        self.residual.len() + self.buckets.values().map(Vec::len).sum::<usize>()
    }
}

// =============================================================================
// RuleMatcher
// =============================================================================

/// Holds the loaded rule corpus and answers per-request and per-document
/// queries. Built once from parsed rules; matching takes `&self` so a shared
/// matcher can serve concurrent lookups.
#[derive(Default)]
pub struct RuleMatcher {
    network: ShortcutIndex,
    css: Vec<Arc<FilterRule>>,
    script: Vec<Arc<FilterRule>>,
    content: Vec<Arc<FilterRule>>,
    counter: u64,
}

impl RuleMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: impl IntoIterator<Item = FilterRule>) -> Self {
        let mut matcher = Self::new();
        for rule in rules {
            matcher.add_rule(rule);
        }
        matcher
    }

    /// Register a rule. Composite rules fan out into their sub-rules.
    pub fn add_rule(&mut self, rule: FilterRule) {
        if let RuleBody::Composite(subs) = rule.body() {
            for sub in subs.clone() {
                self.add_rule(sub);
            }
            return;
        }
        match rule.kind() {
            RuleKind::Url | RuleKind::Redirect => {
                let order = self.counter;
                self.counter += 1;
                self.network.add(Arc::new(rule), order);
            }
            RuleKind::Css => self.css.push(Arc::new(rule)),
            RuleKind::Script => self.script.push(Arc::new(rule)),
            RuleKind::Content => self.content.push(Arc::new(rule)),
            RuleKind::Composite => {}
        }
    }

    /// Number of registered network rules.
    pub fn network_rule_count(&self) -> usize {
        self.network.len()
    }

    pub fn cosmetic_rule_count(&self) -> usize {
        self.css.len()
    }

    pub fn script_rule_count(&self) -> usize {
        self.script.len()
    }

    pub fn content_rule_count(&self) -> usize {
        self.content.len()
    }

    /// Find the winning network rule for a request, or `None` when nothing
    /// matches. Precedence: `$important` rules beat exceptions, exceptions
    /// beat blocks; within a tier a domain-specific rule beats a generic one
    /// and the later-loaded rule wins remaining ties.
    pub fn match_request(&self, req: &Request) -> Option<&FilterRule> {
        let url_lower = req.url.to_ascii_lowercase();
        let mut seen: HashSet<u64> = HashSet::new();
        let mut matched: Vec<(u64, &FilterRule)> = Vec::new();

        for entry in self.network.candidates(&url_lower) {
            if !seen.insert(entry.order) {
                continue;
            }
            let rule = entry.rule.as_ref();
            if verify(rule, req, &url_lower) {
                matched.push((entry.order, rule));
            }
        }

        let important: Vec<_> = matched
            .iter()
            .filter(|(_, r)| r.is_important())
            .copied()
            .collect();
        if !important.is_empty() {
            // Within the important tier an exception still wins over a block.
            let allows: Vec<_> = important
                .iter()
                .filter(|(_, r)| r.is_whitelist())
                .copied()
                .collect();
            return pick_best(if allows.is_empty() { &important } else { &allows });
        }

        let whitelist: Vec<_> = matched
            .iter()
            .filter(|(_, r)| r.is_whitelist())
            .copied()
            .collect();
        if !whitelist.is_empty() {
            return pick_best(&whitelist);
        }

        pick_best(&matched)
    }

    /// Full request decision, resolving redirect rules through the registry.
    /// A redirect whose resource is unknown degrades to a plain block.
    pub fn decide(&self, req: &Request, registry: &dyn RedirectRegistry) -> Decision {
        match self.match_request(req) {
            None => Decision::Allow,
            Some(rule) if rule.is_whitelist() => Decision::Allow,
            Some(rule) => match rule.body() {
                RuleBody::Redirect(f) => match registry.resolve(&f.resource_key) {
                    Some(target) => Decision::Redirect(target),
                    None => {
                        log::debug!(
                            "no resource for redirect rule {:?}, blocking",
                            rule.rule_text()
                        );
                        Decision::Block
                    }
                },
                _ => Decision::Block,
            },
        }
    }

    /// Element-hiding rules applicable to a document domain, with exception
    /// rules already subtracted.
    pub fn css_rules_for(&self, domain: &str) -> Vec<&CssFilter> {
        let applicable: Vec<(&FilterRule, &CssFilter)> = self
            .css
            .iter()
            .filter(|r| r.applies_to_domain(domain))
            .filter_map(|r| match r.body() {
                RuleBody::Css(f) => Some((r.as_ref(), f)),
                _ => None,
            })
            .collect();

        let cancelled: HashSet<&str> = applicable
            .iter()
            .filter(|(_, f)| f.exception)
            .map(|(_, f)| f.selector.as_str())
            .collect();

        applicable
            .into_iter()
            .filter(|(_, f)| !f.exception && !cancelled.contains(f.selector.as_str()))
            .map(|(_, f)| f)
            .collect()
    }

    /// Script-injection rules applicable to a document domain.
    pub fn script_rules_for(&self, domain: &str) -> Vec<&ScriptFilter> {
        self.script
            .iter()
            .filter(|r| r.applies_to_domain(domain))
            .filter_map(|r| match r.body() {
                RuleBody::Script(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    /// Content-rewrite rules applicable to a document domain.
    pub fn content_rules_for(&self, domain: &str) -> Vec<&ContentFilter> {
        self.content
            .iter()
            .filter(|r| r.applies_to_domain(domain))
            .filter_map(|r| match r.body() {
                RuleBody::Content(f) => Some(f),
                _ => None,
            })
            .collect()
    }
}

/// Check a candidate against everything but the tier precedence: resource
/// type, domain restriction, third-party constraint and the URL pattern.
fn verify(rule: &FilterRule, req: &Request, url_lower: &str) -> bool {
    if !rule.applies_to_resource_type(req.resource_type) {
        return false;
    }
    if !rule.applies_to_domain(req.domain) {
        return false;
    }
    match rule.body() {
        RuleBody::Url(f) => {
            if let Some(required) = f.third_party {
                let host = url::extract_host(req.url).unwrap_or("");
                if url::is_third_party(host, req.domain) != required {
                    return false;
                }
            }
            f.pattern.matches_lower(req.url, url_lower)
        }
        RuleBody::Redirect(f) => f.pattern.matches_lower(req.url, url_lower),
        _ => false,
    }
}

/// Best rule within one precedence tier: domain-specific over generic, then
/// most recently loaded.
fn pick_best<'a>(candidates: &[(u64, &'a FilterRule)]) -> Option<&'a FilterRule> {
    candidates
        .iter()
        .max_by_key(|(order, rule)| (!rule.is_generic(), *order))
        .map(|(_, rule)| *rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{DomainRestriction, RedirectFilter, UrlFilter, UrlPattern};
    use crate::types::ResourceType;

    fn url_rule(text: &str, pattern: &str, whitelist: bool, important: bool) -> FilterRule {
        FilterRule::new(
            text,
            0,
            None,
            RuleBody::Url(UrlFilter {
                pattern: UrlPattern::parse(pattern, false).unwrap(),
                whitelist,
                important,
                resource_types: ResourceType::empty(),
                third_party: None,
                replace: None,
            }),
        )
    }

    fn request<'a>(url: &'a str, domain: &'a str) -> Request<'a> {
        Request {
            url,
            domain,
            document_url: "",
            resource_type: ResourceType::SCRIPT,
        }
    }

    #[test]
    fn indexed_rule_matches_via_shortcut_bucket() {
        let matcher =
            RuleMatcher::from_rules([url_rule("||tracker.example^", "||tracker.example^", false, false)]);
        let req = request("https://tracker.example/pixel.js", "news.site");
        assert!(matcher.match_request(&req).is_some());

        let miss = request("https://clean.example/app.js", "news.site");
        assert!(matcher.match_request(&miss).is_none());
    }

    #[test]
    fn short_pattern_lands_in_residual() {
        let matcher = RuleMatcher::from_rules([url_rule("ads^", "ads^", false, false)]);
        assert_eq!(matcher.network_rule_count(), 1);
        let req = request("https://example.com/ads/x.js", "example.com");
        assert!(matcher.match_request(&req).is_some());
    }

    #[test]
    fn regex_rule_lands_in_residual() {
        let matcher =
            RuleMatcher::from_rules([url_rule(r"/banner\d+/", r"/banner\d+/", false, false)]);
        let req = request("https://example.com/banner77.gif", "example.com");
        assert!(matcher.match_request(&req).is_some());
    }

    #[test]
    fn whitelist_beats_block() {
        let matcher = RuleMatcher::from_rules([
            url_rule("||tracker.example^", "||tracker.example^", false, false),
            url_rule("@@||tracker.example^", "||tracker.example^", true, false),
        ]);
        let req = request("https://tracker.example/x.js", "news.site");
        let winner = matcher.match_request(&req).unwrap();
        assert!(winner.is_whitelist());
        assert_eq!(matcher.decide(&req, &EmptyRedirectRegistry), Decision::Allow);
    }

    #[test]
    fn important_beats_whitelist() {
        let matcher = RuleMatcher::from_rules([
            url_rule("@@||tracker.example^", "||tracker.example^", true, false),
            url_rule("||tracker.example^$important", "||tracker.example^", false, true),
        ]);
        let req = request("https://tracker.example/x.js", "news.site");
        let winner = matcher.match_request(&req).unwrap();
        assert!(winner.is_important());
        assert_eq!(matcher.decide(&req, &EmptyRedirectRegistry), Decision::Block);
    }

    #[test]
    fn important_whitelist_beats_important_block() {
        let matcher = RuleMatcher::from_rules([
            url_rule("||tracker.example^$important", "||tracker.example^", false, true),
            url_rule("@@||tracker.example^$important", "||tracker.example^", true, true),
        ]);
        let req = request("https://tracker.example/x.js", "news.site");
        assert_eq!(matcher.decide(&req, &EmptyRedirectRegistry), Decision::Allow);
    }

    #[test]
    fn specific_rule_outranks_generic() {
        let generic = url_rule("||tracker.example^", "||tracker.example^", false, false);
        let specific = FilterRule::new(
            "||tracker.example^$domain=news.site",
            0,
            DomainRestriction::parse("news.site"),
            RuleBody::Url(UrlFilter {
                pattern: UrlPattern::parse("||tracker.example^", false).unwrap(),
                whitelist: false,
                important: false,
                resource_types: ResourceType::empty(),
                third_party: None,
                replace: None,
            }),
        );
        // Specific loaded first, still wins.
        let matcher = RuleMatcher::from_rules([specific, generic]);
        let req = request("https://tracker.example/x.js", "news.site");
        let winner = matcher.match_request(&req).unwrap();
        assert!(!winner.is_generic());
    }

    #[test]
    fn later_rule_wins_remaining_ties() {
        let matcher = RuleMatcher::from_rules([
            url_rule("first", "||tracker.example^", false, false),
            url_rule("second", "||tracker.example^", false, false),
        ]);
        let req = request("https://tracker.example/x.js", "news.site");
        assert_eq!(matcher.match_request(&req).unwrap().rule_text(), "second");
    }

    #[test]
    fn resource_type_mask_filters_candidates() {
        let rule = FilterRule::new(
            "||tracker.example^$image",
            0,
            None,
            RuleBody::Url(UrlFilter {
                pattern: UrlPattern::parse("||tracker.example^", false).unwrap(),
                whitelist: false,
                important: false,
                resource_types: ResourceType::IMAGE,
                third_party: None,
                replace: None,
            }),
        );
        let matcher = RuleMatcher::from_rules([rule]);
        let script = request("https://tracker.example/x.js", "news.site");
        assert!(matcher.match_request(&script).is_none());
        let image = Request {
            resource_type: ResourceType::IMAGE,
            ..request("https://tracker.example/x.gif", "news.site")
        };
        assert!(matcher.match_request(&image).is_some());
    }

    #[test]
    fn third_party_constraint() {
        let rule = FilterRule::new(
            "||tracker.example^$third-party",
            0,
            None,
            RuleBody::Url(UrlFilter {
                pattern: UrlPattern::parse("||tracker.example^", false).unwrap(),
                whitelist: false,
                important: false,
                resource_types: ResourceType::empty(),
                third_party: Some(true),
                replace: None,
            }),
        );
        let matcher = RuleMatcher::from_rules([rule]);
        let cross = request("https://tracker.example/x.js", "news.site");
        assert!(matcher.match_request(&cross).is_some());
        let same = request("https://tracker.example/x.js", "sub.tracker.example");
        assert!(matcher.match_request(&same).is_none());
    }

    #[test]
    fn redirect_resolves_through_registry() {
        let rule = FilterRule::new(
            "||tracker.example^$redirect=noopjs",
            0,
            None,
            RuleBody::Redirect(RedirectFilter {
                pattern: UrlPattern::parse("||tracker.example^", false).unwrap(),
                resource_key: "noopjs".to_string(),
                resource_types: ResourceType::empty(),
            }),
        );
        let matcher = RuleMatcher::from_rules([rule]);
        let req = request("https://tracker.example/x.js", "news.site");

        let mut registry = HashMap::new();
        registry.insert("noopjs".to_string(), "data:application/javascript,".to_string());
        assert_eq!(
            matcher.decide(&req, &registry),
            Decision::Redirect("data:application/javascript,".to_string())
        );
        // Unknown resource degrades to a block.
        assert_eq!(matcher.decide(&req, &EmptyRedirectRegistry), Decision::Block);
    }

    #[test]
    fn css_exception_cancels_selector() {
        let hide = |text: &str, sel: &str, exception: bool, domains: Option<DomainRestriction>| {
            FilterRule::new(
                text,
                0,
                domains,
                RuleBody::Css(crate::rules::CssFilter {
                    selector: sel.to_string(),
                    style: None,
                    exception,
                }),
            )
        };
        let matcher = RuleMatcher::from_rules([
            hide("##.ad-banner", ".ad-banner", false, None),
            hide("##.sponsored", ".sponsored", false, None),
            hide(
                "news.site#@#.ad-banner",
                ".ad-banner",
                true,
                DomainRestriction::parse("news.site"),
            ),
        ]);

        let on_news: Vec<&str> = matcher
            .css_rules_for("news.site")
            .iter()
            .map(|f| f.selector.as_str())
            .collect();
        assert_eq!(on_news, vec![".sponsored"]);

        let elsewhere = matcher.css_rules_for("other.example");
        assert_eq!(elsewhere.len(), 2);
    }
}
