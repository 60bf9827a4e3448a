//! Network rule parsing
//!
//! A network line is `[@@]pattern[$options]`. Options are comma-separated
//! with `\,` escaping (the `replace=` value needs it). Any option we do not
//! understand rejects the whole line; silently ignoring a modifier would
//! turn a narrow rule into a broad one.

use wf_core::rules::{
    DomainRestriction, FilterId, FilterRule, RedirectFilter, ReplaceDirective, RuleBody,
    UrlFilter, UrlPattern,
};
use wf_core::types::ResourceType;

use crate::builder::BuildOptions;

pub(crate) fn parse(
    line: &str,
    filter_id: FilterId,
    options: &BuildOptions,
) -> Option<FilterRule> {
    let (whitelist, rest) = match line.strip_prefix("@@") {
        Some(rest) => (true, rest),
        None => (false, line),
    };

    let (pattern_part, options_part) = match rest.split_once('$') {
        Some((p, o)) => (p, Some(o)),
        None => (rest, None),
    };

    let mut important = false;
    let mut match_case = false;
    let mut third_party: Option<bool> = None;
    let mut domains: Option<DomainRestriction> = None;
    let mut replace: Option<ReplaceDirective> = None;
    let mut redirect_key: Option<String> = None;
    let mut include = ResourceType::empty();
    let mut exclude = ResourceType::empty();

    if let Some(options_part) = options_part {
        for option in split_escaped(options_part, ',') {
            let option = option.trim();
            if option.is_empty() {
                continue;
            }
            match option {
                "important" => important = true,
                "match-case" => match_case = true,
                "third-party" => third_party = Some(true),
                "~third-party" => third_party = Some(false),
                _ => {
                    if let Some(value) = option.strip_prefix("domain=") {
                        domains = Some(DomainRestriction::parse(value)?);
                    } else if let Some(value) = option.strip_prefix("replace=") {
                        if !options.allow_advanced_rules || !options.allow_content_rewrite {
                            return None;
                        }
                        replace = Some(ReplaceDirective::parse(value)?);
                    } else if let Some(value) = option.strip_prefix("redirect=") {
                        if value.is_empty() {
                            return None;
                        }
                        redirect_key = Some(value.to_string());
                    } else if let Some(name) = option.strip_prefix('~') {
                        exclude |= ResourceType::from_rule_option(name)?;
                    } else if let Some(mask) = ResourceType::from_rule_option(option) {
                        include |= mask;
                    } else {
                        // Unknown modifier: reject rather than over-block.
                        return None;
                    }
                }
            }
        }
    }

    let resource_types = finalize_types(include, exclude)?;

    // An empty pattern with options means "any URL".
    let pattern_text = if pattern_part.trim().is_empty() {
        "*"
    } else {
        pattern_part
    };
    let pattern = UrlPattern::parse(pattern_text, match_case)?;

    let body = match redirect_key {
        // Redirect exceptions disable redirects, they do not add one.
        Some(key) if !whitelist => RuleBody::Redirect(RedirectFilter {
            pattern,
            resource_key: key,
            resource_types,
        }),
        _ => RuleBody::Url(UrlFilter {
            pattern,
            whitelist,
            important,
            resource_types,
            third_party,
            replace,
        }),
    };

    Some(FilterRule::new(line, filter_id, domains, body))
}

/// Fold include/exclude type options into one mask. Empty means every
/// type; a contradiction (everything excluded) rejects the rule.
fn finalize_types(include: ResourceType, exclude: ResourceType) -> Option<ResourceType> {
    if include.is_empty() && exclude.is_empty() {
        return Some(ResourceType::empty());
    }
    let base = if include.is_empty() {
        ResourceType::ALL
    } else {
        include
    };
    let mask = base - exclude;
    if mask.is_empty() {
        return None;
    }
    Some(mask)
}

/// Split on `sep` honoring backslash escapes. An escaped separator is
/// unescaped; any other escape is kept for downstream parsers.
fn split_escaped(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
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
