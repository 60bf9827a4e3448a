//! Cosmetic rule parsing
//!
//! Cosmetic rules are `domains<marker>payload` lines. The marker decides the
//! kind: `##` hides elements, `#@#` cancels a hiding selector, `#$#` injects
//! style, `#%#` injects script. Markers we recognize but do not support are
//! still detected so their lines are rejected outright instead of being
//! mis-parsed as network patterns.

use std::sync::Arc;

use wf_core::rules::{
    CssFilter, DomainRestriction, FilterId, FilterRule, RuleBody, ScriptFilter, ScriptletCall,
};

use crate::builder::BuildOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Marker {
    ElemHide,
    ElemHideException,
    CssInject,
    ScriptInject,
    /// Recognized marker with no supported semantics.
    Unsupported,
}

/// Longest markers first, so `#$#` is not mistaken for `##`.
const MARKERS: &[(&str, Marker)] = &[
    ("#@$#", Marker::Unsupported),
    ("#@%#", Marker::Unsupported),
    ("#@?#", Marker::Unsupported),
    ("#$?#", Marker::Unsupported),
    ("#?#", Marker::Unsupported),
    ("#@#", Marker::ElemHideException),
    ("#$#", Marker::CssInject),
    ("#%#", Marker::ScriptInject),
    ("##", Marker::ElemHide),
];

/// Selector fragments requiring an extended-CSS engine we do not ship.
const EXTENDED_CSS_MARKERS: &[&str] = &[
    "[-ext-",
    ":contains(",
    ":has(",
    ":has-text(",
    ":matches-css",
    ":if(",
    ":if-not(",
    ":xpath(",
];

/// Locate a cosmetic marker. Only the first `#` is considered; domains
/// cannot contain one. Returns the marker position, kind and length.
pub(crate) fn find_marker(line: &str) -> Option<(usize, Marker, usize)> {
    let pos = line.find('#')?;
    for (text, marker) in MARKERS {
        if line[pos..].starts_with(text) {
            return Some((pos, *marker, text.len()));
        }
    }
    None
}

/// Parse a line whose marker was already located.
pub(crate) fn parse(
    line: &str,
    pos: usize,
    marker: Marker,
    marker_len: usize,
    filter_id: FilterId,
    options: &BuildOptions,
) -> Option<FilterRule> {
    if marker == Marker::Unsupported {
        return None;
    }
    let domains = parse_domains(&line[..pos])?;
    let payload = line[pos + marker_len..].trim();
    if payload.is_empty() {
        return None;
    }

    match marker {
        Marker::Unsupported => None,
        Marker::ElemHide | Marker::ElemHideException => {
            if is_extended_css(payload) {
                return None;
            }
            Some(FilterRule::new(
                line,
                filter_id,
                domains,
                RuleBody::Css(CssFilter {
                    selector: payload.to_string(),
                    style: None,
                    exception: marker == Marker::ElemHideException,
                }),
            ))
        }
        Marker::CssInject => parse_css_inject(line, payload, filter_id, domains),
        Marker::ScriptInject => {
            if !options.allow_advanced_rules {
                return None;
            }
            let scriptlet = if payload.starts_with("//scriptlet(") {
                Some(parse_scriptlet(payload)?)
            } else {
                None
            };
            Some(FilterRule::new(
                line,
                filter_id,
                domains,
                RuleBody::Script(ScriptFilter {
                    source: payload.to_string(),
                    scriptlet,
                }),
            ))
        }
    }
}

/// Empty domains part means a generic rule; a non-empty part that parses to
/// nothing rejects the line.
fn parse_domains(part: &str) -> Option<Option<DomainRestriction>> {
    let part = part.trim();
    if part.is_empty() {
        return Some(None);
    }
    DomainRestriction::parse(part).map(Some)
}

fn is_extended_css(selector: &str) -> bool {
    EXTENDED_CSS_MARKERS.iter().any(|m| selector.contains(m))
}

/// `#$#` payload: one or more `selector { declarations }` blocks. Several
/// blocks on one line fan out into a composite sharing the source text.
fn parse_css_inject(
    line: &str,
    payload: &str,
    filter_id: FilterId,
    domains: Option<DomainRestriction>,
) -> Option<FilterRule> {
    let blocks = split_style_blocks(payload)?;
    let text: Arc<str> = Arc::from(line);

    let make = |selector: String, style: String| {
        FilterRule::new(
            Arc::clone(&text),
            filter_id,
            domains.clone(),
            RuleBody::Css(CssFilter {
                selector,
                style: Some(style),
                exception: false,
            }),
        )
    };

    let mut rules: Vec<FilterRule> = blocks
        .into_iter()
        .map(|(selector, style)| make(selector, style))
        .collect();
    if rules.len() == 1 {
        return rules.pop();
    }
    Some(FilterRule::new(
        Arc::clone(&text),
        filter_id,
        domains,
        RuleBody::Composite(rules),
    ))
}

/// Split `sel1 { decls } sel2 { decls }` into (selector, declarations)
/// pairs. Braces do not nest in CSS declarations, so a linear scan is
/// enough; unbalanced input is rejected.
fn split_style_blocks(payload: &str) -> Option<Vec<(String, String)>> {
    let mut blocks = Vec::new();
    let mut rest = payload;

    while !rest.trim().is_empty() {
        let open = rest.find('{')?;
        let close = open + rest[open..].find('}')?;
        let selector = rest[..open].trim();
        let style = rest[open + 1..close].trim();
        if selector.is_empty() || style.is_empty() {
            return None;
        }
        blocks.push((selector.to_string(), style.to_string()));
        rest = &rest[close + 1..];
    }

    if blocks.is_empty() {
        return None;
    }
    Some(blocks)
}

/// `//scriptlet("name", "arg", ...)` with single- or double-quoted
/// arguments.
fn parse_scriptlet(source: &str) -> Option<ScriptletCall> {
    let inner = source
        .strip_prefix("//scriptlet(")?
        .trim_end()
        .strip_suffix(')')?;

    let mut args = Vec::new();
    for raw in split_call_args(inner) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let unquoted = raw
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .or_else(|| raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))?;
        args.push(unquoted.to_string());
    }

    let mut args = args.into_iter();
    let name = args.next()?;
    if name.is_empty() {
        return None;
    }
    Some(ScriptletCall {
        name,
        args: args.collect(),
    })
}

/// Split on commas outside quotes.
fn split_call_args(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;

    for (i, c) in inner.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (None, '"' | '\'') => quote = Some(c),
            (None, ',') => {
                parts.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&inner[start..]);
    parts
}
