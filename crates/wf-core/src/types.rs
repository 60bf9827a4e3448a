//! Shared type definitions for the WebFilter decision core.

// =============================================================================
// Resource Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Request resource type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceType: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const MAIN_FRAME = 1 << 6;   // main document
        const XMLHTTPREQUEST = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const FONT = 1 << 9;
        const MEDIA = 1 << 10;
        const PING = 1 << 11;

        /// All request types
        const ALL = 0xFFF;
        /// Document types (main_frame + sub_frame)
        const DOCUMENT = Self::MAIN_FRAME.bits() | Self::SUBDOCUMENT.bits();
    }
}

impl Default for ResourceType {
    fn default() -> Self {
        Self::empty()
    }
}

impl ResourceType {
    /// Parse from browser request type string.
    ///
    /// Named to stay clear of the `from_name` constructor the `bitflags`
    /// macro already generates for flag identifiers.
    pub fn from_request_type(s: &str) -> Self {
        match s {
            "main_frame" | "document" => Self::MAIN_FRAME,
            "sub_frame" | "subdocument" => Self::SUBDOCUMENT,
            "stylesheet" => Self::STYLESHEET,
            "script" => Self::SCRIPT,
            "image" => Self::IMAGE,
            "font" => Self::FONT,
            "object" => Self::OBJECT,
            "xmlhttprequest" | "xhr" => Self::XMLHTTPREQUEST,
            "ping" => Self::PING,
            "media" => Self::MEDIA,
            "websocket" => Self::WEBSOCKET,
            _ => Self::OTHER,
        }
    }

    /// Parse from a rule modifier name. Unknown names are `None` so the
    /// caller can reject the rule instead of widening it.
    pub fn from_rule_option(s: &str) -> Option<Self> {
        Some(match s {
            "document" => Self::DOCUMENT,
            "subdocument" => Self::SUBDOCUMENT,
            "stylesheet" => Self::STYLESHEET,
            "script" => Self::SCRIPT,
            "image" => Self::IMAGE,
            "font" => Self::FONT,
            "object" => Self::OBJECT,
            "xmlhttprequest" => Self::XMLHTTPREQUEST,
            "ping" => Self::PING,
            "media" => Self::MEDIA,
            "websocket" => Self::WEBSOCKET,
            "other" => Self::OTHER,
            _ => return None,
        })
    }
}

// =============================================================================
// Request Context
// =============================================================================

/// Context for a request being matched.
///
/// `domain` is the host of the document that originated the request; it is the
/// domain that `$domain=` restrictions are evaluated against. `url` is the
/// request itself.
#[derive(Debug, Clone)]
pub struct Request<'a> {
    /// Full request URL
    pub url: &'a str,
    /// Host of the originating document
    pub domain: &'a str,
    /// URL of the originating document
    pub document_url: &'a str,
    /// Request resource type
    pub resource_type: ResourceType,
}

// =============================================================================
// Decisions
// =============================================================================

/// Final decision for a matched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Request proceeds (no matching block rule, or an exception matched)
    Allow,
    /// Request is cancelled
    Block,
    /// Request is answered with substitute content from the redirect registry
    Redirect(String),
}

impl Decision {
    /// Short lowercase name for reporting.
    pub fn name(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Block => "block",
            Decision::Redirect(_) => "redirect",
        }
    }
}
