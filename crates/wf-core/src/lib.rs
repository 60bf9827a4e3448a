//! WebFilter Core Library
//!
//! This crate is the decision core of the WebFilter content blocker: given a
//! network request it decides whether to block, allow, modify, or redirect it by
//! matching the request against a corpus of filter rules, and independently by
//! classifying the request's host against safe-browsing hash lists.
//!
//! Because the host delivers a single request's lifecycle (start, headers,
//! content) as uncoordinated asynchronous callbacks, the core also provides a
//! bounded correlation store that carries per-request context between stages.
//!
//! # Modules
//!
//! - `rules`: filter-rule data model and capability traits
//! - `matcher`: shortcut-indexed rule corpus and request matching
//! - `safebrowsing`: canonical host-hash computation and hash-list classification
//! - `correlation`: fixed-capacity, key-addressable LIFO ring store
//! - `pipeline`: request-lifecycle correlation built on the ring store
//! - `url`: fast URL parsing without allocations
//! - `cache`: bounded LRU cache
//! - `hash`: xxHash helpers for shortcut buckets
//! - `types`: shared type definitions

pub mod cache;
pub mod correlation;
pub mod hash;
pub mod matcher;
pub mod pipeline;
pub mod rules;
pub mod safebrowsing;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use correlation::CorrelationBuffer;
pub use matcher::{RedirectRegistry, RuleMatcher};
pub use rules::{FilterRule, RuleBody, RuleKind};
pub use types::{Decision, Request, ResourceType};
