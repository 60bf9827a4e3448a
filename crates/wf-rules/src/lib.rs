//! Filter list parsing
//!
//! Turns filter-list text lines into [`wf_core::FilterRule`] values. The
//! entry point is [`create_rule`]: it classifies a line as a comment, a
//! cosmetic rule (by marker), a content rule or a network rule, and hands it
//! to the matching sub-parser. Unsupported or malformed lines yield `None`
//! so a bad line never aborts a list load.

mod builder;
mod cosmetic;
mod network;

pub use builder::{create_rule, create_rule_with, load_filter_list, BuildOptions};
