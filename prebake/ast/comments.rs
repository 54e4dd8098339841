// Copyright 2026 the Prebake authors. MIT license.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Matches a stage annotation token inside a comment.
static STAGE_RE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"@prebake\.(moot|eager|runtime)\b").unwrap()
});

/// A leading comment attached to a node. Only the text body is kept;
/// the delimiters are the parser's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
  pub text: String,
}

impl Comment {
  pub fn new(text: impl Into<String>) -> Self {
    Self { text: text.into() }
  }
}

/// The precompile stage a binding was annotated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BindStage {
  /// Needed only by early code.
  Moot,
  /// Pre-compute where possible.
  Eager,
  /// Left for run time.
  Runtime,
}

/// Scans a leading comment block for `@prebake.moot`, `@prebake.eager`
/// or `@prebake.runtime`. The last match wins; absent means none.
pub fn stage_from_comments(comments: &[Comment]) -> Option<BindStage> {
  let mut stage = None;
  for comment in comments {
    for captures in STAGE_RE.captures_iter(&comment.text) {
      stage = match captures.get(1).map(|m| m.as_str()) {
        Some("moot") => Some(BindStage::Moot),
        Some("eager") => Some(BindStage::Eager),
        Some("runtime") => Some(BindStage::Runtime),
        _ => stage,
      };
    }
  }
  stage
}
