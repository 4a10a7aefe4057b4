use std::sync::LazyLock;

use regex::Regex;

pub const COMMENTS_TAG: &str = "comments";
pub const COMMENT_TAG: &str = "comment";
pub const COMMAND_TAG: &str = "command";
pub const DIFF_TAG: &str = "diff";

fn block_pattern(tag: &str) -> Regex {
    Regex::new(&format!(r"(?s)<{tag}>(.*?)</{tag}>")).expect("valid block pattern")
}

static COMMENTS_BLOCK: LazyLock<Regex> = LazyLock::new(|| block_pattern(COMMENTS_TAG));
static COMMENT_BLOCK: LazyLock<Regex> = LazyLock::new(|| block_pattern(COMMENT_TAG));
static COMMAND_BLOCK: LazyLock<Regex> = LazyLock::new(|| block_pattern(COMMAND_TAG));
static DIFF_BLOCK: LazyLock<Regex> = LazyLock::new(|| block_pattern(DIFF_TAG));

/// The structured segments of a model reply. Every field is always a string;
/// a missing block is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLlmReply {
    pub comment: String,
    pub command: String,
    pub diff: String,
}

impl ParsedLlmReply {
    pub fn parse(raw: &str) -> Self {
        Self {
            comment: extract_comment(raw),
            command: extract_command(raw),
            diff: extract_diff(raw),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.comment.trim().is_empty() && self.diff.trim().is_empty()
    }
}

fn first_capture(pattern: &Regex, raw: &str) -> Option<String> {
    pattern
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// `<comments>` first, then the `<comment>` spelling.
pub fn extract_comment(raw: &str) -> String {
    first_capture(&COMMENTS_BLOCK, raw)
        .or_else(|| first_capture(&COMMENT_BLOCK, raw))
        .unwrap_or_default()
}

pub fn extract_command(raw: &str) -> String {
    first_capture(&COMMAND_BLOCK, raw).unwrap_or_default()
}

/// The diff is returned verbatim; its syntax is only checked when applied.
pub fn extract_diff(raw: &str) -> String {
    first_capture(&DIFF_BLOCK, raw).unwrap_or_default()
}
