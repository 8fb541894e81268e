//! Splitting message text into prose and fenced code blocks

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Code { lang: String, code: String },
}

fn code_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```([^\n]*)\n([\s\S]*?)```").expect("valid code block regex"))
}

/// Split content into trimmed text runs and code blocks, in order. Blank
/// text and blank code are dropped.
pub fn split_segments(content: &str) -> Vec<Segment> {
    fn push_text(segments: &mut Vec<Segment>, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            segments.push(Segment::Text(text.to_string()));
        }
    }

    let mut segments = Vec::new();
    let mut last = 0;

    for caps in code_block_re().captures_iter(content) {
        let (Some(whole), Some(lang), Some(code)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        push_text(&mut segments, &content[last..whole.start()]);
        last = whole.end();

        if code.as_str().trim().is_empty() {
            continue;
        }
        let lang = lang.as_str().trim();
        segments.push(Segment::Code {
            lang: if lang.is_empty() { "code".to_string() } else { lang.to_string() },
            code: code.as_str().to_string(),
        });
    }
    push_text(&mut segments, &content[last..]);

    segments
}

pub fn has_unclosed_code_block(content: &str) -> bool {
    content.matches(FENCE).count() % 2 == 1
}

/// Close a dangling fence so a truncated reply still renders its last block
pub fn finalize(content: &str) -> Cow<'_, str> {
    if has_unclosed_code_block(content) {
        Cow::Owned(format!("{}\n{}", content, FENCE))
    } else {
        Cow::Borrowed(content)
    }
}

/// Every code block in the content, in order
pub fn code_blocks(content: &str) -> Vec<(String, String)> {
    split_segments(&finalize(content))
        .into_iter()
        .filter_map(|seg| match seg {
            Segment::Code { lang, code } => Some((lang, code)),
            Segment::Text(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_single_segment() {
        assert_eq!(
            split_segments("  hello world \n"),
            vec![Segment::Text("hello world".to_string())]
        );
    }

    #[test]
    fn test_code_block_between_text() {
        let content = "Here you go:\n```rust\nfn main() {}\n```\nEnjoy.";
        assert_eq!(
            split_segments(content),
            vec![
                Segment::Text("Here you go:".to_string()),
                Segment::Code {
                    lang: "rust".to_string(),
                    code: "fn main() {}\n".to_string(),
                },
                Segment::Text("Enjoy.".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_language_defaults_to_code() {
        let segments = split_segments("```\nls -la\n```");
        assert_eq!(
            segments,
            vec![Segment::Code {
                lang: "code".to_string(),
                code: "ls -la\n".to_string(),
            }]
        );
    }

    #[test]
    fn test_blank_code_block_is_dropped() {
        assert_eq!(split_segments("a\n```py\n   \n```\nb").len(), 2);
    }

    #[test]
    fn test_unclosed_block_detection_and_finalize() {
        let partial = "Sure:\n```python\nprint(1)";
        assert!(has_unclosed_code_block(partial));
        assert_eq!(finalize(partial), "Sure:\n```python\nprint(1)\n```");
        assert!(!has_unclosed_code_block(&finalize(partial)));

        let complete = "```\nx\n```";
        assert!(matches!(finalize(complete), Cow::Borrowed(_)));
    }

    #[test]
    fn test_code_blocks_sees_truncated_block() {
        let blocks = code_blocks("one\n```sh\necho 1\n```\ntwo\n```sh\necho 2");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1], ("sh".to_string(), "echo 2\n".to_string()));
    }
}
