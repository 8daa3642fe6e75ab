//! Parses GCC's captured stderr stream into [`Message`]s.
//!
//! Two rule families are scanned against every line: a compiler-diagnostic
//! family and a linker-diagnostic family. Rules are tried in order and are
//! **not** mutually exclusive — a line can match several rules, and by
//! default every match produces a `Message`. This mirrors the original
//! pattern list exactly; `CompilerParser::with_first_match_only` makes the
//! alternative ("first match wins") an explicit, documented opt-in instead
//! of silently changing behavior (see DESIGN.md).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::model::{Message, MessageKind};
use crate::parsers::{DiagnosticParser, ParseOutcome};

/// One entry in a rule table: a regex plus which capture groups (indexed
/// the way Python's `match.groups()` tuple is, i.e. 0-based over the
/// capturing groups, not counting the whole-match group 0) hold the file,
/// line, and description fields.
struct Rule {
    kind: MessageKind,
    file: Option<usize>,
    line: Option<usize>,
    desc: Option<usize>,
    regex: Regex,
}

impl Rule {
    fn new(kind: MessageKind, file: Option<usize>, line: Option<usize>, desc: Option<usize>, pattern: &str) -> Self {
        // Python's re.match anchors at the start of the string; the `regex`
        // crate searches anywhere, so we anchor explicitly to keep parity.
        let anchored = format!("^(?:{pattern})");
        Self { kind, file, line, desc, regex: Regex::new(&anchored).unwrap_or_else(|e| {
            panic!("invalid compiler diagnostic pattern {pattern:?}: {e}")
        }) }
    }

    fn apply(&self, line: &str) -> Option<Message> {
        let captures = self.regex.captures(line)?;
        let group = |idx: Option<usize>| -> String {
            idx.and_then(|i| captures.get(i + 1)).map(|m| m.as_str().to_string()).unwrap_or_default()
        };
        let file = group(self.file);
        let line_no = self.line.and_then(|i| captures.get(i + 1)).and_then(|m| m.as_str().parse::<u32>().ok());
        let desc = group(self.desc);
        Some(Message::new(self.kind, file, line_no, desc))
    }
}

static GCC_PATTERNS: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new(MessageKind::Ignore, None, None, None, r#"(.*?):(\d+):(\d+:)? .*\(Each undeclared identifier is reported only once.*"#),
        Rule::new(MessageKind::Ignore, None, None, None, r#"(.*?):(\d+):(\d+:)? .*for each function it appears in\.\).*"#),
        Rule::new(MessageKind::Ignore, None, None, None, r#"(.*?):(\d+):(\d+:)? .*this will be reported only once per input file.*"#),
        Rule::new(MessageKind::Error, Some(0), Some(1), Some(3), r#"(.*?):(\d+):(\d+:)? [Ee]rror: ([`'"](.*)['"] undeclared .*)"#),
        Rule::new(MessageKind::Error, Some(0), Some(1), Some(3), r#"(.*?):(\d+):(\d+:)? [Ee]rror: (conflicting types for .*[`'"](.*)['"].*)"#),
        Rule::new(MessageKind::Error, Some(0), Some(1), Some(3), r#"(.*?):(\d+):(\d+:)? (parse error before.*[`'"](.*)['"].*)"#),
        Rule::new(MessageKind::Warning, Some(0), Some(1), Some(3), r#"(.*?):(\d+):(\d+:)? [Ww]arning: ([`'"](.*)['"] defined but not used.*)"#),
        Rule::new(MessageKind::Warning, Some(0), Some(1), Some(3), r#"(.*?):(\d+):(\d+:)? [Ww]arning: (conflicting types for .*[`'"](.*)['"].*)"#),
        Rule::new(MessageKind::Warning, Some(0), Some(1), Some(4), r#"(.*?):(\d+):(\d+:)? ([Ww]arning:)?\s*(the use of [`'"](.*)['"] is dangerous, better use [`'"](.*)['"].*)"#),
        Rule::new(MessageKind::Info, Some(0), Some(1), Some(3), r#"(.*?):(\d+):(\d+:)?\s*(.*((instantiated)|(required)) from .*)"#),
        Rule::new(MessageKind::Error, Some(0), Some(1), Some(6), r#"(.*?):(\d+):(\d+:)?\s*(([Ee]rror)|(ERROR)): (.*)"#),
        Rule::new(MessageKind::Warning, Some(0), Some(1), Some(6), r#"(.*?):(\d+):(\d+:)?\s*(([Ww]arning)|(WARNING)): (.*)"#),
        Rule::new(MessageKind::Info, Some(0), Some(1), Some(8), r#"(.*?):(\d+):(\d+:)?\s*(([Nn]ote)|(NOTE)|([Ii]nfo)|(INFO)): (.*)"#),
        Rule::new(MessageKind::Error, Some(0), Some(1), Some(3), r#"(.*?):(\d+):(\d+:)? (.*)"#),
    ]
});

static LD_PATTERNS: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new(MessageKind::Ignore, Some(0), None, Some(2), r#"(.*?):?(\(\.\w+\+.*\))?:\s*(In function [`'"](.*)['"]:)"#),
        Rule::new(MessageKind::Warning, Some(0), Some(1), Some(4), r#"(.*?):(\d+):(\d+:)? ([Ww]arning:)?\s*(the use of [`'"](.*)['"] is dangerous, better use [`'"](.*)['"].*)"#),
        Rule::new(MessageKind::Warning, Some(0), None, Some(1), r#"(.*?):?\(\.\w+\+.*\): [Ww]arning:? (.*)"#),
        Rule::new(MessageKind::Error, Some(0), None, Some(1), r#"(.*?):?\(\.\w+\+.*\): (.*)"#),
        Rule::new(MessageKind::Warning, None, None, Some(2), r#"(.*[/\\])?ld(\.exe)?: [Ww]arning:? (.*)"#),
        Rule::new(MessageKind::Error, None, None, Some(2), r#"(.*[/\\])?ld(\.exe)?: (.*)"#),
    ]
});

/// Parses a compiler's captured stderr stream.
pub struct CompilerParser {
    first_match_only: bool,
}

impl Default for CompilerParser {
    fn default() -> Self {
        Self { first_match_only: false }
    }
}

impl CompilerParser {
    /// By default every matching rule in both families emits a `Message`
    /// (the source's behavior, preserved deliberately — see spec Open
    /// Questions). Set `true` here to keep only the first match per line,
    /// scanning the compiler family before the linker family.
    pub fn with_first_match_only(first_match_only: bool) -> Self {
        Self { first_match_only }
    }
}

impl DiagnosticParser for CompilerParser {
    fn parse(&self, data: &[u8]) -> Result<ParseOutcome> {
        let data = String::from_utf8_lossy(data);
        let mut messages = Vec::new();
        for line in data.split('\n') {
            let mut matched_any = false;
            for rule in GCC_PATTERNS.iter() {
                if let Some(message) = rule.apply(line) {
                    messages.push(message);
                    matched_any = true;
                    if self.first_match_only {
                        break;
                    }
                }
            }
            if self.first_match_only && matched_any {
                continue;
            }
            for rule in LD_PATTERNS.iter() {
                if let Some(message) = rule.apply(line) {
                    messages.push(message);
                    if self.first_match_only {
                        break;
                    }
                }
            }
        }
        Ok(messages.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_undeclared_identifier() {
        let stderr = "solution.c:4:5: error: 'x' undeclared (first use in this function)\n";
        let outcome = CompilerParser::default().parse(stderr.as_bytes()).unwrap();
        assert!(outcome.messages.iter().any(|m| m.kind == MessageKind::Error
            && m.file == "solution.c"
            && m.line == Some(4)));
    }

    #[test]
    fn recognizes_catch_all_error_line() {
        let stderr = "solution.c:10:2: error: expected ';' before '}' token\n";
        let outcome = CompilerParser::default().parse(stderr.as_bytes()).unwrap();
        assert!(!outcome.messages.is_empty());
        assert!(outcome.messages.iter().all(|m| m.file == "solution.c" && m.line == Some(10)));
    }

    #[test]
    fn linker_undefined_reference_is_an_error() {
        let stderr = "/usr/bin/ld: solution.o: in function `main':\nsolution.c:(.text+0x1a): undefined reference to `helper'\ncollect2: error: ld returned 1 exit status\n";
        let outcome = CompilerParser::default().parse(stderr.as_bytes()).unwrap();
        assert!(outcome.messages.iter().any(|m| m.kind == MessageKind::Error
            && m.description.contains("undefined reference")));
    }

    #[test]
    fn multiple_rules_can_match_the_same_line_by_default() {
        // The generic "Error: msg" rule and the trailing catch-all both match
        // this line; with first_match_only disabled both fire.
        let stderr = "a.c:1:1: error: something broke\n";
        let outcome = CompilerParser::default().parse(stderr.as_bytes()).unwrap();
        assert!(outcome.messages.len() >= 2);
    }

    #[test]
    fn first_match_only_keeps_a_single_message_per_line() {
        let stderr = "a.c:1:1: error: something broke\n";
        let outcome = CompilerParser::with_first_match_only(true).parse(stderr.as_bytes()).unwrap();
        assert_eq!(outcome.messages.len(), 1);
    }

    #[test]
    fn ignore_kind_is_still_emitted() {
        let stderr = "a.c:5:1: warning: implicit declaration (Each undeclared identifier is reported only once for each function it appears in.)\n";
        let outcome = CompilerParser::default().parse(stderr.as_bytes()).unwrap();
        assert!(outcome.messages.iter().any(|m| m.kind == MessageKind::Ignore));
    }
}
