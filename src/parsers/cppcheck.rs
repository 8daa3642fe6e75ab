//! Parses cppcheck's `--xml-version=2` output into [`Message`]s.
//!
//! Schema: an `<errors>` element containing `<error>` children; each
//! `<error>` carries `severity`/`verbose` attributes and zero or more
//! `<location file="" line=""/>` children. The first location is primary;
//! everything else is currently discarded (cppcheck's secondary locations
//! aren't represented in the uniform `Message` model).

use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{ConcoctError, Result};
use crate::model::{Message, MessageKind};
use crate::parsers::{DiagnosticParser, ParseOutcome};

#[derive(Default)]
pub struct CppcheckParser;

impl DiagnosticParser for CppcheckParser {
    fn parse(&self, data: &[u8]) -> Result<ParseOutcome> {
        let data = String::from_utf8_lossy(data);
        let mut reader = Reader::from_str(&data);
        reader.config_mut().trim_text(true);

        let mut messages = Vec::new();
        let mut in_error: Option<PendingError> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf).map_err(|e| ConcoctError::parse("cppcheck", e))? {
                Event::Start(tag) => match tag.local_name().as_ref() {
                    b"error" => in_error = Some(PendingError::from_start(&tag)),
                    b"location" => apply_location(&mut in_error, &tag),
                    _ => {}
                },
                Event::Empty(tag) => match tag.local_name().as_ref() {
                    // cppcheck typically emits `<error ...><location .../></error>`, but
                    // an error with no findings still needs handling if self-closed.
                    b"error" => {
                        let pending = PendingError::from_start(&tag);
                        messages.push(pending.into_message()?);
                    }
                    b"location" => apply_location(&mut in_error, &tag),
                    _ => {}
                },
                Event::End(tag) if tag.local_name().as_ref() == b"error" => {
                    if let Some(pending) = in_error.take() {
                        messages.push(pending.into_message()?);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(messages.into())
    }
}

fn apply_location(in_error: &mut Option<PendingError>, tag: &BytesStart) {
    let Some(pending) = in_error.as_mut() else { return };
    if pending.has_location {
        return;
    }
    for attr in tag.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"file" => pending.file = attr.unescape_value().unwrap_or_default().into_owned(),
            b"line" => pending.line = attr.unescape_value().unwrap_or_default().into_owned(),
            _ => {}
        }
    }
    pending.has_location = true;
}

struct PendingError {
    severity: String,
    verbose: String,
    file: String,
    line: String,
    has_location: bool,
}

impl PendingError {
    fn from_start(tag: &BytesStart) -> Self {
        let mut severity = String::new();
        let mut verbose = String::new();
        for attr in tag.attributes().flatten() {
            match attr.key.local_name().as_ref() {
                b"severity" => severity = attr.unescape_value().unwrap_or_default().into_owned(),
                b"verbose" => verbose = attr.unescape_value().unwrap_or_default().into_owned(),
                _ => {}
            }
        }
        Self { severity, verbose, file: String::new(), line: String::new(), has_location: false }
    }

    fn into_message(self) -> Result<Message> {
        let kind = MessageKind::from_str(&self.severity)
            .map_err(|_| ConcoctError::parse("cppcheck", format!("unknown severity {:?}", self.severity)))?;
        let line = if self.line.is_empty() { None } else { self.line.parse::<u32>().ok() };
        Ok(Message::new(kind, self.file, line, self.verbose))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<results version="2">
  <cppcheck version="2.10"/>
  <errors>
    <error id="nullPointer" severity="error" msg="short" verbose="Null pointer dereference">
      <location file="solution.c" line="12" column="5"/>
    </error>
    <error id="unusedVariable" severity="style" msg="short" verbose="Variable 'x' is not used">
      <location file="solution.c" line="3" column="1"/>
    </error>
  </errors>
</results>"#;

    #[test]
    fn parses_primary_location_per_error() {
        let outcome = CppcheckParser.parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.messages[0].kind, MessageKind::Error);
        assert_eq!(outcome.messages[0].file, "solution.c");
        assert_eq!(outcome.messages[0].line, Some(12));
        assert_eq!(outcome.messages[1].kind, MessageKind::Style);
    }

    #[test]
    fn error_without_location_has_empty_file_and_line() {
        let xml = r#"<results><errors><error severity="information" msg="m" verbose="cppcheck is done"/></errors></results>"#;
        let outcome = CppcheckParser.parse(xml.as_bytes()).unwrap();
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(outcome.messages[0].file, "");
        assert_eq!(outcome.messages[0].line, None);
    }

    #[test]
    fn uses_first_location_as_primary() {
        let xml = r#"<results><errors><error severity="error" msg="m" verbose="two locations"><location file="a.c" line="1"/><location file="b.c" line="2"/></error></errors></results>"#;
        let outcome = CppcheckParser.parse(xml.as_bytes()).unwrap();
        assert_eq!(outcome.messages[0].file, "a.c");
        assert_eq!(outcome.messages[0].line, Some(1));
    }
}
