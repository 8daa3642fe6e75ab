//! Parses CUnit's automated-run XML report into [`Message`]s plus a
//! suite/test success map.
//!
//! Schema (abbreviated): `CUNIT_RESULT_LISTING/CUNIT_RUN_SUITE*`, each
//! containing either a `CUNIT_RUN_SUITE_FAILURE` or `CUNIT_RUN_SUITE_SUCCESS`
//! wrapper with a `SUITE_NAME` and zero or more `CUNIT_RUN_TEST_RECORD`
//! children, each of which wraps either `CUNIT_RUN_TEST_FAILURE` (with
//! `FILE_NAME`/`LINE_NUMBER`/`CONDITION`) or `CUNIT_RUN_TEST_SUCCESS`.
//! A suite or test record that is neither success nor failure is malformed
//! input, not something to silently skip.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{ConcoctError, Result};
use crate::model::{Message, MessageKind, TestMap};
use crate::parsers::{DiagnosticParser, ParseOutcome};

#[derive(Default)]
pub struct CunitParser;

fn tag_name(tag: &quick_xml::events::BytesStart) -> String {
    String::from_utf8_lossy(tag.local_name().as_ref()).into_owned()
}

fn tag_name_end(tag: &quick_xml::events::BytesEnd) -> String {
    String::from_utf8_lossy(tag.local_name().as_ref()).into_owned()
}

fn malformed(msg: impl std::fmt::Display) -> ConcoctError {
    ConcoctError::parse("cunit", msg)
}

impl DiagnosticParser for CunitParser {
    fn parse(&self, data: &[u8]) -> Result<ParseOutcome> {
        let data = String::from_utf8_lossy(data);
        if data.trim().is_empty() {
            return Err(malformed("no data to parse"));
        }

        let mut reader = Reader::from_str(&data);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();

        let mut messages = Vec::new();
        let mut tests = TestMap::new();

        let mut suite_name: Option<String> = None;
        let mut suite_outcome: Option<bool> = None;

        let mut test_outcome: Option<bool> = None;
        let mut test_name: Option<String> = None;
        let mut test_file: Option<String> = None;
        let mut test_line: Option<String> = None;
        let mut test_cond: Option<String> = None;

        let mut text_buf = String::new();

        loop {
            match reader.read_event_into(&mut buf).map_err(malformed)? {
                Event::Start(tag) => {
                    match tag_name(&tag).as_str() {
                        "CUNIT_RUN_SUITE_FAILURE" => suite_outcome = Some(false),
                        "CUNIT_RUN_SUITE_SUCCESS" => suite_outcome = Some(true),
                        "CUNIT_RUN_TEST_FAILURE" => test_outcome = Some(false),
                        "CUNIT_RUN_TEST_SUCCESS" => test_outcome = Some(true),
                        _ => {}
                    }
                    text_buf.clear();
                }
                Event::Text(text) => {
                    text_buf.push_str(&text.unescape().map_err(malformed)?);
                }
                Event::End(tag) => {
                    match tag_name_end(&tag).as_str() {
                        "SUITE_NAME" => suite_name = Some(text_buf.trim().to_string()),
                        "TEST_NAME" => test_name = Some(text_buf.trim().to_string()),
                        "FILE_NAME" => test_file = Some(text_buf.trim().to_string()),
                        "LINE_NUMBER" => test_line = Some(text_buf.trim().to_string()),
                        "CONDITION" => test_cond = Some(text_buf.trim().to_string()),
                        "CUNIT_RUN_TEST_RECORD" => {
                            let suite = suite_name
                                .clone()
                                .ok_or_else(|| malformed("test record outside any suite"))?;
                            let outcome = test_outcome
                                .take()
                                .ok_or_else(|| malformed("test record is neither success nor failure"))?;
                            let name = test_name
                                .take()
                                .ok_or_else(|| malformed("test record missing TEST_NAME"))?;

                            if outcome {
                                tests.entry(suite).or_default().insert(name, true);
                            } else {
                                let file = test_file.take().unwrap_or_default();
                                let line = test_line.take().and_then(|s| s.parse::<u32>().ok());
                                let condition = test_cond.take().unwrap_or_default();
                                messages.push(Message::new(
                                    MessageKind::Error,
                                    file,
                                    line,
                                    format!("{suite} - {name} - Condition: {condition}"),
                                ));
                                tests.entry(suite).or_default().insert(name, false);
                            }
                        }
                        "CUNIT_RUN_SUITE" => {
                            if suite_outcome.take().is_none() {
                                return Err(malformed("suite is neither success nor failure"));
                            }
                            suite_name = None;
                        }
                        _ => {}
                    }
                    text_buf.clear();
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(ParseOutcome { messages, tests: Some(tests) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSING: &str = r#"<CUNIT_TEST_RUN_REPORT>
  <CUNIT_RESULT_LISTING>
    <CUNIT_RUN_SUITE>
      <CUNIT_RUN_SUITE_SUCCESS>
        <SUITE_NAME>suite1</SUITE_NAME>
        <CUNIT_RUN_TEST_RECORD>
          <CUNIT_RUN_TEST_SUCCESS>
            <TEST_NAME>test_a</TEST_NAME>
          </CUNIT_RUN_TEST_SUCCESS>
        </CUNIT_RUN_TEST_RECORD>
      </CUNIT_RUN_SUITE_SUCCESS>
    </CUNIT_RUN_SUITE>
  </CUNIT_RESULT_LISTING>
</CUNIT_TEST_RUN_REPORT>"#;

    const FAILING: &str = r#"<CUNIT_TEST_RUN_REPORT>
  <CUNIT_RESULT_LISTING>
    <CUNIT_RUN_SUITE>
      <CUNIT_RUN_SUITE_FAILURE>
        <SUITE_NAME>suite1</SUITE_NAME>
        <CUNIT_RUN_TEST_RECORD>
          <CUNIT_RUN_TEST_FAILURE>
            <TEST_NAME>test_b</TEST_NAME>
            <FILE_NAME>solution.c</FILE_NAME>
            <LINE_NUMBER>42</LINE_NUMBER>
            <CONDITION>x == 1</CONDITION>
          </CUNIT_RUN_TEST_FAILURE>
        </CUNIT_RUN_TEST_RECORD>
        <CUNIT_RUN_TEST_RECORD>
          <CUNIT_RUN_TEST_SUCCESS>
            <TEST_NAME>test_a</TEST_NAME>
          </CUNIT_RUN_TEST_SUCCESS>
        </CUNIT_RUN_TEST_RECORD>
      </CUNIT_RUN_SUITE_FAILURE>
    </CUNIT_RUN_SUITE>
  </CUNIT_RESULT_LISTING>
</CUNIT_TEST_RUN_REPORT>"#;

    #[test]
    fn passing_suite_yields_no_messages() {
        let outcome = CunitParser.parse(PASSING.as_bytes()).unwrap();
        assert!(outcome.messages.is_empty());
        assert_eq!(outcome.tests.unwrap()["suite1"]["test_a"], true);
    }

    #[test]
    fn failing_test_yields_one_message_with_condition() {
        let outcome = CunitParser.parse(FAILING.as_bytes()).unwrap();
        assert_eq!(outcome.messages.len(), 1);
        let message = &outcome.messages[0];
        assert_eq!(message.kind, MessageKind::Error);
        assert_eq!(message.file, "solution.c");
        assert_eq!(message.line, Some(42));
        assert_eq!(message.description, "suite1 - test_b - Condition: x == 1");

        let tests = outcome.tests.unwrap();
        assert_eq!(tests["suite1"]["test_b"], false);
        assert_eq!(tests["suite1"]["test_a"], true);
    }

    #[test]
    fn empty_input_is_a_parse_error() {
        assert!(CunitParser.parse(b"").is_err());
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        assert!(CunitParser.parse(b"<not><closed>").is_err());
    }
}
