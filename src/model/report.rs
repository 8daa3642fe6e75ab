use std::collections::BTreeMap;
use std::fmt;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::{ConcoctError, Result};
use crate::model::message::Message;

/// suite name -> test name -> success
pub type TestMap = BTreeMap<String, BTreeMap<String, bool>>;

/// The diagnostics produced by one pipeline stage.
///
/// Appended once per grading run, then read-only: nothing in this crate
/// mutates a `ReportPart` after `GradingPipeline::check_project` appends it.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportPart {
    /// Stage name: `cppcheck`, `gcc`, or `cunit`.
    pub source: &'static str,
    pub returncode: i32,
    pub messages: Vec<Message>,
    /// Present only for the unit-test stage, and only when parsing succeeded.
    pub tests: Option<TestMap>,
}

impl ReportPart {
    pub fn new(source: &'static str, returncode: i32, messages: Vec<Message>) -> Self {
        Self { source, returncode, messages, tests: None }
    }

    pub fn with_tests(mut self, tests: TestMap) -> Self {
        self.tests = Some(tests);
        self
    }

    pub fn succeeded(&self) -> bool {
        self.returncode == 0
    }

    fn write_xml(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let mut start = BytesStart::new(self.source);
        start.push_attribute(("returncode", self.returncode.to_string().as_str()));
        writer.write_event(Event::Start(start)).map_err(xml_err)?;

        for message in &self.messages {
            writer.write_event(Event::Start(BytesStart::new("message"))).map_err(xml_err)?;
            write_text_element(writer, "type", message.kind.as_str())?;
            write_text_element(writer, "file", &message.file)?;
            write_text_element(
                writer,
                "line",
                &message.line.map(|l| l.to_string()).unwrap_or_default(),
            )?;
            write_text_element(writer, "desc", &message.description)?;
            writer.write_event(Event::End(BytesEnd::new("message"))).map_err(xml_err)?;
        }

        writer.write_event(Event::End(BytesEnd::new(self.source))).map_err(xml_err)?;
        Ok(())
    }
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, tag: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag))).map_err(xml_err)?;
    writer.write_event(Event::Text(BytesText::new(text))).map_err(xml_err)?;
    writer.write_event(Event::End(BytesEnd::new(tag))).map_err(xml_err)?;
    Ok(())
}

fn xml_err(e: quick_xml::Error) -> ConcoctError {
    ConcoctError::parse("report", e)
}

impl Serialize for ReportPart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let field_count = 2 + usize::from(self.tests.is_some());
        let mut state = serializer.serialize_struct("ReportPart", field_count)?;
        state.serialize_field("returncode", &self.returncode)?;
        state.serialize_field("messages", &self.messages)?;
        if let Some(tests) = &self.tests {
            state.serialize_field("tests", tests)?;
        }
        state.end()
    }
}

/// Deserializing a bare `ReportPart` needs the stage name supplied externally
/// (it lives as the map key one level up in the wire format), so this reads
/// everything *except* `source` and the caller fills that in.
pub(crate) struct PartialReportPart {
    pub returncode: i32,
    pub messages: Vec<Message>,
    pub tests: Option<TestMap>,
}

impl<'de> Deserialize<'de> for PartialReportPart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PartVisitor;

        impl<'de> Visitor<'de> for PartVisitor {
            type Value = PartialReportPart;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a report part object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<PartialReportPart, A::Error> {
                let mut returncode = None;
                let mut messages = Vec::new();
                let mut tests = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "returncode" => returncode = Some(map.next_value()?),
                        "messages" => messages = map.next_value()?,
                        "tests" => tests = Some(map.next_value()?),
                        _ => {
                            let _ignored: serde::de::IgnoredAny = map.next_value()?;
                        }
                    }
                }
                let returncode =
                    returncode.ok_or_else(|| serde::de::Error::missing_field("returncode"))?;
                Ok(PartialReportPart { returncode, messages, tests })
            }
        }

        deserializer.deserialize_map(PartVisitor)
    }
}

/// The ordered collection of `ReportPart`s for one grading run.
///
/// Stage order is preserved end to end: `GradingPipeline` appends in
/// `[cppcheck, gcc, cunit]` order (or a strict prefix thereof), and both the
/// JSON and XML serializers stream parts in that same order rather than
/// sorting by stage name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Report {
    pub parts: Vec<ReportPart>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_part(&mut self, part: ReportPart) {
        self.parts.push(part);
    }

    pub fn part(&self, source: &str) -> Option<&ReportPart> {
        self.parts.iter().find(|p| p.source == source)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(ConcoctError::from)
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Start(BytesStart::new("report")))
            .map_err(xml_err)?;
        for part in &self.parts {
            part.write_xml(&mut writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new("report"))).map_err(xml_err)?;
        String::from_utf8(writer.into_inner()).map_err(|e| ConcoctError::parse("report", e))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            writeln!(f, "{} {}", part.source, part.returncode)?;
            for message in &part.messages {
                writeln!(f, "  {message}")?;
            }
        }
        Ok(())
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.parts.len()))?;
        for part in &self.parts {
            map.serialize_entry(part.source, part)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Report {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ReportVisitor;

        impl<'de> Visitor<'de> for ReportVisitor {
            type Value = Report;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object keyed by stage name")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Report, A::Error> {
                let mut parts = Vec::new();
                while let Some(key) = map.next_key::<String>()? {
                    let source = match key.as_str() {
                        "cppcheck" => "cppcheck",
                        "gcc" => "gcc",
                        "cunit" => "cunit",
                        other => {
                            return Err(serde::de::Error::unknown_field(
                                other,
                                &["cppcheck", "gcc", "cunit"],
                            ))
                        }
                    };
                    let partial: PartialReportPart = map.next_value()?;
                    parts.push(ReportPart {
                        source,
                        returncode: partial.returncode,
                        messages: partial.messages,
                        tests: partial.tests,
                    });
                }
                Ok(Report { parts })
            }
        }

        deserializer.deserialize_map(ReportVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::message::MessageKind;

    fn sample_report() -> Report {
        let mut report = Report::new();
        report.add_part(ReportPart::new("cppcheck", 0, vec![]));
        let mut tests = TestMap::new();
        tests.insert("suite1".into(), BTreeMap::from([("test_a".into(), true)]));
        report.add_part(
            ReportPart::new(
                "gcc",
                1,
                vec![Message::new(MessageKind::Error, "solution.c", Some(4), "undeclared identifier 'x'")],
            ),
        );
        report.add_part(ReportPart::new("cunit", 0, vec![]).with_tests(tests));
        report
    }

    #[test]
    fn json_round_trip_preserves_content_and_order() {
        let report = sample_report();
        let json = report.to_json().unwrap();
        let back = Report::from_json(&json).unwrap();
        assert_eq!(report, back);
        assert_eq!(
            back.parts.iter().map(|p| p.source).collect::<Vec<_>>(),
            vec!["cppcheck", "gcc", "cunit"]
        );
    }

    #[test]
    fn xml_contains_stage_and_message_elements() {
        let report = sample_report();
        let xml = report.to_xml().unwrap();
        assert!(xml.starts_with("<report>"));
        assert!(xml.contains("<gcc returncode=\"1\">"));
        assert!(xml.contains("<type>error</type>"));
        assert!(xml.contains("<desc>undeclared identifier 'x'</desc>"));
    }

    #[test]
    fn display_matches_stage_order() {
        let report = sample_report();
        let text = report.to_string();
        let cppcheck_pos = text.find("cppcheck").unwrap();
        let gcc_pos = text.find("gcc").unwrap();
        let cunit_pos = text.find("cunit").unwrap();
        assert!(cppcheck_pos < gcc_pos);
        assert!(gcc_pos < cunit_pos);
    }
}
