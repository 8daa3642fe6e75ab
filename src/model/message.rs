use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

/// The kind of a single diagnostic.
///
/// `Ignore` is a first-class kind, not a filtered-out absence: some parser
/// rules intentionally recognize boilerplate compiler/linker banners and
/// tag them `ignore` so they still show up in the ordered message list.
/// Consumers computing severity must filter these out themselves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MessageKind {
    #[default]
    Error,
    Warning,
    Info,
    Style,
    Performance,
    Portability,
    Information,
    Ignore,
}

impl MessageKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Style => "style",
            Self::Performance => "performance",
            Self::Portability => "portability",
            Self::Information => "information",
            Self::Ignore => "ignore",
        }
    }

    pub const fn is_ignore(&self) -> bool {
        matches!(self, Self::Ignore)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Self::Error),
            "warning" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "style" => Ok(Self::Style),
            "performance" => Ok(Self::Performance),
            "portability" => Ok(Self::Portability),
            "information" => Ok(Self::Information),
            "ignore" => Ok(Self::Ignore),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

/// A single diagnostic, immutable after construction.
///
/// Two messages are equal iff all fields match, which is exactly what
/// deriving `PartialEq` gives us.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Message {
    pub kind: MessageKind,
    /// Relative path, empty if the diagnostic carries no location.
    pub file: String,
    /// Non-negative line number, absent if the diagnostic carries no location.
    pub line: Option<u32>,
    pub description: String,
}

impl Message {
    pub fn new(
        kind: MessageKind,
        file: impl Into<String>,
        line: Option<u32>,
        description: impl Into<String>,
    ) -> Self {
        Self { kind, file: file.into(), line, description: description.into() }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self.line.map(|l| l.to_string()).unwrap_or_default();
        write!(f, "{} {}:{} {}", self.kind, self.file, line, self.description)
    }
}

// The wire schema (spec §6) represents every Message field as a string,
// including `line` — this mirrors the source's loosely-typed JSON encoder,
// but as an explicit serializer rather than reflection over `__dict__`.
impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Message", 4)?;
        state.serialize_field("type", self.kind.as_str())?;
        state.serialize_field("file", &self.file)?;
        state.serialize_field("line", &self.line.map(|l| l.to_string()).unwrap_or_default())?;
        state.serialize_field("desc", &self.description)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MessageVisitor;

        impl<'de> Visitor<'de> for MessageVisitor {
            type Value = Message;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a message object with type/file/line/desc string fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Message, A::Error> {
                let mut kind: Option<String> = None;
                let mut file: Option<String> = None;
                let mut line: Option<String> = None;
                let mut desc: Option<String> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "type" => kind = Some(map.next_value()?),
                        "file" => file = Some(map.next_value()?),
                        "line" => line = Some(map.next_value()?),
                        "desc" => desc = Some(map.next_value()?),
                        _ => {
                            let _ignored: de::IgnoredAny = map.next_value()?;
                        }
                    }
                }

                let kind = kind.ok_or_else(|| de::Error::missing_field("type"))?;
                let kind = MessageKind::from_str(&kind).map_err(de::Error::custom)?;
                let file = file.unwrap_or_default();
                let desc = desc.ok_or_else(|| de::Error::missing_field("desc"))?;
                let line = match line.as_deref() {
                    None | Some("") => None,
                    Some(s) => Some(s.parse::<u32>().map_err(de::Error::custom)?),
                };

                Ok(Message { kind, file, line, description: desc })
            }
        }

        deserializer.deserialize_map(MessageVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let m = Message::new(MessageKind::Error, "solution.c", Some(12), "undeclared identifier");
        let json = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }

    #[test]
    fn empty_line_round_trips_to_none() {
        let m = Message::new(MessageKind::Ignore, "", None, "In function 'main':");
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"line\":\"\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.line, None);
    }

    #[test]
    fn ignore_kind_is_filterable() {
        let messages = vec![
            Message::new(MessageKind::Ignore, "", None, "boilerplate"),
            Message::new(MessageKind::Error, "a.c", Some(1), "real problem"),
        ];
        let severe: Vec<_> = messages.iter().filter(|m| !m.kind.is_ignore()).collect();
        assert_eq!(severe.len(), 1);
        assert_eq!(severe[0].description, "real problem");
    }
}
