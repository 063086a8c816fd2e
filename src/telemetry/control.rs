//! Classification of mission control messages.
//!
//! Control messages are small XML documents. Only the root element and a few
//! leaf values matter to the host, so they are read with plain string scanning
//! rather than a schema-aware parser.

use std::fmt;

use super::errors::TelemetryError;

#[derive(Debug, Clone, PartialEq)]
pub enum EndStatus {
    Ended,
    PlayerDied,
    /// Any other status string reported by the participant.
    Abnormal(String),
}

impl EndStatus {
    fn from_status(status: Option<&str>) -> Self {
        match status.map(str::trim) {
            Some("ENDED") => EndStatus::Ended,
            Some("PLAYER_DIED") => EndStatus::PlayerDied,
            Some(other) => EndStatus::Abnormal(other.to_string()),
            None => EndStatus::Abnormal("UNKNOWN".to_string()),
        }
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, EndStatus::Ended | EndStatus::PlayerDied)
    }
}

impl fmt::Display for EndStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndStatus::Ended => f.write_str("ENDED"),
            EndStatus::PlayerDied => f.write_str("PLAYER_DIED"),
            EndStatus::Abnormal(status) => f.write_str(status),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlSignal {
    /// `MissionInit`: the participant has begun the session.
    SessionBegin,
    /// `MissionEnded`, with any final reward it carried.
    SessionEnd {
        status: EndStatus,
        description: Option<String>,
        final_reward: Vec<(usize, f64)>,
    },
    Ping,
    /// Root element we do not act on.
    Unknown(String),
}

impl ControlSignal {
    pub fn classify(text: &str) -> Result<Self, TelemetryError> {
        if text.trim().is_empty() {
            return Err(TelemetryError::EmptyControlMessage);
        }
        let root = root_element(text)
            .ok_or_else(|| TelemetryError::MalformedControlMessage(snippet(text, 20)))?;

        let signal = match root {
            "MissionInit" => ControlSignal::SessionBegin,
            "MissionEnded" => ControlSignal::SessionEnd {
                status: EndStatus::from_status(element_text(text, "Status")),
                description: element_text(text, "HumanReadableStatus").map(str::to_string),
                final_reward: reward_values(text),
            },
            "ping" => ControlSignal::Ping,
            other => ControlSignal::Unknown(other.to_string()),
        };
        Ok(signal)
    }
}

pub(crate) fn snippet(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

/// Name of the document element, skipping any prolog, comments and namespace
/// prefix.
fn root_element(text: &str) -> Option<&str> {
    let mut rest = text.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("<?") {
            rest = after.split_once("?>")?.1.trim_start();
        } else if let Some(after) = rest.strip_prefix("<!--") {
            rest = after.split_once("-->")?.1.trim_start();
        } else {
            break;
        }
    }
    let body = rest.strip_prefix('<')?;
    let end = body
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(body.len());
    let name = &body[..end];
    let name = name.rsplit(':').next().unwrap_or(name);
    if name.is_empty() || !name.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        return None;
    }
    Some(name)
}

/// Offset just past the `>` of the first `<tag ...>` opening element.
fn open_tag_end(xml: &str, tag: &str) -> Option<(usize, usize)> {
    let pattern = format!("<{tag}");
    let mut from = 0;
    while let Some(pos) = xml[from..].find(&pattern) {
        let start = from + pos;
        let after = start + pattern.len();
        match xml[after..].chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_whitespace() => {
                let close = xml[after..].find('>')? + after;
                return Some((start, close + 1));
            }
            _ => from = after,
        }
    }
    None
}

fn element_text<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let (_, content_start) = open_tag_end(xml, tag)?;
    let content_end = xml[content_start..].find(&format!("</{tag}>"))? + content_start;
    Some(xml[content_start..content_end].trim())
}

fn attribute<'a>(element: &'a str, name: &str) -> Option<&'a str> {
    let pattern = format!("{name}=\"");
    let start = element.find(&pattern)? + pattern.len();
    let end = element[start..].find('"')? + start;
    Some(&element[start..end])
}

/// `<Value dimension="d" value="v"/>` entries inside `<Reward>`.
fn reward_values(xml: &str) -> Vec<(usize, f64)> {
    let Some((_, reward_start)) = open_tag_end(xml, "Reward") else {
        return Vec::new();
    };
    let reward_end = xml[reward_start..]
        .find("</Reward>")
        .map_or(xml.len(), |end| end + reward_start);
    let mut section = &xml[reward_start..reward_end];

    let mut values = Vec::new();
    while let Some((start, end)) = open_tag_end(section, "Value") {
        let element = &section[start..end];
        let dimension = attribute(element, "dimension").and_then(|d| d.parse::<usize>().ok());
        let value = attribute(element, "value").and_then(|v| v.parse::<f64>().ok());
        if let (Some(dimension), Some(value)) = (dimension, value) {
            values.push((dimension, value));
        }
        section = &section[end..];
    }
    values
}
