//! Inbound message and thread types.
//!
//! Messages are immutable once ingested. Deserialization is lenient: a
//! missing body becomes empty and an unparseable date becomes `None`, so
//! malformed input degrades instead of failing the run.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One inbound email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Provider message identifier.
    pub id: String,
    /// Raw `From` header, e.g. `"Shop <deals@shop.example>"`.
    #[serde(default)]
    pub from: String,
    /// Sent timestamp. `None` when absent or unparseable.
    #[serde(
        default,
        alias = "timestamp",
        deserialize_with = "deserialize_lenient_date"
    )]
    pub date: Option<DateTime<Utc>>,
    /// Subject line, if any.
    #[serde(default)]
    pub subject: Option<String>,
    /// Plain-text body.
    #[serde(default)]
    pub body: String,
    /// Raw headers (names compared case-insensitively).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl Message {
    /// Build a message with no subject or headers.
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        date: Option<DateTime<Utc>>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            date,
            subject: None,
            body: body.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Set the subject line.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Add a raw header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Subject line or the empty string.
    pub fn subject_text(&self) -> &str {
        self.subject.as_deref().unwrap_or("")
    }

    /// Bare lowercased sender address from the `From` header.
    pub fn sender_address(&self) -> String {
        let raw = self.from.trim();
        if let (Some(start), Some(end)) = (raw.find('<'), raw.rfind('>')) {
            if end > start {
                return raw[start.saturating_add(1)..end].trim().to_lowercase();
            }
        }
        raw.to_lowercase()
    }

    /// The message timestamp, or `fallback` when the date was missing.
    pub fn timestamp_or(&self, fallback: DateTime<Utc>) -> DateTime<Utc> {
        self.date.unwrap_or(fallback)
    }
}

/// An ordered conversation. Later messages may answer earlier ones, so
/// insertion order is meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Thread identifier.
    #[serde(default)]
    pub id: String,
    /// Messages in chronological order.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Thread {
    /// Build a thread from messages in the given order.
    pub fn new(id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: id.into(),
            messages,
        }
    }

    /// Wrap a single message as a one-message thread.
    pub fn single(message: Message) -> Self {
        Self {
            id: message.id.clone(),
            messages: vec![message],
        }
    }
}

/// Coarse position of a thread in a business process.
///
/// Declaration order is the detection priority: the first stage whose
/// keywords appear in the thread wins, and [`ConversationStage::Inquiry`]
/// is the fallback.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStage {
    /// Invoices, shipping, delivery.
    Fulfillment,
    /// Purchasing and checkout.
    Order,
    /// Quotes, estimates, proposals.
    Quotation,
    /// Meetings and appointments.
    Scheduling,
    /// Problems and help requests.
    Support,
    /// Reminders and check-ins.
    Followup,
    /// Default when nothing else matches.
    #[default]
    Inquiry,
}

impl ConversationStage {
    /// Stages in detection priority order.
    pub const PRIORITY: [ConversationStage; 7] = [
        Self::Fulfillment,
        Self::Order,
        Self::Quotation,
        Self::Scheduling,
        Self::Support,
        Self::Followup,
        Self::Inquiry,
    ];

    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fulfillment => "fulfillment",
            Self::Order => "order",
            Self::Quotation => "quotation",
            Self::Scheduling => "scheduling",
            Self::Support => "support",
            Self::Followup => "followup",
            Self::Inquiry => "inquiry",
        }
    }
}

/// Parse a date string in any of the formats mail sources emit.
///
/// Accepts RFC 3339, RFC 2822, `YYYY-MM-DD HH:MM:SS` and bare `YYYY-MM-DD`
/// (all naive forms read as UTC).
pub fn parse_message_date(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn deserialize_lenient_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value {
        serde_json::Value::String(s) => parse_message_date(&s),
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }))
}
