use chrono::{DateTime, Utc};
use serde::Serialize;

/// One item from the feed, as the publisher wrote it.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub permalink: String, // from <guid>; the post id is only pulled out of it for reports
    pub timestamp: String, // feed-native, e.g. RFC 2822 from <pubDate>
    pub title: String,
    pub content: String, // raw HTML from <content:encoded>
}

/// A report ready to be written, derived from a [`Post`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub guid: i64,
    pub post_timestamp: String,
    pub published_at: DateTime<Utc>,
    pub title: String,
    pub content: String,
    pub text: String,
    pub images: Vec<String>,
    pub image: Option<String>,
    pub videos: Vec<String>,
    pub date: String,
    pub conditions: Conditions,
}

/// Surf conditions picked out of a report's text. Each one is `None` when the text doesn't
/// mention it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Conditions {
    pub swell: Option<String>,
    pub weather: Option<String>,
    pub high_tide: Option<String>,
    pub low_tide: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub id: i64,
    pub guid: i64,
    pub post_timestamp: String,
    pub published_at: DateTime<Utc>,
    pub title: String,
    pub content: String,
    pub text: String,
    pub images: Vec<String>,
    pub image: Option<String>,
    pub videos: Vec<String>,
    pub date: String,
    #[serde(flatten)]
    pub conditions: Conditions,
    pub created_at: DateTime<Utc>,
}

impl Report {
    /// Local filename for the photo at `index` in the image list.
    pub fn photo_filename(guid: i64, index: usize) -> String {
        format!("{}-{}.jpg", guid, index)
    }
}

/// Just enough of a neighbouring report to link to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportLink {
    pub id: i64,
    pub date: String,
}

/// The reports either side of one report, ordered by guid.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Adjacent {
    pub next: Option<ReportLink>,
    pub prev: Option<ReportLink>,
}

/// A report together with its neighbours, as printed by the CLI.
#[derive(Debug, Serialize)]
pub struct ReportPage {
    #[serde(flatten)]
    pub report: Report,
    #[serde(flatten)]
    pub adjacent: Adjacent,
}

/// Result of trying to insert a report keyed on its guid.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub created: bool,
    pub report: Report,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSnapshot {
    pub id: i64,
    pub spot_id: i64,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}
