use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::debug;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use url::Url;

use crate::error::ParseError;
use crate::models::{Conditions, NewReport, Post};
use crate::utils::html_to_text;

static GUID_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\?p=([0-9]+)").unwrap());

// Rasta doesn't use categories or tags, so a post is a report if its title says so.
static TITLE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)surf report").unwrap());

static SWELL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]?( to )?[0-9])ft").unwrap());

static HIGH_TIDE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(H.T|high tide) (\d{1,2}.\d{1,2}.?[ap].?m)").unwrap()
});

static LOW_TIDE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(L.T|low tide) (\d{1,2}.\d{1,2}.?[ap].?m)").unwrap()
});

static WEATHER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)sunny|overcast").unwrap());

static MEDIA_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("img[src], iframe[src], embed[src], video[src], source[src], a[href]").unwrap()
});

const DATE_FORMAT: &str = "%A, %-d %B %Y - %-I:%M %p";
const HALF_HOUR_SECS: i64 = 30 * 60;
const VIDEO_EXTENSIONS: [&str; 4] = [".mp4", ".mov", ".webm", ".m4v"];
const VIDEO_HOSTS: [&str; 4] = ["youtube.com", "youtu.be", "vimeo.com", "youtube-nocookie.com"];

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(rename = "content:encoded", alias = "encoded")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text", default)]
    value: String,
}

/// One fully buffered page of the feed. Consumed by iterating; fetch again to re-read.
///
/// Post ids aren't checked here: a page may carry non-report posts with other permalink
/// shapes, and only reports need an id.
#[derive(Debug)]
pub struct Feed {
    posts: Vec<Post>,
}

impl Feed {
    pub fn parse(xml: &str) -> Result<Self, ParseError> {
        let rss: Rss = quick_xml::de::from_str(xml)?;

        let posts = rss
            .channel
            .items
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Parsed {} posts from feed", posts.len());

        Ok(Feed { posts })
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

impl IntoIterator for Feed {
    type Item = Post;
    type IntoIter = std::vec::IntoIter<Post>;

    fn into_iter(self) -> Self::IntoIter {
        self.posts.into_iter()
    }
}

impl TryFrom<Item> for Post {
    type Error = ParseError;

    fn try_from(item: Item) -> Result<Self, Self::Error> {
        Ok(Post {
            permalink: item
                .guid
                .ok_or(ParseError::MissingField { field: "guid" })?
                .value
                .trim()
                .to_string(),
            timestamp: item
                .pub_date
                .ok_or(ParseError::MissingField { field: "pubDate" })?
                .trim()
                .to_string(),
            title: item
                .title
                .ok_or(ParseError::MissingField { field: "title" })?,
            content: item.content.unwrap_or_default(),
        })
    }
}

/// Pull the WordPress post id out of a permalink, e.g. `http://host/?p=754` is 754.
pub fn parse_guid(permalink: &str) -> Result<i64, ParseError> {
    GUID_REGEX
        .captures(permalink)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| ParseError::Guid(permalink.to_string()))
}

pub fn is_report(post: &Post) -> bool {
    TITLE_REGEX.is_match(&post.title)
}

/// Keep only the posts that look like surf reports, preserving feed order.
pub fn filter_reports(posts: impl IntoIterator<Item = Post>) -> Vec<Post> {
    posts.into_iter().filter(is_report).collect()
}

/// Turn a feed post into the report we store. Fails when the permalink has no post id.
pub fn parse_report(post: Post, tz: Tz) -> Result<NewReport, ParseError> {
    let guid = parse_guid(&post.permalink)?;
    let published_at = DateTime::parse_from_rfc2822(&post.timestamp)
        .map_err(|source| ParseError::Timestamp {
            value: post.timestamp.clone(),
            source,
        })?
        .with_timezone(&Utc);

    let media = scan_media(&post.content);
    let text = html_to_text(&post.content);

    Ok(NewReport {
        guid,
        published_at,
        conditions: parse_conditions(&text),
        text,
        image: media.images.first().cloned(),
        images: media.images,
        videos: media.videos,
        date: format_report_date(published_at, tz),
        post_timestamp: post.timestamp,
        title: post.title,
        content: post.content,
    })
}

/// Best-effort read of swell size, weather and tide times from report text.
///
/// Swell is the number part of e.g. "2ft" or "2 to 3ft"; tides are the time after
/// "H.T"/"high tide" or "L.T"/"low tide".
pub fn parse_conditions(text: &str) -> Conditions {
    let capture = |regex: &Regex, group: usize| {
        regex
            .captures(text)
            .and_then(|caps| caps.get(group))
            .map(|m| m.as_str().to_string())
    };

    Conditions {
        swell: capture(&SWELL_REGEX, 1),
        weather: capture(&WEATHER_REGEX, 0),
        high_tide: capture(&HIGH_TIDE_REGEX, 2),
        low_tide: capture(&LOW_TIDE_REGEX, 2),
    }
}

/// Round down to the half hour, then render in the configured timezone.
pub fn format_report_date(published_at: DateTime<Utc>, tz: Tz) -> String {
    round_down_to_half_hour(published_at)
        .with_timezone(&tz)
        .format(DATE_FORMAT)
        .to_string()
}

pub fn round_down_to_half_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    let secs = at.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(HALF_HOUR_SECS), 0).unwrap_or(at)
}

#[derive(Debug, Default, PartialEq)]
pub struct Media {
    pub images: Vec<String>,
    pub videos: Vec<String>,
}

/// Collect image and video URLs from post HTML in document order.
pub fn scan_media(html: &str) -> Media {
    let fragment = Html::parse_fragment(html);
    let mut media = Media::default();

    for el in fragment.select(&MEDIA_SELECTOR) {
        match el.value().name() {
            "img" => push_unique(&mut media.images, el.value().attr("src")),
            "iframe" | "embed" | "video" => push_unique(&mut media.videos, el.value().attr("src")),
            "source" if parent_is_video(&el) => {
                push_unique(&mut media.videos, el.value().attr("src"))
            }
            "a" => {
                let href = el.value().attr("href");
                if href.is_some_and(is_video_link) {
                    push_unique(&mut media.videos, href);
                }
            }
            _ => {}
        }
    }

    media
}

fn push_unique(list: &mut Vec<String>, url: Option<&str>) {
    let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
        return;
    };
    if !list.iter().any(|existing| existing == url) {
        list.push(url.to_string());
    }
}

fn parent_is_video(el: &ElementRef<'_>) -> bool {
    el.parent()
        .and_then(ElementRef::wrap)
        .is_some_and(|parent| parent.value().name() == "video")
}

fn is_video_link(href: &str) -> bool {
    let path = href.split(['?', '#']).next().unwrap_or(href).to_lowercase();
    if VIDEO_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return true;
    }

    Url::parse(href)
        .ok()
        .and_then(|url| url.host_str().map(str::to_lowercase))
        .is_some_and(|host| {
            VIDEO_HOSTS
                .iter()
                .any(|h| host == *h || host.ends_with(&format!(".{h}")))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Australia::Sydney;

    use crate::testing::FEED_PAGE;

    fn post(title: &str) -> Post {
        Post {
            permalink: "http://host/?p=1".to_string(),
            timestamp: "Wed, 15 Nov 2017 21:47:12 +0000".to_string(),
            title: title.to_string(),
            content: String::new(),
        }
    }

    #[test]
    fn test_parse_guid() {
        assert_eq!(parse_guid("http://host/?p=1083").unwrap(), 1083);
        assert_eq!(parse_guid("http://rastasurfboards.com.au/?p=754").unwrap(), 754);
        assert!(matches!(
            parse_guid("http://host/surf-report-monday/"),
            Err(ParseError::Guid(_))
        ));
        assert!(parse_guid("http://host/?page_id=12").is_err());
    }

    #[test]
    fn test_parse_feed_page() {
        let feed = Feed::parse(FEED_PAGE).unwrap();
        assert_eq!(feed.len(), 10);

        let posts: Vec<Post> = feed.into_iter().collect();
        let guids: Vec<i64> = posts
            .iter()
            .map(|p| parse_guid(&p.permalink).unwrap())
            .collect();
        assert_eq!(guids, (1001..=1010).rev().collect::<Vec<_>>());

        let first = &posts[0];
        assert_eq!(first.title, "Surf Report Thursday 16th November");
        assert_eq!(first.timestamp, "Wed, 15 Nov 2017 21:47:12 +0000");
        assert!(first.content.starts_with("<p>Morning all,</p>"));
        assert_eq!(posts[6].title, "Sunday Surf Report \u{2013} Pumping!");
    }

    #[test]
    fn test_report_without_post_id_fails() {
        let xml = r#"<rss><channel><item>
            <title>Surf Report</title>
            <pubDate>Wed, 15 Nov 2017 21:47:12 +0000</pubDate>
            <guid>http://host/surf-report/</guid>
        </item></channel></rss>"#;
        let post = Feed::parse(xml).unwrap().into_iter().next().unwrap();
        assert!(matches!(parse_report(post, Sydney), Err(ParseError::Guid(_))));
    }

    #[test]
    fn test_non_report_permalinks_are_ignored() {
        let xml = r#"<rss><channel>
        <item>
            <title>Surf Report Monday</title>
            <pubDate>Sun, 12 Nov 2017 21:31:02 +0000</pubDate>
            <guid isPermaLink="false">http://host/?p=5</guid>
        </item>
        <item>
            <title>Shop opening hours</title>
            <pubDate>Sun, 12 Nov 2017 01:00:00 +0000</pubDate>
            <guid isPermaLink="false">http://host/?page_id=12</guid>
        </item>
        </channel></rss>"#;

        let reports: Vec<NewReport> = filter_reports(Feed::parse(xml).unwrap())
            .into_iter()
            .map(|post| parse_report(post, Sydney))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].guid, 5);
    }

    #[test]
    fn test_items_split_by_other_channel_elements() {
        let xml = r#"<rss xmlns:atom="http://www.w3.org/2005/Atom"><channel>
        <item>
            <title>Surf Report</title>
            <pubDate>Sun, 12 Nov 2017 21:31:02 +0000</pubDate>
            <guid>http://host/?p=5</guid>
        </item>
        <atom:link href="http://host/?feed=rss2" rel="self" type="application/rss+xml"/>
        <item>
            <title>Surf Report</title>
            <pubDate>Mon, 13 Nov 2017 21:31:02 +0000</pubDate>
            <guid>http://host/?p=6</guid>
        </item>
        </channel></rss>"#;

        let permalinks: Vec<String> = Feed::parse(xml)
            .unwrap()
            .into_iter()
            .map(|p| p.permalink)
            .collect();
        assert_eq!(permalinks, vec!["http://host/?p=5", "http://host/?p=6"]);
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(Feed::parse("<html><body>502 Bad Gateway").is_err());
    }

    #[test]
    fn test_empty_channel() {
        let feed = Feed::parse("<rss><channel><title>x</title></channel></rss>").unwrap();
        assert!(feed.is_empty());
    }

    #[test]
    fn test_filter_reports_is_ordered_subset() {
        let all: Vec<Post> = Feed::parse(FEED_PAGE).unwrap().into_iter().collect();
        let reports = filter_reports(all.clone());

        let guids: Vec<i64> = reports
            .iter()
            .map(|p| parse_guid(&p.permalink).unwrap())
            .collect();
        assert_eq!(guids, vec![1010, 1008, 1006, 1004, 1002]);

        let mut remaining = all.iter();
        for report in &reports {
            assert!(remaining.any(|p| p == report), "out of order: {}", report.permalink);
        }
    }

    #[test]
    fn test_title_heuristic_quirks() {
        assert!(is_report(&post("SURF REPORT")));
        assert!(is_report(&post("Not a surf report, just chatting")));
        assert!(!is_report(&post("Surfreport Tuesday")));
        assert!(!is_report(&post("Surf  Report")));
    }

    #[test]
    fn test_parse_report() {
        let first = Feed::parse(FEED_PAGE).unwrap().into_iter().next().unwrap();
        let report = parse_report(first, Sydney).unwrap();

        assert_eq!(report.guid, 1010);
        assert_eq!(
            report.published_at,
            Utc.with_ymd_and_hms(2017, 11, 15, 21, 47, 12).unwrap()
        );
        assert_eq!(
            report.images,
            vec![
                "http://rastasurfboards.com.au/wordpress/wp-content/uploads/2017/11/001-300x225.jpg",
                "http://rastasurfboards.com.au/wordpress/wp-content/uploads/2017/11/002-300x225.jpg",
            ]
        );
        assert_eq!(report.image.as_deref(), Some(report.images[0].as_str()));
        assert_eq!(report.videos, vec!["https://www.youtube.com/embed/abc123"]);
        assert_eq!(report.date, "Thursday, 16 November 2017 - 8:30 AM");
        assert!(report.text.starts_with("Morning all, It\u{2019}s 2ft and clean"));
        assert_eq!(report.conditions.swell.as_deref(), Some("2"));
        assert_eq!(report.conditions.high_tide.as_deref(), Some("9.40am"));
        assert!(report.conditions.low_tide.is_none());
    }

    #[test]
    fn test_parse_conditions() {
        let conditions =
            parse_conditions("Sunny and 2 to 3ft on the sets. High tide 10:15 a.m, L.T 4.05pm");
        assert_eq!(
            conditions,
            Conditions {
                swell: Some("2 to 3".to_string()),
                weather: Some("Sunny".to_string()),
                high_tide: Some("10:15 a.m".to_string()),
                low_tide: Some("4.05pm".to_string()),
            }
        );

        let overcast = parse_conditions("Overcast, 3-4ft. H.T 9.40am");
        assert_eq!(overcast.swell.as_deref(), Some("4"));
        assert_eq!(overcast.weather.as_deref(), Some("Overcast"));
        assert_eq!(overcast.high_tide.as_deref(), Some("9.40am"));

        assert_eq!(parse_conditions("Flat. Go to work."), Conditions::default());
    }

    #[test]
    fn test_parse_report_bad_timestamp() {
        let mut p = post("Surf Report");
        p.timestamp = "yesterday-ish".to_string();
        assert!(matches!(
            parse_report(p, Sydney),
            Err(ParseError::Timestamp { .. })
        ));
    }

    #[test]
    fn test_report_without_images() {
        let mut p = post("Surf Report");
        p.content = "<p>Flat.</p>".to_string();
        let report = parse_report(p, Sydney).unwrap();
        assert!(report.images.is_empty());
        assert!(report.image.is_none());
        assert!(report.videos.is_empty());
    }

    #[test]
    fn test_round_down_to_half_hour() {
        let at = Utc.with_ymd_and_hms(2017, 11, 12, 21, 29, 59).unwrap();
        assert_eq!(
            round_down_to_half_hour(at),
            Utc.with_ymd_and_hms(2017, 11, 12, 21, 0, 0).unwrap()
        );
        let on_the_dot = Utc.with_ymd_and_hms(2017, 11, 12, 21, 30, 0).unwrap();
        assert_eq!(round_down_to_half_hour(on_the_dot), on_the_dot);
    }

    #[test]
    fn test_format_report_date_uses_configured_zone() {
        // 13:40 UTC is already the next day in Sydney (AEDT, +11).
        let at = Utc.with_ymd_and_hms(2017, 11, 15, 13, 40, 0).unwrap();
        assert_eq!(
            format_report_date(at, Sydney),
            "Thursday, 16 November 2017 - 12:30 AM"
        );
        assert_eq!(
            format_report_date(at, chrono_tz::UTC),
            "Wednesday, 15 November 2017 - 1:30 PM"
        );
    }

    #[test]
    fn test_scan_media() {
        let html = r#"
            <video src="http://host/a.webm"></video>
            <img src="http://host/1.jpg"><img src="http://host/1.jpg"><img src="">
            <video><source src="http://host/b.mp4" type="video/mp4"></video>
            <picture><source src="http://host/not-a-video.webp"></picture>
            <a href="https://vimeo.com/12345">watch</a>
            <a href="http://host/gallery/">gallery</a>
            <a href="http://host/clip.MOV?x=1">clip</a>
            <img src="http://host/2.jpg">"#;

        let media = scan_media(html);
        assert_eq!(media.images, vec!["http://host/1.jpg", "http://host/2.jpg"]);
        assert_eq!(
            media.videos,
            vec![
                "http://host/a.webm",
                "http://host/b.mp4",
                "https://vimeo.com/12345",
                "http://host/clip.MOV?x=1",
            ]
        );
    }
}
