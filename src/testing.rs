//! Fakes shared by the pipeline tests.

use std::cell::RefCell;
use std::path::PathBuf;

use crate::error::{FetchError, SnatchError};
use crate::feed::FeedSource;
use crate::snatcher::PhotoSnatch;

pub const FEED_PAGE: &str = include_str!("../tests/fixtures/feed_page.xml");

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A minimal RSS page with one photo per post.
pub fn rss_page(posts: &[(i64, &str)]) -> String {
    let items: String = posts
        .iter()
        .map(|(guid, title)| {
            format!(
                r#"<item>
    <title>{title}</title>
    <pubDate>Wed, 15 Nov 2017 21:47:12 +0000</pubDate>
    <guid isPermaLink="false">http://host/?p={guid}</guid>
    <content:encoded><![CDATA[<p>{title}</p><img src="http://host/{guid}.jpg" />]]></content:encoded>
</item>
"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
<channel>
<title>test</title>
{items}</channel>
</rss>"#
    )
}

/// Serves canned pages; anything past the last one is a 404.
pub struct FakeFeed {
    pages: Vec<Result<String, u16>>,
    pub requested: RefCell<Vec<u32>>,
}

impl FakeFeed {
    pub fn new(pages: Vec<String>) -> Self {
        Self {
            pages: pages.into_iter().map(Ok).collect(),
            requested: RefCell::new(Vec::new()),
        }
    }

    /// Like `new`, but individual pages may answer with an error status.
    pub fn with_statuses(pages: Vec<Result<String, u16>>) -> Self {
        Self {
            pages,
            requested: RefCell::new(Vec::new()),
        }
    }
}

impl FeedSource for FakeFeed {
    async fn fetch_page(&self, page: u32) -> Result<String, FetchError> {
        self.requested.borrow_mut().push(page);
        let url = format!("http://host/?feed=rss2&paged={page}");

        match (page as usize).checked_sub(1).and_then(|i| self.pages.get(i)) {
            None => Err(FetchError::NotFound { url }),
            Some(Err(status)) => Err(FetchError::Status {
                url,
                status: *status,
            }),
            Some(Ok(xml)) => Ok(xml.clone()),
        }
    }
}

/// Records every snatch instead of touching the network or disk.
#[derive(Default)]
pub struct RecordingSnatcher {
    pub filenames: RefCell<Vec<String>>,
    pub failing_urls: Vec<String>,
    /// Optional hook run on every snatch, e.g. to look at the store mid-run.
    pub on_snatch: Option<Box<dyn Fn(&str)>>,
}

impl PhotoSnatch for RecordingSnatcher {
    async fn snatch(&self, url: &str, filename: &str) -> Result<PathBuf, SnatchError> {
        self.filenames.borrow_mut().push(filename.to_string());
        if let Some(hook) = &self.on_snatch {
            hook(filename);
        }
        if self.failing_urls.iter().any(|u| u == url) {
            return Err(SnatchError::Status(500));
        }
        Ok(PathBuf::from("/photos").join(filename))
    }
}
