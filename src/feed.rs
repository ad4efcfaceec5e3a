use log::debug;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::error::FetchError;

/// A paginated source of raw feed text.
#[allow(async_fn_in_trait)]
pub trait FeedSource {
    /// Fetch one page (1-based). Running past the last page is [`FetchError::NotFound`].
    async fn fetch_page(&self, page: u32) -> Result<String, FetchError>;
}

/// WordPress RSS over HTTP; pages are selected with the `paged` query parameter.
pub struct HttpFeed {
    client: Client,
    base_url: Url,
}

impl HttpFeed {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn page_url(&self, page: u32) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut().append_pair("paged", &page.to_string());
        url
    }
}

impl FeedSource for HttpFeed {
    async fn fetch_page(&self, page: u32) -> Result<String, FetchError> {
        let url = self.page_url(page);
        debug!("Fetching RSS page {} from {}", page, url);
        get_text(&self.client, url).await
    }
}

/// GET a URL as text, turning non-success statuses into typed errors.
pub async fn get_text(client: &Client, url: Url) -> Result<String, FetchError> {
    let response = client.get(url.clone()).send().await?;
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound {
            url: url.to_string(),
        });
    }
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    Ok(response.text().await?)
}
