use chrono::Utc;
use log::{info, warn};
use reqwest::Client;
use url::Url;

use crate::db::ForecastStore;
use crate::error::{FetchError, IngestError};
use crate::feed::get_text;
use crate::sequence::{FailurePolicy, run_sequential};

/// Where forecast payloads come from. The payload is kept as-is.
#[allow(async_fn_in_trait)]
pub trait ForecastSource {
    async fn fetch_forecast(&self, spot_id: i64) -> Result<String, FetchError>;
}

/// The forecast API: `<api_url>/<api_key>/forecast/?spot_id=<id>`.
pub struct ForecastClient {
    client: Client,
    api_url: Url,
    api_key: String,
}

impl ForecastClient {
    pub fn new(client: Client, api_url: Url, api_key: String) -> Self {
        Self {
            client,
            api_url,
            api_key,
        }
    }

    pub fn spot_url(&self, spot_id: i64) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&self.api_key)
                .push("forecast")
                .push("");
        }
        url.query_pairs_mut()
            .clear()
            .append_pair("spot_id", &spot_id.to_string());
        url
    }
}

impl ForecastSource for ForecastClient {
    async fn fetch_forecast(&self, spot_id: i64) -> Result<String, FetchError> {
        get_text(&self.client, self.spot_url(spot_id)).await
    }
}

/// Fetch every configured spot and keep one snapshot per fetch.
pub struct ForecastPipeline<'a, F, S> {
    source: &'a F,
    store: &'a S,
    spot_ids: &'a [i64],
}

impl<'a, F, S> ForecastPipeline<'a, F, S>
where
    F: ForecastSource,
    S: ForecastStore,
{
    pub fn new(source: &'a F, store: &'a S, spot_ids: &'a [i64]) -> Self {
        Self {
            source,
            store,
            spot_ids,
        }
    }

    /// One pass over all spots. A spot that fails is logged and skipped; the others still run.
    /// Returns how many snapshots were saved.
    pub async fn run_cycle(&self) -> usize {
        info!("Fetching forecasts for {} spots...", self.spot_ids.len());

        let results = run_sequential(
            self.spot_ids
                .iter()
                .map(|&spot_id| move || self.save_spot(spot_id)),
            FailurePolicy::Continue,
        )
        .await
        .unwrap_or_default();

        let saved = results.iter().flatten().count();
        if saved < self.spot_ids.len() {
            warn!(
                "Saved {} of {} forecasts",
                saved,
                self.spot_ids.len()
            );
        } else {
            info!("Saved {} forecasts", saved);
        }
        saved
    }

    async fn save_spot(&self, spot_id: i64) -> Result<i64, IngestError> {
        let payload = self.source.fetch_forecast(spot_id).await?;
        let snapshot = self.store.create_forecast(spot_id, &payload, Utc::now())?;
        info!("Saved forecast {} for spot {}", snapshot.id, spot_id);
        Ok(snapshot.id)
    }
}
