use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::{debug, info};

use crate::Command;
use crate::config::{Config, EnsureOutcome};
use crate::db::{Db, ForecastStore, ReportStore};
use crate::feed::HttpFeed;
use crate::forecast::{ForecastClient, ForecastPipeline};
use crate::ingest::Ingestor;
use crate::logger::init_logger;
use crate::models::{Report, ReportPage};
use crate::schedule::{Cycle, PublishSchedule, Scheduler, SystemClock};
use crate::snatcher::PhotoSnatcher;

pub async fn run(command: Command, config_path: Option<PathBuf>) -> Result<()> {
    // 1) Config, written out as a template on first run
    let cfg = match config_path {
        Some(path) => Config::load(&path)?,
        None => {
            let outcome: EnsureOutcome = Config::ensure_user_config()?;
            if outcome.created {
                eprintln!(
                    "Config file created at {}. Please edit it and restart the app.",
                    outcome.path.display()
                );
                return Ok(());
            }
            Config::get_user_config()?
        }
    };

    // 2) Logger
    init_logger(cfg.log_level)?;
    debug!("User config loaded");

    match command {
        Command::Run => run_schedulers(&cfg, build_client()?).await,
        Command::Sync => {
            let parts = ReportParts::open(&cfg, build_client()?).await?;
            parts.ingestor().ingest_page(1).await?;
            Ok(())
        }
        Command::SyncAll => {
            let parts = ReportParts::open(&cfg, build_client()?).await?;
            let pages = parts.ingestor().crawl_all().await?;
            println!("Finished. Fetched {} pages.", pages);
            Ok(())
        }
        Command::Forecast => {
            let Some(parts) = ForecastParts::open(&cfg, build_client()?)? else {
                bail!("No forecast spots configured");
            };
            let saved = parts.pipeline().run_cycle().await;
            println!("Saved {} of {} forecasts.", saved, parts.spot_ids.len());
            Ok(())
        }
        Command::Latest => {
            let db = Db::open(&cfg.db_path)?;
            match db.latest_report()? {
                Some(report) => print_report(&db, report)?,
                None => println!("No reports yet."),
            }
            Ok(())
        }
        Command::Reports => {
            let db = Db::open(&cfg.db_path)?;
            for report in db.list_reports()? {
                println!("{:>6}  {:>8}  {}", report.id, report.guid, report.date);
            }
            println!("{} reports stored.", db.count_reports()?);
            Ok(())
        }
        Command::Show { id } => {
            let db = Db::open(&cfg.db_path)?;
            let Some(report) = db.report_by_id(id)? else {
                bail!("No report with id {}", id);
            };
            print_report(&db, report)
        }
    }
}

/// Pretty JSON of a report plus links to the reports either side of it.
fn print_report(db: &Db, report: Report) -> Result<()> {
    let adjacent = db.adjacent(report.guid)?;
    let page = ReportPage { report, adjacent };
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}

fn build_client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(10))
        .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 13.5; rv:116.0) Gecko/20100101 Firefox/116.0")
        .build()?;
    debug!("HTTP client created");
    Ok(client)
}

/// Everything the report pipeline owns.
struct ReportParts {
    db: Db,
    feed: HttpFeed,
    snatcher: PhotoSnatcher,
    tz: Tz,
}

impl ReportParts {
    async fn open(cfg: &Config, client: reqwest::Client) -> Result<Self> {
        let snatcher = PhotoSnatcher::new(client.clone(), cfg.photos_dir.clone());
        snatcher.ensure_dir().await.with_context(|| {
            format!("Could not create photos folder {}", cfg.photos_dir.display())
        })?;
        debug!("Photos go to {}", snatcher.photos_dir().display());

        Ok(Self {
            db: Db::open(&cfg.db_path)?,
            feed: HttpFeed::new(client, cfg.feed.url.clone()),
            snatcher,
            tz: cfg.timezone,
        })
    }

    fn ingestor(&self) -> Ingestor<'_, HttpFeed, Db, PhotoSnatcher> {
        Ingestor::new(&self.feed, &self.db, &self.snatcher, self.tz)
    }
}

impl Cycle for ReportParts {
    fn name(&self) -> &str {
        "reports"
    }

    fn latest_content_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.db.latest_report()?.map(|report| report.published_at))
    }

    async fn run(&mut self) -> Result<()> {
        self.ingestor().ingest_page(1).await?;
        Ok(())
    }
}

/// Everything the forecast pipeline owns.
struct ForecastParts {
    db: Db,
    client: ForecastClient,
    spot_ids: Vec<i64>,
}

impl ForecastParts {
    /// `None` when forecasts aren't configured or there are no spots to fetch.
    fn open(cfg: &Config, client: reqwest::Client) -> Result<Option<Self>> {
        let Some(forecast) = &cfg.forecast else {
            return Ok(None);
        };
        if forecast.spot_ids.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self {
            db: Db::open(&cfg.db_path)?,
            client: ForecastClient::new(
                client,
                forecast.api_url.clone(),
                forecast.api_key.clone(),
            ),
            spot_ids: forecast.spot_ids.clone(),
        }))
    }

    fn pipeline(&self) -> ForecastPipeline<'_, ForecastClient, Db> {
        ForecastPipeline::new(&self.client, &self.db, &self.spot_ids)
    }
}

impl Cycle for ForecastParts {
    fn name(&self) -> &str {
        "forecasts"
    }

    fn latest_content_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.db.latest_forecast()?.map(|snapshot| snapshot.created_at))
    }

    async fn run(&mut self) -> Result<()> {
        let saved = self.pipeline().run_cycle().await;
        debug!("Forecast cycle saved {} snapshots", saved);
        Ok(())
    }
}

/// Drive both pipelines forever. Each one only re-arms after its own cycle has settled, and
/// they share nothing but the database file.
async fn run_schedulers(cfg: &Config, client: reqwest::Client) -> Result<()> {
    let reports = Scheduler::new(
        ReportParts::open(cfg, client.clone()).await?,
        SystemClock,
        PublishSchedule::new(cfg.timezone, cfg.feed.publish_time),
        cfg.feed.poll_interval(),
    );
    info!(
        "Syncing reports daily from {} at {} {}",
        cfg.feed.url, cfg.feed.publish_time, cfg.timezone
    );

    let forecasts = match (&cfg.forecast, ForecastParts::open(cfg, client)?) {
        (Some(forecast), Some(parts)) => {
            info!(
                "Syncing forecasts for {} spots daily at {} {}",
                parts.spot_ids.len(),
                forecast.publish_time,
                cfg.timezone
            );
            Some(Scheduler::new(
                parts,
                SystemClock,
                PublishSchedule::new(cfg.timezone, forecast.publish_time),
                forecast.poll_interval(),
            ))
        }
        _ => {
            info!("No forecast spots configured, forecasts disabled");
            None
        }
    };

    match forecasts {
        Some(forecasts) => {
            tokio::join!(reports.run_forever(), forecasts.run_forever());
        }
        None => reports.run_forever().await,
    }
    Ok(())
}
