use std::path::Path;

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::StoreError;
use crate::models::{
    Adjacent, Conditions, CreateOutcome, ForecastSnapshot, NewReport, Report, ReportLink,
};

const SCHEMA_SQL: &str = include_str!("../schema.sql");

const REPORT_COLUMNS: &str = "id, guid, post_timestamp, published_at, title, content, text, \
     images, image, videos, date, created_at, swell, weather, high_tide, low_tide";

/// Where reports go. Uniqueness on guid is the only de-duplication there is.
pub trait ReportStore {
    /// Insert unless a report with the same guid exists. A collision is not an error:
    /// it comes back as `created: false` with the row already stored.
    fn create_report(&self, report: &NewReport) -> Result<CreateOutcome, StoreError>;

    fn latest_report(&self) -> Result<Option<Report>, StoreError>;
}

pub trait ForecastStore {
    fn create_forecast(
        &self,
        spot_id: i64,
        payload: &str,
        created_at: DateTime<Utc>,
    ) -> Result<ForecastSnapshot, StoreError>;

    fn latest_forecast(&self) -> Result<Option<ForecastSnapshot>, StoreError>;
}

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DB at {}", path.display()))?;
        Self::init(conn).context("Failed to initialize schema")
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Db { conn })
    }

    pub fn report_by_guid(&self, guid: i64) -> Result<Option<Report>, StoreError> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE guid = ?");
        self.conn
            .query_row(&sql, [guid], row_to_report_columns)
            .optional()?
            .map(ReportRow::into_report)
            .transpose()
    }

    pub fn report_by_id(&self, id: i64) -> Result<Option<Report>, StoreError> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?");
        self.conn
            .query_row(&sql, [id], row_to_report_columns)
            .optional()?
            .map(ReportRow::into_report)
            .transpose()
    }

    /// All reports, newest guid first.
    pub fn list_reports(&self) -> Result<Vec<Report>, StoreError> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM reports ORDER BY guid DESC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_report_columns)?;

        let mut reports = Vec::new();
        for row in rows {
            reports.push(row?.into_report()?);
        }
        Ok(reports)
    }

    /// The nearest reports by guid on either side of `guid`.
    pub fn adjacent(&self, guid: i64) -> Result<Adjacent, StoreError> {
        Ok(Adjacent {
            next: self.report_link(
                "SELECT id, date FROM reports WHERE guid > ? ORDER BY guid ASC LIMIT 1",
                guid,
            )?,
            prev: self.report_link(
                "SELECT id, date FROM reports WHERE guid < ? ORDER BY guid DESC LIMIT 1",
                guid,
            )?,
        })
    }

    fn report_link(&self, sql: &str, guid: i64) -> Result<Option<ReportLink>, StoreError> {
        Ok(self
            .conn
            .query_row(sql, [guid], |row| {
                Ok(ReportLink {
                    id: row.get(0)?,
                    date: row.get(1)?,
                })
            })
            .optional()?)
    }

    pub fn count_reports(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))?)
    }
}

impl ReportStore for Db {
    fn create_report(&self, report: &NewReport) -> Result<CreateOutcome, StoreError> {
        let inserted = self.conn.execute(
            "INSERT INTO reports (
                guid, post_timestamp, published_at, title, content, text,
                images, image, videos, date, created_at,
                swell, weather, high_tide, low_tide
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guid) DO NOTHING",
            params![
                report.guid,
                &report.post_timestamp,
                report.published_at.to_rfc3339(),
                &report.title,
                &report.content,
                &report.text,
                serde_json::to_string(&report.images)?,
                &report.image,
                serde_json::to_string(&report.videos)?,
                &report.date,
                Utc::now().to_rfc3339(),
                &report.conditions.swell,
                &report.conditions.weather,
                &report.conditions.high_tide,
                &report.conditions.low_tide,
            ],
        )?;

        let created = inserted > 0;
        if created {
            info!("Added surf report {} to the db.", report.guid);
        } else {
            info!("guid {} already exists in db, skipping.", report.guid);
        }

        let stored = self
            .report_by_guid(report.guid)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)?;

        Ok(CreateOutcome {
            created,
            report: stored,
        })
    }

    fn latest_report(&self) -> Result<Option<Report>, StoreError> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM reports ORDER BY guid DESC LIMIT 1");
        self.conn
            .query_row(&sql, [], row_to_report_columns)
            .optional()?
            .map(ReportRow::into_report)
            .transpose()
    }
}

impl ForecastStore for Db {
    fn create_forecast(
        &self,
        spot_id: i64,
        payload: &str,
        created_at: DateTime<Utc>,
    ) -> Result<ForecastSnapshot, StoreError> {
        self.conn.execute(
            "INSERT INTO forecasts (spot_id, payload, created_at) VALUES (?, ?, ?)",
            params![spot_id, payload, created_at.to_rfc3339()],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Saved forecast {} for spot {}", id, spot_id);

        Ok(ForecastSnapshot {
            id,
            spot_id,
            payload: payload.to_string(),
            created_at,
        })
    }

    fn latest_forecast(&self) -> Result<Option<ForecastSnapshot>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, spot_id, payload, created_at FROM forecasts ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, spot_id, payload, created_at)) = row else {
            return Ok(None);
        };

        Ok(Some(ForecastSnapshot {
            id,
            spot_id,
            payload,
            created_at: created_at.parse()?,
        }))
    }
}

// Raw column values; the JSON and timestamp columns are decoded outside rusqlite's closure
// so their errors keep their own type.
struct ReportRow {
    id: i64,
    guid: i64,
    post_timestamp: String,
    published_at: String,
    title: String,
    content: String,
    text: String,
    images: String,
    image: Option<String>,
    videos: String,
    date: String,
    created_at: String,
    conditions: Conditions,
}

fn row_to_report_columns(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: row.get(0)?,
        guid: row.get(1)?,
        post_timestamp: row.get(2)?,
        published_at: row.get(3)?,
        title: row.get(4)?,
        content: row.get(5)?,
        text: row.get(6)?,
        images: row.get(7)?,
        image: row.get(8)?,
        videos: row.get(9)?,
        date: row.get(10)?,
        created_at: row.get(11)?,
        conditions: Conditions {
            swell: row.get(12)?,
            weather: row.get(13)?,
            high_tide: row.get(14)?,
            low_tide: row.get(15)?,
        },
    })
}

impl ReportRow {
    fn into_report(self) -> Result<Report, StoreError> {
        Ok(Report {
            id: self.id,
            guid: self.guid,
            post_timestamp: self.post_timestamp,
            published_at: self.published_at.parse()?,
            title: self.title,
            content: self.content,
            text: self.text,
            images: serde_json::from_str(&self.images)?,
            image: self.image,
            videos: serde_json::from_str(&self.videos)?,
            date: self.date,
            conditions: self.conditions,
            created_at: self.created_at.parse()?,
        })
    }
}
