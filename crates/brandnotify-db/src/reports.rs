//! Read side of `reports` and `report_analysis`, plus the insert helpers used
//! by operator tooling and tests to stage ingestion output.

use brandnotify_core::{Classification, Report, ReportAnalysis};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `reports` table, without the image payload.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReportRow {
    pub seq: i64,
    pub public_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub submitted_at: DateTime<Utc>,
}

impl From<ReportRow> for Report {
    fn from(row: ReportRow) -> Self {
        Self {
            seq: row.seq,
            public_id: row.public_id,
            latitude: row.latitude,
            longitude: row.longitude,
            submitted_at: row.submitted_at,
        }
    }
}

/// A row from the `report_analysis` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalysisRow {
    pub seq: i64,
    pub language: String,
    pub brand_name: String,
    pub brand_display_name: String,
    pub title: String,
    pub description: String,
    pub litter_probability: f64,
    pub hazard_probability: f64,
    pub severity_level: f64,
    pub inferred_contact_emails: String,
    pub classification: String,
}

impl From<AnalysisRow> for ReportAnalysis {
    fn from(row: AnalysisRow) -> Self {
        Self {
            seq: row.seq,
            language: row.language,
            brand_name: row.brand_name,
            brand_display_name: row.brand_display_name,
            title: row.title,
            description: row.description,
            litter_probability: row.litter_probability,
            hazard_probability: row.hazard_probability,
            severity_level: row.severity_level,
            inferred_contact_emails: row.inferred_contact_emails,
            classification: Classification::from_tag(&row.classification),
        }
    }
}

/// Input for [`insert_report`].
#[derive(Debug, Clone)]
pub struct NewReport<'a> {
    pub seq: i64,
    pub public_id: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub image: Option<&'a [u8]>,
    pub submitted_at: DateTime<Utc>,
}

/// Input for [`upsert_analysis`].
#[derive(Debug, Clone)]
pub struct NewAnalysis<'a> {
    pub seq: i64,
    pub language: &'a str,
    pub brand_name: &'a str,
    pub brand_display_name: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub hazard_probability: f64,
    pub severity_level: f64,
    pub inferred_contact_emails: &'a str,
    pub classification: Classification,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_report(pool: &PgPool, seq: i64) -> Result<Option<ReportRow>, DbError> {
    let row = sqlx::query_as::<_, ReportRow>(
        "SELECT seq, public_id, latitude, longitude, submitted_at FROM reports WHERE seq = $1",
    )
    .bind(seq)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns the analysis of `seq` in `language`, if the classifier produced one.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_analysis(
    pool: &PgPool,
    seq: i64,
    language: &str,
) -> Result<Option<AnalysisRow>, DbError> {
    let row = sqlx::query_as::<_, AnalysisRow>(
        "SELECT seq, language, brand_name, brand_display_name, title, description, \
                litter_probability, hazard_probability, severity_level, \
                inferred_contact_emails, classification \
         FROM report_analysis \
         WHERE seq = $1 AND language = $2",
    )
    .bind(seq)
    .bind(language)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns the stored image bytes for `seq`, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_report_image(pool: &PgPool, seq: i64) -> Result<Option<Vec<u8>>, DbError> {
    let image = sqlx::query_scalar::<_, Option<Vec<u8>>>("SELECT image FROM reports WHERE seq = $1")
        .bind(seq)
        .fetch_optional(pool)
        .await?;

    Ok(image.flatten())
}

/// Seqs analyzed in `language` strictly after `cursor`, ascending.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_analyzed_after(
    pool: &PgPool,
    cursor: i64,
    language: &str,
    limit: i64,
) -> Result<Vec<i64>, DbError> {
    let rows = sqlx::query_scalar::<_, i64>(
        "SELECT seq FROM report_analysis \
         WHERE language = $1 AND seq > $2 \
         ORDER BY seq \
         LIMIT $3",
    )
    .bind(language)
    .bind(cursor)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Analyzed seqs in `(after, cursor]` with no completion or abandonment mark.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_unfinished_up_to(
    pool: &PgPool,
    after: i64,
    cursor: i64,
    language: &str,
    limit: i64,
) -> Result<Vec<i64>, DbError> {
    let rows = sqlx::query_scalar::<_, i64>(
        "SELECT a.seq FROM report_analysis a \
         WHERE a.language = $1 AND a.seq > $2 AND a.seq <= $3 \
           AND NOT EXISTS (SELECT 1 FROM report_completed c WHERE c.seq = a.seq) \
           AND NOT EXISTS (SELECT 1 FROM report_abandoned x WHERE x.seq = a.seq) \
         ORDER BY a.seq \
         LIMIT $4",
    )
    .bind(language)
    .bind(after)
    .bind(cursor)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Inserts a report. An existing seq is left untouched.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_report(pool: &PgPool, report: &NewReport<'_>) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO reports (seq, public_id, latitude, longitude, image, submitted_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (seq) DO NOTHING",
    )
    .bind(report.seq)
    .bind(report.public_id)
    .bind(report.latitude)
    .bind(report.longitude)
    .bind(report.image)
    .bind(report.submitted_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Inserts or replaces the analysis of a report in one language.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_analysis(pool: &PgPool, analysis: &NewAnalysis<'_>) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO report_analysis \
             (seq, language, brand_name, brand_display_name, title, description, \
              hazard_probability, severity_level, inferred_contact_emails, classification) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (seq, language) DO UPDATE SET \
             brand_name = EXCLUDED.brand_name, \
             brand_display_name = EXCLUDED.brand_display_name, \
             title = EXCLUDED.title, \
             description = EXCLUDED.description, \
             hazard_probability = EXCLUDED.hazard_probability, \
             severity_level = EXCLUDED.severity_level, \
             inferred_contact_emails = EXCLUDED.inferred_contact_emails, \
             classification = EXCLUDED.classification",
    )
    .bind(analysis.seq)
    .bind(analysis.language)
    .bind(analysis.brand_name)
    .bind(analysis.brand_display_name)
    .bind(analysis.title)
    .bind(analysis.description)
    .bind(analysis.hazard_probability)
    .bind(analysis.severity_level)
    .bind(analysis.inferred_contact_emails)
    .bind(analysis.classification.as_str())
    .execute(pool)
    .await?;

    Ok(())
}
