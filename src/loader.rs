use std::fs;
use std::path::{Path, PathBuf};

use sqlx::PgPool;

use crate::db;
use crate::error::{Error, Result};
use crate::models::{CollisionRecord, FileReport, LoadOutcome, LoadSummary, RawCollisionRow};

pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Enumerates the yearly collision CSVs under a data directory, in filename
/// order. Each row carries its own date, so cross-file order does not affect
/// correctness.
pub fn collision_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Loads a set of yearly CSV files into the warehouse.
///
/// Safe to re-run: a warehouse that already contains rows is left untouched,
/// and a second loader racing this one backs off via the advisory lock.
/// Missing or unreadable files are skipped and counted; warehouse failures
/// abort the run.
pub async fn load_files(
    pool: &PgPool,
    paths: &[PathBuf],
    batch_size: usize,
) -> Result<LoadOutcome> {
    if db::collision_count(pool).await? > 0 {
        log::warn!(
            "collisions table is not empty; skipping load (a partial prior load is indistinguishable from a complete one)"
        );
        return Ok(LoadOutcome::AlreadyLoaded);
    }

    let Some(lock) = db::LoadLock::try_acquire(pool).await? else {
        log::warn!("another load is already in progress; nothing to do");
        return Ok(LoadOutcome::LoadInProgress);
    };

    let result = load_all(pool, paths, batch_size.max(1)).await;
    lock.release().await?;
    result.map(LoadOutcome::Completed)
}

async fn load_all(pool: &PgPool, paths: &[PathBuf], batch_size: usize) -> Result<LoadSummary> {
    let mut summary = LoadSummary::default();

    for path in paths {
        summary.files_attempted += 1;

        if !path.is_file() {
            log::warn!("input file {} does not exist; skipping", path.display());
            summary.files_missing += 1;
            continue;
        }

        match load_file(pool, path, batch_size).await {
            Ok(report) => {
                log::info!(
                    "loaded {} ({} rows in, {} skipped, {} duplicates)",
                    path.display(),
                    report.rows_loaded,
                    report.rows_skipped,
                    report.rows_deduped
                );
                summary.reports.push(report);
            }
            // File-level read failures skip the file; warehouse errors abort.
            Err(Error::Csv(err)) => {
                log::warn!("could not read {}: {err}; skipping", path.display());
                summary.files_missing += 1;
            }
            Err(Error::Io(err)) => {
                log::warn!("could not read {}: {err}; skipping", path.display());
                summary.files_missing += 1;
            }
            Err(other) => return Err(other),
        }
    }

    Ok(summary)
}

async fn load_file(pool: &PgPool, path: &Path, batch_size: usize) -> Result<FileReport> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut report = FileReport::new(path.to_path_buf());
    let mut batch: Vec<CollisionRecord> = Vec::with_capacity(batch_size);

    for result in reader.deserialize::<RawCollisionRow>() {
        match parse_record(result) {
            Some(record) => batch.push(record),
            None => report.rows_skipped += 1,
        }
        if batch.len() >= batch_size {
            flush(pool, &mut batch, &mut report).await?;
        }
    }
    flush(pool, &mut batch, &mut report).await?;

    Ok(report)
}

/// One record through deserialization and coercion. Failures are logged and
/// counted by the caller, never fatal to the file.
fn parse_record(
    result: std::result::Result<RawCollisionRow, csv::Error>,
) -> Option<CollisionRecord> {
    let raw = match result {
        Ok(raw) => raw,
        Err(err) => {
            log::debug!("unreadable CSV record: {err}");
            return None;
        }
    };
    match raw.normalize() {
        Ok(record) => Some(record),
        Err(err) => {
            log::debug!("rejected row: {err}");
            None
        }
    }
}

async fn flush(
    pool: &PgPool,
    batch: &mut Vec<CollisionRecord>,
    report: &mut FileReport,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let (inserted, deduped) = db::insert_batch(pool, batch).await?;
    report.rows_loaded += inserted;
    report.rows_deduped += deduped;
    batch.clear();
    Ok(())
}
