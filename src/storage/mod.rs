//! Storage backend (Parquet)
//!
//! History tables persist as single Parquet files. The Arrow schema is
//! embedded by the writer, so column names, types, nullability and null
//! bits come back exactly as written.
//!
//! [`HistoryCache`] puts a directory of such files in front of a
//! [`HistoryFetcher`]: a request that was fetched once is served from disk
//! afterwards without touching the registry.

use crate::fetch::{FetchRequest, HistoryFetcher};
use crate::registry::RunRegistry;
use crate::table::HistoryTable;
use crate::{Error, Result};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use rustc_hash::FxHasher;
use std::fs::{self, File};
use std::hash::Hasher;
use std::path::{Path, PathBuf};

/// Rows per Parquet row group.
pub const ROW_GROUP_SIZE: usize = 64 * 1024;

/// Write `table` to a Parquet file at `path`, replacing any existing file.
///
/// # Errors
///
/// Returns error if the file cannot be created or written.
pub fn save_parquet<P: AsRef<Path>>(table: &HistoryTable, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| {
        Error::StorageError(format!("Failed to create {}: {e}", path.display()))
    })?;

    let props = WriterProperties::builder()
        .set_max_row_group_size(ROW_GROUP_SIZE)
        .build();
    let mut writer = ArrowWriter::try_new(file, table.schema(), Some(props))?;
    writer.write(table.batch())?;
    writer.close()?;

    tracing::debug!(path = %path.display(), rows = table.num_rows(), "saved history table");
    Ok(())
}

/// Read a history table previously written by [`save_parquet`].
///
/// # Errors
///
/// Returns error if the file cannot be opened or parsed, or if it does not
/// hold a valid history table (e.g. no `run_id` column).
pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<HistoryTable> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| Error::StorageError(format!("Failed to open {}: {e}", path.display())))?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
        Error::StorageError(format!("Failed to parse Parquet file {}: {e}", path.display()))
    })?;
    let schema = builder.schema().clone();
    let reader = builder.build().map_err(|e| {
        Error::StorageError(format!("Failed to create Parquet reader: {e}"))
    })?;

    let mut batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::StorageError(format!("Failed to read record batch: {e}")))?;

    let batch = match batches.len() {
        0 => RecordBatch::new_empty(schema),
        1 => batches.remove(0),
        _ => arrow::compute::concat_batches(&schema, &batches)?,
    };

    tracing::debug!(path = %path.display(), rows = batch.num_rows(), "loaded history table");
    HistoryTable::try_new(batch)
}

/// On-disk cache of fetched history tables.
///
/// Entries are keyed by a deterministic hash of the fetch request (entity,
/// project, keys, filters and effective sample count). A cached table is
/// identical to the one the fetcher returned when it was stored.
#[derive(Debug, Clone)]
pub struct HistoryCache {
    dir: PathBuf,
}

impl HistoryCache {
    /// Cache rooted at `dir` (created on first store).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `request` when fetched with `default_samples` as the
    /// fallback sample count.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be serialized.
    pub fn path_for(&self, request: &FetchRequest, default_samples: usize) -> Result<PathBuf> {
        let resolved = FetchRequest {
            samples: Some(request.samples.unwrap_or(default_samples)),
            ..request.clone()
        };
        let mut hasher = FxHasher::default();
        hasher.write(serde_json::to_string(&resolved)?.as_bytes());

        Ok(self.dir.join(format!(
            "{}-{}-{:016x}.parquet",
            sanitize(&request.entity),
            sanitize(&request.project),
            hasher.finish()
        )))
    }

    /// Return the cached table for `request`, fetching and storing it on a
    /// miss.
    ///
    /// An unreadable cache file is logged and replaced by a fresh fetch.
    ///
    /// # Errors
    ///
    /// Returns the fetcher's error on a miss, or a storage error if the
    /// fetched table cannot be written.
    pub async fn fetch<R: RunRegistry>(
        &self,
        fetcher: &HistoryFetcher<R>,
        request: &FetchRequest,
    ) -> Result<HistoryTable> {
        let path = self.path_for(request, fetcher.config().samples)?;

        if path.exists() {
            match load_parquet(&path) {
                Ok(table) => {
                    tracing::info!(path = %path.display(), rows = table.num_rows(), "history cache hit");
                    return Ok(table);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "discarding unreadable cache entry");
                }
            }
        }

        let table = fetcher.fetch_with(request).await?;
        fs::create_dir_all(&self.dir)?;

        // Write beside the target and rename so readers never see a partial file
        let partial = path.with_extension("parquet.partial");
        if let Err(e) = replace_with(&table, &partial, &path) {
            if let Err(cleanup) = fs::remove_file(&partial) {
                tracing::debug!(path = %partial.display(), error = %cleanup, "no partial cache file to remove");
            }
            return Err(e);
        }

        tracing::info!(path = %path.display(), rows = table.num_rows(), "stored history in cache");
        Ok(table)
    }

    /// Drop the cached entry for `request`; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be removed.
    pub fn invalidate(&self, request: &FetchRequest, default_samples: usize) -> Result<bool> {
        let path = self.path_for(request, default_samples)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn replace_with(table: &HistoryTable, partial: &Path, path: &Path) -> Result<()> {
    save_parquet(table, partial)?;
    fs::rename(partial, path)?;
    Ok(())
}
