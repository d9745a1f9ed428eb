//! # fanda: run-history aggregation for experiment tracking
//!
//! **Version**: 0.1.0
//!
//! fanda pulls the logged step series of many experiment runs out of a run
//! registry, assembles them into one tidy Arrow table (one row per run and
//! step, configuration broadcast as columns) and prepares that table for
//! plotting with a set of pure, group-wise transforms.
//!
//! ## Components
//!
//! - [`fetch::HistoryFetcher`]: queries a [`registry::RunRegistry`] and builds
//!   a [`table::HistoryTable`]
//! - [`transform`]: outlier removal, normalization, truncation, smoothing,
//!   downsampling and step alignment, chained fluently or as a
//!   [`transform::Pipeline`]
//! - [`storage`]: Parquet persistence and an on-disk fetch cache
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use fanda::registry::WandbRegistry;
//! use fanda::transform::{TableTransforms, DEFAULT_EPSILON};
//! use fanda::HistoryFetcher;
//!
//! # async fn run() -> fanda::Result<()> {
//! fanda::logging::init();
//!
//! let fetcher = HistoryFetcher::new(WandbRegistry::from_env()?);
//! let table = fetcher
//!     .fetch("my-team", "cartpole", Some(vec!["loss".into()]), None, 500)
//!     .await?;
//!
//! let ready = table
//!     .truncate("_step", "run_id")?
//!     .remove_outliers("loss", 0.01, 0.99, "group")?
//!     .normalize("loss", "group", DEFAULT_EPSILON)?;
//! println!("{} rows ready for plotting", ready.num_rows());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod registry;
pub mod storage;
pub mod table;
pub mod transform;

pub use config::{FetchConfig, RegistryConfig};
pub use error::{Error, Result};
pub use fetch::{FetchReport, FetchRequest, HistoryFetcher};
pub use registry::{MemoryRunRegistry, RunDescriptor, RunRegistry, WandbRegistry};
pub use storage::HistoryCache;
pub use table::HistoryTable;
pub use transform::{Aggregation, GroupKey, Pipeline, TableTransforms, Transform};
