//! `stage-extract` moves uploaded flat files through warehouse stages and turns them into
//! tables.
//!
//! Files are uploaded to `RAW_STAGE`, moved to `PROCESSING_STAGE` while they are converted,
//! and end up in `COMPLETED_STAGE` or `ERROR_STAGE`. Every step is recorded in an append-only
//! operation log (`LOGS.FILE_OPERATION_LOG`).
//!
//! ## What gets converted
//!
//! **File formats (dispatched by extension):**
//!
//! - **Delimited text**: `.csv`, `.txt` (delimiter sniffed among `,` `;` tab `|`)
//! - **Excel** (requires the Cargo feature `excel`, on by default): `.xlsx`, `.xls`, one table
//!   per non-empty sheet
//! - **PDF**: `.pdf`, a one-row metadata table (no text extraction)
//!
//! Column types are inferred per column (Int64, then Float64, then Bool, else Utf8); empty cells
//! become [`types::Value::Null`]. Every table gets a `SOURCE_FILE_NAME` column.
//!
//! ## Quick example: parse a file
//!
//! ```rust
//! use stage_extract::convert::{parse_file, sanitize};
//!
//! # fn main() -> Result<(), stage_extract::ExtractError> {
//! let conversion = parse_file("Q1 sales.csv", b"region;amount\nnorth;10\nsouth;12\n")?;
//! let table = &conversion.tables[0];
//! assert_eq!(table.name, sanitize("Q1 sales.csv"));
//! assert_eq!(table.name, "Q1_SALES");
//! assert_eq!(table.data.row_count(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Running the pipeline
//!
//! ```no_run
//! use stage_extract::app::AppState;
//! use stage_extract::config::AppConfig;
//! use stage_extract::connection::ConnectionProvider;
//! use stage_extract::logging::init_logging;
//!
//! # fn main() -> Result<(), stage_extract::ExtractError> {
//! let config = AppConfig::from_env()?;
//! init_logging(&config.logging)?;
//!
//! // Strategies come from `connection::default_strategies` with a driver of your choice.
//! let mut app = AppState::new(config, ConnectionProvider::new(Vec::new()));
//! app.bootstrap()?;
//!
//! let pipeline = app.pipeline()?;
//! pipeline.upload("people.csv", b"id,name\n1,ada\n")?;
//! let outcome = pipeline.process("people.csv");
//! println!("{}", outcome.message);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`connection`]: cursor adapter traits and the strategy-based connection provider
//! - [`stage`]: stage backends and the [`stage::StageStore`] façade
//! - [`convert`]: parsing, type inference and table materialization
//! - [`pipeline`]: the per-file state machine, bulk loops and observers
//! - [`audit`]: operation log writes, queries and maintenance
//! - [`catalog`]: inspection of converted tables
//! - [`app`]: application state and bootstrap
//! - [`config`], [`logging`], [`error`]: ambient configuration, tracing setup and errors

pub mod app;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod convert;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod sql;
pub mod stage;
pub mod types;

pub use error::{ExtractError, ExtractResult};
