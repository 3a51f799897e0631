//! A blocking client for retrieving ECMWF CAMS products from the Atmosphere
//! Data Store (ADS).
//!
//! The store works asynchronously: a request is submitted as a job, the job is
//! polled until the server has prepared the file, and the file is then
//! downloaded and checked against its declared size.
//!
//! ## Quick start
//! - Put `url:`, `key: <UID>:<APIKEY>` and optionally `verify: 0|1` lines in a
//!   credential file and point `ADSAPI_RC` at it (or pass the path explicitly).
//! - Build a [`ProductRequest`] and call [`Client::retrieve`].
//!
//! ```no_run
//! use cams_download::{
//!     CancelToken, Client, ClientConfig, DateRange, OutputFormat, ProductKind,
//!     ProductRequest, SensingTime,
//! };
//! use chrono::NaiveDate;
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let client = Client::from_env(ClientConfig::default())?;
//!     let dates = DateRange::new(
//!         NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
//!         NaiveDate::from_ymd_opt(2021, 1, 31).unwrap(),
//!     )?;
//!     let request = ProductRequest::new(
//!         ProductKind::Reanalysis,
//!         "total_column_water_vapour",
//!         dates,
//!         vec![SensingTime::from_hour(0)?, SensingTime::from_hour(12)?],
//!         OutputFormat::Grib,
//!     )?;
//!     let path = client.retrieve(&request, Path::new("."), &CancelToken::new())?;
//!     println!("stored {}", path.display());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod bbox;
mod cancel;
mod client;
mod config;
mod download;
mod error;
mod job;
mod lifecycle;
mod request;
mod util;

pub use bbox::{BoundingBox, LATITUDE_MARGIN, LONGITUDE_MARGIN, Padding};
pub use cancel::CancelToken;
pub use client::{Client, ClientConfig, JobApi, ServiceStatus};
pub use config::{CREDENTIAL_ENV, Credential};
pub use error::{Error, ErrorKind, Result};
pub use job::{Job, JobState, RemoteFile};
pub use lifecycle::{retrieve, wait_for_completion};
pub use request::{DateRange, OutputFormat, ProductKind, ProductRequest, SensingTime};
