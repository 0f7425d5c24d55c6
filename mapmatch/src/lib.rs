//! Map matching for GeoJSON point tracks, using the [Geoapify Map Matching
//! API](https://apidocs.geoapify.com/docs/map-matching/). Points become timestamped waypoints,
//! waypoints are sent in batches that respect the provider's limits, and the features returned for
//! every batch are merged into one FeatureCollection on disk.

#[macro_use]
extern crate log;

pub use crate::batch::{batches, num_batches, Batch, MAX_WAYPOINTS_PER_REQUEST};
pub use crate::client::{
    request_url, without_query, ApiClient, HttpResponse, HttpTransport, RetryPolicy, Transport,
    TransportError, REQUEST_TIMEOUT,
};
pub use crate::config::{Config, CONFIG_NAME};
pub use crate::error::Error;
pub use crate::pipeline::{run_pipeline, Pipeline, RunSummary, Settings, Stage};
pub use crate::progress::{MemorySink, ProgressSink, Severity};
pub use crate::response::{extract_features, FeatureCollection};
pub use crate::throttle::{Throttle, DELAY_BETWEEN_BATCHES, FREE_PLAN_MAX_REQUESTS_PER_SECOND};
pub use crate::waypoints::{
    timestamp_to_iso, to_waypoints, MapMatchRequest, RequestBody, Waypoint, MAPMATCH_MODE,
};

pub mod io;
pub mod logger;

mod batch;
mod client;
mod config;
mod error;
mod pipeline;
mod progress;
mod response;
mod throttle;
mod waypoints;
