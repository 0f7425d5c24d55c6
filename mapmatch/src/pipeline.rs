//! Runs one input file through the whole process: read, convert, submit batch by batch, merge,
//! save. Every step reports to a [`ProgressSink`]; failures end the run with one final error
//! line and never produce a partial output file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::{
    batches, io, num_batches, request_url, to_waypoints, ApiClient, Config, Error,
    FeatureCollection, ProgressSink, RetryPolicy, Throttle, Transport, DELAY_BETWEEN_BATCHES,
    MAX_WAYPOINTS_PER_REQUEST,
};

/// What a run needs besides the input file.
#[derive(Clone, Debug)]
pub struct Settings {
    pub api_url: String,
    pub api_key: String,
    /// If unset, results are written next to the input.
    pub output_dir: Option<PathBuf>,
    pub max_batch_size: usize,
    pub batch_interval: Duration,
    pub retry: RetryPolicy,
}

impl Settings {
    pub fn new(api_url: String, api_key: String) -> Settings {
        Settings {
            api_url,
            api_key,
            output_dir: None,
            max_batch_size: MAX_WAYPOINTS_PER_REQUEST,
            batch_interval: DELAY_BETWEEN_BATCHES,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &Config) -> Settings {
        let mut settings = Settings::new(config.api_url.clone(), config.api_key.clone());
        settings.output_dir = config.output_dir.clone();
        settings
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Reading,
    Converting,
    Throttling { batch: usize },
    Submitting { batch: usize },
    Merging,
    Saving,
    Done,
    Failed,
}

/// What a successful run produced.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub output: PathBuf,
    pub num_waypoints: usize,
    /// Each batch is one billed API request.
    pub num_batches: usize,
    pub num_features: usize,
}

pub struct Pipeline<T: Transport> {
    settings: Settings,
    client: ApiClient<T>,
    stage: Stage,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(settings: Settings, transport: T) -> Pipeline<T> {
        let client = ApiClient::new(transport, settings.retry);
        Pipeline {
            settings,
            client,
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Never fails outright: problems are reported through `sink`, and the result is `None`.
    pub fn run(&mut self, input: &Path, sink: &dyn ProgressSink) -> Option<RunSummary> {
        sink.info(&format!("Input: {}", input.display()));
        match self.try_run(input, sink) {
            Ok(summary) => {
                self.transition(Stage::Done);
                Some(summary)
            }
            Err(err) => {
                self.transition(Stage::Failed);
                sink.error(&err.describe());
                if err.is_retryable() {
                    sink.info(
                        "The API couldn't be reached. Check the connection and send again.",
                    );
                }
                None
            }
        }
    }

    fn try_run(&mut self, input: &Path, sink: &dyn ProgressSink) -> Result<RunSummary, Error> {
        self.transition(Stage::Reading);
        let geojson = io::read_geojson(input)?;
        sink.info(&format!(
            "GeoJSON read: type={}, features={}",
            geojson.get("type").and_then(Value::as_str).unwrap_or("?"),
            geojson
                .get("features")
                .and_then(Value::as_array)
                .map_or(0, Vec::len)
        ));

        self.transition(Stage::Converting);
        let request = to_waypoints(&geojson)?;
        sink.info(&format!(
            "Waypoints for map matching: {} (mode={})",
            request.waypoints.len(),
            request.mode
        ));
        if request.waypoints.is_empty() {
            return Err(Error::NoUsablePoints);
        }

        let url = request_url(&self.settings.api_url, &self.settings.api_key);
        let total = num_batches(request.waypoints.len(), self.settings.max_batch_size);
        let mut throttle = Throttle::new(self.settings.batch_interval);
        let mut merged = FeatureCollection::new();
        for batch in batches(&request.waypoints, self.settings.max_batch_size) {
            self.transition(Stage::Throttling {
                batch: batch.number,
            });
            sink.info(&format!(
                "Batch {}/{} ({} Waypoints)...",
                batch.number,
                batch.total,
                batch.len()
            ));
            if let Some(waited) = throttle.wait() {
                debug!("Waited {:?} before batch {}", waited, batch.number);
            }

            self.transition(Stage::Submitting {
                batch: batch.number,
            });
            let features = self
                .client
                .submit_batch(&request.body(batch.items), &url, sink)?;
            debug!("Batch {} returned {} features", batch.number, features.len());
            merged.push_batch(features);
        }

        self.transition(Stage::Merging);
        sink.success(&format!("API responses merged: {} features.", merged.len()));
        sink.info(&format!(
            "This run: {} API request(s) (Free plan: 3000 credits/day).",
            total
        ));

        self.transition(Stage::Saving);
        let output = io::output_path(input, self.settings.output_dir.as_deref());
        io::write_json(&output, &merged)?;
        sink.success(&format!("Saved: {}", output.display()));

        Ok(RunSummary {
            output,
            num_waypoints: request.waypoints.len(),
            num_batches: total,
            num_features: merged.len(),
        })
    }

    fn transition(&mut self, stage: Stage) {
        debug!("{:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }
}

/// Runs the pipeline once and returns where the result was saved, if anywhere.
pub fn run_pipeline<T: Transport>(
    input: &Path,
    settings: Settings,
    transport: T,
    sink: &dyn ProgressSink,
) -> Option<PathBuf> {
    Pipeline::new(settings, transport)
        .run(input, sink)
        .map(|summary| summary.output)
}
