use std::path::Path;

use anyhow::Result;

use mapmatch::{
    batches, io, to_waypoints, Error, MapMatchRequest, RequestBody, MAX_WAYPOINTS_PER_REQUEST,
};

/// Converts the input and shows exactly what would be sent, one body per request, without
/// contacting the API.
pub fn run(input: &Path, output: Option<&Path>) -> Result<()> {
    let geojson = io::read_geojson(input)?;
    let request = to_waypoints(&geojson)?;
    if request.waypoints.is_empty() {
        return Err(Error::NoUsablePoints.into());
    }

    let bodies = request_bodies(&request, MAX_WAYPOINTS_PER_REQUEST);
    info!(
        "{} waypoints would take {} request(s)",
        request.waypoints.len(),
        bodies.len()
    );
    match output {
        Some(path) => {
            io::write_json(path, &bodies)?;
            println!("Wrote {}", path.display());
        }
        None => println!("{}", io::to_json(&bodies)?),
    }
    Ok(())
}

fn request_bodies(request: &MapMatchRequest, max_per_batch: usize) -> Vec<RequestBody> {
    batches(&request.waypoints, max_per_batch)
        .map(|batch| request.body(batch.items))
        .collect()
}
