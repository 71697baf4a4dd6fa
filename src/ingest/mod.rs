/// Data ingestion from the backend aggregator and the NWS alerts API.
///
/// Each upstream gets its own file under ingest/ rather than bloating one.

pub mod api;
pub mod nws;
pub mod fixtures;
