//! Remote adapters for the results endpoint.

pub mod http_results;
pub mod mock_results;

pub use http_results::HttpResultsGateway;
pub use mock_results::MockResultsGateway;
