//! Outbound adapters for the collaborator ports in `hub-types`.

pub mod search;
pub mod submitter;

pub use search::ElasticsearchIndex;
pub use submitter::ChainDaemonSubmitter;

use std::time::Duration;

/// HTTP client shared by the adapters' constructors.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(2)))
        .build()
}
