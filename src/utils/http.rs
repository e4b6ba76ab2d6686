use std::time::Duration;

use reqwest::Client;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

pub fn build_http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("hollywood_cut/", env!("CARGO_PKG_VERSION")))
        .build()
}
