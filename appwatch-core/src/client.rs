use std::time::Duration;

use reqwest::{redirect, Client, ClientBuilder};

const USER_AGENT: &str = concat!("appwatch/", env!("CARGO_PKG_VERSION"));

/// One HTTP client shared by the lookup and push calls of a run.
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent(USER_AGENT)
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
}
