use lazy_static::lazy_static;
use reqwest::ClientBuilder;
use reqwest_middleware::{ClientBuilder as ClientWithMiddlewareBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};

const API_RETRY_COUNT: u32 = 3;
const USER_AGENT: &str = "screeps-benchmark";

lazy_static! {
    // Client with retry middleware for the game HTTP API
    pub static ref API_CLIENT: ClientWithMiddleware = ClientWithMiddlewareBuilder::new(
        ClientBuilder::new()
            .user_agent(USER_AGENT)
            .build()
            .unwrap()
    )
    .with(RetryTransientMiddleware::new_with_policy(
        ExponentialBackoff::builder().build_with_max_retries(API_RETRY_COUNT)
    ))
    .build();

    // Client without retry middleware for the command channel: commands are not idempotent,
    // and the readiness prober handles retries on its own schedule
    pub static ref COMMAND_CLIENT: reqwest::Client = ClientBuilder::new()
        .user_agent(USER_AGENT)
        .build()
        .unwrap();
}
