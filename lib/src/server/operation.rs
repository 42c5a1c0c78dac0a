use async_trait::async_trait;

use super::{request::NfsRequest, response::NfsOpResponse};

/// One NFSv4 operation, implemented on its decoded argument type.
#[async_trait]
pub trait NfsOperation: Sync {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse;
}
