use async_trait::async_trait;
use tracing::debug;

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs41_proto::DestroySession4args;
use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4, StatusRes};

#[async_trait]
impl NfsOperation for DestroySession4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc8881#section-18.37
        debug!("Operation 44: DESTROY_SESSION {:02x?}", self.dsa_sessionid);
        let state = request.state_manager();
        match state.destroy_session(&self.dsa_sessionid).await {
            Ok(()) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpDestroySession(StatusRes::ok())),
                status: NfsStat4::Nfs4Ok,
            },
            Err(status) => NfsOpResponse {
                request,
                result: None,
                status,
            },
        }
    }
}
