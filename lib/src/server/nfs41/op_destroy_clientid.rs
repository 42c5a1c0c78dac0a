use async_trait::async_trait;
use tracing::debug;

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs41_proto::DestroyClientid4args;
use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4, StatusRes};

#[async_trait]
impl NfsOperation for DestroyClientid4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc8881#section-18.50
        debug!("Operation 57: DESTROY_CLIENTID {}", self.dca_clientid);
        let state = request.state_manager();
        match state.destroy_clientid(self.dca_clientid).await {
            Ok(owner_id) => {
                // a client destroying itself during grace counts as
                // reclaimed for early grace termination
                state.reclaim_finished(&owner_id).await;
                NfsOpResponse {
                    request,
                    result: Some(NfsResOp4::OpDestroyClientid(StatusRes::ok())),
                    status: NfsStat4::Nfs4Ok,
                }
            }
            Err(status) => NfsOpResponse {
                request,
                result: None,
                status,
            },
        }
    }
}
