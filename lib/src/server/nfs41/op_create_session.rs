use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs41_proto::{CreateSession4args, CreateSession4res};
use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4};

#[async_trait]
impl NfsOperation for CreateSession4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc8881#section-18.36
        debug!(
            "Operation 43: CREATE_SESSION - clientid {} sequence {}",
            self.csa_clientid, self.csa_sequence
        );
        let state = request.state_manager();
        match state.create_session(self).await {
            Ok(resok) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpCreateSession(CreateSession4res::Resok4(resok))),
                status: NfsStat4::Nfs4Ok,
            },
            Err(status) => {
                error!(?status, "create_session refused");
                NfsOpResponse {
                    request,
                    result: None,
                    status,
                }
            }
        }
    }
}
