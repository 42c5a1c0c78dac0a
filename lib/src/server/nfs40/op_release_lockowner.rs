use async_trait::async_trait;
use tracing::debug;

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4, ReleaseLockowner4args, StatusRes};

#[async_trait]
impl NfsOperation for ReleaseLockowner4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.37
        debug!(
            "Operation 39: RELEASE_LOCKOWNER - Release Lock-Owner State, clientid {}",
            self.lock_owner.clientid
        );
        let state = request.state_manager();
        match state.release_lockowner(&self.lock_owner).await {
            Ok(()) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpReleaseLockowner(StatusRes::ok())),
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
