use async_trait::async_trait;
use tracing::debug;

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs4_proto::{DelegReturn4args, NfsResOp4, NfsStat4, StatusRes};

#[async_trait]
impl NfsOperation for DelegReturn4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.6
        debug!(
            "Operation 8: DELEGRETURN - Return Delegation {:?}",
            self.deleg_stateid
        );
        if request.current_filehandle().is_none() {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        }
        let state = request.state_manager();
        // accepted idempotently, including after a revocation
        match state.delegreturn(&self.deleg_stateid).await {
            Ok(()) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpDelegReturn(StatusRes::ok())),
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
