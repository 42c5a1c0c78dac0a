use async_trait::async_trait;
use tracing::debug;

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs41_proto::ReclaimComplete4args;
use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4, StatusRes};

#[async_trait]
impl NfsOperation for ReclaimComplete4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc8881#section-18.51
        debug!(
            "Operation 58: RECLAIM_COMPLETE, rca_one_fs {}",
            self.rca_one_fs
        );
        let Some(ctx) = &request.v41 else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errOpNotInSession,
            };
        };
        let clientid = ctx.session.clientid;
        let state = request.state_manager();
        // the per-fs flavor is accepted and treated like the global one
        match state.mark_reclaim_complete(clientid).await {
            Ok(owner_id) => {
                state.reclaim_finished(&owner_id).await;
                NfsOpResponse {
                    request,
                    result: Some(NfsResOp4::OpReclaimComplete(StatusRes::ok())),
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
