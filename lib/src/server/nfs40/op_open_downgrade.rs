use async_trait::async_trait;
use tracing::debug;

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4, OpenDowngrade4args, OpenDowngrade4res};

#[async_trait]
impl NfsOperation for OpenDowngrade4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.19
        debug!(
            "Operation 21: OPEN_DOWNGRADE - Reduce Open File Access {:?} to {:x}/{:x}",
            self.open_stateid, self.share_access, self.share_deny
        );
        if request.current_filehandle().is_none() {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        }
        let state = request.state_manager();
        let skip = request.skip_owner_seqid;
        match state
            .downgrade_open(
                &self.open_stateid,
                self.seqid,
                self.share_access,
                self.share_deny,
                skip,
            )
            .await
        {
            Ok(stateid) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpOpenDowngrade(OpenDowngrade4res::Resok4(
                    stateid,
                ))),
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
