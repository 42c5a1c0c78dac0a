use async_trait::async_trait;
use tracing::debug;

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs41_proto::{TestStateid4args, TestStateid4res};
use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4};

#[async_trait]
impl NfsOperation for TestStateid4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc8881#section-18.48
        debug!(
            "Operation 55: TEST_STATEID - {} stateids",
            self.ts_stateids.len()
        );
        let state = request.state_manager();
        let mut codes = Vec::with_capacity(self.ts_stateids.len());
        for stateid in &self.ts_stateids {
            // the per-stateid answer, with no filehandle binding checked
            let code = match state.validate_stateid(stateid, None).await {
                Ok(_) => NfsStat4::Nfs4Ok,
                Err(status) => status,
            };
            codes.push(code);
        }
        NfsOpResponse {
            request,
            result: Some(NfsResOp4::OpTestStateid(TestStateid4res::Resok4(codes))),
            status: NfsStat4::Nfs4Ok,
        }
    }
}
