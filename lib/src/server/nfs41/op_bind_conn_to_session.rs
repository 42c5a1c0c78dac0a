use async_trait::async_trait;
use tracing::debug;

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs41_proto::{BindConnToSession4args, BindConnToSession4res};
use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4};

#[async_trait]
impl NfsOperation for BindConnToSession4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc8881#section-18.34
        debug!(
            "Operation 41: BIND_CONN_TO_SESSION {:02x?} dir {:?}",
            self.bctsa_sessid, self.bctsa_dir
        );
        let state = request.state_manager();
        match state
            .bind_conn_to_session(&self.bctsa_sessid, self.bctsa_dir, request.conn_id)
            .await
        {
            Ok(resok) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpBindConnToSession(
                    BindConnToSession4res::Resok4(resok),
                )),
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
