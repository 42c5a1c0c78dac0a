use async_trait::async_trait;
use tracing::debug;

use crate::server::nfs40::supported_flavors;
use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs41_proto::SecinfoStyle4;
use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4, SecInfo4res};

/// SECINFO_NO_NAME carries only a style discriminant; this wrapper makes
/// it dispatchable like the other operations.
pub(crate) struct SecinfoNoNameOp {
    pub style: SecinfoStyle4,
}

#[async_trait]
impl NfsOperation for SecinfoNoNameOp {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc8881#section-18.45
        debug!("Operation 52: SECINFO_NO_NAME, style {:?}", self.style);
        if request.current_filehandle().is_none() {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        }
        // the same flavors apply to the object and to its parent
        NfsOpResponse {
            request,
            result: Some(NfsResOp4::OpSecinfoNoName(SecInfo4res::Resok4(
                supported_flavors(),
            ))),
            status: NfsStat4::Nfs4Ok,
        }
    }
}
