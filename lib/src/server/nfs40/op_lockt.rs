use async_trait::async_trait;
use tracing::debug;

use crate::server::{
    filemanager::FsObject, operation::NfsOperation, request::NfsRequest, response::NfsOpResponse,
};

use keel_proto::nfs4_proto::{Lockt4args, Lockt4res, NfsResOp4, NfsStat4};

#[async_trait]
impl NfsOperation for Lockt4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.11
        debug!(
            "Operation 13: LOCKT - Test for Lock {:?} offset {} length {}",
            self.locktype, self.offset, self.length
        );
        let Some(current) = request.current_filehandle().cloned() else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        };
        let entry = match &current {
            FsObject::Real(entry) if entry.is_regular() => entry.clone(),
            FsObject::Real(entry) if entry.is_dir() => {
                return NfsOpResponse {
                    request,
                    result: None,
                    status: NfsStat4::Nfs4errIsdir,
                }
            }
            _ => {
                return NfsOpResponse {
                    request,
                    result: None,
                    status: NfsStat4::Nfs4errInval,
                }
            }
        };

        let state = request.state_manager();
        let mut owner = self.owner.clone();
        if let Some(ctx) = &request.v41 {
            owner.clientid = ctx.session.clientid;
        }
        match state
            .test_lock(&entry.handle(), self.locktype, self.offset, self.length, &owner)
            .await
        {
            Ok(None) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpLockt(Lockt4res::Resok4)),
                status: NfsStat4::Nfs4Ok,
            },
            Ok(Some(denied)) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpLockt(Lockt4res::Denied(denied))),
                status: NfsStat4::Nfs4errDenied,
            },
            Err(status) => NfsOpResponse {
                request,
                result: None,
                status,
            },
        }
    }
}
