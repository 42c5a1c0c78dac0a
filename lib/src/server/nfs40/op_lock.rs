use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{
    filemanager::FsObject, operation::NfsOperation, request::NfsRequest, response::NfsOpResponse,
    state::lock::LockOutcome,
};

use keel_proto::nfs4_proto::{Lock4args, Lock4res, Locker4, NfsResOp4, NfsStat4};

#[async_trait]
impl NfsOperation for Lock4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.10
        debug!(
            "Operation 12: LOCK - Create Lock {:?} offset {} length {}",
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
        let skip = request.skip_owner_seqid;
        let fh = entry.handle();
        let outcome = match &self.locker {
            Locker4::OpenOwner(new_owner) => {
                let mut lock_owner = new_owner.lock_owner.clone();
                if let Some(ctx) = &request.v41 {
                    // the session identifies the client
                    lock_owner.clientid = ctx.session.clientid;
                }
                state
                    .lock_new_owner(
                        &fh,
                        self.locktype,
                        self.reclaim,
                        self.offset,
                        self.length,
                        &new_owner.open_stateid,
                        new_owner.open_seqid,
                        new_owner.lock_seqid,
                        &lock_owner,
                        skip,
                    )
                    .await
            }
            Locker4::LockOwner(existing) => {
                state
                    .lock_existing(
                        &fh,
                        self.locktype,
                        self.reclaim,
                        self.offset,
                        self.length,
                        &existing.lock_stateid,
                        existing.lock_seqid,
                        skip,
                    )
                    .await
            }
        };

        match outcome {
            Ok(LockOutcome::Granted(stateid)) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpLock(Lock4res::Resok4(stateid))),
                status: NfsStat4::Nfs4Ok,
            },
            Ok(LockOutcome::Denied(denied)) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpLock(Lock4res::Denied(denied))),
                status: NfsStat4::Nfs4errDenied,
            },
            Err(status) => {
                error!(?status, "lock refused");
                NfsOpResponse {
                    request,
                    result: None,
                    status,
                }
            }
        }
    }
}
