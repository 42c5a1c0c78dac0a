use async_trait::async_trait;
use tracing::debug;

use crate::server::state::{STATE_TYPE_DELEG, STATE_TYPE_LOCK};
use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs41_proto::FreeStateid4args;
use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4, StatusRes};

#[async_trait]
impl NfsOperation for FreeStateid4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc8881#section-18.38
        debug!("Operation 45: FREE_STATEID {:?}", self.fsa_stateid);
        let state = request.state_manager();
        let status = match self.fsa_stateid.other.first() {
            Some(&STATE_TYPE_LOCK) => {
                // only a lock state with no ranges left may be freed
                let mut inner = state.inner.write().await;
                match inner.locks.get(&self.fsa_stateid.other) {
                    Some(lock) if !lock.ranges.is_empty() => NfsStat4::Nfs4errLocksHeld,
                    Some(_) => {
                        let lock = inner.locks.remove(&self.fsa_stateid.other).unwrap();
                        if let Some(by_file) = inner.locks_by_file.get_mut(&lock.fh) {
                            by_file.retain(|other| other != &self.fsa_stateid.other);
                        }
                        if let Some(owner) = inner.lock_owners.get_mut(&lock.owner_key) {
                            owner.locks.retain(|other| other != &self.fsa_stateid.other);
                        }
                        if let Some(open) = inner.opens.get_mut(&lock.open_other) {
                            open.locks.retain(|other| other != &self.fsa_stateid.other);
                        }
                        NfsStat4::Nfs4Ok
                    }
                    None => NfsStat4::Nfs4errBadStateid,
                }
            }
            Some(&STATE_TYPE_DELEG) => {
                // freeing a revoked delegation clears its residue
                let mut inner = state.inner.write().await;
                match inner.delegations.get(&self.fsa_stateid.other) {
                    Some(deleg) if deleg.revoked => {
                        inner.delegations.remove(&self.fsa_stateid.other);
                        NfsStat4::Nfs4Ok
                    }
                    Some(_) => NfsStat4::Nfs4errLocksHeld,
                    None => NfsStat4::Nfs4errBadStateid,
                }
            }
            _ => NfsStat4::Nfs4errBadStateid,
        };
        if status == NfsStat4::Nfs4Ok {
            NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpFreeStateid(StatusRes::ok())),
                status,
            }
        } else {
            NfsOpResponse {
                request,
                result: None,
                status,
            }
        }
    }
}
