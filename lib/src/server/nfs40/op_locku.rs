use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{
    filemanager::FsObject, operation::NfsOperation, request::NfsRequest, response::NfsOpResponse,
};

use keel_proto::nfs4_proto::{Locku4args, Locku4res, NfsResOp4, NfsStat4};

#[async_trait]
impl NfsOperation for Locku4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.39
        debug!(
            "Operation 14: LOCKU - Unlock File {:?} offset {} length {}",
            self.lock_stateid, self.offset, self.length
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
        match state
            .unlock(
                &entry.handle(),
                &self.lock_stateid,
                self.seqid,
                self.offset,
                self.length,
                skip,
            )
            .await
        {
            Ok(stateid) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpLocku(Locku4res::LockStateid(stateid))),
                status: NfsStat4::Nfs4Ok,
            },
            Err(status) => {
                error!(?status, "unlock refused");
                NfsOpResponse {
                    request,
                    result: None,
                    status,
                }
            }
        }
    }
}

#[cfg(test)]
mod integration_tests {
    //! The LOCK / LOCKT / LOCKU cycle across two clients, driven through
    //! the op handlers.

    use crate::server::nfs40::test_support::{confirmed_client, TestEnv};
    use crate::server::operation::NfsOperation;
    use keel_proto::attr::Fattr4;
    use keel_proto::nfs4_proto::{
        CreateHow4, Lock4args, Lock4res, Lockt4args, Lockt4res, Locku4args, Locku4res,
        LockOwner4, Locker4, NfsLockType4, NfsResOp4, NfsStat4, Open4args, Open4res,
        OpenClaim4, OpenConfirm4args, OpenFlag4, OpenOwner4, OpenToLockOwner4, Stateid4,
        OPEN4_SHARE_ACCESS_BOTH, OPEN4_SHARE_DENY_NONE,
    };
    use tracing_test::traced_test;

    async fn open_and_confirm(
        env: &TestEnv,
        clientid: u64,
        owner: &[u8],
        name: &str,
    ) -> (crate::server::request::NfsRequest, Stateid4) {
        let open = Open4args {
            seqid: 1,
            share_access: OPEN4_SHARE_ACCESS_BOTH,
            share_deny: OPEN4_SHARE_DENY_NONE,
            owner: OpenOwner4 {
                clientid,
                owner: owner.to_vec(),
            },
            openhow: OpenFlag4::How(CreateHow4::Unchecked4(Fattr4::default())),
            claim: OpenClaim4::ClaimNull(name.to_string()),
        };
        let response = open.execute(env.share_root_request().await).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        let stateid = match response.result.unwrap() {
            NfsResOp4::OpOpen(Open4res::Resok4(ok)) => ok.stateid,
            other => panic!("unexpected {:?}", other),
        };
        let confirm = OpenConfirm4args {
            open_stateid: stateid,
            seqid: 2,
        };
        let response = confirm.execute(response.request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        let stateid = match response.result.unwrap() {
            NfsResOp4::OpOpenConfirm(keel_proto::nfs4_proto::OpenConfirm4res::Resok4(s)) => s,
            other => panic!("unexpected {:?}", other),
        };
        (response.request, stateid)
    }

    #[tokio::test]
    #[traced_test]
    async fn lock_lockt_locku_cycle() {
        let env = TestEnv::new();
        let client_a = confirmed_client(&env, b"lock-a").await;
        let client_b = confirmed_client(&env, b"lock-b").await;

        let (request_a, open_stateid) = open_and_confirm(&env, client_a, b"owner-a", "l.txt").await;

        // A locks [0, 10) for write
        let lock = Lock4args {
            locktype: NfsLockType4::WriteLt,
            reclaim: false,
            offset: 0,
            length: 10,
            locker: Locker4::OpenOwner(OpenToLockOwner4 {
                open_seqid: 3,
                open_stateid,
                lock_seqid: 0,
                lock_owner: LockOwner4 {
                    clientid: client_a,
                    owner: b"lock-owner-a".to_vec(),
                },
            }),
        };
        let response = lock.execute(request_a).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        let lock_stateid = match response.result.unwrap() {
            NfsResOp4::OpLock(Lock4res::Resok4(stateid)) => stateid,
            other => panic!("unexpected {:?}", other),
        };

        // B probes the overlap and learns about A's lock
        let (request_b, _) = open_and_confirm(&env, client_b, b"owner-b", "l.txt").await;
        let probe = Lockt4args {
            locktype: NfsLockType4::WriteLt,
            offset: 5,
            length: 20,
            owner: LockOwner4 {
                clientid: client_b,
                owner: b"lock-owner-b".to_vec(),
            },
        };
        let response = probe.execute(request_b).await;
        assert_eq!(response.status, NfsStat4::Nfs4errDenied);
        match response.result.unwrap() {
            NfsResOp4::OpLockt(Lockt4res::Denied(denied)) => {
                assert_eq!(denied.offset, 0);
                assert_eq!(denied.length, 10);
                assert_eq!(denied.owner.clientid, client_a);
            }
            other => panic!("unexpected {:?}", other),
        }

        // A unlocks; the current handle still names the locked file
        let unlock = Locku4args {
            locktype: NfsLockType4::WriteLt,
            seqid: 1,
            lock_stateid,
            offset: 0,
            length: 10,
        };
        let response = unlock.execute(response.request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        match response.result.unwrap() {
            NfsResOp4::OpLocku(Locku4res::LockStateid(stateid)) => {
                assert!(stateid.seqid > lock_stateid.seqid);
            }
            other => panic!("unexpected {:?}", other),
        }

        let probe = Lockt4args {
            locktype: NfsLockType4::WriteLt,
            offset: 5,
            length: 20,
            owner: LockOwner4 {
                clientid: client_b,
                owner: b"lock-owner-b".to_vec(),
            },
        };
        let response = probe.execute(response.request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
    }
}
