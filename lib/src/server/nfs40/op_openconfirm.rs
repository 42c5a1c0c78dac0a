use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4, OpenConfirm4args, OpenConfirm4res};

#[async_trait]
impl NfsOperation for OpenConfirm4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.18
        debug!(
            "Operation 20: OPEN_CONFIRM - Confirm Open {:?} seqid {}",
            self.open_stateid, self.seqid
        );
        if request.current_filehandle().is_none() {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        }
        let state = request.state_manager();
        match state.confirm_open(&self.open_stateid, self.seqid).await {
            Ok(stateid) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpOpenConfirm(OpenConfirm4res::Resok4(stateid))),
                status: NfsStat4::Nfs4Ok,
            },
            Err(status) => {
                error!(?status, "open confirm refused");
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
    use super::*;
    use crate::server::nfs40::test_support::{confirmed_client, TestEnv};
    use keel_proto::attr::Fattr4;
    use keel_proto::nfs4_proto::{
        CreateHow4, Open4args, Open4res, OpenClaim4, OpenFlag4, OpenOwner4,
        OPEN4_SHARE_ACCESS_BOTH, OPEN4_SHARE_DENY_NONE,
    };
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn confirm_bumps_stateid_and_checks_seqid() {
        let env = TestEnv::new();
        let clientid = confirmed_client(&env, b"confirm-client").await;

        let open = Open4args {
            seqid: 1,
            share_access: OPEN4_SHARE_ACCESS_BOTH,
            share_deny: OPEN4_SHARE_DENY_NONE,
            owner: OpenOwner4 {
                clientid,
                owner: b"owner-c".to_vec(),
            },
            openhow: OpenFlag4::How(CreateHow4::Unchecked4(Fattr4::default())),
            claim: OpenClaim4::ClaimNull("c.txt".to_string()),
        };
        let response = open.execute(env.share_root_request().await).await;
        let open_stateid = match response.result.unwrap() {
            NfsResOp4::OpOpen(Open4res::Resok4(ok)) => ok.stateid,
            other => panic!("unexpected {:?}", other),
        };

        // wrong seqid first
        let bad = OpenConfirm4args {
            open_stateid,
            seqid: 9,
        };
        let bad_response = bad.execute(response.request).await;
        assert_eq!(bad_response.status, NfsStat4::Nfs4errBadSeqid);

        let good = OpenConfirm4args {
            open_stateid,
            seqid: 2,
        };
        let good_response = good.execute(bad_response.request).await;
        assert_eq!(good_response.status, NfsStat4::Nfs4Ok);
        match good_response.result.unwrap() {
            NfsResOp4::OpOpenConfirm(OpenConfirm4res::Resok4(stateid)) => {
                assert_eq!(stateid.other, open_stateid.other);
                assert!(stateid.seqid > open_stateid.seqid);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
