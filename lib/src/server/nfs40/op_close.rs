use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs4_proto::{Close4args, Close4res, NfsResOp4, NfsStat4, Stateid4};

#[async_trait]
impl NfsOperation for Close4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.2
        debug!(
            "Operation 4: CLOSE - Close File {:?} seqid {}",
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
        let skip = request.skip_owner_seqid;
        match state.close_open(&self.open_stateid, self.seqid, skip).await {
            Ok(()) => NfsOpResponse {
                request,
                // the state is gone; a zeroed stateid goes back
                result: Some(NfsResOp4::OpClose(Close4res::OpenStateid(
                    Stateid4::anonymous(),
                ))),
                status: NfsStat4::Nfs4Ok,
            },
            Err(status) => {
                error!(?status, "close refused");
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
        CreateHow4, Open4args, Open4res, OpenClaim4, OpenConfirm4args, OpenFlag4, OpenOwner4,
        OPEN4_SHARE_ACCESS_BOTH, OPEN4_SHARE_DENY_NONE,
    };
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn close_returns_zeroed_stateid_and_invalidates() {
        let env = TestEnv::new();
        let clientid = confirmed_client(&env, b"close-client").await;

        let open = Open4args {
            seqid: 1,
            share_access: OPEN4_SHARE_ACCESS_BOTH,
            share_deny: OPEN4_SHARE_DENY_NONE,
            owner: OpenOwner4 {
                clientid,
                owner: b"owner-x".to_vec(),
            },
            openhow: OpenFlag4::How(CreateHow4::Unchecked4(Fattr4::default())),
            claim: OpenClaim4::ClaimNull("closer.txt".to_string()),
        };
        let response = open.execute(env.share_root_request().await).await;
        let open_stateid = match response.result.unwrap() {
            NfsResOp4::OpOpen(Open4res::Resok4(ok)) => ok.stateid,
            other => panic!("unexpected {:?}", other),
        };
        let confirm = OpenConfirm4args {
            open_stateid,
            seqid: 2,
        };
        let response = confirm.execute(response.request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);

        let close = Close4args {
            seqid: 3,
            open_stateid: Stateid4 {
                seqid: 0,
                other: open_stateid.other,
            },
        };
        let response = close.execute(response.request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        match response.result.unwrap() {
            NfsResOp4::OpClose(Close4res::OpenStateid(stateid)) => {
                assert!(stateid.is_anonymous());
            }
            other => panic!("unexpected {:?}", other),
        }

        // the stateid is dead now
        let err = env
            .state
            .validate_stateid(
                &Stateid4 {
                    seqid: 0,
                    other: open_stateid.other,
                },
                None,
            )
            .await;
        assert_eq!(err.unwrap_err(), NfsStat4::Nfs4errBadStateid);
    }
}
