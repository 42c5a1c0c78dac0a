use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs41_proto::{
    ExchangeId4args, ExchangeId4res, ExchangeId4resok, NfsImplId4, ServerOwner4,
};
use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4, Nfstime4};

#[async_trait]
impl NfsOperation for ExchangeId4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc8881#section-18.35
        debug!(
            "Operation 42: EXCHANGE_ID - Instantiate Client ID, owner {:?}",
            String::from_utf8_lossy(&self.eia_clientowner.co_ownerid)
        );
        let state = request.state_manager();
        match state.exchange_id(self).await {
            Ok((clientid, sequenceid, flags, _cb_path_up)) => {
                let server_owner = ServerOwner4 {
                    so_minor_id: 0,
                    so_major_id: state.boot_verifier().to_vec(),
                };
                NfsOpResponse {
                    request,
                    result: Some(NfsResOp4::OpExchangeId(ExchangeId4res::Resok4(
                        ExchangeId4resok {
                            eir_clientid: clientid,
                            eir_sequenceid: sequenceid,
                            eir_flags: flags,
                            eir_server_owner: server_owner,
                            eir_server_scope: b"keel".to_vec(),
                            eir_server_impl_id: Some(NfsImplId4 {
                                nii_domain: "keel.dev".to_string(),
                                nii_name: "keel nfs server".to_string(),
                                nii_date: Nfstime4::default(),
                            }),
                        },
                    ))),
                    status: NfsStat4::Nfs4Ok,
                }
            }
            Err(status) => {
                error!(?status, "exchange_id refused");
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
    use crate::server::nfs40::test_support::TestEnv;
    use keel_proto::nfs41_proto::{ClientOwner4, StateProtect4A, EXCHGID4_FLAG_USE_NON_PNFS};
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn exchange_id_reports_non_pnfs() {
        let env = TestEnv::new();
        let args = ExchangeId4args {
            eia_clientowner: ClientOwner4 {
                co_verifier: [4; 8],
                co_ownerid: b"linux-v41".to_vec(),
            },
            eia_flags: 0,
            eia_state_protect: StateProtect4A::None,
            eia_client_impl_id: None,
        };
        let response = args.execute(env.request()).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        match response.result.unwrap() {
            NfsResOp4::OpExchangeId(ExchangeId4res::Resok4(ok)) => {
                assert_eq!(ok.eir_sequenceid, 1);
                assert!(ok.eir_flags & EXCHGID4_FLAG_USE_NON_PNFS != 0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
