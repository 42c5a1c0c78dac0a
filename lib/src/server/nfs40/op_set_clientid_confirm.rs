use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4, SetClientIdConfirm4args, StatusRes};

#[async_trait]
impl NfsOperation for SetClientIdConfirm4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.34
        debug!(
            "Operation 36: SETCLIENTID_CONFIRM - Confirm Client ID {}",
            self.clientid
        );
        let state = request.state_manager();
        let principal = request.auth.machinename.clone();
        match state
            .confirm_client(self.clientid, self.setclientid_confirm, principal)
            .await
        {
            Ok(confirmed) => {
                // prove the callback path in the background; delegations
                // wait for the probe to land
                request
                    .callback_client()
                    .probe_null(confirmed.callback, confirmed.cb_path_up);
                NfsOpResponse {
                    request,
                    result: Some(NfsResOp4::OpSetclientidConfirm(StatusRes::ok())),
                    status: NfsStat4::Nfs4Ok,
                }
            }
            Err(status) => {
                error!(?status, "setclientid_confirm refused");
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
    use keel_proto::nfs4_proto::{
        CbClient4, ClientAddr4, NfsClientId4, SetClientId4args, SetClientId4res,
    };
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn confirm_clients() {
        let env = TestEnv::new();

        let setclientid = SetClientId4args {
            client: NfsClientId4 {
                verifier: [23, 213, 67, 174, 197, 95, 35, 119],
                id: b"Linux NFSv4.0 LAPTOP/127.0.0.1".to_vec(),
            },
            callback: CbClient4 {
                cb_program: 0x40000000,
                cb_location: ClientAddr4 {
                    rnetid: "tcp".to_string(),
                    raddr: "127.0.0.1.149.18".to_string(),
                },
            },
            callback_ident: 1,
        };
        let response = setclientid.execute(env.request()).await;
        let resok = match response.result.unwrap() {
            NfsResOp4::OpSetclientid(SetClientId4res::Resok4(ok)) => ok,
            other => panic!("unexpected {:?}", other),
        };

        let confirm = SetClientIdConfirm4args {
            clientid: resok.clientid,
            setclientid_confirm: resok.setclientid_confirm,
        };
        let response = confirm.execute(env.request()).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);

        // the server has no record of this pairing
        let stale = SetClientIdConfirm4args {
            clientid: 10,
            setclientid_confirm: [23, 213, 67, 174, 197, 95, 35, 119],
        };
        let response = stale.execute(env.request()).await;
        assert_eq!(response.status, NfsStat4::Nfs4errStaleClientid);
    }
}
