use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{
    operation::NfsOperation, request::NfsRequest, response::NfsOpResponse,
    state::client::ClientCallback,
};

use keel_proto::nfs4_proto::{
    NfsResOp4, NfsStat4, SetClientId4args, SetClientId4res, SetClientId4resok,
};

#[async_trait]
impl NfsOperation for SetClientId4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.33
        debug!(
            "Operation 35: SETCLIENTID - Negotiate Client ID, id {:?}",
            String::from_utf8_lossy(&self.client.id)
        );
        let state = request.state_manager();
        let callback = ClientCallback {
            program: self.callback.cb_program,
            rnetid: self.callback.cb_location.rnetid.clone(),
            raddr: self.callback.cb_location.raddr.clone(),
            callback_ident: self.callback_ident,
        };
        // the AUTH_SYS machine name stands in for the RPC principal
        let principal = request.auth.machinename.clone();
        let groups = request.auth.gids.clone();
        match state
            .upsert_client(
                self.client.verifier,
                self.client.id.clone(),
                callback,
                principal,
                groups,
            )
            .await
        {
            Ok(upserted) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpSetclientid(SetClientId4res::Resok4(
                    SetClientId4resok {
                        clientid: upserted.clientid,
                        setclientid_confirm: upserted.setclientid_confirm,
                    },
                ))),
                status: NfsStat4::Nfs4Ok,
            },
            Err(status) => {
                error!(?status, "setclientid refused");
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
    use keel_proto::nfs4_proto::{CbClient4, ClientAddr4, NfsClientId4};
    use tracing_test::traced_test;

    fn setclientid_args(id: &[u8], verifier: [u8; 8]) -> SetClientId4args {
        SetClientId4args {
            client: NfsClientId4 {
                verifier,
                id: id.to_vec(),
            },
            callback: CbClient4 {
                cb_program: 0x40000000,
                cb_location: ClientAddr4 {
                    rnetid: "tcp".to_string(),
                    raddr: "127.0.0.1.149.18".to_string(),
                },
            },
            callback_ident: 7,
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn setclientid_returns_stable_clientid_for_same_id() {
        let env = TestEnv::new();
        let response = setclientid_args(b"client-x", [1; 8])
            .execute(env.request())
            .await;
        let first = match response.result.unwrap() {
            NfsResOp4::OpSetclientid(SetClientId4res::Resok4(ok)) => ok,
            other => panic!("unexpected {:?}", other),
        };

        let response = setclientid_args(b"client-x", [1; 8])
            .execute(env.request())
            .await;
        let second = match response.result.unwrap() {
            NfsResOp4::OpSetclientid(SetClientId4res::Resok4(ok)) => ok,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(first.clientid, second.clientid);
        assert_ne!(first.setclientid_confirm, second.setclientid_confirm);
    }
}
