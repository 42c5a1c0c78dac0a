use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4, Renew4args, StatusRes};

#[async_trait]
impl NfsOperation for Renew4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.25
        debug!("Operation 30: RENEW - Renew a Lease, clientid {}", self.clientid);
        let state = request.state_manager();
        match state.renew_lease(self.clientid).await {
            Ok(()) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpRenew(StatusRes::ok())),
                status: NfsStat4::Nfs4Ok,
            },
            Err(status) => {
                error!(?status, "renew refused");
                NfsOpResponse {
                    request,
                    result: Some(NfsResOp4::OpRenew(StatusRes { status })),
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
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn renew_known_and_stale_clients() {
        let env = TestEnv::new();
        let clientid = confirmed_client(&env, b"renew-client").await;

        let args = Renew4args { clientid };
        let response = args.execute(env.request()).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);

        let args = Renew4args { clientid: 424242 };
        let response = args.execute(env.request()).await;
        assert_eq!(response.status, NfsStat4::Nfs4errStaleClientid);
    }
}
