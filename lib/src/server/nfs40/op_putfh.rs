use async_trait::async_trait;
use tracing::debug;

use crate::server::{operation::NfsOperation, request::NfsRequest, response::NfsOpResponse};

use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4, PutFh4args, StatusRes, NFS4_FHSIZE};

#[async_trait]
impl NfsOperation for PutFh4args {
    async fn execute(&self, mut request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.20
        debug!("Operation 22: PUTFH - Set Current Filehandle, {} bytes", self.object.len());

        if self.object.is_empty() || self.object.len() > NFS4_FHSIZE {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errBadhandle,
            };
        }
        match request.set_filehandle_bytes(&self.object).await {
            Ok(()) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpPutfh(StatusRes::ok())),
                status: NfsStat4::Nfs4Ok,
            },
            Err(status) => NfsOpResponse {
                request,
                result: None,
                status,
            },
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::server::nfs40::test_support::TestEnv;
    use crate::server::store::MetadataStore;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn putfh_roundtrips_pseudo_and_real_handles() {
        let env = TestEnv::new();

        let pseudo_fh = env.fmanager.pseudo.root().handle();
        let args = PutFh4args {
            object: pseudo_fh.clone(),
        };
        let response = args.execute(env.request()).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        assert_eq!(
            response.request.current_filehandle_bytes().unwrap(),
            pseudo_fh
        );

        let real = env.store.share_root("export").await.unwrap();
        let args = PutFh4args {
            object: real.handle(),
        };
        let response = args.execute(env.request()).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
    }

    #[tokio::test]
    #[traced_test]
    async fn bad_handles_are_rejected() {
        let env = TestEnv::new();

        let args = PutFh4args { object: vec![] };
        let response = args.execute(env.request()).await;
        assert_eq!(response.status, NfsStat4::Nfs4errBadhandle);

        let args = PutFh4args {
            object: vec![0xEE; 200],
        };
        let response = args.execute(env.request()).await;
        assert_eq!(response.status, NfsStat4::Nfs4errBadhandle);

        let args = PutFh4args {
            object: b"neither-kind-of-handle".to_vec(),
        };
        let response = args.execute(env.request()).await;
        assert_eq!(response.status, NfsStat4::Nfs4errBadhandle);
    }
}
