use async_trait::async_trait;
use tracing::debug;

use crate::server::{
    filemanager::FsObject, operation::NfsOperation, request::NfsRequest, response::NfsOpResponse,
};

use keel_proto::nfs4_proto::{Commit4args, Commit4res, NfsResOp4, NfsStat4};

#[async_trait]
impl NfsOperation for Commit4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.3
        debug!(
            "Operation 5: COMMIT - Commit Cached Data, offset {} count {}",
            self.offset, self.count
        );
        let Some(current) = request.current_filehandle().cloned() else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        };
        let entry = match &current {
            FsObject::Pseudo(_) => {
                return NfsOpResponse {
                    request,
                    result: None,
                    status: NfsStat4::Nfs4errIsdir,
                }
            }
            FsObject::Real(entry) if !entry.is_regular() => {
                return NfsOpResponse {
                    request,
                    result: None,
                    status: NfsStat4::Nfs4errInval,
                }
            }
            FsObject::Real(entry) => entry.clone(),
        };

        let fmanager = request.file_manager();
        // flush the payload cache, then the deferred metadata
        if let Err(e) = fmanager.payload.flush(&entry.share, entry.id).await {
            return NfsOpResponse {
                request,
                result: None,
                status: e.nfs_status(),
            };
        }
        if let Err(e) = fmanager
            .metadata
            .flush_pending_write_for_file(&entry.share, entry.id)
            .await
        {
            return NfsOpResponse {
                request,
                result: None,
                status: e.nfs_status(),
            };
        }

        let state = request.state_manager();
        NfsOpResponse {
            request,
            result: Some(NfsResOp4::OpCommit(Commit4res::Resok4(
                state.boot_verifier(),
            ))),
            status: NfsStat4::Nfs4Ok,
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::server::nfs40::test_support::test_request_with_file;
    use keel_proto::nfs4_proto::{StableHow4, Stateid4, Write4args, Write4res};
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn commit_echoes_the_write_verifier() {
        let request = test_request_with_file("c.txt", b"").await;
        let write = Write4args {
            stateid: Stateid4::anonymous(),
            offset: 0,
            stable: StableHow4::Unstable4,
            data: b"hello".to_vec(),
        };
        let response = write.execute(request).await;
        let writeverf = match response.result.unwrap() {
            NfsResOp4::OpWrite(Write4res::Resok4(ok)) => ok.writeverf,
            other => panic!("unexpected {:?}", other),
        };

        let commit = Commit4args {
            offset: 0,
            count: 0,
        };
        let commit_response = commit.execute(response.request).await;
        assert_eq!(commit_response.status, NfsStat4::Nfs4Ok);
        match commit_response.result.unwrap() {
            NfsResOp4::OpCommit(Commit4res::Resok4(verifier)) => {
                assert_eq!(verifier, writeverf);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
