use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{
    filemanager::FsObject, operation::NfsOperation, request::NfsRequest, response::NfsOpResponse,
    state::ValidatedState,
};

use keel_proto::nfs4_proto::{
    NfsResOp4, NfsStat4, StableHow4, Write4args, Write4res, Write4resok, MODE4_SGID, MODE4_SUID,
    OPEN4_SHARE_ACCESS_WRITE,
};

#[async_trait]
impl NfsOperation for Write4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.36
        debug!(
            "Operation 38: WRITE - Write to File, offset {} len {}",
            self.offset,
            self.data.len()
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
                    status: NfsStat4::Nfs4errRofs,
                }
            }
            FsObject::Real(entry) if entry.is_dir() => {
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

        let state = request.state_manager();
        let fh = entry.handle();
        match state.validate_stateid(&self.stateid, Some(&fh)).await {
            Ok(ValidatedState::Special) => {}
            Ok(ValidatedState::Open { share_access, .. })
            | Ok(ValidatedState::Lock { share_access, .. }) => {
                if share_access & OPEN4_SHARE_ACCESS_WRITE == 0 {
                    return NfsOpResponse {
                        request,
                        result: None,
                        status: NfsStat4::Nfs4errOpenmode,
                    };
                }
            }
            Ok(ValidatedState::Delegation { deleg_type, .. }) => {
                if deleg_type != keel_proto::nfs4_proto::OpenDelegationType4::OpenDelegateWrite {
                    return NfsOpResponse {
                        request,
                        result: None,
                        status: NfsStat4::Nfs4errOpenmode,
                    };
                }
            }
            Err(status) => {
                return NfsOpResponse {
                    request,
                    result: None,
                    status,
                }
            }
        }

        if entry.mode & (MODE4_SUID | MODE4_SGID) != 0 {
            // mode bits stay as they are; the write is only noted
            debug!(id = entry.id, "write to a SUID/SGID file");
        }

        let fmanager = request.file_manager();
        let share = entry.share.clone();
        // PrepareWrite -> payload write -> CommitWrite
        if let Err(e) = fmanager
            .metadata
            .prepare_write(&share, entry.id, self.offset, self.data.len() as u64)
            .await
        {
            return NfsOpResponse {
                request,
                result: None,
                status: e.nfs_status(),
            };
        }
        let count = match fmanager
            .payload
            .write_at(&share, entry.id, self.offset, &self.data)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                error!("payload write failed: {:?}", e);
                return NfsOpResponse {
                    request,
                    result: None,
                    status: e.nfs_status(),
                };
            }
        };
        let updated = match fmanager.metadata.commit_write(&share, entry.id).await {
            Ok(updated) => updated,
            Err(e) => {
                return NfsOpResponse {
                    request,
                    result: None,
                    status: e.nfs_status(),
                }
            }
        };

        let mut request = request;
        request.set_filehandle(FsObject::Real(updated));
        NfsOpResponse {
            request,
            result: Some(NfsResOp4::OpWrite(Write4res::Resok4(Write4resok {
                count,
                // data lands in the payload cache; COMMIT makes it stable
                committed: StableHow4::Unstable4,
                writeverf: state.boot_verifier(),
            }))),
            status: NfsStat4::Nfs4Ok,
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::server::nfs40::test_support::test_request_with_file;
    use keel_proto::nfs4_proto::{Read4args, Read4res, Stateid4};
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn write_reports_unstable_and_boot_verifier() {
        let request = test_request_with_file("w.txt", b"").await;
        let boot_verifier = request.state_manager().boot_verifier();
        let args = Write4args {
            stateid: Stateid4::anonymous(),
            offset: 0,
            stable: StableHow4::FileSync4,
            data: b"hello".to_vec(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        match response.result.unwrap() {
            NfsResOp4::OpWrite(Write4res::Resok4(ok)) => {
                assert_eq!(ok.count, 5);
                assert_eq!(ok.committed, StableHow4::Unstable4);
                assert_eq!(ok.writeverf, boot_verifier);
            }
            other => panic!("unexpected {:?}", other),
        }

        // and the data can be read back
        let read = Read4args {
            stateid: Stateid4::anonymous(),
            offset: 0,
            count: 64,
        };
        let response = read.execute(response.request).await;
        match response.result.unwrap() {
            NfsResOp4::OpRead(Read4res::Resok4(ok)) => {
                assert_eq!(ok.data, b"hello");
                assert!(ok.eof);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
