use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{
    filemanager::FsObject, operation::NfsOperation, request::NfsRequest, response::NfsOpResponse,
    state::ValidatedState,
};

use keel_proto::nfs4_proto::{
    NfsResOp4, NfsStat4, Read4args, Read4res, Read4resok, OPEN4_SHARE_ACCESS_READ,
};

#[async_trait]
impl NfsOperation for Read4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.23
        debug!(
            "Operation 25: READ - Read from File, offset {} count {}",
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
                if share_access & OPEN4_SHARE_ACCESS_READ == 0 {
                    return NfsOpResponse {
                        request,
                        result: None,
                        status: NfsStat4::Nfs4errOpenmode,
                    };
                }
            }
            Ok(ValidatedState::Delegation { .. }) => {}
            Err(status) => {
                return NfsOpResponse {
                    request,
                    result: None,
                    status,
                }
            }
        }

        let fmanager = request.file_manager();
        let count = self.count.min(fmanager.attr_maxread() as u32);
        match fmanager
            .payload
            .read_at(&entry.share, entry.id, self.offset, count)
            .await
        {
            Ok((data, eof)) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpRead(Read4res::Resok4(Read4resok {
                    eof,
                    data,
                }))),
                status: NfsStat4::Nfs4Ok,
            },
            Err(e) => {
                error!("read failed: {:?}", e);
                NfsOpResponse {
                    request,
                    result: None,
                    status: e.nfs_status(),
                }
            }
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::server::nfs40::test_support::{pseudo_root_request, test_request_with_file};
    use keel_proto::nfs4_proto::Stateid4;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn anonymous_read_returns_data_and_eof() {
        let request = test_request_with_file("read.txt", b"hello").await;
        let args = Read4args {
            stateid: Stateid4::anonymous(),
            offset: 0,
            count: 100,
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        match response.result.unwrap() {
            NfsResOp4::OpRead(Read4res::Resok4(ok)) => {
                assert_eq!(ok.data, b"hello");
                assert!(ok.eof);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn partial_read_is_not_eof() {
        let request = test_request_with_file("part.txt", b"0123456789").await;
        let args = Read4args {
            stateid: Stateid4::read_bypass(),
            offset: 2,
            count: 4,
        };
        let response = args.execute(request).await;
        match response.result.unwrap() {
            NfsResOp4::OpRead(Read4res::Resok4(ok)) => {
                assert_eq!(ok.data, b"2345");
                assert!(!ok.eof);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn read_of_directory_is_isdir() {
        let request = pseudo_root_request().await;
        let args = Read4args {
            stateid: Stateid4::anonymous(),
            offset: 0,
            count: 10,
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errIsdir);
    }
}
