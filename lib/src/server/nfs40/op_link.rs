use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{
    filemanager::FsObject, operation::NfsOperation, request::NfsRequest, response::NfsOpResponse,
    store::StoreError,
};

use keel_proto::nfs4_proto::{ChangeInfo4, Link4args, Link4res, NfsResOp4, NfsStat4};

#[async_trait]
impl NfsOperation for Link4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.12
        debug!("Operation 11: LINK - Create Link to a File {:?}", self.newname);
        let (Some(saved), Some(current)) = (
            request.saved_filehandle().cloned(),
            request.current_filehandle().cloned(),
        ) else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        };
        // SAVED_FH: source object; CURRENT_FH: target directory
        let source = match &saved {
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
            FsObject::Real(entry) => entry.clone(),
        };
        let target_dir = match &current {
            FsObject::Pseudo(_) => {
                return NfsOpResponse {
                    request,
                    result: None,
                    status: NfsStat4::Nfs4errRofs,
                }
            }
            FsObject::Real(entry) if !entry.is_dir() => {
                return NfsOpResponse {
                    request,
                    result: None,
                    status: NfsStat4::Nfs4errNotdir,
                }
            }
            FsObject::Real(entry) => entry.clone(),
        };
        if source.share != target_dir.share {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errXdev,
            };
        }
        if self.newname.is_empty() {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errInval,
            };
        }

        let fmanager = request.file_manager();
        let before = target_dir.change;
        match fmanager
            .metadata
            .create_hard_link(&source.share, source.id, target_dir.id, &self.newname)
            .await
        {
            Ok(_) => {
                let after = fmanager
                    .metadata
                    .get_file(&target_dir.share, target_dir.id)
                    .await
                    .map(|d| d.change)
                    .unwrap_or(before);
                NfsOpResponse {
                    request,
                    result: Some(NfsResOp4::OpLink(Link4res::Resok4(ChangeInfo4 {
                        atomic: true,
                        before,
                        after,
                    }))),
                    status: NfsStat4::Nfs4Ok,
                }
            }
            Err(StoreError::Unsupported) => NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNotsupp,
            },
            Err(e) => {
                error!("link failed: {:?}", e);
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
    use crate::server::nfs40::test_support::TestEnv;
    use crate::server::store::{FileEntry, MetadataStore};
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn link_on_a_store_without_hard_links() {
        let env = TestEnv::new();
        let root = env.store.share_root("export").await.unwrap();
        let file = env
            .store
            .create_file("export", root.id, "src.txt", 0o644, None)
            .await
            .unwrap();

        let mut request = env.request();
        request.set_filehandle(FsObject::Real(file));
        request.save_filehandle().unwrap();
        request.set_filehandle(FsObject::Real(FileEntry::clone(
            &env.store.share_root("export").await.unwrap(),
        )));

        let args = Link4args {
            newname: "hard.txt".to_string(),
        };
        let response = args.execute(request).await;
        // the vfs store reports no hard-link support
        assert_eq!(response.status, NfsStat4::Nfs4errNotsupp);
    }

    #[tokio::test]
    #[traced_test]
    async fn link_source_must_not_be_directory() {
        let env = TestEnv::new();
        let mut request = env.share_root_request().await;
        request.save_filehandle().unwrap();
        let args = Link4args {
            newname: "x".to_string(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errIsdir);
    }
}
