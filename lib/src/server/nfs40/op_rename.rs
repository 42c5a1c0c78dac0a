use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{
    callback::DirNotification, filemanager::FsObject, operation::NfsOperation,
    request::NfsRequest, response::NfsOpResponse,
};

use keel_proto::nfs4_proto::{
    ChangeInfo4, NfsResOp4, NfsStat4, Notify4, Rename4args, Rename4res, Rename4resok,
};

#[async_trait]
impl NfsOperation for Rename4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.27
        debug!(
            "Operation 29: RENAME - Rename Directory Entry {:?} -> {:?}",
            self.oldname, self.newname
        );
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
        let source_dir = match &saved {
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
        // renames never cross shares
        if source_dir.share != target_dir.share {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errXdev,
            };
        }
        if self.oldname.is_empty() || self.newname.is_empty() {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errInval,
            };
        }

        let fmanager = request.file_manager();
        let source_before = source_dir.change;
        let target_before = target_dir.change;
        if let Err(e) = fmanager
            .metadata
            .rename(
                &source_dir.share,
                source_dir.id,
                &self.oldname,
                target_dir.id,
                &self.newname,
            )
            .await
        {
            error!("rename failed: {:?}", e);
            return NfsOpResponse {
                request,
                result: None,
                status: e.nfs_status(),
            };
        }
        let source_after = fmanager
            .metadata
            .get_file(&source_dir.share, source_dir.id)
            .await
            .map(|d| d.change)
            .unwrap_or(source_before);
        let target_after = fmanager
            .metadata
            .get_file(&target_dir.share, target_dir.id)
            .await
            .map(|d| d.change)
            .unwrap_or(target_before);

        let callbacks = request.callback_client();
        callbacks.notify_dir_event(
            source_dir.handle(),
            DirNotification {
                kind: Notify4::RenameEntry,
                entry: Some(self.oldname.clone()),
            },
        );
        if source_dir.id != target_dir.id {
            callbacks.notify_dir_event(
                target_dir.handle(),
                DirNotification {
                    kind: Notify4::AddEntry,
                    entry: Some(self.newname.clone()),
                },
            );
        }

        NfsOpResponse {
            request,
            result: Some(NfsResOp4::OpRename(Rename4res::Resok4(Rename4resok {
                source_cinfo: ChangeInfo4 {
                    atomic: true,
                    before: source_before,
                    after: source_after,
                },
                target_cinfo: ChangeInfo4 {
                    atomic: true,
                    before: target_before,
                    after: target_after,
                },
            }))),
            status: NfsStat4::Nfs4Ok,
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
    async fn rename_within_share() {
        let env = TestEnv::new();
        let root = env.store.share_root("export").await.unwrap();
        env.store
            .create_file("export", root.id, "old.txt", 0o644, None)
            .await
            .unwrap();

        let mut request = env.share_root_request().await;
        request.save_filehandle().unwrap();
        let args = Rename4args {
            oldname: "old.txt".to_string(),
            newname: "new.txt".to_string(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        match response.result.unwrap() {
            NfsResOp4::OpRename(Rename4res::Resok4(ok)) => {
                assert!(ok.source_cinfo.after > ok.source_cinfo.before);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(env
            .store
            .lookup("export", root.id, "new.txt")
            .await
            .is_ok());
    }

    #[tokio::test]
    #[traced_test]
    async fn rename_without_saved_fh() {
        let env = TestEnv::new();
        let request = env.share_root_request().await;
        let args = Rename4args {
            oldname: "a".to_string(),
            newname: "b".to_string(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errNofilehandle);
    }
}
