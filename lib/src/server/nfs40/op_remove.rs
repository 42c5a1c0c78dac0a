use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{
    callback::DirNotification, filemanager::FsObject, operation::NfsOperation,
    request::NfsRequest, response::NfsOpResponse,
};

use keel_proto::nfs4_proto::{
    ChangeInfo4, NfsResOp4, NfsStat4, Notify4, Remove4args, Remove4res,
};

#[async_trait]
impl NfsOperation for Remove4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.26
        debug!("Operation 28: REMOVE - Remove Filesystem Object {:?}", self.target);
        let Some(current) = request.current_filehandle().cloned() else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        };
        let dir = match &current {
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
        if self.target.is_empty() {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errInval,
            };
        }

        let fmanager = request.file_manager();
        let state = request.state_manager();

        // removing a delegated file breaks the delegation first
        if let Ok(victim) = fmanager
            .metadata
            .lookup(&dir.share, dir.id, &self.target)
            .await
        {
            if state
                .check_delegation_conflict(None, &victim.handle(), true)
                .await
            {
                return NfsOpResponse {
                    request,
                    result: None,
                    status: NfsStat4::Nfs4errDelay,
                };
            }
        }

        let before = dir.change;
        if let Err(e) = fmanager
            .metadata
            .remove(&dir.share, dir.id, &self.target)
            .await
        {
            error!("remove failed: {:?}", e);
            return NfsOpResponse {
                request,
                result: None,
                status: e.nfs_status(),
            };
        }
        let after = fmanager
            .metadata
            .get_file(&dir.share, dir.id)
            .await
            .map(|d| d.change)
            .unwrap_or(before);

        request.callback_client().notify_dir_event(
            dir.handle(),
            DirNotification {
                kind: Notify4::RemoveEntry,
                entry: Some(self.target.clone()),
            },
        );

        NfsOpResponse {
            request,
            result: Some(NfsResOp4::OpRemove(Remove4res::Resok4(ChangeInfo4 {
                atomic: true,
                before,
                after,
            }))),
            status: NfsStat4::Nfs4Ok,
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::server::nfs40::test_support::TestEnv;
    use crate::server::store::{MetadataStore, StoreError};
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn remove_file_and_report_change() {
        let env = TestEnv::new();
        let root = env.store.share_root("export").await.unwrap();
        env.store
            .create_file("export", root.id, "victim.txt", 0o644, None)
            .await
            .unwrap();

        let request = env.share_root_request().await;
        let args = Remove4args {
            target: "victim.txt".to_string(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        assert_eq!(
            env.store.lookup("export", root.id, "victim.txt").await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn remove_missing_is_noent() {
        let env = TestEnv::new();
        let request = env.share_root_request().await;
        let args = Remove4args {
            target: "ghost".to_string(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errNoent);
    }

    #[tokio::test]
    #[traced_test]
    async fn remove_nonempty_directory_refused() {
        let env = TestEnv::new();
        let root = env.store.share_root("export").await.unwrap();
        let dir = env
            .store
            .create_directory("export", root.id, "d", 0o755)
            .await
            .unwrap();
        env.store
            .create_file("export", dir.id, "inner", 0o644, None)
            .await
            .unwrap();

        let request = env.share_root_request().await;
        let args = Remove4args {
            target: "d".to_string(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errNotempty);
    }
}
