use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{
    filemanager::FsObject, operation::NfsOperation, request::NfsRequest, response::NfsOpResponse,
};

use keel_proto::nfs4_proto::{Lookup4args, NfsResOp4, NfsStat4, StatusRes};

fn name_status(name: &str) -> Option<NfsStat4> {
    if name.is_empty() {
        return Some(NfsStat4::Nfs4errInval);
    }
    if name.contains('\0') {
        return Some(NfsStat4::Nfs4errBadchar);
    }
    if name == "." || name == ".." || name.contains('/') {
        return Some(NfsStat4::Nfs4errBadname);
    }
    None
}

#[async_trait]
impl NfsOperation for Lookup4args {
    async fn execute(&self, mut request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.15
        debug!("Operation 15: LOOKUP - Lookup Filename {:?}", self.objname);

        let Some(current) = request.current_filehandle().cloned() else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        };
        if let Some(status) = name_status(&self.objname) {
            return NfsOpResponse {
                request,
                result: None,
                status,
            };
        }

        let fmanager = request.file_manager();
        let resolved = match &current {
            FsObject::Pseudo(node) => match fmanager.pseudo.lookup(&node.path, &self.objname) {
                Some(child) => match &child.junction {
                    // a junction hands control to the real filesystem:
                    // the current handle becomes the share's root
                    Some(share) => fmanager.share_root(share).await.map(FsObject::Real),
                    None => Ok(FsObject::Pseudo(child)),
                },
                None => Err(NfsStat4::Nfs4errNoent),
            },
            FsObject::Real(entry) => {
                if entry.is_symlink() {
                    Err(NfsStat4::Nfs4errSymlink)
                } else if !entry.is_dir() {
                    Err(NfsStat4::Nfs4errNotdir)
                } else {
                    fmanager
                        .metadata
                        .lookup(&entry.share, entry.id, &self.objname)
                        .await
                        .map(FsObject::Real)
                        .map_err(|e| e.nfs_status())
                }
            }
        };

        match resolved {
            Ok(obj) => {
                request.set_filehandle(obj);
                NfsOpResponse {
                    request,
                    result: Some(NfsResOp4::OpLookup(StatusRes::ok())),
                    status: NfsStat4::Nfs4Ok,
                }
            }
            Err(status) => {
                error!(objname = %self.objname, ?status, "lookup failed");
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
    use crate::server::nfs40::test_support::{pseudo_root_request, TestEnv};
    use crate::server::store::MetadataStore;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn lookup_crosses_the_junction() {
        let request = pseudo_root_request().await;
        let args = Lookup4args {
            objname: "export".to_string(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        // past the junction the handle is a real one
        match response.request.current_filehandle().unwrap() {
            FsObject::Real(entry) => assert_eq!(entry.share, "export"),
            other => panic!("expected a real handle, got {:?}", other),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_names_and_bad_names() {
        let request = pseudo_root_request().await;
        let args = Lookup4args {
            objname: "no-such-share".to_string(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errNoent);

        let request = pseudo_root_request().await;
        let args = Lookup4args {
            objname: "bad\0name".to_string(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errBadchar);

        let request = pseudo_root_request().await;
        let args = Lookup4args {
            objname: "".to_string(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errInval);
    }

    #[tokio::test]
    #[traced_test]
    async fn lookup_inside_share() {
        let env = TestEnv::new();
        let root = env.store.share_root("export").await.unwrap();
        env.store
            .create_file("export", root.id, "hello.txt", 0o644, None)
            .await
            .unwrap();

        let request = env.share_root_request().await;
        let args = Lookup4args {
            objname: "hello.txt".to_string(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        match response.request.current_filehandle().unwrap() {
            FsObject::Real(entry) => assert!(entry.is_regular()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
