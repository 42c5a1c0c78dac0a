use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{
    filemanager::FsObject, operation::NfsOperation, request::NfsRequest, response::NfsOpResponse,
    store::StoreError,
};

use keel_proto::nfs4_proto::{
    ChangeInfo4, Create4args, Create4res, Create4resok, Createtype4, NfsResOp4, NfsStat4,
    Specdata4,
};

#[async_trait]
impl NfsOperation for Create4args {
    async fn execute(&self, mut request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.4
        debug!(
            "Operation 6: CREATE - Create a Non-regular File Object {:?} {:?}",
            self.objtype.ftype(),
            self.objname
        );
        let Some(current) = request.current_filehandle().cloned() else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        };
        let dir = match &current {
            // nothing is created inside the virtual tree
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
        if self.objname.is_empty() {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errInval,
            };
        }

        let fmanager = request.file_manager();
        let set = match fmanager.setattr_from_fattr(&self.createattrs) {
            Ok(set) => set,
            Err(status) => {
                return NfsOpResponse {
                    request,
                    result: None,
                    status,
                }
            }
        };
        let mode = set.mode.unwrap_or(0o755);
        let before = dir.change;

        let created = match &self.objtype {
            Createtype4::Directory => {
                fmanager
                    .metadata
                    .create_directory(&dir.share, dir.id, &self.objname, mode)
                    .await
            }
            Createtype4::Link(target) => {
                fmanager
                    .metadata
                    .create_symlink(&dir.share, dir.id, &self.objname, target)
                    .await
            }
            Createtype4::BlockDevice(specdata) | Createtype4::CharDevice(specdata) => {
                fmanager
                    .metadata
                    .create_special_file(
                        &dir.share,
                        dir.id,
                        &self.objname,
                        self.objtype.ftype(),
                        *specdata,
                    )
                    .await
            }
            Createtype4::Socket | Createtype4::Fifo => {
                fmanager
                    .metadata
                    .create_special_file(
                        &dir.share,
                        dir.id,
                        &self.objname,
                        self.objtype.ftype(),
                        Specdata4 {
                            specdata1: 0,
                            specdata2: 0,
                        },
                    )
                    .await
            }
        };

        let entry = match created {
            Ok(entry) => entry,
            // a type the store cannot represent
            Err(StoreError::Unsupported) => {
                return NfsOpResponse {
                    request,
                    result: None,
                    status: NfsStat4::Nfs4errBadtype,
                }
            }
            Err(e) => {
                error!("create failed: {:?}", e);
                return NfsOpResponse {
                    request,
                    result: None,
                    status: e.nfs_status(),
                };
            }
        };

        let after = fmanager
            .metadata
            .get_file(&dir.share, dir.id)
            .await
            .map(|d| d.change)
            .unwrap_or(before);
        let attrset = self.createattrs.attrmask.clone();
        request.set_filehandle(FsObject::Real(entry));
        NfsOpResponse {
            request,
            result: Some(NfsResOp4::OpCreate(Create4res::Resok4(Create4resok {
                cinfo: ChangeInfo4 {
                    atomic: true,
                    before,
                    after,
                },
                attrset,
            }))),
            status: NfsStat4::Nfs4Ok,
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::server::nfs40::test_support::TestEnv;
    use keel_proto::attr::{Fattr4, FileAttrValue};
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn create_directory_with_mode() {
        let env = TestEnv::new();
        let request = env.share_root_request().await;
        let args = Create4args {
            objtype: Createtype4::Directory,
            objname: "newdir".to_string(),
            createattrs: Fattr4::from_values(vec![FileAttrValue::Mode(0o750)]),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        match response.result.unwrap() {
            NfsResOp4::OpCreate(Create4res::Resok4(ok)) => {
                assert!(ok.cinfo.atomic);
                assert!(ok.cinfo.after > ok.cinfo.before);
            }
            other => panic!("unexpected {:?}", other),
        }
        match response.request.current_filehandle().unwrap() {
            FsObject::Real(entry) => {
                assert!(entry.is_dir());
                assert_eq!(entry.mode, 0o750);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn create_in_pseudo_fs_is_rofs() {
        let env = TestEnv::new();
        let mut request = env.request();
        request.set_filehandle(FsObject::Pseudo(env.fmanager.pseudo.root()));
        let args = Create4args {
            objtype: Createtype4::Directory,
            objname: "nope".to_string(),
            createattrs: Fattr4::default(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errRofs);
    }

    #[tokio::test]
    #[traced_test]
    async fn unsupported_type_is_badtype() {
        let env = TestEnv::new();
        let request = env.share_root_request().await;
        let args = Create4args {
            objtype: Createtype4::Fifo,
            objname: "pipe".to_string(),
            createattrs: Fattr4::default(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errBadtype);
    }
}
