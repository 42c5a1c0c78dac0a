use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{
    filemanager::FsObject, operation::NfsOperation, request::NfsRequest, response::NfsOpResponse,
    state::ValidatedState,
};

use keel_proto::attr::FileAttrList;
use keel_proto::nfs4_proto::{
    NfsResOp4, NfsStat4, SetAttr4args, SetAttr4res, OPEN4_SHARE_ACCESS_WRITE,
};

#[async_trait]
impl NfsOperation for SetAttr4args {
    async fn execute(&self, mut request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.30
        debug!(
            "Operation 34: SETATTR - Set Attributes, {} bits",
            self.obj_attributes.attrmask.len()
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
            FsObject::Real(entry) => entry.clone(),
        };

        let fmanager = request.file_manager();
        let set = match fmanager.setattr_from_fattr(&self.obj_attributes) {
            Ok(set) => set,
            Err(status) => {
                return NfsOpResponse {
                    request,
                    result: None,
                    status,
                }
            }
        };

        // a size change is a write and follows the open-mode rules
        if set.size.is_some() {
            let state = request.state_manager();
            match state
                .validate_stateid(&self.stateid, Some(&entry.handle()))
                .await
            {
                Ok(ValidatedState::Special) | Ok(ValidatedState::Delegation { .. }) => {}
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
                Err(status) => {
                    return NfsOpResponse {
                        request,
                        result: None,
                        status,
                    }
                }
            }
        }

        match fmanager
            .metadata
            .set_file_attributes(&entry.share, entry.id, &set)
            .await
        {
            Ok(updated) => {
                let attrsset = self.obj_attributes.attrmask.clone();
                request.set_filehandle(FsObject::Real(updated));
                NfsOpResponse {
                    request,
                    result: Some(NfsResOp4::OpSetattr(SetAttr4res {
                        status: NfsStat4::Nfs4Ok,
                        attrsset,
                    })),
                    status: NfsStat4::Nfs4Ok,
                }
            }
            Err(e) => {
                error!("setattr failed: {:?}", e);
                NfsOpResponse {
                    request,
                    result: Some(NfsResOp4::OpSetattr(SetAttr4res {
                        status: e.nfs_status(),
                        attrsset: FileAttrList::default(),
                    })),
                    status: e.nfs_status(),
                }
            }
        }
    }
}
