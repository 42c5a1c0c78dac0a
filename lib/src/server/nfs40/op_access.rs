use async_trait::async_trait;
use tracing::debug;

use crate::server::{
    filemanager::FsObject, operation::NfsOperation, request::NfsRequest, response::NfsOpResponse,
};

use keel_proto::nfs4_proto::{
    Access4args, Access4res, Access4resok, NfsFtype4, NfsResOp4, NfsStat4, ACCESS4_DELETE,
    ACCESS4_EXECUTE, ACCESS4_EXTEND, ACCESS4_LOOKUP, ACCESS4_MODIFY, ACCESS4_READ, MODE4_RGRP,
    MODE4_ROTH, MODE4_RUSR, MODE4_WGRP, MODE4_WOTH, MODE4_WUSR, MODE4_XGRP, MODE4_XOTH,
    MODE4_XUSR,
};

fn mode_class(mode: u32, uid: u32, gid: u32, entry_uid: u32, entry_gid: u32, gids: &[u32]) -> (bool, bool, bool) {
    if uid == entry_uid {
        (
            mode & MODE4_RUSR != 0,
            mode & MODE4_WUSR != 0,
            mode & MODE4_XUSR != 0,
        )
    } else if gid == entry_gid || gids.contains(&entry_gid) {
        (
            mode & MODE4_RGRP != 0,
            mode & MODE4_WGRP != 0,
            mode & MODE4_XGRP != 0,
        )
    } else {
        (
            mode & MODE4_ROTH != 0,
            mode & MODE4_WOTH != 0,
            mode & MODE4_XOTH != 0,
        )
    }
}

#[async_trait]
impl NfsOperation for Access4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.1.5
        debug!(
            "Operation 3: ACCESS - Check Access Rights {:?}",
            self
        );
        let Some(current) = request.current_filehandle() else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        };

        let (supported, granted) = match current {
            // pseudo-fs nodes are world-browsable
            FsObject::Pseudo(_) => {
                let supported = ACCESS4_READ | ACCESS4_LOOKUP | ACCESS4_EXECUTE;
                (supported, supported)
            }
            FsObject::Real(entry) => {
                let supported = if entry.ftype == NfsFtype4::Nf4dir {
                    ACCESS4_READ | ACCESS4_LOOKUP | ACCESS4_MODIFY | ACCESS4_EXTEND | ACCESS4_DELETE
                } else {
                    ACCESS4_READ | ACCESS4_MODIFY | ACCESS4_EXTEND | ACCESS4_EXECUTE
                };
                // root gets everything the object supports
                if request.auth.uid == 0 {
                    (supported, supported)
                } else {
                    let (read, write, execute) = mode_class(
                        entry.mode,
                        request.auth.uid,
                        request.auth.gid,
                        entry.uid,
                        entry.gid,
                        &request.auth.gids,
                    );
                    let mut granted = 0;
                    if read {
                        granted |= ACCESS4_READ;
                    }
                    if write {
                        granted |= ACCESS4_MODIFY | ACCESS4_EXTEND | ACCESS4_DELETE;
                    }
                    if execute {
                        granted |= ACCESS4_LOOKUP | ACCESS4_EXECUTE;
                    }
                    (supported, granted & supported)
                }
            }
        };

        NfsOpResponse {
            request,
            result: Some(NfsResOp4::OpAccess(Access4res::Resok4(Access4resok {
                supported: supported & self.access,
                access: granted & self.access,
            }))),
            status: NfsStat4::Nfs4Ok,
        }
    }
}
