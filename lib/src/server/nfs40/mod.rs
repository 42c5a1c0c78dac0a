//! NFSv4.0 COMPOUND processing: sequential dispatch, stop on first
//! failure, one handler module per operation.

use num_traits::FromPrimitive;
use tracing::{debug, error};

use keel_proto::nfs4_proto::{
    Compound4res, CompoundHeader, GetFh4res, NfsOpnum4, NfsResOp4, NfsStat4, ReadLink4res,
    StatusRes,
};
use keel_proto::xdr::{XdrDecode, XdrEncode, XdrReader, XdrWriter};

mod op_access;
mod op_close;
mod op_commit;
mod op_create;
mod op_delegreturn;
mod op_getattr;
mod op_link;
mod op_lock;
mod op_lockt;
mod op_locku;
mod op_lookup;
mod op_open;
mod op_open_downgrade;
mod op_openconfirm;
mod op_putfh;
mod op_read;
mod op_readdir;
mod op_release_lockowner;
mod op_remove;
mod op_rename;
mod op_renew;
mod op_secinfo;
mod op_set_clientid;
mod op_set_clientid_confirm;
mod op_setattr;
mod op_verify;
mod op_write;

pub(crate) use op_secinfo::supported_flavors;

use super::filemanager::FsObject;
use super::operation::NfsOperation;
use super::request::NfsRequest;
use super::response::NfsOpResponse;
use super::state::session::MAX_OPERATIONS;

use keel_proto::nfs4_proto::{
    Access4args, Close4args, Commit4args, Create4args, DelegPurge4args, DelegReturn4args,
    Getattr4args, Link4args, Lock4args, Lockt4args, Locku4args, Lookup4args, Nverify4args,
    Open4args, OpenAttr4args, OpenConfirm4args, OpenDowngrade4args, PutFh4args, Read4args,
    Readdir4args, ReleaseLockowner4args, Remove4args, Rename4args, Renew4args, SecInfo4args,
    SetAttr4args, SetClientId4args, SetClientIdConfirm4args, Verify4args, Write4args,
};

#[derive(Clone, Debug, Default)]
pub struct NFS40Server;

impl NFS40Server {
    pub fn new() -> Self {
        NFS40Server {}
    }

    fn put_root_filehandle(&self, mut request: NfsRequest) -> NfsOpResponse {
        let root = request.file_manager().pseudo.root();
        request.set_filehandle(FsObject::Pseudo(root));
        NfsOpResponse {
            request,
            result: Some(NfsResOp4::OpPutrootfh(StatusRes::ok())),
            status: NfsStat4::Nfs4Ok,
        }
    }

    fn put_public_filehandle(&self, mut request: NfsRequest) -> NfsOpResponse {
        // the public filehandle is the pseudo-fs root
        let root = request.file_manager().pseudo.root();
        request.set_filehandle(FsObject::Pseudo(root));
        NfsOpResponse {
            request,
            result: Some(NfsResOp4::OpPutpubfh(StatusRes::ok())),
            status: NfsStat4::Nfs4Ok,
        }
    }

    fn get_current_filehandle(&self, request: NfsRequest) -> NfsOpResponse {
        match request.current_filehandle_bytes() {
            Some(fh) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpGetfh(GetFh4res::Resok4(fh))),
                status: NfsStat4::Nfs4Ok,
            },
            None => {
                error!("GETFH without a current filehandle");
                NfsOpResponse {
                    request,
                    result: None,
                    status: NfsStat4::Nfs4errNofilehandle,
                }
            }
        }
    }

    fn save_filehandle(&self, mut request: NfsRequest) -> NfsOpResponse {
        match request.save_filehandle() {
            Ok(()) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpSavefh(StatusRes::ok())),
                status: NfsStat4::Nfs4Ok,
            },
            Err(status) => NfsOpResponse {
                request,
                result: None,
                status,
            },
        }
    }

    fn restore_filehandle(&self, mut request: NfsRequest) -> NfsOpResponse {
        match request.restore_filehandle() {
            Ok(()) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpRestorefh(StatusRes::ok())),
                status: NfsStat4::Nfs4Ok,
            },
            Err(status) => NfsOpResponse {
                request,
                result: None,
                status,
            },
        }
    }

    /// LOOKUPP: the parent directory. At a share root this re-enters the
    /// pseudo tree at the junction; at the pseudo root it stays put.
    async fn lookup_parent(&self, mut request: NfsRequest) -> NfsOpResponse {
        let Some(current) = request.current_filehandle().cloned() else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        };
        let fmanager = request.file_manager();
        let parent = match &current {
            FsObject::Pseudo(node) => Ok(FsObject::Pseudo(fmanager.pseudo.parent(&node.path))),
            FsObject::Real(entry) => {
                if !entry.is_dir() {
                    return NfsOpResponse {
                        request,
                        result: None,
                        status: NfsStat4::Nfs4errNotdir,
                    };
                }
                let root = fmanager.metadata.share_root(&entry.share).await;
                match root {
                    Ok(root) if root.id == entry.id => {
                        // at the share root: step back across the junction
                        match fmanager.pseudo.junction_for(&entry.share) {
                            Some(node) => {
                                Ok(FsObject::Pseudo(fmanager.pseudo.parent(&node.path)))
                            }
                            None => Err(NfsStat4::Nfs4errStale),
                        }
                    }
                    Ok(_) => fmanager
                        .metadata
                        .get_parent(&entry.share, entry.id)
                        .await
                        .map(FsObject::Real)
                        .map_err(|e| e.nfs_status()),
                    Err(e) => Err(e.nfs_status()),
                }
            }
        };
        match parent {
            Ok(obj) => {
                request.set_filehandle(obj);
                NfsOpResponse {
                    request,
                    result: Some(NfsResOp4::OpLookupP(StatusRes::ok())),
                    status: NfsStat4::Nfs4Ok,
                }
            }
            Err(status) => NfsOpResponse {
                request,
                result: None,
                status,
            },
        }
    }

    async fn read_link(&self, request: NfsRequest) -> NfsOpResponse {
        let Some(current) = request.current_filehandle().cloned() else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        };
        let entry = match current {
            FsObject::Pseudo(_) => {
                return NfsOpResponse {
                    request,
                    result: None,
                    status: NfsStat4::Nfs4errInval,
                }
            }
            FsObject::Real(entry) => entry,
        };
        if !entry.is_symlink() {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errInval,
            };
        }
        let fmanager = request.file_manager();
        match fmanager.metadata.read_symlink(&entry.share, entry.id).await {
            Ok(target) => NfsOpResponse {
                request,
                result: Some(NfsResOp4::OpReadlink(ReadLink4res::Resok4(target))),
                status: NfsStat4::Nfs4Ok,
            },
            Err(e) => NfsOpResponse {
                request,
                result: None,
                status: e.nfs_status(),
            },
        }
    }

    fn operation_not_supported(
        &self,
        request: NfsRequest,
        opnum: NfsOpnum4,
    ) -> NfsOpResponse {
        NfsOpResponse {
            request,
            result: Some(NfsResOp4::error(opnum, NfsStat4::Nfs4errNotsupp)),
            status: NfsStat4::Nfs4errNotsupp,
        }
    }

    /// A decode failure still produces a result for the failing op; the
    /// compound stops there, since the stream position is unreliable.
    pub(crate) fn xdr_failure(
        &self,
        request: NfsRequest,
        opnum: NfsOpnum4,
        e: keel_proto::xdr::XdrError,
    ) -> NfsOpResponse {
        debug!(?opnum, "argument decode failed: {:?}", e);
        let status = match e {
            keel_proto::xdr::XdrError::UnsupportedAttribute(_) => NfsStat4::Nfs4errAttrnotsupp,
            _ => NfsStat4::Nfs4errBadxdr,
        };
        NfsOpResponse {
            request,
            result: Some(NfsResOp4::error(opnum, status)),
            status,
        }
    }

    /// Decodes the op's arguments and runs its handler. Arguments are
    /// consumed before anything else, even on failure paths, so the
    /// reader stays aligned for the next op.
    pub(crate) async fn dispatch_op(
        &self,
        opnum: NfsOpnum4,
        reader: &mut XdrReader<'_>,
        request: NfsRequest,
    ) -> NfsOpResponse {
        macro_rules! run {
            ($args:ty) => {
                match <$args>::decode(reader) {
                    Ok(args) => args.execute(request).await,
                    Err(e) => self.xdr_failure(request, opnum, e),
                }
            };
        }
        macro_rules! consume_notsupp {
            ($args:ty) => {
                match <$args>::decode(reader) {
                    Ok(_) => self.operation_not_supported(request, opnum),
                    Err(e) => self.xdr_failure(request, opnum, e),
                }
            };
        }

        match opnum {
            NfsOpnum4::OpAccess => run!(Access4args),
            NfsOpnum4::OpClose => run!(Close4args),
            NfsOpnum4::OpCommit => run!(Commit4args),
            NfsOpnum4::OpCreate => run!(Create4args),
            // CLAIM_DELEGATE_PREV recovery is not implemented
            NfsOpnum4::OpDelegPurge => consume_notsupp!(DelegPurge4args),
            NfsOpnum4::OpDelegReturn => run!(DelegReturn4args),
            NfsOpnum4::OpGetattr => run!(Getattr4args),
            NfsOpnum4::OpGetfh => self.get_current_filehandle(request),
            NfsOpnum4::OpLink => run!(Link4args),
            NfsOpnum4::OpLock => run!(Lock4args),
            NfsOpnum4::OpLockt => run!(Lockt4args),
            NfsOpnum4::OpLocku => run!(Locku4args),
            NfsOpnum4::OpLookup => run!(Lookup4args),
            NfsOpnum4::OpLookupP => self.lookup_parent(request).await,
            NfsOpnum4::OpNverify => run!(Nverify4args),
            NfsOpnum4::OpOpen => run!(Open4args),
            NfsOpnum4::OpOpenattr => consume_notsupp!(OpenAttr4args),
            NfsOpnum4::OpOpenConfirm => run!(OpenConfirm4args),
            NfsOpnum4::OpOpenDowngrade => run!(OpenDowngrade4args),
            NfsOpnum4::OpPutfh => run!(PutFh4args),
            NfsOpnum4::OpPutpubfh => self.put_public_filehandle(request),
            NfsOpnum4::OpPutrootfh => self.put_root_filehandle(request),
            NfsOpnum4::OpRead => run!(Read4args),
            NfsOpnum4::OpReaddir => run!(Readdir4args),
            NfsOpnum4::OpReadlink => self.read_link(request).await,
            NfsOpnum4::OpRemove => run!(Remove4args),
            NfsOpnum4::OpRename => run!(Rename4args),
            NfsOpnum4::OpRenew => run!(Renew4args),
            NfsOpnum4::OpRestorefh => self.restore_filehandle(request),
            NfsOpnum4::OpSavefh => self.save_filehandle(request),
            NfsOpnum4::OpSecinfo => run!(SecInfo4args),
            NfsOpnum4::OpSetattr => run!(SetAttr4args),
            NfsOpnum4::OpSetclientid => run!(SetClientId4args),
            NfsOpnum4::OpSetclientidConfirm => run!(SetClientIdConfirm4args),
            NfsOpnum4::OpVerify => run!(Verify4args),
            NfsOpnum4::OpWrite => run!(Write4args),
            NfsOpnum4::OpReleaseLockowner => run!(ReleaseLockowner4args),
            // the v4.1 operation range and ILLEGAL are the caller's
            // business; they never reach here
            other => {
                error!(?other, "opcode routed to the wrong dispatcher");
                NfsOpResponse {
                    request,
                    result: Some(NfsResOp4::error(other, NfsStat4::Nfs4errOpIllegal)),
                    status: NfsStat4::Nfs4errOpIllegal,
                }
            }
        }
    }

    /// Sequential COMPOUND evaluation: first non-OK status stops the
    /// loop and becomes the overall status.
    pub async fn compound(
        &self,
        header: CompoundHeader,
        payload: &[u8],
        mut request: NfsRequest,
    ) -> (NfsRequest, Vec<u8>) {
        let mut reader = XdrReader::new(payload);
        let mut resarray: Vec<NfsResOp4> = Vec::with_capacity(header.numops as usize);
        let mut status = NfsStat4::Nfs4Ok;

        if header.numops > MAX_OPERATIONS {
            status = NfsStat4::Nfs4errResource;
        } else {
            for _ in 0..header.numops {
                let Ok(opcode) = reader.read_u32() else {
                    status = NfsStat4::Nfs4errBadxdr;
                    break;
                };
                let opnum: Option<NfsOpnum4> = FromPrimitive::from_u32(opcode);
                match opnum {
                    Some(NfsOpnum4::OpIllegal) | None => {
                        // a v4.0 compound does not know how to consume the
                        // arguments of an opcode outside its table
                        resarray.push(NfsResOp4::OpIllegal(StatusRes {
                            status: NfsStat4::Nfs4errOpIllegal,
                        }));
                        status = NfsStat4::Nfs4errOpIllegal;
                        break;
                    }
                    Some(op) if (op as u32) >= 40 => {
                        resarray.push(NfsResOp4::OpIllegal(StatusRes {
                            status: NfsStat4::Nfs4errOpIllegal,
                        }));
                        status = NfsStat4::Nfs4errOpIllegal;
                        break;
                    }
                    Some(op) => {
                        let response = self.dispatch_op(op, &mut reader, request).await;
                        status = response.status;
                        request = response.request;
                        match response.result {
                            Some(result) => resarray.push(result),
                            None => resarray.push(NfsResOp4::error(op, status)),
                        }
                        if status != NfsStat4::Nfs4Ok {
                            debug!(?op, ?status, "compound stopped");
                            break;
                        }
                    }
                }
            }
        }

        let res = Compound4res {
            status,
            tag: header.tag,
            resarray,
        };
        let mut writer = XdrWriter::new();
        res.encode(&mut writer);
        (request, writer.into_bytes())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use vfs::{MemoryFS, VfsPath};

    use crate::server::callback::CallbackClient;
    use crate::server::filemanager::{FileManager, FsObject};
    use crate::server::metrics::ServerMetrics;
    use crate::server::pseudofs::{PseudoFs, ShareMount};
    use crate::server::request::{AuthContext, NfsRequest};
    use crate::server::state::{StateConfig, StateManager};
    use crate::server::store::{MetadataStore, NumericIdentityMapper, PayloadStore, VfsStore};

    /// One in-memory server context shared by the requests of a test.
    pub struct TestEnv {
        pub state: Arc<StateManager>,
        pub fmanager: Arc<FileManager>,
        pub callbacks: Arc<CallbackClient>,
        pub store: Arc<VfsStore>,
    }

    impl TestEnv {
        pub fn new() -> TestEnv {
            let root: VfsPath = MemoryFS::new().into();
            let store = Arc::new(VfsStore::new(vec![("export".to_string(), root)]));
            let pseudo = Arc::new(PseudoFs::new(&[ShareMount::new("export", "/export")]));
            let fmanager = FileManager::new(
                store.clone(),
                store.clone(),
                Arc::new(NumericIdentityMapper::new("example.net")),
                pseudo,
                60,
            );
            let callbacks = CallbackClient::new();
            let state = StateManager::start(
                StateConfig::default(),
                callbacks.clone(),
                Arc::new(ServerMetrics::new()),
            );
            TestEnv {
                state,
                fmanager,
                callbacks,
                store,
            }
        }

        pub fn request(&self) -> NfsRequest {
            NfsRequest::new(
                "127.0.0.1:12345".to_string(),
                1,
                self.state.clone(),
                self.fmanager.clone(),
                self.callbacks.clone(),
                AuthContext {
                    uid: 1000,
                    gid: 1000,
                    gids: vec![],
                    machinename: Some("testclient".to_string()),
                },
                Arc::new(AtomicBool::new(false)),
            )
        }

        pub async fn share_root_request(&self) -> NfsRequest {
            let entry = self.store.share_root("export").await.unwrap();
            let mut request = self.request();
            request.set_filehandle(FsObject::Real(entry));
            request
        }
    }

    pub async fn pseudo_root_request() -> NfsRequest {
        let env = TestEnv::new();
        let mut request = env.request();
        request.set_filehandle(FsObject::Pseudo(env.fmanager.pseudo.root()));
        request
    }

    /// Runs the SETCLIENTID / SETCLIENTID_CONFIRM handshake and returns
    /// the confirmed clientid.
    pub async fn confirmed_client(env: &TestEnv, id: &[u8]) -> u64 {
        use crate::server::operation::NfsOperation;
        use keel_proto::nfs4_proto::{
            CbClient4, ClientAddr4, NfsClientId4, NfsResOp4, NfsStat4, SetClientId4args,
            SetClientId4res, SetClientIdConfirm4args,
        };

        let setclientid = SetClientId4args {
            client: NfsClientId4 {
                verifier: [9; 8],
                id: id.to_vec(),
            },
            callback: CbClient4 {
                cb_program: 0x40000000,
                cb_location: ClientAddr4 {
                    rnetid: "tcp".to_string(),
                    raddr: "127.0.0.1.149.18".to_string(),
                },
            },
            callback_ident: 1,
        };
        let response = setclientid.execute(env.request()).await;
        let (clientid, confirm) = match response.result.unwrap() {
            NfsResOp4::OpSetclientid(SetClientId4res::Resok4(ok)) => {
                (ok.clientid, ok.setclientid_confirm)
            }
            other => panic!("unexpected {:?}", other),
        };
        let confirm_args = SetClientIdConfirm4args {
            clientid,
            setclientid_confirm: confirm,
        };
        let response = confirm_args.execute(env.request()).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        clientid
    }

    /// A request whose current filehandle is a fresh regular file with
    /// the given content.
    pub async fn test_request_with_file(name: &str, content: &[u8]) -> NfsRequest {
        let env = TestEnv::new();
        let root = env.store.share_root("export").await.unwrap();
        let entry = env
            .store
            .create_file("export", root.id, name, 0o644, None)
            .await
            .unwrap();
        if !content.is_empty() {
            env.store
                .write_at("export", entry.id, 0, content)
                .await
                .unwrap();
        }
        let entry = env.store.get_file("export", entry.id).await.unwrap();
        let mut request = env.request();
        request.set_filehandle(FsObject::Real(entry));
        request
    }
}
