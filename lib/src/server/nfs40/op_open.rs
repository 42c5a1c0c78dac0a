use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{
    filemanager::FsObject,
    operation::NfsOperation,
    request::NfsRequest,
    response::NfsOpResponse,
    state::open::OpenParams,
    store::{FileEntry, StoreError},
};

use keel_proto::attr::FileAttrList;
use keel_proto::nfs4_proto::{
    ChangeInfo4, CreateHow4, NfsResOp4, NfsStat4, Nfsace4, NfsSpaceLimit4, Open4args, Open4res,
    Open4resok, OpenClaim4, OpenDelegation4, OpenDelegationType4, OpenFlag4, OpenReadDelegation4,
    OpenWriteDelegation4, ACE4_GENERIC_READ, ACE4_GENERIC_WRITE, OPEN4_RESULT_CONFIRM,
    OPEN4_RESULT_LOCKTYPE_POSIX, OPEN4_SHARE_ACCESS_WRITE,
};

/// Resolution of the claim: the file to open, the attrs applied at
/// create, and whether this is a reclaim.
struct ResolvedClaim {
    entry: FileEntry,
    attrset: FileAttrList,
    cinfo: ChangeInfo4,
    reclaim: bool,
}

async fn resolve_claim_null(
    args: &Open4args,
    dir: &FileEntry,
    name: &str,
    request: &NfsRequest,
) -> Result<ResolvedClaim, NfsStat4> {
    if name.is_empty() {
        return Err(NfsStat4::Nfs4errInval);
    }
    if name.contains('\0') {
        return Err(NfsStat4::Nfs4errBadchar);
    }
    let fmanager = request.file_manager();
    let metadata = fmanager.metadata.clone();

    let before = dir.change;
    let existing = match metadata.lookup(&dir.share, dir.id, name).await {
        Ok(entry) => Some(entry),
        Err(StoreError::NotFound) => None,
        Err(e) => return Err(e.nfs_status()),
    };

    let (entry, attrset) = match (&args.openhow, existing) {
        (OpenFlag4::Open4Nocreate, None) => return Err(NfsStat4::Nfs4errNoent),
        (OpenFlag4::Open4Nocreate, Some(entry)) => (entry, FileAttrList::default()),
        (OpenFlag4::How(how), existing) => match how {
            CreateHow4::Unchecked4(fattr) => match existing {
                // UNCHECKED tolerates a pre-existing file
                Some(entry) => (entry, FileAttrList::default()),
                None => {
                    let set = fmanager.setattr_from_fattr(fattr)?;
                    let mode = set.mode.unwrap_or(0o644);
                    let entry = metadata
                        .create_file(&dir.share, dir.id, name, mode, None)
                        .await
                        .map_err(|e| e.nfs_status())?;
                    (entry, fattr.attrmask.clone())
                }
            },
            CreateHow4::Guarded4(fattr) => match existing {
                Some(_) => return Err(NfsStat4::Nfs4errExist),
                None => {
                    let set = fmanager.setattr_from_fattr(fattr)?;
                    let mode = set.mode.unwrap_or(0o644);
                    let entry = metadata
                        .create_file(&dir.share, dir.id, name, mode, None)
                        .await
                        .map_err(|e| e.nfs_status())?;
                    (entry, fattr.attrmask.clone())
                }
            },
            CreateHow4::Exclusive4(verifier) => match existing {
                Some(entry) => {
                    // a replayed exclusive create carries the same verifier
                    if entry.verifier == Some(*verifier) {
                        (entry, FileAttrList::default())
                    } else {
                        return Err(NfsStat4::Nfs4errExist);
                    }
                }
                None => {
                    let entry = metadata
                        .create_file(&dir.share, dir.id, name, 0o644, Some(*verifier))
                        .await
                        .map_err(|e| e.nfs_status())?;
                    (entry, FileAttrList::default())
                }
            },
        },
    };

    match entry.ftype {
        keel_proto::nfs4_proto::NfsFtype4::Nf4reg => {}
        keel_proto::nfs4_proto::NfsFtype4::Nf4dir => return Err(NfsStat4::Nfs4errIsdir),
        keel_proto::nfs4_proto::NfsFtype4::Nf4lnk => return Err(NfsStat4::Nfs4errSymlink),
        _ => return Err(NfsStat4::Nfs4errInval),
    }

    let after = metadata
        .get_file(&dir.share, dir.id)
        .await
        .map(|d| d.change)
        .unwrap_or(before);
    Ok(ResolvedClaim {
        entry,
        attrset,
        cinfo: ChangeInfo4 {
            atomic: true,
            before,
            after,
        },
        reclaim: false,
    })
}

fn delegation_body(
    stateid: keel_proto::nfs4_proto::Stateid4,
    deleg_type: OpenDelegationType4,
) -> OpenDelegation4 {
    let permissions = Nfsace4 {
        acetype: 0,
        flag: 0,
        access_mask: match deleg_type {
            OpenDelegationType4::OpenDelegateWrite => ACE4_GENERIC_READ | ACE4_GENERIC_WRITE,
            _ => ACE4_GENERIC_READ,
        },
        who: "EVERYONE@".to_string(),
    };
    match deleg_type {
        OpenDelegationType4::OpenDelegateWrite => OpenDelegation4::Write(OpenWriteDelegation4 {
            stateid,
            recall: false,
            space_limit: NfsSpaceLimit4::Filesize(1 << 40),
            permissions,
        }),
        _ => OpenDelegation4::Read(OpenReadDelegation4 {
            stateid,
            recall: false,
            permissions,
        }),
    }
}

#[async_trait]
impl NfsOperation for Open4args {
    async fn execute(&self, mut request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.16
        debug!(
            "Operation 18: OPEN - Open a Regular File {:?}, claim {:?}",
            self.owner, self.claim
        );
        let Some(current) = request.current_filehandle().cloned() else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        };

        let state = request.state_manager();
        // under a session the clientid comes from the session, and the
        // owner seqid is obsolete
        let (clientid, seqid) = match &request.v41 {
            Some(ctx) => (ctx.session.clientid, 0),
            None => (self.owner.clientid, self.seqid),
        };
        let skip_owner_seqid = request.skip_owner_seqid;

        let resolved = match &self.claim {
            OpenClaim4::ClaimNull(name) => {
                let dir = match &current {
                    FsObject::Pseudo(_) => {
                        // the virtual tree is immutable and holds no
                        // regular files
                        let status = match &self.openhow {
                            OpenFlag4::How(_) => NfsStat4::Nfs4errRofs,
                            OpenFlag4::Open4Nocreate => NfsStat4::Nfs4errIsdir,
                        };
                        return NfsOpResponse {
                            request,
                            result: None,
                            status,
                        };
                    }
                    FsObject::Real(entry) if !entry.is_dir() => {
                        return NfsOpResponse {
                            request,
                            result: None,
                            status: NfsStat4::Nfs4errNotdir,
                        };
                    }
                    FsObject::Real(entry) => entry.clone(),
                };
                match resolve_claim_null(self, &dir, name, &request).await {
                    Ok(resolved) => resolved,
                    Err(status) => {
                        return NfsOpResponse {
                            request,
                            result: None,
                            status,
                        }
                    }
                }
            }
            OpenClaim4::ClaimPrevious(_deleg_type) => {
                // reclaim: the current filehandle names the file itself
                let entry = match &current {
                    FsObject::Real(entry) if entry.is_regular() => entry.clone(),
                    FsObject::Real(_) => {
                        return NfsOpResponse {
                            request,
                            result: None,
                            status: NfsStat4::Nfs4errInval,
                        }
                    }
                    FsObject::Pseudo(_) => {
                        return NfsOpResponse {
                            request,
                            result: None,
                            status: NfsStat4::Nfs4errInval,
                        }
                    }
                };
                ResolvedClaim {
                    entry,
                    attrset: FileAttrList::default(),
                    cinfo: ChangeInfo4::default(),
                    reclaim: true,
                }
            }
            OpenClaim4::ClaimDelegateCur(claim) => {
                let dir = match &current {
                    FsObject::Real(entry) if entry.is_dir() => entry.clone(),
                    _ => {
                        return NfsOpResponse {
                            request,
                            result: None,
                            status: NfsStat4::Nfs4errNotdir,
                        }
                    }
                };
                let entry = match request
                    .file_manager()
                    .metadata
                    .lookup(&dir.share, dir.id, &claim.file)
                    .await
                {
                    Ok(entry) => entry,
                    Err(e) => {
                        return NfsOpResponse {
                            request,
                            result: None,
                            status: e.nfs_status(),
                        }
                    }
                };
                // the claimed delegation must be valid for this file
                if let Err(status) = state
                    .validate_stateid(&claim.delegate_stateid, Some(&entry.handle()))
                    .await
                {
                    return NfsOpResponse {
                        request,
                        result: None,
                        status,
                    };
                }
                ResolvedClaim {
                    entry,
                    attrset: FileAttrList::default(),
                    cinfo: ChangeInfo4::default(),
                    reclaim: false,
                }
            }
            OpenClaim4::ClaimDelegatePrev(_) => {
                return NfsOpResponse {
                    request,
                    result: None,
                    status: NfsStat4::Nfs4errNotsupp,
                }
            }
        };

        let fh = resolved.entry.handle();
        let would_write = self.share_access & OPEN4_SHARE_ACCESS_WRITE != 0 || self.share_deny != 0;

        // a delegation held by another client must come back first
        if !matches!(self.claim, OpenClaim4::ClaimDelegateCur(_))
            && state
                .check_delegation_conflict(Some(clientid), &fh, would_write)
                .await
        {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errDelay,
            };
        }

        let grant = match state
            .register_open(OpenParams {
                clientid,
                owner: self.owner.owner.clone(),
                seqid,
                skip_owner_seqid,
                fh: fh.clone(),
                share_access: self.share_access,
                share_deny: self.share_deny,
                reclaim: resolved.reclaim,
            })
            .await
        {
            Ok(grant) => grant,
            Err(status) => {
                error!(?status, "open refused");
                return NfsOpResponse {
                    request,
                    result: None,
                    status,
                };
            }
        };

        // delegations are only handed out on ordinary opens
        let delegation = if resolved.reclaim || matches!(self.claim, OpenClaim4::ClaimDelegateCur(_))
        {
            OpenDelegation4::None
        } else {
            let cb_path_up = state.cb_path_up(clientid).await;
            match state
                .maybe_grant_delegation(clientid, &fh, self.share_access, cb_path_up)
                .await
            {
                Some((stateid, deleg_type)) => delegation_body(stateid, deleg_type),
                None => OpenDelegation4::None,
            }
        };

        let mut rflags = OPEN4_RESULT_LOCKTYPE_POSIX;
        if grant.confirm_required {
            // the client MUST send OPEN_CONFIRM before using the state
            rflags |= OPEN4_RESULT_CONFIRM;
        }

        request.set_filehandle(FsObject::Real(resolved.entry));
        NfsOpResponse {
            request,
            result: Some(NfsResOp4::OpOpen(Open4res::Resok4(Open4resok {
                stateid: grant.stateid,
                cinfo: resolved.cinfo,
                rflags,
                attrset: resolved.attrset,
                delegation,
            }))),
            status: NfsStat4::Nfs4Ok,
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::server::nfs40::test_support::{confirmed_client, TestEnv};
    use keel_proto::attr::Fattr4;
    use keel_proto::nfs4_proto::{
        OpenOwner4, OPEN4_SHARE_ACCESS_BOTH, OPEN4_SHARE_DENY_NONE,
    };
    use tracing_test::traced_test;

    fn open_create_args(clientid: u64, owner: &[u8], seqid: u32, name: &str) -> Open4args {
        Open4args {
            seqid,
            share_access: OPEN4_SHARE_ACCESS_BOTH,
            share_deny: OPEN4_SHARE_DENY_NONE,
            owner: OpenOwner4 {
                clientid,
                owner: owner.to_vec(),
            },
            openhow: OpenFlag4::How(CreateHow4::Unchecked4(Fattr4::default())),
            claim: OpenClaim4::ClaimNull(name.to_string()),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn open_create_returns_stateid_and_confirm_flag() {
        let env = TestEnv::new();
        let clientid = confirmed_client(&env, b"open-client").await;

        let request = env.share_root_request().await;
        let args = open_create_args(clientid, b"owner-1", 1, "file.txt");
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        match response.result.unwrap() {
            NfsResOp4::OpOpen(Open4res::Resok4(ok)) => {
                assert_eq!(ok.stateid.seqid, 1);
                assert!(ok.rflags & OPEN4_RESULT_CONFIRM != 0);
                assert!(ok.cinfo.atomic);
                assert!(ok.cinfo.after >= ok.cinfo.before);
            }
            other => panic!("unexpected {:?}", other),
        }
        // OPEN leaves the opened file as the current handle
        match response.request.current_filehandle().unwrap() {
            FsObject::Real(entry) => assert!(entry.is_regular()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn guarded_create_of_existing_file_fails() {
        let env = TestEnv::new();
        let clientid = confirmed_client(&env, b"open-guarded").await;

        let request = env.share_root_request().await;
        let args = open_create_args(clientid, b"owner-1", 1, "dup.txt");
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);

        let request = env.share_root_request().await;
        let mut args = open_create_args(clientid, b"owner-1", 2, "dup.txt");
        args.openhow = OpenFlag4::How(CreateHow4::Guarded4(Fattr4::default()));
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errExist);
    }

    #[tokio::test]
    #[traced_test]
    async fn exclusive_create_is_idempotent_per_verifier() {
        let env = TestEnv::new();
        let clientid = confirmed_client(&env, b"open-excl").await;

        let request = env.share_root_request().await;
        let mut args = open_create_args(clientid, b"owner-1", 1, "excl.txt");
        args.openhow = OpenFlag4::How(CreateHow4::Exclusive4([5; 8]));
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);

        // same verifier: treated as a replay
        let request = env.share_root_request().await;
        let mut args = open_create_args(clientid, b"owner-1", 2, "excl.txt");
        args.openhow = OpenFlag4::How(CreateHow4::Exclusive4([5; 8]));
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);

        // different verifier: someone else made the file
        let request = env.share_root_request().await;
        let mut args = open_create_args(clientid, b"owner-1", 3, "excl.txt");
        args.openhow = OpenFlag4::How(CreateHow4::Exclusive4([6; 8]));
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errExist);
    }

    #[tokio::test]
    #[traced_test]
    async fn open_nocreate_of_missing_file() {
        let env = TestEnv::new();
        let clientid = confirmed_client(&env, b"open-noent").await;

        let request = env.share_root_request().await;
        let mut args = open_create_args(clientid, b"owner-1", 1, "absent.txt");
        args.openhow = OpenFlag4::Open4Nocreate;
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errNoent);
    }

    #[tokio::test]
    #[traced_test]
    async fn open_directory_is_isdir() {
        let env = TestEnv::new();
        let clientid = confirmed_client(&env, b"open-isdir").await;
        let root = env.store.share_root("export").await.unwrap();
        use crate::server::store::MetadataStore;
        env.store
            .create_directory("export", root.id, "subdir", 0o755)
            .await
            .unwrap();

        let request = env.share_root_request().await;
        let mut args = open_create_args(clientid, b"owner-1", 1, "subdir");
        args.openhow = OpenFlag4::Open4Nocreate;
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errIsdir);
    }

    #[tokio::test]
    #[traced_test]
    async fn second_client_write_open_is_held_off_by_delegation() {
        let env = TestEnv::new();
        let client_a = confirmed_client(&env, b"deleg-a").await;
        let client_b = confirmed_client(&env, b"deleg-b").await;

        // force the callback path up so a delegation can be granted
        env.state
            .inner
            .read()
            .await
            .clients
            .iter()
            .for_each(|(_, c)| {
                c.cb_path_up.store(true, std::sync::atomic::Ordering::Relaxed)
            });

        let request = env.share_root_request().await;
        let args = open_create_args(client_a, b"owner-a", 1, "hot.txt");
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        let deleg_stateid = match response.result.unwrap() {
            NfsResOp4::OpOpen(Open4res::Resok4(ok)) => match ok.delegation {
                OpenDelegation4::Write(write) => write.stateid,
                other => panic!("expected a write delegation, got {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        };

        // B's open conflicts and is answered DELAY while A is recalled
        let request = env.share_root_request().await;
        let args = open_create_args(client_b, b"owner-b", 1, "hot.txt");
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errDelay);

        // A returns the delegation; B's retry succeeds
        env.state.delegreturn(&deleg_stateid).await.unwrap();
        let request = env.share_root_request().await;
        let args = open_create_args(client_b, b"owner-b", 2, "hot.txt");
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
    }
}
