//! File manager: resolves filehandles into pseudo-fs nodes or store
//! entries and assembles `fattr4` attribute sets for both.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::debug;

use keel_proto::attr::{Fattr4, FileAttr, FileAttrList, FileAttrValue};
use keel_proto::nfs4_proto::{
    Fsid4, NfsFh4, NfsFtype4, NfsStat4, Nfsace4, Nfstime4, ACE4_GENERIC_EXECUTE, ACE4_GENERIC_READ,
    ACE4_GENERIC_WRITE, ACL4_SUPPORT_ALARM_ACL, ACL4_SUPPORT_ALLOW_ACL, ACL4_SUPPORT_AUDIT_ACL,
    ACL4_SUPPORT_DENY_ACL, FH4_VOLATILE_ANY, MODE4_RGRP, MODE4_ROTH, MODE4_RUSR, MODE4_WGRP,
    MODE4_WOTH, MODE4_WUSR, MODE4_XGRP, MODE4_XOTH, MODE4_XUSR, NFS4_FHSIZE,
};

use super::pseudofs::{is_pseudo_handle, PseudoFs, PseudoNode};
use super::store::{
    decode_real_handle, is_real_handle, FileEntry, IdentityMapper, MetadataStore, PayloadStore,
    SetAttributes,
};

/// What a filehandle resolves to: a node of the virtual export tree or a
/// real object behind the metadata store.
#[derive(Clone, Debug)]
pub enum FsObject {
    Pseudo(PseudoNode),
    Real(FileEntry),
}

impl FsObject {
    pub fn handle(&self) -> NfsFh4 {
        match self {
            FsObject::Pseudo(node) => node.handle(),
            FsObject::Real(entry) => entry.handle(),
        }
    }

    pub fn is_dir(&self) -> bool {
        match self {
            FsObject::Pseudo(_) => true,
            FsObject::Real(entry) => entry.is_dir(),
        }
    }

    pub fn ftype(&self) -> NfsFtype4 {
        match self {
            FsObject::Pseudo(_) => NfsFtype4::Nf4dir,
            FsObject::Real(entry) => entry.ftype,
        }
    }

    pub fn fileid(&self) -> u64 {
        match self {
            FsObject::Pseudo(node) => node.fileid,
            FsObject::Real(entry) => entry.id,
        }
    }

    pub fn change(&self) -> u64 {
        match self {
            FsObject::Pseudo(node) => node.change,
            FsObject::Real(entry) => entry.change,
        }
    }

    pub fn as_real(&self) -> Option<&FileEntry> {
        match self {
            FsObject::Pseudo(_) => None,
            FsObject::Real(entry) => Some(entry),
        }
    }
}

/// Shared handle resolving and attribute assembly for the op handlers.
pub struct FileManager {
    pub metadata: Arc<dyn MetadataStore>,
    pub payload: Arc<dyn PayloadStore>,
    pub identity: Arc<dyn IdentityMapper>,
    pub pseudo: Arc<PseudoFs>,
    pub lease_time: u32,
    pub hard_link_support: bool,
    pub symlink_support: bool,
    pub unique_handles: bool,
}

impl FileManager {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        payload: Arc<dyn PayloadStore>,
        identity: Arc<dyn IdentityMapper>,
        pseudo: Arc<PseudoFs>,
        lease_time: u32,
    ) -> Arc<Self> {
        Arc::new(FileManager {
            metadata,
            payload,
            identity,
            pseudo,
            lease_time,
            hard_link_support: false,
            symlink_support: false,
            unique_handles: false,
        })
    }

    /// Maps a wire filehandle back to the object it names.
    pub async fn resolve_handle(&self, fh: &[u8]) -> Result<FsObject, NfsStat4> {
        if fh.is_empty() || fh.len() > NFS4_FHSIZE {
            return Err(NfsStat4::Nfs4errBadhandle);
        }
        if is_pseudo_handle(fh) {
            return match self.pseudo.node_for_handle(fh) {
                Some(node) => Ok(FsObject::Pseudo(node)),
                // the path this handle named no longer exists in the tree
                None => Err(NfsStat4::Nfs4errStale),
            };
        }
        if !is_real_handle(fh) {
            return Err(NfsStat4::Nfs4errBadhandle);
        }
        let (share, id) = decode_real_handle(fh).map_err(|e| e.nfs_status())?;
        match self.metadata.get_file(&share, id).await {
            Ok(entry) => Ok(FsObject::Real(entry)),
            Err(e) => Err(e.nfs_status()),
        }
    }

    /// The share root entry a junction crosses into.
    pub async fn share_root(&self, share: &str) -> Result<FileEntry, NfsStat4> {
        self.metadata
            .share_root(share)
            .await
            .map_err(|e| e.nfs_status())
    }

    pub fn attr_supported_attrs(&self) -> FileAttrList {
        FileAttrList::new(vec![
            FileAttr::SupportedAttrs,
            FileAttr::Type,
            FileAttr::FhExpireType,
            FileAttr::Change,
            FileAttr::Size,
            FileAttr::LinkSupport,
            FileAttr::SymlinkSupport,
            FileAttr::Fsid,
            FileAttr::UniqueHandles,
            FileAttr::LeaseTime,
            FileAttr::RdattrError,
            FileAttr::Acl,
            FileAttr::AclSupport,
            FileAttr::Cansettime,
            FileAttr::CaseInsensitive,
            FileAttr::CasePreserving,
            FileAttr::Filehandle,
            FileAttr::Fileid,
            FileAttr::Maxfilesize,
            FileAttr::Maxlink,
            FileAttr::Maxname,
            FileAttr::Maxread,
            FileAttr::Maxwrite,
            FileAttr::Mode,
            FileAttr::NoTrunc,
            FileAttr::Numlinks,
            FileAttr::Owner,
            FileAttr::OwnerGroup,
            FileAttr::SpaceUsed,
            FileAttr::TimeAccess,
            FileAttr::TimeCreate,
            FileAttr::TimeMetadata,
            FileAttr::TimeModify,
            FileAttr::MountedOnFileid,
        ])
    }

    pub fn attr_lease_time(&self) -> u32 {
        self.lease_time
    }

    pub fn attr_rdattr_error(&self) -> NfsStat4 {
        NfsStat4::Nfs4errInval
    }

    pub fn attr_expire_type(&self) -> u32 {
        FH4_VOLATILE_ANY
    }

    pub fn attr_acl_support(&self) -> u32 {
        // all four ACE types are reported on the wire
        ACL4_SUPPORT_ALLOW_ACL
            | ACL4_SUPPORT_DENY_ACL
            | ACL4_SUPPORT_AUDIT_ACL
            | ACL4_SUPPORT_ALARM_ACL
    }

    pub fn attr_maxfilesize(&self) -> u64 {
        1 << 40
    }

    pub fn attr_maxread(&self) -> u64 {
        1024 * 1024
    }

    pub fn attr_maxwrite(&self) -> u64 {
        1024 * 1024
    }

    pub fn attr_maxname(&self) -> u32 {
        255
    }

    pub fn attr_maxlink(&self) -> u32 {
        255
    }

    fn fsid_for(&self, obj: &FsObject) -> Fsid4 {
        match obj {
            FsObject::Pseudo(_) => Fsid4 { major: 0, minor: 0 },
            FsObject::Real(entry) => {
                let mut hasher = DefaultHasher::new();
                entry.share.hash(&mut hasher);
                Fsid4 {
                    major: hasher.finish(),
                    minor: 0,
                }
            }
        }
    }

    /// Synthesizes the ACL the mode bits imply, with the special who
    /// tokens.
    pub fn acl_from_mode(&self, mode: u32) -> Vec<Nfsace4> {
        let mut aces = Vec::new();
        let mut push = |who: &str, read: bool, write: bool, execute: bool| {
            let mut mask = 0;
            if read {
                mask |= ACE4_GENERIC_READ;
            }
            if write {
                mask |= ACE4_GENERIC_WRITE;
            }
            if execute {
                mask |= ACE4_GENERIC_EXECUTE;
            }
            if mask != 0 {
                aces.push(Nfsace4 {
                    acetype: 0, // ACE4_ACCESS_ALLOWED_ACE_TYPE
                    flag: 0,
                    access_mask: mask,
                    who: who.to_string(),
                });
            }
        };
        push(
            "OWNER@",
            mode & MODE4_RUSR != 0,
            mode & MODE4_WUSR != 0,
            mode & MODE4_XUSR != 0,
        );
        push(
            "GROUP@",
            mode & MODE4_RGRP != 0,
            mode & MODE4_WGRP != 0,
            mode & MODE4_XGRP != 0,
        );
        push(
            "EVERYONE@",
            mode & MODE4_ROTH != 0,
            mode & MODE4_WOTH != 0,
            mode & MODE4_XOTH != 0,
        );
        aces
    }

    /// Builds the granted attribute list and values for `obj`: the
    /// intersection of the request with the supported set, values packed
    /// in ascending attribute order.
    pub fn file_attributes(
        &self,
        obj: &FsObject,
        request: &FileAttrList,
    ) -> (FileAttrList, Vec<FileAttrValue>) {
        let granted = request.intersect(&self.attr_supported_attrs());
        let mut values = Vec::with_capacity(granted.len());
        for attr in granted.iter() {
            values.push(self.attr_value(obj, *attr));
        }
        (granted, values)
    }

    pub fn fattr_for(&self, obj: &FsObject, request: &FileAttrList) -> Fattr4 {
        let (attrmask, attr_vals) = self.file_attributes(obj, request);
        Fattr4 {
            attrmask,
            attr_vals,
        }
    }

    fn attr_value(&self, obj: &FsObject, attr: FileAttr) -> FileAttrValue {
        match attr {
            FileAttr::SupportedAttrs => {
                FileAttrValue::SupportedAttrs(self.attr_supported_attrs())
            }
            FileAttr::Type => FileAttrValue::Type(obj.ftype()),
            FileAttr::FhExpireType => FileAttrValue::FhExpireType(self.attr_expire_type()),
            FileAttr::Change => FileAttrValue::Change(obj.change()),
            FileAttr::Size => FileAttrValue::Size(match obj {
                FsObject::Pseudo(_) => 0,
                FsObject::Real(entry) => entry.size,
            }),
            FileAttr::LinkSupport => FileAttrValue::LinkSupport(self.hard_link_support),
            FileAttr::SymlinkSupport => FileAttrValue::SymlinkSupport(self.symlink_support),
            FileAttr::Fsid => FileAttrValue::Fsid(self.fsid_for(obj)),
            FileAttr::UniqueHandles => FileAttrValue::UniqueHandles(self.unique_handles),
            FileAttr::LeaseTime => FileAttrValue::LeaseTime(self.attr_lease_time()),
            FileAttr::RdattrError => FileAttrValue::RdattrError(self.attr_rdattr_error()),
            FileAttr::Acl => {
                let mode = match obj {
                    FsObject::Pseudo(_) => MODE4_RUSR | MODE4_RGRP | MODE4_ROTH,
                    FsObject::Real(entry) => entry.mode,
                };
                FileAttrValue::Acl(self.acl_from_mode(mode))
            }
            FileAttr::AclSupport => FileAttrValue::AclSupport(self.attr_acl_support()),
            FileAttr::Cansettime => FileAttrValue::Cansettime(true),
            FileAttr::CaseInsensitive => FileAttrValue::CaseInsensitive(false),
            FileAttr::CasePreserving => FileAttrValue::CasePreserving(true),
            FileAttr::Filehandle => FileAttrValue::Filehandle(obj.handle()),
            FileAttr::Fileid => FileAttrValue::Fileid(obj.fileid()),
            FileAttr::Maxfilesize => FileAttrValue::Maxfilesize(self.attr_maxfilesize()),
            FileAttr::Maxlink => FileAttrValue::Maxlink(self.attr_maxlink()),
            FileAttr::Maxname => FileAttrValue::Maxname(self.attr_maxname()),
            FileAttr::Maxread => FileAttrValue::Maxread(self.attr_maxread()),
            FileAttr::Maxwrite => FileAttrValue::Maxwrite(self.attr_maxwrite()),
            FileAttr::Mode => FileAttrValue::Mode(match obj {
                FsObject::Pseudo(_) => MODE4_RUSR | MODE4_XUSR | MODE4_RGRP | MODE4_XGRP
                    | MODE4_ROTH | MODE4_XOTH,
                FsObject::Real(entry) => entry.mode,
            }),
            FileAttr::NoTrunc => FileAttrValue::NoTrunc(true),
            FileAttr::Numlinks => FileAttrValue::Numlinks(match obj {
                FsObject::Pseudo(node) => 2 + node.children.len() as u32,
                FsObject::Real(entry) => entry.nlink,
            }),
            FileAttr::Owner => FileAttrValue::Owner(match obj {
                FsObject::Pseudo(_) => self.identity.uid_to_owner(0),
                FsObject::Real(entry) => self.identity.uid_to_owner(entry.uid),
            }),
            FileAttr::OwnerGroup => FileAttrValue::OwnerGroup(match obj {
                FsObject::Pseudo(_) => self.identity.gid_to_group(0),
                FsObject::Real(entry) => self.identity.gid_to_group(entry.gid),
            }),
            FileAttr::SpaceUsed => FileAttrValue::SpaceUsed(match obj {
                FsObject::Pseudo(_) => 0,
                FsObject::Real(entry) => entry.space_used,
            }),
            FileAttr::TimeAccess => FileAttrValue::TimeAccess(self.time_of(obj, |e| e.time_access)),
            FileAttr::TimeCreate => FileAttrValue::TimeCreate(self.time_of(obj, |e| e.time_create)),
            FileAttr::TimeMetadata => {
                FileAttrValue::TimeMetadata(self.time_of(obj, |e| e.time_metadata))
            }
            FileAttr::TimeModify => FileAttrValue::TimeModify(self.time_of(obj, |e| e.time_modify)),
            FileAttr::MountedOnFileid => FileAttrValue::MountedOnFileid(obj.fileid()),
            // not in the supported set; the intersection keeps them out
            _ => FileAttrValue::RdattrError(NfsStat4::Nfs4errInval),
        }
    }

    fn time_of(&self, obj: &FsObject, pick: fn(&FileEntry) -> Nfstime4) -> Nfstime4 {
        match obj {
            FsObject::Pseudo(_) => Nfstime4::default(),
            FsObject::Real(entry) => pick(entry),
        }
    }

    /// Translates a SETATTR fattr into store mutations. Unsupported or
    /// read-only attributes in the mask fail the whole operation.
    pub fn setattr_from_fattr(&self, fattr: &Fattr4) -> Result<SetAttributes, NfsStat4> {
        let mut set = SetAttributes::default();
        for value in &fattr.attr_vals {
            match value {
                FileAttrValue::Size(size) => set.size = Some(*size),
                FileAttrValue::Mode(mode) => set.mode = Some(*mode),
                FileAttrValue::Owner(owner) => {
                    let uid = self
                        .identity
                        .owner_to_uid(owner)
                        .map_err(|e| e.nfs_status())?;
                    set.uid = Some(uid);
                }
                FileAttrValue::OwnerGroup(group) => {
                    let gid = self
                        .identity
                        .group_to_gid(group)
                        .map_err(|e| e.nfs_status())?;
                    set.gid = Some(gid);
                }
                FileAttrValue::TimeAccessSet(how) => set.time_access = Some(*how),
                FileAttrValue::TimeModifySet(how) => set.time_modify = Some(*how),
                other => {
                    debug!(?other, "attribute is not settable");
                    return Err(NfsStat4::Nfs4errAttrnotsupp);
                }
            }
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::super::pseudofs::ShareMount;
    use super::super::store::{NumericIdentityMapper, VfsStore};
    use super::*;
    use keel_proto::xdr::{XdrEncode, XdrWriter};
    use vfs::{MemoryFS, VfsPath};

    fn manager() -> (Arc<FileManager>, Arc<VfsStore>) {
        let root: VfsPath = MemoryFS::new().into();
        let store = Arc::new(VfsStore::new(vec![("export".to_string(), root)]));
        let pseudo = Arc::new(PseudoFs::new(&[ShareMount::new("export", "/export")]));
        let fm = FileManager::new(
            store.clone(),
            store.clone(),
            Arc::new(NumericIdentityMapper::new("example.net")),
            pseudo,
            60,
        );
        (fm, store)
    }

    #[tokio::test]
    async fn resolve_pseudo_and_real_handles() {
        let (fm, store) = manager();
        let root_node = fm.pseudo.root();
        let resolved = fm.resolve_handle(&root_node.handle()).await.unwrap();
        assert!(matches!(resolved, FsObject::Pseudo(_)));

        let share_root = store.share_root("export").await.unwrap();
        let resolved = fm.resolve_handle(&share_root.handle()).await.unwrap();
        match resolved {
            FsObject::Real(entry) => assert_eq!(entry.id, share_root.id),
            other => panic!("unexpected: {:?}", other),
        }

        assert_eq!(
            fm.resolve_handle(b"garbage-handle").await.unwrap_err(),
            NfsStat4::Nfs4errBadhandle
        );
        assert_eq!(
            fm.resolve_handle(&[]).await.unwrap_err(),
            NfsStat4::Nfs4errBadhandle
        );
    }

    #[tokio::test]
    async fn attributes_intersect_with_supported_set() {
        let (fm, _) = manager();
        let obj = FsObject::Pseudo(fm.pseudo.root());
        let request = FileAttrList::new(vec![
            FileAttr::Type,
            FileAttr::Size,
            FileAttr::Hidden, // unsupported
            FileAttr::System, // unsupported
        ]);
        let (granted, values) = fm.file_attributes(&obj, &request);
        assert_eq!(granted.0, vec![FileAttr::Type, FileAttr::Size]);
        assert_eq!(values.len(), 2);
        assert!(matches!(values[0], FileAttrValue::Type(NfsFtype4::Nf4dir)));
    }

    #[tokio::test]
    async fn fattr_encoding_is_deterministic() {
        let (fm, store) = manager();
        let entry = store.share_root("export").await.unwrap();
        let obj = FsObject::Real(entry);
        let request = FileAttrList::new(vec![
            FileAttr::Type,
            FileAttr::Change,
            FileAttr::Size,
            FileAttr::Owner,
        ]);
        let a = fm.fattr_for(&obj, &request);
        let b = fm.fattr_for(&obj, &request);
        let mut wa = XdrWriter::new();
        let mut wb = XdrWriter::new();
        a.encode(&mut wa);
        b.encode(&mut wb);
        assert_eq!(wa.into_bytes(), wb.into_bytes());
    }

    #[tokio::test]
    async fn acl_reports_special_who_tokens() {
        let (fm, _) = manager();
        let aces = fm.acl_from_mode(0o754);
        let whos: Vec<&str> = aces.iter().map(|a| a.who.as_str()).collect();
        assert_eq!(whos, vec!["OWNER@", "GROUP@", "EVERYONE@"]);
        assert_eq!(fm.attr_acl_support(), 0x0f);
    }

    #[tokio::test]
    async fn setattr_translation_rejects_unsupported() {
        let (fm, _) = manager();
        let fattr = Fattr4::from_values(vec![FileAttrValue::Hidden(true)]);
        assert_eq!(
            fm.setattr_from_fattr(&fattr).unwrap_err(),
            NfsStat4::Nfs4errAttrnotsupp
        );

        let fattr = Fattr4::from_values(vec![
            FileAttrValue::Size(10),
            FileAttrValue::Mode(0o600),
            FileAttrValue::Owner("1000@example.net".to_string()),
        ]);
        let set = fm.setattr_from_fattr(&fattr).unwrap();
        assert_eq!(set.size, Some(10));
        assert_eq!(set.mode, Some(0o600));
        assert_eq!(set.uid, Some(1000));
    }
}
