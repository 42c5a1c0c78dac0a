//! Store façade: the metadata, payload and identity collaborators the
//! protocol core calls into, specified by interface only. The vfs-backed
//! implementation in [`vfsstore`] serves the binary and the tests.

pub mod vfsstore;

use async_trait::async_trait;
use thiserror::Error;

use keel_proto::nfs4_proto::{
    NfsFh4, NfsFtype4, NfsStat4, Nfstime4, Settime4, Specdata4, Verifier4, NFS4_FHSIZE,
};

pub use vfsstore::VfsStore;

pub type FileId = u64;

/// Metadata record for one filesystem object, as the store reports it.
#[derive(Clone, Debug, PartialEq)]
pub struct FileEntry {
    pub share: String,
    pub id: FileId,
    pub ftype: NfsFtype4,
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    /// Change counter; bumps on every data or metadata mutation.
    pub change: u64,
    pub time_access: Nfstime4,
    pub time_metadata: Nfstime4,
    pub time_modify: Nfstime4,
    pub time_create: Nfstime4,
    pub space_used: u64,
    /// Exclusive-create verifier, when the object was created that way.
    pub verifier: Option<Verifier4>,
}

impl FileEntry {
    pub fn is_dir(&self) -> bool {
        self.ftype == NfsFtype4::Nf4dir
    }

    pub fn is_regular(&self) -> bool {
        self.ftype == NfsFtype4::Nf4reg
    }

    pub fn is_symlink(&self) -> bool {
        self.ftype == NfsFtype4::Nf4lnk
    }

    pub fn handle(&self) -> NfsFh4 {
        encode_real_handle(&self.share, self.id)
    }
}

/// Attribute mutations accepted by `SetFileAttributes`.
#[derive(Clone, Debug, Default)]
pub struct SetAttributes {
    pub size: Option<u64>,
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub time_access: Option<Settime4>,
    pub time_modify: Option<Settime4>,
}

impl SetAttributes {
    pub fn is_empty(&self) -> bool {
        self.size.is_none()
            && self.mode.is_none()
            && self.uid.is_none()
            && self.gid.is_none()
            && self.time_access.is_none()
            && self.time_modify.is_none()
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,
    #[error("object already exists")]
    Exists,
    #[error("not a directory")]
    NotDirectory,
    #[error("is a directory")]
    IsDirectory,
    #[error("is a symlink")]
    IsSymlink,
    #[error("directory not empty")]
    NotEmpty,
    #[error("name too long")]
    NameTooLong,
    #[error("invalid name")]
    InvalidName,
    #[error("read-only share")]
    ReadOnly,
    #[error("no space left")]
    NoSpace,
    #[error("file too big")]
    TooBig,
    #[error("operation crosses shares")]
    CrossDevice,
    #[error("access denied")]
    AccessDenied,
    #[error("stale handle")]
    Stale,
    #[error("malformed handle")]
    BadHandle,
    #[error("unknown share {0}")]
    UnknownShare(String),
    #[error("unknown principal {0}")]
    BadOwner(String),
    #[error("operation not supported by store")]
    Unsupported,
    #[error("io failure: {0}")]
    Io(String),
}

impl StoreError {
    /// The central store-error to NFS-status mapping table.
    pub fn nfs_status(&self) -> NfsStat4 {
        match self {
            StoreError::NotFound => NfsStat4::Nfs4errNoent,
            StoreError::Exists => NfsStat4::Nfs4errExist,
            StoreError::NotDirectory => NfsStat4::Nfs4errNotdir,
            StoreError::IsDirectory => NfsStat4::Nfs4errIsdir,
            StoreError::IsSymlink => NfsStat4::Nfs4errSymlink,
            StoreError::NotEmpty => NfsStat4::Nfs4errNotempty,
            StoreError::NameTooLong => NfsStat4::Nfs4errNametoolong,
            StoreError::InvalidName => NfsStat4::Nfs4errBadname,
            StoreError::ReadOnly => NfsStat4::Nfs4errRofs,
            StoreError::NoSpace => NfsStat4::Nfs4errNospc,
            StoreError::TooBig => NfsStat4::Nfs4errFbig,
            StoreError::CrossDevice => NfsStat4::Nfs4errXdev,
            StoreError::AccessDenied => NfsStat4::Nfs4errAccess,
            StoreError::Stale => NfsStat4::Nfs4errStale,
            StoreError::BadHandle => NfsStat4::Nfs4errBadhandle,
            StoreError::UnknownShare(_) => NfsStat4::Nfs4errStale,
            StoreError::BadOwner(_) => NfsStat4::Nfs4errBadOwner,
            StoreError::Unsupported => NfsStat4::Nfs4errNotsupp,
            StoreError::Io(_) => NfsStat4::Nfs4errIo,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Directory and inode CRUD, attribute storage, link bookkeeping and the
/// deferred-write bracket.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn share_root(&self, share: &str) -> StoreResult<FileEntry>;
    async fn lookup(&self, share: &str, dir: FileId, name: &str) -> StoreResult<FileEntry>;
    async fn get_file(&self, share: &str, id: FileId) -> StoreResult<FileEntry>;
    async fn get_parent(&self, share: &str, id: FileId) -> StoreResult<FileEntry>;
    async fn read_dir(&self, share: &str, dir: FileId) -> StoreResult<Vec<(String, FileEntry)>>;
    async fn create_file(
        &self,
        share: &str,
        dir: FileId,
        name: &str,
        mode: u32,
        verifier: Option<Verifier4>,
    ) -> StoreResult<FileEntry>;
    async fn create_directory(
        &self,
        share: &str,
        dir: FileId,
        name: &str,
        mode: u32,
    ) -> StoreResult<FileEntry>;
    async fn create_symlink(
        &self,
        share: &str,
        dir: FileId,
        name: &str,
        target: &str,
    ) -> StoreResult<FileEntry>;
    async fn create_special_file(
        &self,
        share: &str,
        dir: FileId,
        name: &str,
        ftype: NfsFtype4,
        specdata: Specdata4,
    ) -> StoreResult<FileEntry>;
    async fn create_hard_link(
        &self,
        share: &str,
        source: FileId,
        target_dir: FileId,
        name: &str,
    ) -> StoreResult<FileEntry>;
    /// Atomic rename within one share.
    async fn rename(
        &self,
        share: &str,
        from_dir: FileId,
        from_name: &str,
        to_dir: FileId,
        to_name: &str,
    ) -> StoreResult<()>;
    async fn remove(&self, share: &str, dir: FileId, name: &str) -> StoreResult<()>;
    async fn read_symlink(&self, share: &str, id: FileId) -> StoreResult<String>;
    async fn set_file_attributes(
        &self,
        share: &str,
        id: FileId,
        set: &SetAttributes,
    ) -> StoreResult<FileEntry>;
    /// Write bracket: reserve, then publish the new size and change id.
    async fn prepare_write(&self, share: &str, id: FileId, offset: u64, len: u64)
        -> StoreResult<()>;
    async fn commit_write(&self, share: &str, id: FileId) -> StoreResult<FileEntry>;
    async fn flush_pending_write_for_file(&self, share: &str, id: FileId) -> StoreResult<()>;
}

/// Byte-range payload access.
#[async_trait]
pub trait PayloadStore: Send + Sync {
    /// Returns the bytes read and whether EOF was reached.
    async fn read_at(
        &self,
        share: &str,
        id: FileId,
        offset: u64,
        count: u32,
    ) -> StoreResult<(Vec<u8>, bool)>;
    /// Copy-on-write-aware read. Stores without COW support serve it as
    /// a plain read of `id`.
    async fn read_at_with_cow_source(
        &self,
        share: &str,
        id: FileId,
        _source: FileId,
        offset: u64,
        count: u32,
    ) -> StoreResult<(Vec<u8>, bool)> {
        self.read_at(share, id, offset, count).await
    }
    async fn write_at(&self, share: &str, id: FileId, offset: u64, data: &[u8])
        -> StoreResult<u32>;
    async fn flush(&self, share: &str, id: FileId) -> StoreResult<()>;
}

/// Principal resolution and group expansion.
pub trait IdentityMapper: Send + Sync {
    fn uid_to_owner(&self, uid: u32) -> String;
    fn owner_to_uid(&self, owner: &str) -> StoreResult<u32>;
    fn gid_to_group(&self, gid: u32) -> String;
    fn group_to_gid(&self, group: &str) -> StoreResult<u32>;
    fn expand_groups(&self, uid: u32, primary_gid: u32) -> Vec<u32>;
}

/// The default mapper: numeric principals in a fixed domain.
#[derive(Clone, Debug)]
pub struct NumericIdentityMapper {
    pub domain: String,
}

impl NumericIdentityMapper {
    pub fn new(domain: &str) -> Self {
        NumericIdentityMapper {
            domain: domain.to_string(),
        }
    }
}

impl IdentityMapper for NumericIdentityMapper {
    fn uid_to_owner(&self, uid: u32) -> String {
        format!("{}@{}", uid, self.domain)
    }

    fn owner_to_uid(&self, owner: &str) -> StoreResult<u32> {
        let name = owner.split('@').next().unwrap_or(owner);
        name.parse()
            .map_err(|_| StoreError::BadOwner(owner.to_string()))
    }

    fn gid_to_group(&self, gid: u32) -> String {
        format!("{}@{}", gid, self.domain)
    }

    fn group_to_gid(&self, group: &str) -> StoreResult<u32> {
        let name = group.split('@').next().unwrap_or(group);
        name.parse()
            .map_err(|_| StoreError::BadOwner(group.to_string()))
    }

    fn expand_groups(&self, _uid: u32, primary_gid: u32) -> Vec<u32> {
        vec![primary_gid]
    }
}

/*
 * Real filehandle encoding. The format belongs to this façade: a tag
 * byte, the share name length-prefixed, and the 64-bit file id.
 */
const REAL_FH_TAG: u8 = 0x01;

pub fn encode_real_handle(share: &str, id: FileId) -> NfsFh4 {
    let name = share.as_bytes();
    let mut handle = Vec::with_capacity(2 + name.len() + 8);
    handle.push(REAL_FH_TAG);
    handle.push(name.len() as u8);
    handle.extend_from_slice(name);
    handle.extend_from_slice(&id.to_be_bytes());
    handle
}

pub fn decode_real_handle(handle: &[u8]) -> StoreResult<(String, FileId)> {
    if handle.len() > NFS4_FHSIZE || handle.len() < 10 || handle[0] != REAL_FH_TAG {
        return Err(StoreError::BadHandle);
    }
    let name_len = handle[1] as usize;
    if handle.len() != 2 + name_len + 8 {
        return Err(StoreError::BadHandle);
    }
    let share = String::from_utf8(handle[2..2 + name_len].to_vec())
        .map_err(|_| StoreError::BadHandle)?;
    let id = u64::from_be_bytes(handle[2 + name_len..].try_into().unwrap());
    Ok((share, id))
}

pub fn is_real_handle(handle: &[u8]) -> bool {
    handle.first() == Some(&REAL_FH_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_handle_roundtrip() {
        let handle = encode_real_handle("export", 42);
        assert!(is_real_handle(&handle));
        assert!(handle.len() <= NFS4_FHSIZE);
        let (share, id) = decode_real_handle(&handle).unwrap();
        assert_eq!(share, "export");
        assert_eq!(id, 42);
    }

    #[test]
    fn truncated_handle_is_bad() {
        let mut handle = encode_real_handle("export", 42);
        handle.pop();
        assert_eq!(decode_real_handle(&handle), Err(StoreError::BadHandle));
        assert_eq!(decode_real_handle(&[]), Err(StoreError::BadHandle));
    }

    #[test]
    fn status_mapping_covers_wire_taxonomy() {
        assert_eq!(StoreError::NotFound.nfs_status(), NfsStat4::Nfs4errNoent);
        assert_eq!(StoreError::ReadOnly.nfs_status(), NfsStat4::Nfs4errRofs);
        assert_eq!(StoreError::CrossDevice.nfs_status(), NfsStat4::Nfs4errXdev);
        assert_eq!(
            StoreError::BadOwner("x".into()).nfs_status(),
            NfsStat4::Nfs4errBadOwner
        );
    }

    #[test]
    fn numeric_identity_mapper() {
        let mapper = NumericIdentityMapper::new("example.net");
        assert_eq!(mapper.uid_to_owner(1000), "1000@example.net");
        assert_eq!(mapper.owner_to_uid("1000@example.net").unwrap(), 1000);
        assert!(mapper.owner_to_uid("alice@example.net").is_err());
    }
}
