//! Virtual-filesystem-backed store: serves every façade trait from a set
//! of `VfsPath` roots, one per share. Node identity lives in a
//! multi-index table keyed by file id and by path; attributes the vfs
//! layer cannot hold (mode, ownership, times, change counter) are kept on
//! the node record.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use multi_index_map::MultiIndexMap;
use tracing::debug;
use vfs::VfsPath;

use keel_proto::nfs4_proto::{NfsFtype4, Nfstime4, Settime4, Specdata4, Verifier4};

use super::{
    FileEntry, FileId, MetadataStore, PayloadStore, SetAttributes, StoreError, StoreResult,
};

const MAX_NAME_LEN: usize = 255;
/// Largest file the vfs store will address.
const MAX_FILE_SIZE: u64 = 1 << 40;

fn now() -> Nfstime4 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    Nfstime4 {
        seconds: since_epoch.as_secs() as i64,
        nseconds: since_epoch.subsec_nanos(),
    }
}

#[derive(MultiIndexMap, Debug, Clone)]
#[multi_index_derive(Debug, Clone)]
pub struct VfsNode {
    #[multi_index(hashed_unique)]
    pub id: FileId,
    /// Share-relative path, always starting with '/'.
    #[multi_index(hashed_unique)]
    pub path: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub change: u64,
    pub time_access: Nfstime4,
    pub time_metadata: Nfstime4,
    pub time_modify: Nfstime4,
    pub time_create: Nfstime4,
    pub verifier: Option<Verifier4>,
    pub pending_write: bool,
}

struct ShareTable {
    db: MultiIndexVfsNodeMap,
    next_id: FileId,
}

impl ShareTable {
    fn new() -> Self {
        ShareTable {
            db: MultiIndexVfsNodeMap::default(),
            next_id: 100,
        }
    }

    /// Returns the node for `path`, registering it on first sight.
    fn ensure(&mut self, path: &str, is_dir: bool) -> VfsNode {
        if let Some(node) = self.db.get_by_path(&path.to_string()) {
            return node.clone();
        }
        let stamp = now();
        let node = VfsNode {
            id: self.next_id,
            path: path.to_string(),
            mode: if is_dir { 0o755 } else { 0o644 },
            uid: 1000,
            gid: 1000,
            change: 1,
            time_access: stamp,
            time_metadata: stamp,
            time_modify: stamp,
            time_create: stamp,
            verifier: None,
            pending_write: false,
        };
        self.next_id += 1;
        debug!(path, id = node.id, "registered vfs node");
        self.db.insert(node.clone());
        node
    }

    fn touch(&mut self, id: FileId, data_change: bool) {
        let stamp = now();
        self.db.modify_by_id(&id, |node| {
            node.change += 1;
            node.time_metadata = stamp;
            if data_change {
                node.time_modify = stamp;
            }
        });
    }
}

struct ShareFs {
    root: VfsPath,
    table: RwLock<ShareTable>,
}

/// A store over one `VfsPath` root per share.
pub struct VfsStore {
    shares: HashMap<String, ShareFs>,
}

impl VfsStore {
    pub fn new(shares: Vec<(String, VfsPath)>) -> Self {
        let mut map = HashMap::new();
        for (name, root) in shares {
            let fs = ShareFs {
                root,
                table: RwLock::new(ShareTable::new()),
            };
            // the share root always has a node
            fs.table.write().unwrap().ensure("/", true);
            map.insert(name, fs);
        }
        VfsStore { shares: map }
    }

    pub fn share_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shares.keys().cloned().collect();
        names.sort();
        names
    }

    fn fs(&self, share: &str) -> StoreResult<&ShareFs> {
        self.shares
            .get(share)
            .ok_or_else(|| StoreError::UnknownShare(share.to_string()))
    }

    fn vfs_path(&self, fs: &ShareFs, path: &str) -> StoreResult<VfsPath> {
        let rel = path.trim_start_matches('/');
        fs.root
            .join(rel)
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    fn node_path(&self, fs: &ShareFs, id: FileId) -> StoreResult<String> {
        let table = fs.table.read().unwrap();
        table
            .db
            .get_by_id(&id)
            .map(|node| node.path.clone())
            .ok_or(StoreError::Stale)
    }

    fn entry_for(&self, share: &str, fs: &ShareFs, node: &VfsNode) -> StoreResult<FileEntry> {
        let path = self.vfs_path(fs, &node.path)?;
        let meta = path.metadata().map_err(|_| StoreError::Stale)?;
        let ftype = match meta.file_type {
            vfs::VfsFileType::File => NfsFtype4::Nf4reg,
            vfs::VfsFileType::Directory => NfsFtype4::Nf4dir,
        };
        let nlink = if ftype == NfsFtype4::Nf4dir { 2 } else { 1 };
        Ok(FileEntry {
            share: share.to_string(),
            id: node.id,
            ftype,
            size: meta.len,
            mode: node.mode,
            uid: node.uid,
            gid: node.gid,
            nlink,
            change: node.change,
            time_access: node.time_access,
            time_metadata: node.time_metadata,
            time_modify: node.time_modify,
            time_create: node.time_create,
            space_used: meta.len,
            verifier: node.verifier,
        })
    }

    fn entry_by_id(&self, share: &str, id: FileId) -> StoreResult<FileEntry> {
        let fs = self.fs(share)?;
        let node = {
            let table = fs.table.read().unwrap();
            table.db.get_by_id(&id).cloned().ok_or(StoreError::Stale)?
        };
        let path = self.vfs_path(fs, &node.path)?;
        if !path.exists().map_err(|e| StoreError::Io(e.to_string()))? {
            // stale node: the object went away underneath us
            fs.table.write().unwrap().db.remove_by_id(&id);
            return Err(StoreError::Stale);
        }
        self.entry_for(share, fs, &node)
    }

    fn child_path(parent: &str, name: &str) -> StoreResult<String> {
        if name.is_empty() {
            return Err(StoreError::InvalidName);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(StoreError::NameTooLong);
        }
        if name == "." || name == ".." || name.contains('/') || name.contains('\0') {
            return Err(StoreError::InvalidName);
        }
        if parent == "/" {
            Ok(format!("/{}", name))
        } else {
            Ok(format!("{}/{}", parent, name))
        }
    }

    fn parent_of(path: &str) -> String {
        match path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
        }
    }

    fn require_dir(&self, fs: &ShareFs, path: &str) -> StoreResult<VfsPath> {
        let dir = self.vfs_path(fs, path)?;
        if !dir.exists().map_err(|e| StoreError::Io(e.to_string()))? {
            return Err(StoreError::Stale);
        }
        if !dir.is_dir().map_err(|e| StoreError::Io(e.to_string()))? {
            return Err(StoreError::NotDirectory);
        }
        Ok(dir)
    }

    fn read_whole(&self, file: &VfsPath) -> StoreResult<Vec<u8>> {
        let mut content = Vec::new();
        match file.open_file() {
            Ok(mut f) => {
                f.read_to_end(&mut content)
                    .map_err(|e| StoreError::Io(e.to_string()))?;
                Ok(content)
            }
            Err(_) => Err(StoreError::NotFound),
        }
    }

    fn write_whole(&self, file: &VfsPath, content: &[u8]) -> StoreResult<()> {
        let mut f = file
            .create_file()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        f.write_all(content)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        f.flush().map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for VfsStore {
    async fn share_root(&self, share: &str) -> StoreResult<FileEntry> {
        let fs = self.fs(share)?;
        let node = fs.table.write().unwrap().ensure("/", true);
        self.entry_for(share, fs, &node)
    }

    async fn lookup(&self, share: &str, dir: FileId, name: &str) -> StoreResult<FileEntry> {
        let fs = self.fs(share)?;
        let dir_path = self.node_path(fs, dir)?;
        self.require_dir(fs, &dir_path)?;
        let child = Self::child_path(&dir_path, name)?;
        let path = self.vfs_path(fs, &child)?;
        if !path.exists().map_err(|e| StoreError::Io(e.to_string()))? {
            return Err(StoreError::NotFound);
        }
        let is_dir = path.is_dir().map_err(|e| StoreError::Io(e.to_string()))?;
        let node = fs.table.write().unwrap().ensure(&child, is_dir);
        self.entry_for(share, fs, &node)
    }

    async fn get_file(&self, share: &str, id: FileId) -> StoreResult<FileEntry> {
        self.entry_by_id(share, id)
    }

    async fn get_parent(&self, share: &str, id: FileId) -> StoreResult<FileEntry> {
        let fs = self.fs(share)?;
        let path = self.node_path(fs, id)?;
        let parent = Self::parent_of(&path);
        let node = fs.table.write().unwrap().ensure(&parent, true);
        self.entry_for(share, fs, &node)
    }

    async fn read_dir(&self, share: &str, dir: FileId) -> StoreResult<Vec<(String, FileEntry)>> {
        let fs = self.fs(share)?;
        let dir_path = self.node_path(fs, dir)?;
        let path = self.require_dir(fs, &dir_path)?;
        let mut entries = Vec::new();
        let children = path
            .read_dir()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        for child in children {
            let name = child.filename();
            let child_path = Self::child_path(&dir_path, &name)?;
            let is_dir = child.is_dir().map_err(|e| StoreError::Io(e.to_string()))?;
            let node = fs.table.write().unwrap().ensure(&child_path, is_dir);
            entries.push((name, self.entry_for(share, fs, &node)?));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    async fn create_file(
        &self,
        share: &str,
        dir: FileId,
        name: &str,
        mode: u32,
        verifier: Option<Verifier4>,
    ) -> StoreResult<FileEntry> {
        let fs = self.fs(share)?;
        let dir_path = self.node_path(fs, dir)?;
        self.require_dir(fs, &dir_path)?;
        let child = Self::child_path(&dir_path, name)?;
        let path = self.vfs_path(fs, &child)?;
        if path.exists().map_err(|e| StoreError::Io(e.to_string()))? {
            return Err(StoreError::Exists);
        }
        path.create_file()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let node = {
            let mut table = fs.table.write().unwrap();
            let mut node = table.ensure(&child, false);
            node.mode = mode;
            node.verifier = verifier;
            table.db.remove_by_id(&node.id);
            table.db.insert(node.clone());
            table.touch(dir, true);
            node
        };
        self.entry_for(share, fs, &node)
    }

    async fn create_directory(
        &self,
        share: &str,
        dir: FileId,
        name: &str,
        mode: u32,
    ) -> StoreResult<FileEntry> {
        let fs = self.fs(share)?;
        let dir_path = self.node_path(fs, dir)?;
        self.require_dir(fs, &dir_path)?;
        let child = Self::child_path(&dir_path, name)?;
        let path = self.vfs_path(fs, &child)?;
        if path.exists().map_err(|e| StoreError::Io(e.to_string()))? {
            return Err(StoreError::Exists);
        }
        path.create_dir()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let node = {
            let mut table = fs.table.write().unwrap();
            let mut node = table.ensure(&child, true);
            node.mode = mode;
            table.db.remove_by_id(&node.id);
            table.db.insert(node.clone());
            table.touch(dir, true);
            node
        };
        self.entry_for(share, fs, &node)
    }

    async fn create_symlink(
        &self,
        _share: &str,
        _dir: FileId,
        _name: &str,
        _target: &str,
    ) -> StoreResult<FileEntry> {
        // the vfs backend has no symlink support
        Err(StoreError::Unsupported)
    }

    async fn create_special_file(
        &self,
        _share: &str,
        _dir: FileId,
        _name: &str,
        _ftype: NfsFtype4,
        _specdata: Specdata4,
    ) -> StoreResult<FileEntry> {
        Err(StoreError::Unsupported)
    }

    async fn create_hard_link(
        &self,
        _share: &str,
        _source: FileId,
        _target_dir: FileId,
        _name: &str,
    ) -> StoreResult<FileEntry> {
        Err(StoreError::Unsupported)
    }

    async fn rename(
        &self,
        share: &str,
        from_dir: FileId,
        from_name: &str,
        to_dir: FileId,
        to_name: &str,
    ) -> StoreResult<()> {
        let fs = self.fs(share)?;
        let from_dir_path = self.node_path(fs, from_dir)?;
        let to_dir_path = self.node_path(fs, to_dir)?;
        self.require_dir(fs, &from_dir_path)?;
        self.require_dir(fs, &to_dir_path)?;
        let from = Self::child_path(&from_dir_path, from_name)?;
        let to = Self::child_path(&to_dir_path, to_name)?;
        let from_path = self.vfs_path(fs, &from)?;
        let to_path = self.vfs_path(fs, &to)?;
        if !from_path
            .exists()
            .map_err(|e| StoreError::Io(e.to_string()))?
        {
            return Err(StoreError::NotFound);
        }
        if from == to {
            return Ok(());
        }
        let is_dir = from_path
            .is_dir()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        if to_path.exists().map_err(|e| StoreError::Io(e.to_string()))? {
            // rename over an existing target replaces it
            if to_path.is_dir().map_err(|e| StoreError::Io(e.to_string()))? {
                to_path
                    .remove_dir()
                    .map_err(|_| StoreError::NotEmpty)?;
            } else {
                to_path
                    .remove_file()
                    .map_err(|e| StoreError::Io(e.to_string()))?;
            }
            let mut table = fs.table.write().unwrap();
            table.db.remove_by_path(&to);
        }
        if is_dir {
            from_path
                .move_dir(&to_path)
                .map_err(|e| StoreError::Io(e.to_string()))?;
        } else {
            from_path
                .move_file(&to_path)
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let mut table = fs.table.write().unwrap();
        // rewrite the moved node and, for directories, every descendant path
        let moved: Vec<VfsNode> = table
            .db
            .iter()
            .map(|(_, node)| node)
            .filter(|node| node.path == from || node.path.starts_with(&format!("{}/", from)))
            .cloned()
            .collect();
        for mut node in moved {
            table.db.remove_by_id(&node.id);
            node.path = format!("{}{}", to, &node.path[from.len()..]);
            table.db.insert(node);
        }
        table.touch(from_dir, true);
        if from_dir != to_dir {
            table.touch(to_dir, true);
        }
        Ok(())
    }

    async fn remove(&self, share: &str, dir: FileId, name: &str) -> StoreResult<()> {
        let fs = self.fs(share)?;
        let dir_path = self.node_path(fs, dir)?;
        self.require_dir(fs, &dir_path)?;
        let child = Self::child_path(&dir_path, name)?;
        let path = self.vfs_path(fs, &child)?;
        if !path.exists().map_err(|e| StoreError::Io(e.to_string()))? {
            return Err(StoreError::NotFound);
        }
        if path.is_dir().map_err(|e| StoreError::Io(e.to_string()))? {
            let occupied = path
                .read_dir()
                .map_err(|e| StoreError::Io(e.to_string()))?
                .next()
                .is_some();
            if occupied {
                return Err(StoreError::NotEmpty);
            }
            path.remove_dir()
                .map_err(|e| StoreError::Io(e.to_string()))?;
        } else {
            path.remove_file()
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let mut table = fs.table.write().unwrap();
        table.db.remove_by_path(&child);
        table.touch(dir, true);
        Ok(())
    }

    async fn read_symlink(&self, _share: &str, _id: FileId) -> StoreResult<String> {
        Err(StoreError::Unsupported)
    }

    async fn set_file_attributes(
        &self,
        share: &str,
        id: FileId,
        set: &SetAttributes,
    ) -> StoreResult<FileEntry> {
        let fs = self.fs(share)?;
        let node_path = self.node_path(fs, id)?;
        let path = self.vfs_path(fs, &node_path)?;
        if !path.exists().map_err(|e| StoreError::Io(e.to_string()))? {
            return Err(StoreError::Stale);
        }

        if let Some(size) = set.size {
            if path.is_dir().map_err(|e| StoreError::Io(e.to_string()))? {
                return Err(StoreError::IsDirectory);
            }
            if size > MAX_FILE_SIZE {
                return Err(StoreError::TooBig);
            }
            let mut content = self.read_whole(&path)?;
            content.resize(size as usize, 0);
            self.write_whole(&path, &content)?;
        }

        let stamp = now();
        let node = {
            let mut table = fs.table.write().unwrap();
            table.db.modify_by_id(&id, |node| {
                if let Some(mode) = set.mode {
                    node.mode = mode & 0o7777;
                }
                if let Some(uid) = set.uid {
                    node.uid = uid;
                }
                if let Some(gid) = set.gid {
                    node.gid = gid;
                }
                match set.time_access {
                    Some(Settime4::ServerTime) => node.time_access = stamp,
                    Some(Settime4::ClientTime(t)) => node.time_access = t,
                    None => {}
                }
                match set.time_modify {
                    Some(Settime4::ServerTime) => node.time_modify = stamp,
                    Some(Settime4::ClientTime(t)) => node.time_modify = t,
                    None => {}
                }
                if set.size.is_some() {
                    node.time_modify = stamp;
                }
                node.change += 1;
                node.time_metadata = stamp;
            });
            table.db.get_by_id(&id).cloned().ok_or(StoreError::Stale)?
        };
        self.entry_for(share, fs, &node)
    }

    async fn prepare_write(
        &self,
        share: &str,
        id: FileId,
        offset: u64,
        len: u64,
    ) -> StoreResult<()> {
        if offset.saturating_add(len) > MAX_FILE_SIZE {
            return Err(StoreError::TooBig);
        }
        let fs = self.fs(share)?;
        let mut table = fs.table.write().unwrap();
        if table.db.get_by_id(&id).is_none() {
            return Err(StoreError::Stale);
        }
        table.db.modify_by_id(&id, |node| node.pending_write = true);
        Ok(())
    }

    async fn commit_write(&self, share: &str, id: FileId) -> StoreResult<FileEntry> {
        let fs = self.fs(share)?;
        let node = {
            let mut table = fs.table.write().unwrap();
            if table.db.get_by_id(&id).is_none() {
                return Err(StoreError::Stale);
            }
            table.db.modify_by_id(&id, |node| node.pending_write = false);
            table.touch(id, true);
            table.db.get_by_id(&id).cloned().ok_or(StoreError::Stale)?
        };
        self.entry_for(share, fs, &node)
    }

    async fn flush_pending_write_for_file(&self, share: &str, id: FileId) -> StoreResult<()> {
        let fs = self.fs(share)?;
        let mut table = fs.table.write().unwrap();
        if table.db.get_by_id(&id).is_none() {
            return Err(StoreError::Stale);
        }
        table.db.modify_by_id(&id, |node| node.pending_write = false);
        Ok(())
    }
}

#[async_trait]
impl PayloadStore for VfsStore {
    async fn read_at(
        &self,
        share: &str,
        id: FileId,
        offset: u64,
        count: u32,
    ) -> StoreResult<(Vec<u8>, bool)> {
        let fs = self.fs(share)?;
        let node_path = self.node_path(fs, id)?;
        let path = self.vfs_path(fs, &node_path)?;
        let meta = path.metadata().map_err(|_| StoreError::Stale)?;
        if meta.file_type == vfs::VfsFileType::Directory {
            return Err(StoreError::IsDirectory);
        }
        if offset >= meta.len {
            return Ok((Vec::new(), true));
        }
        let mut file = path
            .open_file()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let wanted = count as u64;
        let available = meta.len - offset;
        let take = wanted.min(available);
        let mut data = vec![0u8; take as usize];
        file.read_exact(&mut data)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let eof = offset + take >= meta.len;
        Ok((data, eof))
    }

    async fn write_at(
        &self,
        share: &str,
        id: FileId,
        offset: u64,
        data: &[u8],
    ) -> StoreResult<u32> {
        if offset.saturating_add(data.len() as u64) > MAX_FILE_SIZE {
            return Err(StoreError::TooBig);
        }
        let fs = self.fs(share)?;
        let node_path = self.node_path(fs, id)?;
        let path = self.vfs_path(fs, &node_path)?;
        if path.is_dir().map_err(|e| StoreError::Io(e.to_string()))? {
            return Err(StoreError::IsDirectory);
        }
        // read-modify-write; the vfs layer has no positional writes
        let mut content = self.read_whole(&path)?;
        let end = offset as usize + data.len();
        if content.len() < end {
            content.resize(end, 0);
        }
        content[offset as usize..end].copy_from_slice(data);
        self.write_whole(&path, &content)?;
        fs.table.write().unwrap().touch(id, true);
        Ok(data.len() as u32)
    }

    async fn flush(&self, share: &str, id: FileId) -> StoreResult<()> {
        let fs = self.fs(share)?;
        let mut table = fs.table.write().unwrap();
        if table.db.get_by_id(&id).is_none() {
            return Err(StoreError::Stale);
        }
        table.db.modify_by_id(&id, |node| node.pending_write = false);
        Ok(())
    }
}
