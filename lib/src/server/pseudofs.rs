//! Pseudo filesystem: a virtual directory tree over the configured share
//! mount paths. Terminal components are junctions; a LOOKUP that lands on
//! one crosses into the real share namespace by swapping the current
//! filehandle for the share's root handle.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::RwLock;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use keel_proto::nfs4_proto::{NfsFh4, NFS4_FHSIZE};

const PSEUDO_FH_PREFIX: &[u8] = b"pseudofs:";
/// Marker after the prefix for handles too long to carry their path.
const PSEUDO_FH_HASHED: u8 = 0x00;

/// One share advertised through the pseudo tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShareMount {
    /// Share name as the metadata store knows it.
    pub name: String,
    /// Absolute mount path inside the pseudo namespace, e.g. "/export".
    pub mount: String,
}

impl ShareMount {
    pub fn new(name: &str, mount: &str) -> Self {
        ShareMount {
            name: name.to_string(),
            mount: mount.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PseudoNode {
    /// Absolute pseudo path, "/" for the root.
    pub path: String,
    pub name: String,
    pub children: Vec<String>,
    /// Set when this node is the terminal component of a share path.
    pub junction: Option<String>,
    pub fileid: u64,
    pub change: u64,
}

impl PseudoNode {
    pub fn handle(&self) -> NfsFh4 {
        encode_pseudo_handle(&self.path)
    }

    pub fn is_junction(&self) -> bool {
        self.junction.is_some()
    }
}

struct PseudoTree {
    nodes: HashMap<String, PseudoNode>,
    /// Reverse map for handles that had to be hashed.
    hashed: HashMap<[u8; 32], String>,
    change: u64,
}

impl PseudoTree {
    fn build(mounts: &[ShareMount], change: u64) -> Self {
        let mut nodes: HashMap<String, PseudoNode> = HashMap::new();
        let mut hashed = HashMap::new();
        nodes.insert("/".to_string(), PseudoNode {
            path: "/".to_string(),
            name: "".to_string(),
            children: Vec::new(),
            junction: None,
            fileid: path_fileid("/"),
            change,
        });

        for mount in mounts {
            let components: Vec<&str> = mount
                .mount
                .split('/')
                .filter(|c| !c.is_empty())
                .collect();
            if components.is_empty() {
                warn!(share = %mount.name, "share mounted at the pseudo root is ignored");
                continue;
            }
            let mut parent = "/".to_string();
            for (idx, component) in components.iter().enumerate() {
                let path = if parent == "/" {
                    format!("/{}", component)
                } else {
                    format!("{}/{}", parent, component)
                };
                let terminal = idx == components.len() - 1;
                let node = nodes.entry(path.clone()).or_insert_with(|| PseudoNode {
                    path: path.clone(),
                    name: component.to_string(),
                    children: Vec::new(),
                    junction: None,
                    fileid: path_fileid(&path),
                    change,
                });
                if terminal {
                    node.junction = Some(mount.name.clone());
                }
                let parent_node = nodes.get_mut(&parent).unwrap();
                if !parent_node.children.contains(&component.to_string()) {
                    parent_node.children.push(component.to_string());
                }
                parent = path;
            }
        }

        for node in nodes.values() {
            if encode_pseudo_handle(&node.path).len() > NFS4_FHSIZE {
                // unreachable with the hashed fallback, kept as a guard
                warn!(path = %node.path, "pseudo handle exceeds handle limit");
            }
            if PSEUDO_FH_PREFIX.len() + node.path.len() > NFS4_FHSIZE {
                hashed.insert(path_digest(&node.path), node.path.clone());
            }
        }

        PseudoTree {
            nodes,
            hashed,
            change,
        }
    }
}

/// The process-wide pseudo tree, rebuildable when the share set changes.
pub struct PseudoFs {
    inner: RwLock<PseudoTree>,
}

impl PseudoFs {
    pub fn new(mounts: &[ShareMount]) -> Self {
        debug!(?mounts, "building pseudo fs");
        PseudoFs {
            inner: RwLock::new(PseudoTree::build(mounts, 1)),
        }
    }

    /// Replaces the tree. Nodes whose paths survive keep their handles;
    /// the root change id bumps so clients revalidate.
    pub fn rebuild(&self, mounts: &[ShareMount]) {
        let mut inner = self.inner.write().unwrap();
        let change = inner.change + 1;
        *inner = PseudoTree::build(mounts, change);
        debug!(change, "rebuilt pseudo fs");
    }

    pub fn change_id(&self) -> u64 {
        self.inner.read().unwrap().change
    }

    pub fn root(&self) -> PseudoNode {
        self.inner.read().unwrap().nodes.get("/").unwrap().clone()
    }

    pub fn node(&self, path: &str) -> Option<PseudoNode> {
        self.inner.read().unwrap().nodes.get(path).cloned()
    }

    pub fn node_for_handle(&self, handle: &[u8]) -> Option<PseudoNode> {
        let rest = handle.strip_prefix(PSEUDO_FH_PREFIX)?;
        let inner = self.inner.read().unwrap();
        if rest.first() == Some(&PSEUDO_FH_HASHED) {
            let digest: [u8; 32] = rest[1..].try_into().ok()?;
            let path = inner.hashed.get(&digest)?;
            inner.nodes.get(path).cloned()
        } else {
            let path = std::str::from_utf8(rest).ok()?;
            inner.nodes.get(path).cloned()
        }
    }

    pub fn lookup(&self, dir: &str, name: &str) -> Option<PseudoNode> {
        let child = if dir == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", dir, name)
        };
        self.node(&child)
    }

    /// The junction node advertising `share`, if the share is mounted.
    pub fn junction_for(&self, share: &str) -> Option<PseudoNode> {
        let inner = self.inner.read().unwrap();
        inner
            .nodes
            .values()
            .find(|node| node.junction.as_deref() == Some(share))
            .cloned()
    }

    /// The parent of the root is the root.
    pub fn parent(&self, path: &str) -> PseudoNode {
        let parent_path = match path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
        };
        self.node(&parent_path).unwrap_or_else(|| self.root())
    }

    pub fn children(&self, path: &str) -> Vec<PseudoNode> {
        let inner = self.inner.read().unwrap();
        match inner.nodes.get(path) {
            Some(node) => node
                .children
                .iter()
                .filter_map(|name| {
                    let child = if path == "/" {
                        format!("/{}", name)
                    } else {
                        format!("{}/{}", path, name)
                    };
                    inner.nodes.get(&child).cloned()
                })
                .collect(),
            None => Vec::new(),
        }
    }
}

pub fn is_pseudo_handle(handle: &[u8]) -> bool {
    handle.starts_with(PSEUDO_FH_PREFIX)
}

pub fn encode_pseudo_handle(path: &str) -> NfsFh4 {
    let mut handle = PSEUDO_FH_PREFIX.to_vec();
    if PSEUDO_FH_PREFIX.len() + path.len() > NFS4_FHSIZE {
        handle.push(PSEUDO_FH_HASHED);
        handle.extend_from_slice(&path_digest(path));
    } else {
        handle.extend_from_slice(path.as_bytes());
    }
    handle
}

fn path_digest(path: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.finalize().into()
}

fn path_fileid(path: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    "pseudofs".hash(&mut hasher);
    path.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_share_fs() -> PseudoFs {
        PseudoFs::new(&[
            ShareMount::new("export", "/export"),
            ShareMount::new("backup", "/srv/backup"),
        ])
    }

    #[test]
    fn tree_shape() {
        let fs = two_share_fs();
        let root = fs.root();
        assert_eq!(root.path, "/");
        let mut names = root.children.clone();
        names.sort();
        assert_eq!(names, vec!["export", "srv"]);

        let export = fs.lookup("/", "export").unwrap();
        assert_eq!(export.junction.as_deref(), Some("export"));

        let srv = fs.lookup("/", "srv").unwrap();
        assert!(srv.junction.is_none());
        let backup = fs.lookup("/srv", "backup").unwrap();
        assert_eq!(backup.junction.as_deref(), Some("backup"));
    }

    #[test]
    fn root_parent_is_root() {
        let fs = two_share_fs();
        let parent = fs.parent("/");
        assert_eq!(parent.path, "/");
        let parent = fs.parent("/srv/backup");
        assert_eq!(parent.path, "/srv");
    }

    #[test]
    fn handles_roundtrip_and_carry_prefix() {
        let fs = two_share_fs();
        let export = fs.lookup("/", "export").unwrap();
        let handle = export.handle();
        assert!(is_pseudo_handle(&handle));
        assert!(handle.starts_with(b"pseudofs:"));
        let resolved = fs.node_for_handle(&handle).unwrap();
        assert_eq!(resolved.path, "/export");
    }

    #[test]
    fn long_paths_hash_within_handle_limit() {
        let deep = format!("/{}", "d/".repeat(90));
        let mount = ShareMount::new("deep", deep.trim_end_matches('/'));
        let fs = PseudoFs::new(&[mount]);
        let mut node = fs.root();
        while !node.is_junction() {
            let name = node.children[0].clone();
            node = fs.lookup(&node.path, &name).unwrap();
        }
        let handle = node.handle();
        assert!(handle.len() <= NFS4_FHSIZE);
        let resolved = fs.node_for_handle(&handle).unwrap();
        assert_eq!(resolved.path, node.path);
    }

    #[test]
    fn rebuild_keeps_surviving_handles_and_bumps_change() {
        let fs = two_share_fs();
        let before = fs.change_id();
        let export_handle = fs.lookup("/", "export").unwrap().handle();

        fs.rebuild(&[
            ShareMount::new("export", "/export"),
            ShareMount::new("media", "/media"),
        ]);

        assert!(fs.change_id() > before);
        let resolved = fs.node_for_handle(&export_handle).unwrap();
        assert_eq!(resolved.path, "/export");
        assert!(fs.node("/srv").is_none());
    }

    #[test]
    fn unknown_handle_is_none() {
        let fs = two_share_fs();
        assert!(fs.node_for_handle(b"pseudofs:/missing").is_none());
        assert!(fs.node_for_handle(b"bogus").is_none());
    }
}
