//! YAML server configuration: the listening address, lease and grace
//! windows, and the set of exported shares.

use std::io::Write;
use std::path::PathBuf;

use keel::vfs::{AltrootFS, MemoryFS, PhysicalFS, VfsPath};
use keel::Share;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub bind: Option<String>,
    pub lease_seconds: Option<u64>,
    pub grace_seconds: Option<u64>,
    pub domain: Option<String>,
    /// Confirmed clients are persisted here for grace seeding.
    pub client_list: Option<PathBuf>,
    pub shares: Vec<ShareConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ShareConfig {
    pub name: String,
    /// Mount path inside the pseudo namespace; defaults to "/<name>".
    pub mount: Option<String>,
    /// Directory backing the share. Absent means an in-memory share.
    pub path: Option<PathBuf>,
    /// Files seeded into an in-memory share at startup.
    #[serde(default)]
    pub seed: Vec<SeedFile>,
}

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub name: String,
    #[serde(default)]
    pub contents: String,
}

impl ShareConfig {
    pub fn into_share(self) -> anyhow::Result<Share> {
        let mount = self
            .mount
            .clone()
            .unwrap_or_else(|| format!("/{}", self.name));
        let root: VfsPath = match &self.path {
            Some(path) => AltrootFS::new(VfsPath::new(PhysicalFS::new(path))).into(),
            None => {
                let root: VfsPath = MemoryFS::new().into();
                for seed in &self.seed {
                    let file = root.join(&seed.name)?;
                    if let Some(parent) = seed.name.rfind('/') {
                        root.join(&seed.name[..parent])?.create_dir_all()?;
                    }
                    file.create_file()?.write_all(seed.contents.as_bytes())?;
                }
                root
            }
        };
        Ok(Share::new(&self.name, &mount, root))
    }
}
