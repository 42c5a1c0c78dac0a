//! Persisted client list. On clean shutdown the server writes the owner
//! ids of every confirmed client; on the next boot the list seeds the
//! grace period. The encoding is the XDR writer, so the format is
//! byte-stable across restarts of the same binary.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use keel_proto::xdr::{XdrReader, XdrWriter};

const CLIENT_LIST_MAGIC: u32 = 0x4b434c31; // "KCL1"

pub fn write_client_list(path: &Path, ids: &[Vec<u8>]) -> io::Result<()> {
    let mut writer = XdrWriter::new();
    writer.write_u32(CLIENT_LIST_MAGIC);
    writer.write_u32(ids.len() as u32);
    for id in ids {
        writer.write_opaque(id);
    }
    fs::write(path, writer.into_bytes())?;
    debug!(clients = ids.len(), ?path, "wrote persisted client list");
    Ok(())
}

pub fn read_client_list(path: &Path) -> io::Result<Vec<Vec<u8>>> {
    let bytes = fs::read(path)?;
    let mut reader = XdrReader::new(&bytes);
    let bad = |_| io::Error::new(io::ErrorKind::InvalidData, "corrupt client list");
    if reader.read_u32().map_err(bad)? != CLIENT_LIST_MAGIC {
        warn!(?path, "client list has wrong magic, ignoring");
        return Ok(Vec::new());
    }
    let count = reader.read_u32().map_err(bad)?;
    let mut ids = Vec::with_capacity(count as usize);
    for _ in 0..count {
        ids.push(reader.read_opaque().map_err(bad)?);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn scratch_file(name: &str) -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "keel-clients-{}-{}-{}",
            std::process::id(),
            name,
            n
        ))
    }

    #[test]
    fn roundtrip() {
        let path = scratch_file("roundtrip");
        let ids = vec![b"client-one".to_vec(), b"client-two".to_vec()];
        write_client_list(&path, &ids).unwrap();
        let read = read_client_list(&path).unwrap();
        assert_eq!(read, ids);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn empty_list() {
        let path = scratch_file("empty");
        write_client_list(&path, &[]).unwrap();
        assert!(read_client_list(&path).unwrap().is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn wrong_magic_is_ignored() {
        let path = scratch_file("magic");
        fs::write(&path, [1, 2, 3, 4, 0, 0, 0, 0]).unwrap();
        assert!(read_client_list(&path).unwrap().is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn byte_stable_encoding() {
        let path_a = scratch_file("stable-a");
        let path_b = scratch_file("stable-b");
        let ids = vec![b"alpha".to_vec(), b"beta".to_vec()];
        write_client_list(&path_a, &ids).unwrap();
        write_client_list(&path_b, &ids).unwrap();
        assert_eq!(fs::read(&path_a).unwrap(), fs::read(&path_b).unwrap());
        let _ = fs::remove_file(&path_a);
        let _ = fs::remove_file(&path_b);
    }
}
