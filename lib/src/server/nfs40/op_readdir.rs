use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{
    filemanager::FsObject, operation::NfsOperation, request::NfsRequest, response::NfsOpResponse,
};

use keel_proto::nfs4_proto::{
    DirList4, Entry4, NfsResOp4, NfsStat4, ReadDir4res, ReadDir4resok, Readdir4args,
};
use keel_proto::xdr::{XdrEncode, XdrWriter};

/// Cookie values 0, 1 and 2 are reserved by the protocol; real entries
/// start at 3.
const FIRST_COOKIE: u64 = 3;

#[async_trait]
impl NfsOperation for Readdir4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.24
        debug!(
            "Operation 26: READDIR - Read Directory, cookie {} maxcount {}",
            self.cookie, self.maxcount
        );
        let Some(current) = request.current_filehandle().cloned() else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        };
        if self.cookie == 1 || self.cookie == 2 {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errBadCookie,
            };
        }

        let state = request.state_manager();
        let cookieverf = state.boot_verifier();
        // a continued listing must carry the verifier we handed out
        if self.cookie >= FIRST_COOKIE && self.cookieverf != cookieverf {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errBadCookie,
            };
        }

        let fmanager = request.file_manager();
        let listing: Result<Vec<(String, FsObject)>, NfsStat4> = match &current {
            FsObject::Pseudo(node) => Ok(fmanager
                .pseudo
                .children(&node.path)
                .into_iter()
                .map(|child| (child.name.clone(), FsObject::Pseudo(child)))
                .collect()),
            FsObject::Real(entry) if !entry.is_dir() => Err(NfsStat4::Nfs4errNotdir),
            FsObject::Real(entry) => fmanager
                .metadata
                .read_dir(&entry.share, entry.id)
                .await
                .map(|entries| {
                    entries
                        .into_iter()
                        .map(|(name, child)| (name, FsObject::Real(child)))
                        .collect()
                })
                .map_err(|e| e.nfs_status()),
        };
        let listing = match listing {
            Ok(listing) => listing,
            Err(status) => {
                error!(?status, "readdir failed");
                return NfsOpResponse {
                    request,
                    result: None,
                    status,
                };
            }
        };

        let skip = if self.cookie >= FIRST_COOKIE {
            (self.cookie - FIRST_COOKIE + 1) as usize
        } else {
            0
        };

        let mut entries = Vec::new();
        let mut eof = true;
        // maxcount bounds the whole encoded result, dircount the
        // name/cookie portion
        let mut used_bytes = 128usize;
        let mut used_dircount = 0usize;
        for (idx, (name, obj)) in listing.iter().enumerate().skip(skip) {
            let attrs = fmanager.fattr_for(obj, &self.attr_request);
            let entry = Entry4 {
                cookie: FIRST_COOKIE + idx as u64,
                name: name.clone(),
                attrs,
            };
            let mut probe = XdrWriter::new();
            probe.write_u64(entry.cookie);
            probe.write_string(&entry.name);
            entry.attrs.encode(&mut probe);
            let entry_bytes = probe.len() + 4;

            let dircount_bytes = 8 + 4 + name.len();
            if !entries.is_empty()
                && (used_bytes + entry_bytes > self.maxcount as usize
                    || (self.dircount > 0
                        && used_dircount + dircount_bytes > self.dircount as usize))
            {
                eof = false;
                break;
            }
            used_bytes += entry_bytes;
            used_dircount += dircount_bytes;
            entries.push(entry);
        }
        if entries.is_empty() && !listing.is_empty() && skip < listing.len() {
            // not even one entry fit
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errToosmall,
            };
        }

        NfsOpResponse {
            request,
            result: Some(NfsResOp4::OpReaddir(ReadDir4res::Resok4(ReadDir4resok {
                cookieverf,
                reply: DirList4 { entries, eof },
            }))),
            status: NfsStat4::Nfs4Ok,
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::server::nfs40::test_support::TestEnv;
    use crate::server::store::MetadataStore;
    use keel_proto::attr::{FileAttr, FileAttrList};
    use tracing_test::traced_test;

    fn readdir_args(cookie: u64, cookieverf: [u8; 8], maxcount: u32) -> Readdir4args {
        Readdir4args {
            cookie,
            cookieverf,
            dircount: 1024,
            maxcount,
            attr_request: FileAttrList::new(vec![FileAttr::Type, FileAttr::Fileid]),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn listing_with_continuation() {
        let env = TestEnv::new();
        let root = env.store.share_root("export").await.unwrap();
        for name in ["a.txt", "b.txt", "c.txt", "d.txt"] {
            env.store
                .create_file("export", root.id, name, 0o644, None)
                .await
                .unwrap();
        }

        // a small maxcount forces paging
        let request = env.share_root_request().await;
        let response = readdir_args(0, [0; 8], 220).execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        let (verf, first) = match response.result.unwrap() {
            NfsResOp4::OpReaddir(ReadDir4res::Resok4(ok)) => (ok.cookieverf, ok.reply),
            other => panic!("unexpected {:?}", other),
        };
        assert!(!first.eof);
        assert!(!first.entries.is_empty());

        // continue from the last cookie with the same verifier
        let next_cookie = first.entries.last().unwrap().cookie;
        let request = env.share_root_request().await;
        let response = readdir_args(next_cookie, verf, 4096).execute(request).await;
        let second = match response.result.unwrap() {
            NfsResOp4::OpReaddir(ReadDir4res::Resok4(ok)) => ok.reply,
            other => panic!("unexpected {:?}", other),
        };
        assert!(second.eof);
        let mut all: Vec<String> = first
            .entries
            .iter()
            .chain(second.entries.iter())
            .map(|e| e.name.clone())
            .collect();
        all.sort();
        assert_eq!(all, vec!["a.txt", "b.txt", "c.txt", "d.txt"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn stale_cookieverf_is_bad_cookie() {
        let env = TestEnv::new();
        let root = env.store.share_root("export").await.unwrap();
        env.store
            .create_file("export", root.id, "x", 0o644, None)
            .await
            .unwrap();
        let request = env.share_root_request().await;
        let response = readdir_args(5, [9; 8], 4096).execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errBadCookie);
    }

    #[tokio::test]
    #[traced_test]
    async fn pseudo_directory_lists_children() {
        let env = TestEnv::new();
        let mut request = env.request();
        request.set_filehandle(FsObject::Pseudo(env.fmanager.pseudo.root()));
        let response = readdir_args(0, [0; 8], 4096).execute(request).await;
        let listing = match response.result.unwrap() {
            NfsResOp4::OpReaddir(ReadDir4res::Resok4(ok)) => ok.reply,
            other => panic!("unexpected {:?}", other),
        };
        assert!(listing.eof);
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].name, "export");
    }
}
