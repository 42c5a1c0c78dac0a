//! Per-compound request context threaded through the operation handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::error;

use keel_proto::nfs4_proto::{NfsFh4, NfsStat4};
use keel_proto::rpc_proto::{AuthUnix, OpaqueAuth};

use super::callback::CallbackClient;
use super::filemanager::{FileManager, FsObject};
use super::state::session::Session;
use super::state::StateManager;

/// AUTH_SYS identity of the caller; AUTH_NONE maps to nobody.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub uid: u32,
    pub gid: u32,
    pub gids: Vec<u32>,
    pub machinename: Option<String>,
}

impl AuthContext {
    pub fn nobody() -> Self {
        AuthContext {
            uid: 65534,
            gid: 65534,
            gids: Vec::new(),
            machinename: None,
        }
    }

    pub fn from_cred(cred: &OpaqueAuth) -> Self {
        match cred {
            OpaqueAuth::AuthUnix(AuthUnix {
                machinename,
                uid,
                gid,
                gids,
                ..
            }) => AuthContext {
                uid: *uid,
                gid: *gid,
                gids: gids.clone(),
                machinename: Some(machinename.clone()),
            },
            _ => AuthContext::nobody(),
        }
    }
}

/// Session context attached after a valid SEQUENCE.
#[derive(Clone)]
pub struct V41Context {
    pub session: Arc<Session>,
    pub slotid: u32,
    pub cachethis: bool,
}

/// State shared by the operations of one COMPOUND: the filehandle pair,
/// the manager handles, and the v4.1 session context.
pub struct NfsRequest {
    client_addr: String,
    pub conn_id: u64,
    current_fh: Option<FsObject>,
    saved_fh: Option<FsObject>,
    state: Arc<StateManager>,
    fmanager: Arc<FileManager>,
    callbacks: Arc<CallbackClient>,
    pub auth: AuthContext,
    /// v4.1 compounds bypass the per-owner seqid checks.
    pub skip_owner_seqid: bool,
    pub v41: Option<V41Context>,
    /// Set while the connection is being drained; SEQUENCE answers and
    /// the compound finishes with DELAY.
    pub draining: Arc<AtomicBool>,
    pub request_time: u64,
}

impl NfsRequest {
    pub fn new(
        client_addr: String,
        conn_id: u64,
        state: Arc<StateManager>,
        fmanager: Arc<FileManager>,
        callbacks: Arc<CallbackClient>,
        auth: AuthContext,
        draining: Arc<AtomicBool>,
    ) -> Self {
        let request_time = std::time::UNIX_EPOCH
            .elapsed()
            .unwrap_or_default()
            .as_secs();
        NfsRequest {
            client_addr,
            conn_id,
            current_fh: None,
            saved_fh: None,
            state,
            fmanager,
            callbacks,
            auth,
            skip_owner_seqid: false,
            v41: None,
            draining,
            request_time,
        }
    }

    pub fn client_addr(&self) -> &str {
        &self.client_addr
    }

    pub fn state_manager(&self) -> Arc<StateManager> {
        self.state.clone()
    }

    pub fn file_manager(&self) -> Arc<FileManager> {
        self.fmanager.clone()
    }

    pub fn callback_client(&self) -> Arc<CallbackClient> {
        self.callbacks.clone()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    pub fn current_filehandle(&self) -> Option<&FsObject> {
        self.current_fh.as_ref()
    }

    pub fn current_filehandle_bytes(&self) -> Option<NfsFh4> {
        self.current_fh.as_ref().map(|obj| obj.handle())
    }

    pub fn saved_filehandle(&self) -> Option<&FsObject> {
        self.saved_fh.as_ref()
    }

    pub fn set_filehandle(&mut self, obj: FsObject) {
        self.current_fh = Some(obj);
    }

    pub fn unset_filehandle(&mut self) {
        self.current_fh = None;
    }

    /// SAVEFH: copy, never alias.
    pub fn save_filehandle(&mut self) -> Result<(), NfsStat4> {
        match &self.current_fh {
            Some(obj) => {
                self.saved_fh = Some(obj.clone());
                Ok(())
            }
            None => Err(NfsStat4::Nfs4errNofilehandle),
        }
    }

    /// RESTOREFH: the saved handle becomes current, and stays saved.
    pub fn restore_filehandle(&mut self) -> Result<(), NfsStat4> {
        match &self.saved_fh {
            Some(obj) => {
                self.current_fh = Some(obj.clone());
                Ok(())
            }
            None => Err(NfsStat4::Nfs4errRestorefh),
        }
    }

    /// Resolves raw handle bytes and makes the result current.
    pub async fn set_filehandle_bytes(&mut self, fh: &[u8]) -> Result<(), NfsStat4> {
        match self.fmanager.resolve_handle(fh).await {
            Ok(obj) => {
                self.current_fh = Some(obj);
                Ok(())
            }
            Err(status) => {
                error!(?status, "could not resolve filehandle");
                Err(status)
            }
        }
    }
}
