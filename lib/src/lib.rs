//! keel: a userspace NFSv4.0 / NFSv4.1 server core.
//!
//! The library wires the wire layer (`keel-proto`) to a metadata/payload
//! store façade and exposes a builder that serves the configured shares
//! over TCP.

pub mod server;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use tokio::net::TcpListener;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::{error, info, span, trace, warn, Instrument, Level};

pub use vfs;
pub use vfs::VfsPath;

use keel_proto::rpc_proto::{AcceptBody, ReplyBody, RpcReplyMsg};
use keel_proto::NfsRpcCodec;

use server::callback::CallbackClient;
use server::filemanager::FileManager;
use server::metrics::ServerMetrics;
use server::pseudofs::{PseudoFs, ShareMount};
use server::request::{AuthContext, NfsRequest};
use server::state::persist::{read_client_list, write_client_list};
use server::state::{StateConfig, StateManager};
use server::store::{IdentityMapper, NumericIdentityMapper, VfsStore};
use server::NFSService;

/// One exported share: its name, the mount path inside the pseudo
/// namespace, and the vfs root backing it.
pub struct Share {
    pub name: String,
    pub mount: String,
    pub root: VfsPath,
}

impl Share {
    pub fn new(name: &str, mount: &str, root: VfsPath) -> Self {
        Share {
            name: name.to_string(),
            mount: mount.to_string(),
            root,
        }
    }
}

/// A configured server, ready to run. The state manager and its timer
/// tasks come to life inside [`NFSServer::serve`], on the runtime that
/// will drive them.
pub struct NFSServer {
    bind: String,
    shares: Vec<Share>,
    lease_duration: Duration,
    grace_duration: Duration,
    domain: String,
    client_list: Option<PathBuf>,
}

impl NFSServer {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Start the server and serve until ctrl-c. This builds its own
    /// tokio runtime.
    pub fn start(self) {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(self.serve());
    }

    /// Serve on the configured address until shutdown.
    pub async fn serve(self) {
        let mounts: Vec<ShareMount> = self
            .shares
            .iter()
            .map(|share| ShareMount::new(&share.name, &share.mount))
            .collect();
        let pseudo = Arc::new(PseudoFs::new(&mounts));
        let store = Arc::new(VfsStore::new(
            self.shares
                .into_iter()
                .map(|share| (share.name, share.root))
                .collect(),
        ));
        let identity: Arc<dyn IdentityMapper> = Arc::new(NumericIdentityMapper::new(&self.domain));
        let fmanager = FileManager::new(
            store.clone(),
            store,
            identity,
            pseudo,
            self.lease_duration.as_secs() as u32,
        );
        let callbacks = CallbackClient::new();
        let metrics = Arc::new(ServerMetrics::new());
        let state = StateManager::start(
            StateConfig {
                lease_duration: self.lease_duration,
                grace_duration: self.grace_duration,
            },
            callbacks.clone(),
            metrics,
        );
        let service = NFSService::new();
        let draining = Arc::new(AtomicBool::new(false));

        // previously confirmed clients seed the grace period
        if let Some(path) = &self.client_list {
            match read_client_list(path) {
                Ok(clients) if !clients.is_empty() => {
                    info!(clients = clients.len(), "seeding grace from persisted clients");
                    state.seed_grace(clients).await;
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("could not read persisted client list: {:?}", e),
            }
        }

        let listener = match TcpListener::bind(&self.bind).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(bind = %self.bind, "could not bind: {:?}", e);
                return;
            }
        };
        info!(bind = %self.bind, "server listening");

        let conn_seq = AtomicU64::new(1);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let _ = stream.set_nodelay(true);
                            let conn_id = conn_seq.fetch_add(1, Ordering::Relaxed);
                            info!(%addr, conn_id, "client connected");
                            let service = service.clone();
                            let state = state.clone();
                            let fmanager = fmanager.clone();
                            let callbacks = callbacks.clone();
                            let draining = draining.clone();
                            let span = span!(Level::TRACE, "client", %addr);
                            tokio::spawn(
                                async move {
                                    serve_connection(
                                        stream, addr.to_string(), conn_id, service, state,
                                        fmanager, callbacks, draining,
                                    )
                                    .await;
                                }
                                .instrument(span),
                            );
                        }
                        Err(e) => error!("couldn't accept client: {:?}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested, draining");
                    draining.store(true, Ordering::Relaxed);
                    break;
                }
            }
        }

        // give in-flight compounds a moment to answer DELAY
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Some(path) = &self.client_list {
            let clients = state.persisted_client_ids().await;
            if let Err(e) = write_client_list(path, &clients) {
                warn!("could not persist client list: {:?}", e);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn serve_connection(
    stream: tokio::net::TcpStream,
    addr: String,
    conn_id: u64,
    service: NFSService,
    state: Arc<StateManager>,
    fmanager: Arc<FileManager>,
    callbacks: Arc<CallbackClient>,
    draining: Arc<AtomicBool>,
) {
    let mut transport = Framed::new(stream, NfsRpcCodec::new());

    loop {
        let msg = transport.next().await;
        match msg {
            Some(Ok(msg)) => {
                let auth = AuthContext::from_cred(&msg.call.cred);
                let request = NfsRequest::new(
                    addr.clone(),
                    conn_id,
                    state.clone(),
                    fmanager.clone(),
                    callbacks.clone(),
                    auth,
                    draining.clone(),
                );
                let (request, reply) = service.call(msg, request).await;
                drop(request);
                match transport.send(reply).await {
                    Ok(_) => trace!("response sent"),
                    Err(e) => {
                        error!("couldn't send response: {:?}", e);
                        break;
                    }
                }
            }
            Some(Err(e)) => {
                error!("couldn't read message: {:?}", e);
                let reply = Box::new(RpcReplyMsg {
                    xid: 0,
                    body: ReplyBody::accepted(AcceptBody::GarbageArgs),
                });
                if transport.send(reply).await.is_err() {
                    break;
                }
            }
            None => {
                info!(%addr, "client disconnected");
                break;
            }
        }
    }
}

pub struct ServerBuilder {
    bind: String,
    shares: Vec<Share>,
    lease_duration: Duration,
    grace_duration: Duration,
    domain: String,
    client_list: Option<PathBuf>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        ServerBuilder {
            bind: "127.0.0.1:11112".to_string(),
            shares: Vec::new(),
            lease_duration: Duration::from_secs(60),
            grace_duration: Duration::from_secs(90),
            domain: "localdomain".to_string(),
            client_list: None,
        }
    }

    pub fn bind(mut self, bind: &str) -> Self {
        self.bind = bind.to_string();
        self
    }

    pub fn share(mut self, share: Share) -> Self {
        self.shares.push(share);
        self
    }

    pub fn lease_seconds(mut self, seconds: u64) -> Self {
        self.lease_duration = Duration::from_secs(seconds);
        self
    }

    pub fn grace_seconds(mut self, seconds: u64) -> Self {
        self.grace_duration = Duration::from_secs(seconds);
        self
    }

    pub fn identity_domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_string();
        self
    }

    /// File the confirmed-client list is persisted to across restarts.
    pub fn client_list(mut self, path: PathBuf) -> Self {
        self.client_list = Some(path);
        self
    }

    pub fn build(self) -> NFSServer {
        NFSServer {
            bind: self.bind,
            shares: self.shares,
            lease_duration: self.lease_duration,
            grace_duration: self.grace_duration,
            domain: self.domain,
            client_list: self.client_list,
        }
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        ServerBuilder::new()
    }
}
