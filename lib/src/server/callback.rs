//! Server-to-client callback path: the CB_NULL probe launched after a
//! client confirms, CB_RECALL on delegation conflict, and batched
//! CB_NOTIFY flushes for directory watchers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use keel_proto::nfs4_proto::{
    CbRecall4args, NfsFh4, Notify4, Stateid4, OP_CB_NOTIFY, OP_CB_RECALL,
};
use keel_proto::rpc_proto::CbCompoundCall;
use keel_proto::xdr::{XdrEncode, XdrReader, XdrWriter};

use super::state::client::ClientCallback;
use super::state::delegation::{CallbackChannel, RecallDispatcher, RecallTarget};

/// How long a CB_NULL probe may take before the path counts as down.
pub const CB_NULL_TIMEOUT: Duration = Duration::from_secs(5);
/// Batch window for directory notifications.
pub const NOTIFY_BATCH_WINDOW: Duration = Duration::from_millis(50);

/// One directory event destined for CB_NOTIFY.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirNotification {
    pub kind: Notify4,
    /// Entry name for entry-level events; None for attr-change events.
    pub entry: Option<String>,
}

struct Watcher {
    callback: ClientCallback,
    stateid: Stateid4,
    dir_fh: NfsFh4,
    mask: u32,
    pending: Vec<DirNotification>,
}

enum NotifyCommand {
    Register {
        clientid: u64,
        dir_fh: NfsFh4,
        callback: ClientCallback,
        stateid: Stateid4,
        mask: u32,
    },
    Unregister {
        clientid: u64,
        dir_fh: NfsFh4,
    },
    Event {
        dir_fh: NfsFh4,
        notification: DirNotification,
    },
}

/// Builds RPC calls toward the client's advertised callback service.
pub struct CallbackClient {
    notify_tx: mpsc::UnboundedSender<NotifyCommand>,
    xid: AtomicU32,
    /// Watcher table shared with the flusher task.
    watchers: Arc<Mutex<HashMap<(u64, NfsFh4), Watcher>>>,
}

impl CallbackClient {
    pub fn new() -> Arc<Self> {
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
        let watchers: Arc<Mutex<HashMap<(u64, NfsFh4), Watcher>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let client = Arc::new(CallbackClient {
            notify_tx,
            xid: AtomicU32::new(1),
            watchers: watchers.clone(),
        });

        // notification batcher: drain commands, flush on a fixed window
        let flusher = client.clone();
        tokio::spawn(async move {
            let mut window = tokio::time::interval(NOTIFY_BATCH_WINDOW);
            loop {
                tokio::select! {
                    command = notify_rx.recv() => {
                        let Some(command) = command else { break };
                        let mut watchers = watchers.lock().await;
                        match command {
                            NotifyCommand::Register { clientid, dir_fh, callback, stateid, mask } => {
                                watchers.insert((clientid, dir_fh.clone()), Watcher {
                                    callback,
                                    stateid,
                                    dir_fh,
                                    mask,
                                    pending: Vec::new(),
                                });
                            }
                            NotifyCommand::Unregister { clientid, dir_fh } => {
                                watchers.remove(&(clientid, dir_fh));
                            }
                            NotifyCommand::Event { dir_fh, notification } => {
                                for watcher in watchers.values_mut() {
                                    if watcher.dir_fh == dir_fh
                                        && watcher.mask & (1 << notification.kind as u32) != 0
                                    {
                                        push_coalesced(&mut watcher.pending, notification.clone());
                                    }
                                }
                            }
                        }
                    }
                    _ = window.tick() => {
                        flusher.flush_notifications().await;
                    }
                }
            }
        });

        client
    }

    fn next_xid(&self) -> u32 {
        self.xid.fetch_add(1, Ordering::Relaxed)
    }

    /// Launches the asynchronous CB_NULL probe; on success the client's
    /// `cb_path_up` flips and delegations become grantable.
    pub fn probe_null(&self, callback: ClientCallback, cb_path_up: Arc<AtomicBool>) {
        let xid = self.next_xid();
        tokio::spawn(async move {
            match tokio::time::timeout(CB_NULL_TIMEOUT, call_null(&callback, xid)).await {
                Ok(Ok(())) => {
                    info!(raddr = %callback.raddr, "CB_NULL probe succeeded");
                    cb_path_up.store(true, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    warn!(raddr = %callback.raddr, "CB_NULL probe failed: {:?}", e);
                }
                Err(_) => {
                    warn!(raddr = %callback.raddr, "CB_NULL probe timed out");
                }
            }
        });
    }

    /// Registers a directory watcher for CB_NOTIFY batches.
    pub fn watch_directory(
        &self,
        clientid: u64,
        dir_fh: NfsFh4,
        callback: ClientCallback,
        stateid: Stateid4,
        mask: u32,
    ) {
        let _ = self.notify_tx.send(NotifyCommand::Register {
            clientid,
            dir_fh,
            callback,
            stateid,
            mask,
        });
    }

    pub fn unwatch_directory(&self, clientid: u64, dir_fh: NfsFh4) {
        let _ = self
            .notify_tx
            .send(NotifyCommand::Unregister { clientid, dir_fh });
    }

    /// Queues a directory event for the next batch flush.
    pub fn notify_dir_event(&self, dir_fh: NfsFh4, notification: DirNotification) {
        let _ = self.notify_tx.send(NotifyCommand::Event {
            dir_fh,
            notification,
        });
    }

    async fn flush_notifications(&self) {
        let batches: Vec<(ClientCallback, Stateid4, NfsFh4, Vec<DirNotification>)> = {
            let mut watchers = self.watchers.lock().await;
            watchers
                .values_mut()
                .filter(|watcher| !watcher.pending.is_empty())
                .map(|watcher| {
                    (
                        watcher.callback.clone(),
                        watcher.stateid,
                        watcher.dir_fh.clone(),
                        std::mem::take(&mut watcher.pending),
                    )
                })
                .collect()
        };
        for (callback, stateid, dir_fh, batch) in batches {
            let xid = self.next_xid();
            if let Err(e) = send_cb_notify(&callback, xid, &stateid, &dir_fh, &batch).await {
                warn!(raddr = %callback.raddr, "CB_NOTIFY flush failed: {:?}", e);
            }
        }
    }
}

impl RecallDispatcher for CallbackClient {
    fn dispatch_recall(&self, target: RecallTarget) {
        let xid = self.next_xid();
        tokio::spawn(async move {
            let callback = match &target.channel {
                CallbackChannel::Dialback(callback) => callback.clone(),
                CallbackChannel::Session(_) => {
                    // v4.1 backchannels ride a bound fore connection; a
                    // dial-back address is not available here
                    debug!(clientid = target.clientid, "session backchannel recall deferred to client poll");
                    return;
                }
            };
            match tokio::time::timeout(CB_NULL_TIMEOUT, send_cb_recall(&callback, xid, &target))
                .await
            {
                Ok(Ok(())) => {
                    info!(clientid = target.clientid, "CB_RECALL delivered");
                }
                Ok(Err(e)) => {
                    warn!(clientid = target.clientid, "CB_RECALL failed: {:?}", e);
                }
                Err(_) => {
                    warn!(clientid = target.clientid, "CB_RECALL timed out");
                }
            }
        });
    }
}

/// Coalesces compatible adjacent events: repeated attr-change events
/// collapse into one, entry-level events keep their order.
fn push_coalesced(pending: &mut Vec<DirNotification>, notification: DirNotification) {
    if notification.entry.is_none() {
        if let Some(last) = pending.last() {
            if last.kind == notification.kind && last.entry.is_none() {
                return;
            }
        }
    }
    pending.push(notification);
}

/// Parses a universal address "h1.h2.h3.h4.p1.p2" into host:port.
pub fn parse_universal_addr(raddr: &str) -> Option<std::net::SocketAddr> {
    let parts: Vec<&str> = raddr.split('.').collect();
    if parts.len() != 6 {
        return None;
    }
    let mut octets = [0u8; 4];
    for (idx, part) in parts[..4].iter().enumerate() {
        octets[idx] = part.parse().ok()?;
    }
    let hi: u16 = parts[4].parse().ok()?;
    let lo: u16 = parts[5].parse().ok()?;
    let port = (hi << 8) | lo;
    Some(std::net::SocketAddr::from((octets, port)))
}

async fn call_roundtrip(callback: &ClientCallback, body: Vec<u8>) -> anyhow::Result<()> {
    let Some(addr) = parse_universal_addr(&callback.raddr) else {
        anyhow::bail!("unparseable callback address {}", callback.raddr);
    };
    let mut stream = TcpStream::connect(addr).await?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&u32::to_be_bytes(body.len() as u32 | (1 << 31)));
    frame.extend_from_slice(&body);
    stream.write_all(&frame).await?;
    stream.flush().await?;

    // one record-marked reply; only the accept status matters
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let length = (u32::from_be_bytes(header) & !(1 << 31)) as usize;
    if length > 64 * 1024 {
        anyhow::bail!("oversized callback reply");
    }
    let mut reply = vec![0u8; length];
    stream.read_exact(&mut reply).await?;

    let mut reader = XdrReader::new(&reply);
    let _xid = reader.read_u32()?;
    let mtype = reader.read_u32()?;
    if mtype != 1 {
        anyhow::bail!("callback reply had message type {}", mtype);
    }
    let reply_stat = reader.read_u32()?;
    if reply_stat != 0 {
        anyhow::bail!("callback call denied");
    }
    Ok(())
}

async fn call_null(callback: &ClientCallback, xid: u32) -> anyhow::Result<()> {
    let call = CbCompoundCall {
        xid,
        program: callback.program,
        proc: 0,
        callback_ident: callback.callback_ident,
        tag: String::new(),
        minorversion: 0,
        ops: Vec::new(),
    };
    call_roundtrip(callback, call.to_bytes()).await
}

async fn send_cb_recall(
    callback: &ClientCallback,
    xid: u32,
    target: &RecallTarget,
) -> anyhow::Result<()> {
    let mut ops = XdrWriter::new();
    ops.write_u32(1); // one op
    ops.write_u32(OP_CB_RECALL);
    CbRecall4args {
        stateid: target.stateid,
        truncate: target.truncate,
        fh: target.fh.clone(),
    }
    .encode(&mut ops);

    let call = CbCompoundCall {
        xid,
        program: callback.program,
        proc: 1,
        callback_ident: callback.callback_ident,
        tag: String::new(),
        minorversion: 0,
        ops: ops.into_bytes(),
    };
    call_roundtrip(callback, call.to_bytes()).await
}

async fn send_cb_notify(
    callback: &ClientCallback,
    xid: u32,
    stateid: &Stateid4,
    dir_fh: &NfsFh4,
    batch: &[DirNotification],
) -> anyhow::Result<()> {
    let mut ops = XdrWriter::new();
    ops.write_u32(1);
    ops.write_u32(OP_CB_NOTIFY);
    stateid.encode(&mut ops);
    ops.write_opaque(dir_fh);
    ops.write_u32(batch.len() as u32);
    for notification in batch {
        ops.write_bitmap(&[1 << notification.kind as u32]);
        let mut body = XdrWriter::new();
        if let Some(entry) = &notification.entry {
            body.write_string(entry);
        }
        ops.write_opaque(body.as_slice());
    }

    let call = CbCompoundCall {
        xid,
        program: callback.program,
        proc: 1,
        callback_ident: callback.callback_ident,
        tag: String::new(),
        minorversion: 0,
        ops: ops.into_bytes(),
    };
    call_roundtrip(callback, call.to_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universal_addr_parsing() {
        let addr = parse_universal_addr("127.0.0.1.149.18").unwrap();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), (149 << 8) | 18);
        assert!(parse_universal_addr("not-an-addr").is_none());
        assert!(parse_universal_addr("1.2.3.4.5").is_none());
    }

    #[test]
    fn attr_events_coalesce_entry_events_keep_order() {
        let mut pending = Vec::new();
        let attrs = DirNotification {
            kind: Notify4::ChangeDirAttrs,
            entry: None,
        };
        push_coalesced(&mut pending, attrs.clone());
        push_coalesced(&mut pending, attrs.clone());
        push_coalesced(&mut pending, attrs.clone());
        assert_eq!(pending.len(), 1);

        push_coalesced(
            &mut pending,
            DirNotification {
                kind: Notify4::AddEntry,
                entry: Some("a".to_string()),
            },
        );
        push_coalesced(
            &mut pending,
            DirNotification {
                kind: Notify4::RemoveEntry,
                entry: Some("b".to_string()),
            },
        );
        // a repeated attr event after entry events starts a new run
        push_coalesced(&mut pending, attrs.clone());
        push_coalesced(&mut pending, attrs);

        let kinds: Vec<Notify4> = pending.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                Notify4::ChangeDirAttrs,
                Notify4::AddEntry,
                Notify4::RemoveEntry,
                Notify4::ChangeDirAttrs
            ]
        );
        assert_eq!(pending[1].entry.as_deref(), Some("a"));
        assert_eq!(pending[2].entry.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn cb_null_probe_against_listener() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // a minimal callback service answering any call with success
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut header = [0u8; 4];
            stream.read_exact(&mut header).await.unwrap();
            let length = (u32::from_be_bytes(header) & !(1 << 31)) as usize;
            let mut call = vec![0u8; length];
            stream.read_exact(&mut call).await.unwrap();
            let xid = u32::from_be_bytes(call[..4].try_into().unwrap());

            let mut reply = XdrWriter::new();
            reply.write_u32(xid);
            reply.write_u32(1); // REPLY
            reply.write_u32(0); // MSG_ACCEPTED
            reply.write_u32(0); // AUTH_NONE verf
            reply.write_u32(0);
            reply.write_u32(0); // SUCCESS
            let body = reply.into_bytes();
            let mut frame = Vec::new();
            frame.extend_from_slice(&u32::to_be_bytes(body.len() as u32 | (1 << 31)));
            frame.extend_from_slice(&body);
            stream.write_all(&frame).await.unwrap();
        });

        let callback = ClientCallback {
            program: 0x40000000,
            rnetid: "tcp".to_string(),
            raddr: format!("127.0.0.1.{}.{}", port >> 8, port & 0xff),
            callback_ident: 1,
        };
        call_null(&callback, 7).await.unwrap();
    }
}
