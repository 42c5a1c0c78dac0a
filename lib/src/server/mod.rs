pub mod callback;
pub mod filemanager;
pub mod metrics;
pub mod nfs40;
pub mod nfs41;
pub mod operation;
pub mod pseudofs;
pub mod request;
pub mod response;
pub mod state;
pub mod store;

use tracing::{debug, error};

use keel_proto::nfs4_proto::{Compound4res, CompoundHeader, NfsStat4};
use keel_proto::rpc_proto::{
    AcceptBody, MismatchInfo, ReplyBody, RpcCallMsg, RpcReplyMsg, NFS4_PROGRAM, NFS_PROC_COMPOUND,
    NFS_PROC_NULL, NFS_V4, RPC_VERSION,
};
use keel_proto::xdr::{XdrDecode, XdrEncode, XdrReader, XdrWriter};

use nfs40::NFS40Server;
use nfs41::NFS41Server;
use request::NfsRequest;

/// Minor versions served by this process.
pub const MIN_MINOR_VERSION: u32 = 0;
pub const MAX_MINOR_VERSION: u32 = 1;

/// The service facade: RPC program checks, COMPOUND header decode, and
/// routing to the per-minor-version dispatcher.
#[derive(Clone, Debug, Default)]
pub struct NFSService {
    v40: NFS40Server,
    v41: NFS41Server,
}

impl NFSService {
    pub fn new() -> Self {
        NFSService {
            v40: NFS40Server::new(),
            v41: NFS41Server::new(),
        }
    }

    pub async fn call(&self, msg: RpcCallMsg, request: NfsRequest) -> (NfsRequest, Box<RpcReplyMsg>) {
        let xid = msg.xid;
        let call = &msg.call;
        if call.rpcvers != RPC_VERSION {
            return (
                request,
                Box::new(RpcReplyMsg {
                    xid,
                    body: ReplyBody::MsgDenied(keel_proto::rpc_proto::RejectedReply::RpcMismatch(
                        MismatchInfo {
                            low: RPC_VERSION,
                            high: RPC_VERSION,
                        },
                    )),
                }),
            );
        }
        if call.prog != NFS4_PROGRAM {
            return (
                request,
                Box::new(RpcReplyMsg {
                    xid,
                    body: ReplyBody::accepted(AcceptBody::ProgUnavail),
                }),
            );
        }
        if call.vers != NFS_V4 {
            return (
                request,
                Box::new(RpcReplyMsg {
                    xid,
                    body: ReplyBody::accepted(AcceptBody::ProgMismatch(MismatchInfo {
                        low: NFS_V4,
                        high: NFS_V4,
                    })),
                }),
            );
        }

        match call.proc {
            NFS_PROC_NULL => {
                debug!("NULL call");
                (
                    request,
                    Box::new(RpcReplyMsg {
                        xid,
                        body: ReplyBody::success(Vec::new()),
                    }),
                )
            }
            NFS_PROC_COMPOUND => {
                let mut reader = XdrReader::new(&msg.payload);
                let header = match CompoundHeader::decode(&mut reader) {
                    Ok(header) => header,
                    Err(e) => {
                        error!("compound header undecodable: {:?}", e);
                        return (
                            request,
                            Box::new(RpcReplyMsg {
                                xid,
                                body: ReplyBody::accepted(AcceptBody::GarbageArgs),
                            }),
                        );
                    }
                };
                let ops_payload = &msg.payload[reader.position()..];

                let (request, bytes) = match header.minorversion {
                    0 => self.v40.compound(header, ops_payload, request).await,
                    1 => self.v41.compound(header, ops_payload, request).await,
                    other => {
                        debug!(minorversion = other, "minor version out of range");
                        let res = Compound4res {
                            status: NfsStat4::Nfs4errMinorVersMismatch,
                            tag: header.tag,
                            resarray: Vec::new(),
                        };
                        let mut writer = XdrWriter::new();
                        res.encode(&mut writer);
                        (request, writer.into_bytes())
                    }
                };
                (
                    request,
                    Box::new(RpcReplyMsg {
                        xid,
                        body: ReplyBody::success(bytes),
                    }),
                )
            }
            _ => (
                request,
                Box::new(RpcReplyMsg {
                    xid,
                    body: ReplyBody::accepted(AcceptBody::ProcUnavail),
                }),
            ),
        }
    }
}

#[cfg(test)]
mod compound_tests {
    use super::nfs40::test_support::TestEnv;
    use super::*;
    use keel_proto::nfs41_proto::ChannelAttrs4;
    use keel_proto::nfs4_proto::NfsOpnum4;
    use keel_proto::rpc_proto::{CallBody, OpaqueAuth};
    use tracing_test::traced_test;

    fn compound_call(minorversion: u32, ops: &[u8], numops: u32) -> RpcCallMsg {
        let mut payload = XdrWriter::new();
        payload.write_string(""); // tag
        payload.write_u32(minorversion);
        payload.write_u32(numops);
        payload.write_raw(ops);
        RpcCallMsg {
            xid: 1,
            call: CallBody {
                rpcvers: RPC_VERSION,
                prog: NFS4_PROGRAM,
                vers: NFS_V4,
                proc: NFS_PROC_COMPOUND,
                cred: OpaqueAuth::none(),
                verf: OpaqueAuth::none(),
            },
            payload: payload.into_bytes(),
        }
    }

    fn response_bytes(reply: &RpcReplyMsg) -> Vec<u8> {
        match &reply.body {
            ReplyBody::MsgAccepted(accepted) => match &accepted.reply_data {
                AcceptBody::Success(bytes) => bytes.clone(),
                other => panic!("unexpected accept body {:?}", other),
            },
            other => panic!("unexpected reply body {:?}", other),
        }
    }

    /// Minimal browse: PUTROOTFH, LOOKUP("export"), GETFH answers three
    /// OKs. The lookup crosses the junction, so the handle GETFH emits
    /// names the share root.
    #[tokio::test]
    #[traced_test]
    async fn minimal_browse_compound() {
        let env = TestEnv::new();
        let service = NFSService::new();

        let mut ops = XdrWriter::new();
        ops.write_u32(NfsOpnum4::OpPutrootfh as u32);
        ops.write_u32(NfsOpnum4::OpLookup as u32);
        ops.write_string("export");
        ops.write_u32(NfsOpnum4::OpGetfh as u32);

        let msg = compound_call(0, ops.as_slice(), 3);
        let (_, reply) = service.call(msg, env.request()).await;
        let bytes = response_bytes(&reply);

        let mut reader = XdrReader::new(&bytes);
        assert_eq!(reader.read_u32().unwrap(), 0); // overall OK
        assert_eq!(reader.read_string().unwrap(), "");
        assert_eq!(reader.read_u32().unwrap(), 3); // three results
        // PUTROOTFH
        assert_eq!(reader.read_u32().unwrap(), NfsOpnum4::OpPutrootfh as u32);
        assert_eq!(reader.read_u32().unwrap(), 0);
        // LOOKUP
        assert_eq!(reader.read_u32().unwrap(), NfsOpnum4::OpLookup as u32);
        assert_eq!(reader.read_u32().unwrap(), 0);
        // GETFH
        assert_eq!(reader.read_u32().unwrap(), NfsOpnum4::OpGetfh as u32);
        assert_eq!(reader.read_u32().unwrap(), 0);
        let handle = reader.read_opaque().unwrap();
        assert!(!handle.is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn minor_version_out_of_range() {
        let env = TestEnv::new();
        let service = NFSService::new();
        let msg = compound_call(2, &[], 0);
        let (_, reply) = service.call(msg, env.request()).await;
        let bytes = response_bytes(&reply);
        let mut reader = XdrReader::new(&bytes);
        assert_eq!(
            reader.read_u32().unwrap(),
            NfsStat4::Nfs4errMinorVersMismatch as u32
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn v41_requires_sequence_first() {
        let env = TestEnv::new();
        let service = NFSService::new();
        let mut ops = XdrWriter::new();
        ops.write_u32(NfsOpnum4::OpPutrootfh as u32);
        let msg = compound_call(1, ops.as_slice(), 1);
        let (_, reply) = service.call(msg, env.request()).await;
        let bytes = response_bytes(&reply);
        let mut reader = XdrReader::new(&bytes);
        assert_eq!(
            reader.read_u32().unwrap(),
            NfsStat4::Nfs4errOpNotInSession as u32
        );
    }

    /// Scenario: SEQUENCE replay. The same cached compound comes back
    /// byte-identical and the replay counter moves.
    #[tokio::test]
    #[traced_test]
    async fn sequence_replay_is_byte_identical() {
        let env = TestEnv::new();
        let service = NFSService::new();

        // EXCHANGE_ID + CREATE_SESSION through the state manager
        let clientid = {
            let args = keel_proto::nfs41_proto::ExchangeId4args {
                eia_clientowner: keel_proto::nfs41_proto::ClientOwner4 {
                    co_verifier: [1; 8],
                    co_ownerid: b"replay-owner".to_vec(),
                },
                eia_flags: 0,
                eia_state_protect: keel_proto::nfs41_proto::StateProtect4A::None,
                eia_client_impl_id: None,
            };
            env.state.exchange_id(&args).await.unwrap().0
        };
        let session = env
            .state
            .create_session(&keel_proto::nfs41_proto::CreateSession4args {
                csa_clientid: clientid,
                csa_sequence: 1,
                csa_flags: 0,
                csa_fore_chan_attrs: ChannelAttrs4 {
                    ca_maxrequestsize: 1 << 20,
                    ca_maxresponsesize: 1 << 20,
                    ca_maxresponsesize_cached: 1 << 16,
                    ca_maxoperations: 16,
                    ca_maxrequests: 8,
                    ..Default::default()
                },
                csa_back_chan_attrs: ChannelAttrs4::default(),
                csa_cb_program: 0x40000000,
                csa_sec_parms: vec![],
            })
            .await
            .unwrap();

        let mut ops = XdrWriter::new();
        ops.write_u32(NfsOpnum4::OpSequence as u32);
        ops.write_fixed(&session.csr_sessionid);
        ops.write_u32(1); // sequenceid
        ops.write_u32(0); // slotid
        ops.write_u32(7); // highest slotid
        ops.write_bool(true); // cachethis
        ops.write_u32(NfsOpnum4::OpPutrootfh as u32);
        ops.write_u32(NfsOpnum4::OpGetfh as u32);

        let msg = compound_call(1, ops.as_slice(), 3);
        let (_, first) = service.call(msg.clone(), env.request()).await;
        let first_bytes = response_bytes(&first);
        let mut reader = XdrReader::new(&first_bytes);
        assert_eq!(reader.read_u32().unwrap(), 0);

        let replays_before = env
            .state
            .metrics
            .replay_hits_total
            .load(std::sync::atomic::Ordering::Relaxed);
        let (_, second) = service.call(msg, env.request()).await;
        let second_bytes = response_bytes(&second);
        assert_eq!(first_bytes, second_bytes);
        let replays_after = env
            .state
            .metrics
            .replay_hits_total
            .load(std::sync::atomic::Ordering::Relaxed);
        assert_eq!(replays_after, replays_before + 1);
    }
}
