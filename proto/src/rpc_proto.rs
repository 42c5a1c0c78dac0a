//! ONC RPC (RFC 5531) call and reply envelopes.
//!
//! Only the slice of RPC this server speaks: AUTH_NONE / AUTH_SYS
//! credentials, accepted and denied replies, and the NFSv4 program with
//! its two procedures. The COMPOUND payload itself is left as raw bytes;
//! the dispatcher owns op-level decoding.

use crate::xdr::{XdrDecode, XdrEncode, XdrError, XdrReader, XdrResult, XdrWriter};

pub const RPC_VERSION: u32 = 2;
pub const NFS4_PROGRAM: u32 = 100003;
pub const NFS_V4: u32 = 4;
pub const NFS_PROC_NULL: u32 = 0;
pub const NFS_PROC_COMPOUND: u32 = 1;

const MAX_MACHINE_NAME: usize = 255;
const MAX_AUTH_GIDS: usize = 16;
const MAX_AUTH_BODY: usize = 400;

/// AUTH_SYS credential body, RFC 5531 appendix A.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AuthUnix {
    pub stamp: u32,
    pub machinename: String,
    pub uid: u32,
    pub gid: u32,
    pub gids: Vec<u32>,
}

impl AuthUnix {
    fn from_body(body: &[u8]) -> XdrResult<Self> {
        let mut reader = XdrReader::new(body);
        let stamp = reader.read_u32()?;
        let machinename = reader.read_string_max(MAX_MACHINE_NAME)?;
        let uid = reader.read_u32()?;
        let gid = reader.read_u32()?;
        let count = reader.read_u32()? as usize;
        if count > MAX_AUTH_GIDS {
            return Err(XdrError::LimitExceeded {
                length: count,
                limit: MAX_AUTH_GIDS,
            });
        }
        let mut gids = Vec::with_capacity(count);
        for _ in 0..count {
            gids.push(reader.read_u32()?);
        }
        Ok(AuthUnix {
            stamp,
            machinename,
            uid,
            gid,
            gids,
        })
    }

    fn to_body(&self) -> Vec<u8> {
        let mut writer = XdrWriter::new();
        writer.write_u32(self.stamp);
        writer.write_string(&self.machinename);
        writer.write_u32(self.uid);
        writer.write_u32(self.gid);
        writer.write_u32(self.gids.len() as u32);
        for gid in &self.gids {
            writer.write_u32(*gid);
        }
        writer.into_bytes()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OpaqueAuth {
    AuthNull(Vec<u8>),
    AuthUnix(AuthUnix),
    /// A flavor this server does not interpret; kept verbatim.
    Other { flavor: u32, body: Vec<u8> },
}

impl OpaqueAuth {
    pub fn none() -> Self {
        OpaqueAuth::AuthNull(Vec::new())
    }
}

impl XdrDecode for OpaqueAuth {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        let flavor = reader.read_u32()?;
        let body = reader.read_opaque_max(MAX_AUTH_BODY)?;
        match flavor {
            0 => Ok(OpaqueAuth::AuthNull(body)),
            1 => Ok(OpaqueAuth::AuthUnix(AuthUnix::from_body(&body)?)),
            _ => Ok(OpaqueAuth::Other { flavor, body }),
        }
    }
}

impl XdrEncode for OpaqueAuth {
    fn encode(&self, writer: &mut XdrWriter) {
        match self {
            OpaqueAuth::AuthNull(body) => {
                writer.write_u32(0);
                writer.write_opaque(body);
            }
            OpaqueAuth::AuthUnix(auth) => {
                writer.write_u32(1);
                writer.write_opaque(&auth.to_body());
            }
            OpaqueAuth::Other { flavor, body } => {
                writer.write_u32(*flavor);
                writer.write_opaque(body);
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallBody {
    pub rpcvers: u32,
    pub prog: u32,
    pub vers: u32,
    pub proc: u32,
    pub cred: OpaqueAuth,
    pub verf: OpaqueAuth,
}

impl XdrDecode for CallBody {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(CallBody {
            rpcvers: reader.read_u32()?,
            prog: reader.read_u32()?,
            vers: reader.read_u32()?,
            proc: reader.read_u32()?,
            cred: OpaqueAuth::decode(reader)?,
            verf: OpaqueAuth::decode(reader)?,
        })
    }
}

/// A decoded RPC call: envelope plus the raw procedure arguments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RpcCallMsg {
    pub xid: u32,
    pub call: CallBody,
    pub payload: Vec<u8>,
}

impl RpcCallMsg {
    pub fn from_bytes(buffer: &[u8]) -> XdrResult<Self> {
        let mut reader = XdrReader::new(buffer);
        let xid = reader.read_u32()?;
        let msg_type = reader.read_u32()?;
        if msg_type != 0 {
            return Err(XdrError::BadDiscriminant(msg_type));
        }
        let call = CallBody::decode(&mut reader)?;
        let payload = buffer[reader.position()..].to_vec();
        Ok(RpcCallMsg { xid, call, payload })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MismatchInfo {
    pub low: u32,
    pub high: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AcceptBody {
    /// Procedure executed; the pre-encoded result bytes follow verbatim.
    Success(Vec<u8>),
    ProgUnavail,
    /// remote can't support version #
    ProgMismatch(MismatchInfo),
    ProcUnavail,
    /// procedure can't decode params
    GarbageArgs,
    SystemErr,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AcceptedReply {
    pub verf: OpaqueAuth,
    pub reply_data: AcceptBody,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthStat {
    AuthBadCred = 1,
    AuthRejectedCred = 2,
    AuthBadVerf = 3,
    AuthRejectedVerf = 4,
    AuthTooWeak = 5,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RejectedReply {
    RpcMismatch(MismatchInfo),
    AuthError(AuthStat),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReplyBody {
    MsgAccepted(AcceptedReply),
    MsgDenied(RejectedReply),
}

impl ReplyBody {
    pub fn accepted(reply_data: AcceptBody) -> Self {
        ReplyBody::MsgAccepted(AcceptedReply {
            verf: OpaqueAuth::none(),
            reply_data,
        })
    }

    pub fn success(bytes: Vec<u8>) -> Self {
        ReplyBody::accepted(AcceptBody::Success(bytes))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RpcReplyMsg {
    pub xid: u32,
    pub body: ReplyBody,
}

impl RpcReplyMsg {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = XdrWriter::new();
        writer.write_u32(self.xid);
        writer.write_u32(1); // REPLY
        match &self.body {
            ReplyBody::MsgAccepted(accepted) => {
                writer.write_u32(0); // MSG_ACCEPTED
                accepted.verf.encode(&mut writer);
                match &accepted.reply_data {
                    AcceptBody::Success(bytes) => {
                        writer.write_u32(0);
                        writer.write_raw(bytes);
                    }
                    AcceptBody::ProgUnavail => writer.write_u32(1),
                    AcceptBody::ProgMismatch(info) => {
                        writer.write_u32(2);
                        writer.write_u32(info.low);
                        writer.write_u32(info.high);
                    }
                    AcceptBody::ProcUnavail => writer.write_u32(3),
                    AcceptBody::GarbageArgs => writer.write_u32(4),
                    AcceptBody::SystemErr => writer.write_u32(5),
                }
            }
            ReplyBody::MsgDenied(denied) => {
                writer.write_u32(1); // MSG_DENIED
                match denied {
                    RejectedReply::RpcMismatch(info) => {
                        writer.write_u32(0);
                        writer.write_u32(info.low);
                        writer.write_u32(info.high);
                    }
                    RejectedReply::AuthError(stat) => {
                        writer.write_u32(1);
                        writer.write_u32(*stat as u32);
                    }
                }
            }
        }
        writer.into_bytes()
    }
}

/// CB_COMPOUND call builder for the server-to-client direction. The
/// callback program number is the one the client advertised.
pub struct CbCompoundCall {
    pub xid: u32,
    pub program: u32,
    pub proc: u32,
    pub callback_ident: u32,
    pub tag: String,
    pub minorversion: u32,
    /// Pre-encoded op array: count followed by each op's opcode + args.
    pub ops: Vec<u8>,
}

impl CbCompoundCall {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = XdrWriter::new();
        writer.write_u32(self.xid);
        writer.write_u32(0); // CALL
        writer.write_u32(RPC_VERSION);
        writer.write_u32(self.program);
        writer.write_u32(1); // callback program version
        writer.write_u32(self.proc);
        OpaqueAuth::none().encode(&mut writer);
        OpaqueAuth::none().encode(&mut writer);
        if self.proc != 0 {
            writer.write_string(&self.tag);
            writer.write_u32(self.minorversion);
            writer.write_u32(self.callback_ident);
            writer.write_raw(&self.ops);
        }
        writer.into_bytes()
    }
}
