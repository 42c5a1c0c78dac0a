//! Wire layer for the keel NFSv4 / NFSv4.1 server: XDR primitives, the
//! ONC-RPC record-marking transport codec, the RPC envelope, and the
//! typed NFSv4 argument/result registry.

pub mod attr;
pub mod nfs41_proto;
pub mod nfs4_proto;
pub mod rpc_proto;
pub mod xdr;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::rpc_proto::{RpcCallMsg, RpcReplyMsg};

/// Largest reassembled RPC record accepted, to bound memory per
/// connection.
const MAX_RECORD: usize = 8 * 1024 * 1024;

/// Record-marking codec over a TCP stream:
/// https://datatracker.ietf.org/doc/html/rfc1057#section-10
///
/// Each record is a sequence of fragments, each prefixed by a u32 whose
/// top bit marks the final fragment and whose low 31 bits carry the
/// fragment length.
#[derive(Debug, Default)]
pub struct NfsRpcCodec {}

impl NfsRpcCodec {
    pub fn new() -> NfsRpcCodec {
        NfsRpcCodec {}
    }
}

impl Decoder for NfsRpcCodec {
    type Item = RpcCallMsg;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut record = Vec::new();
        let mut consumed = 0usize;
        let mut is_last = false;
        while !is_last {
            if src.len() < consumed + 4 {
                // Not enough data to read the fragment header.
                return Ok(None);
            }
            let mut header_bytes = [0u8; 4];
            header_bytes.copy_from_slice(&src[consumed..consumed + 4]);
            let fragment_header = u32::from_be_bytes(header_bytes) as usize;
            is_last = (fragment_header & (1 << 31)) > 0;
            let length = fragment_header & ((1 << 31) - 1);

            if record.len() + length > MAX_RECORD {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("record of length {} is too large", record.len() + length),
                ));
            }
            if src.len() < consumed + 4 + length {
                // The full fragment has not yet arrived.
                src.reserve(consumed + 4 + length - src.len());
                return Ok(None);
            }
            record.extend_from_slice(&src[consumed + 4..consumed + 4 + length]);
            consumed += 4 + length;
            trace!(length, is_last, "read rpc fragment");
        }
        src.advance(consumed);

        RpcCallMsg::from_bytes(&record)
            .map(Some)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl Encoder<Box<RpcReplyMsg>> for NfsRpcCodec {
    type Error = std::io::Error;

    fn encode(&mut self, message: Box<RpcReplyMsg>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = message.to_bytes();
        let header = u32::to_be_bytes(body.len() as u32 | (1 << 31));
        dst.reserve(4 + body.len());
        dst.extend_from_slice(&header);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc_proto::{ReplyBody, NFS4_PROGRAM, NFS_PROC_NULL, NFS_V4, RPC_VERSION};
    use crate::xdr::XdrWriter;

    fn null_call_bytes(xid: u32) -> Vec<u8> {
        let mut w = XdrWriter::new();
        w.write_u32(xid);
        w.write_u32(0); // CALL
        w.write_u32(RPC_VERSION);
        w.write_u32(NFS4_PROGRAM);
        w.write_u32(NFS_V4);
        w.write_u32(NFS_PROC_NULL);
        w.write_u32(0); // AUTH_NONE
        w.write_u32(0);
        w.write_u32(0);
        w.write_u32(0);
        w.into_bytes()
    }

    #[test]
    fn single_fragment_record() {
        let body = null_call_bytes(42);
        let mut src = BytesMut::new();
        src.extend_from_slice(&u32::to_be_bytes(body.len() as u32 | (1 << 31)));
        src.extend_from_slice(&body);

        let mut codec = NfsRpcCodec::new();
        let msg = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(msg.xid, 42);
        assert!(src.is_empty());
    }

    #[test]
    fn multi_fragment_record_reassembles() {
        let body = null_call_bytes(7);
        let (head, tail) = body.split_at(8);
        let mut src = BytesMut::new();
        src.extend_from_slice(&u32::to_be_bytes(head.len() as u32));
        src.extend_from_slice(head);
        src.extend_from_slice(&u32::to_be_bytes(tail.len() as u32 | (1 << 31)));
        src.extend_from_slice(tail);

        let mut codec = NfsRpcCodec::new();
        let msg = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(msg.xid, 7);
    }

    #[test]
    fn partial_record_waits_for_more() {
        let body = null_call_bytes(9);
        let mut src = BytesMut::new();
        src.extend_from_slice(&u32::to_be_bytes(body.len() as u32 | (1 << 31)));
        src.extend_from_slice(&body[..4]);

        let mut codec = NfsRpcCodec::new();
        assert!(codec.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(&body[4..]);
        assert!(codec.decode(&mut src).unwrap().is_some());
    }

    #[test]
    fn oversized_record_rejected() {
        let mut src = BytesMut::new();
        src.extend_from_slice(&u32::to_be_bytes((MAX_RECORD as u32 + 1) | (1 << 31)));
        let mut codec = NfsRpcCodec::new();
        assert!(codec.decode(&mut src).is_err());
    }

    #[test]
    fn encode_sets_last_fragment_bit() {
        let reply = RpcReplyMsg {
            xid: 1,
            body: ReplyBody::success(vec![]),
        };
        let mut dst = BytesMut::new();
        let mut codec = NfsRpcCodec::new();
        codec.encode(Box::new(reply), &mut dst).unwrap();
        let header = u32::from_be_bytes(dst[..4].try_into().unwrap());
        assert!(header & (1 << 31) > 0);
        assert_eq!((header & !(1 << 31)) as usize, dst.len() - 4);
    }
}
