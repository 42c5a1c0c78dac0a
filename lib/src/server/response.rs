use keel_proto::nfs4_proto::{NfsResOp4, NfsStat4};

use super::request::NfsRequest;

/// Outcome of one operation: the context handed back for the next op,
/// the encoded-result body if the handler produced one, and the status.
/// A `None` result with a non-OK status becomes a status-only body.
pub struct NfsOpResponse {
    pub request: NfsRequest,
    pub result: Option<NfsResOp4>,
    pub status: NfsStat4,
}
