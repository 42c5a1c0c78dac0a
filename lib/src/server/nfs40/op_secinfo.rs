use async_trait::async_trait;
use tracing::debug;

use crate::server::{
    filemanager::FsObject, operation::NfsOperation, request::NfsRequest, response::NfsOpResponse,
};

use keel_proto::nfs4_proto::{
    NfsResOp4, NfsStat4, SecInfo4args, SecInfo4res, SecInfoFlavor4, AUTH_NONE, AUTH_SYS,
};

/// The flavors this server accepts, strongest first.
pub(crate) fn supported_flavors() -> Vec<SecInfoFlavor4> {
    vec![
        SecInfoFlavor4::Flavor(AUTH_SYS),
        SecInfoFlavor4::Flavor(AUTH_NONE),
    ]
}

#[async_trait]
impl NfsOperation for SecInfo4args {
    async fn execute(&self, request: NfsRequest) -> NfsOpResponse {
        // Description: https://datatracker.ietf.org/doc/html/rfc7530#section-16.31
        debug!("Operation 33: SECINFO - Obtain Available Security {:?}", self.name);
        let Some(current) = request.current_filehandle().cloned() else {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNofilehandle,
            };
        };
        if self.name.is_empty() {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errInval,
            };
        }

        // the name must exist under the current directory
        let fmanager = request.file_manager();
        let exists = match &current {
            FsObject::Pseudo(node) => fmanager.pseudo.lookup(&node.path, &self.name).is_some(),
            FsObject::Real(entry) if !entry.is_dir() => {
                return NfsOpResponse {
                    request,
                    result: None,
                    status: NfsStat4::Nfs4errNotdir,
                }
            }
            FsObject::Real(entry) => fmanager
                .metadata
                .lookup(&entry.share, entry.id, &self.name)
                .await
                .is_ok(),
        };
        if !exists {
            return NfsOpResponse {
                request,
                result: None,
                status: NfsStat4::Nfs4errNoent,
            };
        }

        NfsOpResponse {
            request,
            result: Some(NfsResOp4::OpSecinfo(SecInfo4res::Resok4(
                supported_flavors(),
            ))),
            status: NfsStat4::Nfs4Ok,
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::server::nfs40::test_support::pseudo_root_request;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn secinfo_reports_auth_sys_and_none() {
        let request = pseudo_root_request().await;
        let args = SecInfo4args {
            name: "export".to_string(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4Ok);
        match response.result.unwrap() {
            NfsResOp4::OpSecinfo(SecInfo4res::Resok4(flavors)) => {
                assert_eq!(
                    flavors,
                    vec![
                        SecInfoFlavor4::Flavor(AUTH_SYS),
                        SecInfoFlavor4::Flavor(AUTH_NONE)
                    ]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn secinfo_for_missing_name() {
        let request = pseudo_root_request().await;
        let args = SecInfo4args {
            name: "ghost".to_string(),
        };
        let response = args.execute(request).await;
        assert_eq!(response.status, NfsStat4::Nfs4errNoent);
    }
}
