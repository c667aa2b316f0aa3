//! Server Ingress syncer: one HTTP rule routing `/` to the server Service.

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;

use crate::crd::Submarine;
use crate::error::OperatorResult;
use crate::reconciler::Reconciler;

use super::{controller_ref, SERVER_NAME};

fn new_server_ingress(oref: &OwnerReference) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(format!("{SERVER_NAME}-ingress")),
            owner_references: Some(vec![oref.clone()]),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: None,
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: SERVER_NAME.to_string(),
                                port: Some(ServiceBackendPort {
                                    number: Some(8080),
                                    name: None,
                                }),
                            }),
                            resource: None,
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

impl Reconciler {
    /// Ensure the HTTP entry point for the server.
    pub(crate) async fn sync_ingress(
        &self,
        submarine: &Submarine,
        namespace: &str,
    ) -> OperatorResult<()> {
        let oref = controller_ref(submarine)?;
        self.ensure(
            &self.stores.ingresses,
            &self.caches.ingresses,
            submarine,
            Some(namespace),
            new_server_ingress(&oref),
        )
        .await?;
        Ok(())
    }
}
