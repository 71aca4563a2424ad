//! Container image extraction for workload kinds.

use k8s_openapi::api::core::v1::{Container, PodSpec};
use log::{debug, warn};

use crate::iac::output::ContainerDetails;

/// Kinds whose documents embed a pod spec.
pub const WORKLOAD_KINDS: &[&str] = &[
    "Pod",
    "Deployment",
    "ReplicaSet",
    "ReplicationController",
    "Job",
    "CronJob",
    "StatefulSet",
    "DaemonSet",
];

/// JSON pointer to the pod spec of a workload kind.
pub fn pod_spec_pointer(kind: &str) -> Option<&'static str> {
    match kind {
        "Pod" => Some("/spec"),
        "CronJob" => Some("/spec/jobTemplate/spec/template/spec"),
        k if WORKLOAD_KINDS.contains(&k) => Some("/spec/template/spec"),
        _ => None,
    }
}

/// Images of containers and init containers, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadImages {
    pub containers: Vec<ContainerDetails>,
    pub init_containers: Vec<ContainerDetails>,
}

fn details(containers: &[Container]) -> Vec<ContainerDetails> {
    containers
        .iter()
        .map(|c| ContainerDetails {
            name: c.name.clone(),
            image: c.image.clone().unwrap_or_default(),
        })
        .collect()
}

/// Decode the pod spec of `document` into its typed shape and list its images.
///
/// Unsupported kinds and documents that do not match the typed shape give no images.
pub fn extract_images(kind: &str, document: &serde_json::Value) -> WorkloadImages {
    let Some(pointer) = pod_spec_pointer(kind) else {
        debug!(
            "the container image extraction for kubernetes workload of kind {} is not supported",
            kind
        );
        return WorkloadImages::default();
    };

    let Some(spec) = document.pointer(pointer) else {
        return WorkloadImages::default();
    };

    match serde_json::from_value::<PodSpec>(spec.clone()) {
        Ok(pod_spec) => WorkloadImages {
            containers: details(&pod_spec.containers),
            init_containers: pod_spec
                .init_containers
                .as_deref()
                .map(details)
                .unwrap_or_default(),
        },
        Err(e) => {
            warn!("error unmarshalling {} pod spec: {}", kind.to_lowercase(), e);
            WorkloadImages::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deployment_images() {
        let doc = json!({
            "kind": "Deployment",
            "spec": {"template": {"spec": {
                "containers": [{"name": "web", "image": "nginx:1.25"}],
                "initContainers": [{"name": "init", "image": "busybox"}]
            }}}
        });
        let images = extract_images("Deployment", &doc);
        assert_eq!(images.containers[0].image, "nginx:1.25");
        assert_eq!(images.init_containers[0].name, "init");
    }

    #[test]
    fn test_cronjob_images() {
        let doc = json!({
            "spec": {"jobTemplate": {"spec": {"template": {"spec": {
                "containers": [{"name": "job", "image": "alpine:3"}]
            }}}}}
        });
        let images = extract_images("CronJob", &doc);
        assert_eq!(images.containers.len(), 1);
        assert_eq!(images.containers[0].image, "alpine:3");
        assert!(images.init_containers.is_empty());
    }

    #[test]
    fn test_pod_images_and_unsupported_kind() {
        let doc = json!({"spec": {"containers": [{"name": "a", "image": "redis"}]}});
        assert_eq!(extract_images("Pod", &doc).containers[0].image, "redis");
        assert_eq!(extract_images("Service", &doc), WorkloadImages::default());
    }
}
