use crate::{Map, MeshFlavor, PodRecord};

/// The namespace label that enables ambient mode for all of a namespace's pods.
pub const DATAPLANE_MODE_LABEL: &str = "istio.io/dataplane-mode";
pub const DATAPLANE_MODE_AMBIENT: &str = "ambient";

/// Describes how the datapath should treat a pod's traffic.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Membership {
    /// The pod's traffic is handled by the mesh.
    pub in_mesh: bool,

    /// The pod's traffic is captured without a sidecar.
    pub ambient: bool,

    /// The pod runs the mesh's node-level proxy.
    pub gateway: bool,
}

/// Determines a pod's mesh membership.
///
/// Gateway pods are always in the mesh and always ambient, whatever their namespace's mode.
pub fn classify(flavor: MeshFlavor, namespace_ambient: bool, pod: &PodRecord) -> Membership {
    let gateway = is_gateway(flavor, pod);
    let injected = is_sidecar_injected(flavor, pod);
    Membership {
        in_mesh: namespace_ambient || injected || gateway,
        ambient: namespace_ambient || gateway,
        gateway,
    }
}

/// Indicates whether a namespace's labels opt it into ambient mode.
pub fn is_ambient_namespace(labels: &Map) -> bool {
    labels.get(DATAPLANE_MODE_LABEL).map(String::as_str) == Some(DATAPLANE_MODE_AMBIENT)
}

/// Indicates whether the mesh's injector has added a sidecar proxy to the pod.
pub fn is_sidecar_injected(flavor: MeshFlavor, pod: &PodRecord) -> bool {
    match flavor {
        MeshFlavor::Istio => {
            pod.annotations.contains_key("sidecar.istio.io/status")
                && pod.has_container("istio-proxy")
        }
        MeshFlavor::Linkerd => pod.has_container("linkerd-proxy"),
        MeshFlavor::Kuma => {
            pod.annotations
                .get("kuma.io/sidecar-injected")
                .map(String::as_str)
                == Some("true")
                && pod.has_container("kuma-sidecar")
        }
    }
}

/// Indicates whether the pod is the mesh's node proxy.
pub fn is_gateway(flavor: MeshFlavor, pod: &PodRecord) -> bool {
    match gateway_label(flavor) {
        Some((key, value)) => pod.labels.get(key).map(String::as_str) == Some(value),
        None => false,
    }
}

/// The label that identifies a mesh's node proxy, if the mesh runs one.
///
/// `app=ztunnel` is Istio's node proxy. Under Linkerd and Kuma a pod with that label is an
/// ordinary workload and is not treated as a gateway.
pub fn gateway_label(flavor: MeshFlavor) -> Option<(&'static str, &'static str)> {
    match flavor {
        MeshFlavor::Istio => Some(("app", "ztunnel")),
        MeshFlavor::Linkerd | MeshFlavor::Kuma => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn pod(
        labels: Map,
        annotations: Map,
        containers: impl IntoIterator<Item = &'static str>,
    ) -> PodRecord {
        PodRecord {
            namespace: "ns-0".to_string(),
            name: "pod-0".to_string(),
            ip: "10.0.0.5".to_string(),
            labels,
            annotations,
            containers: containers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn plain_pod_is_not_in_mesh() {
        let p = pod(Map::default(), Map::default(), ["app"]);
        for flavor in [MeshFlavor::Istio, MeshFlavor::Linkerd, MeshFlavor::Kuma] {
            assert_eq!(classify(flavor, false, &p), Membership::default());
        }
    }

    #[test]
    fn ambient_namespace() {
        let p = pod(Map::default(), Map::default(), ["app"]);
        assert_eq!(
            classify(MeshFlavor::Istio, true, &p),
            Membership {
                in_mesh: true,
                ambient: true,
                gateway: false,
            }
        );
    }

    #[test]
    fn istio_sidecar() {
        let status = btreemap! { "sidecar.istio.io/status".to_string() => "{}".to_string() };
        let injected = pod(Map::default(), status.clone(), ["app", "istio-proxy"]);
        assert_eq!(
            classify(MeshFlavor::Istio, false, &injected),
            Membership {
                in_mesh: true,
                ambient: false,
                gateway: false,
            }
        );

        let no_container = pod(Map::default(), status, ["app"]);
        assert!(!is_sidecar_injected(MeshFlavor::Istio, &no_container));

        let no_status = pod(Map::default(), Map::default(), ["app", "istio-proxy"]);
        assert!(!is_sidecar_injected(MeshFlavor::Istio, &no_status));
    }

    #[test]
    fn linkerd_sidecar() {
        let injected = pod(Map::default(), Map::default(), ["app", "linkerd-proxy"]);
        assert!(is_sidecar_injected(MeshFlavor::Linkerd, &injected));
        assert!(!is_sidecar_injected(MeshFlavor::Istio, &injected));
    }

    #[test]
    fn kuma_sidecar() {
        let anns = btreemap! { "kuma.io/sidecar-injected".to_string() => "true".to_string() };
        let injected = pod(Map::default(), anns, ["app", "kuma-sidecar"]);
        assert!(is_sidecar_injected(MeshFlavor::Kuma, &injected));

        let anns = btreemap! { "kuma.io/sidecar-injected".to_string() => "false".to_string() };
        let disabled = pod(Map::default(), anns, ["app", "kuma-sidecar"]);
        assert!(!is_sidecar_injected(MeshFlavor::Kuma, &disabled));
    }

    #[test]
    fn ztunnel_is_an_ambient_gateway() {
        let labels = btreemap! { "app".to_string() => "ztunnel".to_string() };
        let ztunnel = pod(labels, Map::default(), ["istio-proxy"]);
        assert_eq!(
            classify(MeshFlavor::Istio, false, &ztunnel),
            Membership {
                in_mesh: true,
                ambient: true,
                gateway: true,
            }
        );
    }

    #[test]
    fn ztunnel_label_is_istio_only() {
        let labels = btreemap! { "app".to_string() => "ztunnel".to_string() };
        let ztunnel = pod(labels, Map::default(), ["app"]);
        for flavor in [MeshFlavor::Linkerd, MeshFlavor::Kuma] {
            assert_eq!(gateway_label(flavor), None);
            assert_eq!(
                classify(flavor, false, &ztunnel),
                Membership::default(),
                "{flavor}"
            );
        }
    }

    #[test]
    fn ambient_namespace_label() {
        assert!(is_ambient_namespace(&btreemap! {
            DATAPLANE_MODE_LABEL.to_string() => "ambient".to_string(),
        }));
        assert!(!is_ambient_namespace(&btreemap! {
            DATAPLANE_MODE_LABEL.to_string() => "none".to_string(),
        }));
        assert!(!is_ambient_namespace(&Map::default()));
    }
}
