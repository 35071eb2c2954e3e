#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod watch;

pub use self::watch::{namespaces, pods_on_node, WATCH_TIMEOUT_SECS};
pub use k8s_openapi::api::{
    self,
    core::v1::{Container, Namespace, NamespaceSpec, Pod, PodSpec, PodStatus},
};
pub use kube::{
    api::{ObjectMeta, ResourceExt},
    runtime::watcher,
};
