#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use meshaccel_policy_controller_core as core;
pub use meshaccel_policy_controller_k8s_api as k8s;
pub use meshaccel_policy_controller_k8s_index as index;

mod args;
pub mod bpf;
pub mod cni;
mod controller;
pub mod datapath;
mod process;

pub use self::{
    args::Args,
    controller::{Controller, SHUTDOWN_TIMEOUT},
    process::NoopProcessManager,
};
