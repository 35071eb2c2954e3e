use crate::{
    bpf::{self, PinnedPolicyMap},
    cni::{self, Plugin},
    controller::Controller,
    core::MeshFlavor,
    datapath::{self, MakeDatapath},
    index::{self, Reconciler},
    k8s,
    process::NoopProcessManager,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{path::PathBuf, sync::Arc};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "policy",
    about = "Publishes per-pod traffic redirection policy to the mesh acceleration datapath"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "meshaccel=info,warn",
        env = "MESHACCEL_POLICY_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The service mesh whose annotations and sidecars are recognized.
    #[clap(short, long, default_value = "istio")]
    mode: MeshFlavor,

    /// The node whose pods are watched. Defaults to the host name.
    #[clap(long, env = "NODE_NAME")]
    node_name: Option<String>,

    /// The pin path of the per-pod policy map.
    #[clap(long, default_value = bpf::LOCAL_POD_IPS)]
    local_pod_ips_map: PathBuf,

    /// The directory whose makefile attaches and cleans up the datapath programs.
    #[clap(long, default_value = datapath::BPF_DIR)]
    bpf_dir: PathBuf,

    /// Republishes a pod when its redirection annotations change, not only when its IP does.
    #[clap(long)]
    republish_on_annotation_change: bool,

    /// Runs alongside a CNI plugin, stopping when the plugin terminates rather than on signals.
    #[clap(long)]
    cni_mode: bool,
}

type PolicyController = Controller<PinnedPolicyMap, NoopProcessManager, MakeDatapath>;

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    /// Runs in signal mode. Plugin mode requires [`Args::run_with_plugin`].
    pub async fn run(self) -> Result<()> {
        if self.cni_mode {
            bail!("--cni-mode requires a CNI server and installer");
        }
        let (runtime, controller, node_name) = self.build().await?;
        let stop = runtime.shutdown_handle();
        serve(runtime, controller, &node_name, stop).await
    }

    /// Runs with a CNI plugin. In plugin mode the plugin is started and its drain handle stops
    /// the controller; otherwise the plugin is unused and the controller stops on signals.
    pub async fn run_with_plugin<S, I>(self, server: S, installer: I) -> Result<()>
    where
        S: cni::Server,
        I: cni::Installer,
    {
        let cni_mode = self.cni_mode;
        let (runtime, controller, node_name) = self.build().await?;
        let stop = if cni_mode {
            info!("Starting CNI plugin");
            Plugin::new(server, installer)
                .start(runtime.shutdown_handle())
                .await?
        } else {
            runtime.shutdown_handle()
        };
        serve(runtime, controller, &node_name, stop).await
    }

    async fn build(self) -> Result<(kubert::Runtime, PolicyController, String)> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            mode,
            node_name,
            local_pod_ips_map,
            bpf_dir,
            republish_on_annotation_change,
            cni_mode: _,
        } = self;

        let node_name = match node_name {
            Some(name) => name,
            None => std::env::var("HOSTNAME")
                .context("NODE_NAME is not set and the host name is unknown")?,
        };

        // The map must exist before any pod is observed.
        let policy_map = PinnedPolicyMap::load(&local_pod_ips_map)?;

        let republish = if republish_on_annotation_change {
            index::ip_or_redirection_changed
        } else {
            index::ip_changed
        };

        let mut prom = <Registry>::default();
        let reconciler = Reconciler::new(mode, policy_map, NoopProcessManager::default())
            .with_republish(republish)
            .with_metrics(prom.sub_registry_with_prefix("policy_index"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        info!(%mode, node = %node_name, "Watching pods");
        let controller = Controller::new(Arc::new(reconciler), MakeDatapath::new(bpf_dir));
        Ok((runtime, controller, node_name))
    }
}

async fn serve(
    mut runtime: kubert::Runtime,
    controller: PolicyController,
    node_name: &str,
    stop: drain::Watch,
) -> Result<()> {
    let namespaces = runtime.watch_all::<k8s::Namespace>(k8s::namespaces());
    let pods = runtime.watch_all::<k8s::Pod>(k8s::pods_on_node(node_name));

    let mut controller = tokio::spawn(
        controller
            .run(namespaces, pods, stop)
            .instrument(info_span!("controller")),
    );

    // Block the main thread on the shutdown signal. Once it fires, wait for the controller to
    // unload the datapath before exiting.
    tokio::select! {
        res = runtime.run() => {
            if res.is_err() {
                bail!("Aborted");
            }
        }
        res = &mut controller => return res?,
    }

    controller.await?
}
