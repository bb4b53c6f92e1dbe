use crate::{
    admission::Admission,
    index::{metrics::IndexMetrics, Index},
    k8s::{Namespace, SecurityContextConstraints},
    metrics::AdmissionMetrics,
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "scc",
    about = "Assigns security context constraints to pods at admission"
)]
pub struct Args {
    #[clap(long, default_value = "scc=info,warn", env = "SCC_CONTROLLER_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the admission controller server.
    #[clap(long)]
    admission_controller_disabled: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            admission_controller_disabled,
        } = self;

        let server = if admission_controller_disabled {
            None
        } else {
            Some(server)
        };

        // The index holds every constraint and the namespace allocations the
        // admission server resolves them against.
        let index = Index::shared();

        let mut prom = <Registry>::default();
        let indexes =
            IndexMetrics::register(index.clone(), prom.sub_registry_with_prefix("index")).shared();
        let admission_metrics =
            AdmissionMetrics::register(prom.sub_registry_with_prefix("admission"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        // Spawn resource watches.

        let constraints =
            runtime.watch_all::<SecurityContextConstraints>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(indexes.clone(), constraints)
                .instrument(info_span!("securitycontextconstraints")),
        );

        let namespaces = runtime.watch_all::<Namespace>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(indexes, namespaces).instrument(info_span!("namespaces")),
        );

        let runtime =
            runtime.spawn_server(move || Admission::new(index.clone(), admission_metrics.clone()));

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
