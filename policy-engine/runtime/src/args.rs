use crate::{index, k8s, Exceptions};
use anyhow::{bail, Result};
use clap::Parser;
use futures::prelude::*;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "admission-policy", about = "An admission policy exception resolver")]
pub struct Args {
    #[clap(
        long,
        default_value = "admission_policy=info,warn",
        env = "POLICY_ENGINE_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Only policy exceptions in this namespace are honored. Exceptions in all namespaces are
    /// honored when unset.
    #[clap(long)]
    exception_namespace: Option<String>,

    #[clap(long, default_value = "true", action = clap::ArgAction::Set)]
    enable_policy_exception: bool,
}

impl Args {
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            exception_namespace,
            enable_policy_exception,
        } = self;

        let exceptions = Exceptions::new(exception_namespace.clone(), enable_policy_exception);

        let mut prom = <Registry>::default();
        index::metrics::register(
            prom.sub_registry_with_prefix("admission"),
            exceptions.index().clone(),
        );
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        if enable_policy_exception {
            let events = match exception_namespace {
                Some(ns) => runtime
                    .watch_namespaced::<k8s::PolicyException>(ns, watcher::Config::default())
                    .boxed(),
                None => runtime
                    .watch_all::<k8s::PolicyException>(watcher::Config::default())
                    .boxed(),
            };
            tokio::spawn(
                index::watch(exceptions.index().clone(), events)
                    .instrument(info_span!("policyexceptions")),
            );
        } else {
            info!("Policy exceptions are disabled");
        }

        // Block the main thread on the shutdown signal. Once it fires, wait for the background
        // tasks to complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
