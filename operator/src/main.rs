/*
 * Copyright (c) Huawei Technologies Co., Ltd. 2024. All rights reserved.
 * oploop is licensed under the Mulan PSL v2.
 * You can use this software according to the terms and conditions of the Mulan PSL v2.
 * You may obtain a copy of Mulan PSL v2 at:
 *     http://license.coscl.org.cn/MulanPSL2
 * THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND, EITHER EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR
 * PURPOSE.
 * See the Mulan PSL v2 for more details.
 */

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use controller::{Controller, EventHandler, WatchSource};
use env_logger::{Builder, Env, Target};
use futures::FutureExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    api::{Api, ListParams},
    client::Client,
};
use log::{debug, error, info};
use tokio::signal;

mod commands;
mod configmap;
use commands::{Cli, Config};
use configmap::{configmap_predicates, ConfigMapController, ControllerClient, CONTROLLER_NAME};

const OPERATOR_VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_log_level = if cli.debug {
        "operator=debug,controller=debug,workqueue=debug"
    } else {
        "operator=info,controller=info,workqueue=info"
    };
    Builder::from_env(Env::default().default_filter_or(default_log_level)).target(Target::Stdout).init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply_cli(&cli);
    debug!("Config: {:?}", config);
    let selector = config.label_selector()?;

    let client = Client::try_default().await?;
    let configmaps: Api<ConfigMap> = match &config.watch.namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };
    let list_params = if selector.is_empty() {
        ListParams::default()
    } else {
        ListParams::default().labels(&selector.to_string())
    };
    let mut source = WatchSource::new(configmaps, list_params);
    let reconciler = ConfigMapController::new(ControllerClient::new(client));
    let controller =
        Controller::new(CONTROLLER_NAME, Arc::new(source.cache()), Arc::new(reconciler), config.controller_config());
    source.dispatch_to(controller.watch(EventHandler::EnqueueForObject).with_predicates(configmap_predicates()));

    info!("operator version is {}, starting {}", OPERATOR_VERSION.unwrap_or("Not Found"), controller.name());
    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("received interrupt, shutting down"),
            Err(e) => error!("failed to listen for interrupt: {}, shutting down", e),
        }
    }
    .boxed()
    .shared();
    tokio::join!(source.run(shutdown.clone()), controller.run(shutdown));
    info!("operator terminated");
    Ok(())
}
