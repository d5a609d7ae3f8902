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

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use controller::{predicate::selector_error, values::DEFAULT_MAX_RETRIES, ControllerConfig, LabelSelector};
use serde::Deserialize;
use tokio::time::Duration;

#[derive(Parser, Debug)]
#[clap(name = "operator")]
#[clap(author, version, about)]
#[clap(about = "Example operator counting the data keys of ConfigMaps")]
pub struct Cli {
    /// Enable debug logging
    #[clap(short, long, action)]
    pub debug: bool,
    /// Path to the configuration file
    #[arg(short, long, value_parser)]
    pub config: Option<PathBuf>,
    /// Number of concurrent workers, overrides the configuration file
    #[arg(short, long)]
    pub workers: Option<usize>,
    /// Consecutive failures after which a key is dropped, overrides the configuration file
    #[arg(long)]
    pub max_retries: Option<u32>,
    /// Only watch ConfigMaps of this namespace
    #[arg(short, long)]
    pub namespace: Option<String>,
    /// Only watch ConfigMaps matching this label selector, e.g. app=web,tier!=db
    #[arg(short = 'l', long)]
    pub selector: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ControllerSection {
    /// Optional: defaults to the available parallelism
    pub workers: Option<usize>,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
    /// Optional: periodic reconcile of every ConfigMap
    pub reconcile_period_secs: Option<u64>,
}

impl Default for ControllerSection {
    fn default() -> Self {
        let defaults = ControllerConfig::default();
        ControllerSection {
            workers: None,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            max_delay_secs: defaults.max_delay.as_secs(),
            reconcile_period_secs: None,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct WatchSection {
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub controller: ControllerSection,
    pub watch: WatchSection,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Flags given on the command line win over the file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(workers) = cli.workers {
            self.controller.workers = Some(workers);
        }
        if let Some(max_retries) = cli.max_retries {
            self.controller.max_retries = max_retries;
        }
        if let Some(namespace) = &cli.namespace {
            self.watch.namespace = Some(namespace.clone());
        }
        if let Some(selector) = &cli.selector {
            self.watch.label_selector = Some(selector.clone());
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        let defaults = ControllerConfig::default();
        ControllerConfig {
            workers: self.controller.workers.unwrap_or(defaults.workers),
            max_retries: self.controller.max_retries,
            base_delay: Duration::from_millis(self.controller.base_delay_ms),
            max_delay: Duration::from_secs(self.controller.max_delay_secs),
            reconcile_period: self.controller.reconcile_period_secs.map(Duration::from_secs),
        }
    }

    pub fn label_selector(&self) -> Result<LabelSelector, selector_error::Error> {
        self.watch.label_selector.as_deref().unwrap_or_default().parse()
    }
}
