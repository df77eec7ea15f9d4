// Copyright (c) Facebook, Inc. and its affiliates.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![deny(clippy::all)]

use std::io;
use std::path::PathBuf;
use std::process::exit;
use std::time::SystemTime;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use slog::debug;
use slog::error;

mod graphdef;
mod output;
#[cfg(test)]
mod test;

use common::logutil;
use common::util::get_unix_timestamp;
use config::NetsnapConfig;
use procfs::NetReader;

#[derive(Debug, Parser)]
#[clap(version, about)]
struct Opt {
    #[clap(long, default_value = config::NETSNAP_DEFAULT_CONF)]
    config: PathBuf,
    /// Metric key prefix
    #[clap(long)]
    metric_key_prefix: Option<String>,
    /// Temp file name, owned by the agent
    #[clap(long)]
    tempfile: Option<PathBuf>,
    #[clap(short, long)]
    debug: bool,
}

impl Opt {
    fn load_config(&self) -> Result<NetsnapConfig> {
        let mut config = NetsnapConfig::load(&self.config)?;
        if let Some(prefix) = &self.metric_key_prefix {
            config.metric_key_prefix = prefix.clone();
        }
        if let Some(tempfile) = &self.tempfile {
            config.tempfile = Some(tempfile.clone());
        }
        Ok(config)
    }
}

fn run(opts: &Opt, logger: slog::Logger) -> Result<()> {
    let config = opts.load_config()?;
    debug!(
        logger,
        "Loaded config";
        "prefix" => config.metric_key_prefix(),
        "tempfile" => config.tempfile.as_ref().map(|p| p.to_string_lossy().into_owned())
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let defs = graphdef::graph_definitions(config.metric_key_prefix());
    if output::plugin_meta_requested() {
        return output::write_meta(&mut out, &defs);
    }

    let reader = NetReader::new_with_custom_path(
        config.proc_net_path.clone(),
        config.ss_command.clone(),
        logger,
    )
    .with_context(|| {
        format!(
            "Failed to open {}",
            config.proc_net_path.to_string_lossy()
        )
    })?
    .with_ss_timeout(config.ss_timeout());

    let snapshot = reader.read_snapshot();
    output::write_snapshot(
        &mut out,
        config.metric_key_prefix(),
        &defs,
        &snapshot,
        get_unix_timestamp(SystemTime::now()),
    )
}

fn main() {
    let opts = Opt::parse();
    let logger = logutil::get_logger(opts.debug);

    if let Err(e) = run(&opts, logger.clone()) {
        error!(logger, "{:#}", e);
        exit(1);
    }
}
