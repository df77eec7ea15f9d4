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

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use anyhow::bail;
use serde::Deserialize;
use serde::Serialize;


pub const NETSNAP_DEFAULT_CONF: &str = "/etc/netsnap/netsnap.conf";
pub const DEFAULT_METRIC_KEY_PREFIX: &str = "network";

#[derive(Serialize, Deserialize, Debug, PartialEq)]
// If value is missing during deserialization, use the Default::default()
#[serde(default)]
pub struct NetsnapConfig {
    pub metric_key_prefix: String,
    /// State file of the host agent for delta computation. Carried through
    /// untouched; nothing in netsnap reads or writes it.
    pub tempfile: Option<PathBuf>,
    pub proc_net_path: PathBuf,
    pub ss_command: PathBuf,
    pub ss_timeout_ms: u64,
}

impl Default for NetsnapConfig {
    fn default() -> Self {
        NetsnapConfig {
            metric_key_prefix: DEFAULT_METRIC_KEY_PREFIX.into(),
            tempfile: None,
            proc_net_path: procfs::NET_PROCFS.into(),
            ss_command: procfs::SS_COMMAND.into(),
            ss_timeout_ms: procfs::DEFAULT_SS_TIMEOUT.as_millis() as u64,
        }
    }
}

impl NetsnapConfig {
    pub fn load(path: &Path) -> Result<Self> {
        match path.exists() {
            true if !path.is_file() => bail!("{} exists and is not a file", path.to_string_lossy()),
            true => NetsnapConfig::load_exists(path),
            false if path.to_string_lossy() == NETSNAP_DEFAULT_CONF => Ok(Default::default()),
            false => bail!("No such file or directory: {}", path.to_string_lossy()),
        }
    }

    fn load_exists(path: &Path) -> Result<Self> {
        let string_config = match fs::read_to_string(path) {
            Ok(sc) => sc,
            Err(e) => {
                bail!(
                    "Failed to read from config file {}: {}",
                    path.to_string_lossy(),
                    e
                );
            }
        };

        match toml::from_str(string_config.as_str()) {
            Ok(nc) => Ok(nc),
            Err(e) => {
                bail!(
                    "Failed to parse config file {}: {}\n{}",
                    path.to_string_lossy(),
                    e,
                    string_config
                );
            }
        }
    }

    /// An empty prefix falls back to the default one
    pub fn metric_key_prefix(&self) -> &str {
        if self.metric_key_prefix.is_empty() {
            DEFAULT_METRIC_KEY_PREFIX
        } else {
            &self.metric_key_prefix
        }
    }

    pub fn ss_timeout(&self) -> Duration {
        Duration::from_millis(self.ss_timeout_ms)
    }
}
