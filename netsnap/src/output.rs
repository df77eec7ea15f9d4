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

use std::io::Write;

use anyhow::Context;
use anyhow::Result;

use procfs::MetricSnapshot;

use crate::graphdef::GraphDefs;

pub const PLUGIN_META_ENV: &str = "MACKEREL_AGENT_PLUGIN_META";
const PLUGIN_META_HEADER: &str = "# mackerel-agent-plugin";

/// The agent sets the meta env var when it wants graph definitions
/// instead of values.
pub fn plugin_meta_requested() -> bool {
    std::env::var_os(PLUGIN_META_ENV).is_some_and(|v| !v.is_empty())
}

/// Whether a metric key matches a graph metric pattern, where a `#`
/// segment stands for any single name such as an interface.
fn matches_wildcard(pattern: &str, key: &str) -> bool {
    let mut key_segs = key.split('.');
    for pat in pattern.split('.') {
        match key_segs.next() {
            Some(seg) if pat == "#" => {
                if seg.is_empty()
                    || !seg
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
                {
                    return false;
                }
            }
            Some(seg) if seg == pat => {}
            _ => return false,
        }
    }
    key_segs.next().is_none()
}

/// One "<prefix>.<graph>.<metric>\t<value>\t<timestamp>" line per metric
/// listed in `defs`. Wildcard graphs name the matched key instead, e.g.
/// "network.interface.eth0.rxPackets". Keys no graph lists are not printed.
pub fn write_snapshot<W: Write>(
    out: &mut W,
    prefix: &str,
    defs: &GraphDefs,
    snapshot: &MetricSnapshot,
    timestamp: u64,
) -> Result<()> {
    for (graph_key, graph) in defs.graphs.iter() {
        let graph_name = graph_key
            .strip_prefix(prefix)
            .and_then(|g| g.strip_prefix('.'))
            .unwrap_or(graph_key);

        for metric in graph.metrics.iter() {
            if graph_name.contains('#') {
                let pattern = format!("{}.{}", graph_name, metric.name);
                for (key, value) in snapshot.iter() {
                    if matches_wildcard(&pattern, key) {
                        writeln!(out, "{}.{}\t{}\t{}", prefix, key, value, timestamp)
                            .with_context(|| format!("Failed to write metric {}", key))?;
                    }
                }
            } else if let Some(value) = snapshot.get(&metric.name) {
                writeln!(
                    out,
                    "{}.{}\t{}\t{}",
                    graph_key, metric.name, value, timestamp
                )
                .with_context(|| format!("Failed to write metric {}", metric.name))?;
            }
        }
    }
    out.flush().context("Failed to flush metrics")
}

pub fn write_meta<W: Write>(out: &mut W, defs: &GraphDefs) -> Result<()> {
    writeln!(out, "{}", PLUGIN_META_HEADER).context("Failed to write meta header")?;
    serde_json::to_writer(&mut *out, defs).context("Failed to serialize graph definitions")?;
    writeln!(out).context("Failed to write meta")?;
    out.flush().context("Failed to flush meta")
}
