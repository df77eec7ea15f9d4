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

//! Graph definitions handed to the monitoring agent so it knows how to
//! chart each metric group and which metrics are cumulative counters.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use common::util::title_case;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetricDef {
    pub name: String,
    pub label: String,
    /// The agent reports the per-interval difference instead of the raw value
    pub diff: bool,
    pub stacked: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GraphDef {
    pub label: String,
    pub unit: String,
    pub metrics: Vec<MetricDef>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GraphDefs {
    pub graphs: BTreeMap<String, GraphDef>,
}

pub const CONN_STATES: [(&str, &str); 12] = [
    ("ESTAB", "Established"),
    ("SYN-SENT", "Syn Sent"),
    ("SYN-RECV", "Syn Received"),
    ("FIN-WAIT-1", "Fin Wait 1"),
    ("FIN-WAIT-2", "Fin Wait 2"),
    ("TIME-WAIT", "Time Wait"),
    ("UNCONN", "Close"),
    ("CLOSE-WAIT", "Close Wait"),
    ("LAST-ACK", "Last Ack"),
    ("LISTEN", "Listen"),
    ("CLOSING", "Closing"),
    ("UNKNOWN", "Unknown"),
];

fn counter(name: &str, label: &str) -> MetricDef {
    MetricDef {
        name: name.into(),
        label: label.into(),
        diff: true,
        stacked: false,
    }
}

fn gauge_stacked(name: &str, label: &str) -> MetricDef {
    MetricDef {
        name: name.into(),
        label: label.into(),
        diff: false,
        stacked: true,
    }
}

/// Graphs keyed by "<prefix>.<graph name>". `interface.#` is a wildcard
/// graph matched against every `interface.<name>` group.
pub fn graph_definitions(prefix: &str) -> GraphDefs {
    let label_prefix = title_case(prefix);
    let graph = |label: &str, metrics: Vec<MetricDef>| GraphDef {
        label: format!("{} {}", label_prefix, label),
        unit: "integer".into(),
        metrics,
    };

    let mut graphs = BTreeMap::new();
    graphs.insert(
        "interface.#",
        graph(
            "Interface",
            procfs::InterfaceRecord::FIELD_NAMES
                .iter()
                .map(|name| counter(name, name))
                .collect(),
        ),
    );
    graphs.insert(
        "ip.statistic",
        graph(
            "IP Statistics",
            vec![counter("IpExtInCsumErrors", "InCsumErrors")],
        ),
    );
    graphs.insert(
        "tcp.backlog",
        graph("TCP Backlog", vec![counter("TcpExtTCPBacklogDrop", "Drop")]),
    );
    graphs.insert(
        "tcp.conn.state",
        graph(
            "Tcp Connection States",
            CONN_STATES
                .iter()
                .map(|(name, label)| gauge_stacked(name, label))
                .collect(),
        ),
    );
    graphs.insert(
        "tcp.statistic",
        graph(
            "Tcp Statistics",
            vec![
                counter("TcpEstabResets", "Received Reset"),
                counter("TcpOutRsts", "Sent Reset"),
                counter("TcpRetransSegs", "Retrans Segs"),
            ],
        ),
    );
    graphs.insert(
        "tcp.syncookie",
        graph(
            "Tcp Syncookies",
            vec![counter("TcpExtSyncookiesFailed", "Failed")],
        ),
    );

    GraphDefs {
        graphs: graphs
            .into_iter()
            .map(|(name, def)| (format!("{}.{}", prefix, name), def))
            .collect(),
    }
}
