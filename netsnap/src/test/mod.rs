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

use std::path::PathBuf;

use clap::Parser;
use maplit::btreemap;
use tempfile::TempDir;

use crate::graphdef::graph_definitions;
use crate::graphdef::GraphDefs;
use crate::output::write_meta;
use crate::output::write_snapshot;
use crate::Opt;

#[test]
fn test_opts_override_config() {
    let tempdir = TempDir::new().expect("Failed to create temp dir");
    let path = tempdir.path().join("netsnap.conf");
    std::fs::write(&path, "metric_key_prefix = 'fromfile'\nss_timeout_ms = 10\n")
        .expect("Failed to write conf");

    let opts = Opt::try_parse_from([
        "netsnap",
        "--config",
        path.to_str().expect("tempdir path is not utf8"),
        "--metric-key-prefix",
        "net",
        "--tempfile",
        "/tmp/state",
    ])
    .expect("Failed to parse args");
    let config = opts.load_config().expect("Failed to load config");
    assert_eq!(config.metric_key_prefix(), "net");
    assert_eq!(config.tempfile, Some(PathBuf::from("/tmp/state")));
    assert_eq!(config.ss_timeout_ms, 10);

    let opts = Opt::try_parse_from([
        "netsnap",
        "--config",
        path.to_str().expect("tempdir path is not utf8"),
    ])
    .expect("Failed to parse args");
    let config = opts.load_config().expect("Failed to load config");
    assert_eq!(config.metric_key_prefix(), "fromfile");
    assert_eq!(config.tempfile, None);
}

#[test]
fn test_opts_missing_config() {
    let opts = Opt::try_parse_from(["netsnap", "--config", "/no/such/netsnap.conf"])
        .expect("Failed to parse args");
    assert!(opts.load_config().is_err());
}

#[test]
fn test_write_snapshot() {
    let snapshot = btreemap! {
        "interface.eth0.rxPackets".to_string() => 100.0,
        "TcpRtoMin".to_string() => 200.0,
        "ESTAB".to_string() => 2.0,
        "TcpEstabResets".to_string() => 31.0,
        "TcpExtSyncookiesFailed".to_string() => 7.0,
    };
    let defs = graph_definitions("network");
    let mut buf = Vec::new();
    write_snapshot(&mut buf, "network", &defs, &snapshot, 1700000000).expect("Failed to write");
    // TcpRtoMin has no graph and is not printed
    assert_eq!(
        String::from_utf8(buf).expect("Output is not utf8"),
        "network.interface.eth0.rxPackets\t100\t1700000000
network.tcp.conn.state.ESTAB\t2\t1700000000
network.tcp.statistic.TcpEstabResets\t31\t1700000000
network.tcp.syncookie.TcpExtSyncookiesFailed\t7\t1700000000
"
    );
}

#[test]
fn test_write_snapshot_interface_wildcard() {
    let snapshot = btreemap! {
        "interface.eth0.txDropped".to_string() => 4.0,
        "interface.br-lan_1.txDropped".to_string() => 5.0,
        "interface.eth0.100.txDropped".to_string() => 6.0,
        "interface.eth0.bogus".to_string() => 7.0,
        "TcpExtTCPBacklogDrop".to_string() => -1.0,
    };
    let defs = graph_definitions("edge");
    let mut buf = Vec::new();
    write_snapshot(&mut buf, "edge", &defs, &snapshot, 42).expect("Failed to write");
    assert_eq!(
        String::from_utf8(buf).expect("Output is not utf8"),
        "edge.interface.br-lan_1.txDropped\t5\t42
edge.interface.eth0.txDropped\t4\t42
edge.tcp.backlog.TcpExtTCPBacklogDrop\t-1\t42
"
    );
}

#[test]
fn test_graph_definitions() {
    let defs = graph_definitions("network");
    assert_eq!(defs.graphs.len(), 6);
    assert!(defs.graphs.keys().all(|k| k.starts_with("network.")));

    let iface = &defs.graphs["network.interface.#"];
    assert_eq!(iface.label, "Network Interface");
    assert_eq!(iface.unit, "integer");
    assert_eq!(iface.metrics.len(), 8);
    assert!(iface.metrics.iter().all(|m| m.diff && !m.stacked));

    let states = &defs.graphs["network.tcp.conn.state"];
    assert_eq!(states.label, "Network Tcp Connection States");
    assert_eq!(states.metrics.len(), 12);
    assert!(states.metrics.iter().all(|m| !m.diff && m.stacked));
    assert_eq!(states.metrics[0].name, "ESTAB");
    assert_eq!(states.metrics[0].label, "Established");

    let syncookie = &defs.graphs["network.tcp.syncookie"];
    assert_eq!(syncookie.metrics[0].name, "TcpExtSyncookiesFailed");

    let custom = graph_definitions("edge");
    assert_eq!(custom.graphs["edge.tcp.backlog"].label, "Edge TCP Backlog");
    let dashed = graph_definitions("my-net");
    assert_eq!(dashed.graphs["my-net.interface.#"].label, "My-Net Interface");
}

#[test]
fn test_write_meta() {
    let defs = graph_definitions("network");
    let mut buf = Vec::new();
    write_meta(&mut buf, &defs).expect("Failed to write meta");
    let out = String::from_utf8(buf).expect("Output is not utf8");

    let (header, body) = out.split_once('\n').expect("Missing meta header");
    assert_eq!(header, "# mackerel-agent-plugin");
    let parsed: GraphDefs = serde_json::from_str(body.trim_end()).expect("Invalid meta json");
    assert_eq!(parsed, defs);
}
