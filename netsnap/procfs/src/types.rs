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

use std::collections::BTreeMap;

/// One collection cycle worth of metrics, keyed by metric name.
pub type MetricSnapshot = BTreeMap<String, f64>;

#[derive(Default, Clone, PartialEq, Debug)]
pub struct InterfaceRecord {
    pub name: String,
    pub rx_packets: f64,
    pub rx_errors: f64,
    pub rx_dropped: f64,
    pub rx_overruns: f64,
    pub tx_packets: f64,
    pub tx_errors: f64,
    pub tx_dropped: f64,
    pub tx_overruns: f64,
}

impl InterfaceRecord {
    /// Metric names in the order `flatten_into` emits them.
    pub const FIELD_NAMES: [&'static str; 8] = [
        "rxPackets",
        "rxErrors",
        "rxDropped",
        "rxOverruns",
        "txPackets",
        "txErrors",
        "txDropped",
        "txOverruns",
    ];

    fn values(&self) -> [f64; 8] {
        [
            self.rx_packets,
            self.rx_errors,
            self.rx_dropped,
            self.rx_overruns,
            self.tx_packets,
            self.tx_errors,
            self.tx_dropped,
            self.tx_overruns,
        ]
    }

    /// Emits `interface.<name>.<field>` for all eight counters.
    pub fn flatten_into(self, metrics: &mut MetricSnapshot) {
        for (field, value) in Self::FIELD_NAMES.iter().zip(self.values()) {
            metrics.insert(format!("interface.{}.{}", self.name, field), value);
        }
    }
}

/// Identifies which input a metric came from, for logging.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Source {
    NetDev,
    Netstat,
    Snmp,
    ConnStates,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::NetDev,
        Source::Netstat,
        Source::Snmp,
        Source::ConnStates,
    ];

    /// Whether output parsed before a failure is still reported. Stat files
    /// are all or nothing, line oriented sources keep complete lines.
    pub fn keeps_partial(&self) -> bool {
        match self {
            Source::NetDev | Source::ConnStates => true,
            Source::Netstat | Source::Snmp => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::NetDev => "net_dev",
            Source::Netstat => "netstat",
            Source::Snmp => "snmp",
            Source::ConnStates => "conn_states",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
