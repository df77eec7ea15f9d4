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
use std::collections::BTreeMap;
use std::io::BufRead;
use std::io::BufReader;
use std::io::ErrorKind;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::process::Child;
use std::process::ChildStdout;
use std::process::Command;
use std::process::Stdio;
use std::sync::mpsc::channel;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use openat::Dir;
use slog::debug;
use slog::error;
use slog::warn;
use thiserror::Error;
use threadpool::ThreadPool;

mod types;
pub use types::*;


pub const NET_PROCFS: &str = "/proc/net";
pub const SS_COMMAND: &str = "ss";
/// All TCP sockets, numeric addresses
pub const SS_ARGS: [&str; 1] = ["-nat"];
pub const DEFAULT_SS_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of counter columns following the interface name in /proc/net/dev.
/// Lines with fewer columns are headers or garbage.
pub const NET_DEV_COLUMNS: usize = 16;
const NET_DEV_RX_PACKETS: usize = 1;
const NET_DEV_RX_ERRORS: usize = 2;
const NET_DEV_RX_DROPPED: usize = 3;
const NET_DEV_RX_OVERRUNS: usize = 4;
const NET_DEV_TX_PACKETS: usize = 9;
const NET_DEV_TX_ERRORS: usize = 10;
const NET_DEV_TX_DROPPED: usize = 11;
const NET_DEV_TX_OVERRUNS: usize = 12;

const LOOPBACK_IFACE: &str = "lo";
const SS_HEADER_STATE: &str = "State";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid file format: {0:?}")]
    InvalidFileFormat(PathBuf),
    #[error("{1:?}: {0:?}")]
    IoError(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse {item} as {type_name} in line: {line} from {path:?}")]
    ParseError {
        line: String,
        item: String,
        type_name: String,
        path: PathBuf,
    },
    #[error("Failed to parse {field} of {interface} ({item}) from {path:?}")]
    ParseField {
        field: &'static str,
        interface: String,
        item: String,
        path: PathBuf,
    },
    #[error("Unexpected line ({1}) in file: {0:?}")]
    UnexpectedLine(PathBuf, String),
    #[error("{0:?} exited unsuccessfully: {1}")]
    CommandFailed(PathBuf, String),
    #[error("{0:?} did not finish within {1:?}")]
    CommandTimeout(PathBuf, Duration),
}

pub type Result<T> = std::result::Result<T, Error>;

macro_rules! parse_column {
    // Parse column $col of $fields as f64 or report which counter of
    // which interface was bad
    ($path:expr, $fields:ident, $col:expr, $field:literal, $iface:ident) => {
        $fields[$col].parse::<f64>().map_err(|_| Error::ParseField {
            field: $field,
            interface: $iface.to_string(),
            item: $fields[$col].to_string(),
            path: $path.to_path_buf(),
        })?
    };
}

fn parse_net_dev_line(path: &Path, line: &str) -> Result<Option<InterfaceRecord>> {
    // Format is like "  eth0: 1234 56 0 0 0 0 0 0 7890 12 0 0 0 0 0 0"
    let (name, rest) = match line.split_once(':') {
        Some(kv) => kv,
        None => return Ok(None),
    };
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() < NET_DEV_COLUMNS {
        return Ok(None);
    }
    let name = name.trim();
    if name == LOOPBACK_IFACE {
        return Ok(None);
    }

    Ok(Some(InterfaceRecord {
        name: name.to_owned(),
        rx_packets: parse_column!(path, fields, NET_DEV_RX_PACKETS, "rxPackets", name),
        rx_errors: parse_column!(path, fields, NET_DEV_RX_ERRORS, "rxErrors", name),
        rx_dropped: parse_column!(path, fields, NET_DEV_RX_DROPPED, "rxDropped", name),
        rx_overruns: parse_column!(path, fields, NET_DEV_RX_OVERRUNS, "rxOverruns", name),
        tx_packets: parse_column!(path, fields, NET_DEV_TX_PACKETS, "txPackets", name),
        tx_errors: parse_column!(path, fields, NET_DEV_TX_ERRORS, "txErrors", name),
        tx_dropped: parse_column!(path, fields, NET_DEV_TX_DROPPED, "txDropped", name),
        tx_overruns: parse_column!(path, fields, NET_DEV_TX_OVERRUNS, "txOverruns", name),
    }))
}

/// Parse an interface counter table in /proc/net/dev format into
/// `interface.<name>.<field>` metrics.
///
/// Header lines, short lines and the loopback interface are skipped. The
/// first counter that fails to parse stops the scan; interfaces emitted
/// before it stay in `metrics`.
pub fn parse_net_dev<R: BufRead>(
    metrics: &mut MetricSnapshot,
    reader: R,
    path: &Path,
) -> Result<()> {
    for line in reader.lines() {
        let line = line.map_err(|e| Error::IoError(path.to_path_buf(), e))?;
        if let Some(record) = parse_net_dev_line(path, &line)? {
            record.flatten_into(metrics);
        }
    }
    Ok(())
}

/// Parse header/value line pairs in /proc/net/netstat and /proc/net/snmp
/// format. Keys are "{title}{field}", e.g. "TcpExtSyncookiesFailed".
///
/// Blank lines between blocks are ignored. The input is all or nothing:
/// invalid UTF-8 (reported as `IoError` with `InvalidData`, same as the
/// line readers), a malformed block or a bad value leaves `metrics`
/// untouched.
pub fn parse_kv_blocks(metrics: &mut MetricSnapshot, data: &[u8], path: &Path) -> Result<()> {
    let content = std::str::from_utf8(data).map_err(|e| {
        Error::IoError(
            path.to_path_buf(),
            std::io::Error::new(ErrorKind::InvalidData, e),
        )
    })?;
    let mut parsed = MetricSnapshot::new();
    let mut lines = content.lines();

    while let Some(header) = lines.next() {
        if header.trim().is_empty() {
            continue;
        }
        let values = lines
            .next()
            .ok_or_else(|| Error::InvalidFileFormat(path.to_path_buf()))?;

        let keys: Vec<&str> = header.split_whitespace().collect();
        let vals: Vec<&str> = values.split_whitespace().collect();
        if keys.len() != vals.len() {
            return Err(Error::InvalidFileFormat(path.to_path_buf()));
        }
        // Both lines of a block repeat the same title
        if keys[0] != vals[0] {
            return Err(Error::UnexpectedLine(path.to_path_buf(), values.to_owned()));
        }
        let title = keys[0].strip_suffix(':').unwrap_or(keys[0]);

        for (&k, &v) in keys.iter().zip(vals.iter()).skip(1) {
            let value = v.parse::<f64>().map_err(|_| Error::ParseError {
                line: values.to_owned(),
                item: v.into(),
                type_name: "f64".into(),
                path: path.to_path_buf(),
            })?;
            parsed.insert(format!("{}{}", title, k), value);
        }
    }

    metrics.extend(parsed);
    Ok(())
}

/// Count `ss` output lines by their leading state column.
///
/// The "State ..." header and lines without any field are skipped.
pub fn parse_conn_states<R: BufRead>(
    metrics: &mut MetricSnapshot,
    reader: R,
    path: &Path,
) -> Result<()> {
    for line in reader.lines() {
        let line = line.map_err(|e| Error::IoError(path.to_path_buf(), e))?;
        let state = match line.split_whitespace().next() {
            None | Some(SS_HEADER_STATE) => continue,
            Some(state) => state,
        };
        *metrics.entry(state.to_owned()).or_insert(0.0) += 1.0;
    }
    Ok(())
}

pub struct NetReader {
    proc_net_dir: Dir,
    ss_command: PathBuf,
    ss_timeout: Duration,
    threadpool: ThreadPool,
    logger: slog::Logger,
}

impl NetReader {
    pub fn new(logger: slog::Logger) -> Result<NetReader> {
        Self::new_with_custom_path(NET_PROCFS.into(), SS_COMMAND.into(), logger)
    }

    pub fn new_with_custom_path(
        proc_net_path: PathBuf,
        ss_command: PathBuf,
        logger: slog::Logger,
    ) -> Result<NetReader> {
        let proc_net_dir =
            Dir::open(&proc_net_path).map_err(|e| Error::IoError(proc_net_path, e))?;

        Ok(NetReader {
            proc_net_dir,
            ss_command,
            ss_timeout: DEFAULT_SS_TIMEOUT,
            // ss output is drained off-thread so it can be timed out
            threadpool: ThreadPool::with_name("ss_reader".to_string(), 1),
            logger,
        })
    }

    pub fn with_ss_timeout(mut self, timeout: Duration) -> NetReader {
        self.ss_timeout = timeout;
        self
    }

    fn proc_net_path(&self, filename: &str) -> PathBuf {
        self.proc_net_dir
            .recover_path()
            .unwrap_or_else(|_| NET_PROCFS.into())
            .join(filename)
    }

    fn fill_net_dev(&self, metrics: &mut MetricSnapshot) -> Result<()> {
        let path = self.proc_net_path("dev");
        let file = self
            .proc_net_dir
            .open_file("dev")
            .map_err(|e| Error::IoError(path.clone(), e))?;
        parse_net_dev(metrics, BufReader::new(file), &path)
    }

    fn fill_kv_blocks(&self, stats_filename: &str, metrics: &mut MetricSnapshot) -> Result<()> {
        let path = self.proc_net_path(stats_filename);
        let mut file = self
            .proc_net_dir
            .open_file(stats_filename)
            .map_err(|e| Error::IoError(path.clone(), e))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| Error::IoError(path.clone(), e))?;
        parse_kv_blocks(metrics, &buf, &path)
    }

    fn fill_conn_states(&self, metrics: &mut MetricSnapshot) -> Result<()> {
        let mut child = Command::new(&self.ss_command)
            .args(SS_ARGS)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::IoError(self.ss_command.clone(), e))?;

        let res = match child.stdout.take() {
            Some(stdout) => self.drain_conn_states(stdout, metrics),
            None => Err(Error::InvalidFileFormat(self.ss_command.clone())),
        };
        self.reap(child, res)
    }

    fn drain_conn_states(&self, stdout: ChildStdout, metrics: &mut MetricSnapshot) -> Result<()> {
        let path = self.ss_command.clone();
        let (tx, rx) = channel();
        self.threadpool.execute(move || {
            let mut states = MetricSnapshot::new();
            let res = parse_conn_states(&mut states, BufReader::new(stdout), &path);
            // This is OK to ignore. The receiver is gone after a timeout.
            let _ = tx.send((states, res));
        });

        match rx.recv_timeout(self.ss_timeout) {
            Ok((states, res)) => {
                metrics.extend(states);
                res
            }
            Err(RecvTimeoutError::Timeout) => Err(Error::CommandTimeout(
                self.ss_command.clone(),
                self.ss_timeout,
            )),
            Err(RecvTimeoutError::Disconnected) => Err(Error::CommandFailed(
                self.ss_command.clone(),
                "output reader hung up".into(),
            )),
        }
    }

    /// Wait for the child in every case. A child still running after a
    /// failed read is killed first, which also closes the pipe the reader
    /// thread may be blocked on.
    fn reap(&self, mut child: Child, res: Result<()>) -> Result<()> {
        if let Err(e) = res {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
        let status = child
            .wait()
            .map_err(|e| Error::IoError(self.ss_command.clone(), e))?;
        if !status.success() {
            return Err(Error::CommandFailed(
                self.ss_command.clone(),
                status.to_string(),
            ));
        }
        Ok(())
    }

    fn fill(&self, source: Source, metrics: &mut MetricSnapshot) -> Result<()> {
        match source {
            Source::NetDev => self.fill_net_dev(metrics),
            Source::Netstat => self.fill_kv_blocks("netstat", metrics),
            Source::Snmp => self.fill_kv_blocks("snmp", metrics),
            Source::ConnStates => self.fill_conn_states(metrics),
        }
    }

    fn read_source(&self, source: Source) -> Result<MetricSnapshot> {
        let mut metrics = MetricSnapshot::new();
        self.fill(source, &mut metrics)?;
        Ok(metrics)
    }

    pub fn read_net_dev(&self) -> Result<MetricSnapshot> {
        self.read_source(Source::NetDev)
    }

    pub fn read_netstat(&self) -> Result<MetricSnapshot> {
        self.read_source(Source::Netstat)
    }

    pub fn read_snmp(&self) -> Result<MetricSnapshot> {
        self.read_source(Source::Snmp)
    }

    pub fn read_conn_states(&self) -> Result<MetricSnapshot> {
        self.read_source(Source::ConnStates)
    }

    /// Collect every source into one snapshot.
    ///
    /// A failing source is logged. Line oriented sources still contribute
    /// the lines parsed before the failure; a failed stat file contributes
    /// nothing. A key already produced by an earlier source is dropped.
    pub fn read_snapshot(&self) -> MetricSnapshot {
        let mut snapshot = MetricSnapshot::new();
        let mut owners: BTreeMap<String, Source> = BTreeMap::new();

        for source in Source::ALL {
            let mut metrics = MetricSnapshot::new();
            if let Err(err) = self.fill(source, &mut metrics) {
                warn!(self.logger, "Failed to read {} stats: {}", source, err);
                if !source.keeps_partial() {
                    metrics.clear();
                }
            }
            debug!(
                self.logger,
                "Collected {} metrics",
                metrics.len();
                "source" => source.as_str()
            );

            for (key, value) in metrics {
                if let Some(owner) = owners.get(&key) {
                    error!(
                        self.logger,
                        "Metric {} from {} collides with {}, keeping the first value",
                        key,
                        source,
                        owner
                    );
                    continue;
                }
                owners.insert(key.clone(), source);
                snapshot.insert(key, value);
            }
        }

        snapshot
    }
}
