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

use std::time::SystemTime;


/// Seconds since epoch, or 0 for a clock set before it
pub fn get_unix_timestamp(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Uppercase the first letter of every word, e.g. "my-net" -> "My-Net".
/// Letters, digits and underscores continue a word; anything else ends it.
pub fn title_case(val: &str) -> String {
    let mut res = String::with_capacity(val.len());
    let mut word_start = true;
    for c in val.chars() {
        if word_start {
            res.extend(c.to_uppercase());
        } else {
            res.push(c);
        }
        word_start = !(c.is_alphanumeric() || c == '_');
    }
    res
}
