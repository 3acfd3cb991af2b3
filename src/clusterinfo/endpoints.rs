//! Monitor endpoint config map encoding

use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use super::{
    ClusterInfo, Mapping, MonInfo, ENDPOINT_DATA_KEY, EXTERNAL_MONS_KEY, MAPPING_KEY,
    MAX_MON_ID_KEY, MON_SECRET_NAME, OUT_OF_QUORUM_KEY,
};
use crate::error::Result;

/// Parse `name=host:port,name=host:port`
///
/// Entries without exactly one `=` are logged and skipped.
pub fn parse_mon_endpoints(input: &str) -> BTreeMap<String, MonInfo> {
    let mut mons = BTreeMap::new();
    if input.trim().is_empty() {
        return mons;
    }
    for raw in input.split(',') {
        let parts: Vec<&str> = raw.split('=').collect();
        if parts.len() != 2 {
            warn!(monitor = %raw, "ignoring invalid monitor");
            continue;
        }
        mons.insert(parts[0].to_string(), MonInfo::new(parts[0], parts[1]));
    }
    mons
}

/// Inverse of `parse_mon_endpoints`, in name order
pub fn flatten_mon_endpoints(mons: &BTreeMap<String, MonInfo>) -> String {
    mons.values()
        .map(|m| format!("{}={}", m.name, m.endpoint))
        .collect::<Vec<_>>()
        .join(",")
}

/// Index of a monitor letter name: `a` is 0, `z` is 25, `aa` is 26
///
/// Purely numeric names are their own index.
pub fn name_to_index(name: &str) -> Option<i32> {
    if name.is_empty() {
        return None;
    }
    if name.bytes().all(|b| b.is_ascii_digit()) {
        return name.parse().ok();
    }
    let mut index: i64 = 0;
    for b in name.bytes() {
        if !b.is_ascii_lowercase() {
            return None;
        }
        index = index * 26 + i64::from(b - b'a' + 1);
        if index > i64::from(i32::MAX) {
            return None;
        }
    }
    i32::try_from(index - 1).ok()
}

/// Letter name of a monitor index, inverse of `name_to_index`
pub fn index_to_name(index: i32) -> String {
    let mut n = i64::from(index.max(0)) + 1;
    let mut out = Vec::new();
    while n > 0 {
        n -= 1;
        out.push(b'a' + (n % 26) as u8);
        n /= 26;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Index of a full monitor name, with or without the `rook-ceph-mon-` prefix
pub fn full_name_to_index(name: &str) -> Option<i32> {
    let short = name.strip_prefix(MON_SECRET_NAME).unwrap_or(name);
    let short = short.strip_prefix('-').unwrap_or(short);
    name_to_index(short)
}

fn split_names(raw: Option<&String>) -> Vec<&str> {
    raw.map(|s| s.split(',').map(str::trim).filter(|n| !n.is_empty()).collect())
        .unwrap_or_default()
}

/// Monitor state decoded from the endpoint config map
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonConfig {
    pub monitors: BTreeMap<String, MonInfo>,
    pub external_mons: BTreeMap<String, MonInfo>,
    pub max_mon_id: i32,
    pub mapping: Mapping,
}

/// Decode endpoint config map data
///
/// The stored max ID is raised to the highest parsed monitor index. Unknown
/// out-of-quorum names are ignored. External names are moved out of the
/// internal map.
pub fn load_mon_config(data: &BTreeMap<String, String>) -> MonConfig {
    let mut monitors = data
        .get(ENDPOINT_DATA_KEY)
        .map(|d| parse_mon_endpoints(d))
        .unwrap_or_default();

    let mut stored_max = -1;
    if let Some(raw) = data.get(MAX_MON_ID_KEY) {
        match raw.trim().parse::<i32>() {
            Ok(id) => stored_max = id,
            Err(e) => error!(value = %raw, error = %e, "invalid max mon id"),
        }
    }
    let actual_max = monitors
        .keys()
        .filter_map(|n| full_name_to_index(n))
        .fold(stored_max, i32::max);
    if actual_max != stored_max {
        info!(stored = stored_max, actual = actual_max, "updating obsolete maxMonId");
    }

    for name in split_names(data.get(OUT_OF_QUORUM_KEY)) {
        match monitors.get_mut(name) {
            Some(m) => m.out_of_quorum = true,
            None => warn!(monitor = %name, "out of quorum monitor not found in endpoints"),
        }
    }

    let mut external_mons = BTreeMap::new();
    for name in split_names(data.get(EXTERNAL_MONS_KEY)) {
        if let Some(m) = monitors.remove(name) {
            external_mons.insert(name.to_string(), m);
        }
    }

    let mapping = match data.get(MAPPING_KEY).filter(|m| !m.trim().is_empty()) {
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            error!(error = %e, "invalid JSON in mon mapping");
            Mapping::default()
        }),
        None => Mapping::default(),
    };

    debug!(
        max_mon_id = actual_max,
        mons = monitors.len(),
        external = external_mons.len(),
        "loaded mon config"
    );
    MonConfig {
        monitors,
        external_mons,
        max_mon_id: actual_max,
        mapping,
    }
}

/// Encode the cluster info's monitor state as endpoint config map data
pub fn mon_config_data(info: &ClusterInfo) -> Result<BTreeMap<String, String>> {
    let mut all = info.monitors.clone();
    all.extend(info.external_mons.clone());

    let mut data = BTreeMap::new();
    data.insert(ENDPOINT_DATA_KEY.to_string(), flatten_mon_endpoints(&all));
    data.insert(
        EXTERNAL_MONS_KEY.to_string(),
        info.external_mons.keys().cloned().collect::<Vec<_>>().join(","),
    );
    data.insert(OUT_OF_QUORUM_KEY.to_string(), info.out_of_quorum().join(","));
    data.insert(MAX_MON_ID_KEY.to_string(), info.max_mon_id.to_string());
    data.insert(MAPPING_KEY.to_string(), serde_json::to_string(&info.mapping)?);
    Ok(data)
}
