//! Create/update/delete validation of every custom resource
//!
//! Create validation enforces the static invariants of a spec. Update
//! validation compares against the previous object for immutable fields and
//! then re-runs the create checks on the new object. Delete is always allowed
//! here; finalizers gate actual removal.

use std::collections::HashSet;

use crate::crd::*;
use crate::error::{Error, Result};
use crate::spec::network::NetworkProvider;
use crate::spec::opmask::OpMask;
use crate::spec::storage::{OSD_STORE_BLUESTORE, OSD_STORE_BLUESTORE_RDR};

/// Validation entry points shared by every resource kind
pub trait Validate {
    fn validate_create(&self) -> Result<()>;

    fn validate_update(&self, _old: &Self) -> Result<()> {
        self.validate_create()
    }

    fn validate_delete(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// CephCluster
// =============================================================================

impl Validate for CephCluster {
    fn validate_create(&self) -> Result<()> {
        let spec = &self.spec;

        if spec.is_external() {
            validate_external_exclusive(spec)?;
        } else if spec.mon.count < 1 {
            return Err(Error::validation(format!(
                "invalid mon count {}: at least one mon is required",
                spec.mon.count
            )));
        }

        if let Some(stretch) = &spec.mon.stretch_cluster {
            if !stretch.zones.is_empty() && (stretch.zones.len() as i32) < spec.mon.count {
                return Err(Error::validation(format!(
                    "stretch cluster declares {} zones but {} mons are desired; zones must be at least the mon count",
                    stretch.zones.len(),
                    spec.mon.count
                )));
            }
            if stretch.zones.iter().filter(|z| z.arbiter).count() > 1 {
                return Err(Error::validation(
                    "stretch cluster may declare at most one arbiter zone",
                ));
            }
        }

        spec.network.validate()?;

        let store = spec.storage.store.r#type.as_str();
        if !store.is_empty() && store != OSD_STORE_BLUESTORE && store != OSD_STORE_BLUESTORE_RDR {
            return Err(Error::validation(format!(
                "osd store type {:?} is not supported, use {:?} or {:?}",
                store, OSD_STORE_BLUESTORE, OSD_STORE_BLUESTORE_RDR
            )));
        }

        let policy = &spec.cleanup_policy;
        if !policy.confirmation.is_empty() && !policy.has_data_dir_clean_policy() {
            return Err(Error::validation(format!(
                "cleanup policy confirmation {:?} is invalid, only {:?} arms the cleanup",
                policy.confirmation, DELETE_DATA_DIRS_ON_HOSTS_CONFIRMATION
            )));
        }
        if policy.sanitize_disks.iteration < 1 {
            return Err(Error::validation(format!(
                "sanitize disks iteration must be at least 1, got {}",
                policy.sanitize_disks.iteration
            )));
        }

        Ok(())
    }

    fn validate_update(&self, old: &Self) -> Result<()> {
        if !old.spec.data_dir_host_path.is_empty()
            && old.spec.data_dir_host_path != self.spec.data_dir_host_path
        {
            return Err(Error::immutable(
                "dataDirHostPath",
                format!(
                    "it was {:?} and cannot become {:?}",
                    old.spec.data_dir_host_path, self.spec.data_dir_host_path
                ),
            ));
        }

        for set in &self.spec.storage.storage_class_device_sets {
            let Some(prev) = old
                .spec
                .storage
                .storage_class_device_sets
                .iter()
                .find(|s| s.name == set.name)
            else {
                continue;
            };
            if prev.encrypted != set.encrypted {
                return Err(Error::immutable(
                    format!("storageClassDeviceSets[{}].encrypted", set.name),
                    format!("encryption was {} and cannot become {}", prev.encrypted, set.encrypted),
                ));
            }
        }

        // only moves between the default network and host networking are allowed
        let (old_net, new_net) = (&old.spec.network, &self.spec.network);
        let to_or_from_host = old_net.provider == NetworkProvider::Host
            || new_net.provider == NetworkProvider::Host;
        if old_net.provider != new_net.provider
            && (old_net.is_multus() || new_net.is_multus() || !to_or_from_host)
        {
            return Err(Error::immutable(
                "network.provider",
                format!(
                    "changing the provider from {:?} to {:?} is not supported",
                    old_net.provider.to_string(),
                    new_net.provider.to_string()
                ),
            ));
        }

        self.validate_create()
    }
}

/// An external cluster only carries connection settings
fn validate_external_exclusive(spec: &ClusterSpec) -> Result<()> {
    let mut set = Vec::new();
    if spec.mon != MonSpec::default() {
        set.push("mon");
    }
    if spec.dashboard != DashboardSpec::default() {
        set.push("dashboard");
    }
    if spec.monitoring != MonitoringSpec::default() {
        set.push("monitoring");
    }
    if spec.disruption_management != DisruptionManagementSpec::default() {
        set.push("disruptionManagement");
    }
    if spec.network.provider != NetworkProvider::Default || !spec.network.selectors.is_empty() {
        set.push("network");
    }
    if !spec.mgr.modules.is_empty() {
        set.push("mgr.modules");
    }
    if spec.storage != Default::default() {
        set.push("storage");
    }

    if set.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "invalid external cluster spec: {} must not be set when external.enable is true",
            set.join(", ")
        )))
    }
}

// =============================================================================
// Pools
// =============================================================================

const COMPRESSION_MODES: [&str; 4] = ["none", "passive", "aggressive", "force"];
const MIRRORING_MODES: [&str; 2] = ["image", "pool"];

/// Check a pool spec; `require_one` demands exactly one of replicated or erasure coded
pub fn validate_pool_spec(pool: &PoolSpec, require_one: bool) -> Result<()> {
    match (pool.is_replicated(), pool.is_erasure_coded()) {
        (true, true) => {
            return Err(Error::validation(
                "invalid pool spec: both replicated and erasureCoded cannot be set at the same time",
            ))
        }
        (false, false) if require_one => {
            return Err(Error::validation(
                "invalid pool spec: one of replicated or erasureCoded must be set",
            ))
        }
        _ => {}
    }

    if let Some(ec) = pool.erasure_coded.as_ref().filter(|_| pool.is_erasure_coded()) {
        if ec.data_chunks < 2 {
            return Err(Error::validation(format!(
                "invalid erasure code data chunks {}: needs minimum value of 2",
                ec.data_chunks
            )));
        }
        if ec.coding_chunks < 1 {
            return Err(Error::validation(format!(
                "invalid erasure code coding chunks {}: needs minimum value of 1",
                ec.coding_chunks
            )));
        }
    }

    if let Some(r) = pool.replicated.as_ref().filter(|_| pool.is_replicated()) {
        if r.size == 1 && r.require_safe_replica_size {
            return Err(Error::validation(
                "invalid replicated size 1 while requireSafeReplicaSize is true",
            ));
        }
        if r.replicas_per_failure_domain > 1 {
            let rpfd = r.replicas_per_failure_domain;
            if !rpfd.is_power_of_two() || rpfd >= r.size {
                return Err(Error::validation(format!(
                    "replicasPerFailureDomain {} must be a power of two and smaller than the pool size {}",
                    rpfd, r.size
                )));
            }
        }
        if !r.sub_failure_domain.is_empty() && r.sub_failure_domain == pool.failure_domain {
            return Err(Error::validation(format!(
                "failure domain {:?} and sub failure domain {:?} must differ",
                pool.failure_domain, r.sub_failure_domain
            )));
        }
    }

    if !pool.compression_mode.is_empty()
        && !COMPRESSION_MODES.contains(&pool.compression_mode.as_str())
    {
        return Err(Error::validation(format!(
            "unrecognized compression mode {:?}, expected one of {}",
            pool.compression_mode,
            COMPRESSION_MODES.join(", ")
        )));
    }

    if let Some(m) = pool.mirroring.as_ref().filter(|m| m.enabled) {
        if !MIRRORING_MODES.contains(&m.mode.as_str()) {
            return Err(Error::validation(format!(
                "unrecognized mirroring mode {:?}. only 'image' and 'pool' are supported",
                m.mode
            )));
        }
        for schedule in &m.snapshot_schedules {
            if !schedule.start_time.is_empty() && schedule.interval.is_empty() {
                return Err(Error::validation(format!(
                    "snapshot schedule start time {:?} requires an interval",
                    schedule.start_time
                )));
            }
        }
    }

    Ok(())
}

/// Replication type cannot flip once the pool exists
fn validate_pool_update(old: &PoolSpec, new: &PoolSpec) -> Result<()> {
    if old.is_replicated() && new.is_erasure_coded() {
        return Err(Error::immutable(
            "erasureCoded",
            "a replicated pool cannot become erasure coded",
        ));
    }
    if old.is_erasure_coded() && new.is_replicated() {
        return Err(Error::immutable(
            "replicated",
            "an erasure coded pool cannot become replicated",
        ));
    }
    Ok(())
}

impl Validate for CephBlockPool {
    fn validate_create(&self) -> Result<()> {
        validate_pool_spec(&self.spec.pool, true)
    }

    fn validate_update(&self, old: &Self) -> Result<()> {
        validate_pool_update(&old.spec.pool, &self.spec.pool)?;
        self.validate_create()
    }
}

impl Validate for CephBlockPoolRadosNamespace {
    fn validate_create(&self) -> Result<()> {
        if self.spec.block_pool_name.is_empty() {
            return Err(Error::validation("blockPoolName must be set"));
        }
        Ok(())
    }

    fn validate_update(&self, old: &Self) -> Result<()> {
        if old.spec.block_pool_name != self.spec.block_pool_name {
            return Err(Error::immutable(
                "blockPoolName",
                "a rados namespace cannot move to another pool",
            ));
        }
        self.validate_create()
    }
}

// =============================================================================
// Filesystems
// =============================================================================

impl Validate for CephFilesystem {
    fn validate_create(&self) -> Result<()> {
        validate_pool_spec(&self.spec.metadata_pool, true)?;
        if self.spec.data_pools.is_empty() {
            return Err(Error::validation("at least one data pool is required"));
        }
        for pool in &self.spec.data_pools {
            validate_pool_spec(&pool.pool, true)?;
        }
        let active = self.spec.metadata_server.active_count;
        if !(1..=MAX_ACTIVE_MDS).contains(&active) {
            return Err(Error::validation(format!(
                "invalid metadata server active count {}: must be between 1 and {}",
                active, MAX_ACTIVE_MDS
            )));
        }
        Ok(())
    }
}

impl Validate for CephFilesystemMirror {
    fn validate_create(&self) -> Result<()> {
        Ok(())
    }
}

impl Validate for CephFilesystemSubVolumeGroup {
    fn validate_create(&self) -> Result<()> {
        if self.spec.filesystem_name.is_empty() {
            return Err(Error::validation("filesystemName must be set"));
        }
        if let Some(p) = &self.spec.pinning {
            let set = [p.export.is_some(), p.distributed.is_some(), p.random.is_some()]
                .iter()
                .filter(|s| **s)
                .count();
            if set > 1 {
                return Err(Error::validation(
                    "only one of export, distributed or random pinning may be set",
                ));
            }
        }
        Ok(())
    }

    fn validate_update(&self, old: &Self) -> Result<()> {
        if old.spec.filesystem_name != self.spec.filesystem_name {
            return Err(Error::immutable(
                "filesystemName",
                "a subvolume group cannot move to another filesystem",
            ));
        }
        self.validate_create()
    }
}

// =============================================================================
// Object Stores
// =============================================================================

impl Validate for CephObjectStore {
    fn validate_create(&self) -> Result<()> {
        let name = self.metadata.name.as_deref().unwrap_or("");
        if name.is_empty() {
            return Err(Error::validation("missing name"));
        }
        if self.metadata.namespace.as_deref().unwrap_or("").is_empty() {
            return Err(Error::validation("missing namespace"));
        }
        if name.len() > MAX_OBJECT_STORE_NAME_LEN && !self.spec.is_external() {
            return Err(Error::validation(format!(
                "object store name {:?} cannot be longer than {} characters",
                name, MAX_OBJECT_STORE_NAME_LEN
            )));
        }

        let gw = &self.spec.gateway;
        for (field, port) in [("port", gw.port), ("securePort", gw.secure_port)] {
            if !(0..=65535).contains(&port) {
                return Err(Error::validation(format!(
                    "invalid {} {}: must be between 0 and 65535",
                    field, port
                )));
            }
        }
        if gw.port < 1 && gw.secure_port < 1 {
            return Err(Error::validation(
                "invalid create: either of port or securePort fields should be at least 1",
            ));
        }

        if let Some(hosting) = &self.spec.hosting {
            if let Some(ep) = &hosting.advertise_endpoint {
                validate_dns_name(&ep.dns_name)?;
                if !(1..=65535).contains(&ep.port) {
                    return Err(Error::validation(format!(
                        "advertise endpoint port {} must be between 1 and 65535",
                        ep.port
                    )));
                }
            }
            let invalid: Vec<String> = hosting
                .dns_names
                .iter()
                .filter(|n| validate_dns_name(n).is_err())
                .map(|n| format!("{:?}", n))
                .collect();
            if !invalid.is_empty() {
                return Err(Error::validation(format!(
                    "invalid hosting dnsNames: {}",
                    invalid.join(", ")
                )));
            }
        }

        if !self.spec.is_external() {
            validate_pool_spec(&self.spec.metadata_pool, false)?;
            validate_pool_spec(&self.spec.data_pool, false)?;
        }
        Ok(())
    }

    fn validate_update(&self, old: &Self) -> Result<()> {
        validate_pool_update(&old.spec.data_pool, &self.spec.data_pool)?;
        self.validate_create()
    }
}

/// A DNS-1123 subdomain without wildcards
fn validate_dns_name(name: &str) -> Result<()> {
    let invalid = || Error::validation(format!("invalid DNS name {:?}", name));
    if name.is_empty() || name.len() > 253 {
        return Err(invalid());
    }
    for label in name.split('.') {
        let ok = !label.is_empty()
            && label.len() <= 63
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-');
        if !ok {
            return Err(invalid());
        }
    }
    Ok(())
}

impl Validate for CephObjectStoreUser {
    fn validate_create(&self) -> Result<()> {
        if self.spec.store.is_empty() {
            return Err(Error::validation("store must be set"));
        }
        if let Some(mask) = &self.spec.op_mask {
            mask.parse::<OpMask>()?;
        }
        Ok(())
    }
}

impl Validate for CephBucketTopic {
    fn validate_create(&self) -> Result<()> {
        if self.spec.object_store_name.is_empty() {
            return Err(Error::validation("objectStoreName must be set"));
        }
        let endpoints = self.spec.endpoint.configured();
        let (kind, uri) = match endpoints.as_slice() {
            [] => return Err(Error::validation("missing endpoint spec")),
            [one] => *one,
            _ => {
                return Err(Error::validation(
                    "multiple endpoint specs, only one of http, amqp or kafka may be set",
                ))
            }
        };

        let scheme = uri.split_once("://").map(|(s, _)| s).unwrap_or("");
        if !kind.schemes().contains(&scheme) {
            return Err(Error::validation(format!(
                "invalid {} endpoint URI {:?}: scheme must be one of {}",
                kind,
                uri,
                kind.schemes().join(", ")
            )));
        }
        Ok(())
    }
}

impl Validate for CephBucketNotification {
    fn validate_create(&self) -> Result<()> {
        if self.spec.topic.is_empty() {
            return Err(Error::validation("topic must be set"));
        }
        if let Some(filter) = &self.spec.filter {
            for rule in &filter.key_filters {
                if !["prefix", "suffix", "regex"].contains(&rule.name.as_str()) {
                    return Err(Error::validation(format!(
                        "invalid key filter {:?}, expected prefix, suffix or regex",
                        rule.name
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Validate for CephObjectRealm {
    fn validate_create(&self) -> Result<()> {
        if let Some(pull) = &self.spec.pull {
            let ep = pull.endpoint.as_str();
            let ok = ["http://", "https://"]
                .iter()
                .any(|p| ep.strip_prefix(p).map_or(false, |rest| !rest.is_empty()));
            if !ok {
                return Err(Error::validation(format!(
                    "realm pull endpoint {:?} must be an http or https URL",
                    ep
                )));
            }
        }
        Ok(())
    }
}

impl Validate for CephObjectZoneGroup {
    fn validate_create(&self) -> Result<()> {
        if self.spec.realm.is_empty() {
            return Err(Error::validation("realm must be set"));
        }
        Ok(())
    }
}

impl Validate for CephObjectZone {
    fn validate_create(&self) -> Result<()> {
        if self.spec.zone_group.is_empty() {
            return Err(Error::validation("zoneGroup must be set"));
        }
        validate_pool_spec(&self.spec.metadata_pool, false)?;
        validate_pool_spec(&self.spec.data_pool, false)
    }
}

// =============================================================================
// NFS and Mirroring
// =============================================================================

impl Validate for CephNFS {
    fn validate_create(&self) -> Result<()> {
        if self.spec.server.active < 1 {
            return Err(Error::validation(format!(
                "invalid server active count {}: at least one server is required",
                self.spec.server.active
            )));
        }
        if let Some(security) = &self.spec.security {
            validate_nfs_security(security)?;
        }
        Ok(())
    }
}

fn validate_nfs_security(security: &NfsSecuritySpec) -> Result<()> {
    if let Some(sidecar) = security.sssd_sidecar() {
        if sidecar.image.is_empty() {
            return Err(Error::validation("sssd sidecar image must be specified"));
        }
        if let Some(vs) = sidecar
            .sssd_config_file
            .as_ref()
            .and_then(|f| f.volume_source.as_ref())
        {
            if vs.is_empty() {
                return Err(Error::validation("sssd config file volume source is empty"));
            }
        }
        let mut seen = HashSet::new();
        for file in &sidecar.additional_files {
            if file.sub_path.is_empty() {
                return Err(Error::validation("sssd additional file sub path must be set"));
            }
            if !seen.insert(file.sub_path.as_str()) {
                return Err(Error::validation(format!(
                    "sssd additional file sub path {:?} is used more than once",
                    file.sub_path
                )));
            }
            if file.volume_source.is_empty() {
                return Err(Error::validation(format!(
                    "sssd additional file {:?} has an empty volume source",
                    file.sub_path
                )));
            }
        }
    }

    if let Some(krb) = &security.kerberos {
        let empty = |vs: &Option<ConfigurableVolumeSource>| vs.as_ref().map_or(true, |v| v.is_empty());
        if empty(&krb.config_files.volume_source) {
            return Err(Error::validation("kerberos config files volume source must be set"));
        }
        if empty(&krb.keytab_file.volume_source) {
            return Err(Error::validation("kerberos keytab file volume source must be set"));
        }
    }
    Ok(())
}

impl Validate for CephRBDMirror {
    fn validate_create(&self) -> Result<()> {
        if self.spec.count < 1 {
            return Err(Error::validation(format!(
                "invalid rbd mirror count {}: at least one daemon is required",
                self.spec.count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::network::AddressRanges;
    use crate::spec::storage::StorageClassDeviceSet;
    use assert_matches::assert_matches;

    fn cluster() -> CephCluster {
        let mut c = CephCluster::new("rook-ceph", ClusterSpec::default());
        c.metadata.namespace = Some("rook-ceph".into());
        c.spec.data_dir_host_path = "/var/lib/rook".into();
        c
    }

    fn ec_pool(data: u32, coding: u32) -> CephBlockPool {
        let mut p = CephBlockPool::new("ec", NamedBlockPoolSpec::default());
        p.spec.pool.erasure_coded = Some(ErasureCodedSpec {
            data_chunks: data,
            coding_chunks: coding,
            ..Default::default()
        });
        p
    }

    fn replicated(size: u32) -> Option<ReplicatedSpec> {
        Some(ReplicatedSpec {
            size,
            ..Default::default()
        })
    }

    #[test]
    fn test_cluster_create() {
        assert!(cluster().validate_create().is_ok());

        let mut c = cluster();
        c.spec.mon.count = 0;
        assert_matches!(c.validate_create(), Err(Error::Validation(_)));

        let mut c = cluster();
        c.spec.storage.store.r#type = "filestore".into();
        assert!(c.validate_create().is_err());
        c.spec.storage.store.r#type = OSD_STORE_BLUESTORE_RDR.into();
        assert!(c.validate_create().is_ok());

        let mut c = cluster();
        c.spec.cleanup_policy.confirmation = "yes".into();
        assert!(c.validate_create().is_err());
    }

    #[test]
    fn test_cluster_external_exclusive() {
        let mut c = cluster();
        c.spec.external.enable = true;
        assert!(c.validate_create().is_ok());

        c.spec.mon.count = 1;
        let err = c.validate_create().unwrap_err();
        assert!(err.to_string().contains("mon"));

        let mut c = cluster();
        c.spec.external.enable = true;
        c.spec.network.provider = NetworkProvider::Multus;
        assert!(c.validate_create().is_err());

        let mut c = cluster();
        c.spec.external.enable = true;
        c.spec.storage.use_all_nodes = Some(true);
        assert!(c.validate_create().is_err());
    }

    #[test]
    fn test_cluster_stretch_zones() {
        let mut c = cluster();
        c.spec.mon.stretch_cluster = Some(StretchClusterSpec {
            failure_domain_label: "zone".into(),
            zones: vec![
                MonZoneSpec {
                    name: "a".into(),
                    arbiter: true,
                    ..Default::default()
                },
                MonZoneSpec {
                    name: "b".into(),
                    ..Default::default()
                },
            ],
        });
        assert!(c.validate_create().is_err());

        if let Some(s) = c.spec.mon.stretch_cluster.as_mut() {
            s.zones.push(MonZoneSpec {
                name: "c".into(),
                ..Default::default()
            });
        }
        assert!(c.validate_create().is_ok());
    }

    #[test]
    fn test_cluster_network_ranges() {
        let mut c = cluster();
        c.spec.network.provider = NetworkProvider::Multus;
        c.spec.network.address_ranges = Some(AddressRanges {
            public: vec!["not-a-cidr".into()],
            cluster: vec![],
        });
        assert!(c.validate_create().is_err());
    }

    #[test]
    fn test_cluster_update_data_dir() {
        let old = cluster();
        let mut new = cluster();
        new.spec.data_dir_host_path = "/b".into();
        assert_matches!(new.validate_update(&old), Err(Error::ImmutableField { field, .. }) if field == "dataDirHostPath");
    }

    #[test]
    fn test_cluster_update_provider() {
        let mut old = cluster();
        old.spec.network.provider = NetworkProvider::Multus;
        let mut new = cluster();
        new.spec.network.provider = NetworkProvider::Host;
        assert_matches!(new.validate_update(&old), Err(Error::ImmutableField { .. }));

        // legacy host networking may move to the host provider
        let mut old = cluster();
        old.spec.network.host_network = true;
        assert!(new.validate_update(&old).is_ok());
        assert!(old.validate_update(&new).is_ok());

        let mut new = cluster();
        new.spec.network.provider = NetworkProvider::Multus;
        assert!(new.validate_update(&cluster()).is_err());
        assert!(cluster().validate_update(&new).is_err());

        // the default network and the host provider are interchangeable
        let mut host = cluster();
        host.spec.network.provider = NetworkProvider::Host;
        assert!(host.validate_update(&cluster()).is_ok());
        assert!(cluster().validate_update(&host).is_ok());
        assert_matches!(new.validate_update(&host), Err(Error::ImmutableField { .. }));
    }

    #[test]
    fn test_cluster_update_device_set_encryption() {
        let set = |encrypted| StorageClassDeviceSet {
            name: "set1".into(),
            count: 3,
            encrypted,
            ..Default::default()
        };
        let mut old = cluster();
        old.spec.storage.storage_class_device_sets = vec![set(false)];
        let mut new = cluster();
        new.spec.storage.storage_class_device_sets = vec![set(true)];
        assert!(new.validate_update(&old).is_err());

        new.spec.storage.storage_class_device_sets[0].name = "set2".into();
        assert!(new.validate_update(&old).is_ok());
    }

    #[test]
    fn test_pool_erasure_coded() {
        assert!(ec_pool(2, 1).validate_create().is_ok());

        let err = ec_pool(1, 1).validate_create().unwrap_err();
        assert!(err.to_string().contains("needs minimum value of 2"));

        assert!(ec_pool(2, 0).validate_create().is_err());

        let mut both = ec_pool(2, 1);
        both.spec.pool.replicated = replicated(3);
        let err = both.validate_create().unwrap_err();
        assert!(err.to_string().contains("cannot be set at the same time"));

        let neither = CephBlockPool::new("p", NamedBlockPoolSpec::default());
        assert!(neither.validate_create().is_err());
    }

    #[test]
    fn test_pool_replicated_rules() {
        let mut p = CephBlockPool::new("p", NamedBlockPoolSpec::default());
        p.spec.pool.replicated = replicated(3);
        assert!(p.validate_create().is_ok());

        if let Some(r) = p.spec.pool.replicated.as_mut() {
            r.size = 1;
            r.require_safe_replica_size = true;
        }
        assert!(p.validate_create().is_err());

        p.spec.pool.replicated = replicated(4);
        if let Some(r) = p.spec.pool.replicated.as_mut() {
            r.replicas_per_failure_domain = 2;
        }
        assert!(p.validate_create().is_ok());
        if let Some(r) = p.spec.pool.replicated.as_mut() {
            r.replicas_per_failure_domain = 3;
        }
        assert!(p.validate_create().is_err());
        if let Some(r) = p.spec.pool.replicated.as_mut() {
            r.replicas_per_failure_domain = 4;
        }
        assert!(p.validate_create().is_err());

        p.spec.pool.replicated = replicated(3);
        p.spec.pool.failure_domain = "host".into();
        if let Some(r) = p.spec.pool.replicated.as_mut() {
            r.sub_failure_domain = "host".into();
        }
        assert!(p.validate_create().is_err());
    }

    #[test]
    fn test_pool_mirroring_and_compression() {
        let mut p = CephBlockPool::new("p", NamedBlockPoolSpec::default());
        p.spec.pool.replicated = replicated(3);
        p.spec.pool.mirroring = Some(MirroringSpec {
            enabled: true,
            mode: "foo".into(),
            snapshot_schedules: vec![],
        });
        let err = p.validate_create().unwrap_err();
        assert!(err.to_string().contains("unrecognized mirroring mode"));

        p.spec.pool.mirroring = Some(MirroringSpec {
            enabled: true,
            mode: "image".into(),
            snapshot_schedules: vec![SnapshotScheduleSpec {
                interval: String::new(),
                start_time: "14:00:00-05:00".into(),
            }],
        });
        assert!(p.validate_create().is_err());

        p.spec.pool.mirroring = None;
        p.spec.pool.compression_mode = "aggressive".into();
        assert!(p.validate_create().is_ok());
        p.spec.pool.compression_mode = "extreme".into();
        assert!(p.validate_create().is_err());
    }

    #[test]
    fn test_pool_update_type_change() {
        let old = ec_pool(2, 1);
        let mut new = CephBlockPool::new("ec", NamedBlockPoolSpec::default());
        new.spec.pool.replicated = replicated(3);
        assert_matches!(new.validate_update(&old), Err(Error::ImmutableField { .. }));
        assert!(old.validate_update(&old).is_ok());
    }

    fn object_store(name: &str, port: i32, secure_port: i32) -> CephObjectStore {
        let mut s = CephObjectStore::new(name, ObjectStoreSpec::default());
        s.metadata.namespace = Some("rook-ceph".into());
        s.spec.gateway.port = port;
        s.spec.gateway.secure_port = secure_port;
        s
    }

    #[test]
    fn test_object_store() {
        assert!(object_store("my-store", 1, 0).validate_create().is_ok());

        let long = "a".repeat(39);
        let err = object_store(&long, 80, 0).validate_create().unwrap_err();
        assert!(err.to_string().contains("cannot be longer than 38 characters"));

        let mut external = object_store(&long, 80, 0);
        external.spec.gateway.external_rgw_endpoints = vec![EndpointAddress {
            ip: "192.168.1.1".into(),
            ..Default::default()
        }];
        assert!(external.validate_create().is_ok());

        assert!(object_store("my-store", 0, 65536).validate_create().is_err());
        assert!(object_store("my-store", 0, 0).validate_create().is_err());

        let mut no_ns = object_store("my-store", 1, 0);
        no_ns.metadata.namespace = None;
        assert!(no_ns.validate_create().is_err());
    }

    #[test]
    fn test_object_store_hosting() {
        let mut s = object_store("my-store", 1, 0);
        s.spec.hosting = Some(ObjectStoreHostingSpec {
            advertise_endpoint: Some(ObjectEndpointSpec {
                dns_name: "valid.dns.addr".into(),
                port: 1,
                use_tls: false,
            }),
            dns_names: vec!["valid.dns.addr".into(), "valid.dns.com".into()],
        });
        assert!(s.validate_create().is_ok());

        let mut wildcard = s.clone();
        if let Some(ep) = wildcard
            .spec
            .hosting
            .as_mut()
            .and_then(|h| h.advertise_endpoint.as_mut())
        {
            ep.dns_name = "*.invalid.dns.addr".into();
        }
        let err = wildcard.validate_create().unwrap_err();
        assert!(err.to_string().contains(r#""*.invalid.dns.addr""#));

        let mut names = s.clone();
        if let Some(h) = names.spec.hosting.as_mut() {
            h.dns_names = vec!["accepted.dns.name".into(), "-invalid.dns.name".into()];
        }
        let err = names.validate_create().unwrap_err().to_string();
        assert!(err.contains(r#""-invalid.dns.name""#));
        assert!(!err.contains("accepted.dns.name"));
    }

    #[test]
    fn test_object_user_op_mask() {
        let mut u = CephObjectStoreUser::new("u", ObjectStoreUserSpec::default());
        u.spec.store = "my-store".into();
        u.spec.op_mask = Some("read, write".into());
        assert!(u.validate_create().is_ok());
        u.spec.op_mask = Some("*, read".into());
        assert!(u.validate_create().is_err());
    }

    fn topic(endpoint: serde_json::Value) -> CephBucketTopic {
        let mut t = CephBucketTopic::new("t", BucketTopicSpec::default());
        t.spec.object_store_name = "my-store".into();
        t.spec.endpoint = serde_json::from_value(endpoint).unwrap();
        t
    }

    #[test]
    fn test_topic_endpoint() {
        assert!(topic(serde_json::json!({"http": {"uri": "https://host:9999"}}))
            .validate_create()
            .is_ok());
        assert!(topic(serde_json::json!({"amqp": {"uri": "amqps://host"}}))
            .validate_create()
            .is_ok());

        let err = topic(serde_json::json!({"amqp": {"uri": "http://host"}}))
            .validate_create()
            .unwrap_err();
        assert!(err.to_string().contains("scheme"));

        let err = topic(serde_json::json!({
            "http": {"uri": "http://host"},
            "kafka": {"uri": "kafka://host"}
        }))
        .validate_create()
        .unwrap_err();
        assert!(err.to_string().contains("multiple endpoint specs"));

        assert!(topic(serde_json::json!({})).validate_create().is_err());
    }

    #[test]
    fn test_nfs_security() {
        let mut nfs = CephNFS::new("nfs", NfsGaneshaSpec::default());
        assert!(nfs.validate_create().is_err());
        nfs.spec.server.active = 1;
        assert!(nfs.validate_create().is_ok());

        let cm = |name: &str| ConfigurableVolumeSource {
            config_map: Some(k8s_openapi::api::core::v1::ConfigMapVolumeSource {
                name: Some(name.into()),
                ..Default::default()
            }),
            ..Default::default()
        };

        nfs.spec.security = Some(NfsSecuritySpec {
            sssd: Some(SssdSpec {
                sidecar: Some(SssdSidecar {
                    image: "sssd".into(),
                    additional_files: vec![
                        AdditionalVolumeMount {
                            sub_path: "ca-certs".into(),
                            volume_source: cm("certs"),
                        },
                        AdditionalVolumeMount {
                            sub_path: "ca-certs".into(),
                            volume_source: cm("other"),
                        },
                    ],
                    ..Default::default()
                }),
            }),
            kerberos: None,
        });
        let err = nfs.validate_create().unwrap_err();
        assert!(err.to_string().contains("more than once"));

        nfs.spec.security = Some(NfsSecuritySpec {
            sssd: None,
            kerberos: Some(KerberosSpec {
                config_files: KerberosConfigFiles {
                    volume_source: Some(cm("krb5")),
                },
                ..Default::default()
            }),
        });
        assert!(nfs.validate_create().is_err());
        if let Some(k) = nfs.spec.security.as_mut().and_then(|s| s.kerberos.as_mut()) {
            k.keytab_file.volume_source = Some(cm("keytab"));
        }
        assert!(nfs.validate_create().is_ok());
    }

    #[test]
    fn test_filesystem() {
        let mut fs = CephFilesystem::new("myfs", FilesystemSpec::default());
        fs.spec.metadata_pool.replicated = replicated(3);
        assert!(fs.validate_create().is_err());

        fs.spec.data_pools.push(NamedPoolSpec {
            name: "data0".into(),
            pool: PoolSpec {
                replicated: replicated(3),
                ..Default::default()
            },
        });
        assert!(fs.validate_create().is_ok());

        fs.spec.metadata_server.active_count = 51;
        assert!(fs.validate_create().is_err());
    }

    #[test]
    fn test_child_resources() {
        let mut ns = CephBlockPoolRadosNamespace::new("ns", RadosNamespaceSpec::default());
        assert!(ns.validate_create().is_err());
        ns.spec.block_pool_name = "replicapool".into();
        let old = ns.clone();
        assert!(ns.validate_create().is_ok());
        ns.spec.block_pool_name = "other".into();
        assert!(ns.validate_update(&old).is_err());

        let mut svg = CephFilesystemSubVolumeGroup::new("g", SubVolumeGroupSpec::default());
        svg.spec.filesystem_name = "myfs".into();
        svg.spec.pinning = Some(SubVolumeGroupPinning {
            export: Some(1),
            random: Some(0.5),
            ..Default::default()
        });
        assert!(svg.validate_create().is_err());

        let mirror = CephRBDMirror::new("m", RbdMirroringSpec::default());
        assert!(mirror.validate_create().is_err());
        assert!(mirror.validate_delete().is_ok());
    }

    #[test]
    fn test_multisite() {
        let mut realm = CephObjectRealm::new("r", ObjectRealmSpec::default());
        assert!(realm.validate_create().is_ok());
        realm.spec.pull = Some(PullSpec {
            endpoint: "ftp://remote".into(),
        });
        assert!(realm.validate_create().is_err());
        realm.spec.pull = Some(PullSpec {
            endpoint: "http://10.0.0.1:80".into(),
        });
        assert!(realm.validate_create().is_ok());

        let zg = CephObjectZoneGroup::new("zg", ObjectZoneGroupSpec::default());
        assert!(zg.validate_create().is_err());

        let mut zone = CephObjectZone::new("z", ObjectZoneSpec::default());
        zone.spec.zone_group = "zg".into();
        assert!(zone.validate_create().is_ok());
    }

    #[test]
    fn test_notification_filters() {
        let mut n = CephBucketNotification::new("n", BucketNotificationSpec::default());
        n.spec.topic = "t".into();
        n.spec.filter = Some(NotificationFilterSpec {
            key_filters: vec![NotificationKeyFilterRule {
                name: "glob".into(),
                value: "*.png".into(),
            }],
        });
        assert!(n.validate_create().is_err());
        n.spec.filter = None;
        assert!(n.validate_create().is_ok());
    }
}
