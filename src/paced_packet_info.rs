/// PacedPacketInfo carries the probe-cluster metadata the pacer attaches to
/// every send decision, so modules can mark outgoing packets as belonging
/// to a bandwidth probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacedPacketInfo {
    pub probe_cluster_id: i32,
    pub probe_cluster_min_probes: i32,
    pub probe_cluster_min_bytes: i32,
}

impl PacedPacketInfo {
    /// Cluster id of a packet that is not part of a probe.
    pub const NOT_A_PROBE: i32 = -1;

    /// new creates metadata for a packet in the given probe cluster.
    pub fn new(
        probe_cluster_id: i32,
        probe_cluster_min_probes: i32,
        probe_cluster_min_bytes: i32,
    ) -> Self {
        PacedPacketInfo {
            probe_cluster_id,
            probe_cluster_min_probes,
            probe_cluster_min_bytes,
        }
    }
}

impl Default for PacedPacketInfo {
    fn default() -> Self {
        PacedPacketInfo {
            probe_cluster_id: PacedPacketInfo::NOT_A_PROBE,
            probe_cluster_min_probes: -1,
            probe_cluster_min_bytes: -1,
        }
    }
}
