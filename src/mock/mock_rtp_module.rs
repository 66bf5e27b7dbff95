use std::sync::atomic::Ordering;

use portable_atomic::{AtomicBool, AtomicU32, AtomicUsize};
use rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use util::sync::Mutex;

use crate::paced_packet_info::PacedPacketInfo;
use crate::rtp_module::{RtpModule, RtxSendStatus, SSRC};

/// A time_to_send_packet call observed by a MockRtpModule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub ssrc: SSRC,
    pub sequence_number: u16,
    pub capture_time_ms: i64,
    pub retransmission: bool,
    pub probe_cluster_id: i32,
}

/// A time_to_send_padding call observed by a MockRtpModule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddingRequest {
    pub bytes: usize,
    pub probe_cluster_id: i32,
}

/// A set_remb_data call observed by a MockRtpModule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RembUpdate {
    pub bitrate_bps: u32,
    pub ssrcs: Vec<SSRC>,
}

/// MockRtpModule is a scriptable RtpModule for testing the router: set the
/// public fields to decide what the module reports back, then inspect the
/// recorded calls. REMB advertisement is tracked the way a real module
/// would, through set_remb_status.
#[derive(Default)]
pub struct MockRtpModule {
    /// Value returned from ssrc().
    pub ssrc: AtomicU32,
    /// Value returned from sending_media().
    pub sending_media: AtomicBool,
    /// Value returned from has_bwe_extensions().
    pub has_bwe_extensions: AtomicBool,
    /// Result reported from time_to_send_packet().
    pub packet_result: AtomicBool,
    /// Upper bound on the padding bytes honored per call.
    pub padding_capacity: AtomicUsize,
    /// Result reported from send_feedback_packet().
    pub feedback_result: AtomicBool,

    rtx_send_status: Mutex<RtxSendStatus>,
    remb: AtomicBool,
    packet_log: Mutex<Vec<SentPacket>>,
    padding_log: Mutex<Vec<PaddingRequest>>,
    remb_log: Mutex<Vec<RembUpdate>>,
    feedback_packets: AtomicUsize,
}

impl MockRtpModule {
    /// set_rtx_send_status configures the RTX mode the module reports when
    /// it is registered.
    pub fn set_rtx_send_status(&self, status: RtxSendStatus) {
        *self.rtx_send_status.lock() = status;
    }

    /// sent_packets returns every forwarded packet seen so far.
    pub fn sent_packets(&self) -> Vec<SentPacket> {
        self.packet_log.lock().clone()
    }

    /// padding_requests returns every padding request seen so far.
    pub fn padding_requests(&self) -> Vec<PaddingRequest> {
        self.padding_log.lock().clone()
    }

    /// remb_updates returns every set_remb_data call seen so far.
    pub fn remb_updates(&self) -> Vec<RembUpdate> {
        self.remb_log.lock().clone()
    }

    /// feedback_packet_count returns how many feedback packets the module
    /// was offered.
    pub fn feedback_packet_count(&self) -> usize {
        self.feedback_packets.load(Ordering::SeqCst)
    }
}

impl RtpModule for MockRtpModule {
    fn ssrc(&self) -> SSRC {
        self.ssrc.load(Ordering::SeqCst)
    }

    fn sending_media(&self) -> bool {
        self.sending_media.load(Ordering::SeqCst)
    }

    fn rtx_send_status(&self) -> RtxSendStatus {
        *self.rtx_send_status.lock()
    }

    fn has_bwe_extensions(&self) -> bool {
        self.has_bwe_extensions.load(Ordering::SeqCst)
    }

    fn time_to_send_packet(
        &self,
        ssrc: SSRC,
        sequence_number: u16,
        capture_time_ms: i64,
        retransmission: bool,
        pacing_info: &PacedPacketInfo,
    ) -> bool {
        self.packet_log.lock().push(SentPacket {
            ssrc,
            sequence_number,
            capture_time_ms,
            retransmission,
            probe_cluster_id: pacing_info.probe_cluster_id,
        });
        self.packet_result.load(Ordering::SeqCst)
    }

    fn time_to_send_padding(&self, bytes: usize, pacing_info: &PacedPacketInfo) -> usize {
        self.padding_log.lock().push(PaddingRequest {
            bytes,
            probe_cluster_id: pacing_info.probe_cluster_id,
        });
        bytes.min(self.padding_capacity.load(Ordering::SeqCst))
    }

    fn remb(&self) -> bool {
        self.remb.load(Ordering::SeqCst)
    }

    fn set_remb_status(&self, enabled: bool) {
        self.remb.store(enabled, Ordering::SeqCst);
    }

    fn set_remb_data(&self, bitrate_bps: u32, ssrcs: &[SSRC]) {
        self.remb_log.lock().push(RembUpdate {
            bitrate_bps,
            ssrcs: ssrcs.to_vec(),
        });
    }

    fn send_feedback_packet(&self, _feedback: &TransportLayerCc) -> bool {
        self.feedback_packets.fetch_add(1, Ordering::SeqCst);
        self.feedback_result.load(Ordering::SeqCst)
    }
}
