use rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc;

use crate::paced_packet_info::PacedPacketInfo;

/// SSRC represents a synchronization source: the 32-bit stream identifier
/// carried in every RTP header.
#[allow(clippy::upper_case_acronyms)]
pub type SSRC = u32;

/// RtxSendStatus describes how a send module uses its retransmission (RTX)
/// stream.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtxSendStatus {
    /// No RTX stream is configured.
    #[default]
    Off,
    /// Retransmissions are sent over the RTX stream.
    WithPayload,
    /// The RTX stream repeats recently sent payload packets.
    RedundantPayloads,
}

impl RtxSendStatus {
    /// Padding order: modules that can fill padding with redundant payload
    /// packets waste the fewest bytes, plain payload RTX comes second,
    /// padding-only streams last.
    pub(crate) fn padding_priority(self) -> u8 {
        match self {
            RtxSendStatus::RedundantPayloads => 0,
            RtxSendStatus::WithPayload => 1,
            RtxSendStatus::Off => 2,
        }
    }
}

/// RtpModule is the capability surface the router needs from an RTP/RTCP
/// module. The router holds registered modules as
/// `Arc<dyn RtpModule + Send + Sync>`; callers keep their own handle and
/// identity is the allocation, not the SSRC.
///
/// All methods are invoked while the router lock is held and must not block
/// or call back into the router.
pub trait RtpModule {
    /// ssrc returns the stream the module currently sends on.
    fn ssrc(&self) -> SSRC;

    /// sending_media reports whether the module is actively sending media.
    fn sending_media(&self) -> bool;

    /// rtx_send_status returns the module's retransmission-stream mode.
    fn rtx_send_status(&self) -> RtxSendStatus;

    /// has_bwe_extensions reports whether outgoing packets carry the header
    /// extensions needed to count towards bandwidth estimation.
    fn has_bwe_extensions(&self) -> bool;

    /// time_to_send_packet asks the module to put a previously queued packet
    /// on the wire. Returns whether the module handled the packet.
    fn time_to_send_packet(
        &self,
        ssrc: SSRC,
        sequence_number: u16,
        capture_time_ms: i64,
        retransmission: bool,
        pacing_info: &PacedPacketInfo,
    ) -> bool;

    /// time_to_send_padding asks the module to send up to `bytes` of
    /// padding. Returns the number of bytes actually sent.
    fn time_to_send_padding(&self, bytes: usize, pacing_info: &PacedPacketInfo) -> usize;

    /// remb reports whether the module currently advertises REMB support in
    /// its RTCP.
    fn remb(&self) -> bool;

    /// set_remb_status enables or disables REMB advertisement.
    fn set_remb_status(&self, enabled: bool);

    /// set_remb_data makes the module emit a REMB RTCP packet with the
    /// given estimate covering the given media sources.
    fn set_remb_data(&self, bitrate_bps: u32, ssrcs: &[SSRC]);

    /// send_feedback_packet sends a transport-wide feedback RTCP packet.
    /// Returns whether the packet went out.
    fn send_feedback_packet(&self, feedback: &TransportLayerCc) -> bool;
}
