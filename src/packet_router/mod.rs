
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use util::sync::Mutex;

use crate::error::{Error, Result};
use crate::paced_packet_info::PacedPacketInfo;
use crate::rtp_module::{RtpModule, RtxSendStatus, SSRC};

type FnTimeGen = Arc<dyn Fn() -> SystemTime + Sync + 'static + Send>;

/// REMB_SEND_INTERVAL is the steady-state spacing between REMB emissions.
/// An estimate that drops more than 3% below the previous one goes out
/// immediately, regardless of this interval.
pub const REMB_SEND_INTERVAL: Duration = Duration::from_millis(200);

/// A new estimate strictly below this percentage of the previous one counts
/// as a drop worth reporting right away.
const SEND_THRESHOLD_PERCENT: u64 = 97;

struct SendModuleEntry {
    module: Arc<dyn RtpModule + Send + Sync>,
    remb_candidate: bool,
    // Sampled once at registration. Modules keep their RTX configuration
    // stable while registered, so the padding order only has to change on
    // add/remove.
    rtx_send_status: RtxSendStatus,
}

struct ReceiveModuleEntry {
    module: Arc<dyn RtpModule + Send + Sync>,
    remb_candidate: bool,
}

struct RouterState {
    send_modules: Vec<SendModuleEntry>,
    receive_modules: Vec<ReceiveModuleEntry>,
    // Indices into send_modules, best padding candidate first. Rebuilt on
    // every add/remove.
    padding_order: Vec<usize>,
    active_remb_module: Option<Arc<dyn RtpModule + Send + Sync>>,
    transport_seq: u16,
    last_remb_time: SystemTime,
    last_bitrate_bps: u32,
}

impl RouterState {
    fn new(now: SystemTime) -> Self {
        RouterState {
            send_modules: Vec::new(),
            receive_modules: Vec::new(),
            padding_order: Vec::new(),
            active_remb_module: None,
            transport_seq: 0,
            last_remb_time: now,
            last_bitrate_bps: 0,
        }
    }

    fn contains(&self, module: &Arc<dyn RtpModule + Send + Sync>) -> bool {
        self.send_modules
            .iter()
            .any(|entry| Arc::ptr_eq(&entry.module, module))
            || self
                .receive_modules
                .iter()
                .any(|entry| Arc::ptr_eq(&entry.module, module))
    }

    fn rebuild_padding_order(&mut self) {
        let mut order: Vec<usize> = (0..self.send_modules.len()).collect();
        // Stable sort keeps registration order within a priority tier.
        order.sort_by_key(|&idx| self.send_modules[idx].rtx_send_status.padding_priority());
        self.padding_order = order;
    }

    /// Re-runs REMB election: the earliest-registered send candidate wins,
    /// receive candidates are the fallback. The outgoing module (if any) has
    /// its REMB advertisement cleared before the new one is flagged, so at
    /// most one registered module ever advertises REMB.
    fn determine_active_remb_module(&mut self) {
        let new_active = self
            .send_modules
            .iter()
            .find(|entry| entry.remb_candidate)
            .map(|entry| Arc::clone(&entry.module))
            .or_else(|| {
                self.receive_modules
                    .iter()
                    .find(|entry| entry.remb_candidate)
                    .map(|entry| Arc::clone(&entry.module))
            });

        let unchanged = match (&self.active_remb_module, &new_active) {
            (Some(prev), Some(next)) => Arc::ptr_eq(prev, next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if let Some(prev) = self.active_remb_module.take() {
            prev.set_remb_status(false);
        }
        if let Some(next) = &new_active {
            next.set_remb_status(true);
        }
        self.active_remb_module = new_active;
    }

    fn send_remb(&self, bitrate_bps: u32, ssrcs: &[SSRC]) -> bool {
        if let Some(module) = &self.active_remb_module {
            // Election keeps exactly this module flagged as the REMB sender.
            module.set_remb_data(bitrate_bps, ssrcs);
            true
        } else {
            false
        }
    }
}

/// PacketRouter sits between the pacer and the per-stream RTP/RTCP modules.
/// It forwards pacer send decisions to the module owning the SSRC, spreads
/// padding requests over the registered senders, hands out the
/// transport-wide sequence numbers shared by all outbound streams, and
/// routes REMB and transport feedback through a single elected module.
///
/// A single mutex guards all state; module callbacks run while it is held.
/// Modules must not block in those callbacks or call back into the router.
pub struct PacketRouter {
    state: Mutex<RouterState>,
    remb_send_interval: Duration,
    now: Option<FnTimeGen>,
}

impl Default for PacketRouter {
    fn default() -> Self {
        PacketRouter::new()
    }
}

impl PacketRouter {
    /// new creates a router with the default REMB send interval, driven by
    /// the system clock.
    pub fn new() -> Self {
        PacketRouter {
            state: Mutex::new(RouterState::new(SystemTime::now())),
            remb_send_interval: REMB_SEND_INTERVAL,
            now: None,
        }
    }

    /// builder returns a new PacketRouterBuilder.
    pub fn builder() -> PacketRouterBuilder {
        PacketRouterBuilder::default()
    }

    fn now(&self) -> SystemTime {
        if let Some(f) = &self.now {
            f()
        } else {
            SystemTime::now()
        }
    }

    /// add_send_rtp_module registers a module for outbound dispatch and,
    /// when `remb_candidate` is set, for REMB election.
    ///
    /// Registering a module twice is a programmer error: debug builds
    /// panic, release builds log and leave the registry untouched.
    pub fn add_send_rtp_module(
        &self,
        module: Arc<dyn RtpModule + Send + Sync>,
        remb_candidate: bool,
    ) {
        let mut state = self.state.lock();
        if state.contains(&module) {
            debug_assert!(false, "send module registered twice");
            log::warn!("add_send_rtp_module: module already registered, ignoring");
            return;
        }
        let rtx_send_status = module.rtx_send_status();
        state.send_modules.push(SendModuleEntry {
            module,
            remb_candidate,
            rtx_send_status,
        });
        state.rebuild_padding_order();
        state.determine_active_remb_module();
    }

    /// add_receive_rtp_module registers a module on the receive side, where
    /// only REMB election and the feedback fallback consider it.
    pub fn add_receive_rtp_module(
        &self,
        module: Arc<dyn RtpModule + Send + Sync>,
        remb_candidate: bool,
    ) {
        let mut state = self.state.lock();
        if state.contains(&module) {
            debug_assert!(false, "receive module registered twice");
            log::warn!("add_receive_rtp_module: module already registered, ignoring");
            return;
        }
        state.receive_modules.push(ReceiveModuleEntry {
            module,
            remb_candidate,
        });
        state.determine_active_remb_module();
    }

    /// remove_send_rtp_module unregisters a send module. If it was the
    /// elected REMB module its advertisement is cleared before re-election.
    ///
    /// Removing a module that was never registered is a programmer error:
    /// debug builds panic, release builds log and do nothing.
    pub fn remove_send_rtp_module(&self, module: Arc<dyn RtpModule + Send + Sync>) {
        let mut state = self.state.lock();
        let pos = state
            .send_modules
            .iter()
            .position(|entry| Arc::ptr_eq(&entry.module, &module));
        if let Some(pos) = pos {
            state.send_modules.remove(pos);
            state.rebuild_padding_order();
            state.determine_active_remb_module();
        } else {
            debug_assert!(false, "removing a send module that was never registered");
            log::warn!("remove_send_rtp_module: module not registered, ignoring");
        }
    }

    /// remove_receive_rtp_module unregisters a receive module, re-running
    /// REMB election when it was the elected module.
    pub fn remove_receive_rtp_module(&self, module: Arc<dyn RtpModule + Send + Sync>) {
        let mut state = self.state.lock();
        let pos = state
            .receive_modules
            .iter()
            .position(|entry| Arc::ptr_eq(&entry.module, &module));
        if let Some(pos) = pos {
            state.receive_modules.remove(pos);
            state.determine_active_remb_module();
        } else {
            debug_assert!(false, "removing a receive module that was never registered");
            log::warn!("remove_receive_rtp_module: module not registered, ignoring");
        }
    }

    /// time_to_send_packet forwards a pacer send decision to the first
    /// registered send module that is sending media on `ssrc`, returning
    /// that module's result unchanged.
    ///
    /// A packet with no matching module is reported as handled so the pacer
    /// drops it instead of retrying; the stream was most likely torn down
    /// while the packet sat in the pacer queue.
    pub fn time_to_send_packet(
        &self,
        ssrc: SSRC,
        sequence_number: u16,
        capture_time_ms: i64,
        retransmission: bool,
        pacing_info: &PacedPacketInfo,
    ) -> bool {
        let state = self.state.lock();
        for entry in &state.send_modules {
            if !entry.module.sending_media() {
                continue;
            }
            if entry.module.ssrc() == ssrc {
                return entry.module.time_to_send_packet(
                    ssrc,
                    sequence_number,
                    capture_time_ms,
                    retransmission,
                    pacing_info,
                );
            }
        }
        true
    }

    /// time_to_send_padding spreads a padding budget over the modules that
    /// are sending media and carry BWE header extensions, best RTX mode
    /// first, and returns the number of bytes actually sent.
    pub fn time_to_send_padding(&self, bytes: usize, pacing_info: &PacedPacketInfo) -> usize {
        let state = self.state.lock();
        let mut total_sent = 0;
        for &idx in &state.padding_order {
            let entry = &state.send_modules[idx];
            if !entry.module.sending_media() || !entry.module.has_bwe_extensions() {
                continue;
            }
            total_sent += entry
                .module
                .time_to_send_padding(bytes - total_sent, pacing_info);
            if total_sent >= bytes {
                break;
            }
        }
        total_sent
    }

    /// set_transport_wide_sequence_number resets the shared counter; the
    /// next allocation returns `sequence_number + 1`.
    pub fn set_transport_wide_sequence_number(&self, sequence_number: u16) {
        self.state.lock().transport_seq = sequence_number;
    }

    /// allocate_sequence_number returns the next transport-wide sequence
    /// number. The counter is shared by every outbound stream and wraps at
    /// 2^16.
    pub fn allocate_sequence_number(&self) -> u16 {
        let mut state = self.state.lock();
        state.transport_seq = state.transport_seq.wrapping_add(1);
        state.transport_seq
    }

    /// on_receive_bitrate_changed feeds a receive-side bandwidth estimate
    /// into the REMB throttle. An estimate more than 3% below the previous
    /// one is emitted immediately; otherwise at most one REMB per send
    /// interval goes out.
    pub fn on_receive_bitrate_changed(&self, ssrcs: &[SSRC], bitrate_bps: u32) {
        let now = self.now();
        let mut state = self.state.lock();

        // Strictly below 97% of the previous observation.
        let dropped = (bitrate_bps as u64) * 100
            < (state.last_bitrate_bps as u64) * SEND_THRESHOLD_PERCENT;
        let interval_elapsed = now
            .duration_since(state.last_remb_time)
            .map(|elapsed| elapsed >= self.remb_send_interval)
            .unwrap_or(false);
        state.last_bitrate_bps = bitrate_bps;

        if !dropped && !interval_elapsed {
            return;
        }
        // Stamped even when no module is elected, so a module registered
        // right after does not see a burst of stale updates.
        state.last_remb_time = now;
        state.send_remb(bitrate_bps, ssrcs);
    }

    /// send_remb pushes a REMB update through the elected module, bypassing
    /// the throttle. Returns false when no candidate is registered.
    pub fn send_remb(&self, bitrate_bps: u32, ssrcs: &[SSRC]) -> bool {
        self.state.lock().send_remb(bitrate_bps, ssrcs)
    }

    /// send_transport_feedback hands a transport-wide feedback packet to
    /// the first module that accepts it, trying send modules before receive
    /// modules, each in registration order.
    pub fn send_transport_feedback(&self, feedback: &TransportLayerCc) -> bool {
        let state = self.state.lock();
        for entry in &state.send_modules {
            if entry.module.send_feedback_packet(feedback) {
                return true;
            }
        }
        for entry in &state.receive_modules {
            if entry.module.send_feedback_packet(feedback) {
                return true;
            }
        }
        false
    }
}

/// PacketRouterBuilder can be used to configure a PacketRouter.
#[derive(Default)]
pub struct PacketRouterBuilder {
    remb_send_interval: Option<Duration>,
    now: Option<FnTimeGen>,
}

impl PacketRouterBuilder {
    /// with_remb_send_interval overrides the steady-state REMB spacing.
    pub fn with_remb_send_interval(mut self, interval: Duration) -> PacketRouterBuilder {
        self.remb_send_interval = Some(interval);
        self
    }

    /// with_now_fn sets an alternative for the SystemTime::now function.
    pub fn with_now_fn(mut self, now: FnTimeGen) -> PacketRouterBuilder {
        self.now = Some(now);
        self
    }

    /// build creates the router. A zero REMB send interval is rejected.
    pub fn build(self) -> Result<PacketRouter> {
        let interval = self.remb_send_interval.unwrap_or(REMB_SEND_INTERVAL);
        if interval.is_zero() {
            return Err(Error::ErrInvalidRembInterval);
        }
        let start = if let Some(f) = &self.now {
            f()
        } else {
            SystemTime::now()
        };
        Ok(PacketRouter {
            state: Mutex::new(RouterState::new(start)),
            remb_send_interval: interval,
            now: self.now,
        })
    }
}
