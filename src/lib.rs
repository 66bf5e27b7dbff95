#![warn(rust_2018_idioms)]
#![allow(dead_code)]

mod error;
pub mod mock;
pub mod paced_packet_info;
pub mod packet_router;
pub mod rtp_module;

pub use error::{Error, Result};
pub use paced_packet_info::PacedPacketInfo;
pub use packet_router::{PacketRouter, PacketRouterBuilder, REMB_SEND_INTERVAL};
pub use rtp_module::{RtpModule, RtxSendStatus, SSRC};
