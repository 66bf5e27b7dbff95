pub mod mock_rtp_module;
pub mod mock_time;
