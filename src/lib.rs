//! OpenFlow 0x01 controller framework.
//!
//! The crate is layered leaf-first: wire primitives (`ofp_header`), the
//! Ethernet/IPv4/TCP parser used by packet-in messages (`packet`), the message
//! and action codec (`openflow0x01`), and the per-connection session
//! (`ofp_switch`). `ofp_controller` runs the accept loop and `learning_switch`
//! is a small application built on top of the callback interface.
#![crate_name = "oflow"]
#![crate_type = "lib"]

mod bits;
pub mod config;
pub mod learning_switch;
pub mod ofp_controller;
pub mod ofp_header;
pub mod ofp_message;
pub mod ofp_switch;
pub mod openflow0x01;
pub mod packet;
