//! # aosgate - SSH command gateway for AOS network switches
//!
//! `aosgate` lets authorized callers run a restricted set of commands on a
//! fleet of network switches over SSH without re-authenticating on every
//! request. It keeps a pool of long-lived SSH sessions (optionally tunneled
//! through a jump host), serializes command execution per endpoint, checks
//! every command against a regex allow-list, and reaps idle sessions in the
//! background. Callers reach it through a small HTTP/JSON API.
//!
//! ## Features
//!
//! - **Session pooling**: one live SSH session per endpoint, probed for
//!   liveness and rebuilt transparently when the transport dies
//! - **Jump-host tunneling**: devices behind a bastion are reached over a
//!   direct-tcpip channel carried by the bastion's own pooled session
//! - **Per-endpoint serialization**: concurrent requests to one device are
//!   queued; different devices proceed in parallel
//! - **Command allow-list**: anchored regular expressions gate every command
//! - **Idle reaping**: device sessions expire after inactivity; a jump
//!   session lives exactly as long as its children
//!
//! ## Main Components
//!
//! - [`session::SessionPool`] - session table, liveness, execution
//! - [`session::reaper`] - background idle collection
//! - [`gate::CommandGate`] - allow-list authorization
//! - [`inventory::Inventory`] - device and jump-host registry
//! - [`http`] - the HTTP/JSON surface
//! - [`error::GatewayError`] - error taxonomy

pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod inventory;
pub mod session;
