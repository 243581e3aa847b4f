//! # parley-mcp
//!
//! Capability bridge for external tool servers.
//!
//! This crate provides:
//! - The [`CapabilityBridge`] contract: `list_capabilities` and
//!   `invoke(tool_name, args) -> result`
//! - [`CapabilityToolset`], which filters a bridge's capabilities and
//!   registers them as tools named `mcp__<server>__<tool>`
//! - [`InProcessBridge`], a bridge backed by Rust closures
//!
//! The wire protocol spoken to real servers is left to bridge
//! implementations.

pub mod bridge;
pub mod capability;
pub mod error;
pub mod toolset;

pub use bridge::{CapabilityBridge, CapabilityHandler, InProcessBridge};
pub use capability::{CapabilityContent, CapabilityDefinition, CapabilityResult};
pub use error::BridgeError;
pub use toolset::{register_toolsets, CapabilityTool, CapabilityToolset, MCP_TOOL_PREFIX};
