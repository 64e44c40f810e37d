//! Client-side protocol, netlist flattening and graph correlation.

pub mod netlist;
pub mod sta;

pub use netlist::{
    flatten_netlist, InstPath, InterPinDelay, NetPath, NetlistView, PathSelection, PinPath,
};
pub use sta::{StaClient, TimingStats};
