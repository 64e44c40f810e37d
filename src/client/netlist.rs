//! Application-netlist access and flattening.
//!
//! The client never owns netlist objects. It sees the application's design
//! through [`NetlistView`], addressing blocks, instances, ports, pins and
//! nets with the view's own cheap `Copy` handles, and keeps those handles
//! in its correlation tables. The flattener below walks a design top-down
//! and emits the `BlockData` sequence of a `CreateNetlist` command.

use crate::channel::message::{BlockData, InstanceData, PortData, UNCONNECTED_NET};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Read access to a hierarchical netlist.
///
/// Handles are opaque to this crate; the only requirements are cheap
/// copying and map-key semantics for the types the correlator indexes.
/// Bus ports and pins expand to bit objects via `*_bit`; an object that
/// itself is one bit of a bus answers `*_is_bit` and is skipped when
/// flattening, the bus object covers it.
pub trait NetlistView {
    type Block: Copy + Eq + Hash;
    type Inst: Copy + Eq + Hash;
    type Port: Copy;
    type Pin: Copy + Eq + Hash + Debug;
    type Net: Copy + Eq + Hash;

    fn block_name(&self, block: Self::Block) -> String;
    fn block_is_leaf(&self, block: Self::Block) -> bool;
    fn block_ports(&self, block: Self::Block) -> Vec<Self::Port>;
    fn block_insts(&self, block: Self::Block) -> Vec<Self::Inst>;
    fn block_nets(&self, block: Self::Block) -> Vec<Self::Net>;

    fn inst_name(&self, inst: Self::Inst) -> String;
    fn inst_master(&self, inst: Self::Inst) -> Self::Block;
    fn inst_pins(&self, inst: Self::Inst) -> Vec<Self::Pin>;

    fn port_name(&self, port: Self::Port) -> String;
    fn port_is_input(&self, port: Self::Port) -> bool;
    fn port_is_output(&self, port: Self::Port) -> bool;
    fn port_is_bus(&self, port: Self::Port) -> bool;
    fn port_is_bit(&self, port: Self::Port) -> bool;
    fn port_bus_range(&self, port: Self::Port) -> (u32, u32);
    fn port_bit(&self, port: Self::Port, bit: u32) -> Option<Self::Port>;
    fn port_net(&self, port: Self::Port) -> Option<Self::Net>;
    /// The block-internal pin object of a top-level port, if any.
    fn port_pin(&self, port: Self::Port) -> Option<Self::Pin>;

    fn pin_name(&self, pin: Self::Pin) -> String;
    fn pin_is_input(&self, pin: Self::Pin) -> bool;
    fn pin_is_output(&self, pin: Self::Pin) -> bool;
    fn pin_is_bus(&self, pin: Self::Pin) -> bool;
    fn pin_is_bit(&self, pin: Self::Pin) -> bool;
    fn pin_bus_range(&self, pin: Self::Pin) -> (u32, u32);
    fn pin_bit(&self, pin: Self::Pin, bit: u32) -> Option<Self::Pin>;
    fn pin_net(&self, pin: Self::Pin) -> Option<Self::Net>;
    /// Owning instance; `None` for the pin behind a top-level port.
    fn pin_parent(&self, pin: Self::Pin) -> Option<Self::Inst>;

    fn net_name(&self, net: Self::Net) -> String;
    fn net_is_bus(&self, net: Self::Net) -> bool;
    fn net_has_gnd_source(&self, net: Self::Net) -> bool;
    fn net_has_vdd_source(&self, net: Self::Net) -> bool;
}

/// A pin addressed by its top-down instance context.
pub struct PinPath<V: NetlistView> {
    pub context: Vec<V::Inst>,
    pub pin: V::Pin,
}

/// An instance addressed by its top-down instance context.
pub struct InstPath<V: NetlistView> {
    pub context: Vec<V::Inst>,
    pub inst: V::Inst,
}

/// A net addressed by its top-down instance context.
pub struct NetPath<V: NetlistView> {
    pub context: Vec<V::Inst>,
    pub net: V::Net,
}

/// One arc-delay override between two pins of the top block context.
pub struct InterPinDelay<V: NetlistView> {
    pub source: V::Pin,
    pub sink: V::Pin,
    pub value: f32,
}

/// The from/through/to selection of a path exception constraint
/// (`set_false_path`, `set_min_max_delay`, `set_multicycle_path`),
/// still expressed in netlist handles.
pub struct PathSelection<V: NetlistView> {
    pub from_rise: bool,
    pub from_fall: bool,
    pub from_pins: Vec<PinPath<V>>,
    pub from_clocks: Vec<String>,
    pub from_insts: Vec<InstPath<V>>,
    pub through_rise: bool,
    pub through_fall: bool,
    pub through_pins: Vec<PinPath<V>>,
    pub through_insts: Vec<InstPath<V>>,
    pub through_nets: Vec<NetPath<V>>,
    pub to_rise: bool,
    pub to_fall: bool,
    pub to_pins: Vec<PinPath<V>>,
    pub to_clocks: Vec<String>,
    pub to_insts: Vec<InstPath<V>>,
}

// derive(Default) would demand V: Default
impl<V: NetlistView> Default for PathSelection<V> {
    fn default() -> Self {
        Self {
            from_rise: false,
            from_fall: false,
            from_pins: Vec::new(),
            from_clocks: Vec::new(),
            from_insts: Vec::new(),
            through_rise: false,
            through_fall: false,
            through_pins: Vec::new(),
            through_insts: Vec::new(),
            through_nets: Vec::new(),
            to_rise: false,
            to_fall: false,
            to_pins: Vec::new(),
            to_clocks: Vec::new(),
            to_insts: Vec::new(),
        }
    }
}

fn context_names<V: NetlistView>(view: &V, context: &[V::Inst]) -> Vec<String> {
    context.iter().map(|&inst| view.inst_name(inst)).collect()
}

impl<V: NetlistView> PinPath<V> {
    pub fn to_context_name(&self, view: &V) -> crate::channel::message::ObjectContextName {
        crate::channel::message::ObjectContextName {
            inst_context: context_names(view, &self.context),
            obj_name: view.pin_name(self.pin),
        }
    }
}

impl<V: NetlistView> InstPath<V> {
    pub fn to_context_name(&self, view: &V) -> crate::channel::message::ObjectContextName {
        crate::channel::message::ObjectContextName {
            inst_context: context_names(view, &self.context),
            obj_name: view.inst_name(self.inst),
        }
    }
}

impl<V: NetlistView> NetPath<V> {
    pub fn to_context_name(&self, view: &V) -> crate::channel::message::ObjectContextName {
        crate::channel::message::ObjectContextName {
            inst_context: context_names(view, &self.context),
            obj_name: view.net_name(self.net),
        }
    }
}

/// Flatten a design into the block sequence of a `CreateNetlist` command.
///
/// Depth-first from `top`: each block is assigned its position in the
/// output as `block_id`, masters of child instances are flattened before
/// the instances that reference them, and the top block is flagged
/// `top_flag`. Leaf blocks carry no instance data.
pub fn flatten_netlist<V: NetlistView>(view: &V, top: V::Block) -> Vec<BlockData> {
    let mut blocks = Vec::new();
    let mut block_ids = HashMap::new();
    fill_block_data(view, top, &mut blocks, &mut block_ids, true);
    blocks
}

fn fill_block_data<V: NetlistView>(
    view: &V,
    block: V::Block,
    blocks: &mut Vec<BlockData>,
    block_ids: &mut HashMap<V::Block, u32>,
    top: bool,
) {
    if block_ids.contains_key(&block) {
        return;
    }

    let block_id = blocks.len() as u32;
    block_ids.insert(block, block_id);
    // placeholder keeps the id stable while child masters are flattened
    blocks.push(BlockData::default());

    let mut data = BlockData {
        name: view.block_name(block),
        top_flag: top,
        leaf_flag: view.block_is_leaf(block),
        ..BlockData::default()
    };

    let net_ids = fill_block_nets(view, block, &mut data);

    for port in view.block_ports(block) {
        if view.port_is_bit(port) {
            continue;
        }
        data.ports.push(port_data(view, port, &net_ids));
    }

    if !data.leaf_flag {
        for inst in view.block_insts(block) {
            let master = view.inst_master(inst);
            fill_block_data(view, master, blocks, block_ids, false);

            let mut inst_data = InstanceData {
                name: view.inst_name(inst),
                master_block_idx: block_ids[&master],
                ports: Vec::new(),
            };
            for pin in view.inst_pins(inst) {
                if view.pin_is_bit(pin) {
                    continue;
                }
                inst_data.ports.push(pin_data(view, pin, &net_ids));
            }
            data.insts.push(inst_data);
        }
    }

    blocks[block_id as usize] = data;
}

/// Register the block's scalar nets, keeping the name-to-index map the
/// port connections are resolved against.
fn fill_block_nets<V: NetlistView>(
    view: &V,
    block: V::Block,
    data: &mut BlockData,
) -> HashMap<String, u32> {
    let mut net_ids = HashMap::new();
    for net in view.block_nets(block) {
        if view.net_is_bus(net) {
            continue;
        }
        let name = view.net_name(net);
        if net_ids.contains_key(&name) {
            continue;
        }
        net_ids.insert(name.clone(), data.net_names.len() as u32);
        if view.net_has_gnd_source(net) {
            data.gnd_net_name = name.clone();
        }
        if view.net_has_vdd_source(net) {
            data.vdd_net_name = name.clone();
        }
        data.net_names.push(name);
    }
    net_ids
}

fn port_data<V: NetlistView>(
    view: &V,
    port: V::Port,
    net_ids: &HashMap<String, u32>,
) -> PortData {
    let (range_from, range_to) = view.port_bus_range(port);
    let mut data = PortData {
        name: view.port_name(port),
        input: view.port_is_input(port),
        output: view.port_is_output(port),
        bus_flag: view.port_is_bus(port),
        range_from,
        range_to,
        conn_net_indices: Vec::new(),
    };

    if !data.bus_flag {
        if let Some(idx) = connected_net_idx(view, view.port_net(port), net_ids) {
            data.conn_net_indices.push(idx);
        }
        return data;
    }

    for bit in bus_bits(range_from, range_to) {
        let conn = view
            .port_bit(port, bit)
            .and_then(|b| connected_net_idx(view, view.port_net(b), net_ids));
        data.conn_net_indices.push(conn.unwrap_or(UNCONNECTED_NET));
    }
    data
}

fn pin_data<V: NetlistView>(view: &V, pin: V::Pin, net_ids: &HashMap<String, u32>) -> PortData {
    let (range_from, range_to) = view.pin_bus_range(pin);
    let mut data = PortData {
        name: view.pin_name(pin),
        input: view.pin_is_input(pin),
        output: view.pin_is_output(pin),
        bus_flag: view.pin_is_bus(pin),
        range_from,
        range_to,
        conn_net_indices: Vec::new(),
    };

    if !data.bus_flag {
        if let Some(idx) = connected_net_idx(view, view.pin_net(pin), net_ids) {
            data.conn_net_indices.push(idx);
        }
        return data;
    }

    for bit in bus_bits(range_from, range_to) {
        let conn = view
            .pin_bit(pin, bit)
            .and_then(|b| connected_net_idx(view, view.pin_net(b), net_ids));
        data.conn_net_indices.push(conn.unwrap_or(UNCONNECTED_NET));
    }
    data
}

fn connected_net_idx<V: NetlistView>(
    view: &V,
    net: Option<V::Net>,
    net_ids: &HashMap<String, u32>,
) -> Option<u32> {
    net.and_then(|net| net_ids.get(&view.net_name(net)).copied())
}

/// Bit indices of a bus in `[from, to]` declaration order, either
/// direction.
fn bus_bits(from: u32, to: u32) -> Box<dyn Iterator<Item = u32>> {
    if from <= to {
        Box::new(from..=to)
    } else {
        Box::new((to..=from).rev())
    }
}
