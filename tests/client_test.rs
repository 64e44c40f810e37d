//! Client-protocol tests: netlist flattening, graph correlation,
//! criticality and invalidation against a served mock engine.

mod common;

use common::{connect_client, shm_name, spawn_server, MockExecutor, MockState};
use sta_ipc::{
    flatten_netlist, ClientError, EdgeIdData, InterPinDelay, NetlistView, NodeTimingData,
    ShmemChannel, StaClient, VertexIdData,
};
use std::sync::{Arc, Mutex};

// =============================================================================
// IN-MEMORY NETLIST
// =============================================================================

#[derive(Default)]
struct BlockDef {
    name: String,
    leaf: bool,
    ports: Vec<usize>,
    insts: Vec<usize>,
    nets: Vec<usize>,
}

#[derive(Default)]
struct InstDef {
    name: String,
    master: usize,
    pins: Vec<usize>,
}

#[derive(Default)]
struct PinDef {
    name: String,
    input: bool,
    output: bool,
    parent: Option<usize>,
    net: Option<usize>,
}

#[derive(Default)]
struct PortDef {
    name: String,
    input: bool,
    output: bool,
    pin: Option<usize>,
    net: Option<usize>,
}

#[derive(Default)]
struct NetDef {
    name: String,
    gnd: bool,
    vdd: bool,
}

/// Flat-array netlist; every handle is an index. No bus objects.
#[derive(Default)]
struct MiniNetlist {
    blocks: Vec<BlockDef>,
    insts: Vec<InstDef>,
    pins: Vec<PinDef>,
    ports: Vec<PortDef>,
    nets: Vec<NetDef>,
}

impl NetlistView for MiniNetlist {
    type Block = usize;
    type Inst = usize;
    type Port = usize;
    type Pin = usize;
    type Net = usize;

    fn block_name(&self, block: usize) -> String {
        self.blocks[block].name.clone()
    }
    fn block_is_leaf(&self, block: usize) -> bool {
        self.blocks[block].leaf
    }
    fn block_ports(&self, block: usize) -> Vec<usize> {
        self.blocks[block].ports.clone()
    }
    fn block_insts(&self, block: usize) -> Vec<usize> {
        self.blocks[block].insts.clone()
    }
    fn block_nets(&self, block: usize) -> Vec<usize> {
        self.blocks[block].nets.clone()
    }

    fn inst_name(&self, inst: usize) -> String {
        self.insts[inst].name.clone()
    }
    fn inst_master(&self, inst: usize) -> usize {
        self.insts[inst].master
    }
    fn inst_pins(&self, inst: usize) -> Vec<usize> {
        self.insts[inst].pins.clone()
    }

    fn port_name(&self, port: usize) -> String {
        self.ports[port].name.clone()
    }
    fn port_is_input(&self, port: usize) -> bool {
        self.ports[port].input
    }
    fn port_is_output(&self, port: usize) -> bool {
        self.ports[port].output
    }
    fn port_is_bus(&self, _port: usize) -> bool {
        false
    }
    fn port_is_bit(&self, _port: usize) -> bool {
        false
    }
    fn port_bus_range(&self, _port: usize) -> (u32, u32) {
        (0, 0)
    }
    fn port_bit(&self, _port: usize, _bit: u32) -> Option<usize> {
        None
    }
    fn port_net(&self, port: usize) -> Option<usize> {
        self.ports[port].net
    }
    fn port_pin(&self, port: usize) -> Option<usize> {
        self.ports[port].pin
    }

    fn pin_name(&self, pin: usize) -> String {
        self.pins[pin].name.clone()
    }
    fn pin_is_input(&self, pin: usize) -> bool {
        self.pins[pin].input
    }
    fn pin_is_output(&self, pin: usize) -> bool {
        self.pins[pin].output
    }
    fn pin_is_bus(&self, _pin: usize) -> bool {
        false
    }
    fn pin_is_bit(&self, _pin: usize) -> bool {
        false
    }
    fn pin_bus_range(&self, _pin: usize) -> (u32, u32) {
        (0, 0)
    }
    fn pin_bit(&self, _pin: usize, _bit: u32) -> Option<usize> {
        None
    }
    fn pin_net(&self, pin: usize) -> Option<usize> {
        self.pins[pin].net
    }
    fn pin_parent(&self, pin: usize) -> Option<usize> {
        self.pins[pin].parent
    }

    fn net_name(&self, net: usize) -> String {
        self.nets[net].name.clone()
    }
    fn net_is_bus(&self, _net: usize) -> bool {
        false
    }
    fn net_has_gnd_source(&self, net: usize) -> bool {
        self.nets[net].gnd
    }
    fn net_has_vdd_source(&self, net: usize) -> bool {
        self.nets[net].vdd
    }
}

/// Top block `top` holding one leaf `inv` instance `u1` with pins `a`
/// (input, on net n1) and `z` (output, on net n2), plus a second leaf
/// instance `u2` with input pin `b` on net n2. One top-level input port
/// `in` drives n1 through its internal pin.
struct Design {
    netlist: MiniNetlist,
    top: usize,
    pin_a: usize,
    pin_z: usize,
    pin_b: usize,
    port_pin_in: usize,
}

fn two_level_design() -> Design {
    let mut n = MiniNetlist::default();

    n.nets.push(NetDef {
        name: "n1".into(),
        ..NetDef::default()
    });
    n.nets.push(NetDef {
        name: "n2".into(),
        ..NetDef::default()
    });
    n.nets.push(NetDef {
        name: "gnd".into(),
        gnd: true,
        ..NetDef::default()
    });

    // leaf master with template ports a/z
    n.ports.push(PortDef {
        name: "a".into(),
        input: true,
        ..PortDef::default()
    });
    n.ports.push(PortDef {
        name: "z".into(),
        output: true,
        ..PortDef::default()
    });
    n.blocks.push(BlockDef {
        name: "inv".into(),
        leaf: true,
        ports: vec![0, 1],
        ..BlockDef::default()
    });
    let leaf = 0;

    // u1 pins
    n.pins.push(PinDef {
        name: "a".into(),
        input: true,
        parent: Some(0),
        net: Some(0),
        ..PinDef::default()
    });
    n.pins.push(PinDef {
        name: "z".into(),
        output: true,
        parent: Some(0),
        net: Some(1),
        ..PinDef::default()
    });
    // u2 pin
    n.pins.push(PinDef {
        name: "b".into(),
        input: true,
        parent: Some(1),
        net: Some(1),
        ..PinDef::default()
    });
    // pin behind the top port
    n.pins.push(PinDef {
        name: "in".into(),
        input: true,
        parent: None,
        net: Some(0),
        ..PinDef::default()
    });

    n.insts.push(InstDef {
        name: "u1".into(),
        master: leaf,
        pins: vec![0, 1],
    });
    n.insts.push(InstDef {
        name: "u2".into(),
        master: leaf,
        pins: vec![2],
    });

    n.ports.push(PortDef {
        name: "in".into(),
        input: true,
        pin: Some(3),
        net: Some(0),
        ..PortDef::default()
    });

    n.blocks.push(BlockDef {
        name: "top".into(),
        leaf: false,
        ports: vec![2],
        insts: vec![0, 1],
        nets: vec![0, 1, 2],
    });

    Design {
        netlist: n,
        top: 1,
        pin_a: 0,
        pin_z: 1,
        pin_b: 2,
        port_pin_in: 3,
    }
}

fn served_client(
    tag: &str,
    state: Arc<Mutex<MockState>>,
) -> (
    StaClient<MiniNetlist, ShmemChannel>,
    std::thread::JoinHandle<()>,
) {
    let name = shm_name(tag);
    let server = spawn_server(&name, MockExecutor::with_state(state));
    let channel = connect_client(&name);
    (StaClient::new(channel), server)
}

fn shut_down(
    client: &mut StaClient<MiniNetlist, ShmemChannel>,
    server: std::thread::JoinHandle<()>,
) {
    client.exit().expect("exit");
    server.join().expect("server thread");
}

/// Graph data for `two_level_design`: driver u1/z (vertex 0), sink u2/b
/// (vertex 1), sink u1/a (vertex 2), one edge u1/z -> u2/b with id 5.
fn graph_for_design(state: &Arc<Mutex<MockState>>) {
    let mut st = state.lock().unwrap();
    st.vertices = vec![
        VertexIdData {
            context_inst_names: vec!["u1".into()],
            is_driver: true,
            pin_name: "z".into(),
            vertex_id: 0,
        },
        VertexIdData {
            context_inst_names: vec!["u2".into()],
            is_driver: false,
            pin_name: "b".into(),
            vertex_id: 1,
        },
        VertexIdData {
            context_inst_names: vec!["u1".into()],
            is_driver: false,
            pin_name: "a".into(),
            vertex_id: 2,
        },
    ];
    st.edges = vec![EdgeIdData {
        edge_id: 5,
        from_vertex_id: 0,
        to_vertex_id: 1,
    }];
}

fn max_corner_node(endpoint_idx: u32, aat: f32, path_rat: f32) -> NodeTimingData {
    NodeTimingData {
        endpoint_idx,
        has_timing: true,
        has_end_max_path_rat: true,
        max_path_rat: path_rat,
        max_rat: 0.0,
        max_aat: aat,
        is_endpoint: endpoint_idx == 0,
        ..NodeTimingData::default()
    }
}

// =============================================================================
// FLATTENING
// =============================================================================

#[test]
fn flatten_two_level_design() {
    let design = two_level_design();
    let blocks = flatten_netlist(&design.netlist, design.top);

    assert_eq!(blocks.len(), 2);

    let top = &blocks[0];
    assert_eq!(top.name, "top");
    assert!(top.top_flag);
    assert!(!top.leaf_flag);
    assert_eq!(top.net_names, ["n1", "n2", "gnd"]);
    assert_eq!(top.gnd_net_name, "gnd");
    assert_eq!(top.vdd_net_name, "");

    // the leaf master was flattened before the instances referencing it
    let leaf = &blocks[1];
    assert_eq!(leaf.name, "inv");
    assert!(leaf.leaf_flag);
    assert!(!leaf.top_flag);
    assert!(leaf.insts.is_empty());
    assert_eq!(leaf.ports.len(), 2);

    assert_eq!(top.insts.len(), 2);
    let u1 = &top.insts[0];
    assert_eq!(u1.name, "u1");
    assert_eq!(u1.master_block_idx, 1);
    assert_eq!(u1.ports[0].name, "a");
    assert_eq!(u1.ports[0].conn_net_indices, [0]);
    assert_eq!(u1.ports[1].conn_net_indices, [1]);
    assert_eq!(top.insts[1].ports[0].conn_net_indices, [1]);

    assert_eq!(top.ports.len(), 1);
    assert_eq!(top.ports[0].name, "in");
    assert_eq!(top.ports[0].conn_net_indices, [0]);
}

#[test]
fn flatten_skips_connection_for_loose_scalar_pins() {
    let mut design = two_level_design();
    design.netlist.pins[design.pin_b].net = None;
    let blocks = flatten_netlist(&design.netlist, design.top);
    // scalar unconnected pin: no connection entry at all (the
    // UNCONNECTED_NET sentinel is reserved for bus bits)
    assert!(blocks[0].insts[1].ports[0].conn_net_indices.is_empty());
}

// =============================================================================
// CORRELATION AND CRITICALITY
// =============================================================================

#[test]
fn load_netlist_graph_builds_path_index() {
    let design = two_level_design();
    let state = Arc::new(Mutex::new(MockState::default()));
    graph_for_design(&state);
    let (mut client, server) = served_client("graphmap", state.clone());

    client
        .create_netlist(&design.netlist, design.top)
        .expect("create netlist");
    assert!(!client.has_graph());

    client
        .load_netlist_graph(&design.netlist, design.top)
        .expect("load graph");
    assert!(client.has_graph());
    assert!(!client.has_timings());

    let paths: Vec<(String, usize)> = client
        .path_pins()
        .map(|(path, pin)| (path.to_string(), pin))
        .collect();
    assert!(paths.contains(&("u1/a".to_string(), design.pin_a)));
    assert!(paths.contains(&("u1/z".to_string(), design.pin_z)));
    assert!(paths.contains(&("u2/b".to_string(), design.pin_b)));
    // top-level port pin registered under the port's bare name
    assert!(paths.contains(&("in".to_string(), design.port_pin_in)));

    assert_eq!(state.lock().unwrap().netlist.len(), 2);

    shut_down(&mut client, server);
}

#[test]
fn load_netlist_graph_fails_on_unknown_vertex_path() {
    let design = two_level_design();
    let state = Arc::new(Mutex::new(MockState::default()));
    graph_for_design(&state);
    state.lock().unwrap().vertices.push(VertexIdData {
        context_inst_names: vec!["u9".into()],
        is_driver: false,
        pin_name: "x".into(),
        vertex_id: 3,
    });
    let (mut client, server) = served_client("badvertex", state);

    let err = client
        .load_netlist_graph(&design.netlist, design.top)
        .expect_err("unknown vertex path must fail correlation");
    assert!(matches!(err, ClientError::InvalidArgument(_)));
    assert!(!client.has_graph());

    shut_down(&mut client, server);
}

#[test]
fn criticality_follows_endpoint_group_math() {
    let design = two_level_design();
    let state = Arc::new(Mutex::new(MockState::default()));
    graph_for_design(&state);
    // node slacks {-2, 0, 3} against group divider 5
    state.lock().unwrap().nodes = vec![
        max_corner_node(0, 2.0, 5.0),
        max_corner_node(0, 0.0, 5.0),
        max_corner_node(0, -3.0, 5.0),
    ];
    let (mut client, server) = served_client("crit", state);

    client
        .load_netlist_graph(&design.netlist, design.top)
        .expect("load graph");
    client.load_netlist_slacks().expect("load slacks");
    assert!(client.has_timings());

    // vertex ids: u1/z -> node 0, u2/b -> node 1, u1/a -> node 2
    let crit_z = client.pin_criticality(design.pin_z, false, true).unwrap();
    let crit_b = client.pin_criticality(design.pin_b, false, false).unwrap();
    let crit_a = client.pin_criticality(design.pin_a, false, false).unwrap();

    assert!((crit_z - 1.0).abs() < 1e-6);
    assert!((crit_b - (1.0 - 2.0 / 7.0)).abs() < 1e-6);
    assert!((crit_a - (1.0 - 5.0 / 7.0)).abs() < 1e-6);

    // arc criticality resolves the sink-side node of u1/z -> u2/b
    let arc = client
        .arc_crit_factor(&design.netlist, design.pin_z, design.pin_b, false)
        .unwrap();
    assert!((arc - crit_b).abs() < 1e-6);

    // no edge between these pins
    assert!(client
        .arc_crit_factor(&design.netlist, design.pin_a, design.pin_b, false)
        .is_none());

    let timing = client.pin_timing_data(design.pin_b).unwrap();
    assert!((timing.max_aat - 0.0).abs() < 1e-6);

    shut_down(&mut client, server);
}

// =============================================================================
// ARC DELAYS AND INVALIDATION
// =============================================================================

#[test]
fn arc_delays_translate_to_edge_ids() {
    let design = two_level_design();
    let state = Arc::new(Mutex::new(MockState::default()));
    graph_for_design(&state);
    state.lock().unwrap().nodes = vec![max_corner_node(0, 0.0, 5.0)];
    let (mut client, server) = served_client("arcdelay", state.clone());

    client
        .load_netlist_graph(&design.netlist, design.top)
        .expect("load graph");
    client.load_netlist_slacks().expect("load slacks");

    // empty input is a no-op, no round-trip
    client
        .set_inter_pin_arc_delays(&[], true, true)
        .expect("empty arcs");
    assert!(state.lock().unwrap().arc_delays.is_empty());

    client
        .set_inter_pin_arc_delay(design.pin_z, design.pin_b, false, true, 2.5e-10)
        .expect("set arc delay");

    {
        let st = state.lock().unwrap();
        assert_eq!(st.arc_delays.len(), 1);
        assert_eq!(st.arc_delays[0].edge_ids, [5]);
        assert_eq!(st.arc_delays[0].delay_values.len(), 1);
        assert!(st.arc_delays[0].max);
        assert!(!st.arc_delays[0].min);
    }

    // delay change drops the cached timing but keeps the graph
    assert!(client.has_graph());
    assert!(!client.has_timings());

    // pairs with no edge at all are an error
    let err = client
        .set_inter_pin_arc_delays(
            &[InterPinDelay {
                source: design.pin_a,
                sink: design.pin_b,
                value: 1e-10,
            }],
            true,
            false,
        )
        .expect_err("no matching edges");
    assert!(matches!(err, ClientError::InvalidArgument(_)));

    shut_down(&mut client, server);
}

#[test]
fn structural_commands_invalidate_graph_state() {
    let design = two_level_design();
    let state = Arc::new(Mutex::new(MockState::default()));
    graph_for_design(&state);
    state.lock().unwrap().nodes = vec![max_corner_node(0, 0.0, 5.0)];
    let (mut client, server) = served_client("invalidate", state.clone());

    client
        .load_netlist_graph(&design.netlist, design.top)
        .expect("load graph");
    client.load_netlist_slacks().expect("load slacks");
    assert!(client.has_timings());

    // parasitic change: timing gone, graph kept
    client
        .set_nets_lump_cap(
            &design.netlist,
            &[sta_ipc::NetPath {
                context: vec![],
                net: 0,
            }],
            &[2e-15],
        )
        .expect("lump cap");
    assert!(client.has_graph());
    assert!(!client.has_timings());

    // structural change: everything gone
    client.clear_netlist_blocks().expect("clear netlist");
    assert!(!client.has_graph());
    assert_eq!(client.path_pins().count(), 0);

    // slacks cannot load without a graph
    let err = client.load_netlist_slacks().expect_err("no graph");
    assert!(matches!(err, ClientError::InvalidArgument(_)));

    shut_down(&mut client, server);
}

#[test]
fn reports_and_stats_round_trip() {
    let state = Arc::new(Mutex::new(MockState {
        report: "Startpoint: in\nEndpoint: u2/b\nslack (MET) 0.25".into(),
        ..MockState::default()
    }));
    let (mut client, server) = served_client("reports", state.clone());

    let report = client
        .report_timing(true, false, true, false, 10, 1)
        .expect("report");
    assert!(report.contains("Endpoint: u2/b"));

    let stats = client.design_stats().expect("stats");
    assert!((stats.min_wns - 0.25).abs() < 1e-6);
    assert!((stats.max_wns + 0.5).abs() < 1e-6);
    assert!((stats.max_tns + 4.5).abs() < 1e-6);

    let commands = state.lock().unwrap().commands.clone();
    assert_eq!(commands, ["report_timing", "get_design_stats"]);

    shut_down(&mut client, server);
}
