//! Shared fixtures: a scriptable executor and channel helpers.

#![allow(dead_code)]

use sta_ipc::{
    ArcsDelay, BlockData, Channel, ClockGroupsSpec, ClockLatencySpec, ClockSpec,
    ClockUncertainty, DisableInstTimingSpec, EdgeIdData, FalsePathSpec, GenClockSpec,
    InterClockUncertainty, MessageExecutor, MinMaxDelaySpec, MulticycleSpec, NetLumpCaps,
    NodeTimingData, ObjectContextName, PinNetEdit, PinUncertainty, PortDelaySpec,
    PortTransitionSpec, ReportSpec, ServerProtocol, ShmemChannel, TimingDerateSpec, VertexIdData,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Canned data and a trace of everything the server executed.
#[derive(Default)]
pub struct MockState {
    pub commands: Vec<String>,
    pub lib_stream: String,
    pub netlist: Vec<BlockData>,
    pub arc_delays: Vec<ArcsDelay>,
    pub vertices: Vec<VertexIdData>,
    pub edges: Vec<EdgeIdData>,
    pub nodes: Vec<NodeTimingData>,
    pub ping_delay: Duration,
    pub report: String,
}

/// Executor that records commands and answers from [`MockState`].
#[derive(Clone, Default)]
pub struct MockExecutor {
    pub state: Arc<Mutex<MockState>>,
}

impl MockExecutor {
    pub fn with_state(state: Arc<Mutex<MockState>>) -> Self {
        Self { state }
    }

    fn log(&self, command: &str) -> bool {
        self.state.lock().unwrap().commands.push(command.into());
        true
    }
}

impl MessageExecutor for MockExecutor {
    fn exec_message(&self) -> String {
        String::new()
    }

    fn exit(&mut self) -> bool {
        self.log("exit")
    }

    fn ping(&mut self, _timeout_ms: u64) -> bool {
        let delay = self.state.lock().unwrap().ping_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.log("ping")
    }

    fn set_hier_separator(&mut self, _separator: &str) -> bool {
        self.log("set_hier_separator")
    }

    fn read_lib_file(&mut self, _path: &str) -> bool {
        self.log("read_lib_file")
    }

    fn read_lib_stream(&mut self, text: &str) -> bool {
        self.state.lock().unwrap().lib_stream = text.to_string();
        self.log("read_lib_stream")
    }

    fn clear_libs(&mut self) -> bool {
        self.log("clear_libs")
    }

    fn read_verilog_file(&mut self, _path: &str) -> bool {
        self.log("read_verilog_file")
    }

    fn read_verilog_stream(&mut self, _text: &str) -> bool {
        self.log("read_verilog_stream")
    }

    fn link_top(&mut self, _top_name: &str) -> bool {
        self.log("link_top")
    }

    fn clear_netlist_blocks(&mut self) -> bool {
        self.log("clear_netlist_blocks")
    }

    fn create_netlist(&mut self, blocks: &[BlockData]) -> bool {
        self.state.lock().unwrap().netlist = blocks.to_vec();
        self.log("create_netlist")
    }

    fn connect_context_pin_net(&mut self, _edit: &PinNetEdit) -> bool {
        self.log("connect_context_pin_net")
    }

    fn disconnect_context_pin_net(&mut self, _edit: &PinNetEdit) -> bool {
        self.log("disconnect_context_pin_net")
    }

    fn read_spef_file(&mut self, _path: &str) -> bool {
        self.log("read_spef_file")
    }

    fn read_spef_stream(&mut self, _text: &str) -> bool {
        self.log("read_spef_stream")
    }

    fn set_group_net_lump_cap(&mut self, _caps: &NetLumpCaps) -> bool {
        self.log("set_group_net_lump_cap")
    }

    fn read_sdf_file(&mut self, _path: &str) -> bool {
        self.log("read_sdf_file")
    }

    fn read_sdf_stream(&mut self, _text: &str) -> bool {
        self.log("read_sdf_stream")
    }

    fn write_sdf_file(&mut self, _path: &str) -> bool {
        self.log("write_sdf_file")
    }

    fn set_arcs_delay(&mut self, arcs: &ArcsDelay) -> bool {
        self.state.lock().unwrap().arc_delays.push(arcs.clone());
        self.log("set_arcs_delay")
    }

    fn create_clock(&mut self, _spec: &ClockSpec) -> bool {
        self.log("create_clock")
    }

    fn create_generated_clock(&mut self, _spec: &GenClockSpec) -> bool {
        self.log("create_generated_clock")
    }

    fn set_clock_groups(&mut self, _spec: &ClockGroupsSpec) -> bool {
        self.log("set_clock_groups")
    }

    fn set_clock_latency(&mut self, _spec: &ClockLatencySpec) -> bool {
        self.log("set_clock_latency")
    }

    fn set_inter_clock_uncertainty(&mut self, _spec: &InterClockUncertainty) -> bool {
        self.log("set_inter_clock_uncertainty")
    }

    fn set_single_clock_uncertainty(&mut self, _spec: &ClockUncertainty) -> bool {
        self.log("set_single_clock_uncertainty")
    }

    fn set_single_pin_uncertainty(&mut self, _spec: &PinUncertainty) -> bool {
        self.log("set_single_pin_uncertainty")
    }

    fn set_single_port_delay(&mut self, _spec: &PortDelaySpec) -> bool {
        self.log("set_single_port_delay")
    }

    fn set_in_port_transition(&mut self, _spec: &PortTransitionSpec) -> bool {
        self.log("set_in_port_transition")
    }

    fn set_false_path(&mut self, _spec: &FalsePathSpec) -> bool {
        self.log("set_false_path")
    }

    fn set_min_max_delay(&mut self, _spec: &MinMaxDelaySpec) -> bool {
        self.log("set_min_max_delay")
    }

    fn set_multicycle_path(&mut self, _spec: &MulticycleSpec) -> bool {
        self.log("set_multicycle_path")
    }

    fn disable_single_pin_timing(&mut self, _pin_path: &ObjectContextName) -> bool {
        self.log("disable_single_pin_timing")
    }

    fn disable_inst_timing(&mut self, _spec: &DisableInstTimingSpec) -> bool {
        self.log("disable_inst_timing")
    }

    fn set_global_timing_derate(&mut self, _spec: &TimingDerateSpec) -> bool {
        self.log("set_global_timing_derate")
    }

    fn get_graph_data(
        &mut self,
        vertices: &mut Vec<VertexIdData>,
        edges: &mut Vec<EdgeIdData>,
    ) -> bool {
        let state = self.state.lock().unwrap();
        *vertices = state.vertices.clone();
        *edges = state.edges.clone();
        drop(state);
        self.log("get_graph_data")
    }

    fn get_graph_slacks(&mut self, nodes: &mut Vec<NodeTimingData>) -> bool {
        *nodes = self.state.lock().unwrap().nodes.clone();
        self.log("get_graph_slacks")
    }

    fn report_timing(&mut self, _spec: &ReportSpec, report: &mut String) -> bool {
        *report = self.state.lock().unwrap().report.clone();
        self.log("report_timing")
    }

    fn get_design_stats(
        &mut self,
        min_wns: &mut f32,
        max_wns: &mut f32,
        min_tns: &mut f32,
        max_tns: &mut f32,
    ) -> bool {
        *min_wns = 0.25;
        *max_wns = -0.5;
        *min_tns = 0.0;
        *max_tns = -4.5;
        self.log("get_design_stats")
    }
}

static NAME_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Per-test shared-memory base name; unique across tests and runs.
pub fn shm_name(tag: &str) -> String {
    let n = NAME_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("sta_ipc_test_{}_{}_{}", std::process::id(), tag, n)
}

/// Channel/server logging, driven by `RUST_LOG` as usual.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Serve commands on `name` until the exit command arrives.
pub fn spawn_server(name: &str, executor: MockExecutor) -> thread::JoinHandle<()> {
    init_tracing();
    let name = name.to_string();
    thread::spawn(move || {
        let mut channel = ShmemChannel::server(&name);
        channel.connect().expect("server connect");
        let mut server = ServerProtocol::new(channel, executor);
        server.run_cycle().expect("server loop");
    })
}

/// Open the client end, waiting out the server's region setup.
pub fn connect_client(name: &str) -> ShmemChannel {
    let mut channel = ShmemChannel::client(name);
    for _ in 0..200 {
        match channel.connect() {
            Ok(()) => return channel,
            Err(_) => thread::sleep(Duration::from_millis(10)),
        }
    }
    panic!("client failed to connect to {name}");
}
