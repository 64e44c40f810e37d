//! Engine-side command receiver.

use crate::channel::message::*;

/// Receiver of every command the channel can carry; the STA engine
/// implements this and hands it to [`crate::server::ServerProtocol`].
///
/// Each method returns `true` on success. On failure the server fetches a
/// diagnostic through [`exec_message`](MessageExecutor::exec_message) and
/// forwards it in the `Failed` status response. Four commands produce bulk
/// results through out-parameters; everything else is status-only.
pub trait MessageExecutor {
    /// Diagnostic for the most recent failed command.
    fn exec_message(&self) -> String;

    fn exit(&mut self) -> bool;
    fn ping(&mut self, timeout_ms: u64) -> bool;
    fn set_hier_separator(&mut self, separator: &str) -> bool;

    fn read_lib_file(&mut self, path: &str) -> bool;
    fn read_lib_stream(&mut self, text: &str) -> bool;
    fn clear_libs(&mut self) -> bool;

    fn read_verilog_file(&mut self, path: &str) -> bool;
    fn read_verilog_stream(&mut self, text: &str) -> bool;
    fn link_top(&mut self, top_name: &str) -> bool;
    fn clear_netlist_blocks(&mut self) -> bool;

    fn create_netlist(&mut self, blocks: &[BlockData]) -> bool;

    fn connect_context_pin_net(&mut self, edit: &PinNetEdit) -> bool;
    fn disconnect_context_pin_net(&mut self, edit: &PinNetEdit) -> bool;

    fn read_spef_file(&mut self, path: &str) -> bool;
    fn read_spef_stream(&mut self, text: &str) -> bool;
    fn set_group_net_lump_cap(&mut self, caps: &NetLumpCaps) -> bool;

    fn read_sdf_file(&mut self, path: &str) -> bool;
    fn read_sdf_stream(&mut self, text: &str) -> bool;
    fn write_sdf_file(&mut self, path: &str) -> bool;

    fn set_arcs_delay(&mut self, arcs: &ArcsDelay) -> bool;

    fn create_clock(&mut self, spec: &ClockSpec) -> bool;
    fn create_generated_clock(&mut self, spec: &GenClockSpec) -> bool;
    fn set_clock_groups(&mut self, spec: &ClockGroupsSpec) -> bool;
    fn set_clock_latency(&mut self, spec: &ClockLatencySpec) -> bool;
    fn set_inter_clock_uncertainty(&mut self, spec: &InterClockUncertainty) -> bool;
    fn set_single_clock_uncertainty(&mut self, spec: &ClockUncertainty) -> bool;
    fn set_single_pin_uncertainty(&mut self, spec: &PinUncertainty) -> bool;
    fn set_single_port_delay(&mut self, spec: &PortDelaySpec) -> bool;
    fn set_in_port_transition(&mut self, spec: &PortTransitionSpec) -> bool;
    fn set_false_path(&mut self, spec: &FalsePathSpec) -> bool;
    fn set_min_max_delay(&mut self, spec: &MinMaxDelaySpec) -> bool;
    fn set_multicycle_path(&mut self, spec: &MulticycleSpec) -> bool;
    fn disable_single_pin_timing(&mut self, pin_path: &ObjectContextName) -> bool;
    fn disable_inst_timing(&mut self, spec: &DisableInstTimingSpec) -> bool;
    fn set_global_timing_derate(&mut self, spec: &TimingDerateSpec) -> bool;

    /// Fill the timing-graph vertex and edge maps of the linked design.
    fn get_graph_data(
        &mut self,
        vertices: &mut Vec<VertexIdData>,
        edges: &mut Vec<EdgeIdData>,
    ) -> bool;

    /// Fill per-node arrival/required times for the loaded graph.
    fn get_graph_slacks(&mut self, nodes: &mut Vec<NodeTimingData>) -> bool;

    /// Render a path report into `report`.
    fn report_timing(&mut self, spec: &ReportSpec, report: &mut String) -> bool;

    /// Worst slacks and total negative slacks for both analysis corners.
    fn get_design_stats(
        &mut self,
        min_wns: &mut f32,
        max_wns: &mut f32,
        min_tns: &mut f32,
        max_tns: &mut f32,
    ) -> bool;
}
