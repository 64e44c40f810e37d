//! Typed client of the STA engine.
//!
//! [`StaClient`] wraps a [`Channel`] with one method per engine command and
//! keeps the client-side correlation state: the `path -> pin` index built
//! from the local netlist, the driver/sink `pin -> vertex id` maps, the
//! `(source, sink) -> edge ids` multimap and the cached per-node timing
//! data with its derived criticality factors.
//!
//! Any command that structurally changes the engine netlist invalidates
//! the whole correlation state; commands that only change delays or
//! parasitics invalidate the timing sub-state and keep the graph maps.

use crate::channel::message::*;
use crate::channel::Channel;
use crate::client::netlist::{
    flatten_netlist, InterPinDelay, NetPath, NetlistView, PathSelection, PinPath,
};
use crate::error::ClientError;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Design-wide slack summary returned by [`StaClient::design_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimingStats {
    pub min_wns: f32,
    pub max_wns: f32,
    pub min_tns: f32,
    pub max_tns: f32,
}

/// Client endpoint of the engine channel.
///
/// `V` is the application's netlist access; only cheap netlist handles are
/// stored here, never netlist objects.
pub struct StaClient<V: NetlistView, C: Channel> {
    channel: C,
    separator: char,

    path_to_pin: BTreeMap<String, V::Pin>,
    driver_pin_to_vertex: HashMap<V::Pin, u32>,
    sink_pin_to_vertex: HashMap<V::Pin, u32>,
    pin_pair_to_edges: HashMap<(V::Pin, V::Pin), Vec<u32>>,
    has_graph: bool,

    node_timings: Vec<NodeTimingData>,
    min_crit_factors: Vec<f32>,
    max_crit_factors: Vec<f32>,
    has_graph_timing: bool,
}

impl<V: NetlistView, C: Channel> StaClient<V, C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            separator: '/',
            path_to_pin: BTreeMap::new(),
            driver_pin_to_vertex: HashMap::new(),
            sink_pin_to_vertex: HashMap::new(),
            pin_pair_to_edges: HashMap::new(),
            has_graph: false,
            node_timings: Vec::new(),
            min_crit_factors: Vec::new(),
            max_crit_factors: Vec::new(),
            has_graph_timing: false,
        }
    }

    pub fn connect(&mut self) -> Result<(), ClientError> {
        Ok(self.channel.connect()?)
    }

    pub fn disconnect(&mut self) {
        self.channel.disconnect();
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    /// Graph correlation tables are loaded.
    pub fn has_graph(&self) -> bool {
        self.has_graph
    }

    /// Both the graph tables and the per-node timing data are loaded.
    pub fn has_timings(&self) -> bool {
        self.has_graph && self.has_graph_timing
    }

    /// The `path -> pin` index, in path order.
    pub fn path_pins(&self) -> impl Iterator<Item = (&str, V::Pin)> {
        self.path_to_pin.iter().map(|(path, pin)| (path.as_str(), *pin))
    }

    // =========================================================================
    // LIFECYCLE AND INGESTION COMMANDS
    // =========================================================================

    /// Set the hierarchy separator on both sides of the channel.
    pub fn set_hierarchy_separator(&mut self, separator: char) -> Result<(), ClientError> {
        self.separator = separator;
        self.execute_status(&Message::SetHierSeparator(separator.to_string()))
            .map(drop)
    }

    /// Ask the engine to exit; closes the channel on success.
    pub fn exit(&mut self) -> Result<(), ClientError> {
        self.execute_status(&Message::Exit)?;
        self.channel.disconnect();
        Ok(())
    }

    /// Check the engine responds within `timeout_ms`.
    pub fn ping(&mut self, timeout_ms: u64) -> Result<(), ClientError> {
        let msg = Message::Ping { timeout_ms };
        self.execute_status_with_timeout(&msg, timeout_ms).map(drop)
    }

    pub fn read_liberty_file(&mut self, path: &str) -> Result<(), ClientError> {
        self.execute_status(&Message::ReadLibFile(path.into())).map(drop)
    }

    /// Upload liberty data by value.
    pub fn read_liberty_stream(&mut self, text: &str) -> Result<(), ClientError> {
        self.execute_status(&Message::ReadLibStream(text.into())).map(drop)
    }

    pub fn clear_libraries(&mut self) -> Result<(), ClientError> {
        self.execute_status(&Message::ClearLibs).map(drop)
    }

    pub fn read_verilog_file(&mut self, path: &str) -> Result<(), ClientError> {
        self.execute_status(&Message::ReadVerilogFile(path.into())).map(drop)
    }

    pub fn read_verilog_stream(&mut self, text: &str) -> Result<(), ClientError> {
        self.execute_status(&Message::ReadVerilogStream(text.into())).map(drop)
    }

    /// Build the engine netlist from previously read Verilog, linking
    /// `top_name` as the top block.
    pub fn link_netlist(&mut self, top_name: &str) -> Result<(), ClientError> {
        self.clear_graph_mapping();
        self.execute_status(&Message::LinkTop(top_name.into())).map(drop)
    }

    /// Flatten the local design under `top` and rebuild the engine
    /// netlist from it.
    pub fn create_netlist(&mut self, view: &V, top: V::Block) -> Result<(), ClientError> {
        self.clear_graph_mapping();
        let blocks = flatten_netlist(view, top);
        self.execute_status(&Message::CreateNetlist(blocks)).map(drop)
    }

    pub fn clear_netlist_blocks(&mut self) -> Result<(), ClientError> {
        self.clear_graph_mapping();
        self.execute_status(&Message::ClearNetlistBlocks).map(drop)
    }

    // =========================================================================
    // TOPOLOGY EDITS
    // =========================================================================

    pub fn connect_pin_net(
        &mut self,
        view: &V,
        context: &[V::Inst],
        pin: V::Pin,
        net: V::Net,
    ) -> Result<(), ClientError> {
        let edit = pin_net_edit(view, context, pin, net)?;
        self.clear_graph_mapping();
        self.execute_status(&Message::ConnectContextPinNet(edit)).map(drop)
    }

    pub fn disconnect_pin_net(
        &mut self,
        view: &V,
        context: &[V::Inst],
        pin: V::Pin,
        net: V::Net,
    ) -> Result<(), ClientError> {
        let edit = pin_net_edit(view, context, pin, net)?;
        self.clear_graph_mapping();
        self.execute_status(&Message::DisconnectContextPinNet(edit)).map(drop)
    }

    pub fn connect_top_pin_net(
        &mut self,
        view: &V,
        pin: V::Pin,
        net: V::Net,
    ) -> Result<(), ClientError> {
        self.connect_pin_net(view, &[], pin, net)
    }

    pub fn disconnect_top_pin_net(
        &mut self,
        view: &V,
        pin: V::Pin,
        net: V::Net,
    ) -> Result<(), ClientError> {
        self.disconnect_pin_net(view, &[], pin, net)
    }

    // =========================================================================
    // CONSTRAINTS
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    pub fn create_clock(
        &mut self,
        view: &V,
        name: &str,
        description: &str,
        pin_paths: &[PinPath<V>],
        add_flag: bool,
        period: f32,
        waveform: &[f32],
    ) -> Result<(), ClientError> {
        let spec = ClockSpec {
            name: name.into(),
            description: description.into(),
            pin_paths: pin_paths.iter().map(|p| p.to_context_name(view)).collect(),
            add_flag,
            period,
            waveform: waveform.to_vec(),
        };
        self.execute_status(&Message::CreateClock(spec)).map(drop)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_generated_clock(
        &mut self,
        view: &V,
        name: &str,
        description: &str,
        master_clock_pin_path: Option<&PinPath<V>>,
        master_clock_name: &str,
        pin_paths: &[PinPath<V>],
        add_flag: bool,
        divide_factor: i32,
        multiply_factor: i32,
        duty_cycle: f32,
        invert: bool,
        edges: &[i32],
        edge_shifts: &[f32],
    ) -> Result<(), ClientError> {
        let spec = GenClockSpec {
            name: name.into(),
            description: description.into(),
            master_clock_pin_path: master_clock_pin_path
                .map(|p| p.to_context_name(view))
                .unwrap_or_default(),
            master_clock_name: master_clock_name.into(),
            pin_paths: pin_paths.iter().map(|p| p.to_context_name(view)).collect(),
            add_flag,
            divide_factor,
            multiply_factor,
            duty_cycle,
            invert,
            edges: edges.to_vec(),
            edge_shifts: edge_shifts.to_vec(),
        };
        self.execute_status(&Message::CreateGeneratedClock(spec)).map(drop)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_clock_groups(
        &mut self,
        name: &str,
        description: &str,
        logical_exclusive: bool,
        physical_exclusive: bool,
        asynchronous: bool,
        allow_paths: bool,
        clock_groups: &[Vec<String>],
    ) -> Result<(), ClientError> {
        let spec = ClockGroupsSpec {
            name: name.into(),
            description: description.into(),
            logical_exclusive,
            physical_exclusive,
            asynchronous,
            allow_paths,
            clock_groups: clock_groups.to_vec(),
        };
        self.execute_status(&Message::SetClockGroups(spec)).map(drop)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_clock_latency(
        &mut self,
        view: &V,
        source: bool,
        min: bool,
        max: bool,
        early: bool,
        late: bool,
        rise: bool,
        fall: bool,
        value: f32,
        clock_name: &str,
        pin_path: Option<&PinPath<V>>,
    ) -> Result<(), ClientError> {
        let spec = ClockLatencySpec {
            source,
            min,
            max,
            early,
            late,
            rise,
            fall,
            value,
            clock_name: clock_name.into(),
            pin_path: pin_path.map(|p| p.to_context_name(view)).unwrap_or_default(),
        };
        self.execute_status(&Message::SetClockLatency(spec)).map(drop)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_clock_to_clock_uncertainty(
        &mut self,
        from_clock_name: &str,
        from_rise: bool,
        from_fall: bool,
        to_clock_name: &str,
        to_rise: bool,
        to_fall: bool,
        setup: bool,
        hold: bool,
        value: f32,
    ) -> Result<(), ClientError> {
        let spec = InterClockUncertainty {
            from_clock_name: from_clock_name.into(),
            from_rise,
            from_fall,
            to_clock_name: to_clock_name.into(),
            to_rise,
            to_fall,
            setup,
            hold,
            value,
        };
        self.execute_status(&Message::SetInterClockUncertainty(spec)).map(drop)
    }

    pub fn set_clock_uncertainty(
        &mut self,
        clock_name: &str,
        setup: bool,
        hold: bool,
        value: f32,
    ) -> Result<(), ClientError> {
        let spec = ClockUncertainty {
            clock_name: clock_name.into(),
            setup,
            hold,
            value,
        };
        self.execute_status(&Message::SetSingleClockUncertainty(spec)).map(drop)
    }

    pub fn set_pin_uncertainty(
        &mut self,
        view: &V,
        pin_path: &PinPath<V>,
        setup: bool,
        hold: bool,
        value: f32,
    ) -> Result<(), ClientError> {
        let spec = PinUncertainty {
            pin_path: pin_path.to_context_name(view),
            setup,
            hold,
            value,
        };
        self.execute_status(&Message::SetSinglePinUncertainty(spec)).map(drop)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_port_delay(
        &mut self,
        view: &V,
        is_input: bool,
        clock_name: &str,
        clock_pin_path: Option<&PinPath<V>>,
        clock_fall: bool,
        level_sensitive: bool,
        delay_rise: bool,
        delay_fall: bool,
        delay_max: bool,
        delay_min: bool,
        add: bool,
        network_latency_inc: bool,
        source_latency_inc: bool,
        delay: f32,
        target_port_pin: &PinPath<V>,
    ) -> Result<(), ClientError> {
        let spec = PortDelaySpec {
            is_input,
            clock_name: clock_name.into(),
            clock_pin_path: clock_pin_path
                .map(|p| p.to_context_name(view))
                .unwrap_or_default(),
            clock_fall,
            level_sensitive,
            delay_rise,
            delay_fall,
            delay_max,
            delay_min,
            add,
            network_latency_inc,
            source_latency_inc,
            delay,
            target_port_pin: target_port_pin.to_context_name(view),
        };
        self.execute_status(&Message::SetSinglePortDelay(spec)).map(drop)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_input_transition(
        &mut self,
        view: &V,
        delay_rise: bool,
        delay_fall: bool,
        delay_max: bool,
        delay_min: bool,
        value: f32,
        target_port_pin: &PinPath<V>,
    ) -> Result<(), ClientError> {
        let spec = PortTransitionSpec {
            delay_rise,
            delay_fall,
            delay_max,
            delay_min,
            value,
            target_port_pin: target_port_pin.to_context_name(view),
        };
        self.execute_status(&Message::SetInPortTransition(spec)).map(drop)
    }

    pub fn set_false_path(
        &mut self,
        view: &V,
        setup: bool,
        hold: bool,
        comment: &str,
        selection: &PathSelection<V>,
    ) -> Result<(), ClientError> {
        let spec = FalsePathSpec {
            path: path_endpoints(view, selection),
            setup,
            hold,
            comment: comment.into(),
        };
        self.execute_status(&Message::SetFalsePath(spec)).map(drop)
    }

    pub fn set_min_max_delay(
        &mut self,
        view: &V,
        min_delay_flag: bool,
        value: f32,
        comment: &str,
        selection: &PathSelection<V>,
    ) -> Result<(), ClientError> {
        let spec = MinMaxDelaySpec {
            path: path_endpoints(view, selection),
            min_delay_flag,
            value,
            comment: comment.into(),
        };
        self.execute_status(&Message::SetMinMaxDelay(spec)).map(drop)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_multicycle_path(
        &mut self,
        view: &V,
        setup: bool,
        hold: bool,
        start: bool,
        end: bool,
        value: i32,
        comment: &str,
        selection: &PathSelection<V>,
    ) -> Result<(), ClientError> {
        let spec = MulticycleSpec {
            path: path_endpoints(view, selection),
            setup,
            hold,
            start,
            end,
            value,
            comment: comment.into(),
        };
        self.execute_status(&Message::SetMulticyclePath(spec)).map(drop)
    }

    pub fn set_disable_pin_timing(
        &mut self,
        view: &V,
        pin_path: &PinPath<V>,
    ) -> Result<(), ClientError> {
        let path = pin_path.to_context_name(view);
        self.execute_status(&Message::DisableSinglePinTiming(path)).map(drop)
    }

    pub fn set_disable_inst_timing(
        &mut self,
        view: &V,
        context: &[V::Inst],
        from_pin: V::Pin,
        to_pin: V::Pin,
    ) -> Result<(), ClientError> {
        let spec = DisableInstTimingSpec {
            inst_context: context.iter().map(|&i| view.inst_name(i)).collect(),
            from_pin_name: view.pin_name(from_pin),
            to_pin_name: view.pin_name(to_pin),
        };
        self.execute_status(&Message::DisableInstTiming(spec)).map(drop)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_global_timing_derate(
        &mut self,
        cell_delay: bool,
        cell_check: bool,
        net_delay: bool,
        data: bool,
        clock: bool,
        early: bool,
        late: bool,
        rise: bool,
        fall: bool,
        value: f32,
    ) -> Result<(), ClientError> {
        let spec = TimingDerateSpec {
            cell_delay,
            cell_check,
            net_delay,
            data,
            clock,
            early,
            late,
            rise,
            fall,
            value,
        };
        self.execute_status(&Message::SetGlobalTimingDerate(spec)).map(drop)
    }

    // =========================================================================
    // PARASITICS AND DELAYS
    // =========================================================================

    pub fn read_spef_file(&mut self, path: &str) -> Result<(), ClientError> {
        self.execute_status(&Message::ReadSpefFile(path.into())).map(drop)
    }

    pub fn read_spef_stream(&mut self, text: &str) -> Result<(), ClientError> {
        self.execute_status(&Message::ReadSpefStream(text.into())).map(drop)
    }

    /// Set lump capacitances (farads) for a group of nets. Cached timing
    /// data becomes stale; the graph maps stay valid.
    pub fn set_nets_lump_cap(
        &mut self,
        view: &V,
        nets: &[NetPath<V>],
        caps: &[f32],
    ) -> Result<(), ClientError> {
        if nets.is_empty() {
            return Ok(());
        }

        let mut cmd = NetLumpCaps::default();
        for (net, &cap) in nets.iter().zip(caps) {
            cmd.net_addrs.push(net.to_context_name(view));
            cmd.values.push(cap);
        }

        self.clear_timing_mapping();
        self.execute_status(&Message::SetGroupNetLumpCap(cmd)).map(drop)
    }

    pub fn read_sdf_file(&mut self, path: &str) -> Result<(), ClientError> {
        self.execute_status(&Message::ReadSdfFile(path.into())).map(drop)
    }

    pub fn read_sdf_stream(&mut self, text: &str) -> Result<(), ClientError> {
        self.execute_status(&Message::ReadSdfStream(text.into())).map(drop)
    }

    pub fn write_sdf_file(&mut self, path: &str) -> Result<(), ClientError> {
        self.execute_status(&Message::WriteSdfFile(path.into())).map(drop)
    }

    /// Override the delay of one arc of the top block context.
    pub fn set_inter_pin_arc_delay(
        &mut self,
        source: V::Pin,
        sink: V::Pin,
        min: bool,
        max: bool,
        value: f32,
    ) -> Result<(), ClientError> {
        let arc = InterPinDelay {
            source,
            sink,
            value,
        };
        self.set_inter_pin_arc_delays(&[arc], min, max)
    }

    /// Translate pin pairs to timing edges and override their delays
    /// (seconds) in one round-trip. Pairs without a matching edge are
    /// skipped; it is an error when none match at all.
    pub fn set_inter_pin_arc_delays(
        &mut self,
        arcs: &[InterPinDelay<V>],
        min: bool,
        max: bool,
    ) -> Result<(), ClientError> {
        if arcs.is_empty() {
            return Ok(());
        }
        if !self.has_graph {
            return Err(ClientError::InvalidArgument(
                "timing graph is not loaded".into(),
            ));
        }

        let mut cmd = ArcsDelay {
            min,
            max,
            ..ArcsDelay::default()
        };
        for arc in arcs {
            // the engine may have dropped some net edges on its own;
            // unmatched pairs are not an error
            let Some(edge_ids) = self.pin_pair_to_edges.get(&(arc.source, arc.sink)) else {
                continue;
            };
            for &edge_id in edge_ids {
                cmd.edge_ids.push(edge_id);
                cmd.delay_values.push(arc.value);
            }
        }

        if cmd.edge_ids.is_empty() {
            return Err(ClientError::InvalidArgument(
                "no timing edges match the given pin pairs".into(),
            ));
        }

        self.clear_timing_mapping();
        self.execute_status(&Message::SetArcsDelay(cmd)).map(drop)
    }

    // =========================================================================
    // GRAPH CORRELATION
    // =========================================================================

    /// Fetch the engine's timing graph and correlate it with the local
    /// design under `top`.
    pub fn load_netlist_graph(&mut self, view: &V, top: V::Block) -> Result<(), ClientError> {
        let resp = match self.transact(&Message::GetGraphData, 0)? {
            Message::GraphMap(resp) => resp,
            other => {
                return Err(ClientError::UnexpectedResponse {
                    expected: MessageTag::GraphMap,
                    got: other.tag(),
                })
            }
        };
        check_status(resp.status, &resp.text)?;

        self.clear_graph_mapping();
        self.add_graph_mapping(view, top, &resp.vertices, &resp.edges)?;
        self.has_graph = true;
        Ok(())
    }

    /// Fetch per-node timing data and recompute criticality factors for
    /// both analysis corners. Requires a loaded graph.
    pub fn load_netlist_slacks(&mut self) -> Result<(), ClientError> {
        if !self.has_graph {
            return Err(ClientError::InvalidArgument(
                "timing graph is not loaded".into(),
            ));
        }

        let resp = match self.transact(&Message::GetGraphSlacksData, 0)? {
            Message::GraphSlacks(resp) => resp,
            other => {
                return Err(ClientError::UnexpectedResponse {
                    expected: MessageTag::GraphSlacks,
                    got: other.tag(),
                })
            }
        };
        check_status(resp.status, &resp.text)?;

        self.clear_timing_mapping();
        self.node_timings = resp.nodes;
        self.min_crit_factors = calc_node_crit_factors(&self.node_timings, true);
        self.max_crit_factors = calc_node_crit_factors(&self.node_timings, false);
        self.has_graph_timing = true;
        debug!(nodes = self.node_timings.len(), "slack data loaded");
        Ok(())
    }

    /// Criticality of the node a pin maps to; `min` picks the analysis
    /// corner, `source_priority` searches the driver-side index first
    /// (relevant for bidirectional pins).
    pub fn pin_criticality(&self, pin: V::Pin, min: bool, source_priority: bool) -> Option<f32> {
        if !self.has_timings() {
            return None;
        }

        let (first, second) = if source_priority {
            (&self.driver_pin_to_vertex, &self.sink_pin_to_vertex)
        } else {
            (&self.sink_pin_to_vertex, &self.driver_pin_to_vertex)
        };
        let node = first.get(&pin).or_else(|| second.get(&pin)).copied()? as usize;

        let factors = if min {
            &self.min_crit_factors
        } else {
            &self.max_crit_factors
        };
        factors.get(node).copied()
    }

    /// Cached timing record of the node a pin maps to, driver side first.
    pub fn pin_timing_data(&self, pin: V::Pin) -> Option<&NodeTimingData> {
        if !self.has_timings() {
            return None;
        }
        let node = self
            .driver_pin_to_vertex
            .get(&pin)
            .or_else(|| self.sink_pin_to_vertex.get(&pin))
            .copied()? as usize;
        self.node_timings.get(node)
    }

    /// Criticality of the sink-side node of the arc `source -> sink`.
    ///
    /// For an intra-cell arc the sink is resolved in the driver-side
    /// index first, then the sink-side one; for a net arc the order is
    /// reversed.
    pub fn arc_crit_factor(
        &self,
        view: &V,
        source: V::Pin,
        sink: V::Pin,
        min: bool,
    ) -> Option<f32> {
        if !self.has_timings() {
            return None;
        }
        self.pin_pair_to_edges.get(&(source, sink))?;

        let intra_cell = view.pin_parent(source) == view.pin_parent(sink);
        let (first, second) = if intra_cell {
            (&self.driver_pin_to_vertex, &self.sink_pin_to_vertex)
        } else {
            (&self.sink_pin_to_vertex, &self.driver_pin_to_vertex)
        };
        let node = first.get(&sink).or_else(|| second.get(&sink)).copied()? as usize;

        if node >= self.min_crit_factors.len() || node >= self.max_crit_factors.len() {
            return None;
        }
        Some(if min {
            self.min_crit_factors[node]
        } else {
            self.max_crit_factors[node]
        })
    }

    // =========================================================================
    // REPORTS
    // =========================================================================

    /// Path report rendered by the engine.
    pub fn report_timing(
        &mut self,
        unique_paths: bool,
        min: bool,
        max: bool,
        unconstrained: bool,
        endpoints_num: u32,
        groups_num: u32,
    ) -> Result<String, ClientError> {
        let spec = ReportSpec {
            unique_paths,
            min,
            max,
            unconstrained,
            endpoints_num,
            groups_num,
        };
        self.execute_status(&Message::ReportTiming(spec))
    }

    pub fn design_stats(&mut self) -> Result<TimingStats, ClientError> {
        let resp = match self.transact(&Message::GetDesignStats, 0)? {
            Message::DesignStats(resp) => resp,
            other => {
                return Err(ClientError::UnexpectedResponse {
                    expected: MessageTag::DesignStats,
                    got: other.tag(),
                })
            }
        };
        check_status(resp.status, &resp.text)?;
        Ok(TimingStats {
            min_wns: resp.min_wslack,
            max_wns: resp.max_wslack,
            min_tns: resp.min_tns,
            max_tns: resp.max_tns,
        })
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// One synchronous command round-trip: send, wait (bounded only when
    /// the command says so), check the response tag, decode.
    fn transact(&mut self, msg: &Message, timeout_ms: u64) -> Result<Message, ClientError> {
        let expected = msg.tag().response_tag();
        self.channel.send(msg)?;

        if timeout_ms == 0 {
            self.channel.wait_message()?;
        } else if !self.channel.wait_message_timeout(timeout_ms)? {
            return Err(ClientError::Timeout);
        }

        let got = self.channel.peek_tag();
        if got != expected {
            // a late response from a timed-out command dies here
            return Err(ClientError::UnexpectedResponse { expected, got });
        }

        Ok(self.channel.pop_message()?)
    }

    fn execute_status(&mut self, msg: &Message) -> Result<String, ClientError> {
        self.execute_status_with_timeout(msg, 0)
    }

    fn execute_status_with_timeout(
        &mut self,
        msg: &Message,
        timeout_ms: u64,
    ) -> Result<String, ClientError> {
        match self.transact(msg, timeout_ms)? {
            Message::ExecutionStatus(resp) => {
                check_status(resp.status, &resp.text)?;
                Ok(resp.text)
            }
            other => Err(ClientError::UnexpectedResponse {
                expected: MessageTag::ExecutionStatus,
                got: other.tag(),
            }),
        }
    }

    fn clear_graph_mapping(&mut self) {
        self.path_to_pin.clear();
        self.driver_pin_to_vertex.clear();
        self.sink_pin_to_vertex.clear();
        self.pin_pair_to_edges.clear();
        self.has_graph = false;
        self.clear_timing_mapping();
    }

    fn clear_timing_mapping(&mut self) {
        self.node_timings.clear();
        self.min_crit_factors.clear();
        self.max_crit_factors.clear();
        self.has_graph_timing = false;
    }

    fn add_graph_mapping(
        &mut self,
        view: &V,
        top: V::Block,
        vertices: &[VertexIdData],
        edges: &[EdgeIdData],
    ) -> Result<(), ClientError> {
        // local pins by hierarchical path, then top ports by bare name
        self.add_block_pins(view, top, "");
        for port in view.block_ports(top) {
            if let Some(pin) = view.port_pin(port) {
                self.path_to_pin.insert(view.port_name(port), pin);
            }
        }

        // vertex position -> local pin; a miss is a hard failure
        let mut vertex_pins: Vec<V::Pin> = Vec::with_capacity(vertices.len());
        for vertex in vertices {
            let mut path = String::new();
            for inst_name in &vertex.context_inst_names {
                path.push_str(inst_name);
                path.push(self.separator);
            }
            path.push_str(&vertex.pin_name);

            let pin = self.path_to_pin.get(&path).copied().ok_or_else(|| {
                ClientError::InvalidArgument(format!("no local pin for vertex path '{path}'"))
            })?;
            vertex_pins.push(pin);
        }

        // engine vertex ids, partitioned by driver flag
        for (vertex, &pin) in vertices.iter().zip(&vertex_pins) {
            if vertex.is_driver {
                self.driver_pin_to_vertex.insert(pin, vertex.vertex_id);
            } else {
                self.sink_pin_to_vertex.insert(pin, vertex.vertex_id);
            }
        }

        for edge in edges {
            let out_of_bounds = |id: u32| {
                ClientError::InvalidArgument(format!(
                    "edge {} references vertex position {id} out of {}",
                    edge.edge_id,
                    vertex_pins.len()
                ))
            };
            let from = *vertex_pins
                .get(edge.from_vertex_id as usize)
                .ok_or_else(|| out_of_bounds(edge.from_vertex_id))?;
            let to = *vertex_pins
                .get(edge.to_vertex_id as usize)
                .ok_or_else(|| out_of_bounds(edge.to_vertex_id))?;
            self.pin_pair_to_edges
                .entry((from, to))
                .or_default()
                .push(edge.edge_id);
        }

        debug!(
            paths = self.path_to_pin.len(),
            vertices = vertices.len(),
            edges = edges.len(),
            "graph correlation tables built"
        );
        Ok(())
    }

    /// Register every pin of every leaf instance under its full
    /// hierarchical path; descend through non-leaf masters.
    fn add_block_pins(&mut self, view: &V, block: V::Block, prefix: &str) {
        for inst in view.block_insts(block) {
            let mut path = String::from(prefix);
            path.push_str(&view.inst_name(inst));
            path.push(self.separator);

            let master = view.inst_master(inst);
            if !view.block_is_leaf(master) {
                self.add_block_pins(view, master, &path);
                continue;
            }

            for pin in view.inst_pins(inst) {
                self.path_to_pin
                    .insert(format!("{path}{}", view.pin_name(pin)), pin);
            }
        }
    }
}

fn pin_net_edit<V: NetlistView>(
    view: &V,
    context: &[V::Inst],
    pin: V::Pin,
    net: V::Net,
) -> Result<PinNetEdit, ClientError> {
    let inst = view.pin_parent(pin).ok_or_else(|| {
        ClientError::InvalidArgument(format!(
            "pin {:?} has no parent instance",
            view.pin_name(pin)
        ))
    })?;
    Ok(PinNetEdit {
        inst_context: context.iter().map(|&i| view.inst_name(i)).collect(),
        inst_name: view.inst_name(inst),
        pin_name: view.pin_name(pin),
        net_name: view.net_name(net),
    })
}

fn path_endpoints<V: NetlistView>(view: &V, sel: &PathSelection<V>) -> PathEndpoints {
    PathEndpoints {
        from_rise: sel.from_rise,
        from_fall: sel.from_fall,
        from_pin_paths: sel.from_pins.iter().map(|p| p.to_context_name(view)).collect(),
        from_clocks: sel.from_clocks.clone(),
        from_inst_paths: sel.from_insts.iter().map(|p| p.to_context_name(view)).collect(),
        through_rise: sel.through_rise,
        through_fall: sel.through_fall,
        through_pin_paths: sel
            .through_pins
            .iter()
            .map(|p| p.to_context_name(view))
            .collect(),
        through_inst_paths: sel
            .through_insts
            .iter()
            .map(|p| p.to_context_name(view))
            .collect(),
        through_net_paths: sel
            .through_nets
            .iter()
            .map(|p| p.to_context_name(view))
            .collect(),
        to_rise: sel.to_rise,
        to_fall: sel.to_fall,
        to_pin_paths: sel.to_pins.iter().map(|p| p.to_context_name(view)).collect(),
        to_clocks: sel.to_clocks.clone(),
        to_inst_paths: sel.to_insts.iter().map(|p| p.to_context_name(view)).collect(),
    }
}

fn check_status(status: ExecStatus, text: &str) -> Result<(), ClientError> {
    match status {
        ExecStatus::Ok => Ok(()),
        ExecStatus::Timeout => Err(ClientError::Timeout),
        ExecStatus::Unsupported => {
            warn!(text, "command is unsupported by the engine");
            Err(ClientError::Unsupported(text.to_string()))
        }
        ExecStatus::Failed => {
            warn!(text, "command execution failed");
            Err(ClientError::RemoteFailure(text.to_string()))
        }
    }
}

// =============================================================================
// CRITICALITY
// =============================================================================

/// Signed slack of one node for the chosen corner: `AAT - RAT` for min
/// (early arrival is slack), `RAT - AAT` for max.
fn node_slack(data: &NodeTimingData, min_corner: bool) -> f32 {
    if min_corner {
        data.min_aat - data.min_rat
    } else {
        data.max_rat - data.max_aat
    }
}

/// Criticality of one node against its endpoint group.
///
/// The group's most negative slack shifts everything to a zero baseline;
/// the divider is the group's largest path RAT (or shifted max slack when
/// that is larger), floored at 1 to avoid dividing by zero.
fn crit_factor(
    data: &NodeTimingData,
    group_min_slack: f32,
    group_max_slack: f32,
    group_max_rat: f32,
    min_corner: bool,
) -> f32 {
    let shift = if group_min_slack >= 0.0 {
        0.0
    } else {
        -group_min_slack
    };

    let mut divider = group_max_rat + shift;
    if group_max_slack + shift > divider {
        divider = group_max_slack + shift;
    }
    if divider == 0.0 {
        divider += 1.0;
    }

    1.0 - (node_slack(data, min_corner) + shift) / divider
}

/// Per-node criticality factors for one corner, grouped by endpoint.
///
/// Nodes without timing or with an endpoint index out of range stay at 0.
fn calc_node_crit_factors(nodes: &[NodeTimingData], min_corner: bool) -> Vec<f32> {
    let mut group_min_slack: Vec<f32> = Vec::new();
    let mut group_max_slack: Vec<f32> = Vec::new();
    let mut group_divider: Vec<f32> = Vec::new();

    for data in nodes {
        if !data.has_timing {
            continue;
        }
        let endpoint = data.endpoint_idx as usize;
        if endpoint >= nodes.len() {
            continue;
        }

        if endpoint >= group_min_slack.len() {
            group_min_slack.resize(endpoint + 1, f32::MAX);
            group_max_slack.resize(endpoint + 1, f32::MIN);
            group_divider.resize(endpoint + 1, f32::MIN);
        }

        let slack = node_slack(data, min_corner);
        if slack > group_max_slack[endpoint] {
            group_max_slack[endpoint] = slack;
        }
        if slack < group_min_slack[endpoint] {
            group_min_slack[endpoint] = slack;
        }
        if min_corner && data.has_end_min_path_rat && data.min_path_rat > group_divider[endpoint] {
            group_divider[endpoint] = data.min_path_rat;
        }
        if !min_corner && data.has_end_max_path_rat && data.max_path_rat > group_divider[endpoint] {
            group_divider[endpoint] = data.max_path_rat;
        }
    }

    let mut factors = vec![0.0; nodes.len()];
    for (idx, data) in nodes.iter().enumerate() {
        if !data.has_timing {
            continue;
        }
        let endpoint = data.endpoint_idx as usize;
        if endpoint >= nodes.len() {
            continue;
        }

        factors[idx] = crit_factor(
            data,
            group_min_slack[endpoint],
            group_max_slack[endpoint],
            group_divider[endpoint],
            min_corner,
        );
    }
    factors
}
