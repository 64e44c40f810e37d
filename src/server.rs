//! Server-side dispatch loop.

use crate::channel::codec::CodecError;
use crate::channel::message::*;
use crate::channel::Channel;
use crate::error::ChannelError;
use crate::executor::MessageExecutor;
use tracing::{debug, warn};

/// Single-threaded request loop over one channel and one executor.
///
/// Each cycle waits for a command frame, decodes it, hands it to the
/// executor and answers with either `ExecutionStatus` or the command's
/// bulk response. Unknown tags are answered with `Unsupported`; decode
/// failures with `Failed`. The loop ends after serving `Exit`, or with
/// an error when the channel itself dies.
pub struct ServerProtocol<C: Channel, E: MessageExecutor> {
    channel: C,
    executor: E,
}

impl<C: Channel, E: MessageExecutor> ServerProtocol<C, E> {
    pub fn new(channel: C, executor: E) -> Self {
        Self { channel, executor }
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Serve commands until `Exit` arrives.
    pub fn run_cycle(&mut self) -> Result<(), ChannelError> {
        loop {
            self.channel.wait_message()?;
            let tag = self.channel.peek_tag();

            let msg = match self.channel.pop_message() {
                Ok(msg) => msg,
                Err(ChannelError::Decode(err)) => {
                    warn!(?tag, %err, "dropping undecodable command");
                    let (status, text) = match &err {
                        CodecError::UnknownTag(_) => {
                            (ExecStatus::Unsupported, "unsupported command".to_string())
                        }
                        _ => (ExecStatus::Failed, format!("malformed command: {err}")),
                    };
                    self.send_status(status, text)?;
                    continue;
                }
                Err(err) => return Err(err),
            };

            debug!(?tag, "serving command");
            let exiting = matches!(msg, Message::Exit);
            self.dispatch(msg)?;
            if exiting {
                debug!("exit command served, leaving server loop");
                return Ok(());
            }
        }
    }

    fn dispatch(&mut self, msg: Message) -> Result<(), ChannelError> {
        let ok = match &msg {
            Message::Exit => self.executor.exit(),
            Message::Ping { timeout_ms } => self.executor.ping(*timeout_ms),
            Message::SetHierSeparator(sep) => self.executor.set_hier_separator(sep),

            Message::ReadLibFile(path) => self.executor.read_lib_file(path),
            Message::ReadLibStream(text) => self.executor.read_lib_stream(text),
            Message::ClearLibs => self.executor.clear_libs(),

            Message::ReadVerilogFile(path) => self.executor.read_verilog_file(path),
            Message::ReadVerilogStream(text) => self.executor.read_verilog_stream(text),
            Message::LinkTop(top) => self.executor.link_top(top),
            Message::ClearNetlistBlocks => self.executor.clear_netlist_blocks(),

            Message::CreateNetlist(blocks) => self.executor.create_netlist(blocks),

            Message::ConnectContextPinNet(edit) => self.executor.connect_context_pin_net(edit),
            Message::DisconnectContextPinNet(edit) => {
                self.executor.disconnect_context_pin_net(edit)
            }

            Message::ReadSpefFile(path) => self.executor.read_spef_file(path),
            Message::ReadSpefStream(text) => self.executor.read_spef_stream(text),
            Message::SetGroupNetLumpCap(caps) => self.executor.set_group_net_lump_cap(caps),

            Message::ReadSdfFile(path) => self.executor.read_sdf_file(path),
            Message::ReadSdfStream(text) => self.executor.read_sdf_stream(text),
            Message::WriteSdfFile(path) => self.executor.write_sdf_file(path),

            Message::SetArcsDelay(arcs) => self.executor.set_arcs_delay(arcs),

            Message::CreateClock(spec) => self.executor.create_clock(spec),
            Message::CreateGeneratedClock(spec) => self.executor.create_generated_clock(spec),
            Message::SetClockGroups(spec) => self.executor.set_clock_groups(spec),
            Message::SetClockLatency(spec) => self.executor.set_clock_latency(spec),
            Message::SetInterClockUncertainty(spec) => {
                self.executor.set_inter_clock_uncertainty(spec)
            }
            Message::SetSingleClockUncertainty(spec) => {
                self.executor.set_single_clock_uncertainty(spec)
            }
            Message::SetSinglePinUncertainty(spec) => {
                self.executor.set_single_pin_uncertainty(spec)
            }
            Message::SetSinglePortDelay(spec) => self.executor.set_single_port_delay(spec),
            Message::SetInPortTransition(spec) => self.executor.set_in_port_transition(spec),
            Message::SetFalsePath(spec) => self.executor.set_false_path(spec),
            Message::SetMinMaxDelay(spec) => self.executor.set_min_max_delay(spec),
            Message::SetMulticyclePath(spec) => self.executor.set_multicycle_path(spec),
            Message::DisableSinglePinTiming(path) => {
                self.executor.disable_single_pin_timing(path)
            }
            Message::DisableInstTiming(spec) => self.executor.disable_inst_timing(spec),
            Message::SetGlobalTimingDerate(spec) => self.executor.set_global_timing_derate(spec),

            Message::GetGraphData => return self.serve_graph_data(),
            Message::GetGraphSlacksData => return self.serve_graph_slacks(),
            Message::ReportTiming(spec) => return self.serve_report(spec),
            Message::GetDesignStats => return self.serve_design_stats(),

            // a response variant arriving as a command is a peer bug
            Message::NoMessage
            | Message::ExecutionStatus(_)
            | Message::GraphMap(_)
            | Message::GraphSlacks(_)
            | Message::DesignStats(_) => {
                warn!(tag = ?msg.tag(), "response variant received as command");
                return self.send_status(ExecStatus::Unsupported, "unsupported command".into());
            }
        };

        if ok {
            self.send_status(ExecStatus::Ok, String::new())
        } else {
            let diag = self.executor.exec_message();
            warn!(tag = ?msg.tag(), diag = %diag, "command failed");
            self.send_status(ExecStatus::Failed, diag)
        }
    }

    fn send_status(&mut self, status: ExecStatus, text: String) -> Result<(), ChannelError> {
        self.channel
            .send(&Message::ExecutionStatus(ExecStatusResponse {
                status,
                text,
            }))
    }

    fn serve_graph_data(&mut self) -> Result<(), ChannelError> {
        let mut resp = GraphMapResponse::default();
        let ok = self
            .executor
            .get_graph_data(&mut resp.vertices, &mut resp.edges);
        resp.status = if ok { ExecStatus::Ok } else { ExecStatus::Failed };
        if !ok {
            resp.text = self.executor.exec_message();
        }
        self.channel.send(&Message::GraphMap(resp))
    }

    fn serve_graph_slacks(&mut self) -> Result<(), ChannelError> {
        let mut resp = GraphSlacksResponse::default();
        let ok = self.executor.get_graph_slacks(&mut resp.nodes);
        resp.status = if ok { ExecStatus::Ok } else { ExecStatus::Failed };
        if !ok {
            resp.text = self.executor.exec_message();
        }
        self.channel.send(&Message::GraphSlacks(resp))
    }

    fn serve_report(&mut self, spec: &ReportSpec) -> Result<(), ChannelError> {
        let mut report = String::new();
        let ok = self.executor.report_timing(spec, &mut report);
        let resp = if ok {
            ExecStatusResponse {
                status: ExecStatus::Ok,
                text: report,
            }
        } else {
            ExecStatusResponse {
                status: ExecStatus::Failed,
                text: self.executor.exec_message(),
            }
        };
        self.channel.send(&Message::ExecutionStatus(resp))
    }

    fn serve_design_stats(&mut self) -> Result<(), ChannelError> {
        let mut resp = DesignStatsResponse::default();
        let (mut min_wns, mut max_wns, mut min_tns, mut max_tns) = (0.0, 0.0, 0.0, 0.0);
        let ok = self
            .executor
            .get_design_stats(&mut min_wns, &mut max_wns, &mut min_tns, &mut max_tns);
        resp.min_wslack = min_wns;
        resp.max_wslack = max_wns;
        resp.min_tns = min_tns;
        resp.max_tns = max_tns;
        resp.status = if ok { ExecStatus::Ok } else { ExecStatus::Failed };
        if !ok {
            resp.text = self.executor.exec_message();
        }
        self.channel.send(&Message::DesignStats(resp))
    }
}
