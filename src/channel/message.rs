//! Command and response catalog of the engine channel.
//!
//! Every exchange on the wire is one of the [`Message`] variants below,
//! identified by a stable 16-bit [`MessageTag`]. The tag never travels
//! inside the payload; it rides in the frame's sidecar slot (see
//! [`crate::channel::shmem`]), so each payload encodes only the variant's
//! fields in the order frozen by encoder id 41.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Sentinel for an unconnected bit of a bus port.
pub const UNCONNECTED_NET: u32 = u32::MAX;

// =============================================================================
// TAGS AND STATUSES
// =============================================================================

/// Wire identifier of a message variant. Discriminants are frozen;
/// new variants may only be appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageTag {
    NoMessage = 0,

    Exit = 1,
    Ping = 2,
    SetHierSeparator = 3,

    ReadLibFile = 4,
    ReadLibStream = 5,
    ClearLibs = 6,

    ReadVerilogFile = 7,
    ReadVerilogStream = 8,
    LinkTop = 9,
    ClearNetlistBlocks = 10,

    CreateNetlist = 11,
    GetGraphData = 12,

    ConnectContextPinNet = 13,
    DisconnectContextPinNet = 14,

    ReadSpefFile = 15,
    ReadSpefStream = 16,

    SetGroupNetLumpCap = 17,

    ReadSdfFile = 18,
    ReadSdfStream = 19,
    WriteSdfFile = 20,

    GetGraphSlacksData = 21,
    SetArcsDelay = 22,

    CreateClock = 23,
    CreateGeneratedClock = 24,
    SetClockGroups = 25,
    SetClockLatency = 26,
    SetInterClockUncertainty = 27,
    SetSingleClockUncertainty = 28,
    SetSinglePinUncertainty = 29,
    SetSinglePortDelay = 30,
    SetInPortTransition = 31,
    SetFalsePath = 32,
    SetMinMaxDelay = 33,
    SetMulticyclePath = 34,
    DisableSinglePinTiming = 35,
    DisableInstTiming = 36,
    SetGlobalTimingDerate = 37,

    ReportTiming = 38,
    GetDesignStats = 39,

    ExecutionStatus = 40,
    GraphMap = 41,
    GraphSlacks = 42,
    DesignStats = 43,
}

impl MessageTag {
    pub fn from_u16(raw: u16) -> Option<Self> {
        use MessageTag::*;
        Some(match raw {
            0 => NoMessage,
            1 => Exit,
            2 => Ping,
            3 => SetHierSeparator,
            4 => ReadLibFile,
            5 => ReadLibStream,
            6 => ClearLibs,
            7 => ReadVerilogFile,
            8 => ReadVerilogStream,
            9 => LinkTop,
            10 => ClearNetlistBlocks,
            11 => CreateNetlist,
            12 => GetGraphData,
            13 => ConnectContextPinNet,
            14 => DisconnectContextPinNet,
            15 => ReadSpefFile,
            16 => ReadSpefStream,
            17 => SetGroupNetLumpCap,
            18 => ReadSdfFile,
            19 => ReadSdfStream,
            20 => WriteSdfFile,
            21 => GetGraphSlacksData,
            22 => SetArcsDelay,
            23 => CreateClock,
            24 => CreateGeneratedClock,
            25 => SetClockGroups,
            26 => SetClockLatency,
            27 => SetInterClockUncertainty,
            28 => SetSingleClockUncertainty,
            29 => SetSinglePinUncertainty,
            30 => SetSinglePortDelay,
            31 => SetInPortTransition,
            32 => SetFalsePath,
            33 => SetMinMaxDelay,
            34 => SetMulticyclePath,
            35 => DisableSinglePinTiming,
            36 => DisableInstTiming,
            37 => SetGlobalTimingDerate,
            38 => ReportTiming,
            39 => GetDesignStats,
            40 => ExecutionStatus,
            41 => GraphMap,
            42 => GraphSlacks,
            43 => DesignStats,
            _ => return None,
        })
    }

    /// The response tag a command of this tag must be answered with.
    ///
    /// Commands without a dedicated bulk response are answered with
    /// [`MessageTag::ExecutionStatus`].
    pub fn response_tag(self) -> MessageTag {
        match self {
            MessageTag::GetGraphData => MessageTag::GraphMap,
            MessageTag::GetGraphSlacksData => MessageTag::GraphSlacks,
            MessageTag::GetDesignStats => MessageTag::DesignStats,
            _ => MessageTag::ExecutionStatus,
        }
    }
}

/// Outcome of a command execution, embedded in every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum ExecStatus {
    Timeout = 0,
    #[default]
    Ok = 1,
    Failed = 2,
    Unsupported = 3,
}

impl ExecStatus {
    pub fn from_u16(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => ExecStatus::Timeout,
            1 => ExecStatus::Ok,
            2 => ExecStatus::Failed,
            3 => ExecStatus::Unsupported,
            _ => return None,
        })
    }
}

// 16-bit on the wire, like the tag.
impl Serialize for ExecStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(*self as u16)
    }
}

impl<'de> Deserialize<'de> for ExecStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u16::deserialize(deserializer)?;
        ExecStatus::from_u16(raw)
            .ok_or_else(|| de::Error::custom(format!("invalid execution status {raw}")))
    }
}

// =============================================================================
// NETLIST RECORDS
// =============================================================================

/// One port of a block, or one pin of an instance.
///
/// Bus ports carry one connection index per bit in `[range_from, range_to]`
/// order; scalar ports carry zero (unconnected) or one entry. An entry is
/// either an index into the enclosing block's `net_names` or
/// [`UNCONNECTED_NET`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortData {
    pub name: String,
    pub input: bool,
    pub output: bool,
    pub bus_flag: bool,
    pub range_from: u32,
    pub range_to: u32,
    pub conn_net_indices: Vec<u32>,
}

/// One child instance of a block. `master_block_idx` indexes the
/// enclosing `CreateNetlist` block sequence; masters always precede
/// the instances that reference them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceData {
    pub name: String,
    pub master_block_idx: u32,
    pub ports: Vec<PortData>,
}

/// One flattened block. Leaf blocks carry no instances.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockData {
    pub name: String,
    pub top_flag: bool,
    pub leaf_flag: bool,
    pub ports: Vec<PortData>,
    pub insts: Vec<InstanceData>,
    pub net_names: Vec<String>,
    pub gnd_net_name: String,
    pub vdd_net_name: String,
}

/// An object addressed by its top-down instance context plus its own name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectContextName {
    pub inst_context: Vec<String>,
    pub obj_name: String,
}

/// Payload of the pin/net connect and disconnect edits.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PinNetEdit {
    pub inst_context: Vec<String>,
    pub inst_name: String,
    pub pin_name: String,
    pub net_name: String,
}

/// Lump capacitances for a group of nets; `values[i]` belongs to
/// `net_addrs[i]` and is in farads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetLumpCaps {
    pub net_addrs: Vec<ObjectContextName>,
    pub values: Vec<f32>,
}

/// Delay overrides for a set of timing-graph edges; seconds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArcsDelay {
    pub delay_values: Vec<f32>,
    pub edge_ids: Vec<u32>,
    pub min: bool,
    pub max: bool,
}

/// Parameters of a timing report request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportSpec {
    pub unique_paths: bool,
    pub min: bool,
    pub max: bool,
    pub unconstrained: bool,
    pub endpoints_num: u32,
    pub groups_num: u32,
}

// =============================================================================
// CONSTRAINT PAYLOADS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClockSpec {
    pub name: String,
    pub description: String,
    pub pin_paths: Vec<ObjectContextName>,
    pub add_flag: bool,
    pub period: f32,
    pub waveform: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenClockSpec {
    pub name: String,
    pub description: String,
    pub master_clock_pin_path: ObjectContextName,
    pub master_clock_name: String,
    pub pin_paths: Vec<ObjectContextName>,
    pub add_flag: bool,
    pub divide_factor: i32,
    pub multiply_factor: i32,
    pub duty_cycle: f32,
    pub invert: bool,
    pub edges: Vec<i32>,
    pub edge_shifts: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClockGroupsSpec {
    pub name: String,
    pub description: String,
    pub logical_exclusive: bool,
    pub physical_exclusive: bool,
    pub asynchronous: bool,
    pub allow_paths: bool,
    pub clock_groups: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClockLatencySpec {
    pub source: bool,
    pub min: bool,
    pub max: bool,
    pub early: bool,
    pub late: bool,
    pub rise: bool,
    pub fall: bool,
    pub value: f32,
    pub clock_name: String,
    pub pin_path: ObjectContextName,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InterClockUncertainty {
    pub from_clock_name: String,
    pub from_rise: bool,
    pub from_fall: bool,
    pub to_clock_name: String,
    pub to_rise: bool,
    pub to_fall: bool,
    pub setup: bool,
    pub hold: bool,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClockUncertainty {
    pub clock_name: String,
    pub setup: bool,
    pub hold: bool,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PinUncertainty {
    pub pin_path: ObjectContextName,
    pub setup: bool,
    pub hold: bool,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortDelaySpec {
    pub is_input: bool,
    pub clock_name: String,
    pub clock_pin_path: ObjectContextName,
    pub clock_fall: bool,
    pub level_sensitive: bool,
    pub delay_rise: bool,
    pub delay_fall: bool,
    pub delay_max: bool,
    pub delay_min: bool,
    pub add: bool,
    pub network_latency_inc: bool,
    pub source_latency_inc: bool,
    pub delay: f32,
    pub target_port_pin: ObjectContextName,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortTransitionSpec {
    pub delay_rise: bool,
    pub delay_fall: bool,
    pub delay_max: bool,
    pub delay_min: bool,
    pub value: f32,
    pub target_port_pin: ObjectContextName,
}

/// The from/through/to selection shared by the path exception constraints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PathEndpoints {
    pub from_rise: bool,
    pub from_fall: bool,
    pub from_pin_paths: Vec<ObjectContextName>,
    pub from_clocks: Vec<String>,
    pub from_inst_paths: Vec<ObjectContextName>,
    pub through_rise: bool,
    pub through_fall: bool,
    pub through_pin_paths: Vec<ObjectContextName>,
    pub through_inst_paths: Vec<ObjectContextName>,
    pub through_net_paths: Vec<ObjectContextName>,
    pub to_rise: bool,
    pub to_fall: bool,
    pub to_pin_paths: Vec<ObjectContextName>,
    pub to_clocks: Vec<String>,
    pub to_inst_paths: Vec<ObjectContextName>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FalsePathSpec {
    pub path: PathEndpoints,
    pub setup: bool,
    pub hold: bool,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MinMaxDelaySpec {
    pub path: PathEndpoints,
    pub min_delay_flag: bool,
    pub value: f32,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MulticycleSpec {
    pub path: PathEndpoints,
    pub setup: bool,
    pub hold: bool,
    pub start: bool,
    pub end: bool,
    pub value: i32,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DisableInstTimingSpec {
    pub inst_context: Vec<String>,
    pub from_pin_name: String,
    pub to_pin_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimingDerateSpec {
    pub cell_delay: bool,
    pub cell_check: bool,
    pub net_delay: bool,
    pub data: bool,
    pub clock: bool,
    pub early: bool,
    pub late: bool,
    pub rise: bool,
    pub fall: bool,
    pub value: f32,
}

// =============================================================================
// RESPONSE PAYLOADS
// =============================================================================

/// Generic response: status plus a diagnostic (or, for `ReportTiming`,
/// the report text itself).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecStatusResponse {
    pub status: ExecStatus,
    pub text: String,
}

/// One timing-graph vertex, addressed by hierarchical pin path.
///
/// Records are positional: vertex `i` of the response is referenced by
/// edges through position `i`, while `vertex_id` is the engine's own id.
/// A record whose `vertex_id` differs from its position denotes an
/// absent vertex.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VertexIdData {
    pub context_inst_names: Vec<String>,
    pub is_driver: bool,
    pub pin_name: String,
    pub vertex_id: u32,
}

/// One timing-graph edge between two vertex positions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EdgeIdData {
    pub edge_id: u32,
    pub from_vertex_id: u32,
    pub to_vertex_id: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphMapResponse {
    pub status: ExecStatus,
    pub text: String,
    pub vertices: Vec<VertexIdData>,
    pub edges: Vec<EdgeIdData>,
}

/// Arrival/required times and endpoint linkage of one graph node.
///
/// `endpoint_idx` points at the `NodeTimingData` record of the path
/// endpoint this node belongs to; any value `>= nodes.len()` means the
/// node is unconstrained. `clk_idx` and `non_data` describe the launching
/// clock and clock-network membership; the criticality computation
/// ignores both.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeTimingData {
    pub clk_idx: u32,
    pub endpoint_idx: u32,
    pub has_end_max_path_rat: bool,
    pub has_end_min_path_rat: bool,
    pub has_timing: bool,
    pub non_data: bool,
    pub is_endpoint: bool,
    pub max_path_rat: f32,
    pub min_path_rat: f32,
    pub node_id: u32,
    pub max_aat: f32,
    pub max_rat: f32,
    pub min_aat: f32,
    pub min_rat: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphSlacksResponse {
    pub status: ExecStatus,
    pub text: String,
    pub nodes: Vec<NodeTimingData>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DesignStatsResponse {
    pub status: ExecStatus,
    pub text: String,
    pub max_tns: f32,
    pub max_wslack: f32,
    pub min_tns: f32,
    pub min_wslack: f32,
}

// =============================================================================
// THE MESSAGE SET
// =============================================================================

/// The closed set of messages the channel carries.
///
/// Commands flow client to server; the four response variants flow back.
/// String-only ingestion commands carry either a file path (`*File`) or
/// the full text of the data (`*Stream`).
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    NoMessage,

    Exit,
    Ping { timeout_ms: u64 },
    SetHierSeparator(String),

    ReadLibFile(String),
    ReadLibStream(String),
    ClearLibs,

    ReadVerilogFile(String),
    ReadVerilogStream(String),
    LinkTop(String),
    ClearNetlistBlocks,

    CreateNetlist(Vec<BlockData>),
    GetGraphData,

    ConnectContextPinNet(PinNetEdit),
    DisconnectContextPinNet(PinNetEdit),

    ReadSpefFile(String),
    ReadSpefStream(String),

    SetGroupNetLumpCap(NetLumpCaps),

    ReadSdfFile(String),
    ReadSdfStream(String),
    WriteSdfFile(String),

    GetGraphSlacksData,
    SetArcsDelay(ArcsDelay),

    CreateClock(ClockSpec),
    CreateGeneratedClock(GenClockSpec),
    SetClockGroups(ClockGroupsSpec),
    SetClockLatency(ClockLatencySpec),
    SetInterClockUncertainty(InterClockUncertainty),
    SetSingleClockUncertainty(ClockUncertainty),
    SetSinglePinUncertainty(PinUncertainty),
    SetSinglePortDelay(PortDelaySpec),
    SetInPortTransition(PortTransitionSpec),
    SetFalsePath(FalsePathSpec),
    SetMinMaxDelay(MinMaxDelaySpec),
    SetMulticyclePath(MulticycleSpec),
    DisableSinglePinTiming(ObjectContextName),
    DisableInstTiming(DisableInstTimingSpec),
    SetGlobalTimingDerate(TimingDerateSpec),

    ReportTiming(ReportSpec),
    GetDesignStats,

    ExecutionStatus(ExecStatusResponse),
    GraphMap(GraphMapResponse),
    GraphSlacks(GraphSlacksResponse),
    DesignStats(DesignStatsResponse),
}

impl Message {
    pub fn tag(&self) -> MessageTag {
        match self {
            Message::NoMessage => MessageTag::NoMessage,
            Message::Exit => MessageTag::Exit,
            Message::Ping { .. } => MessageTag::Ping,
            Message::SetHierSeparator(_) => MessageTag::SetHierSeparator,
            Message::ReadLibFile(_) => MessageTag::ReadLibFile,
            Message::ReadLibStream(_) => MessageTag::ReadLibStream,
            Message::ClearLibs => MessageTag::ClearLibs,
            Message::ReadVerilogFile(_) => MessageTag::ReadVerilogFile,
            Message::ReadVerilogStream(_) => MessageTag::ReadVerilogStream,
            Message::LinkTop(_) => MessageTag::LinkTop,
            Message::ClearNetlistBlocks => MessageTag::ClearNetlistBlocks,
            Message::CreateNetlist(_) => MessageTag::CreateNetlist,
            Message::GetGraphData => MessageTag::GetGraphData,
            Message::ConnectContextPinNet(_) => MessageTag::ConnectContextPinNet,
            Message::DisconnectContextPinNet(_) => MessageTag::DisconnectContextPinNet,
            Message::ReadSpefFile(_) => MessageTag::ReadSpefFile,
            Message::ReadSpefStream(_) => MessageTag::ReadSpefStream,
            Message::SetGroupNetLumpCap(_) => MessageTag::SetGroupNetLumpCap,
            Message::ReadSdfFile(_) => MessageTag::ReadSdfFile,
            Message::ReadSdfStream(_) => MessageTag::ReadSdfStream,
            Message::WriteSdfFile(_) => MessageTag::WriteSdfFile,
            Message::GetGraphSlacksData => MessageTag::GetGraphSlacksData,
            Message::SetArcsDelay(_) => MessageTag::SetArcsDelay,
            Message::CreateClock(_) => MessageTag::CreateClock,
            Message::CreateGeneratedClock(_) => MessageTag::CreateGeneratedClock,
            Message::SetClockGroups(_) => MessageTag::SetClockGroups,
            Message::SetClockLatency(_) => MessageTag::SetClockLatency,
            Message::SetInterClockUncertainty(_) => MessageTag::SetInterClockUncertainty,
            Message::SetSingleClockUncertainty(_) => MessageTag::SetSingleClockUncertainty,
            Message::SetSinglePinUncertainty(_) => MessageTag::SetSinglePinUncertainty,
            Message::SetSinglePortDelay(_) => MessageTag::SetSinglePortDelay,
            Message::SetInPortTransition(_) => MessageTag::SetInPortTransition,
            Message::SetFalsePath(_) => MessageTag::SetFalsePath,
            Message::SetMinMaxDelay(_) => MessageTag::SetMinMaxDelay,
            Message::SetMulticyclePath(_) => MessageTag::SetMulticyclePath,
            Message::DisableSinglePinTiming(_) => MessageTag::DisableSinglePinTiming,
            Message::DisableInstTiming(_) => MessageTag::DisableInstTiming,
            Message::SetGlobalTimingDerate(_) => MessageTag::SetGlobalTimingDerate,
            Message::ReportTiming(_) => MessageTag::ReportTiming,
            Message::GetDesignStats => MessageTag::GetDesignStats,
            Message::ExecutionStatus(_) => MessageTag::ExecutionStatus,
            Message::GraphMap(_) => MessageTag::GraphMap,
            Message::GraphSlacks(_) => MessageTag::GraphSlacks,
            Message::DesignStats(_) => MessageTag::DesignStats,
        }
    }
}
