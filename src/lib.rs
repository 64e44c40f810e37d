//! Inter-process command/response channel for a static timing analysis
//! engine.
//!
//! A client process drives a remote STA engine over a single-slot
//! shared-memory channel: typed commands go out, typed responses come
//! back, strictly one in flight. On top of the transport this crate
//! provides the message catalog and codec, the synchronous client
//! protocol with its netlist flattener and timing-graph correlator, and
//! the server-side dispatch loop the engine plugs an executor into.

pub mod channel;
pub mod client;
pub mod error;
pub mod executor;
pub mod server;

pub use channel::codec::{CodecError, MessageCodec, WireCodec, WIRE_ENCODER_ID};
pub use channel::message::{
    ArcsDelay, BlockData, ClockGroupsSpec, ClockLatencySpec, ClockSpec, ClockUncertainty,
    DesignStatsResponse, DisableInstTimingSpec, EdgeIdData, ExecStatus, ExecStatusResponse,
    FalsePathSpec, GenClockSpec, GraphMapResponse, GraphSlacksResponse, InstanceData,
    InterClockUncertainty, Message, MessageTag, MinMaxDelaySpec, MulticycleSpec, NetLumpCaps,
    NodeTimingData, ObjectContextName, PathEndpoints, PinNetEdit, PinUncertainty, PortData,
    PortDelaySpec, PortTransitionSpec, ReportSpec, TimingDerateSpec, VertexIdData,
    UNCONNECTED_NET,
};
pub use channel::shmem::{ShmemChannel, Side};
pub use channel::{Channel, INITIAL_PAYLOAD_CAPACITY, LOCK_TIMEOUT_MS};
pub use client::{
    flatten_netlist, InstPath, InterPinDelay, NetPath, NetlistView, PathSelection, PinPath,
    StaClient, TimingStats,
};
pub use error::{ChannelError, ClientError};
pub use executor::MessageExecutor;
pub use server::ServerProtocol;
