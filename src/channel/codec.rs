//! Binary codec for channel messages.
//!
//! A codec turns one [`Message`] into a contiguous payload and back. The
//! variant tag is not part of the payload; decoding is strictly positional
//! and keyed by the tag the caller read from the frame sidecar. The wire
//! format of [`WireCodec`] (encoder id 41) is fixed-width little-endian
//! integers and IEEE-754 floats with 64-bit length prefixes for strings
//! and sequences, which is exactly bincode's legacy configuration.

use super::message::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Encoder id advertised by [`WireCodec`] during the channel handshake.
pub const WIRE_ENCODER_ID: u32 = 41;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unknown message tag {0}")]
    UnknownTag(u16),

    #[error("message {0:?} cannot be encoded")]
    Unencodable(MessageTag),

    #[error("malformed payload: {0}")]
    Malformed(#[from] bincode::Error),
}

/// A message (de)serializer with a stable wire identity.
///
/// Peers whose codecs advertise different ids are refused at connect
/// time; within one id the payload layout of every variant is frozen.
pub trait MessageCodec {
    fn encoder_id(&self) -> u32;

    fn encode(&self, msg: &Message) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, tag: MessageTag, bytes: &[u8]) -> Result<Message, CodecError>;
}

/// The reference codec, encoder id 41.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec;

fn enc<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::serialize(value)?)
}

fn dec<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(bincode::deserialize(bytes)?)
}

impl MessageCodec for WireCodec {
    fn encoder_id(&self) -> u32 {
        WIRE_ENCODER_ID
    }

    fn encode(&self, msg: &Message) -> Result<Vec<u8>, CodecError> {
        match msg {
            Message::NoMessage => Err(CodecError::Unencodable(MessageTag::NoMessage)),

            // dataless commands still carry their (empty) text slot
            Message::Exit
            | Message::ClearLibs
            | Message::ClearNetlistBlocks
            | Message::GetGraphData
            | Message::GetGraphSlacksData
            | Message::GetDesignStats => enc(&String::new()),

            Message::Ping { timeout_ms } => enc(&(String::new(), *timeout_ms)),

            Message::SetHierSeparator(s)
            | Message::ReadLibFile(s)
            | Message::ReadLibStream(s)
            | Message::ReadVerilogFile(s)
            | Message::ReadVerilogStream(s)
            | Message::LinkTop(s)
            | Message::ReadSpefFile(s)
            | Message::ReadSpefStream(s)
            | Message::ReadSdfFile(s)
            | Message::ReadSdfStream(s)
            | Message::WriteSdfFile(s) => enc(s),

            Message::CreateNetlist(blocks) => enc(blocks),
            Message::ConnectContextPinNet(edit) => enc(edit),
            Message::DisconnectContextPinNet(edit) => enc(edit),
            Message::SetGroupNetLumpCap(caps) => enc(caps),
            Message::SetArcsDelay(arcs) => enc(arcs),

            Message::CreateClock(spec) => enc(spec),
            Message::CreateGeneratedClock(spec) => enc(spec),
            Message::SetClockGroups(spec) => enc(spec),
            Message::SetClockLatency(spec) => enc(spec),
            Message::SetInterClockUncertainty(spec) => enc(spec),
            Message::SetSingleClockUncertainty(spec) => enc(spec),
            Message::SetSinglePinUncertainty(spec) => enc(spec),
            Message::SetSinglePortDelay(spec) => enc(spec),
            Message::SetInPortTransition(spec) => enc(spec),
            Message::SetFalsePath(spec) => enc(spec),
            Message::SetMinMaxDelay(spec) => enc(spec),
            Message::SetMulticyclePath(spec) => enc(spec),
            Message::DisableSinglePinTiming(path) => enc(path),
            Message::DisableInstTiming(spec) => enc(spec),
            Message::SetGlobalTimingDerate(spec) => enc(spec),

            Message::ReportTiming(spec) => enc(spec),

            Message::ExecutionStatus(resp) => enc(resp),
            Message::GraphMap(resp) => enc(resp),
            Message::GraphSlacks(resp) => enc(resp),
            Message::DesignStats(resp) => enc(resp),
        }
    }

    fn decode(&self, tag: MessageTag, bytes: &[u8]) -> Result<Message, CodecError> {
        Ok(match tag {
            MessageTag::NoMessage => {
                return Err(CodecError::UnknownTag(MessageTag::NoMessage as u16))
            }

            MessageTag::Exit => {
                let _: String = dec(bytes)?;
                Message::Exit
            }
            MessageTag::Ping => {
                let (_, timeout_ms): (String, u64) = dec(bytes)?;
                Message::Ping { timeout_ms }
            }
            MessageTag::SetHierSeparator => Message::SetHierSeparator(dec(bytes)?),

            MessageTag::ReadLibFile => Message::ReadLibFile(dec(bytes)?),
            MessageTag::ReadLibStream => Message::ReadLibStream(dec(bytes)?),
            MessageTag::ClearLibs => {
                let _: String = dec(bytes)?;
                Message::ClearLibs
            }

            MessageTag::ReadVerilogFile => Message::ReadVerilogFile(dec(bytes)?),
            MessageTag::ReadVerilogStream => Message::ReadVerilogStream(dec(bytes)?),
            MessageTag::LinkTop => Message::LinkTop(dec(bytes)?),
            MessageTag::ClearNetlistBlocks => {
                let _: String = dec(bytes)?;
                Message::ClearNetlistBlocks
            }

            MessageTag::CreateNetlist => Message::CreateNetlist(dec(bytes)?),
            MessageTag::GetGraphData => {
                let _: String = dec(bytes)?;
                Message::GetGraphData
            }

            MessageTag::ConnectContextPinNet => Message::ConnectContextPinNet(dec(bytes)?),
            MessageTag::DisconnectContextPinNet => Message::DisconnectContextPinNet(dec(bytes)?),

            MessageTag::ReadSpefFile => Message::ReadSpefFile(dec(bytes)?),
            MessageTag::ReadSpefStream => Message::ReadSpefStream(dec(bytes)?),

            MessageTag::SetGroupNetLumpCap => Message::SetGroupNetLumpCap(dec(bytes)?),

            MessageTag::ReadSdfFile => Message::ReadSdfFile(dec(bytes)?),
            MessageTag::ReadSdfStream => Message::ReadSdfStream(dec(bytes)?),
            MessageTag::WriteSdfFile => Message::WriteSdfFile(dec(bytes)?),

            MessageTag::GetGraphSlacksData => {
                let _: String = dec(bytes)?;
                Message::GetGraphSlacksData
            }
            MessageTag::SetArcsDelay => Message::SetArcsDelay(dec(bytes)?),

            MessageTag::CreateClock => Message::CreateClock(dec(bytes)?),
            MessageTag::CreateGeneratedClock => Message::CreateGeneratedClock(dec(bytes)?),
            MessageTag::SetClockGroups => Message::SetClockGroups(dec(bytes)?),
            MessageTag::SetClockLatency => Message::SetClockLatency(dec(bytes)?),
            MessageTag::SetInterClockUncertainty => Message::SetInterClockUncertainty(dec(bytes)?),
            MessageTag::SetSingleClockUncertainty => {
                Message::SetSingleClockUncertainty(dec(bytes)?)
            }
            MessageTag::SetSinglePinUncertainty => Message::SetSinglePinUncertainty(dec(bytes)?),
            MessageTag::SetSinglePortDelay => Message::SetSinglePortDelay(dec(bytes)?),
            MessageTag::SetInPortTransition => Message::SetInPortTransition(dec(bytes)?),
            MessageTag::SetFalsePath => Message::SetFalsePath(dec(bytes)?),
            MessageTag::SetMinMaxDelay => Message::SetMinMaxDelay(dec(bytes)?),
            MessageTag::SetMulticyclePath => Message::SetMulticyclePath(dec(bytes)?),
            MessageTag::DisableSinglePinTiming => Message::DisableSinglePinTiming(dec(bytes)?),
            MessageTag::DisableInstTiming => Message::DisableInstTiming(dec(bytes)?),
            MessageTag::SetGlobalTimingDerate => Message::SetGlobalTimingDerate(dec(bytes)?),

            MessageTag::ReportTiming => Message::ReportTiming(dec(bytes)?),
            MessageTag::GetDesignStats => {
                let _: String = dec(bytes)?;
                Message::GetDesignStats
            }

            MessageTag::ExecutionStatus => Message::ExecutionStatus(dec(bytes)?),
            MessageTag::GraphMap => Message::GraphMap(dec(bytes)?),
            MessageTag::GraphSlacks => Message::GraphSlacks(dec(bytes)?),
            MessageTag::DesignStats => Message::DesignStats(dec(bytes)?),
        })
    }
}
