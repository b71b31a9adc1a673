//! Realtime message protocol.
//!
//! Every frame is a JSON object `{ "type": ..., "payload": ..., "messageId"? }`.
//! Outbound frames are plain serde enums; inbound frames are parsed into a
//! loose envelope first so an unknown or malformed payload can still be
//! acknowledged and logged without tearing down the connection.

use crate::coords::{ChunkKey, WorldPosition};
use crate::patch::PixelDelta;
use crate::tile::Rgb;
use crate::tools::ToolKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown message type: {0}")]
    UnknownType(String),
}

/// A paintable block, as chosen in the block list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    pub block_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, Value>>,
}

impl BlockInfo {
    pub fn new(block_id: impl Into<String>) -> Self {
        Self {
            block_id: block_id.into(),
            properties: None,
        }
    }
}

/// Who placed a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacerInfo {
    pub name: String,
    #[serde(default)]
    pub avatar: String,
}

/// Details of the block at a cell, answered to `get_block_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDetail {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub placer_info: PlacerInfo,
    pub block_id: String,
}

/// A pixel update as it travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePixel {
    pub color_number: u32,
    pub position: WorldPosition,
}

impl From<WirePixel> for PixelDelta {
    fn from(p: WirePixel) -> Self {
        PixelDelta::new(p.position, Rgb::from_u32(p.color_number))
    }
}

impl From<PixelDelta> for WirePixel {
    fn from(d: PixelDelta) -> Self {
        WirePixel {
            color_number: d.color.to_u32(),
            position: d.position,
        }
    }
}

/// Messages sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The chunk keys the client currently shows (`"x:y"`).
    UpdateChunk { chunks: Vec<String> },
    /// Ask who placed the block at a cell.
    GetBlockInfo { position: WorldPosition },
    /// Paint one cell.
    Paint {
        position: WorldPosition,
        block: BlockInfo,
    },
    /// Paint a tool selection.
    PaintByTool {
        pixels: Vec<WorldPosition>,
        block: BlockInfo,
        #[serde(rename = "type")]
        tool: ToolKind,
    },
    /// Acknowledge an inbound frame.
    #[serde(rename = "messageReceiveCheck")]
    MessageReceiveCheck {
        #[serde(rename = "messageId")]
        message_id: Value,
    },
}

impl ClientMessage {
    /// `update_chunk` for a set of visible chunks.
    pub fn update_chunk(keys: &[ChunkKey]) -> Self {
        ClientMessage::UpdateChunk {
            chunks: keys.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// The server wants the visible chunk set again.
    GetChunk,
    /// One pixel changed; applied immediately.
    UpdatePixel(PixelDelta),
    /// A burst of pixel changes; buffered and applied as one batch.
    UpdatePixels(Vec<PixelDelta>),
    /// A user-facing error.
    Error { message: String },
    /// Answer to `get_block_info`; `None` if the cell is empty.
    BlockInfo(Option<BlockDetail>),
    /// The server consumed this many blocks of the local budget.
    RemoveBlocks(u32),
}

/// An inbound frame before its payload is interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "messageId", default)]
    pub message_id: Option<Value>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
}

#[derive(Deserialize)]
struct BlockInfoPayload {
    #[serde(default)]
    block: Option<BlockDetail>,
}

impl InboundFrame {
    /// Parse the envelope of a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The acknowledgement this frame asks for, if it carries an id.
    pub fn ack(&self) -> Option<ClientMessage> {
        self.message_id
            .as_ref()
            .filter(|id| !id.is_null())
            .map(|id| ClientMessage::MessageReceiveCheck {
                message_id: id.clone(),
            })
    }

    /// Interpret the payload.
    pub fn decode(self) -> Result<ServerMessage, ProtocolError> {
        let message = match self.kind.as_str() {
            "get_chunk" => ServerMessage::GetChunk,
            "update_pixel" => {
                let pixel: WirePixel = serde_json::from_value(self.payload)?;
                ServerMessage::UpdatePixel(pixel.into())
            }
            "update_pixels" => {
                let pixels: Vec<WirePixel> = serde_json::from_value(self.payload)?;
                ServerMessage::UpdatePixels(pixels.into_iter().map(Into::into).collect())
            }
            "error" => {
                let ErrorPayload { message } = serde_json::from_value(self.payload)?;
                ServerMessage::Error { message }
            }
            "block_info" => {
                let BlockInfoPayload { block } = serde_json::from_value(self.payload)?;
                ServerMessage::BlockInfo(block)
            }
            "remove_blocks" => {
                let count = self
                    .payload
                    .as_u64()
                    .filter(|n| *n > 0)
                    .map_or(1, |n| u32::try_from(n).unwrap_or(u32::MAX));
                ServerMessage::RemoveBlocks(count)
            }
            _ => return Err(ProtocolError::UnknownType(self.kind)),
        };
        Ok(message)
    }
}
