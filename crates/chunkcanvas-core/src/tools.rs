//! Paint tools and gesture recording.

use crate::raster::{SelectionPath, rasterize};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Available paint tools.
///
/// The serialized names are the ones the realtime server expects in
/// `paint_by_tool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Single-cell selection, no gesture.
    #[default]
    None,
    Pen,
    Line,
    Rectangle,
    FilledRectangle,
    Circle,
    FilledCircle,
    /// Reserved for flood fill; selects nothing yet.
    Bucket,
}

impl ToolKind {
    pub const ALL: [ToolKind; 8] = [
        ToolKind::None,
        ToolKind::Pen,
        ToolKind::Line,
        ToolKind::Rectangle,
        ToolKind::FilledRectangle,
        ToolKind::Circle,
        ToolKind::FilledCircle,
        ToolKind::Bucket,
    ];

    /// Wire name of the tool.
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::None => "none",
            ToolKind::Pen => "pen",
            ToolKind::Line => "line",
            ToolKind::Rectangle => "rectangle",
            ToolKind::FilledRectangle => "filled_rectangle",
            ToolKind::Circle => "circle",
            ToolKind::FilledCircle => "filled_circle",
            ToolKind::Bucket => "bucket",
        }
    }

    /// Look a tool up by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Whether the overlay draws this tool as one box instead of per-cell quads.
    pub fn draws_box(self) -> bool {
        matches!(self, ToolKind::Rectangle | ToolKind::FilledRectangle)
    }

    /// Whether this tool records a gesture.
    pub fn records_gesture(self) -> bool {
        self != ToolKind::None
    }
}

/// State of a gesture interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum GestureState {
    #[default]
    Idle,
    /// Samples recorded so far, in world coordinates.
    Recording { samples: Vec<Point> },
}

/// Manages the current tool and the gesture being recorded.
#[derive(Debug, Clone, Default)]
pub struct ToolManager {
    /// Currently selected tool.
    pub current_tool: ToolKind,
    /// Current gesture state.
    pub state: GestureState,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current tool, dropping any gesture in progress.
    pub fn set_tool(&mut self, tool: ToolKind) {
        self.current_tool = tool;
        self.state = GestureState::Idle;
    }

    /// Start recording a gesture. A no-op for tools that select by click.
    pub fn begin_gesture(&mut self) {
        if self.current_tool.records_gesture() && !self.is_recording() {
            self.state = GestureState::Recording { samples: Vec::new() };
        }
    }

    /// Append a world-space sample to the gesture in progress.
    pub fn record(&mut self, world: Point) {
        if let GestureState::Recording { samples } = &mut self.state {
            if samples.last() != Some(&world) {
                samples.push(world);
            }
        }
    }

    /// Finish the gesture and rasterize it with the current tool.
    ///
    /// Returns `None` if no gesture was being recorded.
    pub fn end_gesture(&mut self) -> Option<SelectionPath> {
        match std::mem::take(&mut self.state) {
            GestureState::Recording { samples } => Some(rasterize(&samples, self.current_tool)),
            GestureState::Idle => None,
        }
    }

    /// Abandon the gesture in progress.
    pub fn cancel(&mut self) {
        self.state = GestureState::Idle;
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, GestureState::Recording { .. })
    }

    /// Samples of the gesture in progress.
    pub fn samples(&self) -> &[Point] {
        match &self.state {
            GestureState::Recording { samples } => samples,
            GestureState::Idle => &[],
        }
    }
}
