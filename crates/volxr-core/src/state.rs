//! Pipeline state description and the diffing state cache.
//!
//! A draw call requests a complete [`PipelineState`]. The [`StateCache`] remembers
//! what is currently applied and emits one [`StateCommand`] per field that differs,
//! so consecutive draws with identical state cost nothing.

use serde::{Deserialize, Serialize};

/// Depth comparison function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DepthCompare {
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Winding order that counts as front-facing. Back faces are the ones culled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FrontFace {
    #[default]
    Ccw,
    Cw,
}

/// Blend factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
}

/// Source and destination blend factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlendFunc {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl BlendFunc {
    /// Premultiplied-alpha "over".
    pub const PREMULTIPLIED: Self = Self {
        src: BlendFactor::One,
        dst: BlendFactor::OneMinusSrcAlpha,
    };

    /// Straight-alpha "over".
    pub const ALPHA: Self = Self {
        src: BlendFactor::SrcAlpha,
        dst: BlendFactor::OneMinusSrcAlpha,
    };
}

impl Default for BlendFunc {
    fn default() -> Self {
        Self::PREMULTIPLIED
    }
}

/// Fixed-function state requested by a draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: DepthCompare,
    pub cull_enabled: bool,
    pub front_face: FrontFace,
    pub blend_enabled: bool,
    pub blend: BlendFunc,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            depth_compare: DepthCompare::Less,
            cull_enabled: true,
            front_face: FrontFace::Ccw,
            blend_enabled: true,
            blend: BlendFunc::PREMULTIPLIED,
        }
    }
}

impl PipelineState {
    /// Opaque geometry: default state with blending off.
    #[must_use]
    pub fn opaque() -> Self {
        Self {
            blend_enabled: false,
            ..Self::default()
        }
    }

    /// Fullscreen quads: no depth test, no culling.
    #[must_use]
    pub fn fullscreen() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            cull_enabled: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_depth_compare(mut self, compare: DepthCompare) -> Self {
        self.depth_compare = compare;
        self
    }

    #[must_use]
    pub fn with_culling(mut self, enabled: bool) -> Self {
        self.cull_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_blend(mut self, blend: Option<BlendFunc>) -> Self {
        self.blend_enabled = blend.is_some();
        if let Some(func) = blend {
            self.blend = func;
        }
        self
    }

    /// Commands that turn `self` into `target`, in field order.
    pub fn diff(&self, target: &Self) -> impl Iterator<Item = StateCommand> {
        let candidates = [
            (self.depth_test != target.depth_test)
                .then_some(StateCommand::DepthTest(target.depth_test)),
            (self.depth_write != target.depth_write)
                .then_some(StateCommand::DepthWrite(target.depth_write)),
            (self.depth_compare != target.depth_compare)
                .then_some(StateCommand::DepthCompare(target.depth_compare)),
            (self.cull_enabled != target.cull_enabled)
                .then_some(StateCommand::Cull(target.cull_enabled)),
            (self.front_face != target.front_face)
                .then_some(StateCommand::FrontFace(target.front_face)),
            (self.blend_enabled != target.blend_enabled)
                .then_some(StateCommand::Blend(target.blend_enabled)),
            (self.blend != target.blend).then_some(StateCommand::BlendFunc(target.blend)),
        ];
        candidates.into_iter().flatten()
    }

    /// Applies a single command to this state.
    pub fn apply_command(&mut self, command: StateCommand) {
        match command {
            StateCommand::DepthTest(v) => self.depth_test = v,
            StateCommand::DepthWrite(v) => self.depth_write = v,
            StateCommand::DepthCompare(v) => self.depth_compare = v,
            StateCommand::Cull(v) => self.cull_enabled = v,
            StateCommand::FrontFace(v) => self.front_face = v,
            StateCommand::Blend(v) => self.blend_enabled = v,
            StateCommand::BlendFunc(v) => self.blend = v,
        }
    }
}

/// One state transition. Exactly one variant per [`PipelineState`] field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateCommand {
    DepthTest(bool),
    DepthWrite(bool),
    DepthCompare(DepthCompare),
    Cull(bool),
    FrontFace(FrontFace),
    Blend(bool),
    BlendFunc(BlendFunc),
}

/// Receives state commands from the cache.
pub trait StateSink {
    fn emit(&mut self, command: StateCommand);
}

/// A sink that keeps every command it receives.
#[derive(Debug, Default, Clone)]
pub struct CommandRecorder {
    pub commands: Vec<StateCommand>,
}

impl StateSink for CommandRecorder {
    fn emit(&mut self, command: StateCommand) {
        self.commands.push(command);
    }
}

/// A sink that only counts.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandCounter(pub usize);

impl StateSink for CommandCounter {
    fn emit(&mut self, _command: StateCommand) {
        self.0 += 1;
    }
}

/// Tracks the applied pipeline state and emits only the deltas.
///
/// There is one cache per render graph, not one per target: switching targets does
/// not invalidate it.
#[derive(Debug, Clone)]
pub struct StateCache {
    current: PipelineState,
    // Set until the first apply, or after invalidate: the hardware state is unknown.
    dirty: bool,
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCache {
    /// A cache that assumes the default state is applied.
    pub fn new() -> Self {
        Self {
            current: PipelineState::default(),
            dirty: false,
        }
    }

    /// The state as of the last [`apply`](Self::apply).
    pub fn current(&self) -> &PipelineState {
        &self.current
    }

    /// Forgets what is applied; the next `apply` emits every field.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    /// Brings the applied state to `requested`, returning the number of commands issued.
    pub fn apply(&mut self, requested: &PipelineState, sink: &mut impl StateSink) -> usize {
        let mut issued = 0;
        if self.dirty {
            for command in full_state_commands(requested) {
                sink.emit(command);
                issued += 1;
            }
            self.dirty = false;
        } else {
            for command in self.current.diff(requested) {
                sink.emit(command);
                issued += 1;
            }
        }
        self.current = *requested;
        issued
    }
}

fn full_state_commands(state: &PipelineState) -> [StateCommand; 7] {
    [
        StateCommand::DepthTest(state.depth_test),
        StateCommand::DepthWrite(state.depth_write),
        StateCommand::DepthCompare(state.depth_compare),
        StateCommand::Cull(state.cull_enabled),
        StateCommand::FrontFace(state.front_face),
        StateCommand::Blend(state.blend_enabled),
        StateCommand::BlendFunc(state.blend),
    ]
}
