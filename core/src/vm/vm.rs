mod frame;
mod runtime;

pub use frame::{Block, BlockKind, BlockStack, OperandStack};
pub(crate) use frame::Frame;

/// Default bound on nested guest calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// Tunables for a [`Vm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmOptions {
    /// Frames allowed on the frame stack before a call raises `RecursionError`.
    pub max_call_depth: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl VmOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth.max(1);
        self
    }
}

/// Stack VM: owns the frame stack for one run at a time.
///
/// Separate `Vm`s share nothing, so they can run on separate threads.
pub struct Vm {
    frames: Vec<Frame>,
    options: VmOptions,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_options(VmOptions::default())
    }

    pub fn with_options(options: VmOptions) -> Self {
        Self {
            frames: Vec::new(),
            options,
        }
    }

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    /// Frames currently live; zero between runs.
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
