// Capture session lifecycle state machine
//
// Owns the hardware source for exactly one recording attempt. The state
// machine is strictly forward: Idle -> Configuring -> Running -> Stopping ->
// Stopped, with no path back - a new controller is created for each
// recording.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::formats::{select_best_format, FormatPolicy, SampleDepth, SelectedConfiguration};

use super::{CaptureError, CaptureSource, Result, SampleStreams};

/// Capture session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configuring,
    Running,
    Stopping,
    Stopped,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Configuring => "configuring",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        }
    }
}

/// Drives one capture session from configuration through teardown
pub struct SessionController {
    source: Box<dyn CaptureSource>,
    state: SessionState,
    selected: Option<SelectedConfiguration>,
    /// Shared with the delivery consumers: cleared before the source is told
    /// to halt, so samples arriving after teardown begins are dropped.
    accepting: Arc<AtomicBool>,
    used_fallback_depth: bool,
}

impl SessionController {
    pub fn new(source: Box<dyn CaptureSource>) -> Self {
        Self {
            source,
            state: SessionState::Idle,
            selected: None,
            accepting: Arc::new(AtomicBool::new(false)),
            used_fallback_depth: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn selected(&self) -> Option<&SelectedConfiguration> {
        self.selected.as_ref()
    }

    /// Whether depth negotiation settled on something narrower than the
    /// widest preference
    pub fn used_fallback_depth(&self) -> bool {
        self.used_fallback_depth
    }

    /// Flag the delivery consumers poll before handing a sample to the writer
    pub fn accepting_flag(&self) -> Arc<AtomicBool> {
        self.accepting.clone()
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(CaptureError::InvalidState {
                expected: expected.name(),
                actual: self.state.name(),
            });
        }
        Ok(())
    }

    /// Idle -> Configuring: select the format and negotiate the output
    /// sample depth against the device.
    pub fn configure(&mut self, policy: &FormatPolicy) -> Result<SelectedConfiguration> {
        self.expect_state(SessionState::Idle)?;

        let formats = self.source.formats();
        let mut selected =
            select_best_format(&formats, policy).ok_or(CaptureError::NoUsableFormat)?;

        let (depth, fell_back) = negotiate_depth(selected.sample_depth, &self.source.supported_depths())?;
        selected.sample_depth = depth;
        self.used_fallback_depth = fell_back;

        log::info!(
            "Configured capture: {} -> {}fps, {}-bit{}",
            selected.format,
            selected.target_frame_rate,
            depth.bits(),
            if fell_back { " (depth fallback)" } else { "" }
        );

        self.state = SessionState::Configuring;
        self.selected = Some(selected.clone());
        Ok(selected)
    }

    /// Configuring -> Running: the hardware begins producing samples on the
    /// two delivery paths.
    pub fn run(&mut self) -> Result<SampleStreams> {
        self.expect_state(SessionState::Configuring)?;
        let selected = self
            .selected
            .as_ref()
            .expect("configured controller has a selection");

        let streams = self.source.start(selected)?;
        self.accepting.store(true, Ordering::SeqCst);
        self.state = SessionState::Running;
        Ok(streams)
    }

    /// Running -> Stopping: detach the delivery paths FIRST, then tell the
    /// underlying session to halt. Samples already in flight are drained and
    /// dropped by the consumers, never buffered.
    pub fn begin_stop(&mut self) -> Result<()> {
        self.expect_state(SessionState::Running)?;
        self.accepting.store(false, Ordering::SeqCst);
        self.state = SessionState::Stopping;
        self.source.halt()
    }

    /// Stopping -> Stopped: called once the writer has reported
    /// finished/failed and the consumer threads have drained out.
    pub fn confirm_stopped(&mut self) {
        debug_assert_eq!(self.state, SessionState::Stopping);
        self.state = SessionState::Stopped;
    }
}

/// Walk the preference order widest-first and pick the first depth the
/// device supports. Anything past the first preference is a fallback.
fn negotiate_depth(
    preferred: SampleDepth,
    supported: &[SampleDepth],
) -> Result<(SampleDepth, bool)> {
    if supported.is_empty() {
        return Err(CaptureError::NoSupportedDepth);
    }

    // Start the walk at the preferred depth; 8-bit selections never look at 10-bit.
    let order: Vec<SampleDepth> = SampleDepth::PREFERENCE
        .iter()
        .copied()
        .skip_while(|d| *d != preferred)
        .collect();

    for (i, depth) in order.iter().enumerate() {
        if supported.contains(depth) {
            return Ok((*depth, i > 0));
        }
    }

    Err(CaptureError::NoSupportedDepth)
}
