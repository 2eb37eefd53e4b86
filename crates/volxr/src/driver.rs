//! The frame driver: the outer loop an XR runtime calls once per displayed frame.

use serde::{Deserialize, Serialize};
use volxr_render::{EyeImageSource, EyeView, FrameStats, Renderer, EYE_COUNT};

use crate::error::Result;

/// How the driver reacts to frames that cannot complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramePolicy {
    /// Turn a GPU sync timeout into a skipped frame instead of an error.
    pub skip_on_timeout: bool,
}

impl Default for FramePolicy {
    fn default() -> Self {
        Self {
            skip_on_timeout: true,
        }
    }
}

/// View and projection for both eyes of one displayed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoFrame {
    pub eyes: [EyeView; EYE_COUNT],
}

impl StereoFrame {
    pub fn new(left: EyeView, right: EyeView) -> Self {
        Self {
            eyes: [left, right],
        }
    }

    /// Both eyes see through the same camera.
    pub fn mono(eye: EyeView) -> Self {
        Self { eyes: [eye, eye] }
    }
}

/// Result of [`FrameDriver::drive_frame`].
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Rendered(FrameStats),
    /// The frame was dropped; the images may hold partial output.
    Skipped(String),
}

impl FrameOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered(_))
    }

    pub fn stats(&self) -> Option<&FrameStats> {
        match self {
            Self::Rendered(stats) => Some(stats),
            Self::Skipped(_) => None,
        }
    }
}

/// Owns the [`Renderer`] and runs it once per displayed frame.
///
/// Like the renderer, a driver belongs to the thread that renders.
pub struct FrameDriver {
    renderer: Renderer,
    policy: FramePolicy,
    rendered: u64,
    skipped: u64,
}

impl FrameDriver {
    pub fn new(renderer: Renderer, policy: FramePolicy) -> Self {
        Self {
            renderer,
            policy,
            rendered: 0,
            skipped: 0,
        }
    }

    /// Renders one stereo frame into `images`.
    ///
    /// # Errors
    ///
    /// Everything [`Renderer::render_frame`] reports, except sync timeouts when
    /// the policy skips them.
    pub fn drive_frame(
        &mut self,
        frame: &StereoFrame,
        images: [&mut dyn EyeImageSource; EYE_COUNT],
    ) -> Result<FrameOutcome> {
        match self.renderer.render_frame(&frame.eyes, images) {
            Ok(stats) => {
                self.rendered += 1;
                Ok(FrameOutcome::Rendered(stats))
            }
            Err(e) if e.is_sync_timeout() && self.policy.skip_on_timeout => {
                self.skipped += 1;
                log::warn!("skipping frame {}: {e}", self.rendered + self.skipped);
                Ok(FrameOutcome::Skipped(e.to_string()))
            }
            Err(e) => {
                if e.is_precondition_violation() {
                    log::error!("frame failed: {e}");
                }
                Err(e.into())
            }
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn into_renderer(self) -> Renderer {
        self.renderer
    }

    pub fn policy(&self) -> FramePolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: FramePolicy) {
        self.policy = policy;
    }

    pub fn rendered_frames(&self) -> u64 {
        self.rendered
    }

    pub fn skipped_frames(&self) -> u64 {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults_to_skip() {
        assert!(FramePolicy::default().skip_on_timeout);
    }

    #[test]
    fn test_outcome_stats() {
        let stats = FrameStats {
            draws: 2,
            ..FrameStats::default()
        };
        assert_eq!(FrameOutcome::Rendered(stats).stats(), Some(&stats));
        assert!(FrameOutcome::Skipped("timeout".into()).stats().is_none());
    }

    #[test]
    fn test_mono_frame_duplicates_eye() {
        let eye = EyeView::new(glam::Mat4::from_scale(glam::Vec3::splat(2.0)), glam::Mat4::IDENTITY);
        let frame = StereoFrame::mono(eye);
        assert_eq!(frame.eyes[0], frame.eyes[1]);
    }
}
