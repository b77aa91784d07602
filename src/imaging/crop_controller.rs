//! Interactive crop overlay driven by pointer events.
//!
//! The controller owns a rectangle in *displayed-image* coordinates and turns
//! a stream of normalized pointer events into moves and ratio-locked resizes.
//! Nothing it holds is authoritative until [`CropController::execute`]
//! converts the overlay into a [`CropRect`] in source pixels.
//!
//! ## Input normalization
//!
//! Mouse and touch input share one path: [`PointerInput::position`] picks the
//! mouse position, or the first active touch, or (on touch end, when no touch
//! is active any more) the first changed touch.
//!
//! ## Constraints
//!
//! | Gesture | Rule |
//! |---|---|
//! | Move | size fixed; position clamped so the overlay stays on the image |
//! | Corner resize | opposite corner anchored; the smaller side wins the ratio |
//! | Edge resize | dragged side is primary; the other axis follows from its top or left edge |
//! | Any resize | rejected whole if out of bounds or under 50 display px |

use super::calculations::initial_overlay;
use super::params::{CropError, CropRect};
use serde::{Deserialize, Serialize};

/// Smallest overlay side, in display pixels, a resize may produce.
pub const MIN_OVERLAY_SIDE: f64 = 50.0;

/// Hit radius around a handle, in display pixels.
pub const HANDLE_RADIUS: f64 = 10.0;

const EDGE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Position and size of the displayed image, in the same space as pointer
/// positions (e.g. client coordinates).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayBox {
    fn to_local(self, p: Point) -> Point {
        Point {
            x: p.x - self.left,
            y: p.y - self.top,
        }
    }
}

/// Overlay rectangle relative to the displayed image's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl OverlayRect {
    fn right(&self) -> f64 {
        self.left + self.width
    }

    fn bottom(&self) -> f64 {
        self.top + self.height
    }

    fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right() && p.y >= self.top && p.y <= self.bottom()
    }

    fn fits_within(&self, width: f64, height: f64) -> bool {
        self.left >= 0.0
            && self.top >= 0.0
            && self.right() <= width + EDGE_EPSILON
            && self.bottom() <= height + EDGE_EPSILON
            && self.width >= MIN_OVERLAY_SIDE
            && self.height >= MIN_OVERLAY_SIDE
    }
}

/// One of the eight resize handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handle {
    N,
    S,
    E,
    W,
    Ne,
    Nw,
    Se,
    Sw,
}

impl Handle {
    pub const ALL: [Handle; 8] = [
        Handle::Nw,
        Handle::Ne,
        Handle::Sw,
        Handle::Se,
        Handle::N,
        Handle::S,
        Handle::E,
        Handle::W,
    ];

    fn north(self) -> bool {
        matches!(self, Handle::N | Handle::Ne | Handle::Nw)
    }

    fn south(self) -> bool {
        matches!(self, Handle::S | Handle::Se | Handle::Sw)
    }

    fn east(self) -> bool {
        matches!(self, Handle::E | Handle::Ne | Handle::Se)
    }

    fn west(self) -> bool {
        matches!(self, Handle::W | Handle::Nw | Handle::Sw)
    }

    fn is_corner(self) -> bool {
        matches!(self, Handle::Ne | Handle::Nw | Handle::Se | Handle::Sw)
    }

    /// Where this handle sits on an overlay.
    fn anchor_on(self, rect: &OverlayRect) -> Point {
        let x = if self.west() {
            rect.left
        } else if self.east() {
            rect.right()
        } else {
            rect.left + rect.width / 2.0
        };
        let y = if self.north() {
            rect.top
        } else if self.south() {
            rect.bottom()
        } else {
            rect.top + rect.height / 2.0
        };
        Point { x, y }
    }
}

/// What a pointer-down landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerTarget {
    Body,
    Handle(Handle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerPhase {
    Start,
    Move,
    End,
    Cancel,
}

/// Raw pointer data from either input device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerInput {
    Mouse(Point),
    Touch {
        #[serde(default)]
        touches: Vec<Point>,
        #[serde(default)]
        changed: Vec<Point>,
    },
}

impl PointerInput {
    /// Single pointer position regardless of device.
    pub fn position(&self) -> Option<Point> {
        match self {
            PointerInput::Mouse(p) => Some(*p),
            PointerInput::Touch { touches, changed } => {
                touches.first().or_else(|| changed.first()).copied()
            }
        }
    }
}

/// A normalized pointer event.
///
/// `target` is what the UI reported under the pointer on `Start`; when absent
/// the controller hit-tests the overlay itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub phase: PointerPhase,
    #[serde(default)]
    pub target: Option<PointerTarget>,
    pub input: PointerInput,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragMode {
    None,
    /// `offset` is the pointer position relative to the overlay's top-left
    /// at pointer-down.
    Moving { offset: Point },
    Resizing { handle: Handle },
}

/// Draggable, ratio-locked crop overlay.
#[derive(Debug, Clone)]
pub struct CropController {
    display: DisplayBox,
    target_ratio: f64,
    overlay: OverlayRect,
    mode: DragMode,
}

impl CropController {
    /// Start with the default centered overlay.
    pub fn new(display: DisplayBox, target_ratio: f64) -> Self {
        let overlay = initial_overlay(display.width, display.height, target_ratio);
        Self::with_overlay(display, target_ratio, overlay)
    }

    pub fn with_overlay(display: DisplayBox, target_ratio: f64, overlay: OverlayRect) -> Self {
        Self {
            display,
            target_ratio,
            overlay,
            mode: DragMode::None,
        }
    }

    pub fn overlay(&self) -> OverlayRect {
        self.overlay
    }

    pub fn mode(&self) -> DragMode {
        self.mode
    }

    pub fn display(&self) -> DisplayBox {
        self.display
    }

    /// Which part of the overlay sits under a display-space point.
    pub fn hit_test(&self, position: Point) -> Option<PointerTarget> {
        let local = self.display.to_local(position);
        let handle = Handle::ALL.into_iter().find(|h| {
            let a = h.anchor_on(&self.overlay);
            (a.x - local.x).abs() <= HANDLE_RADIUS && (a.y - local.y).abs() <= HANDLE_RADIUS
        });
        match handle {
            Some(h) => Some(PointerTarget::Handle(h)),
            None if self.overlay.contains(local) => Some(PointerTarget::Body),
            None => None,
        }
    }

    /// Feed one pointer event. Returns whether the overlay changed.
    pub fn handle_event(&mut self, event: &PointerEvent) -> bool {
        match event.phase {
            PointerPhase::End | PointerPhase::Cancel => {
                self.pointer_up();
                false
            }
            PointerPhase::Start => {
                if let Some(position) = event.input.position() {
                    let target = event.target.or_else(|| self.hit_test(position));
                    if let Some(target) = target {
                        self.pointer_down(target, position);
                    }
                }
                false
            }
            PointerPhase::Move => match event.input.position() {
                Some(position) => self.pointer_move(position),
                None => false,
            },
        }
    }

    pub fn pointer_down(&mut self, target: PointerTarget, position: Point) {
        self.mode = match target {
            PointerTarget::Body => {
                let local = self.display.to_local(position);
                DragMode::Moving {
                    offset: Point {
                        x: local.x - self.overlay.left,
                        y: local.y - self.overlay.top,
                    },
                }
            }
            PointerTarget::Handle(handle) => DragMode::Resizing { handle },
        };
    }

    /// Apply a pointer move. Returns whether the overlay changed.
    pub fn pointer_move(&mut self, position: Point) -> bool {
        let local = self.display.to_local(position);
        let proposed = match self.mode {
            DragMode::None => return false,
            DragMode::Moving { offset } => self.moved(local, offset),
            DragMode::Resizing { handle } => match self.resized(handle, local) {
                Some(rect) => rect,
                None => return false,
            },
        };
        let changed = proposed != self.overlay;
        self.overlay = proposed;
        changed
    }

    pub fn pointer_up(&mut self) {
        self.mode = DragMode::None;
    }

    fn moved(&self, local: Point, offset: Point) -> OverlayRect {
        let max_left = (self.display.width - self.overlay.width).max(0.0);
        let max_top = (self.display.height - self.overlay.height).max(0.0);
        OverlayRect {
            left: (local.x - offset.x).clamp(0.0, max_left),
            top: (local.y - offset.y).clamp(0.0, max_top),
            ..self.overlay
        }
    }

    /// Proposed overlay for a resize, or `None` when it breaks a constraint.
    fn resized(&self, handle: Handle, local: Point) -> Option<OverlayRect> {
        let current = self.overlay;
        let ratio = self.target_ratio;

        let mut width = current.width;
        let mut height = current.height;
        if handle.east() {
            width = local.x - current.left;
        }
        if handle.west() {
            width = current.right() - local.x;
        }
        if handle.south() {
            height = local.y - current.top;
        }
        if handle.north() {
            height = current.bottom() - local.y;
        }

        if handle.is_corner() {
            if width / height > ratio {
                width = height * ratio;
            } else {
                height = width / ratio;
            }
        } else if handle.east() || handle.west() {
            height = width / ratio;
        } else {
            width = height * ratio;
        }

        // The edges opposite the handle stay put; so does the leading edge
        // of the follower axis on an edge resize.
        let left = if handle.west() {
            current.right() - width
        } else {
            current.left
        };
        let top = if handle.north() {
            current.bottom() - height
        } else {
            current.top
        };

        let proposed = OverlayRect {
            left,
            top,
            width,
            height,
        };
        proposed
            .fits_within(self.display.width, self.display.height)
            .then_some(proposed)
    }

    /// Convert the overlay to source pixels and validate it.
    ///
    /// Each axis is scaled independently by `source / displayed`. An invalid
    /// result leaves the controller untouched so the user can keep adjusting.
    pub fn execute(&self, source_width: u32, source_height: u32) -> Result<CropRect, CropError> {
        let scale_x = source_width as f64 / self.display.width;
        let scale_y = source_height as f64 / self.display.height;
        let crop = CropRect {
            x: self.overlay.left * scale_x,
            y: self.overlay.top * scale_y,
            width: self.overlay.width * scale_x,
            height: self.overlay.height * scale_y,
        };
        crop.validate(source_width, source_height, self.target_ratio)?;
        Ok(crop)
    }
}

/// How a recorded gesture session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureFinish {
    #[default]
    Execute,
    Cancel,
}

/// A recorded manual-crop session: the displayed image box, the pointer
/// events over it, and whether the user confirmed or cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GestureScript {
    pub display: DisplayBox,
    #[serde(default)]
    pub events: Vec<PointerEvent>,
    #[serde(default)]
    pub finish: GestureFinish,
}

impl GestureScript {
    /// Feed every event to `controller` in order and report how it ended.
    pub fn replay(&self, controller: &mut CropController) -> GestureFinish {
        for event in &self.events {
            controller.handle_event(event);
        }
        self.finish
    }
}
