use crate::Document;
use ulid::Ulid;

/// Which side of the target cell the dragged cell lands on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropSide {
    Before,
    After,
}

/// Pointer above the target's vertical midpoint inserts before it, below
/// inserts after
pub fn drop_side(pointer_y: f32, target_top: f32, target_height: f32) -> DropSide {
    if pointer_y - target_top < target_height / 2.0 {
        DropSide::Before
    } else {
        DropSide::After
    }
}

/// How a drag gesture ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOutcome {
    /// The source cell was relocated
    Moved,
    /// Source and target were the same cell; order unchanged
    NoOp,
    /// No valid target, or source/target vanished mid-drag; order
    /// unchanged
    Cancelled,
}

/// Per-gesture drag state machine: Idle -> Dragging -> (Dropped |
/// Cancelled). At most one cell may be dragging at a time across the
/// whole document; a second drag start is refused until the first gesture
/// ends.
#[derive(Debug, Default)]
pub struct DragController {
    source: Option<Ulid>,
    indicator: Option<(Ulid, DropSide)>,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the dragging state. Returns false when another drag is
    /// already active (single-drag invariant).
    pub fn begin(&mut self, source: Ulid) -> bool {
        if self.source.is_some() {
            return false;
        }
        self.source = Some(source);
        true
    }

    pub fn is_dragging(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<Ulid> {
        self.source
    }

    /// Reposition the single insertion-point indicator while hovering a
    /// candidate target. Ignored when no drag is active.
    pub fn hover(&mut self, target: Ulid, side: DropSide) {
        if self.source.is_some() {
            self.indicator = Some((target, side));
        }
    }

    /// Where the insertion indicator currently sits
    pub fn indicator(&self) -> Option<(Ulid, DropSide)> {
        self.indicator
    }

    /// Drop the dragged cell on the indicated side of the target. The
    /// indicator is removed unconditionally. A drop onto the source
    /// itself is a no-op; a source or target that no longer exists in the
    /// document (removed mid-drag) cancels the gesture without mutating
    /// order.
    pub fn drop_on(
        &mut self,
        document: &mut Document,
        target: Ulid,
        side: DropSide,
    ) -> DragOutcome {
        let Some(source) = self.source.take() else {
            self.indicator = None;
            return DragOutcome::Cancelled;
        };
        self.indicator = None;

        if source == target {
            return DragOutcome::NoOp;
        }
        if document.index_of(source).is_none() || document.index_of(target).is_none() {
            return DragOutcome::Cancelled;
        }
        let moved = match side {
            DropSide::Before => document.move_before(source, target),
            DropSide::After => document.move_after(source, target),
        };
        match moved {
            Ok(()) => DragOutcome::Moved,
            Err(_) => DragOutcome::Cancelled,
        }
    }

    /// Abandon the gesture: indicator removal and state reset are
    /// unconditional, even when the drop targeted no valid cell.
    pub fn cancel(&mut self) {
        self.source = None;
        self.indicator = None;
    }
}

/// Margin from the viewport edge inside which dragging autoscrolls
pub const AUTOSCROLL_MARGIN: f32 = 60.0;
/// Constant autoscroll speed, in points per tick
pub const AUTOSCROLL_SPEED: f32 = 12.0;

/// Scroll delta for the current pointer position: negative near the top
/// edge, positive near the bottom edge, zero outside both margins.
pub fn autoscroll_delta(pointer_y: f32, viewport_top: f32, viewport_bottom: f32) -> f32 {
    if pointer_y < viewport_top + AUTOSCROLL_MARGIN {
        -AUTOSCROLL_SPEED
    } else if pointer_y > viewport_bottom - AUTOSCROLL_MARGIN {
        AUTOSCROLL_SPEED
    } else {
        0.0
    }
}
