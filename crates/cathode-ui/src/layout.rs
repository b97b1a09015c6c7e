use cathode_common::types::Size;

/// Measurement constraints handed down the tree: the child must return a
/// size within `[min, max]` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraints {
    pub min: Size,
    pub max: Size,
}

impl Constraints {
    pub fn tight(size: Size) -> Self {
        Self {
            min: size,
            max: size,
        }
    }

    pub fn loose(max: Size) -> Self {
        Self {
            min: Size::new(0, 0),
            max,
        }
    }

    pub fn clamp(&self, size: Size) -> Size {
        Size::new(
            size.width.clamp(self.min.width, self.max.width),
            size.height.clamp(self.min.height, self.max.height),
        )
    }
}

/// Per-node layout hints consulted by container nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutHints {
    /// Grow to fill the parent instead of hugging content.
    pub expand: bool,
}
