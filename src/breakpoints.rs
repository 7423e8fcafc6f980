use crate::config::BreakpointConfig;

/// The two breakpoint tables a variant width is snapped to.
///
/// Both tables are validated as non-empty and strictly increasing when
/// the config is loaded.
#[derive(Debug, Clone)]
pub struct Breakpoints {
    general: Vec<u32>,
    square: Vec<u32>,
}

impl Breakpoints {
    pub fn new(cfg: &BreakpointConfig) -> Self {
        Self {
            general: cfg.general.clone(),
            square: cfg.square.clone(),
        }
    }

    /// Selects the breakpoint used to render `requested_width`.
    ///
    /// Square images (an aspect ratio of exactly 1) use the square table,
    /// everything else uses the general table. Widths below a table's
    /// minimum snap up to the minimum, anything else snaps down to the
    /// largest breakpoint that does not exceed it, which caps requests
    /// above the maximum at the maximum.
    pub fn select(&self, requested_width: u32, aspect_ratio: f64) -> u32 {
        #[allow(clippy::float_cmp)]
        let table = if aspect_ratio == 1.0 {
            &self.square
        } else {
            &self.general
        };

        snap(table, requested_width)
    }

    /// The general breakpoints an image of `width` can be served at.
    ///
    /// This always uses the general table, even for square images.
    pub fn sizes_up_to(&self, width: u32) -> Vec<u32> {
        self.general
            .iter()
            .copied()
            .take_while(|bp| *bp <= width)
            .collect()
    }

    #[cfg(test)]
    pub fn general(&self) -> &[u32] {
        &self.general
    }

    #[cfg(test)]
    pub fn square(&self) -> &[u32] {
        &self.square
    }
}

fn snap(table: &[u32], requested_width: u32) -> u32 {
    match table.iter().rev().find(|bp| **bp <= requested_width) {
        Some(bp) => *bp,
        None => table[0],
    }
}
