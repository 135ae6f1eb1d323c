//! N-axis raster and boustrophedon traversals.
//!
//! Both positioners walk the odometer pattern: axis 0 changes slowest, the
//! last axis fastest, and every combination of axis positions is visited once
//! per pass. Each axis keeps its own step count, so a step-size scan may take a
//! different number of steps on every axis.

use super::{
    ensure_countable, ensure_passes, points_per_pass, resolve_axes, zip_axes, Advance, AxisSpec,
    Odometer, Positioner, Step,
};
use crate::core::PositionVector;
use crate::error::ConstructionError;

#[derive(Clone, Debug)]
struct AreaGrid {
    start: PositionVector,
    n_steps: Vec<usize>,
    step_size: Vec<f64>,
    passes: usize,
    /// Grid points visited by one raster pass, start included
    per_pass: usize,
}

impl AreaGrid {
    fn new(axes: Vec<AxisSpec>, passes: usize) -> Result<Self, ConstructionError> {
        let passes = ensure_passes(passes)?;
        let resolved = resolve_axes(&axes)?;
        let n_steps: Vec<usize> = resolved.iter().map(|axis| axis.n_steps).collect();
        let per_pass = points_per_pass(&n_steps).ok_or(ConstructionError::TooManyPositions)?;
        ensure_countable(passes, Some(per_pass))?;
        Ok(Self {
            start: resolved.iter().map(|axis| axis.start).collect(),
            n_steps,
            step_size: resolved.iter().map(|axis| axis.step_size).collect(),
            passes,
            per_pass,
        })
    }

    fn iter(&self, zigzag: bool) -> AreaIter<'_> {
        AreaIter {
            grid: self,
            zigzag,
            odometer: Odometer::new(self.n_steps.clone()),
            position: self.start.clone(),
            pass: 0,
            emit_start: true,
        }
    }
}

/// Raster scan over N axes. Every pass restarts from `start`.
#[derive(Clone, Debug)]
pub struct AreaPositioner(AreaGrid);

impl AreaPositioner {
    /// Builds a raster scan; `axes[0]` is the slowest axis.
    pub fn new(axes: Vec<AxisSpec>, passes: usize) -> Result<Self, ConstructionError> {
        AreaGrid::new(axes, passes).map(Self)
    }

    /// Builds a raster scan from parallel per-axis vectors.
    pub fn from_vectors(
        start: &[f64],
        end: &[f64],
        steps: &[Step],
        passes: usize,
        offsets: Option<&[f64]>,
    ) -> Result<Self, ConstructionError> {
        Self::new(zip_axes(start, end, steps, offsets)?, passes)
    }

    /// Steps taken by each axis per loop.
    pub fn n_steps(&self) -> &[usize] {
        &self.0.n_steps
    }
}

impl Positioner for AreaPositioner {
    type Position = PositionVector;

    fn positions(&self) -> Box<dyn Iterator<Item = PositionVector> + Send + '_> {
        Box::new(self.0.iter(false))
    }

    fn num_positions(&self) -> usize {
        self.0.passes * self.0.per_pass
    }
}

/// Boustrophedon scan over N axes.
///
/// Each axis reverses direction every time its loop completes instead of
/// jumping back to its start. Directions and positions carry over between
/// passes: the start vector is emitted once and every later pass retraces the
/// previous one from where it ended.
#[derive(Clone, Debug)]
pub struct ZigZagAreaPositioner(AreaGrid);

impl ZigZagAreaPositioner {
    /// Builds a boustrophedon scan; `axes[0]` is the slowest axis.
    pub fn new(axes: Vec<AxisSpec>, passes: usize) -> Result<Self, ConstructionError> {
        AreaGrid::new(axes, passes).map(Self)
    }

    /// Builds a boustrophedon scan from parallel per-axis vectors.
    pub fn from_vectors(
        start: &[f64],
        end: &[f64],
        steps: &[Step],
        passes: usize,
        offsets: Option<&[f64]>,
    ) -> Result<Self, ConstructionError> {
        Self::new(zip_axes(start, end, steps, offsets)?, passes)
    }
}

impl Positioner for ZigZagAreaPositioner {
    type Position = PositionVector;

    fn positions(&self) -> Box<dyn Iterator<Item = PositionVector> + Send + '_> {
        Box::new(self.0.iter(true))
    }

    fn num_positions(&self) -> usize {
        1 + self.0.passes * (self.0.per_pass - 1)
    }
}

struct AreaIter<'a> {
    grid: &'a AreaGrid,
    zigzag: bool,
    odometer: Odometer,
    position: PositionVector,
    pass: usize,
    emit_start: bool,
}

impl AreaIter<'_> {
    fn apply(&mut self, Advance { axis, direction }: Advance) {
        let grid = self.grid;
        if self.zigzag {
            self.position[axis] += grid.step_size[axis] * direction;
        } else {
            self.position[axis] += grid.step_size[axis];
            // Inner axes finished their loop and go back to their start.
            self.position[axis + 1..].copy_from_slice(&grid.start[axis + 1..]);
        }
    }
}

impl Iterator for AreaIter<'_> {
    type Item = PositionVector;

    fn next(&mut self) -> Option<PositionVector> {
        loop {
            if self.pass >= self.grid.passes {
                return None;
            }
            if self.emit_start {
                self.emit_start = false;
                return Some(self.position.clone());
            }
            if let Some(advance) = self.odometer.advance() {
                self.apply(advance);
                return Some(self.position.clone());
            }
            self.odometer.finish_pass();
            self.pass += 1;
            if !self.zigzag {
                self.position = self.grid.start.clone();
                self.emit_start = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n_steps: &[usize]) -> Vec<AxisSpec> {
        n_steps
            .iter()
            .map(|&n| AxisSpec::new(0.0, n as f64, Step::Count(n)))
            .collect()
    }

    #[test]
    fn test_area_odometer_order() {
        let positioner = AreaPositioner::new(grid(&[1, 1]), 1).unwrap();
        let positions: Vec<_> = positioner.positions().collect();
        assert_eq!(
            positions,
            vec![
                vec![0.0, 0.0],
                vec![0.0, 1.0],
                vec![1.0, 0.0],
                vec![1.0, 1.0]
            ]
        );
    }

    #[test]
    fn test_area_three_axes_innermost_fastest() {
        let positioner = AreaPositioner::new(grid(&[1, 1, 2]), 1).unwrap();
        let positions: Vec<_> = positioner.positions().collect();
        assert_eq!(positions.len(), 12);
        assert_eq!(positioner.num_positions(), 12);
        assert_eq!(positions[1], vec![0.0, 0.0, 1.0]);
        assert_eq!(positions[3], vec![0.0, 1.0, 0.0]);
        assert_eq!(positions[6], vec![1.0, 0.0, 0.0]);
        assert_eq!(positions[11], vec![1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_area_passes_restart_from_start() {
        let positioner = AreaPositioner::new(grid(&[1, 2]), 2).unwrap();
        let positions: Vec<_> = positioner.positions().collect();
        assert_eq!(positions.len(), 12);
        assert_eq!(&positions[..6], &positions[6..]);
    }

    #[test]
    fn test_area_step_size_per_axis() {
        let positioner = AreaPositioner::from_vectors(
            &[0.0, 0.0],
            &[1.0, 3.0],
            &[Step::Size(1.0), Step::Size(1.5)],
            1,
            None,
        )
        .unwrap();
        assert_eq!(positioner.n_steps(), &[1, 2]);
        assert_eq!(positioner.positions().count(), 6);
    }

    #[test]
    fn test_unbounded_grid_rejected() {
        let tiny = vec![AxisSpec::new(0.0, 1.0, Step::Size(1e-300))];
        assert_eq!(
            AreaPositioner::new(tiny.clone(), 1).unwrap_err(),
            ConstructionError::TooManyPositions
        );
        assert_eq!(
            ZigZagAreaPositioner::new(tiny, 1).unwrap_err(),
            ConstructionError::TooManyPositions
        );

        // Each axis fits, the product does not.
        let wide = vec![AxisSpec::new(0.0, 1.0, Step::Size(1e-12)); 2];
        assert_eq!(
            AreaPositioner::new(wide, 1).unwrap_err(),
            ConstructionError::TooManyPositions
        );
    }

    #[test]
    fn test_zigzag_area_single_pass() {
        let positioner = ZigZagAreaPositioner::new(grid(&[1, 2]), 1).unwrap();
        let positions: Vec<_> = positioner.positions().collect();
        assert_eq!(
            positions,
            vec![
                vec![0.0, 0.0],
                vec![0.0, 1.0],
                vec![0.0, 2.0],
                vec![1.0, 2.0],
                vec![1.0, 1.0],
                vec![1.0, 0.0],
            ]
        );
    }

    #[test]
    fn test_zigzag_area_inner_sweeps_mirror() {
        let positioner = ZigZagAreaPositioner::new(grid(&[1, 2]), 2).unwrap();
        let positions: Vec<_> = positioner.positions().collect();
        assert_eq!(positions.len(), positioner.num_positions());
        assert_eq!(positions.len(), 11);

        // Consecutive inner sweeps share their turning point.
        let inner: Vec<f64> = positions.iter().map(|p| p[1]).collect();
        assert_eq!(&inner[0..3], &[0.0, 1.0, 2.0]);
        assert_eq!(&inner[3..6], &[2.0, 1.0, 0.0]);

        let third = &inner[5..8];
        let fourth = &inner[8..11];
        assert_eq!(third, &[0.0, 1.0, 2.0]);
        let mut mirrored = fourth.to_vec();
        mirrored.reverse();
        assert_eq!(mirrored, third);

        // The outer axis walks back during the second pass.
        assert_eq!(positions[6][0], 1.0);
        assert_eq!(positions[8][0], 0.0);
    }

    #[test]
    fn test_zigzag_area_never_leaves_grid() {
        let positioner = ZigZagAreaPositioner::new(grid(&[2, 3]), 3).unwrap();
        for position in positioner.positions() {
            assert!((0.0..=2.0).contains(&position[0]));
            assert!((0.0..=3.0).contains(&position[1]));
        }
    }

    #[test]
    fn test_area_offsets_applied_once() {
        let positioner = AreaPositioner::from_vectors(
            &[0.0, 0.0],
            &[1.0, 1.0],
            &[Step::Count(1), Step::Count(1)],
            2,
            Some(&[5.0, -5.0]),
        )
        .unwrap();
        let positions: Vec<_> = positioner.positions().collect();
        assert_eq!(positions[0], vec![5.0, -5.0]);
        assert_eq!(positions[4], vec![5.0, -5.0]);
        assert_eq!(positions[7], vec![6.0, -4.0]);
    }
}
