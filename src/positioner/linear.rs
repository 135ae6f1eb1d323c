//! Lockstep traversal of all axes.
use super::{
    ensure_countable, ensure_passes, resolve_axes, zip_axes, AxisSpec, Positioner, Step,
};
use crate::core::PositionVector;
use crate::error::ConstructionError;

/// Moves every axis one increment per step, from `start` towards `end`.
///
/// Each pass is an independent forward sweep that restarts from `start`.
#[derive(Clone, Debug)]
pub struct LinearPositioner {
    start: PositionVector,
    n_steps: usize,
    step_size: Vec<f64>,
    passes: usize,
}

impl LinearPositioner {
    /// Builds a linear scan over `axes`.
    ///
    /// Explicit step counts must agree across axes. With step sizes every axis
    /// keeps its own increment and the first axis decides how many steps are
    /// taken, so the other axes need not reach their `end`.
    pub fn new(axes: Vec<AxisSpec>, passes: usize) -> Result<Self, ConstructionError> {
        let passes = ensure_passes(passes)?;
        let resolved = resolve_axes(&axes)?;

        let counts: Vec<usize> = axes
            .iter()
            .filter_map(|axis| match axis.step {
                Step::Count(n) => Some(n),
                Step::Size(_) => None,
            })
            .collect();
        if counts.windows(2).any(|pair| pair[0] != pair[1]) {
            return Err(ConstructionError::StepCountMismatch(counts));
        }

        let n_steps = resolved.first().map_or(0, |axis| axis.n_steps);
        ensure_countable(passes, n_steps.checked_add(1))?;

        Ok(Self {
            start: resolved.iter().map(|axis| axis.start).collect(),
            n_steps,
            step_size: resolved.iter().map(|axis| axis.step_size).collect(),
            passes,
        })
    }

    /// Builds a linear scan from parallel per-axis vectors.
    pub fn from_vectors(
        start: &[f64],
        end: &[f64],
        steps: &[Step],
        passes: usize,
        offsets: Option<&[f64]>,
    ) -> Result<Self, ConstructionError> {
        Self::new(zip_axes(start, end, steps, offsets)?, passes)
    }

    /// Number of increments per pass.
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    /// Increment applied to each axis per step.
    pub fn step_size(&self) -> &[f64] {
        &self.step_size
    }

    fn iter(&self, zigzag: bool) -> LinearIter<'_> {
        LinearIter {
            positioner: self,
            zigzag,
            current: self.start.clone(),
            pass: 0,
            step: 0,
            started: false,
        }
    }
}

impl Positioner for LinearPositioner {
    type Position = PositionVector;

    fn positions(&self) -> Box<dyn Iterator<Item = PositionVector> + Send + '_> {
        Box::new(self.iter(false))
    }

    fn num_positions(&self) -> usize {
        self.passes * (self.n_steps + 1)
    }
}

/// Linear traversal that reverses direction on every odd pass.
///
/// The start vector is emitted once; each further pass continues from where the
/// previous one ended, so consecutive passes sweep back and forth.
#[derive(Clone, Debug)]
pub struct ZigZagLinearPositioner(LinearPositioner);

impl ZigZagLinearPositioner {
    /// Builds a zigzag linear scan over `axes`.
    pub fn new(axes: Vec<AxisSpec>, passes: usize) -> Result<Self, ConstructionError> {
        LinearPositioner::new(axes, passes).map(Self)
    }

    /// Builds a zigzag linear scan from parallel per-axis vectors.
    pub fn from_vectors(
        start: &[f64],
        end: &[f64],
        steps: &[Step],
        passes: usize,
        offsets: Option<&[f64]>,
    ) -> Result<Self, ConstructionError> {
        LinearPositioner::from_vectors(start, end, steps, passes, offsets).map(Self)
    }
}

impl Positioner for ZigZagLinearPositioner {
    type Position = PositionVector;

    fn positions(&self) -> Box<dyn Iterator<Item = PositionVector> + Send + '_> {
        Box::new(self.0.iter(true))
    }

    fn num_positions(&self) -> usize {
        1 + self.0.passes * self.0.n_steps
    }
}

struct LinearIter<'a> {
    positioner: &'a LinearPositioner,
    zigzag: bool,
    current: PositionVector,
    pass: usize,
    /// Increments taken in the current pass
    step: usize,
    started: bool,
}

impl LinearIter<'_> {
    fn shift(&mut self, direction: f64) {
        for (value, step) in self.current.iter_mut().zip(&self.positioner.step_size) {
            *value += step * direction;
        }
    }
}

impl Iterator for LinearIter<'_> {
    type Item = PositionVector;

    fn next(&mut self) -> Option<PositionVector> {
        let p = self.positioner;
        loop {
            if self.pass >= p.passes {
                return None;
            }
            if !self.started {
                self.started = true;
                self.current = p.start.clone();
                return Some(self.current.clone());
            }
            if self.step < p.n_steps {
                self.step += 1;
                let direction = if self.zigzag && self.pass % 2 == 1 {
                    -1.0
                } else {
                    1.0
                };
                self.shift(direction);
                return Some(self.current.clone());
            }
            self.pass += 1;
            self.step = 0;
            // Plain passes restart from `start`; zigzag passes continue.
            if !self.zigzag {
                self.started = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_axis() -> Vec<AxisSpec> {
        vec![AxisSpec::new(0.0, 10.0, Step::Count(5))]
    }

    fn firsts(positions: impl Iterator<Item = PositionVector>) -> Vec<f64> {
        positions.map(|p| p[0]).collect()
    }

    #[test]
    fn test_linear_single_pass() {
        let positioner = LinearPositioner::new(single_axis(), 1).unwrap();
        assert_eq!(
            firsts(positioner.positions()),
            vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]
        );
        assert_eq!(positioner.num_positions(), 6);
    }

    #[test]
    fn test_linear_passes_restart_from_start() {
        let positioner = LinearPositioner::new(single_axis(), 2).unwrap();
        let positions = firsts(positioner.positions());
        assert_eq!(positions.len(), 12);
        assert_eq!(&positions[..6], &positions[6..]);
        assert_eq!(positions[6], 0.0);
    }

    #[test]
    fn test_zigzag_linear_reverses_odd_passes() {
        let positioner = ZigZagLinearPositioner::new(single_axis(), 2).unwrap();
        assert_eq!(
            firsts(positioner.positions()),
            vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 8.0, 6.0, 4.0, 2.0, 0.0]
        );
        assert_eq!(positioner.num_positions(), 11);
    }

    #[test]
    fn test_sequence_is_restartable() {
        let positioner = ZigZagLinearPositioner::new(single_axis(), 3).unwrap();
        let first: Vec<_> = positioner.positions().collect();
        let second: Vec<_> = positioner.positions().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), positioner.num_positions());
    }

    #[test]
    fn test_axes_move_in_lockstep() {
        let positioner = LinearPositioner::from_vectors(
            &[0.0, 10.0],
            &[1.0, 0.0],
            &[Step::Count(2), Step::Count(2)],
            1,
            Some(&[1.0, 1.0]),
        )
        .unwrap();
        let positions: Vec<_> = positioner.positions().collect();
        assert_eq!(
            positions,
            vec![vec![1.0, 11.0], vec![1.5, 6.0], vec![2.0, 1.0]]
        );
    }

    #[test]
    fn test_step_size_mode() {
        let positioner = LinearPositioner::from_vectors(
            &[0.0, 0.0],
            &[1.0, 2.0],
            &[Step::Size(0.5), Step::Size(1.0)],
            1,
            None,
        )
        .unwrap();
        assert_eq!(positioner.n_steps(), 2);
        assert_eq!(positioner.positions().last(), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn test_step_size_count_follows_first_axis() {
        let positioner = LinearPositioner::from_vectors(
            &[0.0, 0.0],
            &[1.0, 2.0],
            &[Step::Size(0.5), Step::Size(0.5)],
            1,
            None,
        )
        .unwrap();
        let positions: Vec<_> = positioner.positions().collect();
        assert_eq!(
            positions,
            vec![vec![0.0, 0.0], vec![0.5, 0.5], vec![1.0, 1.0]]
        );
    }

    #[test]
    fn test_step_size_rounding_does_not_split_axes() {
        // 0.3 / 0.1 floors to 2 while 0.9 / 0.3 floors to 3
        let positioner = LinearPositioner::from_vectors(
            &[0.0, 0.0],
            &[0.3, 0.9],
            &[Step::Size(0.1), Step::Size(0.3)],
            1,
            None,
        )
        .unwrap();
        assert_eq!(positioner.n_steps(), 2);
        assert_eq!(positioner.step_size(), &[0.1, 0.3]);
        assert_eq!(positioner.num_positions(), 3);
        assert_eq!(positioner.positions().last(), Some(vec![0.2, 0.6]));
    }

    #[test]
    fn test_tiny_step_size_rejected() {
        let axes = vec![AxisSpec::new(0.0, 1.0, Step::Size(1e-300))];
        assert_eq!(
            LinearPositioner::new(axes.clone(), 1).unwrap_err(),
            ConstructionError::TooManyPositions
        );
        assert_eq!(
            ZigZagLinearPositioner::new(axes, 2).unwrap_err(),
            ConstructionError::TooManyPositions
        );
    }

    #[test]
    fn test_unequal_step_counts_rejected() {
        let err = LinearPositioner::from_vectors(
            &[0.0, 0.0],
            &[1.0, 1.0],
            &[Step::Count(2), Step::Count(3)],
            1,
            None,
        )
        .unwrap_err();
        assert_eq!(err, ConstructionError::StepCountMismatch(vec![2, 3]));
    }

    #[test]
    fn test_zero_passes_rejected() {
        assert_eq!(
            LinearPositioner::new(single_axis(), 0).unwrap_err(),
            ConstructionError::InvalidPasses
        );
    }
}
