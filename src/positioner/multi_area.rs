//! Raster traversal where every axis slot drives several co-moving channels.
use super::{
    ensure_countable, ensure_len, ensure_passes, ensure_uniform_steps, points_per_pass,
    resolve_axes, zip_axes, Advance, AxisSpec, Odometer, Positioner, Step,
};
use crate::core::MultiPositionVector;
use crate::error::ConstructionError;

/// Raster scan in which each axis position is itself a vector.
///
/// Increments are applied component-wise inside an axis slot. The number of
/// steps of a slot is taken from its first component only; when the
/// components resolve to different counts the remaining ones are not
/// reconciled, they simply step as many times as the first component does.
#[derive(Clone, Debug)]
pub struct MultiAreaPositioner {
    start: MultiPositionVector,
    n_steps: Vec<usize>,
    step_size: MultiPositionVector,
    passes: usize,
    per_pass: usize,
}

impl MultiAreaPositioner {
    /// Builds a multi-channel raster scan; `axes[0]` is the slowest slot.
    pub fn new(axes: Vec<Vec<AxisSpec>>, passes: usize) -> Result<Self, ConstructionError> {
        let passes = ensure_passes(passes)?;
        ensure_uniform_steps(axes.iter().flatten().map(|axis| &axis.step))?;

        let mut start = Vec::with_capacity(axes.len());
        let mut n_steps = Vec::with_capacity(axes.len());
        let mut step_size = Vec::with_capacity(axes.len());
        for slot in &axes {
            let resolved = resolve_axes(slot)?;
            // TODO: reconcile slots whose components resolve to different step counts.
            n_steps.push(resolved.first().map_or(0, |axis| axis.n_steps));
            start.push(resolved.iter().map(|axis| axis.start).collect());
            step_size.push(resolved.iter().map(|axis| axis.step_size).collect());
        }

        let per_pass = points_per_pass(&n_steps).ok_or(ConstructionError::TooManyPositions)?;
        ensure_countable(passes, Some(per_pass))?;

        Ok(Self {
            start,
            n_steps,
            step_size,
            passes,
            per_pass,
        })
    }

    /// Builds the scan from nested per-slot vectors.
    pub fn from_vectors(
        start: &[Vec<f64>],
        end: &[Vec<f64>],
        steps: &[Vec<Step>],
        passes: usize,
        offsets: Option<&[Vec<f64>]>,
    ) -> Result<Self, ConstructionError> {
        ensure_len("end", start.len(), end.len())?;
        ensure_len("steps", start.len(), steps.len())?;
        if let Some(offsets) = offsets {
            ensure_len("offsets", start.len(), offsets.len())?;
        }

        let mut axes = Vec::with_capacity(start.len());
        for (slot, slot_start) in start.iter().enumerate() {
            let offsets = offsets.map(|offsets| offsets[slot].as_slice());
            axes.push(zip_axes(slot_start, &end[slot], &steps[slot], offsets)?);
        }
        Self::new(axes, passes)
    }

    /// Steps taken by each slot per loop.
    pub fn n_steps(&self) -> &[usize] {
        &self.n_steps
    }
}

impl Positioner for MultiAreaPositioner {
    type Position = MultiPositionVector;

    fn positions(&self) -> Box<dyn Iterator<Item = MultiPositionVector> + Send + '_> {
        Box::new(MultiAreaIter {
            positioner: self,
            odometer: Odometer::new(self.n_steps.clone()),
            position: self.start.clone(),
            pass: 0,
            emit_start: true,
        })
    }

    fn num_positions(&self) -> usize {
        self.passes * self.per_pass
    }
}

struct MultiAreaIter<'a> {
    positioner: &'a MultiAreaPositioner,
    odometer: Odometer,
    position: MultiPositionVector,
    pass: usize,
    emit_start: bool,
}

impl Iterator for MultiAreaIter<'_> {
    type Item = MultiPositionVector;

    fn next(&mut self) -> Option<MultiPositionVector> {
        let p = self.positioner;
        loop {
            if self.pass >= p.passes {
                return None;
            }
            if self.emit_start {
                self.emit_start = false;
                return Some(self.position.clone());
            }
            if let Some(Advance { axis, .. }) = self.odometer.advance() {
                for (value, step) in self.position[axis].iter_mut().zip(&p.step_size[axis]) {
                    *value += step;
                }
                for inner in axis + 1..self.position.len() {
                    self.position[inner].clone_from(&p.start[inner]);
                }
                return Some(self.position.clone());
            }
            self.odometer.finish_pass();
            self.pass += 1;
            self.position = p.start.clone();
            self.emit_start = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_move_component_wise() {
        let positioner = MultiAreaPositioner::from_vectors(
            &[vec![0.0, 10.0], vec![0.0]],
            &[vec![1.0, 12.0], vec![2.0]],
            &[vec![Step::Count(1), Step::Count(1)], vec![Step::Count(2)]],
            1,
            None,
        )
        .unwrap();
        let positions: Vec<_> = positioner.positions().collect();
        assert_eq!(positions.len(), 6);
        assert_eq!(positioner.num_positions(), 6);
        assert_eq!(positions[0], vec![vec![0.0, 10.0], vec![0.0]]);
        assert_eq!(positions[2], vec![vec![0.0, 10.0], vec![2.0]]);
        assert_eq!(positions[3], vec![vec![1.0, 12.0], vec![0.0]]);
        assert_eq!(positions[5], vec![vec![1.0, 12.0], vec![2.0]]);
    }

    #[test]
    fn test_first_component_bounds_the_slot() {
        // Second component asks for 4 steps but the slot loops only twice.
        let positioner = MultiAreaPositioner::from_vectors(
            &[vec![0.0, 0.0]],
            &[vec![2.0, 4.0]],
            &[vec![Step::Count(2), Step::Count(4)]],
            1,
            None,
        )
        .unwrap();
        assert_eq!(positioner.n_steps(), &[2]);
        let positions: Vec<_> = positioner.positions().collect();
        assert_eq!(
            positions,
            vec![
                vec![vec![0.0, 0.0]],
                vec![vec![1.0, 1.0]],
                vec![vec![2.0, 2.0]],
            ]
        );
    }

    #[test]
    fn test_unbounded_slot_rejected() {
        let err = MultiAreaPositioner::from_vectors(
            &[vec![0.0, 0.0]],
            &[vec![1.0, 1.0]],
            &[vec![Step::Size(1e-300), Step::Size(0.5)]],
            1,
            None,
        )
        .unwrap_err();
        assert_eq!(err, ConstructionError::TooManyPositions);
    }

    #[test]
    fn test_offsets_and_passes() {
        let positioner = MultiAreaPositioner::from_vectors(
            &[vec![0.0]],
            &[vec![1.0]],
            &[vec![Step::Size(0.5)]],
            2,
            Some(&[vec![1.0]]),
        )
        .unwrap();
        let xs: Vec<f64> = positioner.positions().map(|p| p[0][0]).collect();
        assert_eq!(xs, vec![1.0, 1.5, 2.0, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_mixed_tags_across_slots_rejected() {
        let err = MultiAreaPositioner::from_vectors(
            &[vec![0.0], vec![0.0]],
            &[vec![1.0], vec![1.0]],
            &[vec![Step::Count(1)], vec![Step::Size(0.5)]],
            1,
            None,
        )
        .unwrap_err();
        assert_eq!(err, ConstructionError::MixedStepTags);
    }

    #[test]
    fn test_slot_component_mismatch_rejected() {
        let err = MultiAreaPositioner::from_vectors(
            &[vec![0.0, 0.0]],
            &[vec![1.0]],
            &[vec![Step::Count(1), Step::Count(1)]],
            1,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ConstructionError::AxisCountMismatch { .. }));
    }
}
