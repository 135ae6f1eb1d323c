//! Traversal of an explicit list of waypoints.
use super::{ensure_countable, ensure_len, ensure_passes, Positioner};
use crate::core::PositionVector;
use crate::error::ConstructionError;

/// Replays a fixed list of positions once per pass.
#[derive(Clone, Debug)]
pub struct VectorPositioner {
    positions: Vec<PositionVector>,
    passes: usize,
}

impl VectorPositioner {
    /// Builds the positioner from per-index position vectors.
    ///
    /// Every position must have as many axes as the first one; `offsets`, when
    /// given, is added to every position.
    pub fn new(
        mut positions: Vec<PositionVector>,
        passes: usize,
        offsets: Option<&[f64]>,
    ) -> Result<Self, ConstructionError> {
        let passes = ensure_passes(passes)?;
        let n_axis = positions
            .first()
            .map(Vec::len)
            .ok_or(ConstructionError::EmptyPositions)?;
        ensure_countable(passes, Some(positions.len()))?;
        for position in &positions {
            ensure_len("positions", n_axis, position.len())?;
        }

        if let Some(offsets) = offsets {
            ensure_len("offsets", n_axis, offsets.len())?;
            for position in &mut positions {
                for (value, offset) in position.iter_mut().zip(offsets) {
                    *value += offset;
                }
            }
        }

        Ok(Self { positions, passes })
    }

    /// Builds the positioner from one waypoint list per axis ("per knob").
    ///
    /// `axes[k][i]` is the coordinate of axis `k` at waypoint `i`; all lists
    /// must have the same length.
    pub fn from_axes(
        axes: &[Vec<f64>],
        passes: usize,
        offsets: Option<&[f64]>,
    ) -> Result<Self, ConstructionError> {
        let n_positions = axes.first().map_or(0, Vec::len);
        for axis in axes {
            ensure_len("axis positions", n_positions, axis.len())?;
        }
        let positions = (0..n_positions)
            .map(|i| axes.iter().map(|axis| axis[i]).collect())
            .collect();
        Self::new(positions, passes, offsets)
    }

    /// Waypoints after offsets were applied.
    pub fn waypoints(&self) -> &[PositionVector] {
        &self.positions
    }
}

impl Positioner for VectorPositioner {
    type Position = PositionVector;

    fn positions(&self) -> Box<dyn Iterator<Item = PositionVector> + Send + '_> {
        Box::new((0..self.passes).flat_map(move |_| self.positions.iter().cloned()))
    }

    fn num_positions(&self) -> usize {
        self.passes * self.positions.len()
    }
}

/// Ping-pongs through the waypoint list: `0..n-1`, then back `n-2..0`, and so on.
///
/// The waypoint at a turning point is visited once, so `passes` passes over
/// `n` waypoints yield `n + (passes - 1) * (n - 1)` positions.
#[derive(Clone, Debug)]
pub struct ZigZagVectorPositioner(VectorPositioner);

impl ZigZagVectorPositioner {
    /// Builds the positioner from per-index position vectors.
    pub fn new(
        positions: Vec<PositionVector>,
        passes: usize,
        offsets: Option<&[f64]>,
    ) -> Result<Self, ConstructionError> {
        VectorPositioner::new(positions, passes, offsets).map(Self)
    }

    /// Builds the positioner from one waypoint list per axis.
    pub fn from_axes(
        axes: &[Vec<f64>],
        passes: usize,
        offsets: Option<&[f64]>,
    ) -> Result<Self, ConstructionError> {
        VectorPositioner::from_axes(axes, passes, offsets).map(Self)
    }

    /// Waypoint index visited at sequence position `k`.
    fn index_at(&self, k: usize) -> usize {
        let n = self.0.positions.len();
        if n < 2 {
            return 0;
        }
        let period = 2 * n - 2;
        let phase = k % period;
        if phase < n {
            phase
        } else {
            period - phase
        }
    }
}

impl Positioner for ZigZagVectorPositioner {
    type Position = PositionVector;

    fn positions(&self) -> Box<dyn Iterator<Item = PositionVector> + Send + '_> {
        Box::new(
            (0..self.num_positions()).map(move |k| self.0.positions[self.index_at(k)].clone()),
        )
    }

    fn num_positions(&self) -> usize {
        let n = self.0.positions.len();
        n + (self.0.passes - 1) * (n - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waypoints(n: usize) -> Vec<PositionVector> {
        (0..n).map(|i| vec![i as f64]).collect()
    }

    fn indexes(positions: impl Iterator<Item = PositionVector>) -> Vec<usize> {
        positions.map(|p| p[0] as usize).collect()
    }

    #[test]
    fn test_vector_repeats_list_per_pass() {
        let positioner = VectorPositioner::new(waypoints(3), 2, None).unwrap();
        assert_eq!(indexes(positioner.positions()), vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(positioner.num_positions(), 6);
    }

    #[test]
    fn test_zigzag_vector_does_not_duplicate_turning_points() {
        let positioner = ZigZagVectorPositioner::new(waypoints(3), 2, None).unwrap();
        assert_eq!(indexes(positioner.positions()), vec![0, 1, 2, 1, 0]);
    }

    #[test]
    fn test_zigzag_vector_many_passes() {
        let positioner = ZigZagVectorPositioner::new(waypoints(4), 4, None).unwrap();
        assert_eq!(
            indexes(positioner.positions()),
            vec![0, 1, 2, 3, 2, 1, 0, 1, 2, 3, 2, 1, 0]
        );
        assert_eq!(positioner.num_positions(), 4 + 3 * 3);
    }

    #[test]
    fn test_zigzag_vector_single_waypoint() {
        let positioner = ZigZagVectorPositioner::new(waypoints(1), 3, None).unwrap();
        assert_eq!(indexes(positioner.positions()), vec![0]);
    }

    #[test]
    fn test_offsets_added_to_every_waypoint() {
        let positioner =
            VectorPositioner::new(vec![vec![0.0, 1.0], vec![2.0, 3.0]], 1, Some(&[10.0, 20.0]))
                .unwrap();
        assert_eq!(
            positioner.waypoints(),
            &[vec![10.0, 21.0], vec![12.0, 23.0]]
        );
    }

    #[test]
    fn test_uncountable_passes_rejected() {
        assert_eq!(
            VectorPositioner::new(waypoints(2), usize::MAX, None).unwrap_err(),
            ConstructionError::TooManyPositions
        );
        assert_eq!(
            ZigZagVectorPositioner::new(waypoints(3), usize::MAX, None).unwrap_err(),
            ConstructionError::TooManyPositions
        );
    }

    #[test]
    fn test_from_axes_transposes() {
        let positioner =
            VectorPositioner::from_axes(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]], 1, None)
                .unwrap();
        assert_eq!(
            positioner.waypoints(),
            &[vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]]
        );
    }

    #[test]
    fn test_invalid_waypoints_rejected() {
        assert_eq!(
            VectorPositioner::new(Vec::new(), 1, None).unwrap_err(),
            ConstructionError::EmptyPositions
        );
        assert!(matches!(
            VectorPositioner::new(vec![vec![0.0], vec![0.0, 1.0]], 1, None),
            Err(ConstructionError::AxisCountMismatch { .. })
        ));
        assert!(matches!(
            VectorPositioner::from_axes(&[vec![0.0, 1.0], vec![0.0]], 1, None),
            Err(ConstructionError::AxisCountMismatch { .. })
        ));
    }
}
