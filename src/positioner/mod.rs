//! Position sequence generators.
//!
//! Positioners are declarative: they hold a validated scan definition and
//! produce a fresh, finite sequence of position vectors every time
//! [`Positioner::positions`] is called. They never talk to hardware; the scan
//! driver feeds each yielded position to the actuator writer.
//!
//! # Variants
//!
//! - [`LinearPositioner`] / [`ZigZagLinearPositioner`]: all axes move in lockstep.
//! - [`AreaPositioner`] / [`ZigZagAreaPositioner`]: N-axis raster, axis 0 slowest.
//! - [`MultiAreaPositioner`]: raster where every axis slot holds several co-moving channels.
//! - [`VectorPositioner`] / [`ZigZagVectorPositioner`]: explicit waypoint lists.
//!
//! # Example
//!
//! ```rust
//! use rust_scan::positioner::{AxisSpec, LinearPositioner, Positioner, Step};
//!
//! let positioner = LinearPositioner::new(vec![AxisSpec::new(0.0, 10.0, Step::Count(5))], 1)?;
//! let xs: Vec<f64> = positioner.positions().map(|p| p[0]).collect();
//! assert_eq!(xs, vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
//! # Ok::<(), rust_scan::error::ConstructionError>(())
//! ```

pub mod area;
pub mod linear;
pub mod multi_area;
pub mod vector;

pub use area::{AreaPositioner, ZigZagAreaPositioner};
pub use linear::{LinearPositioner, ZigZagLinearPositioner};
pub use multi_area::MultiAreaPositioner;
pub use vector::{VectorPositioner, ZigZagVectorPositioner};

use crate::error::ConstructionError;
use serde::{Deserialize, Serialize};

/// How an axis is subdivided. Exactly one kind is used across a whole scan.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Split `end - start` into this many equal increments
    Count(usize),
    /// Fixed increment; the axis takes `floor((end - start) / size)` steps
    Size(f64),
}

impl Step {
    fn same_kind(&self, other: &Step) -> bool {
        matches!(
            (self, other),
            (Step::Count(_), Step::Count(_)) | (Step::Size(_), Step::Size(_))
        )
    }
}

/// Definition of one scanned axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    /// First coordinate
    pub start: f64,
    /// Last coordinate (reached exactly in step-count mode)
    pub end: f64,
    /// Subdivision of the axis
    pub step: Step,
    /// Added to both `start` and `end` when the positioner is built
    #[serde(default)]
    pub offset: f64,
}

impl AxisSpec {
    /// Creates an axis without offset.
    pub fn new(start: f64, end: f64, step: Step) -> Self {
        Self {
            start,
            end,
            step,
            offset: 0.0,
        }
    }

    /// Shifts the axis by `offset`.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }
}

/// A lazily generated, restartable sequence of positions.
pub trait Positioner: Send + Sync {
    /// Element type of the sequence.
    type Position: Clone + Send + 'static;

    /// Starts a fresh traversal from the first position.
    fn positions(&self) -> Box<dyn Iterator<Item = Self::Position> + Send + '_>;

    /// Exact number of positions one traversal yields.
    fn num_positions(&self) -> usize;
}

/// An axis with its offset applied and its step resolved.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ResolvedAxis {
    pub start: f64,
    pub end: f64,
    pub n_steps: usize,
    pub step_size: f64,
}

/// Applies offsets and resolves the step of every axis.
///
/// All axes must use the same step kind.
pub(crate) fn resolve_axes<'a, I>(axes: I) -> Result<Vec<ResolvedAxis>, ConstructionError>
where
    I: IntoIterator<Item = &'a AxisSpec>,
{
    let axes: Vec<&AxisSpec> = axes.into_iter().collect();
    ensure_uniform_steps(axes.iter().map(|axis| &axis.step))?;
    axes.into_iter().map(resolve_axis).collect()
}

fn resolve_axis(axis: &AxisSpec) -> Result<ResolvedAxis, ConstructionError> {
    let start = axis.start + axis.offset;
    let end = axis.end + axis.offset;
    let (n_steps, step_size) = match axis.step {
        Step::Count(0) => return Err(ConstructionError::InvalidStepCount),
        Step::Count(n) => (n, (end - start) / n as f64),
        Step::Size(size) if !(size.is_finite() && size > 0.0) => {
            return Err(ConstructionError::InvalidStepSize(size))
        }
        // A range pointing away from the step direction yields no steps.
        Step::Size(size) => (((end - start) / size).floor().max(0.0) as usize, size),
    };
    Ok(ResolvedAxis {
        start,
        end,
        n_steps,
        step_size,
    })
}

pub(crate) fn ensure_uniform_steps<'a, I>(steps: I) -> Result<(), ConstructionError>
where
    I: IntoIterator<Item = &'a Step>,
{
    let mut steps = steps.into_iter();
    if let Some(first) = steps.next() {
        if steps.any(|step| !step.same_kind(first)) {
            return Err(ConstructionError::MixedStepTags);
        }
    }
    Ok(())
}

pub(crate) fn ensure_passes(passes: usize) -> Result<usize, ConstructionError> {
    if passes == 0 {
        return Err(ConstructionError::InvalidPasses);
    }
    Ok(passes)
}

pub(crate) fn ensure_len(
    field: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), ConstructionError> {
    if expected != actual {
        return Err(ConstructionError::AxisCountMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Zips parallel start/end/step/offset vectors into axis definitions.
pub(crate) fn zip_axes(
    start: &[f64],
    end: &[f64],
    steps: &[Step],
    offsets: Option<&[f64]>,
) -> Result<Vec<AxisSpec>, ConstructionError> {
    ensure_len("end", start.len(), end.len())?;
    ensure_len("steps", start.len(), steps.len())?;
    if let Some(offsets) = offsets {
        ensure_len("offsets", start.len(), offsets.len())?;
    }
    Ok((0..start.len())
        .map(|i| AxisSpec {
            start: start[i],
            end: end[i],
            step: steps[i],
            offset: offsets.map_or(0.0, |offsets| offsets[i]),
        })
        .collect())
}

/// Step taken by the odometer: which axis moved and in which direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Advance {
    pub axis: usize,
    pub direction: f64,
}

/// Nested-loop traversal state kept as explicit arrays.
///
/// Axis 0 is the outermost loop. `index[a]` counts the steps axis `a` took in
/// its current loop; `direction[a]` flips every time that loop completes.
/// Raster traversals ignore the direction and reset inner axes instead.
#[derive(Clone, Debug)]
pub(crate) struct Odometer {
    n_steps: Vec<usize>,
    index: Vec<usize>,
    direction: Vec<f64>,
}

impl Odometer {
    pub(crate) fn new(n_steps: Vec<usize>) -> Self {
        let n_axis = n_steps.len();
        Self {
            n_steps,
            index: vec![0; n_axis],
            direction: vec![1.0; n_axis],
        }
    }

    /// Moves the innermost axis that still has steps left. Every axis inside
    /// it has just completed its loop. Returns `None` when the pass is over.
    pub(crate) fn advance(&mut self) -> Option<Advance> {
        let axis = (0..self.n_steps.len())
            .rev()
            .find(|&axis| self.index[axis] < self.n_steps[axis])?;
        self.index[axis] += 1;
        for inner in axis + 1..self.n_steps.len() {
            self.complete_loop(inner);
        }
        Some(Advance {
            axis,
            direction: self.direction[axis],
        })
    }

    /// Closes the loops of all axes at the end of a pass.
    pub(crate) fn finish_pass(&mut self) {
        for axis in 0..self.n_steps.len() {
            self.complete_loop(axis);
        }
    }

    fn complete_loop(&mut self, axis: usize) {
        self.index[axis] = 0;
        self.direction[axis] = -self.direction[axis];
    }
}

/// Positions visited by one raster pass over axes taking `n_steps`, start included.
///
/// `None` when the count does not fit in a `usize`.
pub(crate) fn points_per_pass(n_steps: &[usize]) -> Option<usize> {
    n_steps
        .iter()
        .try_fold(1usize, |total, n| total.checked_mul(n.checked_add(1)?))
}

/// Checks that `passes` repetitions of `per_pass` positions can be counted.
///
/// No traversal yields more than `passes * per_pass` positions, so
/// `num_positions` cannot overflow once this holds.
pub(crate) fn ensure_countable(
    passes: usize,
    per_pass: Option<usize>,
) -> Result<usize, ConstructionError> {
    per_pass
        .and_then(|per_pass| per_pass.checked_mul(passes))
        .ok_or(ConstructionError::TooManyPositions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_step_tags_rejected() {
        let axes = vec![
            AxisSpec::new(0.0, 1.0, Step::Count(2)),
            AxisSpec::new(0.0, 1.0, Step::Size(0.5)),
        ];
        assert_eq!(resolve_axes(&axes), Err(ConstructionError::MixedStepTags));
    }

    #[test]
    fn test_step_size_floors_step_count() {
        let axes = vec![AxisSpec::new(0.0, 1.0, Step::Size(0.3))];
        let resolved = resolve_axes(&axes).unwrap();
        assert_eq!(resolved[0].n_steps, 3);
        assert_eq!(resolved[0].step_size, 0.3);
    }

    #[test]
    fn test_offset_applied_to_start_and_end() {
        let axes = vec![AxisSpec::new(0.0, 4.0, Step::Count(2)).with_offset(10.0)];
        let resolved = resolve_axes(&axes).unwrap();
        assert_eq!(resolved[0].start, 10.0);
        assert_eq!(resolved[0].end, 14.0);
        assert_eq!(resolved[0].step_size, 2.0);
    }

    #[test]
    fn test_invalid_steps_rejected() {
        let zero = vec![AxisSpec::new(0.0, 1.0, Step::Count(0))];
        assert_eq!(resolve_axes(&zero), Err(ConstructionError::InvalidStepCount));

        let negative = vec![AxisSpec::new(0.0, 1.0, Step::Size(-0.1))];
        assert_eq!(
            resolve_axes(&negative),
            Err(ConstructionError::InvalidStepSize(-0.1))
        );
    }

    #[test]
    fn test_zip_axes_length_mismatch() {
        let err = zip_axes(&[0.0, 0.0], &[1.0], &[Step::Count(1)], None).unwrap_err();
        assert_eq!(
            err,
            ConstructionError::AxisCountMismatch {
                field: "end",
                expected: 2,
                actual: 1
            }
        );

        let err = zip_axes(&[0.0], &[1.0], &[Step::Count(1)], Some(&[1.0, 2.0])).unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::AxisCountMismatch { field: "offsets", .. }
        ));
    }

    #[test]
    fn test_step_serde_is_tagged() {
        let step: Step = serde_json::from_str(r#"{"count": 5}"#).unwrap();
        assert_eq!(step, Step::Count(5));
        let step: Step = serde_json::from_str(r#"{"size": 5.0}"#).unwrap();
        assert_eq!(step, Step::Size(5.0));
    }

    #[test]
    fn test_odometer_visits_every_tuple_once() {
        let mut odometer = Odometer::new(vec![1, 2]);
        let mut moved = Vec::new();
        while let Some(advance) = odometer.advance() {
            moved.push(advance.axis);
        }
        // start + 5 moves = 2 * 3 tuples
        assert_eq!(moved, vec![1, 1, 0, 1, 1]);
        assert_eq!(points_per_pass(&[1, 2]), Some(6));
    }

    #[test]
    fn test_uncountable_sequences_rejected() {
        assert_eq!(points_per_pass(&[usize::MAX]), None);
        assert_eq!(points_per_pass(&[1 << 40, 1 << 40]), None);
        assert_eq!(
            ensure_countable(usize::MAX, Some(2)),
            Err(ConstructionError::TooManyPositions)
        );
        assert_eq!(ensure_countable(3, Some(4)), Ok(12));
    }
}
