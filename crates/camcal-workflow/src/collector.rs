use crate::{error::WorkflowError, session::Correspondence};

/// World coordinates as entered by the operator, any of which may be missing.
pub type WorldInput = [Option<f64>; 3];

/// Operator supplied pixel to world correspondences, with the picked and marked pixels.
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceCollector {
    correspondences: Vec<Correspondence>,
    preview: Option<[f64; 2]>,
    mark: Option<[f64; 2]>,
}

impl CorrespondenceCollector {
    /// Pick the pixel of the next correspondence.
    pub fn set_preview(&mut self, pixel: [f64; 2]) {
        self.preview = Some(pixel);
    }

    /// The picked pixel, if any.
    pub fn preview(&self) -> Option<[f64; 2]> {
        self.preview
    }

    /// Show the projection of a world point.
    pub fn set_mark(&mut self, pixel: [f64; 2]) {
        self.mark = Some(pixel);
    }

    /// The marked pixel, if any.
    pub fn mark(&self) -> Option<[f64; 2]> {
        self.mark
    }

    /// Append a correspondence.
    ///
    /// # Errors
    ///
    /// Rejected, leaving the collector unchanged, unless all three world coordinates are given.
    pub fn add(
        &mut self,
        pixel: [f64; 2],
        world: WorldInput,
    ) -> Result<Correspondence, WorkflowError> {
        let [x, y, z] = world;
        let x = x.ok_or(WorkflowError::IncompleteCorrespondence("x"))?;
        let y = y.ok_or(WorkflowError::IncompleteCorrespondence("y"))?;
        let z = z.ok_or(WorkflowError::IncompleteCorrespondence("z"))?;

        let correspondence = Correspondence {
            pixel,
            world: [x, y, z],
        };
        self.correspondences.push(correspondence);
        Ok(correspondence)
    }

    /// Pair the picked pixel with `world` and clear the pick.
    pub fn record(&mut self, world: WorldInput) -> Result<Correspondence, WorkflowError> {
        let pixel = self.preview.ok_or(WorkflowError::NoPreviewPoint)?;
        let correspondence = self.add(pixel, world)?;
        self.preview = None;
        Ok(correspondence)
    }

    /// Drop the correspondences and the picked and marked pixels.
    pub fn reset(&mut self) {
        self.correspondences.clear();
        self.preview = None;
        self.mark = None;
    }

    /// The recorded correspondences in order.
    pub fn correspondences(&self) -> &[Correspondence] {
        &self.correspondences
    }

    /// Number of recorded correspondences.
    pub fn len(&self) -> usize {
        self.correspondences.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.correspondences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_uses_preview() -> Result<(), WorkflowError> {
        let mut collector = CorrespondenceCollector::default();
        assert!(matches!(
            collector.record([Some(0.0); 3]),
            Err(WorkflowError::NoPreviewPoint)
        ));

        collector.set_preview([12.0, 34.0]);
        let c = collector.record([Some(1.0), Some(2.0), Some(0.0)])?;
        assert_eq!(c.pixel, [12.0, 34.0]);
        assert_eq!(c.world, [1.0, 2.0, 0.0]);
        assert_eq!(collector.preview(), None);
        assert_eq!(collector.len(), 1);
        Ok(())
    }

    #[test]
    fn test_incomplete_world_point_is_rejected() {
        let mut collector = CorrespondenceCollector::default();
        collector.set_preview([1.0, 1.0]);
        assert!(matches!(
            collector.record([Some(1.0), None, Some(0.0)]),
            Err(WorkflowError::IncompleteCorrespondence("y"))
        ));
        assert!(collector.is_empty());
        assert_eq!(collector.preview(), Some([1.0, 1.0]));
    }

    #[test]
    fn test_reset_clears_points() -> Result<(), WorkflowError> {
        let mut collector = CorrespondenceCollector::default();
        collector.add([0.0, 0.0], [Some(0.0); 3])?;
        collector.set_preview([1.0, 1.0]);
        collector.set_mark([2.0, 2.0]);

        collector.reset();
        assert!(collector.is_empty());
        assert_eq!(collector.preview(), None);
        assert_eq!(collector.mark(), None);
        Ok(())
    }
}
