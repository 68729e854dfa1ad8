//! Point table
//!
//! Fixed-size mapping from track identity to tracked point. The key set is
//! decided at construction and never changes; committed cycles overwrite
//! entries in place.

use crate::mode::{ESCC_TID, SCC_TID, TRACK_ID_OFFSET};
use crate::types::TrackedPoint;
use std::collections::BTreeMap;

pub struct PointTable {
    points: BTreeMap<u32, TrackedPoint>,
}

impl PointTable {
    /// Build a table with the two reserved identities and `track_count`
    /// per-object identities, all cleared
    pub fn new(track_count: u32) -> Self {
        let points = [SCC_TID, ESCC_TID]
            .into_iter()
            .chain(TRACK_ID_OFFSET..TRACK_ID_OFFSET + track_count)
            .map(|id| (id, TrackedPoint::cleared(id, 0.0)))
            .collect();
        Self { points }
    }

    pub fn get(&self, id: u32) -> Option<&TrackedPoint> {
        self.points.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut TrackedPoint> {
        self.points.get_mut(&id)
    }

    /// Overwrite an entry; identities outside the key set are ignored
    pub fn set(&mut self, id: u32, point: TrackedPoint) {
        match self.points.get_mut(&id) {
            Some(slot) => {
                *slot = TrackedPoint {
                    track_id: id,
                    ..point
                }
            }
            None => log::warn!("Ignoring write to unknown track id {}", id),
        }
    }

    /// Re-clear every unmeasured entry against the current ego speed
    pub fn refresh_cleared(&mut self, v_ego: f64) {
        for point in self.points.values_mut().filter(|p| !p.measured) {
            point.clear(v_ego);
        }
    }

    /// Every entry in ascending identity order
    pub fn snapshot(&self) -> Vec<TrackedPoint> {
        self.points.values().copied().collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.points.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
