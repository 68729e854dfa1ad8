//! Fusion core
//!
//! Drives the signal sources once per tick and commits a table update only when
//! a complete scan is available:
//! - Track transport (per-corner tracks or the enhanced object): a cycle
//!   commits on the tick the trigger message arrives, so the extraction pass
//!   never mixes frames from two scans.
//! - Basic object only: a cycle commits every fifth tick.
//!
//! Every committed cycle emits the full table plus a bus-error flag; every
//! other tick emits nothing.

use crate::config::{CapabilityFlags, FusionConfig};
use crate::extract::{BasicExtractor, EnhancedExtractor, Extractor, TrackExtractor};
use crate::mode::{track_addresses, RadarMode, Resolution, ESCC_ADDR};
use crate::point_table::PointTable;
use crate::signals::SignalDatabase;
use crate::source::{CanSignalSource, MessageSubscription, SignalSource};
use crate::types::{CanFrame, RadarData, RadarErrors, Result};
use std::collections::HashSet;

/// Basic-object commits happen on every Nth tick
pub const BASIC_COMMIT_INTERVAL: u64 = 5;

/// Message IDs that changed since the last commit, per source
#[derive(Debug, Default)]
pub struct CycleAccumulator {
    pub tracks: HashSet<u32>,
    pub forward: HashSet<u32>,
}

impl CycleAccumulator {
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.forward.clear();
    }
}

pub struct FusionCore {
    resolution: Resolution,
    table: PointTable,
    /// Per-object tracks, or the enhanced object riding the same transport
    track_source: Option<Box<dyn SignalSource>>,
    /// Cruise-controller object
    forward_source: Option<Box<dyn SignalSource>>,
    track_extractor: Option<Box<dyn Extractor>>,
    forward_extractor: Option<BasicExtractor>,
    pending: CycleAccumulator,
    radar_unavailable: bool,
    frame: u64,
}

impl FusionCore {
    /// Build a core around already constructed sources
    ///
    /// The track source is only kept when the resolved mode commits through the
    /// track transport. Fails if a source lacks a signal its extractor needs.
    pub fn with_sources(
        flags: &CapabilityFlags,
        resolution: Resolution,
        track_source: Option<Box<dyn SignalSource>>,
        forward_source: Option<Box<dyn SignalSource>>,
    ) -> Result<Self> {
        let track_source = track_source.filter(|_| resolution.uses_track_transport());

        let track_extractor: Option<Box<dyn Extractor>> = match (&track_source, resolution.mode) {
            (Some(source), RadarMode::Track) => {
                Some(Box::new(TrackExtractor::new(&resolution, &**source)?) as Box<dyn Extractor>)
            }
            (Some(source), RadarMode::EnhancedSingle) => {
                Some(Box::new(EnhancedExtractor::new(&**source)?) as Box<dyn Extractor>)
            }
            _ => None,
        };

        let forward_extractor = match &forward_source {
            Some(source) => Some(BasicExtractor::new(&resolution, &**source)?),
            None => None,
        };

        let core = Self {
            table: PointTable::new(resolution.track_count()),
            resolution,
            track_source,
            forward_source,
            track_extractor,
            forward_extractor,
            pending: CycleAccumulator::default(),
            radar_unavailable: flags.radar_unavailable,
            frame: 0,
        };

        if flags.radar_unavailable {
            log::warn!("Radar marked unavailable, no points will be reported");
        } else if !core.is_active() {
            log::warn!(
                "No source can commit in {:?} mode, no points will be reported",
                core.resolution.mode
            );
        }

        Ok(core)
    }

    /// Build a core whose sources decode frames with the layouts in `db`
    ///
    /// Track mode is only selected when every per-object message is defined.
    /// A source whose message is missing from the database is left out.
    pub fn from_database(config: &FusionConfig, db: &SignalDatabase) -> Result<Self> {
        let flags = &config.capabilities;
        let rates = &config.rates;
        let track_dbc_available = db.contains_all(track_addresses(flags));
        let resolution = Resolution::resolve(flags, track_dbc_available);

        let track_source = match resolution.mode {
            RadarMode::Track => {
                let subs: Vec<MessageSubscription> = resolution
                    .addresses()
                    .map(|address| MessageSubscription::new(address, rates.track_hz))
                    .collect();
                Some(boxed(CanSignalSource::new(db, config.buses.track, &subs)?))
            }
            RadarMode::EnhancedSingle => {
                let subs = [MessageSubscription::new(ESCC_ADDR, rates.single_object_hz)];
                optional_source(CanSignalSource::new(db, config.buses.escc, &subs))
            }
            RadarMode::BasicSingle => None,
        };

        let subs = [MessageSubscription::new(resolution.scc_addr(), rates.single_object_hz)];
        let forward_source = optional_source(CanSignalSource::new(db, config.buses.forward, &subs));

        Self::with_sources(flags, resolution, track_source, forward_source)
    }

    /// Feed one batch of frames
    ///
    /// Returns the full table when this tick committed a cycle, `None` otherwise.
    pub fn update(&mut self, frames: &[CanFrame], v_ego: f64) -> Option<RadarData> {
        self.frame += 1;
        if !self.is_active() {
            return None;
        }

        if let Some(data) = self.tick_forward(frames, v_ego) {
            return Some(data);
        }
        self.tick_tracks(frames, v_ego)
    }

    fn tick_forward(&mut self, frames: &[CanFrame], v_ego: f64) -> Option<RadarData> {
        let forward = self.forward_source.as_mut()?;
        self.pending.forward.extend(forward.update(frames));

        if self.resolution.uses_track_transport() || self.frame % BASIC_COMMIT_INTERVAL != 0 {
            return None;
        }

        if let Some(extractor) = self.forward_extractor.as_mut() {
            extractor.extract(&**forward, &mut self.table, v_ego);
        }
        let can_error = !forward.can_valid();
        self.pending.forward.clear();
        Some(self.emit(can_error, v_ego))
    }

    fn tick_tracks(&mut self, frames: &[CanFrame], v_ego: f64) -> Option<RadarData> {
        let track = self.track_source.as_mut()?;
        self.pending.tracks.extend(track.update(frames));

        if !self.pending.tracks.contains(&self.resolution.trigger) {
            return None;
        }
        log::trace!(
            "Trigger 0x{:X} after {} messages",
            self.resolution.trigger,
            self.pending.tracks.len()
        );

        if let Some(extractor) = self.track_extractor.as_mut() {
            extractor.extract(&**track, &mut self.table, v_ego);
        }
        let can_error = !track.can_valid();

        // The forward object uses whatever arrived since the previous commit
        if let (Some(source), Some(extractor)) = (self.forward_source.as_deref(), self.forward_extractor.as_mut()) {
            extractor.extract(source, &mut self.table, v_ego);
        }

        self.pending.clear();
        Some(self.emit(can_error, v_ego))
    }

    fn emit(&mut self, can_error: bool, v_ego: f64) -> RadarData {
        // Entries no extractor owns still follow the current ego speed
        self.table.refresh_cleared(v_ego);
        if can_error {
            log::debug!("Committed cycle with invalid CAN bus");
        }
        RadarData {
            points: self.table.snapshot(),
            errors: RadarErrors { can_error },
        }
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn mode(&self) -> RadarMode {
        self.resolution.mode
    }

    pub fn table(&self) -> &PointTable {
        &self.table
    }

    /// Message IDs accumulated since the last commit
    pub fn pending(&self) -> &CycleAccumulator {
        &self.pending
    }

    /// Number of ticks fed so far
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// False when the core will never emit
    pub fn is_active(&self) -> bool {
        // Only the source driving this mode's commits can make it emit
        let committing = if self.resolution.uses_track_transport() {
            self.track_source.is_some()
        } else {
            self.forward_source.is_some()
        };
        !self.radar_unavailable && committing
    }
}

fn boxed(source: CanSignalSource) -> Box<dyn SignalSource> {
    Box::new(source)
}

fn optional_source(result: Result<CanSignalSource>) -> Option<Box<dyn SignalSource>> {
    match result {
        Ok(source) => Some(boxed(source)),
        Err(e) => {
            log::warn!("Signal source unavailable: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSignalSource;
    use crate::mode::{ESCC_TID, SCC11_ADDR, SCC_TID};

    fn flags(radar_tracks: bool, enhanced_scc: bool) -> CapabilityFlags {
        CapabilityFlags {
            radar_tracks,
            enhanced_scc,
            ..CapabilityFlags::default()
        }
    }

    fn frames(ids: impl IntoIterator<Item = u32>) -> Vec<CanFrame> {
        ids.into_iter().map(MockSignalSource::frame).collect()
    }

    fn track_core() -> (FusionCore, MockSignalSource, MockSignalSource) {
        let flags = flags(true, false);
        let res = Resolution::resolve(&flags, true);
        let tracks = MockSignalSource::for_tracks(&res);
        let forward = MockSignalSource::for_single_object(&res);
        let core = FusionCore::with_sources(
            &flags,
            res,
            Some(Box::new(tracks.clone())),
            Some(Box::new(forward.clone())),
        )
        .unwrap();
        (core, tracks, forward)
    }

    fn assert_cleared_invariant(data: &RadarData, v_ego: f64) {
        for point in data.points.iter().filter(|p| !p.measured) {
            assert!(point.is_cleared(v_ego), "point {} not cleared", point.track_id);
        }
    }

    #[test]
    fn test_trigger_atomicity() {
        let (mut core, tracks, _) = track_core();

        // First half of a scan
        for address in 0x500..0x510 {
            tracks.set_signals(address, &[("STATE", 3.0), ("LONG_DIST", 20.0)]);
        }
        assert!(core.update(&frames(0x500..0x510), 10.0).is_none());
        assert_eq!(core.pending().tracks.len(), 16);

        // Second half, ending with the trigger
        for address in 0x510..0x520 {
            tracks.set_signals(address, &[("STATE", 4.0), ("LONG_DIST", 30.0)]);
        }
        let data = core.update(&frames(0x510..0x520), 10.0).unwrap();
        assert!(core.pending().tracks.is_empty());
        assert!(core.pending().forward.is_empty());

        assert_eq!(data.measured().filter(|p| p.track_id >= 32).count(), 32);
        assert_eq!(data.point(32).unwrap().d_rel, 20.0);
        assert_eq!(data.point(63).unwrap().d_rel, 30.0);
        assert!(!data.errors.can_error);
        assert_cleared_invariant(&data, 10.0);

        // Next scan's frames alone do not emit
        tracks.set_signals(0x500, &[("LONG_DIST", 99.0)]);
        assert!(core.update(&frames([0x500]), 10.0).is_none());
        assert_eq!(core.table().get(32).unwrap().d_rel, 20.0);
    }

    #[test]
    fn test_track_mode_never_measures_enhanced_id() {
        let (mut core, _, forward) = track_core();
        forward.set_signals(SCC11_ADDR, &[("ACC_ObjStatus", 1.0), ("ACC_ObjDist", 2.0), ("ACC_ObjRelSpd", 0.5)]);

        let data = core.update(&frames([0x51F]), 5.0).unwrap();
        assert!(data.point(SCC_TID).unwrap().measured);
        assert!(!data.point(ESCC_TID).unwrap().measured);
        assert_cleared_invariant(&data, 5.0);
    }

    #[test]
    fn test_bus_error_surfaces() {
        let (mut core, tracks, forward) = track_core();
        tracks.set_can_valid(false);
        let data = core.update(&frames([0x51F]), 0.0).unwrap();
        assert!(data.errors.can_error);

        // Only the source whose commit ran is consulted
        tracks.set_can_valid(true);
        forward.set_can_valid(false);
        let data = core.update(&frames([0x51F]), 0.0).unwrap();
        assert!(!data.errors.can_error);
    }

    #[test]
    fn test_basic_mode_commits_every_fifth_tick() {
        let flags = flags(false, false);
        let res = Resolution::resolve(&flags, false);
        let forward = MockSignalSource::for_single_object(&res);
        let mut core = FusionCore::with_sources(&flags, res, None, Some(Box::new(forward.clone()))).unwrap();
        forward.set_signals(SCC11_ADDR, &[("ACC_ObjStatus", 1.0), ("ACC_ObjDist", 2.5), ("ACC_ObjRelSpd", 0.0)]);

        let mut emitted = Vec::new();
        for tick in 1..=10u64 {
            if let Some(data) = core.update(&frames([SCC11_ADDR]), 3.0) {
                emitted.push(tick);
                assert_eq!(data.points.len(), 34);
                assert_cleared_invariant(&data, 3.0);
            }
            if tick == 4 {
                assert!(core.pending().forward.contains(&SCC11_ADDR));
            }
        }
        assert_eq!(emitted, vec![5, 10]);
        assert!(core.table().get(SCC_TID).unwrap().measured);

        forward.set_can_valid(false);
        let data = (0..5).find_map(|_| core.update(&[], 3.0)).unwrap();
        assert!(data.errors.can_error);
    }

    #[test]
    fn test_basic_mode_ignores_track_source() {
        let flags = flags(false, false);
        let res = Resolution::resolve(&flags, true);
        let tracks = MockSignalSource::for_tracks(&res);
        let mut core = FusionCore::with_sources(&flags, res, Some(Box::new(tracks)), None).unwrap();
        assert!(!core.is_active());
        for _ in 0..10 {
            assert!(core.update(&frames([0x51F]), 0.0).is_none());
        }
    }

    #[test]
    fn test_enhanced_mode_uses_escc_trigger() {
        let flags = flags(true, true);
        let res = Resolution::resolve(&flags, false);
        let escc = MockSignalSource::for_enhanced();
        let forward = MockSignalSource::for_single_object(&res);
        let mut core = FusionCore::with_sources(
            &flags,
            res,
            Some(Box::new(escc.clone())),
            Some(Box::new(forward.clone())),
        )
        .unwrap();
        assert_eq!(core.mode(), RadarMode::EnhancedSingle);

        escc.set_signals(ESCC_ADDR, &[("ACC_ObjStatus", 1.0), ("ACC_ObjDist", 60.0), ("ACC_ObjLatPos", -0.4), ("ACC_ObjRelSpd", 1.0)]);

        // Five ticks without the trigger never commit in this mode
        for _ in 0..5 {
            assert!(core.update(&frames([SCC11_ADDR]), 20.0).is_none());
        }

        let data = core.update(&frames([ESCC_ADDR]), 20.0).unwrap();
        let p = data.point(ESCC_TID).unwrap();
        assert!(p.measured);
        assert_eq!(p.y_rel, 0.4);
        assert_eq!(p.v_lead, 21.0);
        assert!(data.measured().all(|p| p.track_id < 32));
        assert_cleared_invariant(&data, 20.0);
    }

    #[test]
    fn test_radar_unavailable() {
        let mut flags = flags(true, false);
        flags.radar_unavailable = true;
        let res = Resolution::resolve(&flags, true);
        let tracks = MockSignalSource::for_tracks(&res);
        let mut core = FusionCore::with_sources(&flags, res, Some(Box::new(tracks)), None).unwrap();
        assert!(!core.is_active());
        assert!(core.update(&frames([0x51F]), 0.0).is_none());
        assert_eq!(core.frame_count(), 1);
    }

    #[test]
    fn test_enhanced_without_escc_is_inactive() {
        let flags = flags(false, true);
        let res = Resolution::resolve(&flags, false);
        let forward = MockSignalSource::for_single_object(&res);
        forward.set_signals(SCC11_ADDR, &[("ACC_ObjStatus", 1.0), ("ACC_ObjDist", 40.0)]);
        let mut core = FusionCore::with_sources(&flags, res, None, Some(Box::new(forward))).unwrap();

        assert_eq!(core.mode(), RadarMode::EnhancedSingle);
        assert!(!core.is_active());
        for _ in 0..10 {
            assert!(core.update(&frames([SCC11_ADDR, ESCC_ADDR]), 0.0).is_none());
        }
    }

    #[test]
    fn test_no_sources() {
        let flags = flags(false, false);
        let res = Resolution::resolve(&flags, false);
        let mut core = FusionCore::with_sources(&flags, res, None, None).unwrap();
        assert!(!core.is_active());
        for _ in 0..10 {
            assert!(core.update(&frames([SCC11_ADDR]), 0.0).is_none());
        }
    }
}
