use log::trace;

use crate::commons::{Addr, SystemSpec};
use crate::error::{SimResult, SimulatorError};
use crate::protocol::{AccessClass, BusSignal, LineState, SnoopSummary};

// cache lines and sets

#[derive(Clone, Debug)]
pub struct CacheLine {
    pub tag: u32,
    pub valid: bool,
    pub dirty: bool,
    pub state: LineState,
    /// Stamp of the last processor access; recency order within a set.
    pub lru: u64,
}

#[derive(Debug)]
struct CacheSet {
    lines: Vec<CacheLine>,
}

impl CacheSet {
    fn new(assoc: u32, state: LineState) -> Self {
        CacheSet {
            lines: vec![
                CacheLine {
                    tag: 0,
                    valid: false,
                    dirty: false,
                    state,
                    lru: 0,
                };
                assoc as usize
            ],
        }
    }

    /// Way holding `tag` as a valid line, if any. A second valid line with
    /// the same tag would mean the allocation path is broken.
    fn find(&self, tag: u32) -> SimResult<Option<usize>> {
        let mut found = None;
        for (way, line) in self.lines.iter().enumerate() {
            if line.valid && line.tag == tag {
                if found.is_some() {
                    return Err(SimulatorError::Invariant(format!(
                        "tag {tag:#x} held by two valid lines of one set"
                    )));
                }
                found = Some(way);
            }
        }
        Ok(found)
    }

    /// First invalid way, else the least recently used one. Equal stamps only
    /// happen at startup and resolve to the lowest way index.
    fn victim(&self) -> SimResult<usize> {
        if let Some(way) = self.lines.iter().position(|l| !l.valid) {
            return Ok(way);
        }
        self.lines
            .iter()
            .enumerate()
            .min_by_key(|(_, l)| l.lru)
            .map(|(way, _)| way)
            .ok_or_else(|| SimulatorError::Invariant("victim selection in an empty set".into()))
    }
}

// cache

/// Result of a serviced access, as seen by the driver.
#[derive(Clone, Copy, Debug)]
pub struct AccessOutcome {
    pub hit: bool,
    pub class: AccessClass,
}

/// An access that needs a bus transaction before it can complete.
#[derive(Clone, Copy, Debug)]
pub struct PendingAccess {
    pub is_write: bool,
    pub hit: bool,
    /// A dirty victim must be written back before the fill.
    pub writeback: bool,
    pub signal: BusSignal,
    way: usize,
}

#[derive(Clone, Copy, Debug)]
pub enum AccessPhase {
    /// Resolved within the cache; one-cycle hit.
    Done(AccessOutcome),
    Pending(PendingAccess),
}

/// Completed second phase of a pending access.
#[derive(Clone, Copy, Debug)]
pub struct FinishedAccess {
    pub outcome: AccessOutcome,
    /// Transaction to put on the bus after the fill (Dragon word update).
    pub follow_up: Option<BusSignal>,
}

/// One core's private L1: set-associative, LRU replacement, write-back and
/// write-allocate. Holds no bus reference; the driver routes bus traffic.
pub struct Cache {
    id: usize,
    specs: SystemSpec,
    sets: Vec<CacheSet>,
    access_clock: u64,
}

impl Cache {
    pub fn new(id: usize, specs: SystemSpec) -> Self {
        let state = specs.protocol.initial_state();
        Cache {
            id,
            specs,
            sets: (0..specs.num_sets())
                .map(|_| CacheSet::new(specs.cache_assoc, state))
                .collect(),
            access_clock: 0,
        }
    }

    /// First phase of a processor access: hit/miss classification, victim
    /// selection and tentative allocation. Accesses that need the bus come
    /// back as [`AccessPhase::Pending`] and are completed by
    /// [`finish_access`](Self::finish_access) once the snoop outcome is known.
    pub fn begin_access(&mut self, is_write: bool, addr: Addr) -> SimResult<AccessPhase> {
        self.access_clock += 1;
        let (set_idx, tag) = addr.pos(&self.specs);
        let protocol = self.specs.protocol;
        let set = &mut self.sets[set_idx];

        if let Some(way) = set.find(tag)? {
            let line = &mut set.lines[way];
            line.lru = self.access_clock;
            return match protocol.bus_request(is_write, line, addr)? {
                None => {
                    let class = protocol.classify(line)?;
                    protocol.on_processor_event(is_write, line, addr, None)?;
                    Ok(AccessPhase::Done(AccessOutcome { hit: true, class }))
                }
                Some(signal) => Ok(AccessPhase::Pending(PendingAccess {
                    is_write,
                    hit: true,
                    writeback: false,
                    signal,
                    way,
                })),
            };
        }

        let way = set.victim()?;
        let line = &mut set.lines[way];
        let writeback = line.valid && line.dirty;
        trace!(
            "cache {}: miss on {addr}, victim way {way} (writeback: {writeback})",
            self.id
        );

        // tentative allocation; the line turns valid once the fill completes
        line.tag = tag;
        line.valid = false;
        line.dirty = false;
        line.state = protocol.initial_state();
        line.lru = self.access_clock;

        let signal = protocol.bus_request(is_write, line, addr)?.ok_or_else(|| {
            SimulatorError::Invariant("miss requested no bus transaction".into())
        })?;
        Ok(AccessPhase::Pending(PendingAccess {
            is_write,
            hit: false,
            writeback,
            signal,
            way,
        }))
    }

    /// Second phase: commit the protocol transition with the snoop outcome of
    /// the pending transaction, and validate the line on the fill path.
    pub fn finish_access(
        &mut self,
        pending: &PendingAccess,
        snoop: &SnoopSummary,
    ) -> SimResult<FinishedAccess> {
        let addr = pending.signal.addr();
        let (set_idx, tag) = addr.pos(&self.specs);
        let protocol = self.specs.protocol;
        let line = &mut self.sets[set_idx].lines[pending.way];
        if line.tag != tag {
            return Err(SimulatorError::Invariant(format!(
                "pending access to {addr} found its line re-allocated"
            )));
        }

        // hits are classified by the state held at the moment of access,
        // misses by the state the fill installs
        let class_before = if pending.hit {
            Some(protocol.classify(line)?)
        } else {
            None
        };
        let commit =
            protocol.on_processor_event(pending.is_write, line, addr, Some(snoop.shared))?;
        if !pending.hit {
            line.valid = true;
        }
        let class = match class_before {
            Some(class) => class,
            None => protocol.classify(line)?,
        };

        Ok(FinishedAccess {
            outcome: AccessOutcome {
                hit: pending.hit,
                class,
            },
            follow_up: commit.follow_up,
        })
    }

    /// Observe a peer's bus transaction. An absent or invalid line is not a
    /// sharer and contributes nothing.
    pub fn snoop(&mut self, signal: BusSignal) -> SimResult<crate::protocol::SnoopReply> {
        let (set_idx, tag) = signal.addr().pos(&self.specs);
        let set = &mut self.sets[set_idx];
        match set.find(tag)? {
            None => Ok(Default::default()),
            Some(way) => {
                let reply = self
                    .specs
                    .protocol
                    .on_snoop_event(signal, &mut set.lines[way])?;
                trace!(
                    "cache {}: snooped {signal:?}, sharer: {}, supplied: {}",
                    self.id,
                    reply.sharer,
                    reply.supplied
                );
                Ok(reply)
            }
        }
    }

    /// The valid line holding `addr`, if present.
    pub fn probe(&self, addr: Addr) -> Option<&CacheLine> {
        let (set_idx, tag) = addr.pos(&self.specs);
        self.sets[set_idx]
            .lines
            .iter()
            .find(|l| l.valid && l.tag == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesi::MesiState;

    fn one_set_specs() -> SystemSpec {
        // 64 B / (2 * 32 B) = 1 set, two ways
        SystemSpec {
            cache_size: 64,
            cache_assoc: 2,
            ..Default::default()
        }
    }

    fn fill(cache: &mut Cache, is_write: bool, addr: Addr, shared: bool) -> FinishedAccess {
        match cache.begin_access(is_write, addr).unwrap() {
            AccessPhase::Pending(pending) => cache
                .finish_access(
                    &pending,
                    &SnoopSummary {
                        shared,
                        supplied: false,
                    },
                )
                .unwrap(),
            AccessPhase::Done(_) => panic!("expected a pending access"),
        }
    }

    #[test]
    fn cold_miss_allocates_and_validates() {
        let mut cache = Cache::new(0, one_set_specs());
        assert!(cache.probe(Addr(0)).is_none());
        let fin = fill(&mut cache, false, Addr(0), false);
        assert!(!fin.outcome.hit);
        let line = cache.probe(Addr(0)).unwrap();
        assert!(line.valid);
        assert_eq!(line.state, LineState::Mesi(MesiState::Exclusive));
    }

    #[test]
    fn second_access_hits_silently() {
        let mut cache = Cache::new(0, one_set_specs());
        fill(&mut cache, false, Addr(0), false);
        match cache.begin_access(false, Addr(0)).unwrap() {
            AccessPhase::Done(outcome) => assert!(outcome.hit),
            AccessPhase::Pending(_) => panic!("hit should not need the bus"),
        }
    }

    #[test]
    fn lru_victim_is_the_stalest_way() {
        let mut cache = Cache::new(0, one_set_specs());
        // 1 set: blocks 0x0, 0x40, 0x80 all collide
        fill(&mut cache, false, Addr(0x0), false);
        fill(&mut cache, false, Addr(0x40), false);
        // touch 0x0 so 0x40 becomes LRU
        cache.begin_access(false, Addr(0x0)).unwrap();
        fill(&mut cache, false, Addr(0x80), false);
        assert!(cache.probe(Addr(0x0)).is_some());
        assert!(cache.probe(Addr(0x40)).is_none());
        assert!(cache.probe(Addr(0x80)).is_some());
    }

    #[test]
    fn dirty_victim_forces_writeback() {
        let mut cache = Cache::new(
            0,
            SystemSpec {
                cache_size: 32,
                cache_assoc: 1,
                ..Default::default()
            },
        );
        fill(&mut cache, true, Addr(0x0), false);
        match cache.begin_access(false, Addr(0x40)).unwrap() {
            AccessPhase::Pending(pending) => assert!(pending.writeback),
            AccessPhase::Done(_) => panic!("conflict miss expected"),
        }
    }

    #[test]
    fn clean_victim_evicts_without_writeback() {
        let mut cache = Cache::new(
            0,
            SystemSpec {
                cache_size: 32,
                cache_assoc: 1,
                ..Default::default()
            },
        );
        fill(&mut cache, false, Addr(0x0), false);
        match cache.begin_access(false, Addr(0x40)).unwrap() {
            AccessPhase::Pending(pending) => assert!(!pending.writeback),
            AccessPhase::Done(_) => panic!("conflict miss expected"),
        }
    }

    #[test]
    fn startup_tie_breaks_to_way_zero() {
        let cache = Cache::new(0, one_set_specs());
        assert_eq!(cache.sets[0].victim().unwrap(), 0);
    }

    #[test]
    fn snoop_on_absent_line_is_not_a_sharer() {
        let mut cache = Cache::new(0, one_set_specs());
        let reply = cache.snoop(BusSignal::BusRd(Addr(0x1000))).unwrap();
        assert!(!reply.sharer && !reply.supplied);
    }
}
