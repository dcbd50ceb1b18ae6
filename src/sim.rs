use log::{debug, info};

use crate::bus::Bus;
use crate::cache::{AccessOutcome, AccessPhase, Cache, PendingAccess};
use crate::commons::{Addr, SystemSpec};
use crate::error::{ConfigError, SimResult, SimulatorError};
use crate::protocol::{AccessClass, BusSignal, SnoopSummary};
use crate::stats::{Report, Stats};
use crate::trace::{Instr, Instructions};

/// Cycles a hit costs with no bus involvement.
pub const CYCLE_HIT: u64 = 1;

/// Duration of an address-only upgrade broadcast.
const CYCLE_BUS_UPGR: u64 = 1;

struct Core {
    trace: Instructions,
    ready_at: u64,
}

/// Discrete-event driver. Owns the caches, the bus and the per-core clocks,
/// and routes every cache-to-bus and bus-to-cache call so neither side holds
/// a reference to the other.
pub struct Simulator {
    specs: SystemSpec,
    caches: Vec<Cache>,
    bus: Bus,
    cores: Vec<Core>,
    stats: Stats,
}

impl Simulator {
    pub fn new(specs: SystemSpec, traces: Vec<Instructions>) -> SimResult<Self> {
        specs.validate()?;
        if traces.is_empty() {
            return Err(ConfigError::NonPositive("core count").into());
        }
        let num_cores = traces.len();
        Ok(Simulator {
            specs,
            caches: (0..num_cores).map(|id| Cache::new(id, specs)).collect(),
            bus: Bus::new(),
            cores: traces
                .into_iter()
                .map(|trace| Core { trace, ready_at: 0 })
                .collect(),
            stats: Stats::new(num_cores),
        })
    }

    /// Run every trace to completion and report the counters.
    pub fn run(&mut self) -> SimResult<Report> {
        info!(
            "simulating {} cores under {}: {} B cache, {}-way, {} B blocks",
            self.cores.len(),
            self.specs.protocol,
            self.specs.cache_size,
            self.specs.cache_assoc,
            self.specs.block_size
        );

        loop {
            // fold pending compute records into each core's clock; this also
            // absorbs compute records trailing the last memory operation
            for (i, core) in self.cores.iter_mut().enumerate() {
                while let Some(&Instr::Other(cycles)) = core.trace.front() {
                    core.trace.pop_front();
                    core.ready_at += cycles;
                    self.stats.core_mut(i).compute_cycles += cycles;
                }
            }

            // next memory operation: least ready-time, ties to the lowest id
            let Some(next) = self
                .cores
                .iter()
                .enumerate()
                .filter(|(_, core)| !core.trace.is_empty())
                .min_by_key(|(_, core)| core.ready_at)
                .map(|(i, _)| i)
            else {
                break;
            };

            let (is_write, addr) = match self.cores[next].trace.pop_front() {
                Some(Instr::Read(addr)) => {
                    self.stats.core_mut(next).loads += 1;
                    (false, addr)
                }
                Some(Instr::Write(addr)) => {
                    self.stats.core_mut(next).stores += 1;
                    (true, addr)
                }
                _ => {
                    return Err(SimulatorError::Invariant(
                        "selected core has no memory record".into(),
                    ))
                }
            };
            self.service(next, is_write, addr)?;
        }

        for (i, core) in self.cores.iter().enumerate() {
            self.stats.core_mut(i).exec_cycles = core.ready_at;
        }
        info!("all traces consumed");
        Ok(self.stats.to_report(
            &self.specs,
            self.bus.data_bytes,
            self.bus.invalidations,
            self.bus.updates,
        ))
    }

    /// Route one memory operation through the cache/protocol/bus path and
    /// charge the issuing core.
    fn service(&mut self, core: usize, is_write: bool, addr: Addr) -> SimResult<()> {
        let ready_at = self.cores[core].ready_at;
        let (outcome, extra) = match self.caches[core].begin_access(is_write, addr)? {
            AccessPhase::Done(outcome) => (outcome, 0),
            AccessPhase::Pending(pending) => self.transact(core, ready_at, &pending)?,
        };

        let stats = self.stats.core_mut(core);
        if outcome.hit {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        match outcome.class {
            AccessClass::Private => stats.private_accesses += 1,
            AccessClass::Shared => stats.shared_accesses += 1,
        }
        stats.idle_cycles += extra;
        self.cores[core].ready_at = ready_at + CYCLE_HIT + extra;
        debug!(
            "core {core}: {} {addr} ({}, {:?}) served in {} cycles",
            if is_write { "store" } else { "load" },
            if outcome.hit { "hit" } else { "miss" },
            outcome.class,
            CYCLE_HIT + extra,
        );
        Ok(())
    }

    /// Drive a pending access through the bus: write back the dirty victim,
    /// snoop the peers, charge exactly one fill duration (snoop first, then
    /// budget), and let the cache commit with the snoop outcome.
    fn transact(
        &mut self,
        core: usize,
        ready_at: u64,
        pending: &PendingAccess,
    ) -> SimResult<(AccessOutcome, u64)> {
        let mut extra = 0;
        let mut presented = ready_at;
        if pending.writeback {
            self.bus.writeback(self.specs.block_size as u64);
            extra += self.specs.t_flush();
            presented += self.specs.t_flush();
        }

        let snoop = self.broadcast(core, pending.signal)?;
        let (duration, bytes) = self.transfer_cost(&pending.signal, &snoop);
        let end = self.bus.schedule(presented, duration, bytes, &pending.signal);
        extra += end - presented;

        let fin = self.caches[core].finish_access(pending, &snoop)?;
        if let Some(update) = fin.follow_up {
            let snoop = self.broadcast(core, update)?;
            let (duration, bytes) = self.transfer_cost(&update, &snoop);
            let update_end = self.bus.schedule(end, duration, bytes, &update);
            extra += update_end - end;
        }
        Ok((fin.outcome, extra))
    }

    /// Fan a transaction out to every peer cache, in core-id order, between
    /// bus transactions.
    fn broadcast(&mut self, issuer: usize, signal: BusSignal) -> SimResult<SnoopSummary> {
        let mut summary = SnoopSummary::default();
        for peer in 0..self.caches.len() {
            if peer == issuer {
                continue;
            }
            summary.fold(self.caches[peer].snoop(signal)?);
        }
        Ok(summary)
    }

    /// Duration and billed data bytes of a transaction, given its snoop
    /// outcome.
    fn transfer_cost(&self, signal: &BusSignal, snoop: &SnoopSummary) -> (u64, u64) {
        match signal {
            // block fill: from the owning peer if one supplied, else memory
            BusSignal::BusRd(_) | BusSignal::BusRdX(_) => {
                let duration = if snoop.supplied {
                    self.specs.t_cache_to_cache_transfer()
                } else {
                    self.specs.t_mem_fetch()
                };
                (duration, self.specs.block_size as u64)
            }
            // address-only
            BusSignal::BusUpgr(_) => (CYCLE_BUS_UPGR, 0),
            // one word on the wire; the duration is paid only while a sharer
            // remains to receive it
            BusSignal::BusUpd(_) => {
                let duration = if snoop.shared {
                    self.specs.t_word_update()
                } else {
                    0
                };
                (duration, self.specs.word_size as u64)
            }
        }
    }

    pub fn cache(&self, core: usize) -> &Cache {
        &self.caches[core]
    }
}
