use std::fmt;

use serde::Serialize;

use crate::commons::SystemSpec;

#[derive(Clone, Default, Serialize, Debug)]
pub struct CoreStats {
    pub exec_cycles: u64,
    pub compute_cycles: u64,
    pub idle_cycles: u64,
    pub loads: u64,
    pub stores: u64,
    pub hits: u64,
    pub misses: u64,
    pub private_accesses: u64,
    pub shared_accesses: u64,
}

/// Per-core counters accumulated by the driver while a run is in flight.
/// Owned by the driver and threaded to whoever needs to accumulate.
#[derive(Debug)]
pub struct Stats {
    cores: Vec<CoreStats>,
}

impl Stats {
    pub fn new(num_cores: usize) -> Self {
        Stats {
            cores: vec![CoreStats::default(); num_cores],
        }
    }

    pub fn core_mut(&mut self, core: usize) -> &mut CoreStats {
        &mut self.cores[core]
    }

    pub fn core(&self, core: usize) -> &CoreStats {
        &self.cores[core]
    }

    /// Assemble the final report once every trace has been consumed.
    pub fn to_report(
        &self,
        specs: &SystemSpec,
        bus_data_bytes: u64,
        bus_invalidations: u64,
        bus_updates: u64,
    ) -> Report {
        let overall_exec_cycles = self.cores.iter().map(|c| c.exec_cycles).max().unwrap_or(0);
        Report {
            protocol: specs.protocol.to_string(),
            cache_size: specs.cache_size,
            associativity: specs.cache_assoc,
            block_size: specs.block_size,
            overall_exec_cycles,
            cores: self.cores.clone(),
            bus_data_bytes,
            bus_invalidations,
            bus_updates,
        }
    }
}

/// Final report of a simulation run: echoed configuration, aggregate bus
/// counters and the per-core breakdown.
#[derive(Clone, Serialize, Debug)]
pub struct Report {
    pub protocol: String,
    pub cache_size: u32,
    pub associativity: u32,
    pub block_size: u32,
    pub overall_exec_cycles: u64,
    pub bus_data_bytes: u64,
    pub bus_invalidations: u64,
    pub bus_updates: u64,
    pub cores: Vec<CoreStats>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Simulation Results ({} Protocol) ===", self.protocol)?;
        writeln!(
            f,
            "Configuration: {} B cache, {}-way, {} B blocks",
            self.cache_size, self.associativity, self.block_size
        )?;
        writeln!(f, "Overall Execution Cycles: {}", self.overall_exec_cycles)?;
        writeln!(f, "Bus Data Traffic (bytes): {}", self.bus_data_bytes)?;
        writeln!(f, "Invalidation Broadcasts:  {}", self.bus_invalidations)?;
        writeln!(f, "Update Broadcasts:        {}", self.bus_updates)?;
        for (i, c) in self.cores.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "Core {i}:")?;
            writeln!(f, "  Execution cycles: {}", c.exec_cycles)?;
            writeln!(f, "  Compute cycles:   {}", c.compute_cycles)?;
            writeln!(f, "  Idle cycles:      {}", c.idle_cycles)?;
            writeln!(f, "  Loads:            {}", c.loads)?;
            writeln!(f, "  Stores:           {}", c.stores)?;
            writeln!(f, "  Hits:             {}", c.hits)?;
            writeln!(f, "  Misses:           {}", c.misses)?;
            writeln!(f, "  Private accesses: {}", c.private_accesses)?;
            writeln!(f, "  Shared accesses:  {}", c.shared_accesses)?;
        }
        Ok(())
    }
}
