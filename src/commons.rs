use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Number of cores in the canonical configuration.
pub const NUM_CORES: usize = 4;

// system specs

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Protocol {
    Mesi,
    Dragon,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Mesi => write!(f, "MESI"),
            Protocol::Dragon => write!(f, "Dragon"),
        }
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mesi" => Ok(Protocol::Mesi),
            "dragon" => Ok(Protocol::Dragon),
            _ => Err(ConfigError::UnknownProtocol(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SystemSpec {
    pub protocol: Protocol,
    pub word_size: u32,       // bytes
    pub address_size: u32,    // bytes
    pub mem_lat: u64,         // cpu cycles
    pub bus_word_tf_lat: u64, // cpu cycles
    pub block_size: u32,      // bytes
    pub cache_size: u32,      // bytes
    pub cache_assoc: u32,     // blocks
}

impl Default for SystemSpec {
    fn default() -> Self {
        SystemSpec {
            protocol: Protocol::Mesi,
            word_size: 4,
            address_size: 4,
            mem_lat: 100,
            bus_word_tf_lat: 2,
            block_size: 32,
            cache_size: 4096,
            cache_assoc: 2,
        }
    }
}

impl SystemSpec {
    /// Check the cache geometry before any simulation state is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_size == 0 {
            return Err(ConfigError::NonPositive("cache size"));
        }
        if self.cache_assoc == 0 {
            return Err(ConfigError::NonPositive("associativity"));
        }
        if self.block_size == 0 {
            return Err(ConfigError::NonPositive("block size"));
        }
        if self.word_size == 0 {
            return Err(ConfigError::NonPositive("word size"));
        }
        if self.cache_size % (self.cache_assoc * self.block_size) != 0 {
            return Err(ConfigError::IndivisibleGeometry {
                cache_size: self.cache_size,
                assoc: self.cache_assoc,
                block_size: self.block_size,
            });
        }
        Ok(())
    }

    pub fn num_sets(&self) -> u32 {
        self.cache_size / (self.cache_assoc * self.block_size)
    }

    pub fn words_per_block(&self) -> u64 {
        (self.block_size / self.word_size) as u64
    }

    // timing

    /// Sending a cache block with N words over the bus takes 2N cycles.
    pub fn t_cache_to_cache_transfer(&self) -> u64 {
        self.bus_word_tf_lat * self.words_per_block()
    }

    /// Updating peers with a single word takes one word-transfer slot.
    pub fn t_word_update(&self) -> u64 {
        self.bus_word_tf_lat
    }

    pub fn t_mem_fetch(&self) -> u64 {
        self.mem_lat
    }

    /// Writing a dirty block back to memory on eviction.
    pub fn t_flush(&self) -> u64 {
        self.mem_lat
    }
}

// addresses

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Addr(pub u32);

impl Addr {
    /// Returns the set index and tag of the address under the given system specs.
    pub fn pos(&self, specs: &SystemSpec) -> (usize, u32) {
        let block_addr = self.0 / specs.block_size;
        let num_sets = specs.num_sets();
        let index = block_addr % num_sets;
        let tag = block_addr / num_sets;
        (index as usize, tag)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
