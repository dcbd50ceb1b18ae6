use crate::cache::CacheLine;
use crate::commons::{Addr, Protocol};
use crate::dragon::{self, DragonState};
use crate::error::SimResult;
use crate::mesi::{self, MesiState};

// bus signals

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BusSignal {
    BusRd(Addr),
    BusRdX(Addr),
    BusUpgr(Addr),
    BusUpd(Addr),
}

impl BusSignal {
    pub fn addr(&self) -> Addr {
        match *self {
            BusSignal::BusRd(addr)
            | BusSignal::BusRdX(addr)
            | BusSignal::BusUpgr(addr)
            | BusSignal::BusUpd(addr) => addr,
        }
    }
}

// line states

/// Coherence state of one cache line, tagged by protocol. An invalid line
/// carries a state slot too, but it is meaningless until the line is filled.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LineState {
    Mesi(MesiState),
    Dragon(DragonState),
}

// protocol outcomes

/// How a peer cache answered a snooped bus signal.
#[derive(Clone, Copy, Default, Debug)]
pub struct SnoopReply {
    /// The line is still a valid sharer after the snoop.
    pub sharer: bool,
    /// The peer supplies the block (it was the owner of dirty data).
    pub supplied: bool,
}

/// Snoop replies of all peers, folded into what the issuer needs to know.
#[derive(Clone, Copy, Default, Debug)]
pub struct SnoopSummary {
    pub shared: bool,
    pub supplied: bool,
}

impl SnoopSummary {
    pub fn fold(&mut self, reply: SnoopReply) {
        self.shared |= reply.sharer;
        self.supplied |= reply.supplied;
    }
}

/// Result of committing a processor event.
#[derive(Clone, Copy, Default, Debug)]
pub struct ProcCommit {
    /// A second transaction the issuer must put on the bus once the line is
    /// filled (Dragon distributes the written word after a write miss).
    pub follow_up: Option<BusSignal>,
}

/// Whether a line was held privately or shared with peers when accessed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AccessClass {
    Private,
    Shared,
}

// dispatch

impl Protocol {
    /// State installed in a freshly allocated (still invalid) line.
    pub fn initial_state(self) -> LineState {
        match self {
            Protocol::Mesi => LineState::Mesi(MesiState::Invalid),
            // Dragon has no invalid state; absence of a valid line is the
            // invalid condition, so any member works as the placeholder.
            Protocol::Dragon => LineState::Dragon(DragonState::Exclusive),
        }
    }

    /// The bus transaction a processor event needs before its transition can
    /// commit. `None` means the event resolves silently within the cache.
    pub fn bus_request(self, is_write: bool, line: &CacheLine, addr: Addr) -> SimResult<Option<BusSignal>> {
        match self {
            Protocol::Mesi => mesi::bus_request(is_write, line, addr),
            Protocol::Dragon => dragon::bus_request(is_write, line, addr),
        }
    }

    /// Commit the state transition for a processor access. On paths that
    /// required a bus transaction, `shared_after_snoop` carries the snoop
    /// outcome; it is `None` exactly when `bus_request` returned `None`.
    ///
    /// Never touches `line.valid` on the allocate path; the cache flips it
    /// once the fill completes.
    pub fn on_processor_event(
        self,
        is_write: bool,
        line: &mut CacheLine,
        addr: Addr,
        shared_after_snoop: Option<bool>,
    ) -> SimResult<ProcCommit> {
        match self {
            Protocol::Mesi => mesi::on_processor_event(is_write, line, shared_after_snoop),
            Protocol::Dragon => dragon::on_processor_event(is_write, line, addr, shared_after_snoop),
        }
    }

    /// React to a bus signal snooped from a peer. May clear `line.valid` on
    /// an invalidating signal.
    pub fn on_snoop_event(self, signal: BusSignal, line: &mut CacheLine) -> SimResult<SnoopReply> {
        match self {
            Protocol::Mesi => mesi::on_snoop_event(signal, line),
            Protocol::Dragon => dragon::on_snoop_event(signal, line),
        }
    }

    /// Classify a valid line as privately held or shared.
    pub fn classify(self, line: &CacheLine) -> SimResult<AccessClass> {
        match self {
            Protocol::Mesi => mesi::classify(line),
            Protocol::Dragon => dragon::classify(line),
        }
    }
}
