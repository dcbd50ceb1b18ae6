//! Dragon 4-state update-based protocol.
//!
//! Writes to shared lines broadcast the written word instead of invalidating
//! peers, so there is no invalid state: a block a cache does not hold simply
//! has no valid line.

use crate::cache::CacheLine;
use crate::commons::Addr;
use crate::error::{SimResult, SimulatorError};
use crate::protocol::{AccessClass, BusSignal, LineState, ProcCommit, SnoopReply};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DragonState {
    Exclusive,
    SharedClean,
    /// Shared and responsible for supplying the block and writing it back.
    SharedModified,
    Modified,
}

use DragonState::*;

fn state_of(line: &CacheLine) -> SimResult<DragonState> {
    match line.state {
        LineState::Dragon(s) => Ok(s),
        LineState::Mesi(s) => Err(SimulatorError::Invariant(format!(
            "MESI state {s:?} on a line of a Dragon cache"
        ))),
    }
}

fn set_state(line: &mut CacheLine, state: DragonState) {
    line.state = LineState::Dragon(state);
}

pub(crate) fn bus_request(
    is_write: bool,
    line: &CacheLine,
    addr: Addr,
) -> SimResult<Option<BusSignal>> {
    if !line.valid {
        // both read and write misses start with a block fetch; the write
        // distributes its word afterwards if sharers turned up
        return Ok(Some(BusSignal::BusRd(addr)));
    }
    Ok(match (state_of(line)?, is_write) {
        (SharedClean, true) | (SharedModified, true) => Some(BusSignal::BusUpd(addr)),
        _ => None,
    })
}

pub(crate) fn on_processor_event(
    is_write: bool,
    line: &mut CacheLine,
    addr: Addr,
    shared_after_snoop: Option<bool>,
) -> SimResult<ProcCommit> {
    if !line.valid {
        let shared = shared_after_snoop.ok_or_else(|| {
            SimulatorError::Invariant("miss committed without a snoop outcome".into())
        })?;
        if is_write {
            line.dirty = true;
            if shared {
                set_state(line, SharedModified);
                // sharers exist, so the written word goes out on the bus
                return Ok(ProcCommit {
                    follow_up: Some(BusSignal::BusUpd(addr)),
                });
            }
            set_state(line, Modified);
        } else {
            set_state(line, if shared { SharedClean } else { Exclusive });
        }
        return Ok(ProcCommit::default());
    }

    match (state_of(line)?, is_write) {
        (Modified, _) | (Exclusive, false) | (SharedClean, false) | (SharedModified, false) => {}
        (Exclusive, true) => {
            // silent upgrade
            set_state(line, Modified);
            line.dirty = true;
        }
        (SharedClean, true) | (SharedModified, true) => {
            // the BusUpd has run; stay the owner while sharers remain
            let shared = shared_after_snoop.ok_or_else(|| {
                SimulatorError::Invariant("shared write committed without a snoop outcome".into())
            })?;
            set_state(line, if shared { SharedModified } else { Modified });
            line.dirty = true;
        }
    }
    Ok(ProcCommit::default())
}

pub(crate) fn on_snoop_event(signal: BusSignal, line: &mut CacheLine) -> SimResult<SnoopReply> {
    let state = state_of(line)?;
    match signal {
        BusSignal::BusRd(_) => Ok(match state {
            Exclusive => {
                set_state(line, SharedClean);
                SnoopReply {
                    sharer: true,
                    supplied: false,
                }
            }
            SharedClean => SnoopReply {
                sharer: true,
                supplied: false,
            },
            SharedModified => SnoopReply {
                sharer: true,
                supplied: true,
            },
            Modified => {
                // supply the block and keep ownership as Sm; memory stays stale
                set_state(line, SharedModified);
                SnoopReply {
                    sharer: true,
                    supplied: true,
                }
            }
        }),
        BusSignal::BusUpd(_) => match state {
            SharedClean => Ok(SnoopReply {
                sharer: true,
                supplied: false,
            }),
            SharedModified => {
                // another writer took over ownership of the dirty block
                set_state(line, SharedClean);
                line.dirty = false;
                Ok(SnoopReply {
                    sharer: true,
                    supplied: false,
                })
            }
            // an updating writer saw the block shared, so no peer can hold it
            // exclusively
            Exclusive | Modified => Err(SimulatorError::Invariant(format!(
                "BusUpd snooped while the line is in {state:?}"
            ))),
        },
        BusSignal::BusRdX(_) | BusSignal::BusUpgr(_) => Err(SimulatorError::Invariant(format!(
            "{signal:?} snooped under Dragon"
        ))),
    }
}

pub(crate) fn classify(line: &CacheLine) -> SimResult<AccessClass> {
    Ok(match state_of(line)? {
        Modified | Exclusive => AccessClass::Private,
        SharedClean | SharedModified => AccessClass::Shared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(state: DragonState, dirty: bool) -> CacheLine {
        CacheLine {
            tag: 0,
            valid: true,
            dirty,
            state: LineState::Dragon(state),
            lru: 0,
        }
    }

    fn invalid_line() -> CacheLine {
        CacheLine {
            valid: false,
            ..line(Exclusive, false)
        }
    }

    #[test]
    fn misses_fetch_with_busrd() {
        let l = invalid_line();
        assert_eq!(
            bus_request(false, &l, Addr(0)).unwrap(),
            Some(BusSignal::BusRd(Addr(0)))
        );
        assert_eq!(
            bus_request(true, &l, Addr(0)).unwrap(),
            Some(BusSignal::BusRd(Addr(0)))
        );
    }

    #[test]
    fn read_miss_goes_shared_clean_or_exclusive() {
        let mut l = invalid_line();
        on_processor_event(false, &mut l, Addr(0), Some(true)).unwrap();
        assert_eq!(l.state, LineState::Dragon(SharedClean));

        let mut l = invalid_line();
        on_processor_event(false, &mut l, Addr(0), Some(false)).unwrap();
        assert_eq!(l.state, LineState::Dragon(Exclusive));
    }

    #[test]
    fn write_miss_with_sharers_becomes_owner_and_updates() {
        let mut l = invalid_line();
        let commit = on_processor_event(true, &mut l, Addr(0x80), Some(true)).unwrap();
        assert_eq!(l.state, LineState::Dragon(SharedModified));
        assert!(l.dirty);
        assert_eq!(commit.follow_up, Some(BusSignal::BusUpd(Addr(0x80))));
    }

    #[test]
    fn write_miss_alone_goes_modified_without_update() {
        let mut l = invalid_line();
        let commit = on_processor_event(true, &mut l, Addr(0x80), Some(false)).unwrap();
        assert_eq!(l.state, LineState::Dragon(Modified));
        assert_eq!(commit.follow_up, None);
    }

    #[test]
    fn shared_write_keeps_or_drops_ownership_by_snoop() {
        let mut l = line(SharedClean, false);
        assert_eq!(
            bus_request(true, &l, Addr(0)).unwrap(),
            Some(BusSignal::BusUpd(Addr(0)))
        );
        on_processor_event(true, &mut l, Addr(0), Some(true)).unwrap();
        assert_eq!(l.state, LineState::Dragon(SharedModified));
        assert!(l.dirty);

        let mut l = line(SharedModified, true);
        on_processor_event(true, &mut l, Addr(0), Some(false)).unwrap();
        assert_eq!(l.state, LineState::Dragon(Modified));
    }

    #[test]
    fn snooped_busrd_makes_modified_an_owner() {
        let mut l = line(Modified, true);
        let reply = on_snoop_event(BusSignal::BusRd(Addr(0)), &mut l).unwrap();
        assert!(reply.supplied && reply.sharer);
        assert_eq!(l.state, LineState::Dragon(SharedModified));
        assert!(l.dirty);
    }

    #[test]
    fn snooped_busupd_demotes_the_old_owner() {
        let mut l = line(SharedModified, true);
        let reply = on_snoop_event(BusSignal::BusUpd(Addr(0)), &mut l).unwrap();
        assert!(reply.sharer && !reply.supplied);
        assert_eq!(l.state, LineState::Dragon(SharedClean));
        assert!(!l.dirty);
    }

    #[test]
    fn snooped_busupd_on_exclusive_is_an_invariant_violation() {
        let mut l = line(Modified, true);
        assert!(on_snoop_event(BusSignal::BusUpd(Addr(0)), &mut l).is_err());
    }

    #[test]
    fn classification() {
        assert_eq!(classify(&line(Modified, true)).unwrap(), AccessClass::Private);
        assert_eq!(classify(&line(Exclusive, false)).unwrap(), AccessClass::Private);
        assert_eq!(classify(&line(SharedClean, false)).unwrap(), AccessClass::Shared);
        assert_eq!(
            classify(&line(SharedModified, true)).unwrap(),
            AccessClass::Shared
        );
    }
}
