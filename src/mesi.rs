//! MESI (Illinois) invalidation-based protocol.

use crate::cache::CacheLine;
use crate::commons::Addr;
use crate::error::{SimResult, SimulatorError};
use crate::protocol::{AccessClass, BusSignal, LineState, ProcCommit, SnoopReply};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MesiState {
    Modified,
    Exclusive,
    Shared,
    Invalid,
}

use MesiState::*;

fn state_of(line: &CacheLine) -> SimResult<MesiState> {
    match line.state {
        LineState::Mesi(s) => Ok(s),
        LineState::Dragon(s) => Err(SimulatorError::Invariant(format!(
            "Dragon state {s:?} on a line of a MESI cache"
        ))),
    }
}

fn set_state(line: &mut CacheLine, state: MesiState) {
    line.state = LineState::Mesi(state);
}

pub(crate) fn bus_request(
    is_write: bool,
    line: &CacheLine,
    addr: Addr,
) -> SimResult<Option<BusSignal>> {
    if !line.valid {
        // read miss fetches, write miss fetches with intent to modify
        return Ok(Some(if is_write {
            BusSignal::BusRdX(addr)
        } else {
            BusSignal::BusRd(addr)
        }));
    }
    Ok(match (state_of(line)?, is_write) {
        (Shared, true) => Some(BusSignal::BusUpgr(addr)),
        _ => None,
    })
}

pub(crate) fn on_processor_event(
    is_write: bool,
    line: &mut CacheLine,
    shared_after_snoop: Option<bool>,
) -> SimResult<ProcCommit> {
    if !line.valid {
        // allocate path: the fill transaction has run, its snoop outcome is in
        let shared = shared_after_snoop.ok_or_else(|| {
            SimulatorError::Invariant("miss committed without a snoop outcome".into())
        })?;
        if is_write {
            set_state(line, Modified);
            line.dirty = true;
        } else {
            set_state(line, if shared { Shared } else { Exclusive });
        }
        return Ok(ProcCommit::default());
    }

    match (state_of(line)?, is_write) {
        (Modified, _) | (Exclusive, false) | (Shared, false) => {}
        (Exclusive, true) => {
            // silent upgrade, no bus transaction
            set_state(line, Modified);
            line.dirty = true;
        }
        (Shared, true) => {
            // the BusUpgr has run and peers dropped their copies
            set_state(line, Modified);
            line.dirty = true;
        }
        (Invalid, _) => {
            return Err(SimulatorError::Invariant(
                "processor event on a valid line in state I".into(),
            ))
        }
    }
    Ok(ProcCommit::default())
}

pub(crate) fn on_snoop_event(signal: BusSignal, line: &mut CacheLine) -> SimResult<SnoopReply> {
    let state = state_of(line)?;
    match signal {
        BusSignal::BusRd(_) => match state {
            Modified => {
                // flush-on-intervention: supply the block and keep it as a
                // clean sharer; memory is left stale
                set_state(line, Shared);
                line.dirty = false;
                Ok(SnoopReply {
                    sharer: true,
                    supplied: true,
                })
            }
            Exclusive | Shared => {
                set_state(line, Shared);
                Ok(SnoopReply {
                    sharer: true,
                    supplied: false,
                })
            }
            Invalid => Err(invalid_valid_line(signal)),
        },
        BusSignal::BusRdX(_) => match state {
            Modified => {
                line.valid = false;
                line.dirty = false;
                set_state(line, Invalid);
                Ok(SnoopReply {
                    sharer: false,
                    supplied: true,
                })
            }
            Exclusive | Shared => {
                line.valid = false;
                set_state(line, Invalid);
                Ok(SnoopReply::default())
            }
            Invalid => Err(invalid_valid_line(signal)),
        },
        BusSignal::BusUpgr(_) => match state {
            Shared => {
                line.valid = false;
                set_state(line, Invalid);
                Ok(SnoopReply::default())
            }
            // an upgrading writer holds the line in S, so no peer can be M or E
            Modified | Exclusive => Err(SimulatorError::Invariant(format!(
                "BusUpgr snooped while the line is in {state:?}"
            ))),
            Invalid => Err(invalid_valid_line(signal)),
        },
        BusSignal::BusUpd(_) => Err(SimulatorError::Invariant(
            "BusUpd snooped under MESI".into(),
        )),
    }
}

pub(crate) fn classify(line: &CacheLine) -> SimResult<AccessClass> {
    Ok(match state_of(line)? {
        Modified | Exclusive => AccessClass::Private,
        Shared => AccessClass::Shared,
        Invalid => {
            return Err(SimulatorError::Invariant(
                "classifying a valid line in state I".into(),
            ))
        }
    })
}

fn invalid_valid_line(signal: BusSignal) -> SimulatorError {
    SimulatorError::Invariant(format!("{signal:?} snooped on a valid line in state I"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(state: MesiState, dirty: bool) -> CacheLine {
        CacheLine {
            tag: 0,
            valid: true,
            dirty,
            state: LineState::Mesi(state),
            lru: 0,
        }
    }

    fn invalid_line() -> CacheLine {
        CacheLine {
            valid: false,
            ..line(Invalid, false)
        }
    }

    #[test]
    fn read_miss_goes_shared_or_exclusive() {
        let mut l = invalid_line();
        on_processor_event(false, &mut l, Some(true)).unwrap();
        assert_eq!(l.state, LineState::Mesi(Shared));

        let mut l = invalid_line();
        on_processor_event(false, &mut l, Some(false)).unwrap();
        assert_eq!(l.state, LineState::Mesi(Exclusive));
        // the cache, not the protocol, makes the line valid
        assert!(!l.valid);
    }

    #[test]
    fn write_miss_goes_modified_dirty() {
        let mut l = invalid_line();
        on_processor_event(true, &mut l, Some(true)).unwrap();
        assert_eq!(l.state, LineState::Mesi(Modified));
        assert!(l.dirty);
    }

    #[test]
    fn write_hit_on_exclusive_is_silent() {
        let mut l = line(Exclusive, false);
        assert_eq!(bus_request(true, &l, Addr(0)).unwrap(), None);
        on_processor_event(true, &mut l, None).unwrap();
        assert_eq!(l.state, LineState::Mesi(Modified));
        assert!(l.dirty);
    }

    #[test]
    fn write_hit_on_shared_needs_upgrade() {
        let l = line(Shared, false);
        assert_eq!(
            bus_request(true, &l, Addr(0x40)).unwrap(),
            Some(BusSignal::BusUpgr(Addr(0x40)))
        );
    }

    #[test]
    fn read_hits_are_silent() {
        for state in [Modified, Exclusive, Shared] {
            let l = line(state, state == Modified);
            assert_eq!(bus_request(false, &l, Addr(0)).unwrap(), None);
        }
    }

    #[test]
    fn snooped_busrd_downgrades_modified_and_supplies() {
        let mut l = line(Modified, true);
        let reply = on_snoop_event(BusSignal::BusRd(Addr(0)), &mut l).unwrap();
        assert!(reply.supplied && reply.sharer);
        assert_eq!(l.state, LineState::Mesi(Shared));
        assert!(!l.dirty);
    }

    #[test]
    fn snooped_busrdx_invalidates() {
        for state in [Modified, Exclusive, Shared] {
            let mut l = line(state, state == Modified);
            let reply = on_snoop_event(BusSignal::BusRdX(Addr(0)), &mut l).unwrap();
            assert!(!l.valid);
            assert!(!reply.sharer);
            assert_eq!(reply.supplied, state == Modified);
        }
    }

    #[test]
    fn snooped_upgrade_drops_shared_copy() {
        let mut l = line(Shared, false);
        let reply = on_snoop_event(BusSignal::BusUpgr(Addr(0)), &mut l).unwrap();
        assert!(!l.valid);
        assert!(!reply.sharer && !reply.supplied);
    }

    #[test]
    fn snooped_upgrade_on_exclusive_is_an_invariant_violation() {
        let mut l = line(Exclusive, false);
        assert!(on_snoop_event(BusSignal::BusUpgr(Addr(0)), &mut l).is_err());
    }

    #[test]
    fn classification() {
        assert_eq!(classify(&line(Modified, true)).unwrap(), AccessClass::Private);
        assert_eq!(classify(&line(Exclusive, false)).unwrap(), AccessClass::Private);
        assert_eq!(classify(&line(Shared, false)).unwrap(), AccessClass::Shared);
    }
}
