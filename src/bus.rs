use log::debug;

use crate::protocol::BusSignal;

/// Shared bus, serialized FCFS. One transaction occupies the bus at a time;
/// requests start at the later of the issuer's ready time and the bus
/// becoming free.
#[derive(Default, Debug)]
pub struct Bus {
    free_at: u64,
    pub data_bytes: u64,
    pub invalidations: u64,
    pub updates: u64,
}

impl Bus {
    pub fn new() -> Self {
        Bus::default()
    }

    /// Schedule a transaction presented at `earliest` and return its end time.
    /// Accounts the declared data bytes and the broadcast kind; BusRdX and
    /// BusUpgr count as one invalidation broadcast each whether or not any
    /// sharer existed, BusUpd as one update broadcast.
    pub fn schedule(
        &mut self,
        earliest: u64,
        duration: u64,
        data_bytes: u64,
        signal: &BusSignal,
    ) -> u64 {
        let start = earliest.max(self.free_at);
        let end = start + duration;
        self.free_at = end;
        self.data_bytes += data_bytes;
        match signal {
            BusSignal::BusRdX(_) | BusSignal::BusUpgr(_) => self.invalidations += 1,
            BusSignal::BusUpd(_) => self.updates += 1,
            BusSignal::BusRd(_) => {}
        }
        debug!("bus: {signal:?} scheduled [{start}, {end}), {data_bytes} bytes");
        end
    }

    /// Account a dirty-block writeback. Memory-side traffic: it adds to the
    /// data-byte total but does not contend with bus transactions in this
    /// blocking model.
    pub fn writeback(&mut self, data_bytes: u64) {
        self.data_bytes += data_bytes;
    }
}
