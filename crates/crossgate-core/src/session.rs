use crate::ContractError;
use crossgate_schema::{
    Crossing, CrossingId, Lane, LaneId, Record, Request, RequestAudit, RequestId, RequestSequence,
    SchemaError,
};
use crossgate_store::{Ledger, Transaction};

/// Typed view of one contract invocation's ledger transaction.
///
/// Lookups that must succeed report [`ContractError::NotFound`]; saves check
/// entity invariants before anything is buffered. Dropping the session
/// without [`commit`](Self::commit) discards every write.
pub struct Session<'l> {
    tx: Transaction<'l>,
}

fn invariant(e: SchemaError) -> ContractError {
    match e {
        SchemaError::Invariant(msg) => ContractError::Invariant(msg),
        other => ContractError::Schema(other),
    }
}

impl<'l> Session<'l> {
    pub fn begin(ledger: &'l dyn Ledger) -> Self {
        Self {
            tx: Transaction::begin(ledger),
        }
    }

    pub fn find_crossing(&mut self, id: &CrossingId) -> Result<Option<Crossing>, ContractError> {
        Ok(self.tx.load(&Crossing::key_for(id)?)?)
    }

    pub fn crossing(&mut self, id: &CrossingId) -> Result<Crossing, ContractError> {
        self.find_crossing(id)?
            .ok_or_else(|| ContractError::not_found("crossing", id))
    }

    pub fn find_lane(
        &mut self,
        crossing_id: &CrossingId,
        lane_id: &LaneId,
    ) -> Result<Option<Lane>, ContractError> {
        Ok(self.tx.load(&Lane::key_for(crossing_id, lane_id)?)?)
    }

    pub fn lane(&mut self, crossing_id: &CrossingId, lane_id: &LaneId) -> Result<Lane, ContractError> {
        self.find_lane(crossing_id, lane_id)?
            .ok_or_else(|| ContractError::not_found("lane", format!("{crossing_id}/{lane_id}")))
    }

    /// Every lane of `crossing`, in `lane_ids` order.
    pub fn lanes_of(&mut self, crossing: &Crossing) -> Result<Vec<Lane>, ContractError> {
        crossing
            .lane_ids
            .iter()
            .map(|lane_id| {
                self.find_lane(&crossing.id, lane_id)?.ok_or_else(|| {
                    ContractError::Invariant(format!(
                        "crossing '{}' lists lane '{lane_id}' but no such lane is stored",
                        crossing.id
                    ))
                })
            })
            .collect()
    }

    /// Lane records stored under `crossing_id`, whether listed or not.
    pub fn stored_lanes(&mut self, crossing_id: &CrossingId) -> Result<Vec<Lane>, ContractError> {
        self.tx
            .scan(&Lane::prefix_for(crossing_id)?)?
            .into_iter()
            .map(|(_, bytes)| Lane::from_bytes(&bytes).map_err(ContractError::from))
            .collect()
    }

    pub fn request(&mut self, id: RequestId) -> Result<Request, ContractError> {
        self.tx
            .load(&Request::key_for(id)?)?
            .ok_or_else(|| ContractError::not_found("request", id))
    }

    pub fn audit(&mut self, id: RequestId) -> Result<Option<RequestAudit>, ContractError> {
        Ok(self.tx.load(&RequestAudit::key_for(id)?)?)
    }

    /// Allocate the next request id inside this transaction.
    ///
    /// Two invocations racing for an id both read the counter, so the one
    /// that commits second conflicts instead of reusing the id.
    pub fn next_request_id(&mut self) -> Result<RequestId, ContractError> {
        let key = RequestSequence::storage_key()?;
        let mut sequence: RequestSequence = self.tx.load(&key)?.unwrap_or_default();
        let id = sequence.allocate();
        self.tx.store(&sequence)?;
        Ok(id)
    }

    pub fn save_crossing(&mut self, crossing: &Crossing) -> Result<(), ContractError> {
        crossing.check_invariant().map_err(invariant)?;
        Ok(self.tx.store(crossing)?)
    }

    pub fn save_lane(&mut self, lane: &Lane) -> Result<(), ContractError> {
        lane.check_invariant().map_err(invariant)?;
        Ok(self.tx.store(lane)?)
    }

    pub fn save_lanes(&mut self, lanes: &[Lane]) -> Result<(), ContractError> {
        lanes.iter().try_for_each(|lane| self.save_lane(lane))
    }

    pub fn save<R: Record>(&mut self, record: &R) -> Result<(), ContractError> {
        Ok(self.tx.store(record)?)
    }

    pub fn remove<R: Record>(&mut self, record: &R) -> Result<(), ContractError> {
        Ok(self.tx.remove(record)?)
    }

    pub fn commit(self) -> Result<u64, ContractError> {
        Ok(self.tx.commit()?)
    }
}
