use crate::config::ContractConfig;
use crate::context::Invocation;
use crate::session::Session;
use crate::{admission, release, state, ContractError};
use crossgate_schema::{Crossing, CrossingId, Lane, LaneId, Request, RequestId};
use crossgate_store::Ledger;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// The crossing arbitration contract.
///
/// Every public operation runs as one ledger transaction: it either commits
/// all of its writes or, on any error, none of them. A
/// [`StoreError::Conflict`](crossgate_store::StoreError::Conflict) means a
/// concurrent invocation won the race; the caller decides whether to retry.
pub struct CrossingContract<L: Ledger> {
    ledger: L,
    config: ContractConfig,
}

impl<L: Ledger> CrossingContract<L> {
    pub fn new(ledger: L, config: ContractConfig) -> Result<Self, ContractError> {
        config.validate()?;
        Ok(Self { ledger, config })
    }

    pub fn with_default_config(ledger: L) -> Self {
        Self {
            ledger,
            config: ContractConfig::default(),
        }
    }

    pub fn config(&self) -> &ContractConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Run `op` in a fresh transaction and commit it only if `op` succeeds.
    fn run<T>(
        &self,
        name: &str,
        inv: Option<&Invocation>,
        op: impl FnOnce(&mut Session<'_>, &ContractConfig) -> Result<T, ContractError>,
    ) -> Result<T, ContractError> {
        let mut session = Session::begin(&self.ledger);
        let out = op(&mut session, &self.config)?;
        let version = session.commit()?;
        match inv {
            Some(inv) => debug!("{name} (tx {}) committed at v{version}", inv.tx_id),
            None => debug!("{name} committed at v{version}"),
        }
        Ok(out)
    }

    // Queries

    pub fn crossing_exists(&self, crossing_id: &CrossingId) -> Result<bool, ContractError> {
        self.run("crossing_exists", None, |s, _| {
            Ok(s.find_crossing(crossing_id)?.is_some())
        })
    }

    pub fn lane_exists(
        &self,
        crossing_id: &CrossingId,
        lane_id: &LaneId,
    ) -> Result<bool, ContractError> {
        self.run("lane_exists", None, |s, _| {
            Ok(s.find_lane(crossing_id, lane_id)?.is_some())
        })
    }

    pub fn read_crossing(&self, crossing_id: &CrossingId) -> Result<Crossing, ContractError> {
        self.run("read_crossing", None, |s, _| s.crossing(crossing_id))
    }

    pub fn read_lane(&self, crossing_id: &CrossingId, lane_id: &LaneId) -> Result<Lane, ContractError> {
        self.run("read_lane", None, |s, _| s.lane(crossing_id, lane_id))
    }

    pub fn read_request(&self, request_id: RequestId) -> Result<Request, ContractError> {
        self.run("read_request", None, |s, _| s.request(request_id))
    }

    /// Lanes of a crossing in the crossing's `lane_ids` order.
    pub fn list_lanes(&self, crossing_id: &CrossingId) -> Result<Vec<Lane>, ContractError> {
        self.run("list_lanes", None, |s, _| {
            let crossing = s.crossing(crossing_id)?;
            s.lanes_of(&crossing)
        })
    }

    // Administration

    pub fn create_crossing(
        &self,
        inv: &Invocation,
        crossing_id: &CrossingId,
        lane_ids: &[LaneId],
        lane_capacity: u32,
    ) -> Result<Crossing, ContractError> {
        self.run("create_crossing", Some(inv), |s, config| {
            inv.require_admin(config)?;
            if s.find_crossing(crossing_id)?.is_some() {
                return Err(ContractError::already_exists("crossing", crossing_id));
            }
            let mut seen = BTreeSet::new();
            for lane_id in lane_ids {
                if !seen.insert(lane_id) || s.find_lane(crossing_id, lane_id)?.is_some() {
                    return Err(ContractError::already_exists(
                        "lane",
                        format!("{crossing_id}/{lane_id}"),
                    ));
                }
            }

            let mut crossing = Crossing::new_free(
                crossing_id.clone(),
                lane_ids.to_vec(),
                config.valid_until_from(inv.now()),
            );
            let lanes: Vec<Lane> = lane_ids
                .iter()
                .map(|id| Lane::new(id.clone(), crossing_id.clone(), lane_capacity))
                .collect();
            state::reconcile_after_lane_change(&mut crossing, &lanes);
            s.save_crossing(&crossing)?;
            s.save_lanes(&lanes)?;
            info!(
                "created crossing '{crossing_id}' with {} lane(s) of capacity {lane_capacity}",
                lanes.len()
            );
            Ok(crossing)
        })
    }

    /// Delete a crossing and all of its lanes. Refused while it is held.
    pub fn delete_crossing(&self, inv: &Invocation, crossing_id: &CrossingId) -> Result<(), ContractError> {
        self.run("delete_crossing", Some(inv), |s, config| {
            inv.require_admin(config)?;
            let crossing = s.crossing(crossing_id)?;
            let lanes = s.stored_lanes(crossing_id)?;
            if state::is_held(&crossing, &lanes) {
                return Err(ContractError::StateConflict(format!(
                    "crossing '{crossing_id}' is held by an outstanding grant"
                )));
            }
            for lane in &lanes {
                s.remove(lane)?;
            }
            s.remove(&crossing)?;
            info!(
                "deleted crossing '{crossing_id}' and {} lane(s)",
                lanes.len()
            );
            Ok(())
        })
    }

    pub fn create_lane(
        &self,
        inv: &Invocation,
        crossing_id: &CrossingId,
        lane_id: &LaneId,
        capacity: u32,
    ) -> Result<Lane, ContractError> {
        self.run("create_lane", Some(inv), |s, config| {
            inv.require_admin(config)?;
            let mut crossing = s.crossing(crossing_id)?;
            if crossing.has_lane(lane_id) || s.find_lane(crossing_id, lane_id)?.is_some() {
                return Err(ContractError::already_exists(
                    "lane",
                    format!("{crossing_id}/{lane_id}"),
                ));
            }

            let mut lanes = s.lanes_of(&crossing)?;
            let mut lane = Lane::new(lane_id.clone(), crossing_id.clone(), capacity);
            // A train holds every lane of the crossing, including new ones.
            lane.priority_lock = crossing.priority_lock;
            crossing.lane_ids.push(lane_id.clone());
            lanes.push(lane.clone());
            if crossing.is_free_to_cross() {
                state::renew(&mut crossing, config.valid_until_from(inv.now()))?;
            }
            state::reconcile_after_lane_change(&mut crossing, &lanes);

            s.save_lane(&lane)?;
            s.save_crossing(&crossing)?;
            info!("created lane '{lane_id}' on crossing '{crossing_id}' with capacity {capacity}");
            Ok(lane)
        })
    }

    pub fn update_lane_capacity(
        &self,
        inv: &Invocation,
        crossing_id: &CrossingId,
        lane_id: &LaneId,
        capacity: u32,
    ) -> Result<Lane, ContractError> {
        self.run("update_lane_capacity", Some(inv), |s, config| {
            inv.require_admin(config)?;
            let mut crossing = s.crossing(crossing_id)?;
            let mut lane = s.lane(crossing_id, lane_id)?;
            if capacity < lane.occupied {
                return Err(ContractError::StateConflict(format!(
                    "lane '{lane_id}' has {} occupant(s), capacity {capacity} is too small",
                    lane.occupied
                )));
            }
            lane.capacity = capacity;

            let lanes: Vec<Lane> = s
                .lanes_of(&crossing)?
                .into_iter()
                .map(|l| if l.id == *lane_id { lane.clone() } else { l })
                .collect();
            state::reconcile_after_lane_change(&mut crossing, &lanes);

            s.save_lane(&lane)?;
            s.save_crossing(&crossing)?;
            info!("lane '{lane_id}' on crossing '{crossing_id}' now has capacity {capacity}");
            Ok(lane)
        })
    }

    /// Remove an empty lane from a crossing.
    pub fn delete_lane(
        &self,
        inv: &Invocation,
        crossing_id: &CrossingId,
        lane_id: &LaneId,
    ) -> Result<(), ContractError> {
        self.run("delete_lane", Some(inv), |s, config| {
            inv.require_admin(config)?;
            let mut crossing = s.crossing(crossing_id)?;
            let lane = s.lane(crossing_id, lane_id)?;
            if lane.occupied > 0 {
                return Err(ContractError::StateConflict(format!(
                    "lane '{lane_id}' still has {} occupant(s)",
                    lane.occupied
                )));
            }
            crossing.lane_ids.retain(|id| id != lane_id);
            s.remove(&lane)?;
            s.save_crossing(&crossing)?;
            info!("deleted lane '{lane_id}' from crossing '{crossing_id}'");
            Ok(())
        })
    }

    /// Extend the validity window of a free crossing.
    pub fn renew_free_to_cross_validity(
        &self,
        inv: &Invocation,
        crossing_id: &CrossingId,
    ) -> Result<Crossing, ContractError> {
        self.run("renew_free_to_cross_validity", Some(inv), |s, config| {
            inv.require_admin(config)?;
            let mut crossing = s.crossing(crossing_id)?;
            state::renew(&mut crossing, config.valid_until_from(inv.now()))?;
            s.save_crossing(&crossing)?;
            info!(
                "renewed crossing '{crossing_id}' validity until {}",
                crossing.valid_until
            );
            Ok(crossing)
        })
    }

    // Admission and release

    pub fn request_train_crossing(
        &self,
        inv: &Invocation,
        crossing_id: &CrossingId,
    ) -> Result<Request, ContractError> {
        self.run("request_train_crossing", Some(inv), |s, config| {
            admission::request_train(s, config, inv, crossing_id)
        })
    }

    pub fn request_car_crossing(
        &self,
        inv: &Invocation,
        crossing_id: &CrossingId,
    ) -> Result<Request, ContractError> {
        self.run("request_car_crossing", Some(inv), |s, config| {
            admission::request_car(s, config, inv, crossing_id)
        })
    }

    pub fn release_train_permission(
        &self,
        inv: &Invocation,
        request_id: RequestId,
        crossing_id: &CrossingId,
    ) -> Result<Request, ContractError> {
        self.run("release_train_permission", Some(inv), |s, config| {
            release::release_train(s, config, inv, request_id, crossing_id)
        })
    }

    pub fn release_car_permission(
        &self,
        inv: &Invocation,
        request_id: RequestId,
        crossing_id: &CrossingId,
        lane_id: &LaneId,
    ) -> Result<Request, ContractError> {
        self.run("release_car_permission", Some(inv), |s, config| {
            release::release_car(s, config, inv, request_id, crossing_id, lane_id)
        })
    }
}
