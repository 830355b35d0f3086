//! Train and car release.

use crate::config::ContractConfig;
use crate::context::Invocation;
use crate::session::Session;
use crate::{allocator, audit, state, ContractError};
use crossgate_schema::{CrossingId, LaneId, Request, RequestId, RequesterRole};
use tracing::info;

/// Load a request and check it belongs to `crossing_id` and has `role`.
fn held_request(
    session: &mut Session<'_>,
    request_id: RequestId,
    crossing_id: &CrossingId,
    role: RequesterRole,
) -> Result<Request, ContractError> {
    let request = session.request(request_id)?;
    if request.crossing_id != *crossing_id {
        return Err(ContractError::not_found(
            "request",
            format!("{request_id} on crossing {crossing_id}"),
        ));
    }
    if request.role != role {
        return Err(ContractError::StateConflict(format!(
            "request {request_id} is a {} request, not {role}",
            request.role
        )));
    }
    Ok(request)
}

fn ensure_active(request: &Request) -> Result<(), ContractError> {
    if !request.active {
        return Err(ContractError::StateConflict(format!(
            "request {} holds nothing to release",
            request.id
        )));
    }
    Ok(())
}

/// Give back a train's priority lock on every lane of the crossing.
pub fn release_train(
    session: &mut Session<'_>,
    config: &ContractConfig,
    inv: &Invocation,
    request_id: RequestId,
    crossing_id: &CrossingId,
) -> Result<Request, ContractError> {
    inv.require_railway(config)?;
    let mut crossing = session.crossing(crossing_id)?;
    let mut request = held_request(session, request_id, crossing_id, RequesterRole::Train)?;
    audit::verify(session, &request, None, &inv.caller.principal)?;
    // A denied train was never granted but still seized the crossing, so its
    // release is not gated on `active`.
    if request.granted {
        ensure_active(&request)?;
    }

    let mut lanes = session.lanes_of(&crossing)?;
    lanes.iter_mut().for_each(allocator::unlock_train);
    request.active = false;
    let freed = state::settle_after_release(&mut crossing, &lanes, config.valid_until_from(inv.now()));

    session.save_lanes(&lanes)?;
    session.save_crossing(&crossing)?;
    session.save(&request)?;

    info!(
        "train request {request_id} released on crossing '{crossing_id}', crossing now {}",
        crossing.state
    );
    if freed {
        info!("crossing '{crossing_id}' free to cross until {}", crossing.valid_until);
    }
    Ok(request)
}

/// Give back one car's place on the lane it was granted.
pub fn release_car(
    session: &mut Session<'_>,
    config: &ContractConfig,
    inv: &Invocation,
    request_id: RequestId,
    crossing_id: &CrossingId,
    lane_id: &LaneId,
) -> Result<Request, ContractError> {
    inv.require_vehicle_owner(config)?;
    let mut crossing = session.crossing(crossing_id)?;
    session.lane(crossing_id, lane_id)?;
    let mut request = held_request(session, request_id, crossing_id, RequesterRole::Car)?;
    ensure_active(&request)?;
    if request.lane_id.as_ref() != Some(lane_id) {
        return Err(ContractError::Unauthorized(format!(
            "request {request_id} was not granted lane '{lane_id}'"
        )));
    }
    audit::verify(session, &request, Some(lane_id), &inv.caller.principal)?;

    let mut lanes = session.lanes_of(&crossing)?;
    let lane = lanes
        .iter_mut()
        .find(|l| l.id == *lane_id)
        .ok_or_else(|| {
            ContractError::Invariant(format!(
                "lane '{lane_id}' is stored but not listed on crossing '{crossing_id}'"
            ))
        })?;
    allocator::unlock_car(lane)?;
    let released_lane = lane.clone();
    request.active = false;
    let freed = state::settle_after_release(&mut crossing, &lanes, config.valid_until_from(inv.now()));

    session.save_lane(&released_lane)?;
    session.save_crossing(&crossing)?;
    session.save(&request)?;

    info!(
        "car request {request_id} released lane '{lane_id}' on crossing '{crossing_id}', crossing now {}",
        crossing.state
    );
    if freed {
        info!("crossing '{crossing_id}' free to cross until {}", crossing.valid_until);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission;
    use crate::context::CallerIdentity;
    use crossgate_schema::{Crossing, CrossingState, Lane, TxTimestamp};
    use crossgate_store::MemoryLedger;

    fn seed(ledger: &MemoryLedger) -> CrossingId {
        let c1 = CrossingId::new("C1");
        let mut s = Session::begin(ledger);
        s.save_crossing(&Crossing::new_free(c1.clone(), vec![LaneId::new("L1")], 60))
            .unwrap();
        s.save_lane(&Lane::new(LaneId::new("L1"), c1.clone(), 1)).unwrap();
        s.commit().unwrap();
        c1
    }

    fn invocation(domain: &str, principal: &str, secs: i64) -> Invocation {
        Invocation::new(
            CallerIdentity::new(domain, principal),
            TxTimestamp::from_secs(secs),
            "tx",
        )
    }

    fn train(secs: i64) -> Invocation {
        invocation("RailwayOrgMSP", "x509::CN=train-1", secs)
    }

    fn car(principal: &str, secs: i64) -> Invocation {
        invocation("VehicleOwnerOrgMSP", principal, secs)
    }

    #[test]
    fn train_release_frees_crossing() {
        let ledger = MemoryLedger::new();
        let c1 = seed(&ledger);
        let config = ContractConfig::default();
        let mut s = Session::begin(&ledger);
        let r = admission::request_train(&mut s, &config, &train(0), &c1).unwrap();

        let released = release_train(&mut s, &config, &train(0), r.id, &c1).unwrap();
        assert!(!released.active);
        assert!(released.granted);
        let crossing = s.crossing(&c1).unwrap();
        assert_eq!(crossing.state, CrossingState::FreeToCross);
        assert_eq!(crossing.valid_until, 60);
        assert!(!crossing.priority_lock);
        assert!(!s.lane(&c1, &LaneId::new("L1")).unwrap().priority_lock);
    }

    #[test]
    fn double_release_is_state_conflict() {
        let ledger = MemoryLedger::new();
        let c1 = seed(&ledger);
        let config = ContractConfig::default();
        let mut s = Session::begin(&ledger);
        let r = admission::request_train(&mut s, &config, &train(0), &c1).unwrap();
        release_train(&mut s, &config, &train(1), r.id, &c1).unwrap();
        assert!(matches!(
            release_train(&mut s, &config, &train(2), r.id, &c1),
            Err(ContractError::StateConflict(_))
        ));
    }

    #[test]
    fn other_railway_principal_cannot_release() {
        let ledger = MemoryLedger::new();
        let c1 = seed(&ledger);
        let config = ContractConfig::default();
        let mut s = Session::begin(&ledger);
        let r = admission::request_train(&mut s, &config, &train(0), &c1).unwrap();
        let other = invocation("RailwayOrgMSP", "x509::CN=train-2", 1);
        assert!(matches!(
            release_train(&mut s, &config, &other, r.id, &c1),
            Err(ContractError::Unauthorized(_))
        ));
    }

    #[test]
    fn car_release_scoped_to_granted_lane() {
        let ledger = MemoryLedger::new();
        let c1 = CrossingId::new("C1");
        let config = ContractConfig::default();
        let mut s = Session::begin(&ledger);
        s.save_crossing(&Crossing::new_free(
            c1.clone(),
            vec![LaneId::new("L1"), LaneId::new("L2")],
            60,
        ))
        .unwrap();
        s.save_lane(&Lane::new(LaneId::new("L1"), c1.clone(), 1)).unwrap();
        s.save_lane(&Lane::new(LaneId::new("L2"), c1.clone(), 1)).unwrap();

        let r = admission::request_car(&mut s, &config, &car("x509::CN=car-1", 5), &c1).unwrap();
        let granted = r.lane_id.clone().unwrap();
        let other = if granted == "L1" {
            LaneId::new("L2")
        } else {
            LaneId::new("L1")
        };
        assert!(matches!(
            release_car(&mut s, &config, &car("x509::CN=car-1", 6), r.id, &c1, &other),
            Err(ContractError::Unauthorized(_))
        ));
        assert!(matches!(
            release_car(&mut s, &config, &car("x509::CN=car-2", 6), r.id, &c1, &granted),
            Err(ContractError::Unauthorized(_))
        ));

        release_car(&mut s, &config, &car("x509::CN=car-1", 6), r.id, &c1, &granted).unwrap();
        let crossing = s.crossing(&c1).unwrap();
        assert_eq!(crossing.state, CrossingState::FreeToCross);
        assert_eq!(crossing.valid_until, 66);
        assert_eq!(s.lane(&c1, &granted).unwrap().occupied, 0);
    }

    #[test]
    fn train_release_of_car_request_is_state_conflict() {
        let ledger = MemoryLedger::new();
        let c1 = seed(&ledger);
        let config = ContractConfig::default();
        let mut s = Session::begin(&ledger);
        let r = admission::request_car(&mut s, &config, &car("x509::CN=car-1", 0), &c1).unwrap();
        assert!(matches!(
            release_train(&mut s, &config, &train(1), r.id, &c1),
            Err(ContractError::StateConflict(_))
        ));
    }

    #[test]
    fn denied_train_can_release_its_seizure() {
        let ledger = MemoryLedger::new();
        let c1 = seed(&ledger);
        let config = ContractConfig::default();
        let mut s = Session::begin(&ledger);
        let r = admission::request_train(&mut s, &config, &train(99), &c1).unwrap();
        assert!(!r.granted);
        assert!(!r.active);

        release_train(&mut s, &config, &train(100), r.id, &c1).unwrap();
        let crossing = s.crossing(&c1).unwrap();
        assert_eq!(crossing.state, CrossingState::FreeToCross);
        assert_eq!(crossing.valid_until, 160);
        assert!(!s.lane(&c1, &LaneId::new("L1")).unwrap().priority_lock);
        assert!(!s.request(r.id).unwrap().active);
    }

    #[test]
    fn denied_car_release_is_state_conflict() {
        let ledger = MemoryLedger::new();
        let c1 = seed(&ledger);
        let config = ContractConfig::default();
        let mut s = Session::begin(&ledger);
        admission::request_car(&mut s, &config, &car("x509::CN=car-1", 0), &c1).unwrap();
        let denied = admission::request_car(&mut s, &config, &car("x509::CN=car-2", 1), &c1).unwrap();
        assert!(!denied.granted);

        let err = release_car(
            &mut s,
            &config,
            &car("x509::CN=car-2", 2),
            denied.id,
            &c1,
            &LaneId::new("L1"),
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::StateConflict(_)));
        assert_eq!(s.lane(&c1, &LaneId::new("L1")).unwrap().occupied, 1);
    }
}
