//! Train and car admission.

use crate::config::ContractConfig;
use crate::context::Invocation;
use crate::session::Session;
use crate::{allocator, audit, state, ContractError};
use crossgate_schema::{CrossingId, Request, RequesterRole};
use tracing::{info, warn};

/// Seize a crossing for a train.
///
/// The crossing and every lane are priority-locked whether or not the train
/// is admitted. A denied train is recorded inactive but still blocks car
/// traffic until its request is released.
pub fn request_train(
    session: &mut Session<'_>,
    config: &ContractConfig,
    inv: &Invocation,
    crossing_id: &CrossingId,
) -> Result<Request, ContractError> {
    inv.require_railway(config)?;
    let mut crossing = session.crossing(crossing_id)?;
    let mut lanes = session.lanes_of(&crossing)?;

    let admitted = state::seize_for_train(&mut crossing, inv.now());
    lanes.iter_mut().for_each(allocator::lock_for_train);

    let id = session.next_request_id()?;
    let request = if admitted {
        Request::granted(id, crossing_id.clone(), None, RequesterRole::Train)
    } else {
        Request::denied(id, crossing_id.clone(), RequesterRole::Train)
    };

    session.save_crossing(&crossing)?;
    session.save_lanes(&lanes)?;
    session.save(&request)?;
    audit::record(session, &request, &inv.caller.principal)?;

    if admitted {
        info!("train request {id} granted on crossing '{crossing_id}'");
    } else {
        warn!(
            "train request {id} denied on crossing '{crossing_id}' (not free or validity expired), crossing seized"
        );
    }
    Ok(request)
}

/// Admit a car onto one free lane, chosen deterministically from the
/// transaction timestamp.
///
/// A denial leaves the crossing and its lanes untouched.
pub fn request_car(
    session: &mut Session<'_>,
    config: &ContractConfig,
    inv: &Invocation,
    crossing_id: &CrossingId,
) -> Result<Request, ContractError> {
    inv.require_vehicle_owner(config)?;
    let mut crossing = session.crossing(crossing_id)?;
    let id = session.next_request_id()?;

    let chosen = if crossing.priority_lock {
        warn!("car request {id} denied on crossing '{crossing_id}': priority lock held");
        None
    } else {
        let lanes = session.lanes_of(&crossing)?;
        let pick = allocator::select_free_lane(&lanes, inv.timestamp);
        if pick.is_none() {
            warn!("car request {id} denied on crossing '{crossing_id}': no free lane");
        }
        pick.and_then(|lane_id| lanes.into_iter().find(|l| l.id == lane_id))
    };

    let request = match chosen {
        Some(mut lane) => {
            allocator::lock_for_car(&mut lane)?;
            state::lock_for_car(&mut crossing);
            session.save_lane(&lane)?;
            session.save_crossing(&crossing)?;
            info!(
                "car request {id} granted on crossing '{crossing_id}', lane '{}'",
                lane.id
            );
            Request::granted(id, crossing_id.clone(), Some(lane.id), RequesterRole::Car)
        }
        None => Request::denied(id, crossing_id.clone(), RequesterRole::Car),
    };

    session.save(&request)?;
    audit::record(session, &request, &inv.caller.principal)?;
    Ok(request)
}
