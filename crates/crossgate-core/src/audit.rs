//! Identity commitments written at admission and checked at release.

use crate::session::Session;
use crate::ContractError;
use crossgate_schema::{LaneId, PrincipalId, Request, RequestAudit};
use tracing::warn;

/// Seal and buffer the audit record for a freshly created request.
pub fn record(
    session: &mut Session<'_>,
    request: &Request,
    principal: &PrincipalId,
) -> Result<(), ContractError> {
    let audit = RequestAudit::seal(
        request.id,
        request.lane_id.clone(),
        request.crossing_id.clone(),
        principal,
    )?;
    session.save(&audit)
}

/// Check that `principal` is the identity that made `request`.
///
/// `lane_id` scopes the check to the lane the releaser names. A missing
/// audit record, a record for another crossing or lane, and a commitment
/// that does not match all fail closed.
pub fn verify(
    session: &mut Session<'_>,
    request: &Request,
    lane_id: Option<&LaneId>,
    principal: &PrincipalId,
) -> Result<(), ContractError> {
    let Some(audit) = session.audit(request.id)? else {
        warn!("request {} has no audit record, release refused", request.id);
        return Err(ContractError::Unauthorized(format!(
            "no audit record for request {}",
            request.id
        )));
    };

    let in_scope = audit.crossing_id == request.crossing_id && audit.lane_id.as_ref() == lane_id;
    if !in_scope || !audit.matches(principal)? {
        warn!("request {}: releasing identity does not match the requester", request.id);
        return Err(ContractError::Unauthorized(format!(
            "caller is not the requester of request {}",
            request.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossgate_schema::{CrossingId, RequestId, RequesterRole};
    use crossgate_store::MemoryLedger;

    fn car_request() -> Request {
        Request::granted(
            RequestId::new(1),
            CrossingId::new("C1"),
            Some(LaneId::new("L1")),
            RequesterRole::Car,
        )
    }

    #[test]
    fn requester_verifies() {
        let ledger = MemoryLedger::new();
        let me = PrincipalId::new("x509::CN=car-1");
        let request = car_request();

        let mut s = Session::begin(&ledger);
        record(&mut s, &request, &me).unwrap();
        s.commit().unwrap();

        let mut s = Session::begin(&ledger);
        verify(&mut s, &request, Some(&LaneId::new("L1")), &me).unwrap();
    }

    #[test]
    fn stranger_and_wrong_lane_are_rejected() {
        let ledger = MemoryLedger::new();
        let me = PrincipalId::new("x509::CN=car-1");
        let request = car_request();
        let mut s = Session::begin(&ledger);
        record(&mut s, &request, &me).unwrap();

        let stranger = PrincipalId::new("x509::CN=car-2");
        assert!(matches!(
            verify(&mut s, &request, Some(&LaneId::new("L1")), &stranger),
            Err(ContractError::Unauthorized(_))
        ));
        assert!(matches!(
            verify(&mut s, &request, Some(&LaneId::new("L2")), &me),
            Err(ContractError::Unauthorized(_))
        ));
        assert!(matches!(
            verify(&mut s, &request, None, &me),
            Err(ContractError::Unauthorized(_))
        ));
    }

    #[test]
    fn missing_audit_fails_closed() {
        let ledger = MemoryLedger::new();
        let mut s = Session::begin(&ledger);
        let err = verify(
            &mut s,
            &car_request(),
            Some(&LaneId::new("L1")),
            &PrincipalId::new("x509::CN=car-1"),
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::Unauthorized(_)));
    }
}
