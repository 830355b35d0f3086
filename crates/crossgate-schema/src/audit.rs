use crate::key::{CompositeKey, EntityKind};
use crate::types::{Commitment, CrossingId, LaneId, PrincipalId, RequestId};
use crate::{Record, SchemaError};
use serde::{Deserialize, Serialize};

const COMMITMENT_CONTEXT: &str = "crossgate 2024 request audit commitment";

/// Restricted audit record binding a request to the identity that made it.
///
/// Only a digest of the caller's principal is stored, never the principal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RequestAudit {
    pub request_id: RequestId,
    #[serde(default)]
    pub lane_id: Option<LaneId>,
    pub crossing_id: CrossingId,
    pub commitment: Commitment,
}

#[derive(Serialize)]
struct CommitmentPreimage<'a> {
    request_id: RequestId,
    lane_id: Option<&'a LaneId>,
    crossing_id: &'a CrossingId,
    principal: &'a PrincipalId,
}

fn commitment_hash(
    request_id: RequestId,
    lane_id: Option<&LaneId>,
    crossing_id: &CrossingId,
    principal: &PrincipalId,
) -> Result<blake3::Hash, SchemaError> {
    let preimage = serde_json::to_vec(&CommitmentPreimage {
        request_id,
        lane_id,
        crossing_id,
        principal,
    })?;
    let mut hasher = blake3::Hasher::new_derive_key(COMMITMENT_CONTEXT);
    hasher.update(&preimage);
    Ok(hasher.finalize())
}

impl RequestAudit {
    /// Seal a new audit record for `principal`.
    pub fn seal(
        request_id: RequestId,
        lane_id: Option<LaneId>,
        crossing_id: CrossingId,
        principal: &PrincipalId,
    ) -> Result<Self, SchemaError> {
        let hash = commitment_hash(request_id, lane_id.as_ref(), &crossing_id, principal)?;
        Ok(Self {
            request_id,
            lane_id,
            crossing_id,
            commitment: Commitment::new(hash.to_hex().to_string()),
        })
    }

    /// Recompute the commitment for `principal` and compare in constant time.
    ///
    /// A stored commitment that is not valid hex never matches.
    pub fn matches(&self, principal: &PrincipalId) -> Result<bool, SchemaError> {
        let Ok(stored) = blake3::Hash::from_hex(self.commitment.as_str()) else {
            return Ok(false);
        };
        let actual = commitment_hash(
            self.request_id,
            self.lane_id.as_ref(),
            &self.crossing_id,
            principal,
        )?;
        Ok(stored == actual)
    }

    pub fn key_for(request_id: RequestId) -> Result<CompositeKey, SchemaError> {
        CompositeKey::new(EntityKind::RequestAudit, [request_id.to_string()])
    }
}

impl Record for RequestAudit {
    const KIND: EntityKind = EntityKind::RequestAudit;

    fn key(&self) -> Result<CompositeKey, SchemaError> {
        Self::key_for(self.request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(s: &str) -> PrincipalId {
        PrincipalId::new(s)
    }

    fn sealed() -> RequestAudit {
        RequestAudit::seal(
            RequestId::new(1),
            Some(LaneId::new("L1")),
            CrossingId::new("C1"),
            &principal("x509::CN=car-1"),
        )
        .unwrap()
    }

    #[test]
    fn commitment_does_not_leak_principal() {
        let audit = sealed();
        assert_eq!(audit.commitment.len(), 64);
        assert!(!audit.commitment.contains("car-1"));
    }

    #[test]
    fn matches_original_principal_only() {
        let audit = sealed();
        assert!(audit.matches(&principal("x509::CN=car-1")).unwrap());
        assert!(!audit.matches(&principal("x509::CN=car-2")).unwrap());
    }

    #[test]
    fn commitment_is_bound_to_lane() {
        let a = sealed();
        let mut moved = a.clone();
        moved.lane_id = Some(LaneId::new("L2"));
        assert!(!moved.matches(&principal("x509::CN=car-1")).unwrap());
    }

    #[test]
    fn commitment_is_deterministic() {
        assert_eq!(sealed().commitment, sealed().commitment);
    }

    #[test]
    fn garbage_commitment_never_matches() {
        let mut audit = sealed();
        audit.commitment = Commitment::new("not-hex");
        assert!(!audit.matches(&principal("x509::CN=car-1")).unwrap());
    }

    #[test]
    fn json_roundtrip() {
        let audit = sealed();
        assert_eq!(
            RequestAudit::from_bytes(&audit.to_bytes().unwrap()).unwrap(),
            audit
        );
    }
}
