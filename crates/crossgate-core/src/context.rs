use crate::config::ContractConfig;
use crate::ContractError;
use crossgate_schema::{OrgDomain, PrincipalId, TxTimestamp};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Authenticated caller of an invocation, as attested by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CallerIdentity {
    pub domain: OrgDomain,
    pub principal: PrincipalId,
}

impl CallerIdentity {
    pub fn new(domain: impl Into<OrgDomain>, principal: impl Into<PrincipalId>) -> Self {
        Self {
            domain: domain.into(),
            principal: principal.into(),
        }
    }
}

/// Everything the host supplies for one contract call.
///
/// The timestamp is the transaction clock: every party replaying the same
/// transaction sees the same value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invocation {
    pub caller: CallerIdentity,
    pub timestamp: TxTimestamp,
    pub tx_id: String,
}

impl Invocation {
    pub fn new(caller: CallerIdentity, timestamp: TxTimestamp, tx_id: impl Into<String>) -> Self {
        Self {
            caller,
            timestamp,
            tx_id: tx_id.into(),
        }
    }

    /// Transaction time in epoch seconds.
    pub fn now(&self) -> i64 {
        self.timestamp.epoch_seconds()
    }

    pub fn require_domain(&self, expected: &OrgDomain) -> Result<(), ContractError> {
        if self.caller.domain != *expected {
            warn!(
                "tx {}: caller from '{}' rejected, '{expected}' required",
                self.tx_id, self.caller.domain
            );
            return Err(ContractError::Unauthorized(format!(
                "caller domain '{}' is not '{expected}'",
                self.caller.domain
            )));
        }
        Ok(())
    }

    pub fn require_railway(&self, config: &ContractConfig) -> Result<(), ContractError> {
        self.require_domain(&config.railway_domain)
    }

    pub fn require_vehicle_owner(&self, config: &ContractConfig) -> Result<(), ContractError> {
        self.require_domain(&config.vehicle_owner_domain)
    }

    /// The railway domain's administrator principal.
    pub fn require_admin(&self, config: &ContractConfig) -> Result<(), ContractError> {
        self.require_railway(config)?;
        if self.caller.principal != config.railway_admin {
            warn!("tx {}: non-admin railway caller rejected", self.tx_id);
            return Err(ContractError::Unauthorized(
                "caller is not the railway administrator".to_owned(),
            ));
        }
        Ok(())
    }
}
