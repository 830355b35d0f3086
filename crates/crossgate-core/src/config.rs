use crossgate_schema::{OrgDomain, PrincipalId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("railway_domain and vehicle_owner_domain must differ (both '{0}')")]
    SameDomain(String),
    #[error("validity_duration_secs must be greater than zero")]
    ZeroValidity,
}

/// Deployment parameters of a crossing contract.
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ContractConfig {
    /// Authentication domain of the railway operator.
    pub railway_domain: OrgDomain,
    /// Authentication domain of vehicle owners.
    pub vehicle_owner_domain: OrgDomain,
    /// The one railway principal allowed to administer crossings.
    pub railway_admin: PrincipalId,
    /// How long a crossing stays valid for trains after becoming free.
    pub validity_duration_secs: u32,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            railway_domain: OrgDomain::new("RailwayOrgMSP"),
            vehicle_owner_domain: OrgDomain::new("VehicleOwnerOrgMSP"),
            railway_admin: PrincipalId::new(
                "x509::CN=RailwayOrg Admin, OU=admin::CN=RailwayOrg CA",
            ),
            validity_duration_secs: 60,
        }
    }
}

impl ContractConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.railway_domain.trim().is_empty() {
            return Err(ConfigError::Empty("railway_domain"));
        }
        if self.vehicle_owner_domain.trim().is_empty() {
            return Err(ConfigError::Empty("vehicle_owner_domain"));
        }
        if self.railway_admin.trim().is_empty() {
            return Err(ConfigError::Empty("railway_admin"));
        }
        if self.railway_domain == self.vehicle_owner_domain {
            return Err(ConfigError::SameDomain(self.railway_domain.to_string()));
        }
        if self.validity_duration_secs == 0 {
            return Err(ConfigError::ZeroValidity);
        }
        Ok(())
    }

    /// `validUntil` for a crossing that becomes free at `now`.
    pub fn valid_until_from(&self, now: i64) -> i64 {
        now.saturating_add(i64::from(self.validity_duration_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ContractConfig::from_toml_str("").unwrap();
        assert_eq!(config, ContractConfig::default());
        assert_eq!(config.railway_domain, "RailwayOrgMSP");
        assert_eq!(config.validity_duration_secs, 60);
    }

    #[test]
    fn parses_overrides() {
        let config = ContractConfig::from_toml_str(
            r#"
railway_domain = "RailCo"
vehicle_owner_domain = "Motorists"
railway_admin = "x509::CN=ops"
validity_duration_secs = 120
"#,
        )
        .unwrap();
        assert_eq!(config.railway_domain, "RailCo");
        assert_eq!(config.railway_admin, "x509::CN=ops");
        assert_eq!(config.valid_until_from(10), 130);
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(matches!(
            ContractConfig::from_toml_str("lanes = 3"),
            Err(ConfigError::ParseToml(_))
        ));
    }

    #[test]
    fn rejects_zero_validity() {
        assert!(matches!(
            ContractConfig::from_toml_str("validity_duration_secs = 0"),
            Err(ConfigError::ZeroValidity)
        ));
    }

    #[test]
    fn rejects_shared_domain() {
        let err = ContractConfig::from_toml_str(
            r#"
railway_domain = "Org"
vehicle_owner_domain = "Org"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Org"));
    }

    #[test]
    fn rejects_blank_admin() {
        assert!(matches!(
            ContractConfig::from_toml_str(r#"railway_admin = "  ""#),
            Err(ConfigError::Empty("railway_admin"))
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crossgate.toml");
        fs::write(&path, "validity_duration_secs = 5\n").unwrap();
        assert_eq!(ContractConfig::load(&path).unwrap().validity_duration_secs, 5);
    }
}
