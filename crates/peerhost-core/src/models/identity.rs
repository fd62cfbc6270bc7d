use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

const MAX_ODIN_ID_LENGTH: usize = 255;
const MAX_LABEL_LENGTH: usize = 63;

/// Address of a federated identity (domain-like, e.g. `frodo.dotyou.cloud`).
///
/// Always stored lowercase so two spellings of the same identity compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OdinId(String);

impl OdinId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OdinId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let candidate = s.trim().to_lowercase();

        if candidate.is_empty() || candidate.len() > MAX_ODIN_ID_LENGTH {
            return Err(anyhow::anyhow!("Invalid identity: length must be 1..=255"));
        }

        let labels: Vec<&str> = candidate.split('.').collect();
        if labels.len() < 2 {
            return Err(anyhow::anyhow!(
                "Invalid identity '{}': must contain at least two labels",
                candidate
            ));
        }

        for label in labels {
            let valid = !label.is_empty()
                && label.len() <= MAX_LABEL_LENGTH
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
            if !valid {
                return Err(anyhow::anyhow!(
                    "Invalid identity '{}': bad label '{}'",
                    candidate,
                    label
                ));
            }
        }

        Ok(OdinId(candidate))
    }
}

impl TryFrom<String> for OdinId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OdinId> for String {
    fn from(id: OdinId) -> Self {
        id.0
    }
}

impl Display for OdinId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case() {
        let id: OdinId = "Frodo.DotYou.Cloud".parse().unwrap();
        assert_eq!(id.as_str(), "frodo.dotyou.cloud");
        assert_eq!(id, "frodo.dotyou.cloud".parse().unwrap());
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!("".parse::<OdinId>().is_err());
        assert!("localhost".parse::<OdinId>().is_err());
        assert!("bad..domain".parse::<OdinId>().is_err());
        assert!("-bad.domain".parse::<OdinId>().is_err());
        assert!("under_score.domain".parse::<OdinId>().is_err());
    }

    #[test]
    fn test_serde_roundtrip_validates() {
        let json = serde_json::to_string(&"sam.dotyou.cloud".parse::<OdinId>().unwrap()).unwrap();
        assert_eq!(json, "\"sam.dotyou.cloud\"");

        let bad: Result<OdinId, _> = serde_json::from_str("\"not an id\"");
        assert!(bad.is_err());
    }
}
