use serde::{Deserialize, Serialize};

/// One flat Logs API record: field name to raw JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Records of a completed export, in response order.
pub type RecordBatch = Vec<Record>;

/// Body of a `200 OK` export response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPayload {
    pub data: RecordBatch,
}

/// An application whose logs are exported, as listed in `APPMETRICA_APP_IDS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub name: Option<String>,
    pub id: u64,
}

impl Application {
    /// Parse `4804657` or `NoProblem VPN:4804657`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let (name, id) = match raw.rsplit_once(':') {
            Some((name, id)) => (Some(name.trim()), id.trim()),
            None => (None, raw),
        };

        let id = id
            .parse::<u64>()
            .map_err(|_| format!("invalid application id in {raw:?}"))?;

        Ok(Self {
            name: name.filter(|n| !n.is_empty()).map(str::to_string),
            id,
        })
    }
}

impl std::fmt::Display for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}
