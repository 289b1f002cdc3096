use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::util::parse_seconds;

pub type TeamId = i64;
pub type RacerId = i64;
pub type SoapboxId = i64;
pub type RaceRunId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SoapboxClass {
    LuftreifenJunior,
    LuftreifenSenior,
    HartreifenJunior,
    HartreifenSenior,
    XKlasse,
    Veteranen,
    #[default]
    Unknown,
}

impl SoapboxClass {
    pub const ALL: [SoapboxClass; 7] = [
        SoapboxClass::LuftreifenJunior,
        SoapboxClass::LuftreifenSenior,
        SoapboxClass::HartreifenJunior,
        SoapboxClass::HartreifenSenior,
        SoapboxClass::XKlasse,
        SoapboxClass::Veteranen,
        SoapboxClass::Unknown,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            SoapboxClass::LuftreifenJunior => "LJ",
            SoapboxClass::LuftreifenSenior => "LS",
            SoapboxClass::HartreifenJunior => "HJ",
            SoapboxClass::HartreifenSenior => "HS",
            SoapboxClass::XKlasse => "XK",
            SoapboxClass::Veteranen => "VT",
            SoapboxClass::Unknown => "UN",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SoapboxClass::LuftreifenJunior => "Luftreifen Junior",
            SoapboxClass::LuftreifenSenior => "Luftreifen Senior",
            SoapboxClass::HartreifenJunior => "Hartreifen Junior",
            SoapboxClass::HartreifenSenior => "Hartreifen Senior",
            SoapboxClass::XKlasse => "X-Klasse",
            SoapboxClass::Veteranen => "Veteranen",
            SoapboxClass::Unknown => "Unknown",
        }
    }

    /// Unrecognised codes fall back to `Unknown`.
    pub fn from_code(code: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(code.trim()))
            .unwrap_or(SoapboxClass::Unknown)
    }
}

impl Serialize for SoapboxClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for SoapboxClass {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(SoapboxClass::from_code(&code))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RunType {
    #[serde(rename = "PR")]
    Practice,
    #[serde(rename = "H1")]
    Heat1,
    #[serde(rename = "H2")]
    Heat2,
}

impl RunType {
    pub const ALL: [RunType; 3] = [RunType::Practice, RunType::Heat1, RunType::Heat2];

    pub fn code(&self) -> &'static str {
        match self {
            RunType::Practice => "PR",
            RunType::Heat1 => "H1",
            RunType::Heat2 => "H2",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunType::Practice => "Practice",
            RunType::Heat1 => "Heat 1",
            RunType::Heat2 => "Heat 2",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.code().eq_ignore_ascii_case(code.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub racer_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Soapbox {
    pub id: SoapboxId,
    pub name: String,
    #[serde(default)]
    pub soapbox_class: SoapboxClass,
    #[serde(default)]
    pub soapbox_class_display: Option<String>,
    #[serde(default)]
    pub team: Option<TeamId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceRun {
    pub id: RaceRunId,
    #[serde(default)]
    pub racer: Option<RacerId>,
    pub run_type: RunType,
    #[serde(default)]
    pub run_type_display: Option<String>,
    #[serde(default = "first_run")]
    pub run_identifier: u16,
    /// Decimal seconds as sent by the backend, e.g. `"45.123"`.
    #[serde(default, deserialize_with = "lenient_time")]
    pub time_in_seconds: Option<String>,
    #[serde(default)]
    pub disqualified: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

fn first_run() -> u16 {
    1
}

/// The backend sends decimals as strings, but numbers show up too.
fn lenient_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Decode runs one by one, dropping any the client does not understand
/// (e.g. a run type added on the backend) instead of failing the list.
pub fn known_runs(values: Vec<serde_json::Value>) -> Vec<RaceRun> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<RaceRun>(value) {
            Ok(run) => Some(run),
            Err(e) => {
                log::warn!("skipping race run: {e}");
                None
            }
        })
        .collect()
}

fn lenient_runs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<RaceRun>, D::Error> {
    let values = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
    Ok(known_runs(values.unwrap_or_default()))
}

impl RaceRun {
    /// Time that may count towards a ranking: present, parseable and not
    /// disqualified.
    pub fn qualifying_time(&self) -> Option<f64> {
        if self.disqualified {
            return None;
        }
        self.time_in_seconds.as_deref().and_then(parse_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Racer {
    pub id: RacerId,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub start_number: Option<String>,
    #[serde(default)]
    pub soapbox_class: SoapboxClass,
    #[serde(default)]
    pub soapbox_class_display: Option<String>,
    #[serde(default)]
    pub team: Option<TeamId>,
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub soapbox: Option<SoapboxId>,
    #[serde(default, alias = "races", deserialize_with = "lenient_runs")]
    pub race_runs: Vec<RaceRun>,
}

impl Racer {
    pub fn display_name(&self) -> String {
        match &self.full_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("{} {}", self.first_name, self.last_name).trim().to_string(),
        }
    }

    pub fn class_label(&self) -> String {
        self.soapbox_class_display
            .clone()
            .unwrap_or_else(|| self.soapbox_class.label().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamForm {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoapboxForm {
    pub name: String,
    pub soapbox_class: SoapboxClass,
    pub team: Option<TeamId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RacerForm {
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_number: Option<String>,
    pub soapbox_class: SoapboxClass,
    pub team: Option<TeamId>,
    pub soapbox: Option<SoapboxId>,
}

/// A race run write. The racer is identified either by id or by start number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceRunForm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub racer_id: Option<RacerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub racer_start_number: Option<String>,
    pub run_type: RunType,
    pub run_identifier: u16,
    pub time_in_seconds: Option<String>,
    pub disqualified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
