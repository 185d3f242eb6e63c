//! 도메인 타입: 인스턴스 레코드, 상태 머신, 설정, 자격 증명
//!
//! [`InstanceRecord`] is the persisted shape of one user's instance.
//! Its [`InstanceStatus`] makes the in-flight `creating`/`deleting` phases
//! visible to a crash-recovery sweep instead of leaving them implicit in the
//! presence or absence of a record.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InstanceError;
use crate::naming::InstanceNames;

/// 인스턴스 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Owner claimed, container not confirmed yet
    Creating,
    /// Container running and routable
    Active,
    /// Teardown in progress
    Deleting,
}

impl InstanceStatus {
    /// Stable lowercase name used in storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Deleting => "deleting",
        }
    }

    /// Whether `self -> next` is an allowed transition.
    ///
    /// `Deleting -> Active` is the rollback taken when container removal
    /// fails, so the record keeps describing a live (if broken) instance.
    pub fn can_transition_to(&self, next: InstanceStatus) -> bool {
        matches!(
            (self, next),
            (Self::Creating, Self::Active)
                | (Self::Active, Self::Deleting)
                | (Self::Deleting, Self::Active)
        )
    }

    /// Returns `next` if the transition is allowed, otherwise `InvalidTransition`.
    pub fn transition(
        self,
        owner: &str,
        next: InstanceStatus,
    ) -> Result<InstanceStatus, InstanceError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InstanceError::InvalidTransition {
                owner: owner.to_owned(),
                from: self.as_str().to_owned(),
                to: next.as_str().to_owned(),
            })
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(Self::Creating),
            "active" => Ok(Self::Active),
            "deleting" => Ok(Self::Deleting),
            other => Err(format!("unknown instance status: {other}")),
        }
    }
}

/// Instance options the application understands.
///
/// Values are validated here, before the settings ever reach the runtime
/// adapter. Keys outside this list pass through as raw environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownSetting {
    /// Space separated plugin list (`ENABLE`)
    Enable,
    /// Plugins shown by default (`SHOW_PLUGINS`)
    ShowPlugins,
    /// `true` / `false`
    DevicestatusAdvanced,
    /// Space separated forecast sources, or `true`
    ShowForecast,
    /// `mg/dl` or `mmol`
    DisplayUnits,
    /// `12` or `24`
    TimeFormat,
    /// Free text title shown in the UI
    CustomTitle,
    /// `default`, `colors` or `colorblindfriendly`
    Theme,
    /// Space separated list of `simple` / `predict`
    AlarmTypes,
}

impl KnownSetting {
    /// Every recognized option.
    pub const ALL: [KnownSetting; 9] = [
        Self::Enable,
        Self::ShowPlugins,
        Self::DevicestatusAdvanced,
        Self::ShowForecast,
        Self::DisplayUnits,
        Self::TimeFormat,
        Self::CustomTitle,
        Self::Theme,
        Self::AlarmTypes,
    ];

    /// Canonical (lowercase) key.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::ShowPlugins => "show_plugins",
            Self::DevicestatusAdvanced => "devicestatus_advanced",
            Self::ShowForecast => "show_forecast",
            Self::DisplayUnits => "display_units",
            Self::TimeFormat => "time_format",
            Self::CustomTitle => "custom_title",
            Self::Theme => "theme",
            Self::AlarmTypes => "alarm_types",
        }
    }

    /// Looks up a key case-insensitively.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.key().eq_ignore_ascii_case(key))
    }

    fn validate(&self, value: &str) -> Result<(), String> {
        match self {
            Self::Enable | Self::ShowPlugins | Self::ShowForecast => {
                validate_word_list(value, |w| {
                    w.chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
                })
            }
            Self::DevicestatusAdvanced => match value {
                "true" | "false" => Ok(()),
                _ => Err("must be 'true' or 'false'".to_owned()),
            },
            Self::DisplayUnits => match value {
                "mg/dl" | "mmol" => Ok(()),
                _ => Err("must be 'mg/dl' or 'mmol'".to_owned()),
            },
            Self::TimeFormat => match value {
                "12" | "24" => Ok(()),
                _ => Err("must be '12' or '24'".to_owned()),
            },
            Self::CustomTitle => {
                if value.is_empty() || value.chars().count() > MAX_TITLE_LEN {
                    Err(format!("must be 1-{MAX_TITLE_LEN} characters"))
                } else if value.chars().any(char::is_control) {
                    Err("must not contain control characters".to_owned())
                } else {
                    Ok(())
                }
            }
            Self::Theme => match value {
                "default" | "colors" | "colorblindfriendly" => Ok(()),
                _ => Err("must be 'default', 'colors' or 'colorblindfriendly'".to_owned()),
            },
            Self::AlarmTypes => validate_word_list(value, |w| w == "simple" || w == "predict"),
        }
    }
}

const MAX_TITLE_LEN: usize = 100;
const MAX_PASSTHROUGH_KEY_LEN: usize = 64;
const MAX_VALUE_LEN: usize = 4096;

fn validate_word_list(value: &str, word_ok: impl Fn(&str) -> bool) -> Result<(), String> {
    let mut words = value.split_whitespace().peekable();
    if words.peek().is_none() {
        return Err("must list at least one entry".to_owned());
    }
    match words.find(|w| !word_ok(*w)) {
        Some(bad) => Err(format!("entry '{bad}' is not allowed")),
        None => Ok(()),
    }
}

fn is_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Per-instance configuration options, merged into the container environment.
///
/// Stored as an ordered string map so the persisted shape stays
/// `mapping<string,string>`. Construction through [`InstanceSettings::insert`]
/// validates recognized keys and restricts the rest to environment-variable
/// syntax.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceSettings(BTreeMap<String, String>);

impl InstanceSettings {
    /// Empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds settings from key/value pairs, validating each one.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, InstanceError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut settings = Self::new();
        for (k, v) in pairs {
            settings.insert(k, v)?;
        }
        Ok(settings)
    }

    /// Validates and inserts one option. Recognized keys are stored under
    /// their canonical lowercase name; later inserts overwrite earlier ones.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<&mut Self, InstanceError> {
        let key = key.into();
        let value = value.into();
        let reject = |reason: String| InstanceError::InvalidSetting {
            key: key.clone(),
            reason,
        };

        if value.len() > MAX_VALUE_LEN {
            return Err(reject(format!("value exceeds {MAX_VALUE_LEN} bytes")));
        }
        if value.contains('\0') {
            return Err(reject("value must not contain NUL".to_owned()));
        }

        let stored_key = match KnownSetting::from_key(&key) {
            Some(known) => {
                known.validate(&value).map_err(reject)?;
                known.key().to_owned()
            }
            None => {
                if key.len() > MAX_PASSTHROUGH_KEY_LEN || !is_env_key(&key) {
                    return Err(reject(
                        "passthrough keys must match [A-Za-z_][A-Za-z0-9_]* (max 64)".to_owned(),
                    ));
                }
                key.clone()
            }
        };

        self.0.insert(stored_key, value);
        Ok(self)
    }

    /// Typed setter for a recognized option.
    pub fn set(
        &mut self,
        setting: KnownSetting,
        value: impl Into<String>,
    ) -> Result<&mut Self, InstanceError> {
        self.insert(setting.key(), value)
    }

    /// Value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterates options in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no options are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Underlying map.
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

/// Instance access secret supplied by the identity collaborator.
///
/// Never printed: `Debug` and `Display` are redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessSecret(String);

impl AccessSecret {
    /// Wraps a credential. Length policy is enforced by the collaborator.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for handing to the runtime environment.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AccessSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessSecret(***)")
    }
}

impl fmt::Display for AccessSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// 인스턴스 레코드
///
/// One row of the record store. `container_name`, `subdomain` and `db_name`
/// are always [`InstanceNames::derive`] of `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Owner identity (unique)
    pub owner: String,
    /// Docker container name
    pub container_name: String,
    /// Routed subdomain
    pub subdomain: String,
    /// Logical database name
    pub db_name: String,
    /// Claim time
    pub created_at: DateTime<Utc>,
    /// Instance options
    pub settings: InstanceSettings,
    /// Lifecycle status
    pub status: InstanceStatus,
}

impl InstanceRecord {
    /// New record in `Creating` status with names derived from `owner`.
    pub fn claim(owner: &str, settings: InstanceSettings, created_at: DateTime<Utc>) -> Self {
        let names = InstanceNames::derive(owner);
        Self {
            owner: owner.to_owned(),
            container_name: names.container_name,
            subdomain: names.subdomain,
            db_name: names.db_name,
            created_at,
            settings,
            status: InstanceStatus::Creating,
        }
    }

    /// Public URL of the instance under `base_domain`.
    pub fn url(&self, base_domain: &str) -> String {
        format!("https://{}.{}", self.subdomain, base_domain)
    }
}

impl fmt::Display for InstanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] container={} subdomain={} db={}",
            self.owner, self.status, self.container_name, self.subdomain, self.db_name,
        )
    }
}
