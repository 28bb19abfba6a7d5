//! Entitlement gate consumed before creating Spaces and share links.
//!
//! The engine does no quota arithmetic of its own: callers ask the gate, and a
//! refusal comes back as a typed [`SpaceError::QuotaExceeded`] or
//! [`SpaceError::FeatureDisabled`] carrying a stable code.

use crate::core::config::EntitlementsConfig;
use crate::core::error::SpaceError;
use crate::core::schemas;
use crate::plugins::space_store::SpaceStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

pub const CODE_SPACES_MAX_REACHED: &str = "spaces_max_reached";
pub const CODE_SHARE_DISABLED: &str = "share_disabled";
pub const CODE_SHARE_MAX_REACHED: &str = "share_max_reached";

pub trait EntitlementGate {
    /// `used` is the number of Spaces that already count against the limit.
    fn ensure_can_create_space(&self, used: u64) -> Result<(), SpaceError>;
    /// `used` is the number of share links already issued.
    fn ensure_can_create_share_link(&self, used: u64) -> Result<(), SpaceError>;
}

/// Gate that allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unrestricted;

impl EntitlementGate for Unrestricted {
    fn ensure_can_create_space(&self, _used: u64) -> Result<(), SpaceError> {
        Ok(())
    }

    fn ensure_can_create_share_link(&self, _used: u64) -> Result<(), SpaceError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementsSource {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    #[default]
    Free,
    BetaTester,
    Pro,
    Studio,
}

impl Plan {
    /// Unknown plan names fall back to `free`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "beta_tester" => Self::BetaTester,
            "pro" => Self::Pro,
            "studio" => Self::Studio,
            _ => Self::Free,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Features {
    pub share_enabled: bool,
    pub import_enabled: bool,
    pub portal_builder_enabled: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            share_enabled: true,
            import_enabled: true,
            portal_builder_enabled: true,
        }
    }
}

/// A limit of 0 means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    pub spaces_max: u64,
    pub share_readonly_links_max: u64,
    pub collab_max_members_per_space: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            spaces_max: 12,
            share_readonly_links_max: 8,
            collab_max_members_per_space: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementsSnapshot {
    pub source: EntitlementsSource,
    pub plan: Plan,
    pub features: Features,
    pub limits: Limits,
    pub updated_at: u64,
}

impl EntitlementsSnapshot {
    pub fn from_config(config: &EntitlementsConfig, now_ms: u64) -> Self {
        Self {
            source: EntitlementsSource::Local,
            plan: Plan::parse(&config.plan),
            features: Features {
                share_enabled: config.share_enabled,
                ..Features::default()
            },
            limits: Limits {
                spaces_max: config.spaces_max,
                share_readonly_links_max: config.share_links_max,
                ..Limits::default()
            },
            updated_at: now_ms,
        }
    }

    /// Build a snapshot from a loosely shaped payload.
    ///
    /// The payload may be wrapped in `payload`, `data` or `state`. Each value is looked
    /// up under several spellings (`spaces.max`, `spacesMax`, `limits.spacesMax`, ...),
    /// across the top level and the `entitlements` / `limits` / `features` maps. Missing
    /// or mistyped values keep their defaults. Returns `None` for a non-object.
    pub fn normalize(payload: &JsonValue, now_ms: u64) -> Option<Self> {
        let raw = payload.as_object()?;
        let unwrapped = ["payload", "data", "state"]
            .iter()
            .find_map(|key| raw.get(*key).and_then(JsonValue::as_object))
            .unwrap_or(raw);

        let section = |name: &str| unwrapped.get(name).and_then(JsonValue::as_object);
        let merged_with = |extra: Option<&Map<String, JsonValue>>| {
            let mut merged = unwrapped.clone();
            for map in [section("entitlements"), extra].into_iter().flatten() {
                for (key, value) in map {
                    merged.insert(key.clone(), value.clone());
                }
            }
            merged
        };
        let limit_fields = merged_with(section("limits"));
        let feature_fields = merged_with(section("features"));

        let defaults = Self::default();
        let number = |keys: &[&str], fallback: u64| {
            pick_first(&limit_fields, keys)
                .and_then(as_limit)
                .unwrap_or(fallback)
        };
        let flag = |keys: &[&str], fallback: bool| {
            pick_first(&feature_fields, keys)
                .and_then(JsonValue::as_bool)
                .unwrap_or(fallback)
        };

        Some(Self {
            source: EntitlementsSource::Remote,
            plan: unwrapped
                .get("plan")
                .and_then(JsonValue::as_str)
                .map(Plan::parse)
                .unwrap_or_default(),
            features: Features {
                share_enabled: flag(
                    &["share.enabled", "shareEnabled", "features.share.enabled", "features.shareEnabled"],
                    defaults.features.share_enabled,
                ),
                import_enabled: flag(
                    &["import.enabled", "importEnabled", "features.import.enabled", "features.importEnabled"],
                    defaults.features.import_enabled,
                ),
                portal_builder_enabled: flag(
                    &[
                        "portal.builder.enabled",
                        "portalBuilderEnabled",
                        "features.portal.builder.enabled",
                        "features.portalBuilderEnabled",
                    ],
                    defaults.features.portal_builder_enabled,
                ),
            },
            limits: Limits {
                spaces_max: number(
                    &["spaces.max", "spacesMax", "limits.spaces.max", "limits.spacesMax"],
                    defaults.limits.spaces_max,
                ),
                share_readonly_links_max: number(
                    &[
                        "share.readonly_links.max",
                        "shareReadonlyLinksMax",
                        "limits.share.readonly_links.max",
                        "limits.shareReadonlyLinksMax",
                    ],
                    defaults.limits.share_readonly_links_max,
                ),
                collab_max_members_per_space: number(
                    &["collab.max_members_per_space", "collabMaxMembersPerSpace"],
                    defaults.limits.collab_max_members_per_space,
                ),
            },
            updated_at: now_ms,
        })
    }
}

impl EntitlementGate for EntitlementsSnapshot {
    fn ensure_can_create_space(&self, used: u64) -> Result<(), SpaceError> {
        let max = self.limits.spaces_max;
        if max > 0 && used >= max {
            return Err(SpaceError::QuotaExceeded {
                code: CODE_SPACES_MAX_REACHED,
                message: format!("Space limit reached ({}/{}).", used, max),
                limit: Some(max),
                used: Some(used),
            });
        }
        Ok(())
    }

    fn ensure_can_create_share_link(&self, used: u64) -> Result<(), SpaceError> {
        if !self.features.share_enabled {
            return Err(SpaceError::FeatureDisabled {
                code: CODE_SHARE_DISABLED,
                message: "Sharing is disabled for the current entitlement.".to_string(),
            });
        }
        let max = self.limits.share_readonly_links_max;
        if max > 0 && used >= max {
            return Err(SpaceError::QuotaExceeded {
                code: CODE_SHARE_MAX_REACHED,
                message: format!("Share link limit reached ({}/{}).", used, max),
                limit: Some(max),
                used: Some(used),
            });
        }
        Ok(())
    }
}

/// Persisted snapshot if one is stored and readable, otherwise one built from config.
pub fn load_entitlements(
    store: &SpaceStore,
    config: &EntitlementsConfig,
) -> Result<EntitlementsSnapshot, SpaceError> {
    let now = store.now_ms();
    let persisted: Option<JsonValue> = store.read_record(schemas::SLOT_ENTITLEMENTS)?;
    let normalized = persisted.as_ref().and_then(|value| {
        let mut snapshot = EntitlementsSnapshot::normalize(value, now)?;
        if let Some(source) = value
            .get("source")
            .and_then(|source| serde_json::from_value(source.clone()).ok())
        {
            snapshot.source = source;
        }
        if let Some(updated_at) = value.get("updatedAt").and_then(JsonValue::as_u64) {
            snapshot.updated_at = updated_at;
        }
        Some(snapshot)
    });
    match normalized {
        Some(snapshot) => Ok(snapshot),
        None => {
            debug!("no persisted entitlements, using configured plan");
            Ok(EntitlementsSnapshot::from_config(config, now))
        }
    }
}

pub fn save_entitlements(store: &mut SpaceStore, snapshot: &EntitlementsSnapshot) -> Result<(), SpaceError> {
    store.write_record(schemas::SLOT_ENTITLEMENTS, snapshot)
}

fn read_nested<'a>(map: &'a Map<String, JsonValue>, key: &str) -> Option<&'a JsonValue> {
    if let Some(value) = map.get(key) {
        return Some(value);
    }
    let mut parts = key.split('.');
    let mut current = map.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn pick_first<'a>(map: &'a Map<String, JsonValue>, keys: &[&str]) -> Option<&'a JsonValue> {
    keys.iter().find_map(|key| read_nested(map, key))
}

fn as_limit(value: &JsonValue) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n as u64)
    })
}
