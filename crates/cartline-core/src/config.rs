//! # Cart Configuration
//!
//! Settings for cart scopes, loaded once and passed to `CartOperations`.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CARTLINE_MAX_ITEMS=50                                              │
//! │     CARTLINE_MERGE_STRATEGY=keep_user                                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     cart.toml                                                          │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     unlimited rows, duplicates allowed, combine on merge               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # cart.toml
//! max_items_per_scope = 100
//! allow_duplicates = true
//! auto_remove_invalid_conditions = true
//! merge_strategy = "combine"   # keep_guest | keep_user | combine
//!
//! [default_tax]
//! rate_bps = 825
//! inclusive = false
//!
//! [scopes.wishlist]
//! max_items_per_scope = 20
//! allow_duplicates = false
//! default_tax = { rate_bps = 0 }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{CartError, CartResult};
use crate::money::Rate;

// =============================================================================
// Merge Strategy
// =============================================================================

/// How a guest cart and a user cart are reconciled on sign-in.
///
/// ```text
/// guest {A:2}        user {A:1, B:1}
///
/// KEEP_GUEST  → {A:2}
/// KEEP_USER   → {A:1, B:1}
/// COMBINE     → {A:3, B:1}    (default)
/// ```
///
/// Cart conditions always come from the user cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    KeepGuest,
    KeepUser,
    #[default]
    Combine,
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeStrategy::KeepGuest => write!(f, "keep_guest"),
            MergeStrategy::KeepUser => write!(f, "keep_user"),
            MergeStrategy::Combine => write!(f, "combine"),
        }
    }
}

impl std::str::FromStr for MergeStrategy {
    type Err = CartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "keep_guest" | "guest" => Ok(MergeStrategy::KeepGuest),
            "keep_user" | "user" => Ok(MergeStrategy::KeepUser),
            "combine" | "merge" => Ok(MergeStrategy::Combine),
            other => Err(CartError::Config(format!(
                "Unknown merge strategy: '{}'. Valid options: keep_guest, keep_user, combine",
                other
            ))),
        }
    }
}

// =============================================================================
// Default Tax
// =============================================================================

/// Tax applied to a scope that has no tax condition of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultTax {
    /// Basis points; 825 = 8.25%. Zero disables the default tax.
    pub rate_bps: u32,

    /// Whether shelf prices already include the tax.
    #[serde(default)]
    pub inclusive: bool,
}

impl DefaultTax {
    pub fn rate(&self) -> Rate {
        Rate::from_bps(self.rate_bps)
    }
}

// =============================================================================
// Per-Scope Overrides
// =============================================================================

/// Settings a single scope may override. Unset fields inherit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeOverrides {
    #[serde(default)]
    pub max_items_per_scope: Option<usize>,
    #[serde(default)]
    pub allow_duplicates: Option<bool>,
    #[serde(default)]
    pub default_tax: Option<DefaultTax>,
    #[serde(default)]
    pub auto_remove_invalid_conditions: Option<bool>,
    #[serde(default)]
    pub merge_strategy: Option<MergeStrategy>,
}

/// Effective settings for one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeConfig {
    pub scope: String,
    /// `None` means unlimited.
    pub max_items: Option<usize>,
    pub allow_duplicates: bool,
    /// Never carries a zero rate.
    pub default_tax: Option<DefaultTax>,
    pub auto_remove_invalid_conditions: bool,
    pub merge_strategy: MergeStrategy,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete cart configuration.
///
/// ## Example Config File
/// ```toml
/// max_items_per_scope = 100
/// merge_strategy = "keep_user"
///
/// [default_tax]
/// rate_bps = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartConfig {
    /// Row limit per scope. Omit for unlimited.
    #[serde(default)]
    pub max_items_per_scope: Option<usize>,

    /// Whether two rows may carry the same product with different options.
    #[serde(default = "default_true")]
    pub allow_duplicates: bool,

    /// Drop cart conditions that no longer validate when a cart is loaded.
    #[serde(default = "default_true")]
    pub auto_remove_invalid_conditions: bool,

    #[serde(default)]
    pub merge_strategy: MergeStrategy,

    #[serde(default)]
    pub default_tax: Option<DefaultTax>,

    /// Per-scope overrides keyed by scope name.
    #[serde(default)]
    pub scopes: BTreeMap<String, ScopeOverrides>,
}

fn default_true() -> bool {
    true
}

impl Default for CartConfig {
    fn default() -> Self {
        CartConfig {
            max_items_per_scope: None,
            allow_duplicates: default_true(),
            auto_remove_invalid_conditions: default_true(),
            merge_strategy: MergeStrategy::default(),
            default_tax: None,
            scopes: BTreeMap::new(),
        }
    }
}

impl CartConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file, if given and present
    /// 3. Environment variables
    pub fn load(config_path: Option<&Path>) -> CartResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            if path.exists() {
                info!(?path, "Loading cart config from file");
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    CartError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<&Path>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load cart config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document without touching the environment.
    pub fn from_toml(contents: &str) -> CartResult<Self> {
        toml::from_str(contents).map_err(|e| CartError::Config(e.to_string()))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> CartResult<()> {
        check_limit("max_items_per_scope", self.max_items_per_scope)?;
        check_tax("default_tax", self.default_tax.as_ref())?;

        for (scope, overrides) in &self.scopes {
            if scope.trim().is_empty() {
                return Err(CartError::Config("scope names must not be empty".into()));
            }
            check_limit(
                &format!("scopes.{scope}.max_items_per_scope"),
                overrides.max_items_per_scope,
            )?;
            check_tax(
                &format!("scopes.{scope}.default_tax"),
                overrides.default_tax.as_ref(),
            )?;
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup. Unparseable values are logged
    /// and skipped.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(max) = lookup("CARTLINE_MAX_ITEMS") {
            match max.trim() {
                "" | "0" | "none" | "unlimited" => self.max_items_per_scope = None,
                value => match value.parse::<usize>() {
                    Ok(n) => {
                        debug!(max_items = n, "Overriding row limit from environment");
                        self.max_items_per_scope = Some(n);
                    }
                    Err(_) => warn!(value = %max, "Ignoring invalid CARTLINE_MAX_ITEMS"),
                },
            }
        }

        if let Some(flag) = lookup("CARTLINE_ALLOW_DUPLICATES") {
            match parse_flag(&flag) {
                Some(allow) => self.allow_duplicates = allow,
                None => warn!(value = %flag, "Ignoring invalid CARTLINE_ALLOW_DUPLICATES"),
            }
        }

        if let Some(strategy) = lookup("CARTLINE_MERGE_STRATEGY") {
            match strategy.parse() {
                Ok(parsed) => {
                    debug!(strategy = %strategy, "Overriding merge strategy from environment");
                    self.merge_strategy = parsed;
                }
                Err(_) => warn!(strategy = %strategy, "Unknown merge strategy in environment"),
            }
        }

        if let Some(flag) = lookup("CARTLINE_AUTO_REMOVE_INVALID") {
            match parse_flag(&flag) {
                Some(remove) => self.auto_remove_invalid_conditions = remove,
                None => warn!(value = %flag, "Ignoring invalid CARTLINE_AUTO_REMOVE_INVALID"),
            }
        }

        if let Some(bps) = lookup("CARTLINE_DEFAULT_TAX_BPS") {
            match bps.trim().parse::<u32>() {
                Ok(rate_bps) => {
                    let inclusive = self.default_tax.map(|t| t.inclusive).unwrap_or(false);
                    self.default_tax = Some(DefaultTax {
                        rate_bps,
                        inclusive,
                    });
                }
                Err(_) => warn!(value = %bps, "Ignoring invalid CARTLINE_DEFAULT_TAX_BPS"),
            }
        }
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Effective settings for `scope`: global values with that scope's
    /// overrides applied.
    pub fn for_scope(&self, scope: &str) -> ScopeConfig {
        let overrides = self.scopes.get(scope).cloned().unwrap_or_default();
        let default_tax = overrides
            .default_tax
            .or(self.default_tax)
            .filter(|tax| tax.rate_bps > 0);

        ScopeConfig {
            scope: scope.to_string(),
            max_items: overrides.max_items_per_scope.or(self.max_items_per_scope),
            allow_duplicates: overrides.allow_duplicates.unwrap_or(self.allow_duplicates),
            default_tax,
            auto_remove_invalid_conditions: overrides
                .auto_remove_invalid_conditions
                .unwrap_or(self.auto_remove_invalid_conditions),
            merge_strategy: overrides.merge_strategy.unwrap_or(self.merge_strategy),
        }
    }
}

fn check_limit(field: &str, limit: Option<usize>) -> CartResult<()> {
    if limit == Some(0) {
        return Err(CartError::Config(format!(
            "{field} must be greater than 0 (omit it for unlimited)"
        )));
    }
    Ok(())
}

fn check_tax(field: &str, tax: Option<&DefaultTax>) -> CartResult<()> {
    match tax {
        Some(tax) if tax.rate_bps > Rate::BPS_SCALE => Err(CartError::Config(format!(
            "{field}.rate_bps must be at most {}, got {}",
            Rate::BPS_SCALE,
            tax.rate_bps
        ))),
        _ => Ok(()),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_merge_strategy_parsing() {
        assert_eq!("combine".parse::<MergeStrategy>().unwrap(), MergeStrategy::Combine);
        assert_eq!("keep_guest".parse::<MergeStrategy>().unwrap(), MergeStrategy::KeepGuest);
        assert_eq!("Keep-User".parse::<MergeStrategy>().unwrap(), MergeStrategy::KeepUser);
        assert!("newest".parse::<MergeStrategy>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = CartConfig::default();
        assert_eq!(config.max_items_per_scope, None);
        assert!(config.allow_duplicates);
        assert!(config.auto_remove_invalid_conditions);
        assert_eq!(config.merge_strategy, MergeStrategy::Combine);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_with_scope_overrides() {
        let config = CartConfig::from_toml(
            r#"
            max_items_per_scope = 100
            merge_strategy = "keep_user"

            [default_tax]
            rate_bps = 825

            [scopes.wishlist]
            max_items_per_scope = 20
            allow_duplicates = false
            default_tax = { rate_bps = 0 }
            "#,
        )
        .unwrap();

        let default = config.for_scope("default");
        assert_eq!(default.max_items, Some(100));
        assert_eq!(default.default_tax.map(|t| t.rate_bps), Some(825));
        assert_eq!(default.merge_strategy, MergeStrategy::KeepUser);

        let wishlist = config.for_scope("wishlist");
        assert_eq!(wishlist.max_items, Some(20));
        assert!(!wishlist.allow_duplicates);
        assert_eq!(wishlist.default_tax, None);
        assert_eq!(wishlist.merge_strategy, MergeStrategy::KeepUser);
    }

    #[test]
    fn test_config_validation() {
        let mut config = CartConfig::default();
        config.max_items_per_scope = Some(0);
        assert!(config.validate().is_err());

        config.max_items_per_scope = Some(10);
        config.default_tax = Some(DefaultTax {
            rate_bps: 12_000,
            inclusive: false,
        });
        assert!(config.validate().is_err());

        config.default_tax = None;
        config.scopes.insert(
            "wishlist".to_string(),
            ScopeOverrides {
                max_items_per_scope: Some(0),
                ..Default::default()
            },
        );
        assert!(matches!(config.validate(), Err(CartError::Config(msg)) if msg.contains("wishlist")));
    }

    #[test]
    fn test_overrides_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("CARTLINE_MAX_ITEMS", "50"),
            ("CARTLINE_ALLOW_DUPLICATES", "no"),
            ("CARTLINE_MERGE_STRATEGY", "keep_guest"),
            ("CARTLINE_AUTO_REMOVE_INVALID", "false"),
            ("CARTLINE_DEFAULT_TAX_BPS", "1000"),
        ]
        .into_iter()
        .collect();

        let mut config = CartConfig::default();
        config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.max_items_per_scope, Some(50));
        assert!(!config.allow_duplicates);
        assert_eq!(config.merge_strategy, MergeStrategy::KeepGuest);
        assert!(!config.auto_remove_invalid_conditions);
        assert_eq!(config.default_tax.map(|t| t.rate_bps), Some(1000));
    }

    #[test]
    fn test_invalid_overrides_are_ignored() {
        let mut config = CartConfig::default();
        config.apply_overrides_from(|key| match key {
            "CARTLINE_MAX_ITEMS" => Some("lots".to_string()),
            "CARTLINE_MERGE_STRATEGY" => Some("newest".to_string()),
            _ => None,
        });
        assert_eq!(config, CartConfig::default());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = CartConfig::load_or_default(Some(Path::new("/nonexistent/cart.toml")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let mut config = CartConfig::default();
        config.default_tax = Some(DefaultTax {
            rate_bps: 825,
            inclusive: true,
        });
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[default_tax]"));
        assert_eq!(CartConfig::from_toml(&toml_str).unwrap(), config);
    }
}
