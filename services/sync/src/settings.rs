use zohomirror_common::error::{MirrorError, MirrorResult};

use crate::copier::DEFAULT_PAGE_SIZE;
use crate::fields::CollisionPolicy;
use crate::remote::ModuleDescriptor;

/// Sync-run settings, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct MirrorSettings {
    pub modules: Vec<ModuleDescriptor>,
    pub table_prefix: String,
    pub page_size: usize,
    pub watermark_field: String,
    pub collision_policy: CollisionPolicy,
    pub incremental: bool,
}

impl MirrorSettings {
    /// Reads:
    /// - `ZOHO_MODULES`     comma-separated plural module names (required)
    /// - `TABLE_PREFIX`     mirror table prefix, default `zoho_`
    /// - `PAGE_SIZE`        records per fetch, default 1000
    /// - `WATERMARK_FIELD`  activity field, default `Modified_Time`
    /// - `FIELD_COLLISION`  `fail` (default) or `last-wins`
    /// - `FULL_RESYNC`      `true`/`1` forces a full fetch
    pub fn from_env() -> MirrorResult<Self> {
        let _ = dotenvy::dotenv();

        let modules: Vec<ModuleDescriptor> = get_var("ZOHO_MODULES")?
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ModuleDescriptor::new)
            .collect();
        if modules.is_empty() {
            return Err(MirrorError::Config(
                "ZOHO_MODULES must name at least one module".to_string(),
            ));
        }

        let page_size = match std::env::var("PAGE_SIZE") {
            Ok(value) => value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| {
                    MirrorError::Config(format!(
                        "PAGE_SIZE must be a positive integer, got `{value}`"
                    ))
                })?,
            Err(_) => DEFAULT_PAGE_SIZE,
        };

        let collision_policy = match std::env::var("FIELD_COLLISION") {
            Ok(value) => CollisionPolicy::parse(&value).ok_or_else(|| {
                MirrorError::Config(format!(
                    "FIELD_COLLISION must be `fail` or `last-wins`, got `{value}`"
                ))
            })?,
            Err(_) => CollisionPolicy::default(),
        };

        let full_resync = std::env::var("FULL_RESYNC")
            .map(|value| value.eq_ignore_ascii_case("true") || value == "1")
            .unwrap_or(false);

        Ok(Self {
            modules,
            table_prefix: get_var_or("TABLE_PREFIX", "zoho_"),
            page_size,
            watermark_field: get_var_or("WATERMARK_FIELD", "Modified_Time"),
            collision_policy,
            incremental: !full_resync,
        })
    }
}

fn get_var(name: &str) -> MirrorResult<String> {
    std::env::var(name).map_err(|_| MirrorError::Config(format!("{name} must be set")))
}

fn get_var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
