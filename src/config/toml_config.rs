use super::ConnectorSettings;
use crate::utils::error::{ConnectorError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_range, validate_region,
    validate_url, Validate,
};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

impl ConnectorSettings {
    /// 從 TOML 檔案載入設定
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析並驗證設定
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = substitute_env_vars(content);

        let settings: Self =
            toml::from_str(&processed_content).map_err(|e| ConnectorError::InvalidConfigValue {
                field: "toml_parsing".to_string(),
                value: String::new(),
                reason: format!("TOML parsing error: {}", e),
            })?;
        settings.validate()?;
        Ok(settings)
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static pattern compiles"))
}

/// 替換環境變數 (例如 ${VAULT_TOKEN})，未設定的變數保持原樣
fn substitute_env_vars(content: &str) -> String {
    env_var_pattern()
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned()
}

impl Validate for ConnectorSettings {
    fn validate(&self) -> Result<()> {
        validate_url("vault.address", &self.vault.address)?;
        validate_non_empty_string("vault.mount", &self.vault.mount)?;
        validate_range("vault.kv_version", self.vault.kv_version, 1, 2)?;
        validate_range("vault.timeout_seconds", self.vault.timeout_seconds, 1, 600)?;

        validate_positive_number("postgres.pool_max_size", self.postgres.pool_max_size, 1)?;
        validate_range(
            "postgres.connect_timeout_seconds",
            self.postgres.connect_timeout_seconds,
            1,
            600,
        )?;

        validate_url("storage.endpoint", &self.storage.endpoint)?;
        validate_region("storage.region", &self.storage.region)?;

        tracing::debug!("✅ Connector settings validation passed");
        Ok(())
    }
}
