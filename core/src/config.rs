use crate::pic::PicAssignment;
use crate::resolver::{COSTING_PAIR, DEFAULT_PIC, DIALUX_SPECIALIST};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keyword: String,
    pub pic: PicAssignment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRule {
    pub team: String,
    pub pic: PicAssignment,
}

/// The resolver table as written in `portal.json`. Keyword rules are
/// evaluated before team rules, each group in file order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub keyword_rules: Vec<KeywordRule>,
    #[serde(default)]
    pub team_rules: Vec<TeamRule>,
    /// Required. A table without a default is rejected at startup.
    #[serde(default)]
    pub default_pic: Option<PicAssignment>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            keyword_rules: vec![
                KeywordRule {
                    keyword: "dialux".into(),
                    pic: PicAssignment::one(DIALUX_SPECIALIST),
                },
                KeywordRule {
                    keyword: "costing".into(),
                    pic: PicAssignment::one(COSTING_PAIR),
                },
            ],
            team_rules: Vec::new(),
            default_pic: Some(PicAssignment::one(DEFAULT_PIC)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// How long a directory answer is reused before asking again.
    #[serde(default = "default_cache_ttl_secs")]
    pub directory_cache_ttl_secs: i64,
    /// Fixed seed for id generation. `None` seeds from OS entropy.
    #[serde(default)]
    pub id_seed: Option<u64>,
    /// Attempts at finding an unused `PRT-####` code before giving up.
    #[serde(default = "default_uid_attempts")]
    pub protocol_uid_attempts: u32,
}

fn default_cache_ttl_secs() -> i64 {
    300
}

fn default_uid_attempts() -> u32 {
    32
}

impl PortalConfig {
    /// Load from `<data_dir>/portal.json`.
    /// In tests, use PortalConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/portal.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PortalConfig = serde_json::from_str(&content)?;
        if config.directory_cache_ttl_secs < 0 {
            anyhow::bail!("directory_cache_ttl_secs must not be negative in {path}");
        }
        Ok(config)
    }

    pub fn default_test() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            directory_cache_ttl_secs: 60,
            id_seed: Some(42),
            protocol_uid_attempts: default_uid_attempts(),
        }
    }

    pub fn directory_cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.directory_cache_ttl_secs)
    }
}
