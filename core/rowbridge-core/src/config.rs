//! Session configuration: root directory and default persistence.
//!
//! Settings come from code (builder methods), environment variables, or a
//! JSON file. Environment variables:
//!
//! | Variable                 | Meaning                                   |
//! |--------------------------|-------------------------------------------|
//! | `ROWBRIDGE_ROOT_DIR`     | base for relative locations (default `.`) |
//! | `ROWBRIDGE_PERSISTENCE`  | `transient` or `batch`                    |

use crate::error::{BridgeError, BridgeResult};
use crate::persist::{PersistenceMode, writer};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const ROOT_DIR_ENV: &str = "ROWBRIDGE_ROOT_DIR";
pub const PERSISTENCE_ENV: &str = "ROWBRIDGE_PERSISTENCE";

/// 세션 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 상대 경로 위치의 기준 디렉터리
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// import 지시에 모드가 없을 때 사용하는 영속성 전략
    #[serde(default)]
    pub default_persistence: PersistenceMode,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            default_persistence: PersistenceMode::Transient,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    pub fn with_default_persistence(mut self, mode: PersistenceMode) -> Self {
        self.default_persistence = mode;
        self
    }

    /// 환경 변수에서 로드
    pub fn from_env() -> BridgeResult<Self> {
        let mut config = Self::default();
        if let Ok(root) = env::var(ROOT_DIR_ENV)
            && !root.trim().is_empty()
        {
            config.root_dir = PathBuf::from(root);
        }
        if let Ok(mode) = env::var(PERSISTENCE_ENV) {
            config.default_persistence = parse_default_mode(&mode)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// 파일에서 로드
    pub fn from_file(path: &Path) -> BridgeResult<Self> {
        let location = path.display().to_string();
        let bytes = writer::read_local(path)?
            .ok_or_else(|| BridgeError::storage(&location, "config file does not exist"))?;
        let config: Self = serde_json::from_slice(&bytes).map_err(|err| {
            BridgeError::Configuration(format!("invalid config file '{location}': {err}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Continuous mode needs a catalog binding, so it cannot be a default.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.default_persistence == PersistenceMode::Continuous {
            return Err(BridgeError::Configuration(
                "continuous cannot be the default persistence mode".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_default_mode(value: &str) -> BridgeResult<PersistenceMode> {
    let mode: PersistenceMode = value.parse()?;
    if mode == PersistenceMode::Continuous {
        return Err(BridgeError::Configuration(format!(
            "{PERSISTENCE_ENV} must be transient or batch, got '{value}'"
        )));
    }
    Ok(mode)
}
