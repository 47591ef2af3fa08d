// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Survey dataset names and their on-disk store directories

use crate::error::{FathomError, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Logical dataset written by a survey backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dataset {
    /// Per-ping sonar records for one sonar system
    Ping { system_id: String },
    Navigation,
    PostProcessedNavigation,
    Attitude,
}

impl Dataset {
    /// Parse a dataset name; `ping` requires a system identifier.
    pub fn parse(name: &str, system_id: Option<&str>) -> Result<Self> {
        match name {
            "ping" => match system_id {
                Some(id) if !id.is_empty() => Ok(Dataset::Ping {
                    system_id: id.to_string(),
                }),
                _ => Err(FathomError::UnknownDataset(
                    "ping datasets need a system identifier".to_string(),
                )),
            },
            "navigation" => Ok(Dataset::Navigation),
            "ppnav" => Ok(Dataset::PostProcessedNavigation),
            "attitude" => Ok(Dataset::Attitude),
            other => Err(FathomError::UnknownDataset(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Ping { .. } => "ping",
            Dataset::Navigation => "navigation",
            Dataset::PostProcessedNavigation => "ppnav",
            Dataset::Attitude => "attitude",
        }
    }

    /// Directory name of the store under the output folder
    pub fn store_dir_name(&self) -> String {
        match self {
            Dataset::Ping { system_id } => format!("ping_{}.fstore", system_id),
            other => format!("{}.fstore", other.name()),
        }
    }

    pub fn store_path(&self, output_folder: &Path) -> PathBuf {
        output_folder.join(self.store_dir_name())
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Ping { system_id } => write!(f, "ping[{}]", system_id),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_datasets() {
        assert_eq!(
            Dataset::parse("ping", Some("40111")).unwrap(),
            Dataset::Ping {
                system_id: "40111".to_string()
            }
        );
        assert_eq!(Dataset::parse("navigation", None).unwrap(), Dataset::Navigation);
        assert_eq!(
            Dataset::parse("ppnav", None).unwrap(),
            Dataset::PostProcessedNavigation
        );
        assert_eq!(Dataset::parse("attitude", None).unwrap(), Dataset::Attitude);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(matches!(
            Dataset::parse("sidescan", None),
            Err(FathomError::UnknownDataset(_))
        ));
        assert!(Dataset::parse("ping", None).is_err());
    }

    #[test]
    fn test_store_paths() {
        let root = Path::new("/data/line_0001");
        let ping = Dataset::Ping {
            system_id: "40111".to_string(),
        };
        assert_eq!(
            ping.store_path(root),
            PathBuf::from("/data/line_0001/ping_40111.fstore")
        );
        assert_eq!(
            Dataset::Attitude.store_path(root),
            PathBuf::from("/data/line_0001/attitude.fstore")
        );
    }
}
