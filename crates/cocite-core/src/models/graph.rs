use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{CocitationError, Result};

use super::identifier::Identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkingMode {
    #[default]
    BibliographicCoupling,
    CoCitation,
    Amsler,
}

impl LinkingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BibliographicCoupling => "bibliographic_coupling",
            Self::CoCitation => "co_citation",
            Self::Amsler => "amsler",
        }
    }
}

impl fmt::Display for LinkingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkingMode {
    type Err = CocitationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "bibliographic_coupling" | "bc" => Ok(Self::BibliographicCoupling),
            "co_citation" | "cocitation" | "cc" => Ok(Self::CoCitation),
            "amsler" => Ok(Self::Amsler),
            other => Err(CocitationError::InvalidConfig(format!(
                "unknown linking mode: {other}"
            ))),
        }
    }
}

/// Undirected weighted edge; `source_id < target_id`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source_id: u32,
    pub target_id: u32,
    pub strength: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeWeights {
    #[serde(rename = "Links")]
    pub links: f64,
    #[serde(rename = "Total link strength")]
    pub total_link_strength: f64,
    #[serde(rename = "Citations")]
    pub citations: f64,
    #[serde(rename = "Norm. citations")]
    pub norm_citations: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeScores {
    #[serde(rename = "Pub. year")]
    pub pub_year: f64,
    #[serde(rename = "Citations")]
    pub citations: f64,
    #[serde(rename = "Norm. citations")]
    pub norm_citations: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u32,
    pub identifier: Identifier,
    pub label: String,
    pub description: String,
    pub url: String,
    pub x: f64,
    pub y: f64,
    pub cluster: u32,
    pub weights: NodeWeights,
    pub scores: NodeScores,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStructure {
    pub nodes: Vec<NodeRecord>,
    pub links: Vec<Link>,
}

impl GraphStructure {
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// VOSviewer JSON layout: `{"network": {"items": [...], "links": [...]}}`.
    pub fn to_vosviewer(&self) -> Value {
        json!({
            "network": {
                "items": self.nodes,
                "links": self.links,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linking_mode_parses_aliases() {
        assert_eq!("co-citation".parse::<LinkingMode>().unwrap(), LinkingMode::CoCitation);
        assert_eq!("BC".parse::<LinkingMode>().unwrap(), LinkingMode::BibliographicCoupling);
        assert_eq!("amsler".parse::<LinkingMode>().unwrap(), LinkingMode::Amsler);
        assert!("pagerank".parse::<LinkingMode>().is_err());
    }

    #[test]
    fn vosviewer_export_shape() {
        let graph = GraphStructure {
            nodes: vec![NodeRecord {
                id: 0,
                identifier: Identifier::parse("10.1/a").unwrap(),
                label: "Smith (2020)".into(),
                description: String::new(),
                url: "https://doi.org/10.1/a".into(),
                x: 0.5,
                y: -0.5,
                cluster: 1,
                weights: NodeWeights {
                    links: 1.0,
                    total_link_strength: 2.0,
                    ..Default::default()
                },
                scores: NodeScores::default(),
            }],
            links: vec![Link { source_id: 0, target_id: 1, strength: 2.0 }],
        };

        let v = graph.to_vosviewer();
        assert_eq!(v["network"]["items"][0]["weights"]["Total link strength"], 2.0);
        assert_eq!(v["network"]["links"][0]["target_id"], 1);
    }
}
