//! Entity categories.
//!
//! The category set is closed: every persisted entity carries exactly one of these,
//! and merges never change it. Extraction output names categories loosely (English
//! synonyms, the original Chinese type names, mixed case), so parsing goes through
//! [`Category::from_str_flexible`].

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};

/// Closed set of entity categories.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Country,
    Person,
    Organization,
    Institution,
    Facility,
    Equipment,
    Resource,
    Commodity,
    Weapon,
    Agreement,
    Incident,
}

impl Category {
    /// Parse a category with flexible matching.
    ///
    /// Accepts the canonical identifiers, common synonyms and the Chinese type
    /// names used by the extraction prompt.
    pub fn from_str_flexible(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");

        match normalized.as_str() {
            "country" | "nation" | "state" | "国家" => Some(Self::Country),

            "person" | "character" | "people" | "individual" | "人物" => Some(Self::Person),

            "organization" | "organisation" | "org" | "alliance" | "tissue"
            | "organizations_and_alliances" | "组织与联盟" | "组织" => Some(Self::Organization),

            "institution" | "agency" | "institute" | "机构" => Some(Self::Institution),

            "facility" | "facilities" | "installation" | "base" | "设施" => Some(Self::Facility),

            "equipment" | "tool" | "tools" | "equipment_and_tools" | "device"
            | "设备与工具" | "设备" => Some(Self::Equipment),

            "resource" | "resources" | "material" | "materials" | "supplies"
            | "resources_and_materials" | "资源与物资" | "资源" => Some(Self::Resource),

            "commodity" | "commodities" | "goods" | "product" | "商品" => Some(Self::Commodity),

            "weapon" | "weapons" | "arms" | "武器" => Some(Self::Weapon),

            "agreement" | "treaty" | "agreements_and_treaties" | "protocol"
            | "协议与条约" | "协议" | "条约" => Some(Self::Agreement),

            "incident" | "event" | "events" | "happening" | "事件" => Some(Self::Incident),

            _ => None,
        }
    }

    /// All categories in declaration order.
    pub fn all() -> Vec<Category> {
        Self::iter().collect()
    }

    /// Canonical identifier used in storage and artifacts.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Graph label used when no override is configured.
    pub fn default_label(&self) -> &'static str {
        match self {
            Self::Country => "Country",
            Self::Person => "Person",
            Self::Organization => "Organization",
            Self::Institution => "Institution",
            Self::Facility => "Facility",
            Self::Equipment => "Equipment",
            Self::Resource => "Resource",
            Self::Commodity => "Commodity",
            Self::Weapon => "Weapon",
            Self::Agreement => "Agreement",
            Self::Incident => "Event",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_flexible(s).ok_or_else(|| format!("Unknown category: {}", s))
    }
}
