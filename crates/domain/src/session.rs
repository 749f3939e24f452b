//! Sessions — groups of related clipboard items.
//!
//! A session is created `inactive` with a single member, becomes `active`
//! exactly when a second member joins, and is swept to `expired` after the
//! idle timeout. Expired sessions never reactivate; a matching new item
//! starts a fresh session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The research kind the engine detected for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    HotelResearch,
    RestaurantResearch,
    ProductResearch,
    AcademicResearch,
    TravelResearch,
    ServiceResearch,
    GeneralResearch,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HotelResearch => "hotel_research",
            Self::RestaurantResearch => "restaurant_research",
            Self::ProductResearch => "product_research",
            Self::AcademicResearch => "academic_research",
            Self::TravelResearch => "travel_research",
            Self::ServiceResearch => "service_research",
            Self::GeneralResearch => "general_research",
        }
    }

    /// Parse a model- or store-provided type string. Unknown strings map to
    /// `GeneralResearch` so a creative model answer cannot poison a row.
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim() {
            "hotel_research" => Self::HotelResearch,
            "restaurant_research" => Self::RestaurantResearch,
            "product_research" => Self::ProductResearch,
            "academic_research" => Self::AcademicResearch,
            "travel_research" => Self::TravelResearch,
            "service_research" => Self::ServiceResearch,
            _ => Self::GeneralResearch,
        }
    }

    /// Short human noun used in session labels ("Hotel Research").
    pub fn label_noun(&self) -> &'static str {
        match self {
            Self::HotelResearch => "Hotel Research",
            Self::RestaurantResearch => "Restaurant Research",
            Self::ProductResearch => "Product Research",
            Self::AcademicResearch => "Academic Research",
            Self::TravelResearch => "Travel Research",
            Self::ServiceResearch => "Service Research",
            Self::GeneralResearch => "General Research",
        }
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status & state machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Inactive,
    Active,
    Expired,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inactive" => Some(Self::Inactive),
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Legal edges of the session state machine.
    ///
    /// `Expired` and `Completed` are terminal; a user close reaches
    /// `Completed` from either live state.
    pub fn can_transition(from: Self, to: Self) -> bool {
        use SessionStatus::*;
        matches!(
            (from, to),
            (Inactive, Active)
                | (Inactive, Expired)
                | (Active, Expired)
                | (Inactive, Completed)
                | (Active, Completed)
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session & membership rows
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A coherent group of related items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub session_type: SessionType,
    pub session_label: String,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub context_summary: Option<serde_json::Value>,
    #[serde(default)]
    pub intent_analysis: Option<serde_json::Value>,
}

impl Session {
    pub fn new(session_type: SessionType, label: String, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_type,
            session_label: label,
            status: SessionStatus::Inactive,
            start_time: at,
            last_activity: at,
            context_summary: None,
            intent_analysis: None,
        }
    }
}

/// Item↔session edge. `sequence_order` is dense 1..N within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMember {
    pub session_id: Uuid,
    pub clipboard_item_id: Uuid,
    pub sequence_order: u32,
}
