use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Gender as detected by the heuristic in `engine::gender`, or recorded at
/// registration time. `Unknown` never blocks play — it only makes a
/// customer ineligible for gender-restricted prizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    F,
    M,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderRestriction {
    F,
    M,
    None,
}

impl GenderRestriction {
    pub fn admits(&self, gender: Gender) -> bool {
        match self {
            GenderRestriction::None => true,
            GenderRestriction::F => gender == Gender::F,
            GenderRestriction::M => gender == Gender::M,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionStatus {
    Draft,
    Active,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Available,
    Used,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: PromotionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: Uuid,
    pub promotion_id: Uuid,
    pub code: String,
    pub status: TokenStatus,
    pub used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrizeType {
    pub id: Uuid,
    pub promotion_id: Uuid,
    pub name: String,
    pub initial_stock: i64,
    pub remaining_stock: i64,
    pub gender_restriction: GenderRestriction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub promotion_id: Uuid,
    pub phone_number: String,
    pub first_name: String,
    pub last_name: String,
    pub detected_gender: Gender,
    pub total_plays: i64,
    pub total_wins: i64,
    pub last_win_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Play {
    pub id: Uuid,
    pub promotion_id: Uuid,
    pub token_id: Uuid,
    pub customer_id: Uuid,
    pub is_winner: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrizeAssignment {
    pub id: Uuid,
    pub promotion_id: Uuid,
    pub prize_type_id: Uuid,
    pub customer_id: Uuid,
    pub token_id: Uuid,
    pub play_id: Uuid,
    pub prize_code: String,
    pub redeemed_at: Option<DateTime<Utc>>,
}
