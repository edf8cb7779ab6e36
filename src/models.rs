use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::ai::AssistantClient;
use crate::payments::PaymentProvider;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub session_ttl_hours: i64,
    pub payments: Arc<dyn PaymentProvider>,
    pub assistant: Arc<AssistantClient>,
}

/* -------------------------
   Domain enums

   Every enumerated value lives here and nowhere else; route code
   matches on these variants instead of comparing strings.
--------------------------*/

/// Stored account type. `client` books, everything else offers a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Client,
    Vet,
    Farrier,
    Dentist,
    Physio,
    Trainer,
    Cleaner,
    Food,
    Events,
}

/// What a professional does. Parallel to the non-client `UserType` variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specialty {
    Vet,
    Farrier,
    Dentist,
    Physio,
    Trainer,
    Cleaner,
    Food,
    Events,
}

/// Closed role type used at every authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Professional(Specialty),
}

impl UserType {
    pub fn role(self) -> Role {
        match self {
            UserType::Client => Role::Client,
            UserType::Vet => Role::Professional(Specialty::Vet),
            UserType::Farrier => Role::Professional(Specialty::Farrier),
            UserType::Dentist => Role::Professional(Specialty::Dentist),
            UserType::Physio => Role::Professional(Specialty::Physio),
            UserType::Trainer => Role::Professional(Specialty::Trainer),
            UserType::Cleaner => Role::Professional(Specialty::Cleaner),
            UserType::Food => Role::Professional(Specialty::Food),
            UserType::Events => Role::Professional(Specialty::Events),
        }
    }

    pub fn is_professional(self) -> bool {
        matches!(self.role(), Role::Professional(_))
    }

    pub fn label(self) -> &'static str {
        match self {
            UserType::Client => "Horse owner",
            UserType::Vet => "Veterinarian",
            UserType::Farrier => "Farrier",
            UserType::Dentist => "Equine dentist",
            UserType::Physio => "Physiotherapist",
            UserType::Trainer => "Trainer",
            UserType::Cleaner => "Stable cleaning",
            UserType::Food => "Feed supplier",
            UserType::Events => "Event organizer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "service_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    VetVisit,
    Farrier,
    Dental,
    Physio,
    Training,
    Cleaning,
}

impl ServiceType {
    pub fn label(self) -> &'static str {
        match self {
            ServiceType::VetVisit => "Veterinary visit",
            ServiceType::Farrier => "Farrier",
            ServiceType::Dental => "Dental care",
            ServiceType::Physio => "Physiotherapy",
            ServiceType::Training => "Training",
            ServiceType::Cleaning => "Stable cleaning",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "appointment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    /// Terminal appointments never change status again.
    pub fn is_terminal(self) -> bool {
        matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::Completed)
    }

    pub fn label(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "Pending",
            AppointmentStatus::Confirmed => "Confirmed",
            AppointmentStatus::Cancelled => "Cancelled",
            AppointmentStatus::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    PaidAdvance,
    PaidComplete,
    Unpaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "recurrence_frequency", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "connection_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Which side of an appointment a user stands on. Also stored as
/// `created_by` to remember who initiated the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "party", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Client,
    Professional,
}

impl Party {
    pub fn other(self) -> Party {
        match self {
            Party::Client => Party::Professional,
            Party::Professional => Party::Client,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    Basic,
    Premium,
}

/* -------------------------
   API DTOs (auth)
--------------------------*/

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub user_type: UserType,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_name: Option<String>,
    pub remember_me: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub data: LoginResponseData,
}

#[derive(Debug, Serialize)]
pub struct LoginResponseData {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub rider: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub data: SessionResponseData,
}

#[derive(Debug, Serialize)]
pub struct SessionResponseData {
    pub rider: UserProfile,
    pub session: SessionInfo,
}

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub data: OkData,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

/// Public view of an account; never carries the password hash.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub user_type: UserType,
    pub user_type_label: &'static str,
    pub is_professional: bool,
    pub subscription_type: Option<SubscriptionType>,
}

impl From<UserRow> for UserProfile {
    fn from(u: UserRow) -> Self {
        UserProfile {
            user_id: u.user_id,
            user_type_label: u.user_type.label(),
            is_professional: u.user_type.is_professional(),
            email: u.email,
            display_name: u.display_name,
            user_type: u.user_type,
            subscription_type: u.subscription_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub user_type: UserType,
    pub subscription_type: Option<SubscriptionType>,
    pub customer_ref: Option<String>,
    pub subscription_ref: Option<String>,
    pub connect_account_ref: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionTokenRow {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HorseRow {
    pub horse_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub breed: Option<String>,
    pub birth_year: Option<i32>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ConnectionRow {
    pub connection_id: Uuid,
    pub client_id: Uuid,
    pub professional_id: Uuid,
    pub status: ConnectionStatus,
    pub request_date: DateTime<Utc>,
    pub response_date: Option<DateTime<Utc>>,
}

/// The central entity. `horse_ids[0]` is the primary horse; there is no
/// separate single-horse column.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AppointmentRow {
    pub appointment_id: Uuid,
    pub horse_ids: Vec<Uuid>,
    pub client_id: Uuid,
    pub professional_id: Uuid,
    pub service_type: ServiceType,
    pub title: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub start_at: DateTime<Utc>,
    pub duration_min: i32,
    pub is_periodic: bool,
    pub frequency: Option<Frequency>,
    pub repeat_until: Option<DateTime<Utc>>,
    pub status: AppointmentStatus,
    pub price_cents: Option<i32>,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub payment_ref: Option<String>,
    pub commission_cents: i32,
    pub fee_collected: bool,
    pub transferred_to_professional: bool,
    pub invoice_url: Option<String>,
    pub created_by: Party,
    pub has_alternative: bool,
    pub original_appointment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MessageRow {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub is_read: bool,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MedicalRecordRow {
    pub record_id: Uuid,
    pub horse_id: Uuid,
    pub professional_id: Uuid,
    pub record_type: String,
    pub description: String,
    pub medication: Option<String>,
    pub next_due: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ServiceRecordRow {
    pub record_id: Uuid,
    pub horse_id: Uuid,
    pub professional_id: Uuid,
    pub service_type: ServiceType,
    pub description: String,
    pub price_cents: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReviewRow {
    pub review_id: Uuid,
    pub client_id: Uuid,
    pub professional_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/* -------------------------
   Helpers
--------------------------*/

/// Default platform fee per appointment: 0,99 €.
pub const DEFAULT_COMMISSION_CENTS: i32 = 99;

/// Prices are stored as integer cents; only here do they become text.
/// 10000 -> "100,00 €".
pub fn format_cents_eur(cents: i32) -> String {
    format!("{},{:02} €", cents / 100, cents.rem_euclid(100))
}

/// Mean rating over the listed reviews. Callers compute this from the
/// full list; nothing denormalized is stored.
pub fn average_rating(ratings: &[i16]) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }
    let sum: i64 = ratings.iter().map(|r| *r as i64).sum();
    Some(sum as f64 / ratings.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_mapping_is_exhaustive() {
        assert_eq!(UserType::Client.role(), Role::Client);
        assert_eq!(UserType::Vet.role(), Role::Professional(Specialty::Vet));
        assert_eq!(UserType::Events.role(), Role::Professional(Specialty::Events));
        assert!(!UserType::Client.is_professional());
        assert!(UserType::Farrier.is_professional());
    }

    #[test]
    fn test_format_cents_eur() {
        assert_eq!(format_cents_eur(10000), "100,00 €");
        assert_eq!(format_cents_eur(99), "0,99 €");
        assert_eq!(format_cents_eur(150), "1,50 €");
        assert_eq!(format_cents_eur(5), "0,05 €");
    }

    #[test]
    fn test_average_rating() {
        assert_eq!(average_rating(&[]), None);
        assert_eq!(average_rating(&[4, 5]), Some(4.5));
        assert_eq!(average_rating(&[1, 1, 1]), Some(1.0));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(AppointmentStatus::Cancelled.is_terminal());
        assert!(AppointmentStatus::Completed.is_terminal());
        assert!(!AppointmentStatus::Pending.is_terminal());
        assert!(!AppointmentStatus::Confirmed.is_terminal());
    }

    #[test]
    fn test_party_other() {
        assert_eq!(Party::Client.other(), Party::Professional);
        assert_eq!(Party::Professional.other(), Party::Client);
    }
}
