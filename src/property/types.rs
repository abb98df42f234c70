//! Property units: tenants, rooms, parking spaces and utility meters

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::types::*;

/// A managed property; the tenant boundary for rooms and bills
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
    pub code: String,
    pub address: Option<String>,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomStatus {
    Occupied,
    Vacant,
}

/// Monthly fee item configured on a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeItem {
    pub name: String,
    pub standard: BigDecimal,
}

impl FeeItem {
    pub fn new(name: impl Into<String>, standard: BigDecimal) -> Self {
        Self {
            name: name.into(),
            standard,
        }
    }
}

/// Rooms carry up to this many fee items
pub const MAX_FEE_ITEMS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub property_id: PropertyId,
    pub room_number: String,
    pub owner_name: Option<String>,
    pub owner_phone: Option<String>,
    pub area: BigDecimal,
    pub status: RoomStatus,
    /// Prepaid wallet, mirrored by the advance receipts account
    pub balance: BigDecimal,
    pub fee_items: Vec<FeeItem>,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
}

impl Room {
    /// Standard amount of the named fee item, matched on trimmed names
    pub fn fee_standard(&self, fee_name: &str) -> Option<&BigDecimal> {
        let wanted = fee_name.trim();
        self.fee_items
            .iter()
            .find(|item| item.name.trim() == wanted)
            .map(|item| &item.standard)
    }

    /// Rooms that take part in periodic billing
    pub fn is_billable(&self) -> bool {
        !self.is_deleted && self.status != RoomStatus::Vacant
    }
}

/// Fields for registering a room
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub property_id: PropertyId,
    pub room_number: String,
    pub owner_name: Option<String>,
    pub owner_phone: Option<String>,
    pub area: BigDecimal,
    pub status: RoomStatus,
    pub fee_items: Vec<FeeItem>,
}

impl NewRoom {
    pub fn new(property_id: PropertyId, room_number: impl Into<String>, area: BigDecimal) -> Self {
        Self {
            property_id,
            room_number: room_number.into(),
            owner_name: None,
            owner_phone: None,
            area,
            status: RoomStatus::Occupied,
            fee_items: Vec::new(),
        }
    }

    pub fn owner(mut self, name: impl Into<String>, phone: Option<String>) -> Self {
        self.owner_name = Some(name.into());
        self.owner_phone = phone;
        self
    }

    pub fn status(mut self, status: RoomStatus) -> Self {
        self.status = status;
        self
    }

    pub fn fee_item(mut self, name: impl Into<String>, standard: BigDecimal) -> Self {
        self.fee_items.push(FeeItem::new(name, standard));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParkingStatus {
    Idle,
    Sold,
    OwnerUse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingSpace {
    pub id: ParkingSpaceId,
    pub space_number: String,
    pub space_type: String,
    pub room_id: Option<RoomId>,
    pub owner_name: Option<String>,
    pub status: ParkingStatus,
    pub fee_monthly: BigDecimal,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewParkingSpace {
    pub space_number: String,
    pub space_type: String,
    pub room_id: Option<RoomId>,
    pub owner_name: Option<String>,
    pub status: ParkingStatus,
    pub fee_monthly: BigDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeterKind {
    Water,
    Electricity,
}

impl MeterKind {
    /// Fee type used on bills generated from readings
    pub fn fee_type(&self) -> &'static str {
        match self {
            MeterKind::Water => "Water",
            MeterKind::Electricity => "Electricity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeterStatus {
    Normal,
    Faulty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilityMeter {
    pub id: MeterId,
    pub meter_number: String,
    pub kind: MeterKind,
    pub room_id: Option<RoomId>,
    pub parking_space_id: Option<ParkingSpaceId>,
    pub unit_price: BigDecimal,
    pub status: MeterStatus,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewMeter {
    pub meter_number: String,
    pub kind: MeterKind,
    pub room_id: Option<RoomId>,
    pub parking_space_id: Option<ParkingSpaceId>,
    pub unit_price: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilityReading {
    pub id: ReadingId,
    pub meter_id: MeterId,
    pub reading_date: NaiveDate,
    pub previous_reading: BigDecimal,
    pub current_reading: BigDecimal,
    pub usage: BigDecimal,
    pub unit_price: BigDecimal,
    pub amount: BigDecimal,
    pub period: Period,
    pub operator: String,
    pub created_at: NaiveDateTime,
}

/// One meter's new reading as entered by the operator
#[derive(Debug, Clone)]
pub struct MeterReadingInput {
    pub meter_id: MeterId,
    pub current: BigDecimal,
}
