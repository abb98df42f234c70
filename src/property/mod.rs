//! Property registry: tenants, rooms, parking spaces, meters and readings

pub mod types;

use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{record_data_change, AuditRecord, FieldChange};
use crate::billing::settlement::owed;
use crate::billing::types::BillFilter;
use crate::scope::ErpContext;
use crate::traits::*;
use crate::types::*;
use crate::utils::money::{is_settled, to_money};
use crate::utils::validation::*;

pub use types::*;

/// Readings recorded in one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSummary {
    pub recorded: Vec<UtilityReading>,
    /// Inputs whose current value did not exceed the previous reading
    pub skipped: usize,
}

fn fee_items_text(items: &[FeeItem]) -> String {
    items
        .iter()
        .map(|item| format!("{}={}", item.name.trim(), item.standard))
        .collect::<Vec<_>>()
        .join(";")
}

/// Registry of the units that bills are raised against
pub struct PropertyRegistry<S: TransactionalStorage> {
    ctx: ErpContext<S>,
}

impl<S: TransactionalStorage> PropertyRegistry<S> {
    pub fn new(ctx: ErpContext<S>) -> Self {
        Self { ctx }
    }

    /// Register a property; names and codes are unique
    pub async fn create_property(
        &self,
        actor: &str,
        name: &str,
        code: &str,
        address: Option<&str>,
    ) -> LedgerResult<Property> {
        validate_actor(actor)?;
        validate_name(name, "Property name")?;
        validate_name(code, "Property code")?;
        let (name, code) = (name.trim(), code.trim());

        let mut scope = self.ctx.begin().await?;
        let clash = scope
            .store()
            .list_properties()
            .await?
            .into_iter()
            .filter(|p| !p.is_deleted)
            .any(|p| p.name == name || p.code == code);
        if clash {
            return Err(LedgerError::Validation(format!(
                "Property name '{name}' or code '{code}' is already in use"
            )));
        }

        let property = scope
            .store()
            .insert_property(Property {
                id: 0,
                name: name.to_string(),
                code: code.to_string(),
                address: address.map(str::to_string),
                is_deleted: false,
                created_at: chrono::Utc::now().naive_utc(),
            })
            .await?;
        scope
            .audit(
                AuditRecord::new(actor, "create_property", property.id)
                    .details(json!({ "name": property.name, "code": property.code })),
            )
            .await?;
        scope.commit().await?;
        Ok(property)
    }

    pub async fn get_property(&self, property_id: PropertyId) -> LedgerResult<Property> {
        self.ctx
            .storage
            .get_property(property_id)
            .await?
            .filter(|p| !p.is_deleted)
            .ok_or_else(|| LedgerError::not_found("Property", property_id))
    }

    pub async fn list_properties(&self) -> LedgerResult<Vec<Property>> {
        let mut properties = self.ctx.storage.list_properties().await?;
        properties.retain(|p| !p.is_deleted);
        Ok(properties)
    }

    /// Add a room; room numbers are unique within a property
    pub async fn add_room(&self, actor: &str, room: NewRoom) -> LedgerResult<Room> {
        validate_actor(actor)?;
        validate_name(&room.room_number, "Room number")?;
        validate_non_negative(&room.area, "Room area")?;
        validate_fee_items(&room.fee_items)?;
        let room_number = room.room_number.trim().to_string();

        let mut scope = self.ctx.begin().await?;
        let property = scope
            .store()
            .get_property(room.property_id)
            .await?
            .filter(|p| !p.is_deleted)
            .ok_or_else(|| LedgerError::not_found("Property", room.property_id))?;

        let taken = scope
            .store()
            .list_rooms(Some(property.id))
            .await?
            .iter()
            .any(|r| !r.is_deleted && r.room_number == room_number);
        if taken {
            return Err(LedgerError::Validation(format!(
                "Room '{room_number}' already exists in property '{}'",
                property.name
            )));
        }

        let stored = scope
            .store()
            .insert_room(Room {
                id: 0,
                property_id: property.id,
                room_number,
                owner_name: room.owner_name,
                owner_phone: room.owner_phone,
                area: room.area,
                status: room.status,
                balance: BigDecimal::zero(),
                fee_items: room.fee_items,
                is_deleted: false,
                created_at: chrono::Utc::now().naive_utc(),
            })
            .await?;
        scope
            .audit(
                AuditRecord::new(actor, "add_room", &stored.room_number).details(json!({
                    "room_id": stored.id,
                    "property_id": stored.property_id,
                    "fee_items": fee_items_text(&stored.fee_items),
                })),
            )
            .await?;
        scope.commit().await?;
        Ok(stored)
    }

    pub async fn get_room(&self, room_id: RoomId) -> LedgerResult<Room> {
        self.ctx
            .storage
            .get_room(room_id)
            .await?
            .filter(|r| !r.is_deleted)
            .ok_or_else(|| LedgerError::not_found("Room", room_id))
    }

    /// Live rooms, optionally restricted to one property
    pub async fn list_rooms(&self, property_id: Option<PropertyId>) -> LedgerResult<Vec<Room>> {
        let mut rooms = self.ctx.storage.list_rooms(property_id).await?;
        rooms.retain(|r| !r.is_deleted);
        Ok(rooms)
    }

    /// Replace a room's fee items
    pub async fn set_fee_items(
        &self,
        actor: &str,
        room_id: RoomId,
        items: Vec<FeeItem>,
    ) -> LedgerResult<Room> {
        validate_actor(actor)?;
        validate_fee_items(&items)?;

        let mut scope = self.ctx.begin().await?;
        let mut room = live_room(scope.store(), room_id).await?;
        let old = fee_items_text(&room.fee_items);
        room.fee_items = items;
        let new = fee_items_text(&room.fee_items);

        scope.store().update_room(&room).await?;
        let change = FieldChange {
            table_name: "rooms",
            record_id: room.id,
            field_name: "fee_items",
            old_value: Some(old.clone()),
            new_value: Some(new.clone()),
        };
        if record_data_change(scope.store(), change, actor, None)
            .await?
            .is_some()
        {
            scope
                .audit(
                    AuditRecord::new(actor, "set_fee_items", &room.room_number)
                        .details(json!({ "room_id": room.id, "old": old, "new": new })),
                )
                .await?;
        }
        scope.commit().await?;
        Ok(room)
    }

    pub async fn set_room_status(
        &self,
        actor: &str,
        room_id: RoomId,
        status: RoomStatus,
    ) -> LedgerResult<Room> {
        validate_actor(actor)?;

        let mut scope = self.ctx.begin().await?;
        let mut room = live_room(scope.store(), room_id).await?;
        if room.status == status {
            return Ok(room);
        }

        let change = FieldChange {
            table_name: "rooms",
            record_id: room.id,
            field_name: "status",
            old_value: Some(format!("{:?}", room.status)),
            new_value: Some(format!("{status:?}")),
        };
        room.status = status;
        scope.store().update_room(&room).await?;
        record_data_change(scope.store(), change, actor, None).await?;
        scope
            .audit(
                AuditRecord::new(actor, "set_room_status", &room.room_number)
                    .details(json!({ "room_id": room.id, "status": status })),
            )
            .await?;
        scope.commit().await?;
        Ok(room)
    }

    /// Soft-delete a room with no prepaid balance and no arrears
    pub async fn delete_room(&self, actor: &str, room_id: RoomId, reason: &str) -> LedgerResult<Room> {
        validate_actor(actor)?;

        let mut scope = self.ctx.begin().await?;
        let mut room = live_room(scope.store(), room_id).await?;
        if !room.balance.is_zero() {
            return Err(LedgerError::InvalidState(format!(
                "Room {} still holds a balance of {}",
                room.room_number, room.balance
            )));
        }
        let arrears: BigDecimal = scope
            .store()
            .list_bills(&BillFilter::room(room.id).open())
            .await?
            .iter()
            .map(owed)
            .sum();
        if !is_settled(&arrears) {
            return Err(LedgerError::InvalidState(format!(
                "Room {} has {arrears} in arrears",
                room.room_number
            )));
        }

        room.is_deleted = true;
        scope.store().update_room(&room).await?;
        let change = FieldChange {
            table_name: "rooms",
            record_id: room.id,
            field_name: "is_deleted",
            old_value: Some("false".to_string()),
            new_value: Some("true".to_string()),
        };
        record_data_change(scope.store(), change, actor, Some(reason)).await?;
        scope
            .audit(
                AuditRecord::new(actor, "delete_room", &room.room_number)
                    .details(json!({ "room_id": room.id, "reason": reason })),
            )
            .await?;
        scope.commit().await?;
        Ok(room)
    }

    /// Register a parking space; space numbers are unique
    pub async fn add_parking_space(
        &self,
        actor: &str,
        space: NewParkingSpace,
    ) -> LedgerResult<ParkingSpace> {
        validate_actor(actor)?;
        validate_name(&space.space_number, "Space number")?;
        validate_non_negative(&space.fee_monthly, "Monthly parking fee")?;
        let space_number = space.space_number.trim().to_string();

        let mut scope = self.ctx.begin().await?;
        if let Some(room_id) = space.room_id {
            live_room(scope.store(), room_id).await?;
        }
        let taken = scope
            .store()
            .list_parking_spaces()
            .await?
            .iter()
            .any(|p| !p.is_deleted && p.space_number == space_number);
        if taken {
            return Err(LedgerError::Validation(format!(
                "Parking space '{space_number}' already exists"
            )));
        }

        let stored = scope
            .store()
            .insert_parking_space(ParkingSpace {
                id: 0,
                space_number,
                space_type: space.space_type,
                room_id: space.room_id,
                owner_name: space.owner_name,
                status: space.status,
                fee_monthly: space.fee_monthly,
                is_deleted: false,
                created_at: chrono::Utc::now().naive_utc(),
            })
            .await?;
        scope
            .audit(
                AuditRecord::new(actor, "add_parking_space", &stored.space_number)
                    .details(json!({ "space_id": stored.id, "room_id": stored.room_id })),
            )
            .await?;
        scope.commit().await?;
        Ok(stored)
    }

    pub async fn list_parking_spaces(&self) -> LedgerResult<Vec<ParkingSpace>> {
        let mut spaces = self.ctx.storage.list_parking_spaces().await?;
        spaces.retain(|p| !p.is_deleted);
        Ok(spaces)
    }

    /// Register a utility meter; meter numbers are unique
    pub async fn add_meter(&self, actor: &str, meter: NewMeter) -> LedgerResult<UtilityMeter> {
        validate_actor(actor)?;
        validate_name(&meter.meter_number, "Meter number")?;
        validate_non_negative(&meter.unit_price, "Unit price")?;
        let meter_number = meter.meter_number.trim().to_string();

        let mut scope = self.ctx.begin().await?;
        if let Some(room_id) = meter.room_id {
            live_room(scope.store(), room_id).await?;
        }
        if let Some(space_id) = meter.parking_space_id {
            scope
                .store()
                .get_parking_space(space_id)
                .await?
                .filter(|p| !p.is_deleted)
                .ok_or_else(|| LedgerError::not_found("Parking space", space_id))?;
        }
        let taken = scope
            .store()
            .list_meters()
            .await?
            .iter()
            .any(|m| !m.is_deleted && m.meter_number == meter_number);
        if taken {
            return Err(LedgerError::Validation(format!(
                "Meter '{meter_number}' already exists"
            )));
        }

        let stored = scope
            .store()
            .insert_meter(UtilityMeter {
                id: 0,
                meter_number,
                kind: meter.kind,
                room_id: meter.room_id,
                parking_space_id: meter.parking_space_id,
                unit_price: meter.unit_price,
                status: MeterStatus::Normal,
                is_deleted: false,
                created_at: chrono::Utc::now().naive_utc(),
            })
            .await?;
        scope
            .audit(
                AuditRecord::new(actor, "add_meter", &stored.meter_number)
                    .details(json!({ "meter_id": stored.id, "kind": stored.kind })),
            )
            .await?;
        scope.commit().await?;
        Ok(stored)
    }

    pub async fn list_meters(&self) -> LedgerResult<Vec<UtilityMeter>> {
        let mut meters = self.ctx.storage.list_meters().await?;
        meters.retain(|m| !m.is_deleted);
        Ok(meters)
    }

    pub async fn set_meter_status(
        &self,
        actor: &str,
        meter_id: MeterId,
        status: MeterStatus,
    ) -> LedgerResult<UtilityMeter> {
        validate_actor(actor)?;

        let mut scope = self.ctx.begin().await?;
        let mut meter = scope
            .store()
            .get_meter(meter_id)
            .await?
            .filter(|m| !m.is_deleted)
            .ok_or_else(|| LedgerError::not_found("Meter", meter_id))?;
        if meter.status == status {
            return Ok(meter);
        }

        let change = FieldChange {
            table_name: "utility_meters",
            record_id: meter.id,
            field_name: "status",
            old_value: Some(format!("{:?}", meter.status)),
            new_value: Some(format!("{status:?}")),
        };
        meter.status = status;
        scope.store().update_meter(&meter).await?;
        record_data_change(scope.store(), change, actor, None).await?;
        scope
            .audit(
                AuditRecord::new(actor, "set_meter_status", &meter.meter_number)
                    .details(json!({ "meter_id": meter.id, "status": status })),
            )
            .await?;
        scope.commit().await?;
        Ok(meter)
    }

    /// Record a round of meter readings
    ///
    /// Each meter's previous reading is its last recorded current value (0
    /// for a new meter). Inputs that do not advance the meter are skipped.
    pub async fn record_readings(
        &self,
        actor: &str,
        period: Period,
        reading_date: NaiveDate,
        inputs: &[MeterReadingInput],
    ) -> LedgerResult<ReadingSummary> {
        validate_actor(actor)?;

        let mut scope = self.ctx.begin().await?;
        let mut recorded = Vec::new();
        let mut skipped = 0;

        for input in inputs {
            let meter = scope
                .store()
                .get_meter(input.meter_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("Meter", input.meter_id))?;
            if meter.is_deleted || meter.status == MeterStatus::Faulty {
                return Err(LedgerError::InvalidState(format!(
                    "Meter {} cannot take readings",
                    meter.meter_number
                )));
            }

            let previous = scope
                .store()
                .list_readings(Some(meter.id), None)
                .await?
                .pop()
                .map(|r| r.current_reading)
                .unwrap_or_else(BigDecimal::zero);
            if input.current <= previous {
                skipped += 1;
                continue;
            }

            let usage = &input.current - &previous;
            let amount = to_money(&(&usage * &meter.unit_price));
            let reading = scope
                .store()
                .insert_reading(UtilityReading {
                    id: 0,
                    meter_id: meter.id,
                    reading_date,
                    previous_reading: previous,
                    current_reading: input.current.clone(),
                    usage,
                    unit_price: meter.unit_price.clone(),
                    amount,
                    period,
                    operator: actor.to_string(),
                    created_at: chrono::Utc::now().naive_utc(),
                })
                .await?;
            recorded.push(reading);
        }

        if !recorded.is_empty() {
            let ids: Vec<ReadingId> = recorded.iter().map(|r| r.id).collect();
            scope
                .audit(
                    AuditRecord::new(actor, "record_readings", period)
                        .details(json!({ "readings": ids, "skipped": skipped })),
                )
                .await?;
            scope.commit().await?;
        }

        Ok(ReadingSummary { recorded, skipped })
    }

    pub async fn readings(
        &self,
        meter_id: Option<MeterId>,
        period: Option<Period>,
    ) -> LedgerResult<Vec<UtilityReading>> {
        self.ctx.storage.list_readings(meter_id, period).await
    }
}

async fn live_room<T: ErpStorage + ?Sized>(store: &T, room_id: RoomId) -> LedgerResult<Room> {
    store
        .get_room(room_id)
        .await?
        .filter(|r| !r.is_deleted)
        .ok_or_else(|| LedgerError::not_found("Room", room_id))
}
