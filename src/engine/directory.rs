use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::limits::*;
use crate::model::*;

use super::conflict::today;
use super::{Engine, EngineError, observe, validation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTypeInput {
    pub name: String,
    pub description: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInput {
    pub number: String,
    pub description: String,
    pub max_capacity: u8,
    pub nightly_rate: Money,
    pub room_type_id: RoomTypeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInput {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub birthday: NaiveDate,
}

impl RoomTypeInput {
    fn validated(&self, id: RoomTypeId) -> Result<RoomType, EngineError> {
        Ok(RoomType {
            id,
            name: validation::required_text("name", &self.name, MAX_ROOM_TYPE_NAME_LEN)?,
            description: validation::optional_text("description", &self.description, MAX_TEXT_LEN)?,
            note: validation::optional_text("note", &self.note, MAX_TEXT_LEN)?,
        })
    }
}

impl RoomInput {
    fn validated(&self, id: RoomId) -> Result<Room, EngineError> {
        Ok(Room {
            id,
            number: validation::required_text("number", &self.number, MAX_ROOM_NUMBER_LEN)?,
            description: validation::optional_text("description", &self.description, MAX_TEXT_LEN)?,
            max_capacity: validation::capacity(self.max_capacity)?,
            nightly_rate: validation::nightly_rate(self.nightly_rate)?,
            status: RoomStatus::Active,
            room_type_id: self.room_type_id,
        })
    }
}

impl CustomerInput {
    fn validated(&self, id: CustomerId, today: NaiveDate) -> Result<Customer, EngineError> {
        Ok(Customer {
            id,
            full_name: validation::required_text("full_name", &self.full_name, MAX_FULL_NAME_LEN)?,
            phone: validation::phone(&self.phone)?,
            email: validation::email(&self.email)?,
            birthday: validation::birthday(self.birthday, today)?,
            status: CustomerStatus::Active,
        })
    }
}

/// `DuplicateKey` unless the key is free or already owned by `owner`.
fn ensure_unique(
    field: &'static str,
    value: &str,
    existing: Option<u64>,
    owner: Option<u64>,
) -> Result<(), EngineError> {
    match existing {
        Some(id) if Some(id) != owner => Err(EngineError::DuplicateKey {
            field,
            value: value.to_string(),
        }),
        _ => Ok(()),
    }
}

impl Engine {
    // ── Room types ───────────────────────────────────────────

    pub async fn create_room_type(&self, input: RoomTypeInput) -> Result<RoomType, EngineError> {
        observe("create_room_type", async {
            let _permit = self.write_permit().await?;
            let _dir = self.directory_guard().await?;
            let mut room_type = input.validated(0)?;
            ensure_unique("name", &room_type.name, self.store.room_type_id_by_name(&room_type.name), None)?;

            room_type.id = self.store.ids.room_type.next();
            self.persist_directory(&Event::RoomTypeCreated(room_type.clone())).await?;
            info!("room type {} created: {}", room_type.id, room_type.name);
            Ok(room_type)
        }
        .await)
    }

    pub async fn update_room_type(
        &self,
        id: RoomTypeId,
        input: RoomTypeInput,
    ) -> Result<RoomType, EngineError> {
        observe("update_room_type", async {
            let _permit = self.write_permit().await?;
            let _dir = self.directory_guard().await?;
            if self.store.room_type(&id).is_none() {
                return Err(EngineError::not_found(EntityKind::RoomType, id));
            }
            let room_type = input.validated(id)?;
            ensure_unique("name", &room_type.name, self.store.room_type_id_by_name(&room_type.name), Some(id))?;

            self.persist_directory(&Event::RoomTypeUpdated(room_type.clone())).await?;
            info!("room type {id} updated");
            Ok(room_type)
        }
        .await)
    }

    /// Physical delete. Refused while any room, deleted or not, still points at the type.
    pub async fn delete_room_type(&self, id: RoomTypeId) -> Result<(), EngineError> {
        observe("delete_room_type", async {
            let _permit = self.write_permit().await?;
            let _dir = self.directory_guard().await?;
            if self.store.room_type(&id).is_none() {
                return Err(EngineError::not_found(EntityKind::RoomType, id));
            }
            for room_id in self.store.room_ids() {
                let rs = self.room_state(room_id)?;
                if self.read_room(&rs).await?.room.room_type_id == id {
                    return Err(EngineError::InUse {
                        kind: EntityKind::RoomType,
                        id,
                    });
                }
            }

            self.persist_directory(&Event::RoomTypeDeleted { id }).await?;
            info!("room type {id} deleted");
            Ok(())
        }
        .await)
    }

    // ── Rooms ────────────────────────────────────────────────

    pub async fn create_room(&self, input: RoomInput) -> Result<Room, EngineError> {
        observe("create_room", async {
            let _permit = self.write_permit().await?;
            let _dir = self.directory_guard().await?;
            let mut room = input.validated(0)?;
            if self.store.room_type(&room.room_type_id).is_none() {
                return Err(EngineError::not_found(EntityKind::RoomType, room.room_type_id));
            }
            ensure_unique("number", &room.number, self.store.room_id_by_number(&room.number), None)?;

            room.id = self.store.ids.room.next();
            self.persist_directory(&Event::RoomCreated(room.clone())).await?;
            info!("room {} created: number {}", room.id, room.number);
            Ok(room)
        }
        .await)
    }

    /// Rate changes apply to bookings made afterwards; existing prices stay as booked.
    pub async fn update_room(&self, id: RoomId, input: RoomInput) -> Result<Room, EngineError> {
        observe("update_room", async {
            let _permit = self.write_permit().await?;
            let _dir = self.directory_guard().await?;
            let mut guard = self.write_room(id).await?;
            if !guard.room.is_active() {
                return Err(EngineError::not_found(EntityKind::Room, id));
            }
            let room = input.validated(id)?;
            if self.store.room_type(&room.room_type_id).is_none() {
                return Err(EngineError::not_found(EntityKind::RoomType, room.room_type_id));
            }
            ensure_unique("number", &room.number, self.store.room_id_by_number(&room.number), Some(id))?;

            self.persist_room(&mut guard, &Event::RoomUpdated(room.clone())).await?;
            info!("room {id} updated");
            Ok(room)
        }
        .await)
    }

    /// Soft delete. The room keeps its bookings and stays addressable by id.
    pub async fn delete_room(&self, id: RoomId) -> Result<(), EngineError> {
        observe("delete_room", async {
            let _permit = self.write_permit().await?;
            let _dir = self.directory_guard().await?;
            let mut guard = self.write_room(id).await?;
            if !guard.room.is_active() {
                return Err(EngineError::not_found(EntityKind::Room, id));
            }
            self.persist_room(&mut guard, &Event::RoomDeleted { id }).await?;
            info!("room {id} deleted");
            Ok(())
        }
        .await)
    }

    // ── Customers ────────────────────────────────────────────

    pub async fn create_customer(&self, input: CustomerInput) -> Result<Customer, EngineError> {
        observe("create_customer", async {
            let _permit = self.write_permit().await?;
            let _dir = self.directory_guard().await?;
            let mut customer = input.validated(0, today())?;
            ensure_unique("email", &customer.email, self.store.customer_id_by_email(&customer.email), None)?;

            customer.id = self.store.ids.customer.next();
            self.persist_directory(&Event::CustomerCreated(customer.clone())).await?;
            info!("customer {} created", customer.id);
            Ok(customer)
        }
        .await)
    }

    pub async fn update_customer(
        &self,
        id: CustomerId,
        input: CustomerInput,
    ) -> Result<Customer, EngineError> {
        observe("update_customer", async {
            let _permit = self.write_permit().await?;
            let _dir = self.directory_guard().await?;
            self.active_customer(id)?;
            let customer = input.validated(id, today())?;
            ensure_unique("email", &customer.email, self.store.customer_id_by_email(&customer.email), Some(id))?;

            self.persist_directory(&Event::CustomerUpdated(customer.clone())).await?;
            info!("customer {id} updated");
            Ok(customer)
        }
        .await)
    }

    /// Soft delete. Booking history keeps resolving the customer.
    pub async fn delete_customer(&self, id: CustomerId) -> Result<(), EngineError> {
        observe("delete_customer", async {
            let _permit = self.write_permit().await?;
            let _dir = self.directory_guard().await?;
            self.active_customer(id)?;
            self.persist_directory(&Event::CustomerDeleted { id }).await?;
            info!("customer {id} deleted");
            Ok(())
        }
        .await)
    }

    pub(super) fn active_customer(&self, id: CustomerId) -> Result<Customer, EngineError> {
        self.store
            .customer(&id)
            .filter(Customer::is_active)
            .ok_or_else(|| EngineError::not_found(EntityKind::Customer, id))
    }
}
