use crate::{
    domain::{
        Appointment, AppointmentStatus, Pack, Purchase, PurchaseAward, PurchaseStatus, User,
    },
    ports::{
        database,
        database::DatabasePort,
        user,
        user::{BalanceChange, UserPort},
    },
};
use chrono::{DateTime, NaiveDate, Utc};
use std::{
    collections::{hash_map::Entry, BTreeMap, HashMap},
    sync::{Arc, Mutex, PoisonError},
};
use uuid::Uuid;

/// In-process document store
///
/// Each collection sits behind its own lock, and every port operation holds
/// that lock for its whole check-then-write. This gives the same guarantees a
/// real store gives through partial unique indexes, conditional updates and
/// atomic increments.
#[derive(Clone, Debug, Default)]
pub struct MemoryDatabase {
    users: Arc<Mutex<HashMap<Uuid, User>>>,
    appointments: Arc<Mutex<HashMap<Uuid, Appointment>>>,
    packs: Arc<Mutex<HashMap<Uuid, Pack>>>,
    /// Keyed by external reference
    purchases: Arc<Mutex<HashMap<String, Purchase>>>,
}

impl MemoryDatabase {
    pub fn insert_user(&self, user: User) -> Result<(), user::Error> {
        self.users.lock()?.insert(user.user_id, user);
        Ok(())
    }

    pub fn insert_pack(&self, pack: Pack) -> Result<(), database::Error> {
        self.packs.lock()?.insert(pack.pack_id, pack);
        Ok(())
    }
}

#[async_trait::async_trait]
impl UserPort for MemoryDatabase {
    async fn get_user(&self, user_id: Uuid) -> Result<User, user::Error> {
        self.users
            .lock()?
            .get(&user_id)
            .cloned()
            .ok_or(user::Error::UserDoesNotExist(user_id))
    }

    async fn debit_points(&self, user_id: Uuid, amount: u32) -> Result<u32, user::Error> {
        let mut users = self.users.lock()?;
        let account = users
            .get_mut(&user_id)
            .ok_or(user::Error::UserDoesNotExist(user_id))?;

        // Return an error if this would make the number of points negative
        let new_balance = account
            .points_balance
            .checked_sub(amount)
            .ok_or(user::Error::InsufficientBalance {
                balance: account.points_balance,
                requested: amount,
            })?;
        account.points_balance = new_balance;

        Ok(new_balance)
    }

    async fn credit_points(
        &self,
        user_id: Uuid,
        amount: u32,
    ) -> Result<BalanceChange, user::Error> {
        let mut users = self.users.lock()?;
        let account = users
            .get_mut(&user_id)
            .ok_or(user::Error::UserDoesNotExist(user_id))?;
        let previous = account.points_balance;
        account.points_balance = previous.saturating_add(amount);

        Ok(BalanceChange {
            previous,
            current: account.points_balance,
        })
    }

    async fn set_points(&self, user_id: Uuid, amount: u32) -> Result<u32, user::Error> {
        let mut users = self.users.lock()?;
        let account = users
            .get_mut(&user_id)
            .ok_or(user::Error::UserDoesNotExist(user_id))?;

        Ok(std::mem::replace(&mut account.points_balance, amount))
    }
}

/// Another active appointment holding the same date and slot, if any
fn slot_holder<'a>(
    appointments: &'a HashMap<Uuid, Appointment>,
    candidate: &Appointment,
) -> Option<&'a Appointment> {
    appointments.values().find(|other| {
        other.id != candidate.id
            && other.status.is_active()
            && other.date == candidate.date
            && other.slot == candidate.slot
    })
}

fn active_held_by(appointments: &HashMap<Uuid, Appointment>, user_id: Uuid) -> usize {
    appointments
        .values()
        .filter(|appointment| appointment.user_id == user_id && appointment.status.is_active())
        .count()
}

#[async_trait::async_trait]
impl DatabasePort for MemoryDatabase {
    async fn insert_appointment(
        &self,
        appointment: Appointment,
        user_limit: usize,
    ) -> Result<Appointment, database::Error> {
        let mut appointments = self.appointments.lock()?;
        if appointment.status.is_active() {
            if slot_holder(&appointments, &appointment).is_some() {
                return Err(database::Error::SlotTaken {
                    date: appointment.date,
                    slot: appointment.slot,
                });
            }
            if active_held_by(&appointments, appointment.user_id) >= user_limit {
                return Err(database::Error::UserLimitReached {
                    user_id: appointment.user_id,
                    limit: user_limit,
                });
            }
        }

        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, database::Error> {
        self.appointments
            .lock()?
            .get(&appointment_id)
            .cloned()
            .ok_or(database::Error::AppointmentDoesNotExist(appointment_id))
    }

    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<(), database::Error> {
        self.appointments
            .lock()?
            .remove(&appointment_id)
            .map(|_| ())
            .ok_or(database::Error::AppointmentDoesNotExist(appointment_id))
    }

    async fn active_appointments_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, database::Error> {
        let mut found: Vec<Appointment> = self
            .appointments
            .lock()?
            .values()
            .filter(|appointment| appointment.date == date && appointment.status.is_active())
            .cloned()
            .collect();
        found.sort_by_key(|appointment| appointment.slot);

        Ok(found)
    }

    async fn count_active_appointments_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<usize, database::Error> {
        Ok(active_held_by(&*self.appointments.lock()?, user_id))
    }

    async fn active_appointment_counts(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, usize>, database::Error> {
        let mut counts = BTreeMap::new();
        for appointment in self.appointments.lock()?.values() {
            let in_range = appointment.date >= from && appointment.date <= until;
            if in_range && appointment.status.is_active() {
                *counts.entry(appointment.date).or_insert(0) += 1;
            }
        }

        Ok(counts)
    }

    async fn transition_appointment(
        &self,
        appointment_id: Uuid,
        from: Vec<AppointmentStatus>,
        to: AppointmentStatus,
    ) -> Result<Appointment, database::Error> {
        let mut appointments = self.appointments.lock()?;
        let current = appointments
            .get(&appointment_id)
            .cloned()
            .ok_or(database::Error::AppointmentDoesNotExist(appointment_id))?;

        if !from.contains(&current.status) {
            return Err(database::Error::AppointmentStatusMismatch {
                appointment_id,
                current: current.status,
            });
        }
        // Coming back into an active status needs the slot to still be free
        if to.is_active() && !current.status.is_active() {
            if let Some(holder) = slot_holder(&appointments, &current) {
                return Err(database::Error::SlotTaken {
                    date: holder.date,
                    slot: holder.slot,
                });
            }
        }

        let updated = Appointment {
            status: to,
            ..current
        };
        appointments.insert(appointment_id, updated.clone());

        Ok(updated)
    }

    async fn get_pack(&self, pack_id: Uuid) -> Result<Pack, database::Error> {
        self.packs
            .lock()?
            .get(&pack_id)
            .cloned()
            .ok_or(database::Error::PackDoesNotExist(pack_id))
    }

    async fn insert_purchase(&self, purchase: Purchase) -> Result<Purchase, database::Error> {
        match self
            .purchases
            .lock()?
            .entry(purchase.external_reference.clone())
        {
            Entry::Occupied(_) => Err(database::Error::DuplicateReference(
                purchase.external_reference,
            )),
            Entry::Vacant(entry) => Ok(entry.insert(purchase).clone()),
        }
    }

    async fn get_purchase_by_reference(
        &self,
        reference: &str,
    ) -> Result<Purchase, database::Error> {
        self.purchases
            .lock()?
            .get(reference)
            .cloned()
            .ok_or_else(|| database::Error::PurchaseDoesNotExist(reference.to_string()))
    }

    async fn claim_purchase(
        &self,
        reference: &str,
        claim_id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Purchase, database::Error> {
        let mut purchases = self.purchases.lock()?;
        let purchase = purchases
            .get_mut(reference)
            .ok_or_else(|| database::Error::PurchaseDoesNotExist(reference.to_string()))?;

        let claimable = match purchase.status {
            PurchaseStatus::Pending | PurchaseStatus::Failed => true,
            PurchaseStatus::Processing => purchase
                .claimed_at
                .map_or(true, |claimed_at| claimed_at < stale_before),
            PurchaseStatus::Succeeded | PurchaseStatus::Canceled => false,
        };
        if !claimable {
            return Err(database::Error::PurchaseStatusMismatch {
                reference: reference.to_string(),
                current: purchase.status,
            });
        }

        purchase.status = PurchaseStatus::Processing;
        purchase.claimed_at = Some(now);
        purchase.claim_id = Some(claim_id);
        Ok(purchase.clone())
    }

    async fn update_purchase_status(
        &self,
        reference: &str,
        claim_id: Uuid,
        from: PurchaseStatus,
        to: PurchaseStatus,
    ) -> Result<Purchase, database::Error> {
        let mut purchases = self.purchases.lock()?;
        let purchase = held_purchase(&mut purchases, reference, claim_id)?;

        if purchase.status != from || to == PurchaseStatus::Succeeded {
            return Err(database::Error::PurchaseStatusMismatch {
                reference: reference.to_string(),
                current: purchase.status,
            });
        }

        if from == PurchaseStatus::Succeeded {
            purchase.award = PurchaseAward::default();
        }
        purchase.status = to;
        Ok(purchase.clone())
    }

    async fn complete_purchase(
        &self,
        reference: &str,
        claim_id: Uuid,
        award: PurchaseAward,
    ) -> Result<Purchase, database::Error> {
        let mut purchases = self.purchases.lock()?;
        let purchase = held_purchase(&mut purchases, reference, claim_id)?;

        if purchase.status != PurchaseStatus::Processing {
            return Err(database::Error::PurchaseStatusMismatch {
                reference: reference.to_string(),
                current: purchase.status,
            });
        }

        purchase.status = PurchaseStatus::Succeeded;
        purchase.award = award;
        Ok(purchase.clone())
    }
}

/// Look up a purchase, failing unless `claim_id` holds its latest claim
fn held_purchase<'a>(
    purchases: &'a mut HashMap<String, Purchase>,
    reference: &str,
    claim_id: Uuid,
) -> Result<&'a mut Purchase, database::Error> {
    let purchase = purchases
        .get_mut(reference)
        .ok_or_else(|| database::Error::PurchaseDoesNotExist(reference.to_string()))?;

    if purchase.claim_id != Some(claim_id) {
        return Err(database::Error::ClaimLost(reference.to_string()));
    }

    Ok(purchase)
}

/// Erased [`PoisonError`]
///
/// `PoisonError` keeps the `MutexGuard` internally, which is not send. Thus we erase the error
/// and only keep the string representation instead.
#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

impl<T> From<PoisonError<T>> for ErasedPoisonError {
    fn from(err: PoisonError<T>) -> Self {
        Self(err.to_string())
    }
}

/// We need to create custom `From` implementations here for an error that's specific to this
/// adapter.
impl<T> From<PoisonError<T>> for database::Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError::from(err)))
    }
}

impl<T> From<PoisonError<T>> for user::Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError::from(err)))
    }
}
