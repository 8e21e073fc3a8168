use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Daily two-hour service windows, in allocation order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Slot {
    #[serde(rename = "09:00-11:00")]
    Morning,
    #[serde(rename = "11:00-13:00")]
    Midday,
    #[serde(rename = "13:00-15:00")]
    Afternoon,
    #[serde(rename = "15:00-17:00")]
    Evening,
}

impl Slot {
    pub const ALL: [Slot; 4] = [Slot::Morning, Slot::Midday, Slot::Afternoon, Slot::Evening];

    pub fn label(&self) -> &'static str {
        match self {
            Slot::Morning => "09:00-11:00",
            Slot::Midday => "11:00-13:00",
            Slot::Afternoon => "13:00-15:00",
            Slot::Evening => "15:00-17:00",
        }
    }

    fn start_hour(&self) -> u32 {
        match self {
            Slot::Morning => 9,
            Slot::Midday => 11,
            Slot::Afternoon => 13,
            Slot::Evening => 15,
        }
    }

    pub fn start_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.start_hour(), 0, 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn end_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.start_hour() + 2, 0, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Slot picked for a date, with its wall-clock bounds in business-local time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocatedSlot {
    pub slot: Slot,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

impl AllocatedSlot {
    pub fn new(date: NaiveDate, slot: Slot) -> Self {
        Self {
            slot,
            start_time: date.and_time(slot.start_time()),
            end_time: date.and_time(slot.end_time()),
        }
    }
}

/// Slots of the day not present in `occupied`, in declared order
pub fn free_slots<I>(occupied: I) -> Vec<Slot>
where
    I: IntoIterator<Item = Slot>,
{
    let occupied: Vec<Slot> = occupied.into_iter().collect();
    Slot::ALL
        .into_iter()
        .filter(|slot| !occupied.contains(slot))
        .collect()
}

/// First free slot of the day, or `None` when every slot is taken
///
/// This only reads. Two callers can get the same answer; the store's
/// uniqueness constraint decides who actually gets the slot.
pub fn first_free_slot<I>(date: NaiveDate, occupied: I) -> Option<AllocatedSlot>
where
    I: IntoIterator<Item = Slot>,
{
    free_slots(occupied)
        .first()
        .map(|slot| AllocatedSlot::new(date, *slot))
}
