//! Proptest generators for property-based testing.
//!
//! Everything generated here is valid: it passes
//! [`tally_core::validate_payload`]. Dates and adjustment ids are drawn from
//! small pools so that two independently generated payloads overlap often.

use std::collections::BTreeMap;

use proptest::prelude::*;

use tally_core::{
    Adjustment, DayEntry, DayType, LeaveBalance, NonWorkingDayDisplay, Settings, SyncPayload,
};

/// A date in the first two weeks of January 2024.
pub fn date() -> impl Strategy<Value = String> {
    (1u32..=14).prop_map(|day| format!("2024-01-{day:02}"))
}

/// Any date between 2020 and 2030.
pub fn any_date() -> impl Strategy<Value = String> {
    (2020u32..=2030, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| format!("{y:04}-{m:02}-{d:02}"))
}

/// A wall-clock time, `HH:MM`.
pub fn time() -> impl Strategy<Value = String> {
    (0u32..24, 0u32..60).prop_map(|(h, m)| format!("{h:02}:{m:02}"))
}

pub fn day_type() -> impl Strategy<Value = DayType> {
    prop_oneof![
        Just(DayType::Normal),
        Just(DayType::Sick),
        Just(DayType::SickHalf),
        Just(DayType::Holiday),
        Just(DayType::HolidayHalf),
        Just(DayType::Flexi),
        Just(DayType::FlexiHalf),
    ]
}

/// A day entry, possibly empty.
pub fn day_entry() -> impl Strategy<Value = DayEntry> {
    (
        prop::option::of(time()),
        prop::option::of(time()),
        prop_oneof![Just(0i64), 0i64..=120],
        prop::option::of(day_type()),
    )
        .prop_map(|(start, end, break_minutes, day_type)| DayEntry {
            start,
            end,
            break_minutes,
            day_type,
        })
}

/// An adjustment whose id comes from a pool of ten.
pub fn adjustment() -> impl Strategy<Value = Adjustment> {
    (0u8..10, date(), -240i64..=240, "[a-z ]{0,12}").prop_map(|(n, date, minutes, note)| {
        Adjustment {
            id: format!("adj-{n}"),
            date,
            minutes,
            note,
        }
    })
}

/// Adjustments with unique ids.
pub fn adjustments(max: usize) -> impl Strategy<Value = Vec<Adjustment>> {
    prop::collection::vec(adjustment(), 0..=max).prop_map(|list| {
        let mut by_id = BTreeMap::new();
        for adjustment in list {
            by_id.entry(adjustment.id.clone()).or_insert(adjustment);
        }
        by_id.into_values().collect()
    })
}

pub fn settings() -> impl Strategy<Value = Settings> {
    (
        any::<[bool; 7]>(),
        prop_oneof![Just(480.0f64), Just(450.0), 0.0f64..=720.0],
        0u8..=1,
        prop_oneof![
            Just(NonWorkingDayDisplay::Show),
            Just(NonWorkingDayDisplay::Disable),
            Just(NonWorkingDayDisplay::Hide),
        ],
        prop_oneof![Just(1.0f64), Just(1.5), 0.5f64..=3.0],
    )
        .prop_map(|(days, expected, week_start, display, rate)| Settings {
            working_days: (0u8..7).filter(|d| days[*d as usize]).collect(),
            expected_minutes_per_day: expected,
            week_starts_on: week_start,
            non_working_day_display: display,
            non_working_day_rate: rate,
        })
}

pub fn leave_balance() -> impl Strategy<Value = LeaveBalance> {
    (0.0f64..=40.0, any_date(), any_date()).prop_map(|(total_days, start, end)| LeaveBalance {
        total_days,
        period_start: start,
        period_end: end,
    })
}

/// A complete valid payload.
pub fn payload() -> impl Strategy<Value = SyncPayload> {
    (
        prop::collection::btree_map(date(), day_entry(), 0..=10),
        adjustments(6),
        prop_oneof![Just(Settings::default()), settings()],
        prop::option::of(leave_balance()),
        0i64..=1_800_000_000_000,
    )
        .prop_map(
            |(entries, adjustments, settings, leave_balance, timestamp)| SyncPayload {
                entries,
                adjustments,
                settings,
                leave_balance,
                timestamp,
            },
        )
}
