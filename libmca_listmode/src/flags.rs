use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// The status bitfield ("extras") carried by every list-mode record.
    ///
    /// Bits are independent; a single event may carry several of them. Bits outside
    /// of the known table are retained so that a record re-encodes to the same bytes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EventFlags: u32 {
        const FIRST_AFTER_DEADTIME = 0x1;
        const TIME_TAG_ROLLOVER = 0x2;
        const TIME_TAG_RESET = 0x4;
        const FAKE_EVENT = 0x8;
        const ENERGY_SATURATED = 0x80;
        const INPUT_SATURATED = 0x400;
        const PILE_UP = 0x8000;
        const DEADTIME_CALC = 0x10000;
        const OUTSIDE_SCA = 0x20000;
        const SATURATION_INHIBIT = 0x40000;
    }
}

const FLAG_NAMES: [(EventFlags, &str); 10] = [
    (
        EventFlags::FIRST_AFTER_DEADTIME,
        "First event after a dead time occurrence",
    ),
    (EventFlags::TIME_TAG_ROLLOVER, "Time tag rollover"),
    (EventFlags::TIME_TAG_RESET, "Time tag reset"),
    (EventFlags::FAKE_EVENT, "Fake event"),
    (EventFlags::ENERGY_SATURATED, "Event energy saturated"),
    (EventFlags::INPUT_SATURATED, "Input dynamics saturated event"),
    (EventFlags::PILE_UP, "Pile up event"),
    (EventFlags::DEADTIME_CALC, "Deadtime calc event"),
    (
        EventFlags::OUTSIDE_SCA,
        "Event energy is outside the SCA interval",
    ),
    (
        EventFlags::SATURATION_INHIBIT,
        "Event occurred during saturation inhibit",
    ),
];

impl EventFlags {
    /// Classify a raw bitfield. Pure; unknown bits are kept.
    pub fn classify(bits: u32) -> Self {
        Self::from_bits_retain(bits)
    }

    pub fn is_fake(&self) -> bool {
        self.contains(Self::FAKE_EVENT)
    }

    pub fn is_pile_up(&self) -> bool {
        self.contains(Self::PILE_UP)
    }

    pub fn is_energy_saturated(&self) -> bool {
        self.contains(Self::ENERGY_SATURATED)
    }

    pub fn is_input_saturated(&self) -> bool {
        self.contains(Self::INPUT_SATURATED)
    }

    pub fn is_rollover(&self) -> bool {
        self.contains(Self::TIME_TAG_ROLLOVER)
    }

    pub fn is_time_tag_reset(&self) -> bool {
        self.contains(Self::TIME_TAG_RESET)
    }

    /// Any bits set which are not in the hardware flag table
    pub fn has_unknown(&self) -> bool {
        self.bits() & !Self::all().bits() != 0
    }

    /// Human readable names of every set condition, in bit order.
    pub fn describe(&self) -> String {
        let mut names: Vec<&str> = FLAG_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if self.has_unknown() {
            names.push("Unknown flag");
        }
        names.join(", ")
    }
}

/// Per-condition tallies, one for every bit in the flag table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagCounts {
    pub first_after_deadtime: u64,
    pub time_tag_rollover: u64,
    pub time_tag_reset: u64,
    pub fake: u64,
    pub energy_saturated: u64,
    pub input_saturated: u64,
    pub pile_up: u64,
    pub deadtime_calc: u64,
    pub outside_sca: u64,
    pub saturation_inhibit: u64,
    pub unknown: u64,
}

impl FlagCounts {
    /// Increment the counter of every condition carried by flags
    pub fn record(&mut self, flags: EventFlags) {
        let tally = |hit: bool, counter: &mut u64| {
            if hit {
                *counter += 1;
            }
        };
        tally(
            flags.contains(EventFlags::FIRST_AFTER_DEADTIME),
            &mut self.first_after_deadtime,
        );
        tally(flags.is_rollover(), &mut self.time_tag_rollover);
        tally(flags.is_time_tag_reset(), &mut self.time_tag_reset);
        tally(flags.is_fake(), &mut self.fake);
        tally(flags.is_energy_saturated(), &mut self.energy_saturated);
        tally(flags.is_input_saturated(), &mut self.input_saturated);
        tally(flags.is_pile_up(), &mut self.pile_up);
        tally(
            flags.contains(EventFlags::DEADTIME_CALC),
            &mut self.deadtime_calc,
        );
        tally(flags.contains(EventFlags::OUTSIDE_SCA), &mut self.outside_sca);
        tally(
            flags.contains(EventFlags::SATURATION_INHIBIT),
            &mut self.saturation_inhibit,
        );
        tally(flags.has_unknown(), &mut self.unknown);
    }
}
