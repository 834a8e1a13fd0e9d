// SPDX-License-Identifier: MIT

//! Manifest validation statuses (spec §4.5). Bit-or'd onto a
//! [`ValidationStatus`] built from [`iotfw_core::Mask`] — the same compact
//! bitmask the reactor uses for io/signal masks, reused here instead of a
//! bespoke bitflags type since the two have identical shape (a handful of
//! named boolean facts, OR'd together, tested individually).

use iotfw_core::Mask;

const MISNAMED_BIT: u32 = 0;
const UNLOADABLE_BIT: u32 = 1;
const MALFORMED_BIT: u32 = 2;
const MISSING_FIELD_BIT: u32 = 3;
const INVALID_FIELD_BIT: u32 = 4;
const INVALID_BINARY_BIT: u32 = 5;
const INVALID_PRIVILEGE_BIT: u32 = 6;
const INVALID_DESKTOP_BIT: u32 = 7;

/// Bit-or'd validation outcome for one manifest or one application within
/// it (spec §4.5). Empty means the manifest (or application) is fully
/// usable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStatus(Mask);

impl ValidationStatus {
    pub const EMPTY: ValidationStatus = ValidationStatus(Mask::EMPTY);

    pub const MISNAMED: ValidationStatus = ValidationStatus(Mask::bit(MISNAMED_BIT));
    pub const UNLOADABLE: ValidationStatus = ValidationStatus(Mask::bit(UNLOADABLE_BIT));
    pub const MALFORMED: ValidationStatus = ValidationStatus(Mask::bit(MALFORMED_BIT));
    pub const MISSING_FIELD: ValidationStatus = ValidationStatus(Mask::bit(MISSING_FIELD_BIT));
    pub const INVALID_FIELD: ValidationStatus = ValidationStatus(Mask::bit(INVALID_FIELD_BIT));
    pub const INVALID_BINARY: ValidationStatus = ValidationStatus(Mask::bit(INVALID_BINARY_BIT));
    pub const INVALID_PRIVILEGE: ValidationStatus = ValidationStatus(Mask::bit(INVALID_PRIVILEGE_BIT));
    pub const INVALID_DESKTOP: ValidationStatus = ValidationStatus(Mask::bit(INVALID_DESKTOP_BIT));

    pub fn union(self, other: ValidationStatus) -> ValidationStatus {
        ValidationStatus(self.0.union(other.0))
    }

    pub fn contains(self, flag: ValidationStatus) -> bool {
        self.0.contains(flag.0)
    }

    pub fn is_ok(self) -> bool {
        self.0.is_empty()
    }

    /// Usable only if nothing marked the manifest `UNLOADABLE`; individual
    /// field problems (`INVALID_FIELD`, `INVALID_PRIVILEGE`, ...) short of
    /// that don't by themselves prevent use, matching spec §4.5's "the sole
    /// authority on whether a manifest is usable" being `UNLOADABLE`-gated.
    pub fn is_loadable(self) -> bool {
        !self.contains(Self::UNLOADABLE)
    }
}

impl std::ops::BitOr for ValidationStatus {
    type Output = ValidationStatus;
    fn bitor(self, rhs: ValidationStatus) -> ValidationStatus {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for ValidationStatus {
    fn bitor_assign(&mut self, rhs: ValidationStatus) {
        *self = self.union(rhs);
    }
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
