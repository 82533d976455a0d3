//! Add/subtract/set semantics with per-field bounds.
//!
//! Every numeric mutation in the store goes through [`apply`]:
//!
//! | Update | Result | Ignored when |
//! |--------|--------|--------------|
//! | `Add` | `min(upper, current + amount)` | `amount <= 0` |
//! | `Subtract` | `max(lower, current - amount)` | `amount <= 0` |
//! | `Set` | `clamp(amount, lower, upper)` | never (NaN aside) |
//!
//! Integer arithmetic saturates instead of overflowing. A NaN amount is
//! always ignored.

use progression_types::UpdateType;

/// A numeric type the clamp rules can operate on.
pub trait ClampValue: Copy + PartialOrd + Send + Sync + 'static {
    /// Additive identity.
    const ZERO: Self;
    /// Unit step used by increment/decrement.
    const ONE: Self;
    /// Largest representable value, used as "unbounded above".
    const MAX: Self;

    /// Addition that never overflows.
    #[must_use]
    fn saturating_add(self, rhs: Self) -> Self;

    /// Subtraction that never overflows.
    #[must_use]
    fn saturating_sub(self, rhs: Self) -> Self;

    /// Whether the value is NaN. Always `false` for integers.
    fn is_nan(self) -> bool {
        false
    }
}

macro_rules! impl_clamp_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ClampValue for $ty {
                const ZERO: Self = 0;
                const ONE: Self = 1;
                const MAX: Self = <$ty>::MAX;

                fn saturating_add(self, rhs: Self) -> Self {
                    <$ty>::saturating_add(self, rhs)
                }

                fn saturating_sub(self, rhs: Self) -> Self {
                    <$ty>::saturating_sub(self, rhs)
                }
            }
        )*
    };
}

impl_clamp_int!(i32, i64, u32, u64);

impl ClampValue for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const MAX: Self = Self::MAX;

    fn saturating_add(self, rhs: Self) -> Self {
        (self + rhs).min(Self::MAX)
    }

    fn saturating_sub(self, rhs: Self) -> Self {
        (self - rhs).max(Self::MIN)
    }

    fn is_nan(self) -> bool {
        Self::is_nan(self)
    }
}

/// Inclusive lower and upper bound of one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds<T> {
    /// Smallest allowed value.
    pub lower: T,
    /// Largest allowed value.
    pub upper: T,
}

impl<T: ClampValue> Bounds<T> {
    /// Bounds between `lower` and `upper` (inclusive).
    pub const fn new(lower: T, upper: T) -> Self {
        Self { lower, upper }
    }

    /// Bounded below by zero, unbounded above.
    pub const fn non_negative() -> Self {
        Self::new(T::ZERO, T::MAX)
    }

    /// Bounded below by zero and above by `upper`.
    pub const fn up_to(upper: T) -> Self {
        Self::new(T::ZERO, upper)
    }

    /// Force `value` into the bounds.
    pub fn clamp(self, value: T) -> T {
        if value < self.lower {
            self.lower
        } else if value > self.upper {
            self.upper
        } else {
            value
        }
    }
}

/// Apply one update to `current`.
///
/// Returns the new value, or `None` when the update is ignored (a
/// non-positive or NaN amount for `Add`/`Subtract`, a NaN amount for `Set`).
pub fn apply<T: ClampValue>(
    update: UpdateType,
    current: T,
    amount: T,
    bounds: Bounds<T>,
) -> Option<T> {
    if amount.is_nan() {
        return None;
    }
    match update {
        UpdateType::Add => {
            (amount > T::ZERO).then(|| bounds.clamp(current.saturating_add(amount)))
        }
        UpdateType::Subtract => {
            (amount > T::ZERO).then(|| bounds.clamp(current.saturating_sub(amount)))
        }
        UpdateType::Set => Some(bounds.clamp(amount)),
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn add_caps_at_upper_bound() {
        let bounds = Bounds::up_to(10_u32);
        let mut value = 0;
        for _ in 0..20 {
            value = apply(UpdateType::Add, value, 3, bounds).unwrap_or(value);
            assert!(value <= 10);
        }
        assert_eq!(value, 10);
    }

    #[test]
    fn subtract_floors_at_lower_bound() {
        let bounds = Bounds::new(1_u32, 100);
        assert_eq!(apply(UpdateType::Subtract, 5, 50, bounds), Some(1));
        assert_eq!(apply(UpdateType::Subtract, 5, 2, bounds), Some(3));
    }

    #[test]
    fn unsigned_subtract_saturates_instead_of_wrapping() {
        let bounds = Bounds::<u64>::non_negative();
        assert_eq!(apply(UpdateType::Subtract, 3, u64::MAX, bounds), Some(0));
    }

    #[test]
    fn add_saturates_at_type_max() {
        let bounds = Bounds::<i64>::non_negative();
        assert_eq!(apply(UpdateType::Add, i64::MAX - 1, 10, bounds), Some(i64::MAX));
    }

    #[test]
    fn non_positive_amounts_are_ignored() {
        let bounds = Bounds::<i64>::non_negative();
        assert_eq!(apply(UpdateType::Add, 7, 0, bounds), None);
        assert_eq!(apply(UpdateType::Add, 7, -3, bounds), None);
        assert_eq!(apply(UpdateType::Subtract, 7, 0, bounds), None);
        assert_eq!(apply(UpdateType::Subtract, 7, -3, bounds), None);
    }

    #[test]
    fn set_clamps_both_ways() {
        let bounds = Bounds::new(1_i32, 50);
        assert_eq!(apply(UpdateType::Set, 10, 0, bounds), Some(1));
        assert_eq!(apply(UpdateType::Set, 10, 99, bounds), Some(50));
        assert_eq!(apply(UpdateType::Set, 10, 25, bounds), Some(25));
        assert_eq!(apply(UpdateType::Set, 10, -4, Bounds::non_negative()), Some(0));
    }

    #[test]
    fn float_rules_match_integer_rules() {
        let bounds = Bounds::up_to(1_000.0_f64);
        assert_eq!(apply(UpdateType::Add, 990.0, 25.0, bounds), Some(1_000.0));
        assert_eq!(apply(UpdateType::Subtract, 10.0, 25.5, bounds), Some(0.0));
        assert_eq!(apply(UpdateType::Add, 10.0, -1.0, bounds), None);
        assert_eq!(apply(UpdateType::Set, 10.0, 12.5, bounds), Some(12.5));
    }

    #[test]
    fn nan_is_always_ignored() {
        let bounds = Bounds::<f64>::non_negative();
        assert_eq!(apply(UpdateType::Add, 1.0, f64::NAN, bounds), None);
        assert_eq!(apply(UpdateType::Set, 1.0, f64::NAN, bounds), None);
    }
}
