use std::fmt;

/// Fixed point number as it appears in an NMEA field: `value / scale`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Rational {
    pub value: i64,
    pub scale: i64,
}

impl Rational {
    pub const ZERO: Rational = Rational { value: 0, scale: 1 };

    pub fn new(value: i64, scale: i64) -> Option<Self> {
        if scale > 0 {
            Some(Self { value, scale })
        } else {
            None
        }
    }

    pub fn abs(self) -> Self {
        Self {
            value: self.value.abs(),
            scale: self.scale,
        }
    }

    pub fn to_f64(self) -> f64 {
        self.value as f64 / self.scale as f64
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.scale)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    pub fn as_ref_tag(self) -> &'static str {
        match self {
            Hemisphere::North => "N",
            Hemisphere::South => "S",
            Hemisphere::East => "E",
            Hemisphere::West => "W",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Axis {
    Latitude,
    Longitude,
}

/// One angular coordinate split into whole degrees and scaled minutes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Coordinate {
    pub hemisphere: Hemisphere,
    pub degrees: i64,
    pub minutes_scaled: i64,
    pub minutes_scale: i64,
}

impl Coordinate {
    /// Splits a signed `dddmm.mmmm` value. The sign only selects the
    /// hemisphere; degrees and minutes are always non-negative.
    pub fn from_raw(axis: Axis, raw: Rational) -> Self {
        let hemisphere = match (axis, raw.value >= 0) {
            (Axis::Latitude, true) => Hemisphere::North,
            (Axis::Latitude, false) => Hemisphere::South,
            (Axis::Longitude, true) => Hemisphere::East,
            (Axis::Longitude, false) => Hemisphere::West,
        };
        let magnitude = raw.value.saturating_abs();
        // absurd scales put everything into minutes instead of overflowing
        let per_degree = raw.scale.saturating_mul(100);
        Self {
            hemisphere,
            degrees: magnitude / per_degree,
            minutes_scaled: magnitude % per_degree,
            minutes_scale: raw.scale,
        }
    }

    pub fn to_degrees(self) -> f64 {
        let unsigned =
            self.degrees as f64 + self.minutes_scaled as f64 / self.minutes_scale as f64 / 60.0;
        match self.hemisphere {
            Hemisphere::South | Hemisphere::West => -unsigned,
            Hemisphere::North | Hemisphere::East => unsigned,
        }
    }
}

/// Latest known navigation state. Speed is in knots, course in degrees
/// true, altitude in metres above mean sea level.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NavigationFix {
    pub latitude: Coordinate,
    pub longitude: Coordinate,
    pub speed: Rational,
    pub course: Rational,
    pub altitude: Rational,
}

impl NavigationFix {
    pub fn at(latitude: Coordinate, longitude: Coordinate) -> Self {
        Self {
            latitude,
            longitude,
            speed: Rational::ZERO,
            course: Rational::ZERO,
            altitude: Rational::ZERO,
        }
    }
}
